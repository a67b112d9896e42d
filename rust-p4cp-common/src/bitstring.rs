//! Big-endian bitstring encoding and decoding.
//!
//! P4Runtime carries every match field and action parameter as a byte string
//! whose width is fixed by the P4 program, independent of the width of the
//! integer the controller uses to hold the value. The functions here convert
//! between the two with the width given as a const parameter.

use bytes::Bytes;

/* ---------------------------------------------------------------- *
 * Integer capacity
 * ---------------------------------------------------------------- */

/// Unsigned integers that can be read from and written to bitstrings.
pub trait BitstringValue: Copy {
    /// Size of the integer in bytes.
    const BYTES: usize;

    /// Widen to `u128`.
    fn to_u128(self) -> u128;

    /// Narrow from `u128`, dropping high-order bits.
    fn from_u128(value: u128) -> Self;
}

macro_rules! impl_bitstring_value {
    ($($t:ty),*) => {
        $(
            impl BitstringValue for $t {
                const BYTES: usize = std::mem::size_of::<$t>();

                fn to_u128(self) -> u128 {
                    self as u128
                }

                fn from_u128(value: u128) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_bitstring_value!(u8, u16, u32, u64, u128);

/// Compile-time check that `T` can hold `W` bytes.
struct Capacity<const W: usize, T>(std::marker::PhantomData<T>);

impl<const W: usize, T: BitstringValue> Capacity<W, T> {
    const CHECK: () = assert!(
        T::BYTES >= W,
        "Value type is too short for the requested number of bytes."
    );
}

/* ---------------------------------------------------------------- *
 * Codec
 * ---------------------------------------------------------------- */

/// Read a big-endian value of at most `W` bytes from the end of `bitstring`.
///
/// Leading bytes beyond `W` are ignored. If the input is shorter than `W`,
/// the missing high-order bytes are zero. Instantiating this with a `T`
/// narrower than `W` bytes fails to compile.
pub fn from_bitstring<const W: usize, T: BitstringValue>(bitstring: &[u8]) -> T {
    #[allow(clippy::let_unit_value)]
    let () = Capacity::<W, T>::CHECK;

    let value = bitstring
        .iter()
        .rev()
        .take(W)
        .enumerate()
        .fold(0u128, |acc, (i, &b)| acc | (b as u128) << (8 * i));

    T::from_u128(value)
}

/// Write `value` as exactly `W` big-endian bytes.
///
/// High-order bits that do not fit are truncated; narrower values are
/// zero-padded on the left.
pub fn to_bitstring<const W: usize, T: BitstringValue>(value: T) -> Bytes {
    #[allow(clippy::let_unit_value)]
    let () = Capacity::<W, T>::CHECK;

    let value = value.to_u128();
    (0..W)
        .map(|i| (value >> (8 * (W - i - 1))) as u8)
        .collect::<Vec<u8>>()
        .into()
}
