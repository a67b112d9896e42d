//! Common types and utilities for the P4 control plane agent.
//!
//! This crate provides the pieces shared by the runtime (device channel and
//! event dispatch) and the feature controllers: the bitstring codec used for
//! every match/action field, a checked payload cursor, wire constants, the
//! runtime data model and API descriptor loading.

pub mod bitstring;
pub mod cursor;
pub mod error;
pub mod p4info;
pub mod p4rt;
pub mod types;

/// Reexport of common types
pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
