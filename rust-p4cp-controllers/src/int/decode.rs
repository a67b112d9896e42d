//! Decoding of telemetry packets cloned to the controller.
//!
//! Payload layout:
//!
//! ```text
//! +----------------+---------------------------+-----------------------+
//! | header length  | packet headers            | INT stack             |
//! | u64, 8 bytes   | `header length` bytes     | hops, newest first    |
//! +----------------+---------------------------+-----------------------+
//! ```
//!
//! Offsets within the packet headers (relative to their start, `len` is the
//! header length):
//!
//! | field             | offset      | width |
//! |-------------------|-------------|-------|
//! | flow id           | 0           | 4     |
//! | destination AS    | 12          | 8     |
//! | INT stack size    | len - 15    | 1     |
//! | INT hop size      | len - 10    | 1     |
//! | INT bitmask       | len - 8     | 2     |
//! | SCION bitmask     | len - 4     | 2     |
//!
//! Which fields a hop carries is given by the two bitmasks. Fields appear in
//! the order of the bits testing them, INT bitmask bit 15 first.

use rust_p4cp_common::{
    cursor::Cursor,
    types::{AsAddr, NodeId},
    Error, Result,
};
use std::collections::HashMap;

use super::report::{MetadataType, Node, PacketType, Report};

/// Size of the length field preceding the packet headers.
pub const INT_CPU_HEADER_BYTES: usize = 8;

/// The report key is the flow id modulo 2^20.
const FLOW_KEY_MASK: u32 = (1 << 20) - 1;

/// The stack size byte counts 3 units of shim header.
const STACK_SIZE_OFFSET: usize = 3;

/// Only the low 5 bits of the hop size byte are the hop size.
const HOP_SIZE_MASK: u64 = 0x1f;

/// Header offsets relative to the end of the packet headers.
const STACK_SIZE_FROM_END: usize = 15;
const HOP_SIZE_FROM_END: usize = 10;
const INT_BITMASK_FROM_END: usize = 8;
const SCION_BITMASK_FROM_END: usize = 4;

const DST_AS_OFFSET: usize = 12;

/// Timestamps are reported by the switch in microseconds.
// TODO: check with the data plane whether the x1000 scaling should happen
// there instead; collectors expect nanoseconds.
const TIMESTAMP_SCALE: u64 = 1000;

/// INT bitmask bits, most significant first.
mod bits {
    pub const NODE_ID: u16 = 1 << 15;
    pub const L1_IF_ID: u16 = 1 << 14;
    pub const HOP_LATENCY: u16 = 1 << 13;
    pub const QUEUE: u16 = 1 << 12;
    pub const INGRESS_TIME: u16 = 1 << 11;
    pub const EGRESS_TIME: u16 = 1 << 10;
    pub const L2_IF_ID: u16 = 1 << 9;
    pub const EGRESS_IF_UTIL: u16 = 1 << 8;
    pub const BUFFER: u16 = 1 << 7;

    /// SCION bitmask
    pub const AS_ADDR: u16 = 1 << 0;
}

/// Telemetry collected at one hop. Absent fields were not requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryHop {
    pub node_id: Option<NodeId>,
    pub l1_interface: Option<u32>,
    pub hop_latency: Option<u32>,
    pub queue_occupancy: Option<u32>,
    /// Nanoseconds
    pub ingress_timestamp: Option<u64>,
    /// Nanoseconds
    pub egress_timestamp: Option<u64>,
    pub l2_interface: Option<u64>,
    pub egress_utilization: Option<u32>,
    pub buffer_occupancy: Option<u32>,
    pub asn: Option<AsAddr>,
}

impl TelemetryHop {
    fn decode(cursor: &mut Cursor<'_>, int_bitmask: u16, scion_bitmask: u16) -> Result<Self> {
        let has = |bit: u16| int_bitmask & bit != 0;
        let mut hop = Self::default();

        if has(bits::NODE_ID) {
            hop.node_id = Some(cursor.take_u32()?);
        }
        if has(bits::L1_IF_ID) {
            hop.l1_interface = Some(cursor.take_u32()?);
        }
        if has(bits::HOP_LATENCY) {
            hop.hop_latency = Some(cursor.take_u32()?);
        }
        if has(bits::QUEUE) {
            hop.queue_occupancy = Some(cursor.take_u32()?);
        }
        if has(bits::INGRESS_TIME) {
            hop.ingress_timestamp = Some(cursor.take_u64()?.wrapping_mul(TIMESTAMP_SCALE));
        }
        if has(bits::EGRESS_TIME) {
            hop.egress_timestamp = Some(cursor.take_u64()?.wrapping_mul(TIMESTAMP_SCALE));
        }
        if has(bits::L2_IF_ID) {
            hop.l2_interface = Some(cursor.take_u64()?);
        }
        if has(bits::EGRESS_IF_UTIL) {
            hop.egress_utilization = Some(cursor.take_u32()?);
        }
        if has(bits::BUFFER) {
            hop.buffer_occupancy = Some(cursor.take_u32()?);
        }
        if scion_bitmask & bits::AS_ADDR != 0 {
            hop.asn = Some(cursor.take_u64()?);
        }

        Ok(hop)
    }

    /// Report representation. Metadata values are big-endian at the width
    /// they had on the wire.
    pub fn to_node(&self) -> Node {
        let fields = [
            (MetadataType::InterfaceLevel1, self.l1_interface.map(|v| v.to_be_bytes().to_vec())),
            (MetadataType::HopLatency, self.hop_latency.map(|v| v.to_be_bytes().to_vec())),
            (MetadataType::QueueOccupancy, self.queue_occupancy.map(|v| v.to_be_bytes().to_vec())),
            (MetadataType::IngressTimestamp, self.ingress_timestamp.map(|v| v.to_be_bytes().to_vec())),
            (MetadataType::EgressTimestamp, self.egress_timestamp.map(|v| v.to_be_bytes().to_vec())),
            (MetadataType::InterfaceLevel2, self.l2_interface.map(|v| v.to_be_bytes().to_vec())),
            (MetadataType::EgressTxUtilization, self.egress_utilization.map(|v| v.to_be_bytes().to_vec())),
            (MetadataType::BufferOccupancy, self.buffer_occupancy.map(|v| v.to_be_bytes().to_vec())),
        ];
        let metadata: HashMap<u32, Vec<u8>> = fields
            .into_iter()
            .filter_map(|(key, value)| value.map(|value| (key as u32, value)))
            .collect();

        Node {
            node_id: self.node_id.unwrap_or_default(),
            asn: self.asn.unwrap_or_default(),
            metadata,
        }
    }
}

/// A decoded telemetry packet borrowing its headers from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryPacket<'a> {
    pub flow_id: u32,
    pub dst_as: u64,
    pub int_bitmask: u16,
    pub scion_bitmask: u16,
    /// The packet headers following the length field.
    pub headers: &'a [u8],
    pub hops: Vec<TelemetryHop>,
}

impl<'a> TelemetryPacket<'a> {
    /// Decode a packet-in payload. Fails with [`Error::Malformed`] if the
    /// framing is inconsistent or the payload ends early.
    pub fn decode(payload: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(payload);

        let hdr_len = cursor.take_u64().map_err(|_| {
            Error::Malformed(format!(
                "Received INT stack with invalid length ({} bytes)",
                payload.len()
            ))
        })?;
        let hdr_len = usize::try_from(hdr_len)
            .ok()
            .filter(|&len| len <= cursor.remaining())
            .ok_or_else(|| {
                Error::Malformed(format!(
                    "Header length {} exceeds payload of {} bytes",
                    hdr_len,
                    payload.len()
                ))
            })?;
        if hdr_len < STACK_SIZE_FROM_END {
            return Err(Error::Malformed(format!("Header length {} too short", hdr_len)));
        }

        let start = INT_CPU_HEADER_BYTES;
        let end = start + hdr_len;
        let headers = cursor.slice_at(start, hdr_len)?;

        let flow_id = cursor.peek_be::<4>(start)? as u32;
        let dst_as = cursor.peek_be::<8>(start + DST_AS_OFFSET)?;
        let int_bitmask = cursor.peek_be::<2>(end - INT_BITMASK_FROM_END)? as u16;
        let scion_bitmask = cursor.peek_be::<2>(end - SCION_BITMASK_FROM_END)? as u16;

        let stack_size = (cursor.peek_be::<1>(end - STACK_SIZE_FROM_END)? as usize)
            .checked_sub(STACK_SIZE_OFFSET)
            .ok_or_else(|| Error::Malformed("Received INT stack with invalid length".into()))?;
        let hop_size = (cursor.peek_be::<1>(end - HOP_SIZE_FROM_END)? & HOP_SIZE_MASK) as usize;
        if hop_size == 0 || stack_size % hop_size != 0 {
            return Err(Error::Malformed(format!(
                "Received INT stack with invalid length: stack {} is no multiple of hop size {}",
                stack_size, hop_size
            )));
        }

        cursor.seek(end)?;
        let hops = (0..stack_size / hop_size)
            .map(|_| TelemetryHop::decode(&mut cursor, int_bitmask, scion_bitmask))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            flow_id,
            dst_as,
            int_bitmask,
            scion_bitmask,
            headers,
            hops,
        })
    }

    /// Message queue key of the flow.
    pub fn flow_key(&self) -> u32 {
        self.flow_id & FLOW_KEY_MASK
    }

    /// Message queue topic: the destination AS and the reporting node.
    pub fn topic(&self, node_id: NodeId) -> String {
        format!(
            "AS{:x}_{:x}_{:x}-{:x}",
            (self.dst_as >> 32) & 0xffff,
            (self.dst_as >> 16) & 0xffff,
            self.dst_as & 0xffff,
            node_id
        )
    }

    pub fn to_report(&self) -> Report {
        Report {
            packet_type: PacketType::Scion as i32,
            truncated_packet: self.headers.to_vec(),
            hops: self.hops.iter().map(TelemetryHop::to_node).collect(),
        }
    }
}
