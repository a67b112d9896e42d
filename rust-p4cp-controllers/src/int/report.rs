//! Telemetry report messages.
//!
//! Protobuf schema of the reports consumed by the telemetry collectors:
//!
//! ```text
//! message FlowKey { uint32 flow_id = 1; }
//! message Report {
//!   enum PacketType { UNKNOWN = 0; SCION = 1; }
//!   PacketType packet_type = 1;
//!   bytes truncated_packet = 2;
//!   repeated Node hops = 3;
//! }
//! message Node { uint32 node_id = 1; uint64 asn = 2; map<uint32, bytes> metadata = 3; }
//! ```

use prost::{Enumeration, Message};
use std::collections::HashMap;

/// Key of a report in the message queue.
#[derive(Clone, PartialEq, Message)]
pub struct FlowKey {
    #[prost(uint32, tag = "1")]
    pub flow_id: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum PacketType {
    Unknown = 0,
    Scion = 1,
}

/// Keys of [`Node::metadata`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum MetadataType {
    Unspecified = 0,
    InterfaceLevel1 = 1,
    HopLatency = 2,
    QueueOccupancy = 3,
    IngressTimestamp = 4,
    EgressTimestamp = 5,
    InterfaceLevel2 = 6,
    EgressTxUtilization = 7,
    BufferOccupancy = 8,
}

/// Telemetry of one hop.
#[derive(Clone, PartialEq, Message)]
pub struct Node {
    #[prost(uint32, tag = "1")]
    pub node_id: u32,
    #[prost(uint64, tag = "2")]
    pub asn: u64,
    /// Raw big-endian field values keyed by [`MetadataType`].
    #[prost(map = "uint32, bytes", tag = "3")]
    pub metadata: HashMap<u32, Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Report {
    #[prost(enumeration = "PacketType", tag = "1")]
    pub packet_type: i32,
    /// Headers of the reported packet.
    #[prost(bytes = "vec", tag = "2")]
    pub truncated_packet: Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub hops: Vec<Node>,
}
