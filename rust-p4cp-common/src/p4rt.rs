//! P4Runtime messages exchanged with the device.
//!
//! This module mirrors the subset of the P4Runtime protocol the control plane
//! uses: write requests carrying entity updates, and the messages received on
//! the bidirectional stream.

use crate::types::{DeviceId, ElectionId};
use bytes::Bytes;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/* ---------------------------------------------------------------- *
 * Entities
 * ---------------------------------------------------------------- */

/// An exact match on a single header or metadata field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field_id: u32,
    pub exact: Bytes,
}

/// A parameter of a table action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParam {
    pub param_id: u32,
    pub value: Bytes,
}

/// A direct action invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action_id: u32,
    pub params: Vec<ActionParam>,
}

impl Action {
    pub fn new(action_id: u32) -> Self {
        Self {
            action_id,
            params: Vec::new(),
        }
    }

    /// Append a parameter. Parameters must be added in ascending id order.
    pub fn param(mut self, param_id: u32, value: Bytes) -> Self {
        self.params.push(ActionParam { param_id, value });
        self
    }
}

/// A match-action table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub table_id: u32,
    pub matches: Vec<FieldMatch>,
    pub action: Option<Action>,
}

impl TableEntry {
    pub fn new(table_id: u32) -> Self {
        Self {
            table_id,
            matches: Vec::new(),
            action: None,
        }
    }

    /// Append an exact match. Fields must be added in ascending id order.
    pub fn exact(mut self, field_id: u32, value: Bytes) -> Self {
        self.matches.push(FieldMatch {
            field_id,
            exact: value,
        });
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }
}

/// A copy of a packet emitted on an egress port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub egress_port: u32,
    pub instance: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticastGroupEntry {
    pub multicast_group_id: u32,
    pub replicas: Vec<Replica>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSessionEntry {
    pub session_id: u32,
    pub replicas: Vec<Replica>,
    pub class_of_service: u32,
    /// Truncate clones to this length. Zero clones the whole packet.
    pub packet_length_bytes: i32,
}

/// Delivery parameters of a digest extern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestConfig {
    pub max_timeout_ns: i64,
    pub max_list_size: i32,
    pub ack_timeout_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestEntry {
    pub digest_id: u32,
    pub config: DigestConfig,
}

/// Anything a write request can install on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entity {
    TableEntry(TableEntry),
    MulticastGroupEntry(MulticastGroupEntry),
    CloneSessionEntry(CloneSessionEntry),
    DigestEntry(DigestEntry),
}

/* ---------------------------------------------------------------- *
 * Write requests
 * ---------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    Insert,
    Modify,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub update_type: UpdateType,
    pub entity: Entity,
}

/// 128-bit election id as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uint128 {
    pub high: u64,
    pub low: u64,
}

impl From<ElectionId> for Uint128 {
    fn from(low: ElectionId) -> Self {
        Self { high: 0, low }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Atomicity {
    ContinueOnError,
    RollbackOnError,
    DataplaneAtomic,
}

/// An ordered batch of updates for one device.
///
/// Built fresh for each unit of work, sent, then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub device_id: DeviceId,
    pub election_id: Uint128,
    pub atomicity: Atomicity,
    pub updates: Vec<Update>,
}

impl WriteRequest {
    pub fn new(device_id: DeviceId, election_id: ElectionId) -> Self {
        Self {
            device_id,
            election_id: election_id.into(),
            atomicity: Atomicity::ContinueOnError,
            updates: Vec::new(),
        }
    }

    /// Add an update to the request.
    pub fn add_update(&mut self, update_type: UpdateType, entity: Entity) {
        self.updates.push(Update {
            update_type,
            entity,
        });
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/* ---------------------------------------------------------------- *
 * Stream messages
 * ---------------------------------------------------------------- */

/// A google.rpc.Status. Code 0 is OK.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterArbitrationUpdate {
    pub device_id: DeviceId,
    pub election_id: Uint128,
    pub status: Status,
}

impl MasterArbitrationUpdate {
    /// Whether this controller was elected primary.
    pub fn is_primary(&self) -> bool {
        self.status.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketMetadata {
    pub metadata_id: u32,
    pub value: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketIn {
    pub payload: Bytes,
    #[serde(default)]
    pub metadata: Vec<PacketMetadata>,
}

/// Typed data carried in digests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum P4Data {
    Bitstring(Bytes),
    Bool(bool),
    Struct(Vec<P4Data>),
    Tuple(Vec<P4Data>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestList {
    pub digest_id: u32,
    pub list_id: u64,
    pub data: Vec<P4Data>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleTimeoutNotification {
    pub table_entry: Vec<TableEntry>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamError {
    pub canonical_code: i32,
    pub message: String,
}

/// A message received on the P4Runtime stream channel.
///
/// Encoded as `{"type": <variant>, "body": <message>}`. Any other `type`,
/// with or without a body, decodes to [`StreamMessage::Unknown`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "body")]
pub enum StreamMessage {
    Arbitration(MasterArbitrationUpdate),
    Packet(PacketIn),
    Digest(DigestList),
    IdleTimeoutNotification(IdleTimeoutNotification),
    Error(StreamError),
    /// A message type this controller does not understand.
    Unknown,
}

impl<'de> Deserialize<'de> for StreamMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            body: serde_json::Value,
        }

        fn body<T, E>(value: serde_json::Value) -> std::result::Result<T, E>
        where
            T: de::DeserializeOwned,
            E: de::Error,
        {
            serde_json::from_value(value).map_err(E::custom)
        }

        let Envelope { kind, body: value } = Envelope::deserialize(deserializer)?;
        let msg = match kind.as_str() {
            "Arbitration" => StreamMessage::Arbitration(body(value)?),
            "Packet" => StreamMessage::Packet(body(value)?),
            "Digest" => StreamMessage::Digest(body(value)?),
            "IdleTimeoutNotification" => StreamMessage::IdleTimeoutNotification(body(value)?),
            "Error" => StreamMessage::Error(body(value)?),
            _ => StreamMessage::Unknown,
        };
        Ok(msg)
    }
}

impl fmt::Display for StreamMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMessage::Arbitration(arb) => {
                write!(f, "arbitration update (status {})", arb.status.code)
            }
            StreamMessage::Packet(packet) => {
                write!(f, "packet-in ({} bytes)", packet.payload.len())
            }
            StreamMessage::Digest(digest) => write!(
                f,
                "digest list {} of digest {} ({} entries)",
                digest.list_id,
                digest.digest_id,
                digest.data.len()
            ),
            StreamMessage::IdleTimeoutNotification(n) => {
                write!(f, "idle timeout ({} entries)", n.table_entry.len())
            }
            StreamMessage::Error(e) => write!(f, "stream error {}", e.canonical_code),
            StreamMessage::Unknown => write!(f, "unknown message"),
        }
    }
}
