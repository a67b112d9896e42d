//! Error types for the P4 control plane.

use thiserror::Error;

/// All possible errors that can occur within the control plane.
#[derive(Error, Debug)]
pub enum Error {
    /// A required named entity is missing from the API descriptor, or a
    /// required input could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The device sent data whose shape does not match the schema the
    /// controller was built for.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// A packet payload could not be framed.
    #[error("Malformed packet: {0}")]
    Malformed(String),

    /// An RPC or stream write to the device failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A report could not be serialized or published.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error must stop the agent.
    ///
    /// Configuration errors and protocol-shape violations cannot be recovered
    /// from locally. Everything else is handled per event: the dispatcher logs
    /// it and keeps reading the stream.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Protocol(_))
    }
}
