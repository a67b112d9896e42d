//! The connection to a single forwarding device.

use async_trait::async_trait;
use rust_p4cp_common::{
    p4info::P4Info,
    p4rt::{StreamMessage, WriteRequest},
    types::{DeviceConfig, DeviceId, ElectionId},
    Result,
};

/// P4Runtime connection to a switch.
///
/// Holds the persistent stream channel and issues the unary configuration
/// RPCs. All calls complete (or fail) before returning; failures are reported
/// as [`rust_p4cp_common::Error::Transport`].
#[async_trait]
pub trait DeviceChannel: Send {
    /// Device this channel controls.
    fn device_id(&self) -> DeviceId;

    /// Election id this controller announces.
    fn election_id(&self) -> ElectionId;

    /// Send a master arbitration update to announce the controller's
    /// presence. Must be called before anything else.
    async fn send_master_arbitration_update(&mut self) -> Result<()>;

    /// Apply a new pipeline configuration to the switch.
    async fn set_pipeline_config(&mut self, p4info: &P4Info, config: &DeviceConfig) -> Result<()>;

    /// Return an empty write request to be populated with updates by the caller.
    fn create_write_request(&self) -> WriteRequest {
        WriteRequest::new(self.device_id(), self.election_id())
    }

    /// Send a write request to the switch.
    async fn send_write_request(&mut self, request: &WriteRequest) -> Result<()>;

    /// Read the next message from the stream. `None` once the switch closed it.
    async fn read_stream(&mut self) -> Result<Option<StreamMessage>>;

    /// Acknowledge reception of a digest list received on the stream.
    async fn ack_digest_list(&mut self, digest_id: u32, list_id: u64) -> Result<()>;
}
