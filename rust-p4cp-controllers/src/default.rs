//! Fallback controller for the bottom of the stack.

use async_trait::async_trait;
use log::{info, warn};
use rust_p4cp_common::{
    p4rt::{DigestList, IdleTimeoutNotification, PacketIn, StreamError},
    Result,
};
use rust_p4cp_runtime::{Controller, DeviceChannel};

/// Claims every event that reaches it and logs a one-line description.
///
/// Add it first so it only sees what no other controller handled.
#[derive(Debug, Default)]
pub struct DefaultController;

impl DefaultController {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Controller for DefaultController {
    fn name(&self) -> &str {
        "default"
    }

    async fn handle_packet_in(
        &mut self,
        _con: &mut dyn DeviceChannel,
        packet: &PacketIn,
    ) -> Result<bool> {
        info!("Unhandled packet ({} bytes)", packet.payload.len());
        Ok(true)
    }

    async fn handle_digest(
        &mut self,
        _con: &mut dyn DeviceChannel,
        digest_list: &DigestList,
    ) -> Result<bool> {
        info!("Received unknown digest {}", digest_list.digest_id);
        Ok(true)
    }

    async fn handle_idle_timeout(
        &mut self,
        _con: &mut dyn DeviceChannel,
        notification: &IdleTimeoutNotification,
    ) -> Result<bool> {
        info!(
            "Unhandled idle timeout notification ({} entries)",
            notification.table_entry.len()
        );
        Ok(true)
    }

    async fn handle_error(&mut self, _con: &mut dyn DeviceChannel, error: &StreamError) -> Result<bool> {
        warn!("Stream error {}: {}", error.canonical_code, error.message);
        Ok(true)
    }
}
