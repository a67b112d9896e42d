//! Interface for feature controllers.

use async_trait::async_trait;
use rust_p4cp_common::{
    p4rt::{DigestList, IdleTimeoutNotification, MasterArbitrationUpdate, PacketIn, StreamError},
    Result,
};

use crate::DeviceChannel;

/// A feature module on the [`crate::ControlPlane`] controller stack.
///
/// Every callback except [`Controller::handle_arbitration_update`] returns
/// whether the event has been handled. Returning `true` stops the event from
/// travelling further down the stack; returning `false` passes it on to the
/// controller added before this one.
///
/// An `Err` that is fatal (see [`rust_p4cp_common::Error::is_fatal`]) stops
/// the control plane. Other errors are logged and the event is dropped.
#[async_trait]
pub trait Controller: Send {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Handle an arbitration update message.
    ///
    /// Arbitration updates are sent to all controllers when the primary
    /// controller for the device changes, in the order the controllers were
    /// added.
    async fn handle_arbitration_update(
        &mut self,
        _con: &mut dyn DeviceChannel,
        _arb_update: &MasterArbitrationUpdate,
    ) -> Result<()> {
        Ok(())
    }

    /// Handle a packet-in message.
    async fn handle_packet_in(
        &mut self,
        _con: &mut dyn DeviceChannel,
        _packet: &PacketIn,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Handle a digest list received from the data plane.
    async fn handle_digest(
        &mut self,
        _con: &mut dyn DeviceChannel,
        _digest_list: &DigestList,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Handle an idle timeout notification.
    async fn handle_idle_timeout(
        &mut self,
        _con: &mut dyn DeviceChannel,
        _notification: &IdleTimeoutNotification,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Handle a stream error, which reports a failed earlier stream request.
    async fn handle_error(
        &mut self,
        _con: &mut dyn DeviceChannel,
        _error: &StreamError,
    ) -> Result<bool> {
        Ok(false)
    }
}
