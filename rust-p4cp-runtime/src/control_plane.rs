//! Event dispatch over a stack of controllers.

use log::{debug, error, info, warn};
use rust_p4cp_common::{
    p4info::P4Info,
    p4rt::{MasterArbitrationUpdate, StreamMessage},
    types::DeviceConfig,
    Result,
};

use crate::{Controller, DeviceChannel};

/// Lifecycle of the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Arbitration has not been announced yet.
    Unarbitrated,
    /// Reading and dispatching stream messages.
    Running,
    /// The stream closed or a fatal error occurred.
    Terminated,
}

/// A P4Runtime controller consisting of a stack of sub-controllers
/// implementing the [`Controller`] interface.
///
/// Controllers are added to the stack with [`ControlPlane::add_controller`].
/// Packet-ins, digests, idle timeouts and stream errors are offered to the
/// controllers from the top of the stack (last added) to the bottom (first
/// added) until one reports the event as handled.
///
/// Arbitration updates go the other way: the control plane itself pushes the
/// pipeline configuration first, then every controller sees the update from
/// bottom to top, so that initialization depending on the primary role runs
/// before feature controllers reconfigure the data plane.
pub struct ControlPlane<C: DeviceChannel> {
    con: C,
    p4info: P4Info,
    device_config: DeviceConfig,
    ctrls: Vec<Box<dyn Controller>>,
    state: DispatcherState,
}

/// Offer an event to the controllers, most recently added first.
macro_rules! dispatch_down {
    ($self:ident, $handler:ident, $event:expr) => {{
        let mut handled = false;
        for ctrl in $self.ctrls.iter_mut().rev() {
            let result = ctrl.$handler(&mut $self.con, $event).await;
            if check_handled(ctrl.name(), result)? {
                handled = true;
                break;
            }
        }
        handled
    }};
}

impl<C: DeviceChannel> ControlPlane<C> {
    /// Create a controller with the given P4Info and device configuration.
    ///
    /// `con` must already be connected to the switch.
    pub fn new(con: C, p4info: P4Info, device_config: DeviceConfig) -> Self {
        Self {
            con,
            p4info,
            device_config,
            ctrls: Vec::new(),
            state: DispatcherState::Unarbitrated,
        }
    }

    /// API descriptor controllers resolve their ids from.
    pub fn p4info(&self) -> &P4Info {
        &self.p4info
    }

    /// Put a controller on top of the current stack.
    pub fn add_controller<T: Controller + 'static>(&mut self, ctrl: T) {
        debug!("Adding controller {} at stack position {}", ctrl.name(), self.ctrls.len());
        self.ctrls.push(Box::new(ctrl));
    }

    /// Names of the stacked controllers, bottom first.
    pub fn controllers(&self) -> Vec<&str> {
        self.ctrls.iter().map(|c| c.name()).collect()
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn channel(&self) -> &C {
        &self.con
    }

    /// Run the controller. Returns when the connection has been closed by
    /// the switch, or with the first fatal error.
    pub async fn run(&mut self) -> Result<()> {
        if let Err(e) = self.con.send_master_arbitration_update().await {
            error!("Failed to announce controller to device {}: {}", self.con.device_id(), e);
            self.state = DispatcherState::Terminated;
            return Err(e);
        }
        self.state = DispatcherState::Running;
        info!(
            "Announced controller for device {} with election id {}",
            self.con.device_id(),
            self.con.election_id()
        );

        let result = self.read_loop().await;
        self.state = DispatcherState::Terminated;
        result
    }

    async fn read_loop(&mut self) -> Result<()> {
        while let Some(msg) = self.con.read_stream().await? {
            self.dispatch(&msg).await?;
        }
        info!("Stream channel closed by the switch");
        Ok(())
    }

    /// Route a single stream message through the controller stack.
    pub async fn dispatch(&mut self, msg: &StreamMessage) -> Result<()> {
        debug!("Received {}", msg);
        match msg {
            StreamMessage::Arbitration(arb_update) => {
                self.handle_arbitration_update(arb_update).await;
                for ctrl in self.ctrls.iter_mut() {
                    let result = ctrl
                        .handle_arbitration_update(&mut self.con, arb_update)
                        .await
                        .map(|_| true);
                    check_handled(ctrl.name(), result)?;
                }
            }
            StreamMessage::Packet(packet) => {
                if !dispatch_down!(self, handle_packet_in, packet) {
                    debug!("Packet-in not handled by any controller");
                }
            }
            StreamMessage::Digest(digest_list) => {
                if !dispatch_down!(self, handle_digest, digest_list) {
                    debug!("Digest {} not handled by any controller", digest_list.digest_id);
                }
            }
            StreamMessage::IdleTimeoutNotification(notification) => {
                if !dispatch_down!(self, handle_idle_timeout, notification) {
                    debug!("Idle timeout notification not handled by any controller");
                }
            }
            StreamMessage::Error(stream_error) => {
                if !dispatch_down!(self, handle_error, stream_error) {
                    debug!("Stream error not handled by any controller");
                }
            }
            StreamMessage::Unknown => {
                warn!("Unknown data plane event");
            }
        }
        Ok(())
    }

    async fn handle_arbitration_update(&mut self, arb_update: &MasterArbitrationUpdate) {
        if arb_update.is_primary() {
            info!("Elected as primary controller");
            if let Err(e) = self
                .con
                .set_pipeline_config(&self.p4info, &self.device_config)
                .await
            {
                warn!("Setting pipeline config failed: {}", e);
            }
        } else {
            info!("Other controller elected as primary");
        }
    }
}

/// Fatal errors end the dispatch loop. Anything else is logged and the event
/// counts as handled, since the controller that failed had claimed it.
fn check_handled(name: &str, result: Result<bool>) -> Result<bool> {
    match result {
        Ok(handled) => Ok(handled),
        Err(e) if e.is_fatal() => {
            error!("[{}] {}", name, e);
            Err(e)
        }
        Err(e) => {
            warn!("[{}] {}", name, e);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests;
