//! P4Runtime client side for the control plane agent.
//!
//! This crate defines the [`DeviceChannel`] the controllers talk to the switch
//! through, the [`Controller`] interface implemented by feature modules, and
//! the [`ControlPlane`] which reads the stream and dispatches events to the
//! stack of controllers.

mod channel;
mod control_plane;
mod controller;
mod json_channel;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use channel::DeviceChannel;
pub use control_plane::{ControlPlane, DispatcherState};
pub use controller::Controller;
pub use json_channel::{ChannelRequest, ChannelResponse, JsonStreamChannel};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockChannel, MockLog};

/// Default timeout for establishing the device connection.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
