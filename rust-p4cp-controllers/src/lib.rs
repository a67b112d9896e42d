//! Feature controllers of the P4 control plane agent.
//!
//! Controllers are stacked on a [`rust_p4cp_runtime::ControlPlane`]:
//!
//! - [`DefaultController`] logs whatever no other controller claimed,
//! - [`MacLearningCtrl`] learns L2 addresses from digests,
//! - [`IntController`] installs telemetry rules and publishes INT reports.

pub mod default;
pub mod entries;
pub mod int;
pub mod mac_learn;
mod settings;

pub use default::DefaultController;
pub use int::IntController;
pub use mac_learn::MacLearningCtrl;
pub use settings::SwitchSettings;
