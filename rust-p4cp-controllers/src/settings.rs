//! Switch dependent tunables shared by the controllers.

use rust_p4cp_common::types::Port;

/// Properties of the target switch the controllers configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchSettings {
    /// Number of front panel ports, numbered from 0.
    pub num_switch_ports: Port,

    /// Port packets are sent to the controller on.
    pub cpu_port: Port,

    /// Clone session delivering telemetry packets to the CPU port.
    pub clone_session_id: u32,

    /// Number of egress ports initialized in the link utilization table.
    pub tx_util_entries: Port,
}

impl Default for SwitchSettings {
    fn default() -> Self {
        Self {
            num_switch_ports: 8,
            cpu_port: 128,
            clone_session_id: 1,
            tx_util_entries: 512,
        }
    }
}
