//! Agent tunables.
//!
//! Loaded from the built-in defaults, then an optional TOML file given with
//! `--settings`, then environment variables prefixed with `P4CP_`
//! (e.g. `P4CP_NUM_SWITCH_PORTS=16`).

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use rust_p4cp_controllers::SwitchSettings;
use rust_p4cp_runtime::DEFAULT_CONNECT_TIMEOUT_SECS;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub num_switch_ports: u32,
    pub cpu_port: u32,
    pub clone_session_id: u32,
    pub tx_util_entries: u32,
    /// Applies to the switch and the TCP report stream.
    pub connect_timeout_secs: u64,
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = SwitchSettings::default();

        let mut builder = Config::builder()
            .set_default("num_switch_ports", defaults.num_switch_ports as i64)?
            .set_default("cpu_port", defaults.cpu_port as i64)?
            .set_default("clone_session_id", defaults.clone_session_id as i64)?
            .set_default("tx_util_entries", defaults.tx_util_entries as i64)?
            .set_default("connect_timeout_secs", DEFAULT_CONNECT_TIMEOUT_SECS as i64)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file));
        }

        builder
            .add_source(Environment::with_prefix("P4CP").try_parsing(true))
            .build()
            .and_then(Config::try_deserialize)
            .context("Failed to load settings")
    }

    pub fn switch(&self) -> SwitchSettings {
        SwitchSettings {
            num_switch_ports: self.num_switch_ports,
            cpu_port: self.cpu_port,
            clone_session_id: self.clone_session_id,
            tx_util_entries: self.tx_util_entries,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
