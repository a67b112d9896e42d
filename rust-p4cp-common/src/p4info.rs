//! Loading of the data plane API descriptor (P4Info) and device config.
//!
//! The P4Info is read in the JSON encoding emitted by the P4 compiler. Only
//! the preambles are interpreted; the full document is kept and forwarded to
//! the device unchanged when the pipeline is configured.

use crate::error::Error;
use crate::types::DeviceConfig;
use crate::Result;
use log::debug;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Name and id of a P4 object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Preamble {
    pub id: u32,
    pub name: String,
    pub alias: String,
}

/// Any P4Info object list entry. Fields other than the preamble are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct P4Object {
    pub preamble: Preamble,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct P4InfoObjects {
    tables: Vec<P4Object>,
    actions: Vec<P4Object>,
    counters: Vec<P4Object>,
    digests: Vec<P4Object>,
}

/// The control plane API of the loaded P4 program.
#[derive(Debug, Clone)]
pub struct P4Info {
    objects: P4InfoObjects,
    raw: serde_json::Value,
}

impl P4Info {
    /// Parse a P4Info document in JSON encoding.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Invalid P4 Info: {}", e)))?;
        let objects = P4InfoObjects::deserialize(&raw)
            .map_err(|e| Error::Config(format!("Invalid P4 Info: {}", e)))?;

        debug!(
            "P4 Info: {} tables, {} actions, {} counters, {} digests",
            objects.tables.len(),
            objects.actions.len(),
            objects.counters.len(),
            objects.digests.len()
        );

        Ok(Self { objects, raw })
    }

    /// Parse a P4Info message from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("File not found: {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// The document as loaded, for forwarding to the device.
    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    pub fn table_id(&self, name: &str) -> Option<u32> {
        find_id(&self.objects.tables, name)
    }

    pub fn action_id(&self, name: &str) -> Option<u32> {
        find_id(&self.objects.actions, name)
    }

    pub fn counter_id(&self, name: &str) -> Option<u32> {
        find_id(&self.objects.counters, name)
    }

    pub fn digest_id(&self, name: &str) -> Option<u32> {
        find_id(&self.objects.digests, name)
    }
}

/// Match either the fully qualified name or the alias. Id 0 is unset.
fn find_id(objects: &[P4Object], name: &str) -> Option<u32> {
    objects
        .iter()
        .map(|o| &o.preamble)
        .find(|p| p.id != 0 && (p.name == name || p.alias == name))
        .map(|p| p.id)
}

/// Load a device configuration from a file.
pub fn load_device_config<P: AsRef<Path>>(path: P) -> Result<DeviceConfig> {
    let path = path.as_ref();
    let config = fs::read(path)
        .map_err(|e| Error::Config(format!("File not found: {}: {}", path.display(), e)))?;
    debug!("Loaded device config of {} bytes from {}", config.len(), path.display());
    Ok(config.into())
}
