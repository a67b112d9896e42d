//! The static table of telemetry rules.
//!
//! One rule per line: `<ISD-AS> <hex INT bitmask> <hex SCION bitmask>`,
//! separated by whitespace. Lines starting with `#` are comments, blank
//! lines are skipped.
//!
//! ```text
//! # ISD-AS        INT   SCION
//! 1-ff00:0:110    8d00  0001
//! ```

use log::debug;
use rust_p4cp_common::{types::IsdAs, Error, Result};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Telemetry to collect for traffic towards one AS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticRule {
    pub isd_as: IsdAs,
    /// Selects the generic INT metadata fields, bit 15 first.
    pub int_bitmask: u16,
    /// Selects the SCION specific fields.
    pub scion_bitmask: u16,
}

fn parse_bitmask(value: &str, line: &str) -> Result<u16> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16)
        .map_err(|e| Error::Config(format!("Invalid bitmask '{}' in rule '{}': {}", value, line, e)))
}

impl FromStr for StaticRule {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let (Some(isd_as), Some(int_bitmask), Some(scion_bitmask)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::Config(format!("Incomplete INT rule '{}'", line)));
        };

        Ok(Self {
            isd_as: isd_as.parse()?,
            int_bitmask: parse_bitmask(int_bitmask, line)?,
            scion_bitmask: parse_bitmask(scion_bitmask, line)?,
        })
    }
}

/// Rules in file order. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticRuleSet {
    rules: Vec<StaticRule>,
}

impl StaticRuleSet {
    pub fn parse(text: &str) -> Result<Self> {
        let rules = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(StaticRule::from_str)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to open INT table {}: {}", path.display(), e))
        })?;
        let table = Self::parse(&text)?;
        debug!("Read {} INT rules from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StaticRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
