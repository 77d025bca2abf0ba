// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The vendor-neutral chassis configuration pushed by the northbound
//! server.  This is the native form of the config; whatever wire encoding
//! the management plane speaks stays at that boundary.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// How the manager drives the hardware.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Real hardware: serdes is configured from the serdes database.
    Standalone,
    /// Simulated chips: serdes configuration is skipped and DMA is
    /// disabled in the generated SDK config.
    Sim,
}

impl std::str::FromStr for OperationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standalone" => Ok(OperationMode::Standalone),
            "sim" => Ok(OperationMode::Sim),
            _ => Err(format!("invalid operation mode: {s}")),
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OperationMode::Standalone => write!(f, "standalone"),
            OperationMode::Sim => write!(f, "sim"),
        }
    }
}

/// The hardware platform hosting the switching chips.  Determines which
/// chip types a pushed config may reference.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    GenericTridentPlus,
    GenericTrident2,
    GenericTomahawk,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Platform::GenericTridentPlus => write!(f, "GENERIC_TRIDENT_PLUS"),
            Platform::GenericTrident2 => write!(f, "GENERIC_TRIDENT2"),
            Platform::GenericTomahawk => write!(f, "GENERIC_TOMAHAWK"),
        }
    }
}

/// A logical forwarding node.  Each node binds to at most one ASIC unit,
/// discovered through the singleton ports that name it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Node {
    pub id: u64,
    pub slot: i32,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(id: {}, slot: {})", self.id, self.slot)
    }
}

/// A tenant-visible front-panel port identity, bound to a specific
/// `(slot, port, channel)` at a specific speed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SingletonPort {
    pub id: u64,
    pub slot: i32,
    pub port: i32,
    #[serde(default)]
    pub channel: i32,
    pub speed_bps: u64,
    pub node: u64,
}

impl fmt::Display for SingletonPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(id: {}, slot: {}, port: {}, channel: {}, speed: {}G)",
            self.id,
            self.slot,
            self.port,
            self.channel,
            self.speed_bps / crate::BITS_PER_GIGABIT
        )
    }
}

/// The full declarative chassis configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ChassisConfig {
    pub platform: Option<Platform>,
    /// Selects an entry in the base chassis-map file; empty selects the
    /// first entry.
    #[serde(default)]
    pub bcm_chassis_map_id: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub singleton_ports: Vec<SingletonPort>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_toml() {
        let text = r#"
            platform = "generic_trident2"

            [[nodes]]
            id = 100
            slot = 5

            [[singleton_ports]]
            id = 1
            slot = 5
            port = 1
            speed_bps = 40000000000
            node = 100
        "#;
        let config: ChassisConfig = toml::from_str(text).unwrap();
        assert_eq!(config.platform, Some(Platform::GenericTrident2));
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.singleton_ports.len(), 1);
        // channel defaults to 0 (unchannelized).
        assert_eq!(config.singleton_ports[0].channel, 0);
        assert_eq!(config.bcm_chassis_map_id, "");
    }

    #[test]
    fn test_display() {
        let port = SingletonPort {
            id: 7,
            slot: 1,
            port: 2,
            channel: 3,
            speed_bps: crate::TWENTY_FIVE_GIG_BPS,
            node: 100,
        };
        assert_eq!(
            port.to_string(),
            "(id: 7, slot: 1, port: 2, channel: 3, speed: 25G)"
        );
    }
}
