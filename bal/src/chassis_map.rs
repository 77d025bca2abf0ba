// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The BCM-facing hardware model: chips, ports, and the chassis map
//! bundling them.  Two maps exist at runtime: the *base* map is the vendor
//! inventory of everything the platform could support, and the *applied*
//! map is the validated, pruned, channel-expanded subset actually in
//! effect after a config push.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use common::ports::PortKey;

/// The switching ASIC families this manager knows how to drive.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BcmChipType {
    Unknown,
    TridentPlus,
    Trident2,
    Tomahawk,
    TomahawkPlus,
}

impl Default for BcmChipType {
    fn default() -> Self {
        BcmChipType::Unknown
    }
}

impl fmt::Display for BcmChipType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BcmChipType::Unknown => write!(f, "UNKNOWN"),
            BcmChipType::TridentPlus => write!(f, "TRIDENT_PLUS"),
            BcmChipType::Trident2 => write!(f, "TRIDENT2"),
            BcmChipType::Tomahawk => write!(f, "TOMAHAWK"),
            BcmChipType::TomahawkPlus => write!(f, "TOMAHAWK_PLUS"),
        }
    }
}

/// The role of a BCM port.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BcmPortType {
    Unknown,
    /// 10G-class front-panel port.
    Xe,
    /// 100G-class front-panel port.
    Ce,
    /// Management port.
    Mgmt,
}

impl Default for BcmPortType {
    fn default() -> Self {
        BcmPortType::Unknown
    }
}

impl BcmPortType {
    /// Whether this is a data-plane (non-management) port type.
    pub fn is_data(&self) -> bool {
        matches!(self, BcmPortType::Xe | BcmPortType::Ce)
    }
}

impl fmt::Display for BcmPortType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BcmPortType::Unknown => write!(f, "UNKNOWN"),
            BcmPortType::Xe => write!(f, "XE"),
            BcmPortType::Ce => write!(f, "CE"),
            BcmPortType::Mgmt => write!(f, "MGMT"),
        }
    }
}

/// One switching ASIC.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BcmChip {
    #[serde(rename = "type")]
    pub chip_type: BcmChipType,
    /// Line-card slot; 0 until auto-populated when the map carries
    /// `auto_add_slot`.
    #[serde(default)]
    pub slot: i32,
    /// Process-unique dense unit number.
    #[serde(default)]
    pub unit: i32,
    #[serde(default)]
    pub module: i32,
    #[serde(default)]
    pub pci_bus: i32,
    #[serde(default)]
    pub pci_slot: i32,
    #[serde(default)]
    pub is_oversubscribed: bool,
    /// Opaque `key=value` lines copied verbatim into the SDK config file.
    #[serde(default)]
    pub sdk_properties: Vec<String>,
}

impl fmt::Display for BcmChip {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(type: {}, slot: {}, unit: {})",
            self.chip_type, self.slot, self.unit
        )
    }
}

/// One channel of one physical port on one chip.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BcmPort {
    #[serde(rename = "type")]
    pub port_type: BcmPortType,
    #[serde(default)]
    pub slot: i32,
    #[serde(default)]
    pub port: i32,
    /// 0 = unchannelized, 1..4 = channelized lane.
    #[serde(default)]
    pub channel: i32,
    #[serde(default)]
    pub unit: i32,
    /// Per-chip SDK port index.  0 is reserved for the CMIC port, so a
    /// configured port always carries a positive value; the base map
    /// leaves it 0 when logical ports are auto-assigned.
    #[serde(default)]
    pub logical_port: i32,
    #[serde(default)]
    pub physical_port: i32,
    /// Port index used by the diagnostic shell.
    #[serde(default)]
    pub diag_port: i32,
    #[serde(default)]
    pub module: i32,
    #[serde(default)]
    pub serdes_core: i32,
    /// Lane within the serdes core, 0..3.
    #[serde(default)]
    pub serdes_lane: i32,
    /// Number of serdes lanes consumed, 1..4.  May be omitted for
    /// management ports.
    #[serde(default)]
    pub num_serdes_lanes: i32,
    #[serde(default)]
    pub tx_lane_map: u32,
    #[serde(default)]
    pub rx_lane_map: u32,
    #[serde(default)]
    pub tx_polarity_flip: u32,
    #[serde(default)]
    pub rx_polarity_flip: u32,
    /// Multiple of 1 Gb/s.
    #[serde(default)]
    pub speed_bps: u64,
    /// Backplane port (no transceiver cage) rather than front-panel.
    #[serde(default)]
    pub internal: bool,
    /// Channelization and per-lane speed are runtime-reconfigurable.
    #[serde(default)]
    pub flex_port: bool,
    /// Opaque `key=value` lines copied verbatim into the SDK config file.
    #[serde(default)]
    pub sdk_properties: Vec<String>,
}

impl BcmPort {
    /// The `(slot, port, channel)` identity of this port.
    pub fn key(&self) -> PortKey {
        PortKey::new(self.slot, self.port, self.channel)
    }
}

impl fmt::Display for BcmPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(type: {}, slot: {}, port: {}, channel: {}, unit: {}, logical: {}, speed: {}G)",
            self.port_type,
            self.slot,
            self.port,
            self.channel,
            self.unit,
            self.logical_port,
            self.speed_bps / common::BITS_PER_GIGABIT
        )
    }
}

/// Chassis-wide settings that are not tied to one chip or port.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BcmChassis {
    #[serde(default)]
    pub sdk_properties: Vec<String>,
}

/// A bundle of chips and candidate ports, plus the knobs controlling how a
/// pushed config is mapped onto them.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct BcmChassisMap {
    #[serde(default)]
    pub id: String,
    /// When set, the slot of every chip and port is taken from the pushed
    /// config rather than the inventory.
    #[serde(default)]
    pub auto_add_slot: bool,
    /// When set, logical ports are assigned by the resolver instead of
    /// being listed in the inventory.
    #[serde(default)]
    pub auto_add_logical_ports: bool,
    pub bcm_chassis: Option<BcmChassis>,
    #[serde(default)]
    pub bcm_chips: Vec<BcmChip>,
    #[serde(default)]
    pub bcm_ports: Vec<BcmPort>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_key() {
        let port = BcmPort {
            port_type: BcmPortType::Xe,
            slot: 2,
            port: 7,
            channel: 1,
            ..Default::default()
        };
        assert_eq!(port.key(), PortKey::new(2, 7, 1));
        assert!(port.port_type.is_data());
        assert!(!BcmPortType::Mgmt.is_data());
    }

    #[test]
    fn test_map_from_toml() {
        let text = r#"
            id = "generic_trident2"
            auto_add_slot = true
            auto_add_logical_ports = true

            [bcm_chassis]
            sdk_properties = ["os=unix"]

            [[bcm_chips]]
            type = "trident2"
            unit = 0

            [[bcm_ports]]
            type = "xe"
            port = 1
            unit = 0
            physical_port = 1
            diag_port = 0
            speed_bps = 40000000000
            num_serdes_lanes = 4
        "#;
        let map: BcmChassisMap = toml::from_str(text).unwrap();
        assert_eq!(map.id, "generic_trident2");
        assert!(map.auto_add_slot);
        assert_eq!(map.bcm_chips[0].chip_type, BcmChipType::Trident2);
        assert_eq!(map.bcm_chips[0].slot, 0);
        assert_eq!(map.bcm_ports[0].port_type, BcmPortType::Xe);
        assert_eq!(map.bcm_ports[0].logical_port, 0);
        assert_eq!(
            map.bcm_chassis.as_ref().unwrap().sdk_properties,
            vec!["os=unix".to_string()]
        );
    }
}
