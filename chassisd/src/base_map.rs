// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Loading and validation of the vendor base chassis-map inventory.
//!
//! The inventory file is a TOML document holding a list of candidate
//! chassis maps; the pushed config selects one by id (an empty id selects
//! the first entry).

use std::collections::BTreeSet;
use std::path::Path;

use bal::{BcmChassisMap, BcmChipType, BcmPortType};
use common::status::{HalResult, Status};
use serde::Deserialize;

#[derive(Deserialize)]
struct BcmChassisMapList {
    #[serde(default)]
    bcm_chassis_maps: Vec<BcmChassisMap>,
}

/// Read the base chassis map with the given id from `path`.  An empty id
/// selects the first entry in the file.
pub fn read_base_chassis_map_from_file(
    path: &Path,
    id: &str,
) -> HalResult<BcmChassisMap> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Status::internal(format!(
            "failed to read base chassis map file {}: {e}",
            path.display()
        ))
    })?;
    let list: BcmChassisMapList = toml::from_str(&text).map_err(|e| {
        Status::internal(format!(
            "failed to parse base chassis map file {}: {e}",
            path.display()
        ))
    })?;

    let map = list
        .bcm_chassis_maps
        .into_iter()
        .find(|m| id.is_empty() || id == m.id)
        .ok_or_else(|| {
            Status::internal(format!(
                "did not find a chassis map with id '{id}' in {}",
                path.display()
            ))
        })?;
    validate_base_chassis_map(&map)?;
    Ok(map)
}

/// Field-level validation of a base chassis map, independent of any pushed
/// config.
pub fn validate_base_chassis_map(map: &BcmChassisMap) -> HalResult<()> {
    let mut slots = BTreeSet::new();
    let mut units = BTreeSet::new();
    let mut modules = BTreeSet::new();
    for chip in &map.bcm_chips {
        if chip.chip_type == BcmChipType::Unknown {
            return Err(Status::internal(format!("invalid type in {chip}")));
        }
        if map.auto_add_slot {
            if chip.slot != 0 {
                return Err(Status::internal(format!(
                    "auto_add_slot is true and slot is non-zero for chip {chip}"
                )));
            }
        } else {
            if chip.slot <= 0 {
                return Err(Status::internal(format!("invalid slot in {chip}")));
            }
            slots.insert(chip.slot);
        }
        if chip.unit < 0 || !units.insert(chip.unit) {
            return Err(Status::internal(format!("invalid unit in {chip}")));
        }
        if chip.module < 0 || !modules.insert(chip.module) {
            return Err(Status::internal(format!("invalid module in {chip}")));
        }
        if chip.pci_bus < 0 {
            return Err(Status::internal(format!("invalid pci_bus in {chip}")));
        }
        if chip.pci_slot < 0 {
            return Err(Status::internal(format!("invalid pci_slot in {chip}")));
        }
    }

    for port in &map.bcm_ports {
        if port.port_type == BcmPortType::Unknown {
            return Err(Status::internal(format!("invalid type in {port}")));
        }
        if map.auto_add_slot {
            if port.slot != 0 {
                return Err(Status::internal(format!(
                    "auto_add_slot is true and slot is non-zero for port {port}"
                )));
            }
        } else if port.slot <= 0 || !slots.contains(&port.slot) {
            return Err(Status::internal(format!("invalid slot in {port}")));
        }
        if port.port <= 0 {
            return Err(Status::internal(format!("invalid port in {port}")));
        }
        if port.channel < 0 || port.channel > 4 {
            return Err(Status::internal(format!("invalid channel in {port}")));
        }
        if port.unit < 0 || !units.contains(&port.unit) {
            return Err(Status::internal(format!("invalid unit in {port}")));
        }
        if port.speed_bps == 0
            || port.speed_bps % common::BITS_PER_GIGABIT != 0
        {
            return Err(Status::internal(format!(
                "invalid speed_bps in {port}"
            )));
        }
        if port.physical_port < 0 {
            return Err(Status::internal(format!(
                "invalid physical_port in {port}"
            )));
        }
        if port.diag_port < 0 {
            return Err(Status::internal(format!("invalid diag_port in {port}")));
        }
        if port.module < 0 || !modules.contains(&port.module) {
            return Err(Status::internal(format!("invalid module in {port}")));
        }
        if port.serdes_core < 0 {
            return Err(Status::internal(format!(
                "invalid serdes_core in {port}"
            )));
        }
        if port.serdes_lane < 0 || port.serdes_lane > 3 {
            return Err(Status::internal(format!(
                "invalid serdes_lane in {port}"
            )));
        }
        if port.port_type != BcmPortType::Mgmt
            && (port.num_serdes_lanes < 1 || port.num_serdes_lanes > 4)
        {
            return Err(Status::internal(format!(
                "invalid num_serdes_lanes in {port}"
            )));
        }
        if map.auto_add_logical_ports {
            if port.logical_port != 0 {
                return Err(Status::internal(format!(
                    "auto_add_logical_ports is true and logical_port is \
                     non-zero in {port}"
                )));
            }
        } else if port.logical_port <= 0 {
            return Err(Status::internal(format!(
                "auto_add_logical_ports is false and logical_port is not \
                 positive in {port}"
            )));
        }
    }

    Ok(())
}
