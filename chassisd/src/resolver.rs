// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Resolution of a pushed chassis config against the base inventory.
//!
//! [`generate_chassis_map_from_config`] is a pure function: given a config
//! and a loaded base map it produces the (possibly slot-populated) base
//! and the fully-validated applied map, with flex ports expanded to all
//! four channels and logical ports auto-assigned when the map asks for it.
//! Both the verify and push flows go through it.

use std::collections::{BTreeMap, BTreeSet};

use bal::{BcmChassisMap, BcmChipType, BcmPort};
use common::chassis_config::{ChassisConfig, Platform, SingletonPort};
use common::ports::PortKey;
use common::status::{HalResult, Status};
use common::{
    CPU_PORT_ID, FIFTY_GIG_BPS, FORTY_GIG_BPS, HUNDRED_GIG_BPS, TEN_GIG_BPS,
    TWENTY_FIVE_GIG_BPS, TWENTY_GIG_BPS,
};

/// Hard per-chip limits on the number of BCM ports.
pub const TOMAHAWK_MAX_BCM_PORTS_PER_CHIP: usize = 128;
pub const TRIDENT2_MAX_BCM_PORTS_PER_CHIP: usize = 104;

/// Whether a singleton port resolves to the given base-map port.  Only
/// data-plane port types participate; management ports are configured
/// separately.
pub fn singleton_matches_bcm_port(
    singleton: &SingletonPort,
    port: &BcmPort,
) -> bool {
    port.port_type.is_data()
        && singleton.slot == port.slot
        && singleton.port == port.port
        && singleton.channel == port.channel
        && singleton.speed_bps == port.speed_bps
}

/// The channels a `(slot, port)` pair must carry for a given speed.
fn expected_channels_for_speed(speed_bps: u64) -> Option<&'static [i32]> {
    match speed_bps {
        s if s == HUNDRED_GIG_BPS => Some(&[0]),
        s if s == FORTY_GIG_BPS => Some(&[0]),
        s if s == FIFTY_GIG_BPS => Some(&[1, 2]),
        s if s == TWENTY_GIG_BPS => Some(&[1, 2]),
        s if s == TWENTY_FIVE_GIG_BPS => Some(&[1, 2, 3, 4]),
        s if s == TEN_GIG_BPS => Some(&[1, 2, 3, 4]),
        _ => None,
    }
}

/// The per-lane speed a flex port falls back to when fully channelized.
fn flex_min_speed(chip_type: BcmChipType) -> HalResult<u64> {
    match chip_type {
        BcmChipType::Tomahawk => Ok(TWENTY_FIVE_GIG_BPS),
        BcmChipType::Trident2 => Ok(TEN_GIG_BPS),
        other => Err(Status::internal(format!(
            "un-supported BCM chip type for flex port: {other}"
        ))),
    }
}

fn supported_chip_types(
    platform: Platform,
) -> BTreeSet<BcmChipType> {
    let mut set = BTreeSet::new();
    match platform {
        Platform::GenericTridentPlus => {
            set.insert(BcmChipType::TridentPlus);
        }
        Platform::GenericTrident2 => {
            set.insert(BcmChipType::Trident2);
        }
        Platform::GenericTomahawk => {
            set.insert(BcmChipType::Tomahawk);
        }
    }
    set
}

/// Overwrite the slot of every chip and port in `base` with the single
/// slot value the config agrees on.  Mixing slots under `auto_add_slot`
/// is rejected.
fn populate_slot_from_config(
    config: &ChassisConfig,
    base: &mut BcmChassisMap,
) -> HalResult<()> {
    let mut slots = BTreeSet::new();
    for node in &config.nodes {
        slots.insert(node.slot);
    }
    for singleton in &config.singleton_ports {
        slots.insert(singleton.slot);
    }
    if slots.len() != 1 {
        return Err(Status::internal(format!(
            "cannot support a case where auto_add_slot is true and {} \
             different slot numbers appear in the config",
            slots.len()
        )));
    }
    let slot = *slots.iter().next().unwrap();
    for chip in &mut base.bcm_chips {
        chip.slot = slot;
    }
    for port in &mut base.bcm_ports {
        port.slot = slot;
    }
    Ok(())
}

/// Resolve `config` against `base_map`, producing the slot-populated base
/// and the validated, expanded applied map.  Pure: no side effects, and
/// resolving the same inputs twice yields identical outputs.
pub fn generate_chassis_map_from_config(
    config: &ChassisConfig,
    base_map: &BcmChassisMap,
) -> HalResult<(BcmChassisMap, BcmChassisMap)> {
    let mut base = base_map.clone();
    if base.auto_add_slot {
        populate_slot_from_config(config, &mut base)?;
    }

    let platform = config.platform.ok_or_else(|| {
        Status::internal("config needs a chassis platform")
    })?;
    let supported_types = supported_chip_types(platform);

    let mut applied = BcmChassisMap {
        id: base.id.clone(),
        auto_add_slot: base.auto_add_slot,
        auto_add_logical_ports: base.auto_add_logical_ports,
        bcm_chassis: base.bcm_chassis.clone(),
        bcm_chips: Vec::new(),
        bcm_ports: Vec::new(),
    };

    // Validate the nodes and seed the node -> unit binding.
    let mut node_to_unit: BTreeMap<u64, Option<i32>> = BTreeMap::new();
    for node in &config.nodes {
        if node.slot <= 0 {
            return Err(Status::internal(format!(
                "no positive slot in node {node}"
            )));
        }
        if node.id == 0 {
            return Err(Status::internal(format!(
                "no positive ID in node {node}"
            )));
        }
        if node_to_unit.insert(node.id, None).is_some() {
            return Err(Status::internal(format!(
                "the id for node {node} was already recorded for another \
                 node in the config"
            )));
        }
    }

    // Walk the singleton ports.  Non-flex ports are copied into the
    // applied map as they match; flex ports only record their
    // (slot, port) pair here and are expanded below.
    let mut port_ids = BTreeSet::new();
    let mut seen_keys = BTreeSet::new();
    let mut flex_groups = BTreeSet::new();
    let mut group_channels: BTreeMap<(i32, i32), BTreeSet<i32>> =
        BTreeMap::new();
    let mut group_speeds: BTreeMap<(i32, i32), BTreeSet<u64>> =
        BTreeMap::new();
    let mut group_internal: BTreeMap<(i32, i32), BTreeSet<bool>> =
        BTreeMap::new();
    for singleton in &config.singleton_ports {
        if singleton.id == 0 {
            return Err(Status::internal(format!(
                "no positive ID in {singleton}"
            )));
        }
        if singleton.id == CPU_PORT_ID {
            return Err(Status::internal(format!(
                "{singleton} has the reserved CPU port ID ({CPU_PORT_ID})"
            )));
        }
        if !port_ids.insert(singleton.id) {
            return Err(Status::internal(format!(
                "the id for {singleton} was already recorded for another \
                 singleton port in the config"
            )));
        }
        if singleton.slot <= 0 {
            return Err(Status::internal(format!(
                "no valid slot in {singleton}"
            )));
        }
        if singleton.port <= 0 {
            return Err(Status::internal(format!(
                "no valid port in {singleton}"
            )));
        }
        if singleton.speed_bps == 0 {
            return Err(Status::internal(format!(
                "no valid speed_bps in {singleton}"
            )));
        }
        let key = PortKey::new(
            singleton.slot,
            singleton.port,
            singleton.channel,
        );
        if seen_keys.contains(&key) {
            return Err(Status::internal(format!(
                "the (slot, port, channel) tuple for {singleton} was \
                 already recorded for another singleton port in the config"
            )));
        }
        if singleton.node == 0 {
            return Err(Status::internal(format!(
                "no valid node ID in {singleton}"
            )));
        }
        if !node_to_unit.contains_key(&singleton.node) {
            return Err(Status::internal(format!(
                "node ID {} given for {singleton} has not been given to \
                 any node in the config",
                singleton.node
            )));
        }

        let group = key.group();
        let mut found = false;
        for port in &base.bcm_ports {
            if !singleton_matches_bcm_port(singleton, port) {
                continue;
            }
            if port.flex_port {
                flex_groups.insert(group);
            } else {
                // All channels of a front-panel port are either flex or
                // non-flex; a mix is invalid.
                if flex_groups.contains(&group) {
                    return Err(Status::internal(format!(
                        "the (slot, port) pair for the non-flex {singleton} \
                         was already recorded as flex"
                    )));
                }
                applied.bcm_ports.push(port.clone());
            }
            let bound = node_to_unit.get_mut(&singleton.node).unwrap();
            match *bound {
                None => *bound = Some(port.unit),
                Some(unit) if unit != port.unit => {
                    return Err(Status::internal(format!(
                        "inconsistent config: {singleton} has node ID {} \
                         previously attached to unit {unit}, but the \
                         chassis map suggests unit {}",
                        singleton.node, port.unit
                    )));
                }
                Some(_) => {}
            }
            found = true;
            seen_keys.insert(key);
            group_internal.entry(group).or_default().insert(port.internal);
            break;
        }
        if !found {
            return Err(Status::internal(format!(
                "could not find any BCM port in the base chassis map whose \
                 (slot, port, channel, speed_bps) tuple matches {singleton}"
            )));
        }
        group_channels.entry(group).or_default().insert(singleton.channel);
        group_speeds.entry(group).or_default().insert(singleton.speed_bps);
    }

    // Emit the chip for every node that bound to a unit; its type must be
    // supported on this platform.  Nodes with no ports are skipped.
    for unit in node_to_unit.values().filter_map(|u| *u) {
        let chip = base
            .bcm_chips
            .iter()
            .find(|c| c.unit == unit)
            .ok_or_else(|| {
                Status::internal(format!(
                    "could not find any BCM chip for unit {unit} in the \
                     base chassis map"
                ))
            })?;
        if !supported_types.contains(&chip.chip_type) {
            return Err(Status::internal(format!(
                "chip type {} is not supported on platform {platform}",
                chip.chip_type
            )));
        }
        applied.bcm_chips.push(chip.clone());
    }

    // Every channel under one (slot, port) is backplane or front-panel,
    // never both.
    for (group, internal) in &group_internal {
        if internal.len() != 1 {
            return Err(Status::internal(format!(
                "singleton ports with (slot, port) = ({}, {}) are both \
                 internal and external",
                group.0, group.1
            )));
        }
    }

    // One speed per (slot, port), and exactly the channel set that speed
    // requires.
    for (group, speeds) in &group_speeds {
        if speeds.len() != 1 {
            return Err(Status::internal(format!(
                "singleton ports with (slot, port) = ({}, {}) have {} \
                 different speed_bps",
                group.0,
                group.1,
                speeds.len()
            )));
        }
        let speed_bps = *speeds.iter().next().unwrap();
        let expected = expected_channels_for_speed(speed_bps)
            .ok_or_else(|| {
                Status::internal(format!(
                    "unsupported speed_bps: {speed_bps}"
                ))
            })?;
        let expected: BTreeSet<i32> = expected.iter().copied().collect();
        if group_channels[group] != expected {
            return Err(Status::internal(format!(
                "singleton ports with (slot, port) = ({}, {}) and \
                 speed_bps = {speed_bps} have invalid channels",
                group.0, group.1
            )));
        }
    }

    // Expand every flex (slot, port) to all four channels at the hosting
    // chip's minimum lane speed.
    for group in &flex_groups {
        let units: BTreeSet<i32> = base
            .bcm_ports
            .iter()
            .filter(|p| p.slot == group.0 && p.port == group.1)
            .map(|p| p.unit)
            .collect();
        if units.len() != 1 {
            return Err(Status::internal(format!(
                "ports with (slot, port) = ({}, {}) are on different chips",
                group.0, group.1
            )));
        }
        let unit = *units.iter().next().unwrap();
        let chip_type = base
            .bcm_chips
            .iter()
            .find(|c| c.unit == unit)
            .map(|c| c.chip_type)
            .unwrap_or(BcmChipType::Unknown);
        let min_speed_bps = flex_min_speed(chip_type)?;
        for channel in 1..=4 {
            let synthetic = SingletonPort {
                id: 0,
                slot: group.0,
                port: group.1,
                channel,
                speed_bps: min_speed_bps,
                node: 0,
            };
            let port = base
                .bcm_ports
                .iter()
                .find(|p| singleton_matches_bcm_port(&synthetic, p))
                .ok_or_else(|| {
                    Status::internal(format!(
                        "could not find any BCM port in the base chassis \
                         map whose (slot, port, channel, speed_bps) tuple \
                         matches flex {synthetic}"
                    ))
                })?;
            applied.bcm_ports.push(port.clone());
        }
    }

    // Per-unit key sets, used for the port-count ceiling and for logical
    // port assignment.
    let mut unit_to_keys: BTreeMap<i32, BTreeSet<PortKey>> = BTreeMap::new();
    for port in &applied.bcm_ports {
        unit_to_keys.entry(port.unit).or_default().insert(port.key());
    }
    for chip in &applied.bcm_chips {
        let count = unit_to_keys
            .get(&chip.unit)
            .map(|keys| keys.len())
            .unwrap_or(0);
        let max = match chip.chip_type {
            BcmChipType::Tomahawk => Some(TOMAHAWK_MAX_BCM_PORTS_PER_CHIP),
            BcmChipType::Trident2 => Some(TRIDENT2_MAX_BCM_PORTS_PER_CHIP),
            _ => None,
        };
        if let Some(max) = max {
            if count > max {
                return Err(Status::internal(format!(
                    "max number of BCM ports for a {} chip is {max}, but \
                     found {count} ports",
                    chip.chip_type
                )));
            }
        }
    }

    // Auto-assign logical ports: the 1-based index of the port's
    // (slot, port, channel) tuple in the sorted per-unit list.  Logical
    // port 0 is the CMIC port and is never assigned.
    if applied.auto_add_logical_ports {
        let mut ports = std::mem::take(&mut applied.bcm_ports);
        for port in &mut ports {
            let keys = &unit_to_keys[&port.unit];
            let idx =
                keys.iter().position(|k| *k == port.key()).ok_or_else(|| {
                    Status::internal(format!(
                        "invalid state: {} is not found on unit {}",
                        port.key(),
                        port.unit
                    ))
                })?;
            port.logical_port = (idx + 1) as i32;
        }
        applied.bcm_ports = ports;
    }

    // Post validation: physical, diag and logical ports are unique per
    // chip, with logical port 0 implicitly taken on every unit.
    let mut unit_to_physical: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
    let mut unit_to_diag: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
    let mut unit_to_logical: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
    for chip in &applied.bcm_chips {
        unit_to_logical.entry(chip.unit).or_default().insert(0);
    }
    for port in &applied.bcm_ports {
        if !unit_to_physical
            .entry(port.unit)
            .or_default()
            .insert(port.physical_port)
        {
            return Err(Status::internal(format!(
                "duplicate physical_port for unit {}: {}",
                port.unit, port.physical_port
            )));
        }
        if !unit_to_diag
            .entry(port.unit)
            .or_default()
            .insert(port.diag_port)
        {
            return Err(Status::internal(format!(
                "duplicate diag_port for unit {}: {}",
                port.unit, port.diag_port
            )));
        }
        if !unit_to_logical
            .entry(port.unit)
            .or_default()
            .insert(port.logical_port)
        {
            return Err(Status::internal(format!(
                "duplicate logical_port for unit {}: {}",
                port.unit, port.logical_port
            )));
        }
    }

    Ok((base, applied))
}

/// The node -> unit binding a config would produce against a base map,
/// with declared-but-portless nodes present and unbound.  Used by the
/// verify flow to detect bindings that changed since the first push.
pub fn node_id_to_unit_from_config(
    config: &ChassisConfig,
    base: &BcmChassisMap,
) -> BTreeMap<u64, Option<i32>> {
    let mut node_to_unit: BTreeMap<u64, Option<i32>> = BTreeMap::new();
    for node in &config.nodes {
        node_to_unit.insert(node.id, None);
    }
    for singleton in &config.singleton_ports {
        for port in &base.bcm_ports {
            if singleton_matches_bcm_port(singleton, port) {
                node_to_unit.insert(singleton.node, Some(port.unit));
                break;
            }
        }
    }
    node_to_unit
}

#[cfg(test)]
mod tests {
    use super::*;
    use bal::{BcmChip, BcmPortType};
    use common::chassis_config::Node;

    fn trident2_base() -> BcmChassisMap {
        BcmChassisMap {
            id: "generic_trident2".to_string(),
            auto_add_slot: true,
            auto_add_logical_ports: true,
            bcm_chassis: None,
            bcm_chips: vec![BcmChip {
                chip_type: BcmChipType::Trident2,
                unit: 0,
                ..Default::default()
            }],
            bcm_ports: vec![BcmPort {
                port_type: BcmPortType::Xe,
                port: 1,
                unit: 0,
                physical_port: 1,
                diag_port: 0,
                num_serdes_lanes: 4,
                speed_bps: FORTY_GIG_BPS,
                ..Default::default()
            }],
        }
    }

    fn minimal_config() -> ChassisConfig {
        ChassisConfig {
            platform: Some(Platform::GenericTrident2),
            bcm_chassis_map_id: String::new(),
            nodes: vec![Node { id: 100, slot: 5 }],
            singleton_ports: vec![SingletonPort {
                id: 1,
                slot: 5,
                port: 1,
                channel: 0,
                speed_bps: FORTY_GIG_BPS,
                node: 100,
            }],
        }
    }

    // A TOMAHAWK base map with one flex port at (slot 1, port 2): the
    // unchannelized 100G entry plus all the channelized lane entries.
    fn tomahawk_flex_base() -> BcmChassisMap {
        let mut ports = Vec::new();
        let template = BcmPort {
            port_type: BcmPortType::Ce,
            slot: 1,
            port: 2,
            unit: 0,
            flex_port: true,
            ..Default::default()
        };
        ports.push(BcmPort {
            channel: 0,
            physical_port: 1,
            diag_port: 0,
            num_serdes_lanes: 4,
            speed_bps: HUNDRED_GIG_BPS,
            ..template.clone()
        });
        for channel in 1..=4 {
            ports.push(BcmPort {
                channel,
                physical_port: channel,
                diag_port: channel,
                serdes_lane: channel - 1,
                num_serdes_lanes: 1,
                speed_bps: TWENTY_FIVE_GIG_BPS,
                ..template.clone()
            });
        }
        for channel in 1..=2 {
            ports.push(BcmPort {
                channel,
                physical_port: 4 + channel,
                diag_port: 4 + channel,
                serdes_lane: (channel - 1) * 2,
                num_serdes_lanes: 2,
                speed_bps: FIFTY_GIG_BPS,
                ..template.clone()
            });
        }
        BcmChassisMap {
            id: "generic_tomahawk".to_string(),
            auto_add_slot: false,
            auto_add_logical_ports: true,
            bcm_chassis: None,
            bcm_chips: vec![BcmChip {
                chip_type: BcmChipType::Tomahawk,
                slot: 1,
                unit: 0,
                ..Default::default()
            }],
            bcm_ports: ports,
        }
    }

    fn tomahawk_flex_config(channel_speed: u64) -> ChassisConfig {
        let channels: &[i32] = match channel_speed {
            s if s == TWENTY_FIVE_GIG_BPS => &[1, 2, 3, 4],
            s if s == FIFTY_GIG_BPS => &[1, 2],
            _ => panic!("unexpected flex speed"),
        };
        ChassisConfig {
            platform: Some(Platform::GenericTomahawk),
            bcm_chassis_map_id: String::new(),
            nodes: vec![Node { id: 7, slot: 1 }],
            singleton_ports: channels
                .iter()
                .map(|channel| SingletonPort {
                    id: *channel as u64,
                    slot: 1,
                    port: 2,
                    channel: *channel,
                    speed_bps: channel_speed,
                    node: 7,
                })
                .collect(),
        }
    }

    #[test]
    fn test_minimal_resolution() {
        let (base, applied) =
            generate_chassis_map_from_config(&minimal_config(), &trident2_base())
                .unwrap();
        // Slot auto-population rewrote the base.
        assert_eq!(base.bcm_chips[0].slot, 5);
        assert_eq!(base.bcm_ports[0].slot, 5);
        assert_eq!(applied.bcm_chips.len(), 1);
        assert_eq!(applied.bcm_chips[0].slot, 5);
        assert_eq!(applied.bcm_ports.len(), 1);
        assert_eq!(applied.bcm_ports[0].slot, 5);
        assert_eq!(applied.bcm_ports[0].logical_port, 1);
    }

    #[test]
    fn test_resolution_is_pure() {
        let config = minimal_config();
        let base = trident2_base();
        let first = generate_chassis_map_from_config(&config, &base).unwrap();
        let second = generate_chassis_map_from_config(&config, &base).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mixed_slots_rejected() {
        let mut config = minimal_config();
        config.nodes.push(Node { id: 200, slot: 6 });
        let err =
            generate_chassis_map_from_config(&config, &trident2_base())
                .unwrap_err();
        assert!(err.message().contains("auto_add_slot"));
    }

    #[test]
    fn test_duplicate_port_id_rejected() {
        let mut config = minimal_config();
        let mut dup = config.singleton_ports[0].clone();
        dup.channel = 1;
        config.singleton_ports.push(dup);
        let err =
            generate_chassis_map_from_config(&config, &trident2_base())
                .unwrap_err();
        assert_eq!(
            err.error_code(),
            Some(common::status::ErrorCode::Internal)
        );
        assert!(err.message().contains("already recorded"));
    }

    #[test]
    fn test_cpu_port_id_rejected() {
        let mut config = minimal_config();
        config.singleton_ports[0].id = CPU_PORT_ID;
        assert!(
            generate_chassis_map_from_config(&config, &trident2_base())
                .is_err()
        );
    }

    #[test]
    fn test_unknown_node_rejected() {
        let mut config = minimal_config();
        config.singleton_ports[0].node = 999;
        let err =
            generate_chassis_map_from_config(&config, &trident2_base())
                .unwrap_err();
        assert!(err.message().contains("has not been given to any node"));
    }

    #[test]
    fn test_wrong_platform_rejected() {
        let mut config = minimal_config();
        config.platform = Some(Platform::GenericTomahawk);
        let err =
            generate_chassis_map_from_config(&config, &trident2_base())
                .unwrap_err();
        assert!(err.message().contains("not supported on platform"));
    }

    #[test]
    fn test_bad_channel_set_rejected() {
        // 40G requires channel 0 alone; channel 1 is invalid.
        let mut config = minimal_config();
        config.singleton_ports[0].channel = 1;
        assert!(
            generate_chassis_map_from_config(&config, &trident2_base())
                .is_err()
        );
    }

    #[test]
    fn test_flex_expansion() {
        let base = tomahawk_flex_base();
        // Configure the pair as 2x50G; the applied map still carries the
        // four 25G lanes.
        let (_, applied) = generate_chassis_map_from_config(
            &tomahawk_flex_config(FIFTY_GIG_BPS),
            &base,
        )
        .unwrap();
        assert_eq!(applied.bcm_ports.len(), 4);
        for (i, port) in applied.bcm_ports.iter().enumerate() {
            assert_eq!(port.channel, (i + 1) as i32);
            assert_eq!(port.speed_bps, TWENTY_FIVE_GIG_BPS);
            assert!(port.flex_port);
            assert_eq!(port.logical_port, (i + 1) as i32);
        }
        // The 4x25G rendering of the same pair resolves to the same
        // applied ports.
        let (_, applied_25) = generate_chassis_map_from_config(
            &tomahawk_flex_config(TWENTY_FIVE_GIG_BPS),
            &base,
        )
        .unwrap();
        assert_eq!(applied.bcm_ports, applied_25.bcm_ports);
    }

    #[test]
    fn test_flex_on_unsupported_chip_rejected() {
        let mut base = tomahawk_flex_base();
        base.bcm_chips[0].chip_type = BcmChipType::TridentPlus;
        let mut config = tomahawk_flex_config(TWENTY_FIVE_GIG_BPS);
        config.platform = Some(Platform::GenericTridentPlus);
        let err =
            generate_chassis_map_from_config(&config, &base).unwrap_err();
        assert!(err.message().contains("flex"));
    }

    #[test]
    fn test_port_cap_enforced() {
        // 33 front-panel ports, each fully channelized to 4x25G, puts 132
        // ports on one TOMAHAWK; the cap is 128.
        let mut base = tomahawk_flex_base();
        base.bcm_ports.clear();
        let mut config = ChassisConfig {
            platform: Some(Platform::GenericTomahawk),
            bcm_chassis_map_id: String::new(),
            nodes: vec![Node { id: 1, slot: 1 }],
            singleton_ports: Vec::new(),
        };
        let mut next_id = 1;
        for port in 1..=33 {
            for channel in 1..=4 {
                base.bcm_ports.push(BcmPort {
                    port_type: BcmPortType::Ce,
                    slot: 1,
                    port,
                    channel,
                    unit: 0,
                    physical_port: (port - 1) * 4 + channel,
                    diag_port: (port - 1) * 4 + channel,
                    serdes_lane: channel - 1,
                    num_serdes_lanes: 1,
                    speed_bps: TWENTY_FIVE_GIG_BPS,
                    ..Default::default()
                });
                config.singleton_ports.push(SingletonPort {
                    id: next_id,
                    slot: 1,
                    port,
                    channel,
                    speed_bps: TWENTY_FIVE_GIG_BPS,
                    node: 1,
                });
                next_id += 1;
            }
        }
        let err =
            generate_chassis_map_from_config(&config, &base).unwrap_err();
        assert!(err.message().contains("max number of BCM ports"));
    }

    #[test]
    fn test_logical_port_assignment_is_sorted_index() {
        let mut base = trident2_base();
        // A second 40G port with a lower (slot, port, channel) ordering.
        base.bcm_ports.push(BcmPort {
            port_type: BcmPortType::Xe,
            port: 2,
            unit: 0,
            physical_port: 5,
            diag_port: 1,
            num_serdes_lanes: 4,
            speed_bps: FORTY_GIG_BPS,
            ..Default::default()
        });
        let mut config = minimal_config();
        config.singleton_ports.push(SingletonPort {
            id: 2,
            slot: 5,
            port: 2,
            channel: 0,
            speed_bps: FORTY_GIG_BPS,
            node: 100,
        });
        // Config order is port 2 before port 1; logical assignment follows
        // tuple order, not config order.
        config.singleton_ports.reverse();
        let (_, applied) =
            generate_chassis_map_from_config(&config, &base).unwrap();
        for port in &applied.bcm_ports {
            let expected = port.port; // port 1 -> logical 1, port 2 -> logical 2
            assert_eq!(port.logical_port, expected);
            assert_ne!(port.logical_port, 0);
        }
    }

    #[test]
    fn test_node_binding_recomputation() {
        let config = minimal_config();
        let (base, _) =
            generate_chassis_map_from_config(&config, &trident2_base())
                .unwrap();
        let binding = node_id_to_unit_from_config(&config, &base);
        assert_eq!(binding.get(&100), Some(&Some(0)));

        // A port-less node stays declared but unbound.
        let mut config = config;
        config.nodes.push(Node { id: 200, slot: 5 });
        let binding = node_id_to_unit_from_config(&config, &base);
        assert_eq!(binding.get(&200), Some(&None));
    }
}
