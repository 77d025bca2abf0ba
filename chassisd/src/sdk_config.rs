// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Rendering of the applied chassis map into the line-oriented key/value
//! config file the SDK loads at initialization.  The output is fully
//! deterministic: property order follows the applied map, and the per-unit
//! port bitmaps are emitted in ascending unit order.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use bal::{BcmChassisMap, BcmChipType, BcmPort, BcmPortType};
use common::chassis_config::OperationMode;
use common::status::{HalResult, Status};
use common::{
    BITS_PER_GIGABIT, FIFTY_GIG_BPS, FORTY_GIG_BPS, HUNDRED_GIG_BPS,
    TEN_GIG_BPS, TWENTY_FIVE_GIG_BPS, TWENTY_GIG_BPS,
};

// Logical ports address bits in a three-word bitmap.
const MAX_LOGICAL_PORT: i32 = 3 * 64;

/// The speed the SDK config assigns to each channel of a flex port.  The
/// channelized lane layout is asymmetric: channel 1 can carry the full
/// port, channel 3 can carry half, and channels 2 and 4 carry single
/// lanes.
fn flex_channel_speed(
    chip_type: BcmChipType,
    channel: i32,
) -> HalResult<u64> {
    let speed = match (chip_type, channel) {
        (BcmChipType::Tomahawk, 1) => HUNDRED_GIG_BPS,
        (BcmChipType::Tomahawk, 2) => TWENTY_FIVE_GIG_BPS,
        (BcmChipType::Tomahawk, 3) => FIFTY_GIG_BPS,
        (BcmChipType::Tomahawk, 4) => TWENTY_FIVE_GIG_BPS,
        (BcmChipType::Trident2, 1) => FORTY_GIG_BPS,
        (BcmChipType::Trident2, 2) => TEN_GIG_BPS,
        (BcmChipType::Trident2, 3) => TWENTY_GIG_BPS,
        (BcmChipType::Trident2, 4) => TEN_GIG_BPS,
        (BcmChipType::Tomahawk | BcmChipType::Trident2, _) => {
            return Err(Status::internal(format!(
                "flex port with invalid channel {channel}"
            )));
        }
        (other, _) => {
            return Err(Status::internal(format!(
                "un-supported BCM chip type for flex port: {other}"
            )));
        }
    };
    Ok(speed)
}

fn port_config_speed(
    port: &BcmPort,
    unit_to_chip_type: &BTreeMap<i32, BcmChipType>,
) -> HalResult<u64> {
    match port.port_type {
        BcmPortType::Xe | BcmPortType::Ce => {
            if port.flex_port {
                let chip_type = unit_to_chip_type
                    .get(&port.unit)
                    .copied()
                    .unwrap_or(BcmChipType::Unknown);
                flex_channel_speed(chip_type, port.channel)
            } else {
                Ok(port.speed_bps)
            }
        }
        BcmPortType::Mgmt => {
            if port.flex_port {
                return Err(Status::internal("mgmt ports cannot be flex"));
            }
            Ok(port.speed_bps)
        }
        BcmPortType::Unknown => Err(Status::internal(format!(
            "un-supported BCM port type in {port}"
        ))),
    }
}

/// Render the SDK config file contents for the applied map.  `base` only
/// bounds the unit space; everything emitted comes from `applied`.
pub fn generate_sdk_config(
    base: &BcmChassisMap,
    applied: &BcmChassisMap,
    mode: OperationMode,
) -> HalResult<String> {
    let mut buffer = String::new();
    let max_units = base.bcm_chips.len();

    // Chassis-level SDK properties, plus the DMA disables in sim mode.
    if let Some(chassis) = &applied.bcm_chassis {
        for property in &chassis.sdk_properties {
            buffer.push_str(property);
            buffer.push('\n');
        }
        if mode == OperationMode::Sim {
            buffer.push_str("tdma_intr_enable=0\n");
            buffer.push_str("tslam_dma_enable=0\n");
            buffer.push_str("table_dma_enable=0\n");
        }
        buffer.push('\n');
    }

    // Chip-level SDK properties.
    let mut oversubscribed: BTreeMap<i32, bool> = BTreeMap::new();
    let mut unit_to_chip_type: BTreeMap<i32, BcmChipType> = BTreeMap::new();
    for chip in &applied.bcm_chips {
        if !chip.sdk_properties.is_empty() {
            for property in &chip.sdk_properties {
                buffer.push_str(property);
                buffer.push('\n');
            }
            buffer.push('\n');
        }
        oversubscribed.insert(chip.unit, chip.is_oversubscribed);
        unit_to_chip_type.insert(chip.unit, chip.chip_type);
    }

    // XE port bitmaps: bit i set iff logical port i is a data port.  The
    // bitmap spans up to three 64-bit words, concatenated big-end first
    // with the lower words zero-padded to full width.
    let mut masks: BTreeMap<i32, [u64; 3]> = BTreeMap::new();
    for port in &applied.bcm_ports {
        if !port.port_type.is_data() {
            continue;
        }
        let idx = port.logical_port;
        if !(0..MAX_LOGICAL_PORT).contains(&idx) {
            return Err(Status::internal(format!(
                "logical port out of bitmap range in {port}"
            )));
        }
        let words = masks.entry(port.unit).or_insert([0; 3]);
        words[(idx / 64) as usize] |= 1u64 << (idx % 64);
    }
    for unit in 0..max_units as i32 {
        let Some([m0, m1, m2]) = masks.get(&unit).copied() else {
            continue;
        };
        if m0 == 0 && m1 == 0 && m2 == 0 {
            continue;
        }
        let mask = if m2 != 0 {
            format!("{m2:X}{m1:016X}{m0:016X}")
        } else if m1 != 0 {
            format!("{m1:X}{m0:016X}")
        } else {
            format!("{m0:X}")
        };
        writeln!(buffer, "pbmp_xport_xe.{unit}=0x{mask}").unwrap();
        if oversubscribed.get(&unit).copied().unwrap_or(false) {
            writeln!(buffer, "pbmp_oversubscribe.{unit}=0x{mask}").unwrap();
        }
    }
    buffer.push('\n');

    // Per-port properties.
    for port in &applied.bcm_ports {
        let speed_bps = port_config_speed(port, &unit_to_chip_type)?;
        write!(
            buffer,
            "portmap_{}.{}={}:{}",
            port.logical_port,
            port.unit,
            port.physical_port,
            speed_bps / BITS_PER_GIGABIT
        )
        .unwrap();
        if port.flex_port && port.serdes_lane != 0 {
            buffer.push_str(":i");
        }
        buffer.push('\n');
        writeln!(
            buffer,
            "dport_map_port_{}.{}={}",
            port.logical_port, port.unit, port.diag_port
        )
        .unwrap();
        if port.tx_lane_map > 0 {
            writeln!(
                buffer,
                "xgxs_tx_lane_map_xe{}.{}=0x{:X}",
                port.diag_port, port.unit, port.tx_lane_map
            )
            .unwrap();
        }
        if port.rx_lane_map > 0 {
            writeln!(
                buffer,
                "xgxs_rx_lane_map_xe{}.{}=0x{:X}",
                port.diag_port, port.unit, port.rx_lane_map
            )
            .unwrap();
        }
        if port.tx_polarity_flip > 0 {
            writeln!(
                buffer,
                "phy_xaui_tx_polarity_flip_xe{}.{}=0x{:X}",
                port.diag_port, port.unit, port.tx_polarity_flip
            )
            .unwrap();
        }
        if port.rx_polarity_flip > 0 {
            writeln!(
                buffer,
                "phy_xaui_rx_polarity_flip_xe{}.{}=0x{:X}",
                port.diag_port, port.unit, port.rx_polarity_flip
            )
            .unwrap();
        }
        for property in &port.sdk_properties {
            buffer.push_str(property);
            buffer.push('\n');
        }
        buffer.push('\n');
    }

    Ok(buffer)
}

/// Render and persist the SDK config file.
pub fn write_sdk_config_file(
    base: &BcmChassisMap,
    applied: &BcmChassisMap,
    mode: OperationMode,
    path: &Path,
) -> HalResult<()> {
    let contents = generate_sdk_config(base, applied, mode)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}
