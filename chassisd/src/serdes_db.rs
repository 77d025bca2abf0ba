// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The file-backed serdes settings database.
//!
//! Entries are keyed by the identity of the transceiver module (media
//! type, optionally a vendor part number) and the port speed; the most
//! specific matching entry supplies the lane settings pushed to the SDK
//! when a port group is enabled.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use bal::{
    BalError, BalResult, BcmPort, FrontPanelPortInfo, MediaType, SerdesDb,
    SerdesLaneConfig,
};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
struct SerdesDbEntry {
    media_type: MediaType,
    /// Empty matches any part.
    #[serde(default)]
    part_number: String,
    /// 0 matches any speed.
    #[serde(default)]
    speed_bps: u64,
    #[serde(default)]
    intf_type: String,
    /// Register number (decimal or 0x-prefixed hex) to value.
    #[serde(default)]
    register_configs: BTreeMap<String, u32>,
    #[serde(default)]
    attribute_configs: BTreeMap<String, u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SerdesDbFile {
    #[serde(default)]
    entries: Vec<SerdesDbEntry>,
}

/// Serdes database backed by a TOML file, loaded once at the first config
/// push in standalone mode.
pub struct BcmSerdesDbManager {
    path: PathBuf,
    db: Mutex<Option<Vec<SerdesDbEntry>>>,
}

impl BcmSerdesDbManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        BcmSerdesDbManager { path: path.into(), db: Mutex::new(None) }
    }
}

fn parse_register(key: &str) -> BalResult<u32> {
    let parsed = match key.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => key.parse(),
    };
    parsed.map_err(|_| {
        BalError::InvalidArg(format!("invalid serdes register number: {key}"))
    })
}

impl SerdesDb for BcmSerdesDbManager {
    fn load(&self) -> BalResult<()> {
        let text =
            std::fs::read_to_string(&self.path).map_err(|err| BalError::Io {
                ctx: format!("reading serdes db {}", self.path.display()),
                err,
            })?;
        let file: SerdesDbFile = toml::from_str(&text).map_err(|e| {
            BalError::InvalidArg(format!(
                "failed to parse serdes db {}: {e}",
                self.path.display()
            ))
        })?;
        // Validate the register keys up front so a bad entry fails the
        // load, not a later lookup.
        for entry in &file.entries {
            for key in entry.register_configs.keys() {
                parse_register(key)?;
            }
        }
        *self.db.lock().unwrap() = Some(file.entries);
        Ok(())
    }

    fn lookup_serdes_config_for_port(
        &self,
        port: &BcmPort,
        fp_info: &FrontPanelPortInfo,
    ) -> BalResult<SerdesLaneConfig> {
        let db = self.db.lock().unwrap();
        let entries = db.as_ref().ok_or_else(|| {
            BalError::Uninitialized("serdes db not loaded".to_string())
        })?;
        let entry = entries
            .iter()
            .find(|e| {
                e.media_type == fp_info.media_type
                    && (e.part_number.is_empty()
                        || e.part_number == fp_info.part_number)
                    && (e.speed_bps == 0 || e.speed_bps == port.speed_bps)
            })
            .ok_or_else(|| {
                BalError::Missing(format!(
                    "no serdes db entry for media {:?}, part '{}', \
                     speed {}G",
                    fp_info.media_type,
                    fp_info.part_number,
                    port.speed_bps / common::BITS_PER_GIGABIT
                ))
            })?;
        let mut register_configs = BTreeMap::new();
        for (key, value) in &entry.register_configs {
            register_configs.insert(parse_register(key)?, *value);
        }
        Ok(SerdesLaneConfig {
            intf_type: entry.intf_type.clone(),
            register_configs,
            attribute_configs: entry.attribute_configs.clone(),
        })
    }
}
