// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The chassis-management core of the switch HAL: resolves declarative
//! chassis configs onto BCM silicon, drives SDK bring-up, and keeps the
//! applied mapping synchronized with linkscan and transceiver events.

pub mod base_map;
pub mod config;
pub mod manager;
pub mod resolver;
pub mod sdk_config;
pub mod serdes_db;
pub mod sim;
