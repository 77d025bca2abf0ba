// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Types shared across the chassis-management daemon and the Broadcom
//! abstraction layer.

pub mod chassis_config;
pub mod logging;
pub mod ports;
pub mod status;

/// Reserved ID of the in-band CPU port.  The CPU port is configured
/// separately from the singleton ports and its ID may never be assigned to
/// one of them.
pub const CPU_PORT_ID: u64 = 0xFFFF_FFFD;

pub const BITS_PER_GIGABIT: u64 = 1_000_000_000;

pub const TEN_GIG_BPS: u64 = 10 * BITS_PER_GIGABIT;
pub const TWENTY_GIG_BPS: u64 = 20 * BITS_PER_GIGABIT;
pub const TWENTY_FIVE_GIG_BPS: u64 = 25 * BITS_PER_GIGABIT;
pub const FORTY_GIG_BPS: u64 = 40 * BITS_PER_GIGABIT;
pub const FIFTY_GIG_BPS: u64 = 50 * BITS_PER_GIGABIT;
pub const HUNDRED_GIG_BPS: u64 = 100 * BITS_PER_GIGABIT;
