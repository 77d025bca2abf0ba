// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Port identity and port-state types.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Identifies one channel of one front-panel port.  `channel` 0 means the
/// port is unchannelized; 1..4 name one of the four lanes of a channelized
/// port.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct PortKey {
    pub slot: i32,
    pub port: i32,
    pub channel: i32,
}

impl PortKey {
    pub fn new(slot: i32, port: i32, channel: i32) -> Self {
        PortKey { slot, port, channel }
    }

    /// The `(slot, port)` pair naming this port's group.
    pub fn group(&self) -> (i32, i32) {
        (self.slot, self.port)
    }
}

impl fmt::Display for PortKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.slot, self.port, self.channel)
    }
}

/// The state of the data link on a configured port.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum LinkState {
    Unknown,
    Up,
    Down,
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkState::Unknown => write!(f, "Unknown"),
            LinkState::Up => write!(f, "Up"),
            LinkState::Down => write!(f, "Down"),
            LinkState::Failed => write!(f, "Failed"),
        }
    }
}

/// Readiness of the transceiver module behind a front-panel port group.
///
/// External ports start `Unknown` and move to `Present` on an insertion
/// event, then to `Ready` once the port group has been configured.
/// Internal (backplane) ports never see an insertion event; they start
/// `Present` and become `Ready` after the first configuration pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransceiverState {
    Unknown,
    NotPresent,
    Present,
    Ready,
}

impl fmt::Display for TransceiverState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransceiverState::Unknown => write!(f, "Unknown"),
            TransceiverState::NotPresent => write!(f, "NotPresent"),
            TransceiverState::Present => write!(f, "Present"),
            TransceiverState::Ready => write!(f, "Ready"),
        }
    }
}

/// Events published to the northbound notification writer.
#[derive(Clone, Debug, PartialEq)]
pub enum GnmiEvent {
    /// The operational state of a singleton port changed.
    PortOperStateChanged {
        node_id: u64,
        port_id: u64,
        state: LinkState,
    },
}
