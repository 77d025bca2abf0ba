// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The Broadcom abstraction layer: the trait boundary between the chassis
//! manager and the SDK, physical-layer (PHAL), and serdes-database
//! backends it drives.  Everything hardware-shaped the manager consumes is
//! declared here; the backends (real SDK bindings, simulators) live
//! elsewhere and implement these traits.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tokio::sync::mpsc;

use common::ports::{LinkState, TransceiverState};

mod chassis_map;
pub use chassis_map::*;

/// A specialized Result type for SDK/PHAL operations.
pub type BalResult<T> = Result<T, BalError>;

/// Identifies a registered event writer.  Returned by the registration
/// calls and required to unregister.
pub type WriterId = i32;

/// Linkscan event writers register at this priority.
pub const LINKSCAN_WRITER_PRIORITY_HIGH: i32 = 100;

/// Transceiver event writers register at this priority.
pub const TRANSCEIVER_WRITER_PRIORITY_HIGH: i32 = 100;

/// Error type conveying additional information about SDK and PHAL errors.
#[derive(Error, Debug)]
pub enum BalError {
    /// Error reported by the BCM SDK.  Carries both the location in the
    /// abstraction layer that detected the error and the detailed message
    /// from the SDK.
    #[error("SDK error at {ctx}: {err}")]
    SdkError { ctx: String, err: String },
    /// An argument passed to the layer is invalid or inappropriate.
    #[error("Invalid argument: {}", .0)]
    InvalidArg(String),
    /// A function was called before the layer was initialized.
    #[error("SDK layer uninitialized: {}", .0)]
    Uninitialized(String),
    /// A caller is trying to modify something that is not present.
    #[error("Missing: {}", .0)]
    Missing(String),
    /// A caller is trying to create something that already exists.
    #[error("Already exists: {}", .0)]
    Exists(String),
    /// The layer encountered an error interacting with the file system.
    #[error("IO error: {ctx}: {err}")]
    Io { ctx: String, err: std::io::Error },
    /// The layer detected some internal inconsistency.
    #[error("Internal error: {}", .0)]
    Internal(String),
}

impl From<BalError> for common::status::Status {
    fn from(err: BalError) -> Self {
        use common::status::{ErrorCode, Status, BAL_ERROR_SPACE};
        let code = match &err {
            BalError::InvalidArg(_) => ErrorCode::InvalidParam,
            BalError::Missing(_) => ErrorCode::EntryNotFound,
            BalError::Uninitialized(_) => ErrorCode::NotInitialized,
            _ => ErrorCode::Internal,
        };
        Status::new(BAL_ERROR_SPACE, code, err.to_string())
    }
}

/// A link-state change reported by the SDK's linkscan machinery.
#[derive(Clone, Copy, Debug)]
pub struct LinkscanEvent {
    pub unit: i32,
    pub logical_port: i32,
    pub state: LinkState,
}

/// A transceiver insertion/removal reported by the physical layer.
#[derive(Clone, Copy, Debug)]
pub struct TransceiverEvent {
    pub slot: i32,
    pub port: i32,
    pub state: TransceiverState,
}

/// Per-port settings applied through the SDK.  Every field is optional:
/// `None` leaves the corresponding hardware setting untouched, mirroring
/// the tri-state nature of the underlying SDK calls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortOptions {
    pub enabled: Option<bool>,
    pub blocked: Option<bool>,
    pub speed_bps: Option<u64>,
    pub num_serdes_lanes: Option<i32>,
}

/// Information about the front-panel module behind a port group, read and
/// parsed from the transceiver EEPROM by the physical layer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrontPanelPortInfo {
    pub media_type: MediaType,
    pub vendor_name: String,
    pub part_number: String,
    pub serial_number: String,
}

/// The kind of media plugged into (or wired to) a front-panel cage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Unknown,
    Sfp,
    QsfpCopper,
    QsfpOptical,
    Backplane,
}

/// The serdes settings for one lane group, looked up from the serdes
/// database keyed by the front-panel module identity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SerdesLaneConfig {
    /// SDK interface type string (e.g. `sr4`, `kr4`).
    pub intf_type: String,
    /// Raw serdes register writes, register number to value.
    pub register_configs: BTreeMap<u32, u32>,
    /// Named serdes attribute writes.
    pub attribute_configs: BTreeMap<String, u32>,
}

/// The subset of the BCM SDK the chassis manager drives.
///
/// Implementations are expected to be thread-safe; the manager calls these
/// methods while holding its chassis lock.
pub trait SdkOps: Send + Sync {
    /// Initialize the SDK runtime from a generated config file.
    fn initialize_sdk(
        &self,
        config_file: &Path,
        config_flush_file: &Path,
        shell_log_file: &Path,
    ) -> BalResult<()>;

    /// Locate a chip on the PCI bus and bind it to `unit`.
    fn find_unit(
        &self,
        unit: i32,
        pci_bus: i32,
        pci_slot: i32,
        chip_type: BcmChipType,
    ) -> BalResult<()>;

    /// Cold- or warm-initialize an attached unit.
    fn initialize_unit(&self, unit: i32, warm_boot: bool) -> BalResult<()>;

    /// Set the module ID used for inter-chip forwarding on this unit.
    fn set_module_id(&self, unit: i32, module: i32) -> BalResult<()>;

    /// Bring one logical port into its SDK-default state.
    fn initialize_port(&self, unit: i32, logical_port: i32) -> BalResult<()>;

    /// Read the current settings of a logical port.
    fn get_port_options(
        &self,
        unit: i32,
        logical_port: i32,
    ) -> BalResult<PortOptions>;

    /// Apply settings to a logical port.  Only `Some` fields are written.
    fn set_port_options(
        &self,
        unit: i32,
        logical_port: i32,
        options: &PortOptions,
    ) -> BalResult<()>;

    /// Program the serdes for a logical port.
    #[allow(clippy::too_many_arguments)]
    fn config_serdes_for_port(
        &self,
        unit: i32,
        logical_port: i32,
        speed_bps: u64,
        serdes_core: i32,
        serdes_lane: i32,
        num_serdes_lanes: i32,
        config: &SerdesLaneConfig,
    ) -> BalResult<()>;

    /// Start the background diagnostic shell server.
    fn start_diag_shell_server(&self) -> BalResult<()>;

    /// Start linkscan on a unit.  Once started, link-state changes flow to
    /// the registered linkscan event writer.
    fn start_linkscan(&self, unit: i32) -> BalResult<()>;

    /// Stop linkscan on a unit.
    fn stop_linkscan(&self, unit: i32) -> BalResult<()>;

    /// Hand the SDK the producer end of the linkscan event channel.
    /// Returns a writer id for later unregistration.  At most one writer
    /// may be registered at a time.
    fn register_linkscan_event_writer(
        &self,
        writer: mpsc::Sender<LinkscanEvent>,
        priority: i32,
    ) -> BalResult<WriterId>;

    /// Unregister a linkscan event writer.  The implementation must drop
    /// the writer; closing the channel is what stops the consumer.
    fn unregister_linkscan_event_writer(&self, id: WriterId) -> BalResult<()>;

    /// Detach and shut down every unit previously attached.
    fn shutdown_all_units(&self) -> BalResult<()>;
}

/// The physical-layer operations the chassis manager consumes.
pub trait PhalOps: Send + Sync {
    /// Read the identity of the front-panel module behind `(slot, port)`.
    fn get_front_panel_port_info(
        &self,
        slot: i32,
        port: i32,
    ) -> BalResult<FrontPanelPortInfo>;

    /// Hand the physical layer the producer end of the transceiver event
    /// channel.  Returns a writer id for later unregistration.
    fn register_transceiver_event_writer(
        &self,
        writer: mpsc::Sender<TransceiverEvent>,
        priority: i32,
    ) -> BalResult<WriterId>;

    /// Unregister a transceiver event writer.  The implementation must
    /// drop the writer; closing the channel is what stops the consumer.
    fn unregister_transceiver_event_writer(&self, id: WriterId)
        -> BalResult<()>;
}

/// The serdes-settings database: maps a (port, front-panel module) pair to
/// the lane settings the SDK should program.
pub trait SerdesDb: Send + Sync {
    /// Load (or reload) the database from its backing store.
    fn load(&self) -> BalResult<()>;

    /// Look up the lane settings for one BCM port given the identity of
    /// the module plugged into its cage.
    fn lookup_serdes_config_for_port(
        &self,
        port: &BcmPort,
        fp_info: &FrontPanelPortInfo,
    ) -> BalResult<SerdesLaneConfig>;
}
