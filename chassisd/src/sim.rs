// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Simulator backends for the SDK and physical-layer traits.  These stand
//! in for the real hardware bindings: the daemon runs against them in sim
//! mode, and the test suite drives the manager through them, injecting
//! linkscan and transceiver events as the hardware would.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use bal::{
    BalError, BalResult, BcmChipType, FrontPanelPortInfo, LinkscanEvent,
    PhalOps, PortOptions, SdkOps, SerdesDb, SerdesLaneConfig,
    TransceiverEvent, WriterId,
};
use slog::{debug, o};
use tokio::sync::mpsc;

struct SimUnit {
    chip_type: BcmChipType,
    module: i32,
    initialized: bool,
    linkscan_running: bool,
}

#[derive(Default)]
struct SimSdkState {
    sdk_initialized: bool,
    diag_shell_running: bool,
    units: BTreeMap<i32, SimUnit>,
    // Merged option state per (unit, logical_port).
    ports: BTreeMap<(i32, i32), PortOptions>,
    // Every set_port_options call, in order.
    set_history: Vec<(i32, i32, PortOptions)>,
    // Every config_serdes_for_port call, in order.
    serdes_history: Vec<(i32, i32)>,
    linkscan_writer: Option<(WriterId, mpsc::Sender<LinkscanEvent>)>,
    next_writer_id: WriterId,
    shutdown_calls: usize,
}

/// A simulated BCM SDK.
pub struct SimSdk {
    log: slog::Logger,
    state: Mutex<SimSdkState>,
}

fn no_port(unit: i32, logical_port: i32) -> BalError {
    BalError::InvalidArg(format!("no such port: {unit}/{logical_port}"))
}

impl SimSdk {
    pub fn new(log: &slog::Logger) -> Self {
        SimSdk {
            log: log.new(o!("unit" => "sim-sdk")),
            state: Mutex::new(SimSdkState {
                next_writer_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Inject a linkscan event as the hardware would.  Returns false when
    /// no writer is registered or the channel is full or closed.
    pub fn inject_linkscan_event(&self, event: LinkscanEvent) -> bool {
        let state = self.state.lock().unwrap();
        match &state.linkscan_writer {
            Some((_, writer)) => writer.try_send(event).is_ok(),
            None => false,
        }
    }

    /// The merged option state of a port, as the hardware would report it.
    pub fn port_options(
        &self,
        unit: i32,
        logical_port: i32,
    ) -> Option<PortOptions> {
        self.state.lock().unwrap().ports.get(&(unit, logical_port)).cloned()
    }

    /// Every `set_port_options` call made so far, in order.
    pub fn option_history(&self) -> Vec<(i32, i32, PortOptions)> {
        self.state.lock().unwrap().set_history.clone()
    }

    /// How many times serdes was configured for a port.
    pub fn serdes_config_count(&self, unit: i32, logical_port: i32) -> usize {
        self.state
            .lock()
            .unwrap()
            .serdes_history
            .iter()
            .filter(|entry| **entry == (unit, logical_port))
            .count()
    }

    pub fn has_linkscan_writer(&self) -> bool {
        self.state.lock().unwrap().linkscan_writer.is_some()
    }

    pub fn shutdown_calls(&self) -> usize {
        self.state.lock().unwrap().shutdown_calls
    }

    pub fn unit_chip_type(&self, unit: i32) -> Option<BcmChipType> {
        self.state.lock().unwrap().units.get(&unit).map(|u| u.chip_type)
    }

    pub fn unit_module(&self, unit: i32) -> Option<i32> {
        self.state.lock().unwrap().units.get(&unit).map(|u| u.module)
    }

    pub fn unit_linkscan_running(&self, unit: i32) -> bool {
        self.state
            .lock()
            .unwrap()
            .units
            .get(&unit)
            .map(|u| u.linkscan_running)
            .unwrap_or(false)
    }

    pub fn diag_shell_running(&self) -> bool {
        self.state.lock().unwrap().diag_shell_running
    }
}

impl SdkOps for SimSdk {
    fn initialize_sdk(
        &self,
        config_file: &Path,
        _config_flush_file: &Path,
        _shell_log_file: &Path,
    ) -> BalResult<()> {
        if !config_file.exists() {
            return Err(BalError::InvalidArg(format!(
                "SDK config file {} does not exist",
                config_file.display()
            )));
        }
        self.state.lock().unwrap().sdk_initialized = true;
        Ok(())
    }

    fn find_unit(
        &self,
        unit: i32,
        _pci_bus: i32,
        _pci_slot: i32,
        chip_type: BcmChipType,
    ) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.sdk_initialized {
            return Err(BalError::Uninitialized(
                "find_unit before initialize_sdk".to_string(),
            ));
        }
        state.units.insert(
            unit,
            SimUnit {
                chip_type,
                module: -1,
                initialized: false,
                linkscan_running: false,
            },
        );
        debug!(self.log, "attached unit"; "unit" => unit, "type" => %chip_type);
        Ok(())
    }

    fn initialize_unit(&self, unit: i32, _warm_boot: bool) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .units
            .get_mut(&unit)
            .ok_or_else(|| BalError::Missing(format!("unknown unit {unit}")))?;
        entry.initialized = true;
        Ok(())
    }

    fn set_module_id(&self, unit: i32, module: i32) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .units
            .get_mut(&unit)
            .ok_or_else(|| BalError::Missing(format!("unknown unit {unit}")))?;
        entry.module = module;
        Ok(())
    }

    fn initialize_port(&self, unit: i32, logical_port: i32) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.units.get(&unit) {
            None => {
                return Err(BalError::Missing(format!("unknown unit {unit}")))
            }
            Some(u) if !u.initialized => {
                return Err(BalError::Uninitialized(format!(
                    "unit {unit} is attached but not initialized"
                )))
            }
            Some(_) => {}
        }
        state.ports.insert((unit, logical_port), PortOptions::default());
        Ok(())
    }

    fn get_port_options(
        &self,
        unit: i32,
        logical_port: i32,
    ) -> BalResult<PortOptions> {
        self.state
            .lock()
            .unwrap()
            .ports
            .get(&(unit, logical_port))
            .cloned()
            .ok_or_else(|| no_port(unit, logical_port))
    }

    fn set_port_options(
        &self,
        unit: i32,
        logical_port: i32,
        options: &PortOptions,
    ) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        let port = state
            .ports
            .get_mut(&(unit, logical_port))
            .ok_or_else(|| no_port(unit, logical_port))?;
        if let Some(enabled) = options.enabled {
            port.enabled = Some(enabled);
        }
        if let Some(blocked) = options.blocked {
            port.blocked = Some(blocked);
        }
        if let Some(speed_bps) = options.speed_bps {
            port.speed_bps = Some(speed_bps);
        }
        if let Some(lanes) = options.num_serdes_lanes {
            port.num_serdes_lanes = Some(lanes);
        }
        state.set_history.push((unit, logical_port, options.clone()));
        Ok(())
    }

    fn config_serdes_for_port(
        &self,
        unit: i32,
        logical_port: i32,
        _speed_bps: u64,
        _serdes_core: i32,
        _serdes_lane: i32,
        _num_serdes_lanes: i32,
        _config: &SerdesLaneConfig,
    ) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.ports.contains_key(&(unit, logical_port)) {
            return Err(no_port(unit, logical_port));
        }
        state.serdes_history.push((unit, logical_port));
        Ok(())
    }

    fn start_diag_shell_server(&self) -> BalResult<()> {
        self.state.lock().unwrap().diag_shell_running = true;
        Ok(())
    }

    fn start_linkscan(&self, unit: i32) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .units
            .get_mut(&unit)
            .ok_or_else(|| BalError::Missing(format!("unknown unit {unit}")))?;
        entry.linkscan_running = true;
        Ok(())
    }

    fn stop_linkscan(&self, unit: i32) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .units
            .get_mut(&unit)
            .ok_or_else(|| BalError::Missing(format!("unknown unit {unit}")))?;
        entry.linkscan_running = false;
        Ok(())
    }

    fn register_linkscan_event_writer(
        &self,
        writer: mpsc::Sender<LinkscanEvent>,
        _priority: i32,
    ) -> BalResult<WriterId> {
        let mut state = self.state.lock().unwrap();
        if state.linkscan_writer.is_some() {
            return Err(BalError::Exists(
                "linkscan event writer already registered".to_string(),
            ));
        }
        let id = state.next_writer_id;
        state.next_writer_id += 1;
        state.linkscan_writer = Some((id, writer));
        Ok(id)
    }

    fn unregister_linkscan_event_writer(&self, id: WriterId) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        let registered =
            matches!(&state.linkscan_writer, Some((writer_id, _)) if *writer_id == id);
        if !registered {
            return Err(BalError::Missing(format!(
                "no linkscan event writer with id {id}"
            )));
        }
        // Dropping the sender closes the channel.
        state.linkscan_writer = None;
        Ok(())
    }

    fn shutdown_all_units(&self) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        state.units.clear();
        state.ports.clear();
        state.shutdown_calls += 1;
        Ok(())
    }
}

#[derive(Default)]
struct SimPhalState {
    fp_info: BTreeMap<(i32, i32), FrontPanelPortInfo>,
    xcvr_writer: Option<(WriterId, mpsc::Sender<TransceiverEvent>)>,
    next_writer_id: WriterId,
}

/// A simulated physical layer.
pub struct SimPhal {
    state: Mutex<SimPhalState>,
}

impl SimPhal {
    pub fn new(_log: &slog::Logger) -> Self {
        SimPhal {
            state: Mutex::new(SimPhalState {
                next_writer_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Describe the module plugged into `(slot, port)`; lookups for other
    /// ports report default (unknown) module info.
    pub fn set_front_panel_port_info(
        &self,
        slot: i32,
        port: i32,
        info: FrontPanelPortInfo,
    ) {
        self.state.lock().unwrap().fp_info.insert((slot, port), info);
    }

    /// Inject a transceiver event as the hardware would.  Returns false
    /// when no writer is registered or the channel is full or closed.
    pub fn inject_transceiver_event(&self, event: TransceiverEvent) -> bool {
        let state = self.state.lock().unwrap();
        match &state.xcvr_writer {
            Some((_, writer)) => writer.try_send(event).is_ok(),
            None => false,
        }
    }

    pub fn has_transceiver_writer(&self) -> bool {
        self.state.lock().unwrap().xcvr_writer.is_some()
    }
}

impl PhalOps for SimPhal {
    fn get_front_panel_port_info(
        &self,
        slot: i32,
        port: i32,
    ) -> BalResult<FrontPanelPortInfo> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .fp_info
            .get(&(slot, port))
            .cloned()
            .unwrap_or_default())
    }

    fn register_transceiver_event_writer(
        &self,
        writer: mpsc::Sender<TransceiverEvent>,
        _priority: i32,
    ) -> BalResult<WriterId> {
        let mut state = self.state.lock().unwrap();
        if state.xcvr_writer.is_some() {
            return Err(BalError::Exists(
                "transceiver event writer already registered".to_string(),
            ));
        }
        let id = state.next_writer_id;
        state.next_writer_id += 1;
        state.xcvr_writer = Some((id, writer));
        Ok(id)
    }

    fn unregister_transceiver_event_writer(
        &self,
        id: WriterId,
    ) -> BalResult<()> {
        let mut state = self.state.lock().unwrap();
        let registered =
            matches!(&state.xcvr_writer, Some((writer_id, _)) if *writer_id == id);
        if !registered {
            return Err(BalError::Missing(format!(
                "no transceiver event writer with id {id}"
            )));
        }
        state.xcvr_writer = None;
        Ok(())
    }
}

/// A serdes database that answers every lookup with an empty lane config.
/// Used by tests; the daemon loads the file-backed database instead.
#[derive(Default)]
pub struct SimSerdesDb;

impl SerdesDb for SimSerdesDb {
    fn load(&self) -> BalResult<()> {
        Ok(())
    }

    fn lookup_serdes_config_for_port(
        &self,
        _port: &bal::BcmPort,
        _fp_info: &FrontPanelPortInfo,
    ) -> BalResult<SerdesLaneConfig> {
        Ok(SerdesLaneConfig::default())
    }
}
