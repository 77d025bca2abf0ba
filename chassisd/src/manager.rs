// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The chassis manager: owns the mapping between the pushed config and
//! the silicon, brings up the SDK on the first push, keeps the live state
//! maps in sync across re-pushes, and drives port groups from linkscan
//! and transceiver events.
//!
//! Locking: all chassis state lives behind one reader/writer lock.  Every
//! mutator takes the write side; queries take the read side.  The
//! northbound notification writer has its own lock, always acquired
//! *after* the chassis lock.  Event readers are detached tasks that block
//! on their channel; closing the channel (by unregistering the writer
//! from the backend) is the only signal that stops them.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock, Weak};

use slog::{debug, error, info, o};
use tokio::sync::mpsc;

use bal::{
    BcmChassisMap, BcmChip, BcmPort, LinkscanEvent, PhalOps, PortOptions,
    SdkOps, SerdesDb, TransceiverEvent, WriterId,
    LINKSCAN_WRITER_PRIORITY_HIGH, TRANSCEIVER_WRITER_PRIORITY_HIGH,
};
use common::chassis_config::{ChassisConfig, OperationMode};
use common::ports::{GnmiEvent, LinkState, PortKey, TransceiverState};
use common::status::{HalResult, Status};

use crate::base_map;
use crate::resolver;
use crate::sdk_config;

/// Depth of the bounded linkscan event channel.
pub const MAX_LINKSCAN_EVENT_DEPTH: usize = 1024;

/// Depth of the bounded transceiver event channel.
pub const MAX_XCVR_EVENT_DEPTH: usize = 256;

/// File locations the manager reads and writes during bring-up.
#[derive(Clone, Debug)]
pub struct ManagerPaths {
    /// The vendor inventory of candidate chassis maps.
    pub base_chassis_map_file: PathBuf,
    /// Where the generated SDK config is written.
    pub sdk_config_file: PathBuf,
    /// The SDK's config flush file.
    pub sdk_config_flush_file: PathBuf,
    /// The diag shell log file.
    pub sdk_shell_log_file: PathBuf,
    /// The SDK checkpoint directory, created if missing.
    pub sdk_checkpoint_dir: PathBuf,
}

/// All live chassis state, guarded by the chassis lock.
#[derive(Default)]
struct ChassisState {
    initialized: bool,
    shutdown: bool,
    linkscan_writer_id: Option<WriterId>,
    xcvr_writer_id: Option<WriterId>,
    base_map: Option<BcmChassisMap>,
    applied_map: Option<BcmChassisMap>,
    unit_to_chip: BTreeMap<i32, BcmChip>,
    /// Owner of every configured port record, keyed by
    /// (slot, port, channel).
    ports: BTreeMap<PortKey, BcmPort>,
    /// Members of each flex port group, as keys into `ports`.
    flex_groups: BTreeMap<(i32, i32), Vec<PortKey>>,
    /// Members of each non-flex port group, as keys into `ports`.
    non_flex_groups: BTreeMap<(i32, i32), Vec<PortKey>>,
    /// Transceiver readiness per port group.  Seeded at first push and
    /// preserved across re-syncs.
    xcvr_state: BTreeMap<(i32, i32), TransceiverState>,
    /// Declared nodes and the unit each bound to; `None` until a
    /// singleton port binds the node.
    node_to_unit: BTreeMap<u64, Option<i32>>,
    unit_to_node: BTreeMap<i32, u64>,
    node_to_port_ids: BTreeMap<u64, BTreeSet<u64>>,
    port_id_to_key: BTreeMap<u64, PortKey>,
    unit_logical_to_port_id: BTreeMap<(i32, i32), u64>,
    /// Link state per configured port.  Preserved across re-syncs for
    /// ports that survive them.
    link_state: BTreeMap<PortKey, LinkState>,
}

impl ChassisState {
    fn cleanup(&mut self) {
        self.linkscan_writer_id = None;
        self.xcvr_writer_id = None;
        self.base_map = None;
        self.applied_map = None;
        self.unit_to_chip.clear();
        self.ports.clear();
        self.flex_groups.clear();
        self.non_flex_groups.clear();
        self.xcvr_state.clear();
        self.node_to_unit.clear();
        self.unit_to_node.clear();
        self.node_to_port_ids.clear();
        self.port_id_to_key.clear();
        self.unit_logical_to_port_id.clear();
        self.link_state.clear();
    }

    /// Whether the ports of a group are backplane ports.  All members of
    /// a group share the flag, so checking one member suffices.
    fn is_internal_group(&self, group: (i32, i32)) -> bool {
        let first = self
            .non_flex_groups
            .get(&group)
            .and_then(|keys| keys.first())
            .or_else(|| {
                self.flex_groups.get(&group).and_then(|keys| keys.first())
            });
        match first {
            Some(key) => {
                self.ports.get(key).map(|p| p.internal).unwrap_or(false)
            }
            None => false,
        }
    }
}

/// The chassis-management core of the HAL.
pub struct ChassisManager {
    mode: OperationMode,
    log: slog::Logger,
    sdk: Arc<dyn SdkOps>,
    phal: Arc<dyn PhalOps>,
    serdes_db: Arc<dyn SerdesDb>,
    paths: ManagerPaths,
    state: RwLock<ChassisState>,
    // Guards only the notification writer.  Acquired after the chassis
    // lock, never before it.
    notify_writer: Mutex<Option<mpsc::UnboundedSender<GnmiEvent>>>,
    // Handle the event reader tasks are spawned with.
    self_ref: Weak<ChassisManager>,
}

impl ChassisManager {
    pub fn new(
        mode: OperationMode,
        sdk: Arc<dyn SdkOps>,
        phal: Arc<dyn PhalOps>,
        serdes_db: Arc<dyn SerdesDb>,
        paths: ManagerPaths,
        log: slog::Logger,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| ChassisManager {
            mode,
            log,
            sdk,
            phal,
            serdes_db,
            paths,
            state: RwLock::new(ChassisState::default()),
            notify_writer: Mutex::new(None),
            self_ref: self_ref.clone(),
        })
    }

    /// Apply a chassis config.  The first successful push performs the
    /// full cold-boot sequence: resolve the maps, bring up the SDK, build
    /// the live state, configure port groups, and start the event
    /// pipeline.  Later pushes only re-sync the live state and
    /// reconfigure port groups; changes that would alter the applied map
    /// require a reboot and are caught by [`verify_chassis_config`].
    ///
    /// [`verify_chassis_config`]: ChassisManager::verify_chassis_config
    pub fn push_chassis_config(&self, config: &ChassisConfig) -> HalResult<()> {
        let mut state = self.state.write().unwrap();
        if !state.initialized {
            if self.mode == OperationMode::Standalone {
                self.serdes_db.load().map_err(Status::from)?;
            }
            let (base, applied) = self.resolve_maps(config)?;
            self.initialize_bcm_chips(&state, &base, &applied)?;
            self.initialize_internal_state(&mut state, base, applied)?;
            self.sync_internal_state(&mut state, config)?;
            self.configure_port_groups(&mut state)?;
            self.register_event_writers(&mut state)?;
            state.initialized = true;
            info!(self.log, "chassis config pushed; manager initialized");
        } else {
            self.sync_internal_state(&mut state, config)?;
            self.configure_port_groups(&mut state)?;
            info!(self.log, "chassis config re-pushed; state re-synced");
        }
        Ok(())
    }

    /// Validate a config without applying it.  After the first push this
    /// additionally reports `REBOOT_REQUIRED` when the config would
    /// change the applied map or the node-to-unit binding.
    pub fn verify_chassis_config(
        &self,
        config: &ChassisConfig,
    ) -> HalResult<()> {
        let state = self.state.read().unwrap();
        let (base, applied) = self.resolve_maps(config)?;
        if state.initialized {
            if state.applied_map.as_ref() != Some(&applied) {
                return Err(Status::reboot_required(
                    "the switch is already initialized, but the newly \
                     pushed config requires a change in the applied \
                     chassis map; the stack needs a reboot to finish the \
                     config push",
                ));
            }
            let node_to_unit =
                resolver::node_id_to_unit_from_config(config, &base);
            if node_to_unit != state.node_to_unit {
                return Err(Status::reboot_required(
                    "the switch is already initialized, but the newly \
                     pushed config requires a change in the node-to-unit \
                     binding; the stack needs a reboot to finish the \
                     config push",
                ));
            }
        }
        Ok(())
    }

    /// Tear down: stop the event pipeline, shut down every unit, and wipe
    /// the live state.  Errors from the collaborators are accumulated
    /// rather than short-circuiting; the manager always ends up
    /// uninitialized.
    pub fn shutdown(&self) -> HalResult<()> {
        let mut status = Status::ok();
        let mut state = self.state.write().unwrap();
        state.shutdown = true;
        status.append(self.unregister_event_writers(&mut state));
        if let Err(e) = self.sdk.shutdown_all_units() {
            status.append(e.into());
        }
        state.initialized = false;
        state.cleanup();
        if status.is_ok() {
            Ok(())
        } else {
            Err(status)
        }
    }

    fn resolve_maps(
        &self,
        config: &ChassisConfig,
    ) -> HalResult<(BcmChassisMap, BcmChassisMap)> {
        let base = base_map::read_base_chassis_map_from_file(
            &self.paths.base_chassis_map_file,
            &config.bcm_chassis_map_id,
        )?;
        resolver::generate_chassis_map_from_config(config, &base)
    }

    // The applied map must be a pruned rendering of the base: identical
    // invariants, and every chip and port drawn verbatim from the base
    // (modulo the auto-assigned logical ports).
    fn verify_applied_is_pruned_base(
        base: &BcmChassisMap,
        applied: &BcmChassisMap,
    ) -> HalResult<()> {
        if base.id != applied.id {
            return Err(Status::internal(format!(
                "the id in the base and applied chassis maps must match \
                 ({} != {})",
                base.id, applied.id
            )));
        }
        if base.auto_add_logical_ports != applied.auto_add_logical_ports {
            return Err(Status::internal(
                "auto_add_logical_ports in the base and applied chassis \
                 maps must match",
            ));
        }
        if base.bcm_chassis != applied.bcm_chassis {
            return Err(Status::internal(
                "the chassis section in the base and applied chassis maps \
                 must match",
            ));
        }
        for chip in &applied.bcm_chips {
            if !base.bcm_chips.contains(chip) {
                return Err(Status::internal(format!(
                    "chip {chip} was not found in the base chassis map"
                )));
            }
        }
        for port in &applied.bcm_ports {
            let mut p = port.clone();
            if applied.auto_add_logical_ports {
                // The base carries no logical port assignment.
                p.logical_port = 0;
            }
            if !base.bcm_ports.contains(&p) {
                return Err(Status::internal(format!(
                    "port {p} was not found in the base chassis map"
                )));
            }
        }
        Ok(())
    }

    // First-push SDK bring-up.  The order is load-bearing: config file,
    // checkpoint dir, SDK init, unit attach in ascending unit order, port
    // init, diag shell.
    fn initialize_bcm_chips(
        &self,
        state: &ChassisState,
        base: &BcmChassisMap,
        applied: &BcmChassisMap,
    ) -> HalResult<()> {
        if state.initialized {
            return Err(Status::internal(
                "initialize_bcm_chips() can be called only before the \
                 manager is initialized",
            ));
        }
        Self::verify_applied_is_pruned_base(base, applied)?;

        sdk_config::write_sdk_config_file(
            base,
            applied,
            self.mode,
            &self.paths.sdk_config_file,
        )?;
        std::fs::create_dir_all(&self.paths.sdk_checkpoint_dir)?;
        self.sdk.initialize_sdk(
            &self.paths.sdk_config_file,
            &self.paths.sdk_config_flush_file,
            &self.paths.sdk_shell_log_file,
        )?;

        let mut chips: Vec<&BcmChip> = applied.bcm_chips.iter().collect();
        chips.sort_by_key(|chip| chip.unit);
        for chip in chips {
            self.sdk.find_unit(
                chip.unit,
                chip.pci_bus,
                chip.pci_slot,
                chip.chip_type,
            )?;
            self.sdk.initialize_unit(chip.unit, false)?;
            self.sdk.set_module_id(chip.unit, chip.module)?;
            info!(self.log, "unit attached and initialized";
                  "unit" => chip.unit, "type" => %chip.chip_type);
        }
        for port in &applied.bcm_ports {
            self.sdk.initialize_port(port.unit, port.logical_port)?;
        }
        self.sdk.start_diag_shell_server()?;

        Ok(())
    }

    fn initialize_internal_state(
        &self,
        state: &mut ChassisState,
        base: BcmChassisMap,
        applied: BcmChassisMap,
    ) -> HalResult<()> {
        if state.initialized {
            return Err(Status::internal(
                "initialize_internal_state() can be called only before \
                 the manager is initialized",
            ));
        }
        // Seed the transceiver states.  External ports wait for the
        // insertion event; internal (backplane) ports have no such event
        // and start out present but unconfigured.
        state.xcvr_state.clear();
        for port in &applied.bcm_ports {
            let group = (port.slot, port.port);
            let seed = if port.internal {
                TransceiverState::Present
            } else {
                TransceiverState::Unknown
            };
            state.xcvr_state.insert(group, seed);
        }
        state.base_map = Some(base);
        state.applied_map = Some(applied);
        Ok(())
    }

    // Rebuild the live maps from the config.  Config shape was already
    // verified by the resolver, so matching failures here are silent
    // skips, exactly as on the first push.  Link and transceiver states
    // are the only survivors: tuples that exist on both sides of the
    // sync keep their state, new tuples start Unknown, departed tuples
    // are dropped.
    fn sync_internal_state(
        &self,
        state: &mut ChassisState,
        config: &ChassisConfig,
    ) -> HalResult<()> {
        let base = state.base_map.clone().ok_or_else(|| {
            Status::internal("sync_internal_state() called with no base map")
        })?;
        let applied = state.applied_map.clone().ok_or_else(|| {
            Status::internal(
                "sync_internal_state() called with no applied map",
            )
        })?;

        state.unit_to_chip.clear();
        state.ports.clear();
        state.flex_groups.clear();
        state.non_flex_groups.clear();
        state.node_to_unit.clear();
        state.unit_to_node.clear();
        state.node_to_port_ids.clear();
        state.port_id_to_key.clear();
        state.unit_logical_to_port_id.clear();
        let mut new_link_state: BTreeMap<PortKey, LinkState> = BTreeMap::new();

        // Every declared node gets an entry, bound or not.
        for node in &config.nodes {
            state.node_to_unit.insert(node.id, None);
            state.node_to_port_ids.insert(node.id, BTreeSet::new());
        }

        for chip in &applied.bcm_chips {
            state.unit_to_chip.insert(chip.unit, chip.clone());
        }

        for singleton in &config.singleton_ports {
            let Some(matched) = base
                .bcm_ports
                .iter()
                .find(|p| resolver::singleton_matches_bcm_port(singleton, p))
            else {
                continue;
            };
            let key = PortKey::new(
                singleton.slot,
                singleton.port,
                singleton.channel,
            );
            if state.ports.contains_key(&key) {
                return Err(Status::internal(format!(
                    "the (slot, port, channel) tuple for {singleton} \
                     already exists in the port map; has the config been \
                     verified?"
                )));
            }
            let mut port = matched.clone();
            if applied.auto_add_logical_ports {
                // The logical port comes from the applied map, matched on
                // the hardware identity of the lane.
                let assigned = applied
                    .bcm_ports
                    .iter()
                    .find(|q| {
                        q.unit == port.unit
                            && q.physical_port == port.physical_port
                            && q.diag_port == port.diag_port
                    })
                    .ok_or_else(|| {
                        Status::internal(format!(
                            "found no port in the applied chassis map \
                             matching the unit, physical_port and \
                             diag_port of {port}"
                        ))
                    })?;
                port.logical_port = assigned.logical_port;
            }
            let group = key.group();
            if !state.xcvr_state.contains_key(&group) {
                return Err(Status::internal(format!(
                    "config contains a (slot, port) pair with no \
                     transceiver state: ({}, {})",
                    group.0, group.1
                )));
            }
            state.node_to_unit.insert(singleton.node, Some(port.unit));
            state.unit_to_node.insert(port.unit, singleton.node);
            state
                .node_to_port_ids
                .entry(singleton.node)
                .or_default()
                .insert(singleton.id);
            state.port_id_to_key.insert(singleton.id, key);
            state
                .unit_logical_to_port_id
                .insert((port.unit, port.logical_port), singleton.id);
            if port.flex_port {
                state.flex_groups.entry(group).or_default().push(key);
            } else {
                state.non_flex_groups.entry(group).or_default().push(key);
            }
            let prev = state
                .link_state
                .get(&key)
                .copied()
                .unwrap_or(LinkState::Unknown);
            new_link_state.insert(key, prev);
            state.ports.insert(key, port);
        }

        state.link_state = new_link_state;
        Ok(())
    }

    // Configure all port groups: flex speed changes first, then the
    // enable/block options for every group that is not yet ready.  A
    // failing group does not stop the others; the failures come back as
    // one accumulated status.
    fn configure_port_groups(
        &self,
        state: &mut ChassisState,
    ) -> HalResult<()> {
        let mut status = Status::ok();

        let flex_groups: Vec<(i32, i32)> =
            state.flex_groups.keys().copied().collect();
        for group in flex_groups {
            match self.set_speed_for_flex_port_group(state, group) {
                Err(e) => {
                    status.append(e);
                    continue;
                }
                Ok(speed_changed) => {
                    // A ready group whose speed just changed must go
                    // through the options pass again.
                    if speed_changed
                        && state.xcvr_state.get(&group)
                            == Some(&TransceiverState::Ready)
                    {
                        state
                            .xcvr_state
                            .insert(group, TransceiverState::Present);
                    }
                }
            }
        }

        let groups: Vec<((i32, i32), TransceiverState)> = state
            .xcvr_state
            .iter()
            .map(|(group, xcvr)| (*group, *xcvr))
            .collect();
        for (group, xcvr) in groups {
            if xcvr == TransceiverState::Ready {
                continue;
            }
            let options = PortOptions {
                enabled: Some(xcvr == TransceiverState::Present),
                blocked: Some(xcvr != TransceiverState::Present),
                ..Default::default()
            };
            if let Err(e) =
                self.set_port_options_for_port_group(state, group, &options)
            {
                status.append(e);
                continue;
            }
            if xcvr == TransceiverState::Present {
                state.xcvr_state.insert(group, TransceiverState::Ready);
            }
        }

        if status.is_ok() {
            Ok(())
        } else {
            Err(status)
        }
    }

    // Change the speed of a flex port group if the config asks for one
    // different from what the hardware carries.  Returns whether a change
    // was made.  Disables and blocks every logical port of the applied
    // (fully-channelized) listing -- a superset of the configured group
    // when the config channelizes more coarsely -- then sets the lane
    // count on the control port and the speed on the configured members.
    // Re-enabling is left to the options pass.
    fn set_speed_for_flex_port_group(
        &self,
        state: &ChassisState,
        group: (i32, i32),
    ) -> HalResult<bool> {
        let keys = state.flex_groups.get(&group).ok_or_else(|| {
            Status::internal(format!(
                "ports with (slot, port) = ({}, {}) are not a flex port \
                 group",
                group.0, group.1
            ))
        })?;
        let applied = state.applied_map.as_ref().ok_or_else(|| {
            Status::internal("no applied chassis map")
        })?;

        let mut units = BTreeSet::new();
        let mut min_speed_logical_ports = BTreeSet::new();
        for port in &applied.bcm_ports {
            if port.slot == group.0 && port.port == group.1 {
                if !port.flex_port {
                    return Err(Status::internal(format!(
                        "detected unexpected non-flex port {port}"
                    )));
                }
                units.insert(port.unit);
                min_speed_logical_ports.insert(port.logical_port);
            }
        }
        let mut config_logical_ports = BTreeSet::new();
        let mut config_lanes = BTreeSet::new();
        let mut config_speeds = BTreeSet::new();
        for key in keys {
            let port = state.ports.get(key).ok_or_else(|| {
                Status::internal(format!("no port record for {key}"))
            })?;
            units.insert(port.unit);
            config_logical_ports.insert(port.logical_port);
            config_lanes.insert(port.num_serdes_lanes);
            config_speeds.insert(port.speed_bps);
        }

        if units.len() != 1 {
            return Err(Status::internal(format!(
                "ports with (slot, port) = ({}, {}) are on different chips",
                group.0, group.1
            )));
        }
        if config_lanes.len() != 1 {
            return Err(Status::internal(format!(
                "ports with (slot, port) = ({}, {}) have different \
                 num_serdes_lanes",
                group.0, group.1
            )));
        }
        if config_speeds.len() != 1 {
            return Err(Status::internal(format!(
                "ports with (slot, port) = ({}, {}) have different \
                 speed_bps",
                group.0, group.1
            )));
        }
        let unit = *units.iter().next().unwrap();
        let control_logical_port =
            *min_speed_logical_ports.iter().next().ok_or_else(|| {
                Status::internal(format!(
                    "no applied ports for flex group ({}, {})",
                    group.0, group.1
                ))
            })?;
        let num_serdes_lanes = *config_lanes.iter().next().unwrap();
        let speed_bps = *config_speeds.iter().next().unwrap();
        if *config_logical_ports.iter().next().unwrap()
            != control_logical_port
        {
            return Err(Status::internal(format!(
                "control logical port mismatch for flex group ({}, {})",
                group.0, group.1
            )));
        }

        let current = self.sdk.get_port_options(unit, control_logical_port)?;
        if current.speed_bps == Some(speed_bps) {
            // Nothing to do; no serdes setting either.
            return Ok(false);
        }

        // Clear the prior channelization: every min-speed logical port
        // goes down and blocked.
        let disable = PortOptions {
            enabled: Some(false),
            blocked: Some(true),
            ..Default::default()
        };
        for logical_port in &min_speed_logical_ports {
            self.sdk.set_port_options(unit, *logical_port, &disable)?;
        }
        // Lane count on the control port only.
        self.sdk.set_port_options(
            unit,
            control_logical_port,
            &PortOptions {
                num_serdes_lanes: Some(num_serdes_lanes),
                ..Default::default()
            },
        )?;
        // Speed on every configured member.  The ports stay disabled;
        // the options pass re-enables them.
        let speed = PortOptions {
            speed_bps: Some(speed_bps),
            ..Default::default()
        };
        for logical_port in &config_logical_ports {
            self.sdk.set_port_options(unit, *logical_port, &speed)?;
        }

        info!(self.log, "set speed for flex port group";
              "slot" => group.0, "port" => group.1,
              "speed_gbps" => speed_bps / common::BITS_PER_GIGABIT);
        Ok(true)
    }

    // Apply options to every member of a port group.  When the options
    // enable the group in standalone mode, the serdes of every member is
    // configured first from the serdes database, keyed by the front-panel
    // module identity reported by the physical layer.
    fn set_port_options_for_port_group(
        &self,
        state: &ChassisState,
        group: (i32, i32),
        options: &PortOptions,
    ) -> HalResult<()> {
        let keys = state
            .flex_groups
            .get(&group)
            .or_else(|| state.non_flex_groups.get(&group))
            .ok_or_else(|| {
                Status::internal(format!(
                    "unknown port group (slot: {}, port: {})",
                    group.0, group.1
                ))
            })?;

        if options.enabled == Some(true)
            && self.mode == OperationMode::Standalone
        {
            let fp_info =
                self.phal.get_front_panel_port_info(group.0, group.1)?;
            for key in keys {
                let port = state.ports.get(key).ok_or_else(|| {
                    Status::internal(format!("no port record for {key}"))
                })?;
                let lane_config = self
                    .serdes_db
                    .lookup_serdes_config_for_port(port, &fp_info)?;
                self.sdk.config_serdes_for_port(
                    port.unit,
                    port.logical_port,
                    port.speed_bps,
                    port.serdes_core,
                    port.serdes_lane,
                    port.num_serdes_lanes,
                    &lane_config,
                )?;
                debug!(self.log, "serdes setting done"; "port" => %port);
            }
        }

        for key in keys {
            let port = state.ports.get(key).ok_or_else(|| {
                Status::internal(format!("no port record for {key}"))
            })?;
            self.sdk.set_port_options(
                port.unit,
                port.logical_port,
                options,
            )?;
            debug!(self.log, "port options applied"; "port" => %port,
                   "options" => ?options);
        }
        Ok(())
    }

    // Start the event pipeline: one bounded channel per event source,
    // producer end handed to the backend, consumer end drained by a
    // detached task.  Runs once; a second push never re-registers.
    fn register_event_writers(&self, state: &mut ChassisState) -> HalResult<()> {
        if state.initialized {
            return Err(Status::internal(
                "register_event_writers() can be called only before the \
                 manager is initialized",
            ));
        }
        let manager = self.self_ref.upgrade().ok_or_else(|| {
            Status::internal("chassis manager is being torn down")
        })?;
        if state.linkscan_writer_id.is_none() {
            let (tx, rx) = mpsc::channel(MAX_LINKSCAN_EVENT_DEPTH);
            let id = self
                .sdk
                .register_linkscan_event_writer(tx, LINKSCAN_WRITER_PRIORITY_HIGH)?;
            state.linkscan_writer_id = Some(id);
            tokio::task::spawn(read_linkscan_events(Arc::clone(&manager), rx));
            for unit in state.unit_to_chip.keys() {
                self.sdk.start_linkscan(*unit)?;
            }
        }
        if state.xcvr_writer_id.is_none() {
            let (tx, rx) = mpsc::channel(MAX_XCVR_EVENT_DEPTH);
            let id = self.phal.register_transceiver_event_writer(
                tx,
                TRANSCEIVER_WRITER_PRIORITY_HIGH,
            )?;
            state.xcvr_writer_id = Some(id);
            tokio::task::spawn(read_transceiver_events(manager, rx));
        }
        Ok(())
    }

    // Unregister both event writers, accumulating failures.  The backends
    // drop the producer ends, which closes the channels and lets the
    // reader tasks run to completion on their own.
    fn unregister_event_writers(&self, state: &mut ChassisState) -> Status {
        let mut status = Status::ok();
        if let Some(id) = state.linkscan_writer_id.take() {
            if let Err(e) = self.sdk.unregister_linkscan_event_writer(id) {
                status.append(e.into());
            }
        }
        if let Some(id) = state.xcvr_writer_id.take() {
            if let Err(e) = self.phal.unregister_transceiver_event_writer(id)
            {
                status.append(e.into());
            }
        }
        status
    }

    /// Handle one linkscan event.  Events for `(unit, logical_port)`
    /// pairs the manager does not know -- typically non-configured
    /// channels of a flex port -- are dropped silently.
    pub(crate) fn handle_linkscan_event(&self, event: &LinkscanEvent) {
        let mut state = self.state.write().unwrap();
        if state.shutdown {
            debug!(self.log, "manager already shut down; dropping event");
            return;
        }
        let node_id = state.unit_to_node.get(&event.unit).copied();
        let port_id = state
            .unit_logical_to_port_id
            .get(&(event.unit, event.logical_port))
            .copied();
        let (Some(node_id), Some(port_id)) = (node_id, port_id) else {
            debug!(self.log, "ignored linkscan event for unknown port";
                   "unit" => event.unit,
                   "logical_port" => event.logical_port);
            return;
        };
        let Some(key) = state.port_id_to_key.get(&port_id).copied() else {
            error!(self.log,
                   "inconsistent state: no (slot, port, channel) for port";
                   "port_id" => port_id);
            return;
        };
        state.link_state.insert(key, event.state);
        let Some(port) = state.ports.get(&key) else {
            error!(self.log,
                   "inconsistent state: no port record";
                   "key" => %key);
            return;
        };
        info!(self.log, "port state changed";
              "port" => %port, "state" => %event.state);
        self.send_port_oper_state_event(node_id, port_id, event.state);
    }

    /// Handle one transceiver event.  Only `Present` and `NotPresent` are
    /// meaningful inputs; anything else is logged and dropped, as are
    /// transitions that make no sense for the current state.
    pub(crate) fn handle_transceiver_event(&self, event: &TransceiverEvent) {
        let mut state = self.state.write().unwrap();
        if state.shutdown {
            debug!(self.log, "manager already shut down; dropping event");
            return;
        }
        let group = (event.slot, event.port);
        let Some(&old_state) = state.xcvr_state.get(&group) else {
            error!(self.log, "transceiver event for unknown (slot, port)";
                   "slot" => event.slot, "port" => event.port);
            return;
        };
        if event.state != TransceiverState::Present
            && event.state != TransceiverState::NotPresent
        {
            error!(self.log, "invalid transceiver state in event";
                   "slot" => event.slot, "port" => event.port,
                   "state" => %event.state);
            return;
        }
        if old_state == TransceiverState::Ready
            && event.state == TransceiverState::Present
        {
            if state.is_internal_group(group) {
                debug!(self.log,
                       "got present for an internal (slot, port)";
                       "slot" => event.slot, "port" => event.port);
            } else {
                error!(self.log, "got present for a ready (slot, port)";
                       "slot" => event.slot, "port" => event.port);
            }
            return;
        }
        if old_state == TransceiverState::Unknown
            && event.state == TransceiverState::NotPresent
        {
            error!(self.log, "got not-present for an unknown (slot, port)";
                   "slot" => event.slot, "port" => event.port);
            return;
        }
        state.xcvr_state.insert(group, event.state);

        let mut options = PortOptions {
            enabled: Some(event.state == TransceiverState::Present),
            ..Default::default()
        };
        if old_state == TransceiverState::Unknown {
            // First sighting of this module; set the block state too.
            options.blocked = Some(false);
        }
        if let Err(e) =
            self.set_port_options_for_port_group(&state, group, &options)
        {
            error!(self.log, "failure handling transceiver event";
                   "slot" => event.slot, "port" => event.port,
                   "error" => %e);
            return;
        }
        if state.xcvr_state.get(&group) == Some(&TransceiverState::Present) {
            info!(self.log, "transceiver ready";
                  "slot" => event.slot, "port" => event.port);
            state.xcvr_state.insert(group, TransceiverState::Ready);
        }
    }

    fn send_port_oper_state_event(
        &self,
        node_id: u64,
        port_id: u64,
        link_state: LinkState,
    ) {
        let mut writer = self.notify_writer.lock().unwrap();
        if let Some(tx) = writer.as_ref() {
            let event = GnmiEvent::PortOperStateChanged {
                node_id,
                port_id,
                state: link_state,
            };
            if tx.send(event).is_err() {
                // The receiver is gone; drop the writer.
                *writer = None;
            }
        }
    }

    /// Register the northbound notification writer.
    pub fn register_event_notify_writer(
        &self,
        writer: mpsc::UnboundedSender<GnmiEvent>,
    ) -> HalResult<()> {
        *self.notify_writer.lock().unwrap() = Some(writer);
        Ok(())
    }

    /// Unregister the northbound notification writer.
    pub fn unregister_event_notify_writer(&self) -> HalResult<()> {
        *self.notify_writer.lock().unwrap() = None;
        Ok(())
    }

    pub fn get_bcm_chip(&self, unit: i32) -> HalResult<BcmChip> {
        let state = self.state.read().unwrap();
        if !state.initialized {
            return Err(Status::not_initialized());
        }
        state.unit_to_chip.get(&unit).cloned().ok_or_else(|| {
            Status::internal(format!("failed to find unit {unit}"))
        })
    }

    pub fn get_bcm_port(
        &self,
        slot: i32,
        port: i32,
        channel: i32,
    ) -> HalResult<BcmPort> {
        let state = self.state.read().unwrap();
        if !state.initialized {
            return Err(Status::not_initialized());
        }
        let key = PortKey::new(slot, port, channel);
        state.ports.get(&key).cloned().ok_or_else(|| {
            Status::internal(format!("failed to find port {key}"))
        })
    }

    pub fn get_node_id_to_unit_map(
        &self,
    ) -> HalResult<BTreeMap<u64, Option<i32>>> {
        let state = self.state.read().unwrap();
        if !state.initialized {
            return Err(Status::not_initialized());
        }
        Ok(state.node_to_unit.clone())
    }

    pub fn get_node_id_to_port_ids_map(
        &self,
    ) -> HalResult<BTreeMap<u64, BTreeSet<u64>>> {
        let state = self.state.read().unwrap();
        if !state.initialized {
            return Err(Status::not_initialized());
        }
        Ok(state.node_to_port_ids.clone())
    }

    pub fn get_unit_from_node_id(&self, node_id: u64) -> HalResult<i32> {
        let state = self.state.read().unwrap();
        if !state.initialized {
            return Err(Status::not_initialized());
        }
        match state.node_to_unit.get(&node_id) {
            Some(Some(unit)) => Ok(*unit),
            Some(None) => Err(Status::invalid_param(format!(
                "node {node_id} is not bound to any unit"
            ))),
            None => Err(Status::invalid_param(format!(
                "node {node_id} is not configured"
            ))),
        }
    }

    pub fn get_port_id_to_unit_logical_port_map(
        &self,
    ) -> HalResult<BTreeMap<u64, (i32, i32)>> {
        let state = self.state.read().unwrap();
        if !state.initialized {
            return Err(Status::not_initialized());
        }
        Ok(state
            .unit_logical_to_port_id
            .iter()
            .map(|(unit_logical, port_id)| (*port_id, *unit_logical))
            .collect())
    }

    /// The trunk membership map.  Trunks are not part of the config
    /// model, so after the first push this is always empty; callers may
    /// rely on the emptiness rather than probing for an error.
    pub fn get_trunk_id_to_unit_trunk_port_map(
        &self,
    ) -> HalResult<BTreeMap<u64, (i32, i32)>> {
        let state = self.state.read().unwrap();
        if !state.initialized {
            return Err(Status::not_initialized());
        }
        Ok(BTreeMap::new())
    }

    pub fn get_port_state(&self, port_id: u64) -> HalResult<LinkState> {
        let state = self.state.read().unwrap();
        if !state.initialized {
            return Err(Status::not_initialized());
        }
        let key = state.port_id_to_key.get(&port_id).ok_or_else(|| {
            Status::internal(format!("unknown port_id: {port_id}"))
        })?;
        state.link_state.get(key).copied().ok_or_else(|| {
            Status::internal(format!(
                "inconsistent state: {key} has no link state"
            ))
        })
    }

    #[cfg(test)]
    pub(crate) fn transceiver_state(
        &self,
        slot: i32,
        port: i32,
    ) -> Option<TransceiverState> {
        self.state.read().unwrap().xcvr_state.get(&(slot, port)).copied()
    }

    #[cfg(test)]
    pub(crate) fn has_notify_writer(&self) -> bool {
        self.notify_writer.lock().unwrap().is_some()
    }
}

async fn read_linkscan_events(
    manager: Arc<ChassisManager>,
    mut events: mpsc::Receiver<LinkscanEvent>,
) {
    let log = manager.log.new(o!("unit" => "linkscan-reader"));
    // A closed channel is the only exit signal.
    while let Some(event) = events.recv().await {
        manager.handle_linkscan_event(&event);
    }
    debug!(log, "linkscan event channel closed; reader exiting");
}

async fn read_transceiver_events(
    manager: Arc<ChassisManager>,
    mut events: mpsc::Receiver<TransceiverEvent>,
) {
    let log = manager.log.new(o!("unit" => "transceiver-reader"));
    while let Some(event) = events.recv().await {
        manager.handle_transceiver_event(&event);
    }
    debug!(log, "transceiver event channel closed; reader exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimPhal, SimSdk, SimSerdesDb};
    use common::chassis_config::{Node, Platform, SingletonPort};
    use common::status::ErrorCode;
    use common::{
        FIFTY_GIG_BPS, FORTY_GIG_BPS, TEN_GIG_BPS, TWENTY_FIVE_GIG_BPS,
    };
    use std::time::Duration;

    // One TRIDENT2 with a single non-flex 40G port, slots auto-populated.
    const TRIDENT2_BASE: &str = r#"
        [[bcm_chassis_maps]]
        id = "generic_trident2"
        auto_add_slot = true
        auto_add_logical_ports = true

        [[bcm_chassis_maps.bcm_chips]]
        type = "trident2"
        unit = 0

        [[bcm_chassis_maps.bcm_ports]]
        type = "xe"
        port = 1
        unit = 0
        physical_port = 1
        diag_port = 1
        num_serdes_lanes = 4
        speed_bps = 40000000000
    "#;

    // One TRIDENT2 whose front-panel port 1 can run as 1x40G or 4x10G,
    // all non-flex: changing the channelization changes the applied map.
    const TRIDENT2_CHANNELIZED_BASE: &str = r#"
        [[bcm_chassis_maps]]
        id = "generic_trident2"
        auto_add_slot = true
        auto_add_logical_ports = true

        [[bcm_chassis_maps.bcm_chips]]
        type = "trident2"
        unit = 0

        [[bcm_chassis_maps.bcm_ports]]
        type = "xe"
        port = 1
        channel = 0
        unit = 0
        physical_port = 1
        diag_port = 1
        num_serdes_lanes = 4
        speed_bps = 40000000000

        [[bcm_chassis_maps.bcm_ports]]
        type = "xe"
        port = 1
        channel = 1
        unit = 0
        physical_port = 1
        diag_port = 1
        num_serdes_lanes = 1
        speed_bps = 10000000000

        [[bcm_chassis_maps.bcm_ports]]
        type = "xe"
        port = 1
        channel = 2
        unit = 0
        physical_port = 2
        diag_port = 2
        serdes_lane = 1
        num_serdes_lanes = 1
        speed_bps = 10000000000

        [[bcm_chassis_maps.bcm_ports]]
        type = "xe"
        port = 1
        channel = 3
        unit = 0
        physical_port = 3
        diag_port = 3
        serdes_lane = 2
        num_serdes_lanes = 1
        speed_bps = 10000000000

        [[bcm_chassis_maps.bcm_ports]]
        type = "xe"
        port = 1
        channel = 4
        unit = 0
        physical_port = 4
        diag_port = 4
        serdes_lane = 3
        num_serdes_lanes = 1
        speed_bps = 10000000000
    "#;

    // One TOMAHAWK with a flex port at (slot 1, port 2).  The channelized
    // speed variants share physical/diag ports with the lanes they
    // occupy, as real inventories do.
    const TOMAHAWK_FLEX_BASE: &str = r#"
        [[bcm_chassis_maps]]
        id = "generic_tomahawk"
        auto_add_logical_ports = true

        [[bcm_chassis_maps.bcm_chips]]
        type = "tomahawk"
        slot = 1
        unit = 0

        [[bcm_chassis_maps.bcm_ports]]
        type = "ce"
        slot = 1
        port = 2
        channel = 0
        unit = 0
        physical_port = 1
        diag_port = 1
        num_serdes_lanes = 4
        speed_bps = 100000000000
        flex_port = true

        [[bcm_chassis_maps.bcm_ports]]
        type = "ce"
        slot = 1
        port = 2
        channel = 1
        unit = 0
        physical_port = 1
        diag_port = 1
        num_serdes_lanes = 1
        speed_bps = 25000000000
        flex_port = true

        [[bcm_chassis_maps.bcm_ports]]
        type = "ce"
        slot = 1
        port = 2
        channel = 2
        unit = 0
        physical_port = 2
        diag_port = 2
        serdes_lane = 1
        num_serdes_lanes = 1
        speed_bps = 25000000000
        flex_port = true

        [[bcm_chassis_maps.bcm_ports]]
        type = "ce"
        slot = 1
        port = 2
        channel = 3
        unit = 0
        physical_port = 3
        diag_port = 3
        serdes_lane = 2
        num_serdes_lanes = 1
        speed_bps = 25000000000
        flex_port = true

        [[bcm_chassis_maps.bcm_ports]]
        type = "ce"
        slot = 1
        port = 2
        channel = 4
        unit = 0
        physical_port = 4
        diag_port = 4
        serdes_lane = 3
        num_serdes_lanes = 1
        speed_bps = 25000000000
        flex_port = true

        [[bcm_chassis_maps.bcm_ports]]
        type = "ce"
        slot = 1
        port = 2
        channel = 1
        unit = 0
        physical_port = 1
        diag_port = 1
        num_serdes_lanes = 2
        speed_bps = 50000000000
        flex_port = true

        [[bcm_chassis_maps.bcm_ports]]
        type = "ce"
        slot = 1
        port = 2
        channel = 2
        unit = 0
        physical_port = 3
        diag_port = 3
        serdes_lane = 2
        num_serdes_lanes = 2
        speed_bps = 50000000000
        flex_port = true
    "#;

    struct TestEnv {
        manager: Arc<ChassisManager>,
        sdk: Arc<SimSdk>,
        phal: Arc<SimPhal>,
        dir: tempfile::TempDir,
    }

    fn test_env(mode: OperationMode, base_map_toml: &str) -> TestEnv {
        let dir = tempfile::tempdir().unwrap();
        let base_path = dir.path().join("base_chassis_map.toml");
        std::fs::write(&base_path, base_map_toml).unwrap();
        let log = slog::Logger::root(slog::Discard, o!());
        let sdk = Arc::new(SimSdk::new(&log));
        let phal = Arc::new(SimPhal::new(&log));
        let paths = ManagerPaths {
            base_chassis_map_file: base_path,
            sdk_config_file: dir.path().join("config.bcm"),
            sdk_config_flush_file: dir.path().join("config.bcm.tmp"),
            sdk_shell_log_file: dir.path().join("bcm.log"),
            sdk_checkpoint_dir: dir.path().join("sdk_checkpoint"),
        };
        let manager = ChassisManager::new(
            mode,
            sdk.clone(),
            phal.clone(),
            Arc::new(SimSerdesDb),
            paths,
            log,
        );
        TestEnv { manager, sdk, phal, dir }
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

    fn channelized_config() -> ChassisConfig {
        ChassisConfig {
            platform: Some(Platform::GenericTrident2),
            bcm_chassis_map_id: String::new(),
            nodes: vec![Node { id: 100, slot: 5 }],
            singleton_ports: (1..=4)
                .map(|channel| SingletonPort {
                    id: channel as u64,
                    slot: 5,
                    port: 1,
                    channel,
                    speed_bps: TEN_GIG_BPS,
                    node: 100,
                })
                .collect(),
        }
    }

    fn flex_config(channel_speed: u64) -> ChassisConfig {
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

    #[tokio::test]
    async fn test_queries_before_first_push() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        for status in [
            env.manager.get_bcm_chip(0).map(|_| ()),
            env.manager.get_bcm_port(5, 1, 0).map(|_| ()),
            env.manager.get_node_id_to_unit_map().map(|_| ()),
            env.manager.get_unit_from_node_id(100).map(|_| ()),
            env.manager.get_port_id_to_unit_logical_port_map().map(|_| ()),
            env.manager.get_trunk_id_to_unit_trunk_port_map().map(|_| ()),
            env.manager.get_port_state(1).map(|_| ()),
        ] {
            assert_eq!(
                status.unwrap_err().error_code(),
                Some(ErrorCode::NotInitialized)
            );
        }
    }

    #[tokio::test]
    async fn test_minimal_push() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        let config = minimal_config();
        env.manager.verify_chassis_config(&config).unwrap();
        env.manager.push_chassis_config(&config).unwrap();

        let chip = env.manager.get_bcm_chip(0).unwrap();
        assert_eq!(chip.slot, 5);
        let port = env.manager.get_bcm_port(5, 1, 0).unwrap();
        assert_eq!(port.slot, 5);
        assert_eq!(port.logical_port, 1);
        assert_eq!(env.manager.get_unit_from_node_id(100).unwrap(), 0);
        assert_eq!(
            env.manager.get_port_state(1).unwrap(),
            LinkState::Unknown
        );
        let port_map =
            env.manager.get_port_id_to_unit_logical_port_map().unwrap();
        assert_eq!(port_map.get(&1), Some(&(0, 1)));
        assert!(env
            .manager
            .get_trunk_id_to_unit_trunk_port_map()
            .unwrap()
            .is_empty());

        let node_ports = env.manager.get_node_id_to_port_ids_map().unwrap();
        assert_eq!(node_ports[&100], BTreeSet::from([1]));

        // The bring-up sequence ran: unit attached with its module id,
        // linkscan started, diag shell up, both event writers live, and
        // the rendered SDK config made it to disk.
        assert_eq!(
            env.sdk.unit_chip_type(0),
            Some(bal::BcmChipType::Trident2)
        );
        assert_eq!(env.sdk.unit_module(0), Some(0));
        assert!(env.sdk.unit_linkscan_running(0));
        assert!(env.sdk.diag_shell_running());
        assert!(env.sdk.has_linkscan_writer());
        assert!(env.phal.has_transceiver_writer());
        let rendered =
            std::fs::read_to_string(env.dir.path().join("config.bcm"))
                .unwrap();
        assert!(rendered.contains("portmap_1.0=1:40\n"));
        assert!(rendered.contains("pbmp_xport_xe.0=0x2\n"));

        // An external port group starts unknown: disabled and blocked.
        let options = env.sdk.port_options(0, 1).unwrap();
        assert_eq!(options.enabled, Some(false));
        assert_eq!(options.blocked, Some(true));
        assert_eq!(
            env.manager.transceiver_state(5, 1),
            Some(TransceiverState::Unknown)
        );
    }

    #[tokio::test]
    async fn test_second_push_requires_verified_config() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();
        // Verifying the identical config stays OK after initialization.
        env.manager.verify_chassis_config(&minimal_config()).unwrap();
        env.manager.push_chassis_config(&minimal_config()).unwrap();
    }

    #[tokio::test]
    async fn test_reboot_required_on_applied_map_change() {
        let env = test_env(OperationMode::Sim, TRIDENT2_CHANNELIZED_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();
        // Re-channelizing the port to 4x10G resolves fine but yields a
        // different applied map.
        let err = env
            .manager
            .verify_chassis_config(&channelized_config())
            .unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::RebootRequired));
    }

    #[tokio::test]
    async fn test_reboot_required_on_node_binding_change() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();
        let mut config = minimal_config();
        config.nodes[0].id = 200;
        config.singleton_ports[0].node = 200;
        let err = env.manager.verify_chassis_config(&config).unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::RebootRequired));
    }

    #[tokio::test]
    async fn test_portless_node_verifies_clean() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        let mut config = minimal_config();
        config.nodes.push(Node { id: 200, slot: 5 });
        env.manager.push_chassis_config(&config).unwrap();
        // The same config must not report a reboot just because one node
        // has no ports.
        env.manager.verify_chassis_config(&config).unwrap();
        let node_map = env.manager.get_node_id_to_unit_map().unwrap();
        assert_eq!(node_map.get(&200), Some(&None));
        assert_eq!(
            env.manager.get_unit_from_node_id(200).unwrap_err().error_code(),
            Some(ErrorCode::InvalidParam)
        );
    }

    #[tokio::test]
    async fn test_link_state_preserved_across_resync() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();
        env.manager.handle_linkscan_event(&LinkscanEvent {
            unit: 0,
            logical_port: 1,
            state: LinkState::Up,
        });
        assert_eq!(env.manager.get_port_state(1).unwrap(), LinkState::Up);

        env.manager.push_chassis_config(&minimal_config()).unwrap();
        assert_eq!(env.manager.get_port_state(1).unwrap(), LinkState::Up);
    }

    #[tokio::test]
    async fn test_transceiver_state_preserved_across_resync() {
        let env = test_env(OperationMode::Standalone, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();
        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::Present,
        });
        assert_eq!(
            env.manager.transceiver_state(5, 1),
            Some(TransceiverState::Ready)
        );

        env.manager.push_chassis_config(&minimal_config()).unwrap();
        assert_eq!(
            env.manager.transceiver_state(5, 1),
            Some(TransceiverState::Ready)
        );
    }

    #[tokio::test]
    async fn test_transceiver_insert_configures_group() {
        let env = test_env(OperationMode::Standalone, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();

        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::Present,
        });
        let options = env.sdk.port_options(0, 1).unwrap();
        assert_eq!(options.enabled, Some(true));
        assert_eq!(options.blocked, Some(false));
        assert_eq!(env.sdk.serdes_config_count(0, 1), 1);
        assert_eq!(
            env.manager.transceiver_state(5, 1),
            Some(TransceiverState::Ready)
        );
    }

    #[tokio::test]
    async fn test_transceiver_round_trip() {
        let env = test_env(OperationMode::Standalone, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();

        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::Present,
        });
        assert_eq!(env.sdk.port_options(0, 1).unwrap().enabled, Some(true));

        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::NotPresent,
        });
        let options = env.sdk.port_options(0, 1).unwrap();
        assert_eq!(options.enabled, Some(false));
        // Removal does not touch the block state.
        assert_eq!(options.blocked, Some(false));
        assert_eq!(
            env.manager.transceiver_state(5, 1),
            Some(TransceiverState::NotPresent)
        );

        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::Present,
        });
        assert_eq!(env.sdk.port_options(0, 1).unwrap().enabled, Some(true));
        assert_eq!(
            env.manager.transceiver_state(5, 1),
            Some(TransceiverState::Ready)
        );
        assert_eq!(env.sdk.serdes_config_count(0, 1), 2);
    }

    #[tokio::test]
    async fn test_transceiver_anomalies_ignored() {
        let env = test_env(OperationMode::Standalone, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();

        // Not-present for a port never seen is discarded.
        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::NotPresent,
        });
        assert_eq!(
            env.manager.transceiver_state(5, 1),
            Some(TransceiverState::Unknown)
        );

        // Present for a ready port is discarded.
        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::Present,
        });
        let serdes_count = env.sdk.serdes_config_count(0, 1);
        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::Present,
        });
        assert_eq!(env.sdk.serdes_config_count(0, 1), serdes_count);

        // States other than present/not-present are discarded.
        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::Unknown,
        });
        assert_eq!(
            env.manager.transceiver_state(5, 1),
            Some(TransceiverState::Ready)
        );
    }

    #[tokio::test]
    async fn test_linkscan_event_updates_state_and_notifies() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        env.manager.register_event_notify_writer(tx).unwrap();
        env.manager.handle_linkscan_event(&LinkscanEvent {
            unit: 0,
            logical_port: 1,
            state: LinkState::Up,
        });
        assert_eq!(env.manager.get_port_state(1).unwrap(), LinkState::Up);
        assert_eq!(
            rx.try_recv().unwrap(),
            GnmiEvent::PortOperStateChanged {
                node_id: 100,
                port_id: 1,
                state: LinkState::Up,
            }
        );
    }

    #[tokio::test]
    async fn test_linkscan_event_for_unknown_port_dropped() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        env.manager.register_event_notify_writer(tx).unwrap();
        env.manager.handle_linkscan_event(&LinkscanEvent {
            unit: 0,
            logical_port: 99,
            state: LinkState::Up,
        });
        assert_eq!(env.manager.get_port_state(1).unwrap(), LinkState::Unknown);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_notify_writer_dropped() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        env.manager.register_event_notify_writer(tx).unwrap();
        drop(rx);
        env.manager.handle_linkscan_event(&LinkscanEvent {
            unit: 0,
            logical_port: 1,
            state: LinkState::Down,
        });
        assert!(!env.manager.has_notify_writer());
    }

    #[tokio::test]
    async fn test_events_flow_through_channels() {
        let env = test_env(OperationMode::Standalone, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();

        assert!(env.phal.inject_transceiver_event(TransceiverEvent {
            slot: 5,
            port: 1,
            state: TransceiverState::Present,
        }));
        assert!(env.sdk.inject_linkscan_event(LinkscanEvent {
            unit: 0,
            logical_port: 1,
            state: LinkState::Up,
        }));

        // The detached readers drain the channels; wait for both effects.
        for _ in 0..100 {
            if env.manager.transceiver_state(5, 1)
                == Some(TransceiverState::Ready)
                && env.manager.get_port_state(1).unwrap() == LinkState::Up
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("events were not processed");
    }

    #[tokio::test]
    async fn test_flex_push_and_speed_change() {
        let env = test_env(OperationMode::Standalone, TOMAHAWK_FLEX_BASE);
        env.manager.push_chassis_config(&flex_config(TWENTY_FIVE_GIG_BPS)).unwrap();

        // The applied map carries all four lanes; each got its configured
        // speed pushed during the flex pass.
        for logical in 1..=4 {
            let options = env.sdk.port_options(0, logical).unwrap();
            assert_eq!(options.speed_bps, Some(TWENTY_FIVE_GIG_BPS));
        }
        // Make the group ready.
        env.manager.handle_transceiver_event(&TransceiverEvent {
            slot: 1,
            port: 2,
            state: TransceiverState::Present,
        });
        assert_eq!(
            env.manager.transceiver_state(1, 2),
            Some(TransceiverState::Ready)
        );

        // Re-channelizing to 2x50G keeps the applied map, so the change
        // goes through the reconfigure path.
        env.manager.verify_chassis_config(&flex_config(FIFTY_GIG_BPS)).unwrap();
        env.manager.push_chassis_config(&flex_config(FIFTY_GIG_BPS)).unwrap();

        // The 50G lanes live on logical ports 1 and 3 and were re-enabled
        // by the options pass.
        for logical in [1, 3] {
            let options = env.sdk.port_options(0, logical).unwrap();
            assert_eq!(options.speed_bps, Some(FIFTY_GIG_BPS));
            assert_eq!(options.enabled, Some(true));
            assert_eq!(options.blocked, Some(false));
        }
        // The min-speed lanes not used by the new channelization stay
        // disabled and blocked.
        for logical in [2, 4] {
            let options = env.sdk.port_options(0, logical).unwrap();
            assert_eq!(options.speed_bps, Some(TWENTY_FIVE_GIG_BPS));
            assert_eq!(options.enabled, Some(false));
            assert_eq!(options.blocked, Some(true));
        }
        assert_eq!(
            env.manager.transceiver_state(1, 2),
            Some(TransceiverState::Ready)
        );

        // The speed change disabled the full min-speed listing -- all
        // four lanes -- before writing the new speed.
        let history = env.sdk.option_history();
        let disable_idx: Vec<usize> = history
            .iter()
            .enumerate()
            .filter(|(_, (_, _, o))| {
                o.enabled == Some(false) && o.blocked == Some(true)
            })
            .map(|(i, _)| i)
            .collect();
        let speed_50_idx = history
            .iter()
            .position(|(_, _, o)| o.speed_bps == Some(FIFTY_GIG_BPS))
            .unwrap();
        let disabled_ports: BTreeSet<i32> = history
            .iter()
            .filter(|(_, _, o)| {
                o.enabled == Some(false) && o.blocked == Some(true)
            })
            .map(|(_, logical, _)| *logical)
            .collect();
        assert_eq!(disabled_ports, BTreeSet::from([1, 2, 3, 4]));
        assert!(disable_idx.iter().filter(|i| **i < speed_50_idx).count() >= 4);
    }

    #[tokio::test]
    async fn test_flex_same_speed_is_noop() {
        let env = test_env(OperationMode::Standalone, TOMAHAWK_FLEX_BASE);
        env.manager.push_chassis_config(&flex_config(TWENTY_FIVE_GIG_BPS)).unwrap();
        let speed_writes = |history: Vec<(i32, i32, PortOptions)>| {
            history.iter().filter(|(_, _, o)| o.speed_bps.is_some()).count()
        };
        let before = speed_writes(env.sdk.option_history());
        env.manager.push_chassis_config(&flex_config(TWENTY_FIVE_GIG_BPS)).unwrap();
        // The hardware already carries the configured speed, so the flex
        // pass writes no speed at all on the second push.
        let after = speed_writes(env.sdk.option_history());
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let env = test_env(OperationMode::Sim, TRIDENT2_BASE);
        env.manager.push_chassis_config(&minimal_config()).unwrap();
        env.manager.shutdown().unwrap();

        assert_eq!(env.sdk.shutdown_calls(), 1);
        assert!(!env.sdk.has_linkscan_writer());
        assert!(!env.phal.has_transceiver_writer());
        assert_eq!(
            env.manager.get_bcm_chip(0).unwrap_err().error_code(),
            Some(ErrorCode::NotInitialized)
        );
        // Events that race the shutdown are dropped, not processed.
        env.manager.handle_linkscan_event(&LinkscanEvent {
            unit: 0,
            logical_port: 1,
            state: LinkState::Up,
        });
    }
}
