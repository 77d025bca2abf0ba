// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Main application entry point for `chassisd`, the chassis manager for
//! BCM-based switches.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use futures::stream::StreamExt;
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use slog::{error, info};
use structopt::StructOpt;

use chassisd::config;
use chassisd::manager::ChassisManager;
use chassisd::serdes_db::BcmSerdesDbManager;
use chassisd::sim::{SimPhal, SimSdk};
use common::chassis_config::ChassisConfig;

fn read_chassis_config(path: &Path) -> anyhow::Result<ChassisConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading chassis config {}", path.display()))?;
    toml::from_str(&text)
        .with_context(|| format!("parsing chassis config {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = config::Opt::from_args();
    let config = config::build_config(&opt)?;
    let log = common::logging::init_logging(
        "chassisd",
        config.log_file.as_deref(),
        config.log_format,
    )?;

    // The in-tree backend is the simulator; real SDK bindings slot in
    // behind the same traits.
    let sdk = Arc::new(SimSdk::new(&log));
    let phal = Arc::new(SimPhal::new(&log));
    let serdes_db =
        Arc::new(BcmSerdesDbManager::new(&config.bcm_serdes_db_file));
    let manager = ChassisManager::new(
        config.mode,
        sdk,
        phal,
        serdes_db,
        config.manager_paths(),
        log.clone(),
    );

    let chassis_config_path = config
        .chassis_config_file
        .as_ref()
        .ok_or_else(|| anyhow!("no chassis config file given"))?;
    let chassis_config = read_chassis_config(chassis_config_path)?;

    if config.verify_only {
        manager
            .verify_chassis_config(&chassis_config)
            .context("chassis config failed verification")?;
        info!(log, "chassis config verified");
        return Ok(());
    }

    manager
        .verify_chassis_config(&chassis_config)
        .context("chassis config failed verification")?;
    manager
        .push_chassis_config(&chassis_config)
        .context("chassis config push failed")?;
    info!(log, "chassisd running"; "mode" => %config.mode);

    let mut signals = Signals::new([SIGINT, SIGQUIT, SIGTERM])
        .context("registering signal handler")?;
    if let Some(signal) = signals.next().await {
        info!(log, "caught signal; shutting down"; "signal" => signal);
    }
    if let Err(e) = manager.shutdown() {
        error!(log, "shutdown completed with errors"; "error" => %e);
        return Err(anyhow!("shutdown completed with errors: {e}"));
    }
    info!(log, "shutdown complete");
    Ok(())
}
