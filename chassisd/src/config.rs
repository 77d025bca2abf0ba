// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Runtime configuration for `chassisd`.

use std::path::PathBuf;

use structopt::StructOpt;

use common::chassis_config::OperationMode;
use common::logging::LogFormat;
use common::status::HalResult;

use crate::manager::ManagerPaths;

#[derive(Debug, Default, StructOpt)]
#[structopt(name = "chassisd", about = "chassis manager for BCM-based switches")]
pub struct Opt {
    #[structopt(
        long,
        help = "send log data to the named file rather than stdout"
    )]
    log_file: Option<String>,

    #[structopt(
        long,
        short = "l",
        help = "format logs for 'human' or 'json' consumption"
    )]
    log_format: Option<LogFormat>,

    #[structopt(long, help = "operation mode: 'standalone' or 'sim'")]
    mode: Option<OperationMode>,

    #[structopt(long, help = "file holding the base chassis map inventory")]
    base_bcm_chassis_map_file: Option<PathBuf>,

    #[structopt(
        long,
        help = "where to write the SDK config file generated at bring-up"
    )]
    bcm_sdk_config_file: Option<PathBuf>,

    #[structopt(long, help = "the SDK config flush file")]
    bcm_sdk_config_flush_file: Option<PathBuf>,

    #[structopt(long, help = "the SDK diag shell log file")]
    bcm_sdk_shell_log_file: Option<PathBuf>,

    #[structopt(
        long,
        help = "directory used by the SDK to save checkpoints; created if \
                missing"
    )]
    bcm_sdk_checkpoint_dir: Option<PathBuf>,

    #[structopt(
        long,
        help = "file holding the serdes settings database (standalone mode)"
    )]
    bcm_serdes_db_file: Option<PathBuf>,

    #[structopt(long, help = "chassis config to push at startup")]
    chassis_config: Option<PathBuf>,

    #[structopt(
        long,
        help = "resolve and verify the chassis config, then exit"
    )]
    verify_only: bool,
}

/// All of the run-time settings controlled by command-line options.
#[derive(Debug)]
pub struct Config {
    /// If set, where the log should be written.  If not set, the log goes
    /// to stdout.
    pub log_file: Option<String>,

    /// Output log info in unstructured text or json?
    pub log_format: LogFormat,

    /// How the manager drives the hardware.
    pub mode: OperationMode,

    /// The vendor inventory of candidate chassis maps.
    pub base_bcm_chassis_map_file: PathBuf,

    /// The BCM config file loaded by the SDK while initializing.
    pub bcm_sdk_config_file: PathBuf,

    /// The BCM config flush file loaded by the SDK while initializing.
    pub bcm_sdk_config_flush_file: PathBuf,

    /// The BCM shell log file.
    pub bcm_sdk_shell_log_file: PathBuf,

    /// The directory used by the SDK to save checkpoints; created if
    /// missing.
    pub bcm_sdk_checkpoint_dir: PathBuf,

    /// The serdes settings database, loaded in standalone mode.
    pub bcm_serdes_db_file: PathBuf,

    /// The chassis config to push at startup.
    pub chassis_config_file: Option<PathBuf>,

    /// Resolve and verify the config, then exit without touching
    /// hardware.
    pub verify_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_file: None,
            log_format: LogFormat::Json,
            mode: OperationMode::Sim,
            base_bcm_chassis_map_file: PathBuf::from(
                "/etc/chassisd/base_bcm_chassis_map.toml",
            ),
            bcm_sdk_config_file: PathBuf::from("/tmp/chassisd/config.bcm"),
            bcm_sdk_config_flush_file: PathBuf::from(
                "/tmp/chassisd/config.bcm.tmp",
            ),
            bcm_sdk_shell_log_file: PathBuf::from("/tmp/chassisd/bcm.log"),
            bcm_sdk_checkpoint_dir: PathBuf::from(
                "/tmp/chassisd/sdk_checkpoint",
            ),
            bcm_serdes_db_file: PathBuf::from(
                "/etc/chassisd/bcm_serdes_db.toml",
            ),
            chassis_config_file: None,
            verify_only: false,
        }
    }
}

impl Config {
    /// The file locations the chassis manager works with.
    pub fn manager_paths(&self) -> ManagerPaths {
        ManagerPaths {
            base_chassis_map_file: self.base_bcm_chassis_map_file.clone(),
            sdk_config_file: self.bcm_sdk_config_file.clone(),
            sdk_config_flush_file: self.bcm_sdk_config_flush_file.clone(),
            sdk_shell_log_file: self.bcm_sdk_shell_log_file.clone(),
            sdk_checkpoint_dir: self.bcm_sdk_checkpoint_dir.clone(),
        }
    }
}

// Use the command-line arguments to update the run-time config.
fn update_from_cli(opts: &Opt, config: &mut Config) -> HalResult<()> {
    if let Some(log_file) = &opts.log_file {
        config.log_file = Some(log_file.to_string());
    }
    if let Some(log_format) = opts.log_format {
        config.log_format = log_format;
    }
    if let Some(mode) = opts.mode {
        config.mode = mode;
    }
    if let Some(path) = &opts.base_bcm_chassis_map_file {
        config.base_bcm_chassis_map_file = path.clone();
    }
    if let Some(path) = &opts.bcm_sdk_config_file {
        config.bcm_sdk_config_file = path.clone();
    }
    if let Some(path) = &opts.bcm_sdk_config_flush_file {
        config.bcm_sdk_config_flush_file = path.clone();
    }
    if let Some(path) = &opts.bcm_sdk_shell_log_file {
        config.bcm_sdk_shell_log_file = path.clone();
    }
    if let Some(path) = &opts.bcm_sdk_checkpoint_dir {
        config.bcm_sdk_checkpoint_dir = path.clone();
    }
    if let Some(path) = &opts.bcm_serdes_db_file {
        config.bcm_serdes_db_file = path.clone();
    }
    if let Some(path) = &opts.chassis_config {
        config.chassis_config_file = Some(path.clone());
    }
    config.verify_only = opts.verify_only;
    Ok(())
}

/// Build the Config struct containing the tunable settings used to adjust
/// the daemon's behavior.
pub fn build_config(opts: &Opt) -> HalResult<Config> {
    let mut config = Config::default();
    update_from_cli(opts, &mut config)?;
    Ok(config)
}
