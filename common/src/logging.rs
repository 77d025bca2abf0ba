// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Logger bootstrap shared by the daemons in this workspace.

use std::fs::OpenOptions;
use std::str::FromStr;

use anyhow::Context;
use slog::Drain;

/// How log records are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-friendly terminal output.
    Human,
    /// Bunyan-style JSON, one record per line.
    #[default]
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format: {s}")),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LogFormat::Human => write!(f, "human"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

fn async_root(drain: impl Drain<Ok = (), Err = slog::Never> + Send + 'static, name: &str) -> slog::Logger {
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!("name" => name.to_string()))
}

/// Build the root logger.  Records go to `log_file` if one is given and to
/// stdout otherwise.
pub fn init_logging(
    name: &'static str,
    log_file: Option<&str>,
    format: LogFormat,
) -> anyhow::Result<slog::Logger> {
    let log = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path}"))?;
            match format {
                LogFormat::Human => {
                    let decorator = slog_term::PlainDecorator::new(file);
                    let drain =
                        slog_term::FullFormat::new(decorator).build().fuse();
                    async_root(drain, name)
                }
                LogFormat::Json => {
                    let drain = slog_bunyan::with_name(name, file).build().fuse();
                    async_root(drain, name)
                }
            }
        }
        None => match format {
            LogFormat::Human => {
                let decorator = slog_term::TermDecorator::new().build();
                let drain = slog_term::FullFormat::new(decorator).build().fuse();
                async_root(drain, name)
            }
            LogFormat::Json => {
                let drain =
                    slog_bunyan::with_name(name, std::io::stdout()).build().fuse();
                async_root(drain, name)
            }
        },
    };
    Ok(log)
}
