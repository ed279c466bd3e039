// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: guest-run entrypoint wiring host stdio into a guest session
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests in session.rs

#![forbid(unsafe_code)]

mod session;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::warn;

use nexus_tty::{BindConfig, HostStreams};

use session::{GuestSession, Program, RunError};

/// Exit status used when the guest cannot be started.
const STARTUP_FAILURE: u8 = 66;

/// Run a guest program with its stdin/stdout/stderr bridged to this process.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// TOML file overriding the tty binding defaults.
    #[arg(short, long, env = "GUEST_RUN_CONFIG")]
    config: Option<PathBuf>,

    /// Guest program to run.
    #[arg(short, long, value_enum, default_value_t = Program::Cat)]
    program: Program,

    /// Arguments passed to the guest program.
    args: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(status) => ExitCode::from(status),
        Err(err) => {
            eprintln!("guest-run: {err}");
            ExitCode::from(STARTUP_FAILURE)
        }
    }
}

fn run(cli: Cli) -> Result<u8, RunError> {
    let config = match &cli.config {
        Some(path) => BindConfig::load(path)?,
        None => BindConfig::default(),
    };
    let mut session = GuestSession::boot(config, HostStreams::process())?;
    let status = session.run(cli.program, &cli.args);
    if let Err(err) = session.shutdown() {
        warn!("guest-run: shutdown: {err}");
    }
    Ok(status)
}
