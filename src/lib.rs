//! # SampleHolder
//!
//! Control software for motorized multi-position sample holders with:
//! - A `run[...]` text command protocol over serial with JSON responses
//! - A software position model seeded from the firmware and advanced locally
//! - Shortest-path sample selection on a circular holder
//! - A firmware simulator for running without hardware
//!
//! ## Architecture
//!
//! SampleHolder is organized as a workspace with multiple crates:
//!
//! 1. **sampleholder-core** - Errors, holder state, sample geometry, events
//! 2. **sampleholder-communication** - Serial channel, protocol client, controller
//! 3. **sampleholder-settings** - Configuration file handling
//! 4. **sampleholder** - Command-line binary that integrates all crates

pub mod cli;

pub use sampleholder_communication::{
    list_ports, CommandArg, HolderConfig, HolderHandle, HolderStatus, InvokeResult, RunCommand,
    SampleHolderController, SerialPortInfo, SimulatedHolder, SprSource,
};

pub use sampleholder_core::{
    next_occupied, ConnectionError, ControllerError, Error, EventDispatcher, HolderEvent,
    HolderState, ProtocolError, Result, SampleGeometry,
};

pub use sampleholder_settings::{default_config_path, Config, ConnectionSettings, HolderSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging on stderr with:
/// - RUST_LOG environment variable support
/// - `info` by default, `debug` when `verbose` is set
/// - Target and thread names on every line
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    // stdout carries command output, so logs go to stderr
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
