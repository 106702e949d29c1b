pub mod bridge;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod imageio;
pub mod logging;
pub mod metadata;
pub mod plane;
pub mod process;
pub mod resolve;

use crate::bridge::BridgeBuilder;
use crate::config::Settings;
use crate::engine::KERNEL_LOGGER;
use crate::engine::Launcher;
use crate::error::RunError;
use crate::process::OutputRecord;
use crate::resolve::Invocation;
use log::LevelFilter;

/// Engine version every run is pinned to.
pub const ENGINE_VERSION: &str = "1.0.0";

/// Start the engine, filter every file of `invocation`, stop the engine.
///
/// The engine is stopped exactly once whether the run succeeds, fails or
/// panics.
pub fn run(
    invocation: &Invocation,
    settings: &Settings,
    launcher: &dyn Launcher,
) -> Result<Vec<OutputRecord>, RunError> {
    std::fs::create_dir_all(&invocation.out_dir).map_err(|source| RunError::OutputDirectory {
        path: invocation.out_dir.clone(),
        source,
    })?;

    // kernel construction is logged per axis and per image
    let bridge = BridgeBuilder::new(ENGINE_VERSION)
        .when_started(|engine| engine.set_logger_level(KERNEL_LOGGER, LevelFilter::Warn))
        .start(launcher)?;

    bridge.scope(|engine| {
        process::process_all(engine, invocation, settings).map_err(RunError::from)
    })
}
