//! Firmware flashing pipeline
//!
//! This module provides functionality for:
//! - Resolving and validating a firmware project directory
//! - Driving the external esptool program that owns the actual serial
//!   bootloader protocol (erase, then write at fixed offsets)

pub mod esptool;
pub mod project;

pub use esptool::EspTool;
pub use project::FirmwareProject;

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors from project validation and esptool dispatch.
#[derive(Debug, Error)]
pub enum FlashError {
    #[error("project directory '{}' does not exist", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("'{name}' not found in {}", .dir.display())]
    MissingImage { name: String, dir: PathBuf },

    #[error("failed to launch {program}: {source}")]
    ToolLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {phase} failed with {status}")]
    ToolFailed {
        program: String,
        phase: String,
        status: ExitStatus,
    },
}
