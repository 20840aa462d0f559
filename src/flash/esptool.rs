//! External esptool dispatch
//!
//! esptool owns the serial bootloader protocol (sync, chunking, checksums,
//! retries); this module only guarantees the command ordering: a full chip
//! erase, then one combined write with the images at their fixed offsets.
//! The child process inherits stdio so esptool's own progress output is
//! visible.

use colored::Colorize;
use std::process::Command;

use crate::flash::{FirmwareProject, FlashError};

/// Runner for the external esptool program.
pub struct EspTool {
    program: String,
    chip_id: String,
}

impl EspTool {
    pub fn new(program: &str, chip_id: &str) -> Self {
        Self {
            program: program.to_string(),
            chip_id: chip_id.to_string(),
        }
    }

    /// Argument list for the full chip erase.
    pub fn erase_args(&self, port: &str) -> Vec<String> {
        vec![
            "--chip".to_string(),
            self.chip_id.clone(),
            "--port".to_string(),
            port.to_string(),
            "erase_flash".to_string(),
        ]
    }

    /// Argument list for the combined write, images in flash-offset order.
    pub fn write_args(&self, port: &str, project: &FirmwareProject) -> Vec<String> {
        let mut args = vec![
            "--chip".to_string(),
            self.chip_id.clone(),
            "--port".to_string(),
            port.to_string(),
            "write_flash".to_string(),
        ];
        for image in &project.images {
            args.push(format!("{:#x}", image.offset));
            args.push(image.path.display().to_string());
        }
        args
    }

    /// Full chip erase. Irreversible; callers validate the project first.
    pub fn erase_flash(&self, port: &str) -> Result<(), FlashError> {
        println!("{} Erasing flash...", "[*]".cyan().bold());
        self.run("erase_flash", self.erase_args(port))
    }

    /// Write all project images in one esptool invocation.
    pub fn write_flash(&self, port: &str, project: &FirmwareProject) -> Result<(), FlashError> {
        println!("{} Writing images:", "[*]".cyan().bold());
        for image in &project.images {
            println!(
                "  {:<9} {}",
                format!("{:#x}", image.offset),
                image.file_name
            );
        }
        self.run("write_flash", self.write_args(port, project))
    }

    fn run(&self, phase: &str, args: Vec<String>) -> Result<(), FlashError> {
        log::debug!("Running: {} {}", self.program, args.join(" "));

        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .map_err(|source| FlashError::ToolLaunch {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(FlashError::ToolFailed {
                program: self.program.clone(),
                phase: phase.to_string(),
                status,
            });
        }
        Ok(())
    }
}
