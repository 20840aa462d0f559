//! Live serial monitor
//!
//! Streams raw output from the freshly flashed device to the console until
//! Ctrl+C or a read error. On connect the monitor deasserts DTR and RTS so
//! the device leaves reset and boots the firmware that was just written,
//! then waits for the boot to settle before reading.

use crate::serial::port::{PortConfig, SerialConnection};
use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Pause between polls when the device has nothing buffered.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Read buffer sized for a burst of boot output.
const READ_BUF_SIZE: usize = 1024;

/// Set by the SIGINT handler, checked once per loop iteration.
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Configuration for a monitor session.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Port and baud rate to open
    pub port_config: PortConfig,
    /// Delay after deasserting DTR/RTS so the device can finish rebooting
    pub boot_delay: Duration,
    /// Mirror received output to this file with per-line timestamps
    pub log_file: Option<PathBuf>,
}

/// Serial output monitor. The port handle lives inside `run` and is closed
/// on every exit path when the connection goes out of scope.
pub struct SerialMonitor {
    config: MonitorConfig,
    bytes_received: u64,
}

impl SerialMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            bytes_received: 0,
        }
    }

    /// Open the port, reset the device, and stream until interrupted.
    pub fn run(&mut self) -> Result<()> {
        let mut conn = SerialConnection::open(self.config.port_config.clone())?;
        println!(
            "\n{} Connected to {} at {} baud",
            "[OK]".green().bold(),
            conn.config().path.white().bold(),
            conn.config().baud_rate
        );

        let mut log_sink = match &self.config.log_file {
            Some(path) => {
                let sink = LogSink::create(path)?;
                println!(
                    "{} Logging to: {}",
                    "[LOG]".cyan().bold(),
                    path.display().to_string().white()
                );
                Some(sink)
            }
            None => None,
        };

        STOP_REQUESTED.store(false, Ordering::SeqCst);
        install_stop_handler();

        // Deassert both control lines so the device leaves reset, then give
        // it time to reboot into the new firmware.
        conn.set_dtr(false)?;
        conn.set_rts(false)?;
        std::thread::sleep(self.config.boot_delay);

        println!("{}", "--- Serial monitor started ---".cyan().bold());
        println!("{}", "Press Ctrl+C to stop\n".yellow());

        let mut buf = [0u8; READ_BUF_SIZE];
        while !STOP_REQUESTED.load(Ordering::SeqCst) {
            let pending = match conn.bytes_available() {
                Ok(n) => n,
                Err(e) => {
                    eprintln!("\n{} {:#}", "[ERROR]".red().bold(), e);
                    break;
                }
            };

            if pending == 0 {
                std::thread::sleep(IDLE_POLL);
                continue;
            }

            let want = (pending as usize).min(buf.len());
            match conn.read(&mut buf[..want]) {
                Ok(0) => continue,
                Ok(n) => {
                    self.emit(&buf[..n], log_sink.as_mut())?;
                }
                // A timed-out or signal-interrupted read just means "try
                // again"; the stop flag decides whether we actually do.
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    eprintln!("\n{} Read error: {}", "[ERROR]".red().bold(), e);
                    break;
                }
            }
        }

        if STOP_REQUESTED.load(Ordering::SeqCst) {
            println!("\n{}", "Serial monitor stopped.".yellow());
        }

        if let Some(sink) = log_sink {
            sink.finish()
                .with_context(|| "Failed to flush monitor log")?;
        }
        self.print_summary();
        Ok(())
    }

    /// Decode a chunk lossily and print it without buffering delay.
    fn emit(&mut self, bytes: &[u8], log_sink: Option<&mut LogSink>) -> Result<()> {
        let text = String::from_utf8_lossy(bytes);
        print!("{}", text);
        io::stdout()
            .flush()
            .with_context(|| "Failed to flush stdout")?;

        self.bytes_received += bytes.len() as u64;

        if let Some(sink) = log_sink {
            sink.push(bytes)
                .with_context(|| "Failed to write monitor log")?;
        }
        Ok(())
    }

    fn print_summary(&self) {
        println!("{}", "=".repeat(60).dimmed());
        println!("Bytes received: {}", self.bytes_received);
        if let Some(ref path) = self.config.log_file {
            println!("Log saved to: {}", path.display());
        }
        println!("{}", "=".repeat(60).dimmed());
    }
}

/// Accumulates the raw stream and writes one timestamped log line per
/// newline-terminated chunk. Carriage returns are stripped.
struct LogSink {
    writer: BufWriter<File>,
    pending: Vec<u8>,
}

impl LogSink {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            pending: Vec::new(),
        })
    }

    fn push(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &byte in bytes {
            if byte == b'\n' {
                self.write_line()?;
            } else {
                self.pending.push(byte);
            }
        }
        Ok(())
    }

    fn write_line(&mut self) -> io::Result<()> {
        let line = String::from_utf8_lossy(&self.pending);
        let line = line.trim_end_matches('\r');
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(self.writer, "[{}] {}", timestamp, line)?;
        self.pending.clear();
        Ok(())
    }

    /// Flush the trailing partial line, if any, and the writer.
    fn finish(mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            self.write_line()?;
        }
        self.writer.flush()
    }
}

#[cfg(unix)]
fn install_stop_handler() {
    // Safety: the handler only stores to an atomic, which is
    // async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
    }
}

#[cfg(unix)]
extern "C" fn handle_sigint(_: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

// Without a handler the loop still ends on an I/O error, and the OS closes
// the port when the process dies.
#[cfg(not(unix))]
fn install_stop_handler() {}
