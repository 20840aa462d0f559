//! Serial port discovery, selection, and connection management
//!
//! Finds the USB-to-serial ports an ESP32-CAM could be attached to, verifies
//! they can actually be opened right now, and wraps the open connection with
//! the control-line helpers the reset sequence needs.

use anyhow::{Context, Result};
use colored::Colorize;
use serialport::{SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;

use crate::device::ChipProfile;

/// Read timeout used by the openability probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(50);

/// Default read timeout for monitor connections.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Errors from port discovery and selection.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("no serial ports found - plug in your ESP32-CAM and try again")]
    NoPortsFound,

    #[error("invalid port selection '{input}': expected a number between 1 and {count}")]
    InvalidSelection { input: String, count: usize },
}

/// Configuration for a serial connection.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Serial port path (e.g., /dev/ttyUSB0, COM3)
    pub path: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout
    pub timeout: Duration,
}

impl PortConfig {
    pub fn new(path: &str, baud_rate: u32) -> Self {
        Self {
            path: path.to_string(),
            baud_rate,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An open, exclusively owned serial connection. The port is closed when the
/// connection is dropped.
pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    config: PortConfig,
}

impl SerialConnection {
    /// Open a serial connection with the given configuration.
    pub fn open(config: PortConfig) -> Result<Self> {
        let port = serialport::new(&config.path, config.baud_rate)
            .timeout(config.timeout)
            .open()
            .with_context(|| format!("Failed to open serial port {}", config.path))?;

        Ok(Self { port, config })
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Number of bytes buffered by the driver, ready to read.
    pub fn bytes_available(&mut self) -> Result<u32> {
        self.port
            .bytes_to_read()
            .with_context(|| format!("Failed to query {}", self.config.path))
    }

    /// Blocking bounded read. Returns the raw `io::Error` so callers can
    /// tell a timeout apart from a real failure.
    pub fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.port.read(buffer)
    }

    /// Set DTR (Data Terminal Ready) signal
    pub fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.port
            .write_data_terminal_ready(level)
            .with_context(|| "Failed to set DTR")
    }

    /// Set RTS (Request To Send) signal
    pub fn set_rts(&mut self, level: bool) -> Result<()> {
        self.port
            .write_request_to_send(level)
            .with_context(|| "Failed to set RTS")
    }
}

/// USB bridge details behind a candidate port, when the OS knows them.
#[derive(Debug, Clone)]
pub struct UsbBridge {
    pub vid: u16,
    pub pid: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// A candidate serial port.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub path: String,
    pub usb: Option<UsbBridge>,
}

impl PortInfo {
    fn from_serialport(info: serialport::SerialPortInfo) -> Self {
        let usb = match info.port_type {
            SerialPortType::UsbPort(usb) => Some(UsbBridge {
                vid: usb.vid,
                pid: usb.pid,
                manufacturer: usb.manufacturer,
                product: usb.product,
            }),
            _ => None,
        };

        Self {
            path: info.port_name,
            usb,
        }
    }

    /// Short annotation for listings: product name and VID:PID when known.
    fn annotation(&self) -> Option<String> {
        let usb = self.usb.as_ref()?;
        let ids = format!("{:04x}:{:04x}", usb.vid, usb.pid);
        match &usb.product {
            Some(product) => Some(format!("{}, {}", product, ids)),
            None => Some(ids),
        }
    }
}

/// True when a port name looks like a device an ESP32-CAM adapter would
/// enumerate as on this platform.
pub fn is_candidate_name(name: &str) -> bool {
    is_candidate_name_for(name, std::env::consts::OS)
}

fn is_candidate_name_for(name: &str, os: &str) -> bool {
    match os {
        "windows" => name.to_ascii_uppercase().starts_with("COM"),
        "macos" => name.starts_with("/dev/tty.") || name.starts_with("/dev/cu."),
        _ => name.contains("ttyUSB") || name.contains("ttyACM"),
    }
}

/// List candidate ports without probing them.
pub fn list_candidates() -> Result<Vec<PortInfo>> {
    let ports =
        serialport::available_ports().with_context(|| "Failed to enumerate serial ports")?;

    Ok(ports
        .into_iter()
        .filter(|p| is_candidate_name(&p.port_name))
        .map(PortInfo::from_serialport)
        .collect())
}

/// Whether the port can be opened right now. The probe opens and immediately
/// closes the port; it is a liveness hint, not a reservation.
fn probe_open(path: &str) -> bool {
    match serialport::new(path, 115_200).timeout(PROBE_TIMEOUT).open() {
        Ok(_) => true,
        Err(e) => {
            log::debug!("Probe of {} failed: {}", path, e);
            false
        }
    }
}

/// List candidate ports that were openable at the time of the call.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    Ok(list_candidates()?
        .into_iter()
        .filter(|info| probe_open(&info.path))
        .collect())
}

/// Parse a 1-based selection index typed by the user.
fn parse_selection(input: &str, count: usize) -> Result<usize, PortError> {
    let trimmed = input.trim();
    match trimmed.parse::<usize>() {
        Ok(n) if n >= 1 && n <= count => Ok(n - 1),
        _ => Err(PortError::InvalidSelection {
            input: trimmed.to_string(),
            count,
        }),
    }
}

/// Choose the port to flash through.
///
/// Zero openable candidates is fatal, one is auto-selected, and more than one
/// gets an indexed prompt. A non-numeric or out-of-range answer is fatal.
pub fn choose_port(profile: &ChipProfile) -> Result<PortInfo> {
    let mut ports = available_ports()?;

    if ports.is_empty() {
        return Err(PortError::NoPortsFound.into());
    }

    if ports.len() == 1 {
        let port = ports.remove(0);
        println!(
            "{} Auto-detected port: {}",
            "[OK]".green().bold(),
            port.path.white().bold()
        );
        return Ok(port);
    }

    println!("{}", "Available serial ports:".green().bold());
    let mut any_known = false;
    for (idx, info) in ports.iter().enumerate() {
        let known = info
            .usb
            .as_ref()
            .map(|usb| profile.is_known_bridge(usb.vid, usb.pid))
            .unwrap_or(false);
        any_known |= known;

        let mark = if known { "*" } else { " " };
        match info.annotation() {
            Some(note) => println!(
                "  {}: {}{} ({})",
                idx + 1,
                info.path.white().bold(),
                mark,
                note.dimmed()
            ),
            None => println!("  {}: {}{}", idx + 1, info.path.white().bold(), mark),
        }
    }
    if any_known {
        println!(
            "  {}",
            format!("* known {} USB bridge", profile.name).dimmed()
        );
    }

    print!("Select port number: ");
    io::stdout().flush().with_context(|| "Failed to flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .with_context(|| "Failed to read port selection")?;

    let idx = parse_selection(&line, ports.len())?;
    Ok(ports.remove(idx))
}

/// Print the annotated candidate list with per-port availability.
pub fn print_ports(profile: &ChipProfile) -> Result<()> {
    let candidates = list_candidates()?;

    if candidates.is_empty() {
        println!("{}", "No serial ports found".yellow());
        println!("\n{}", "Troubleshooting tips:".cyan().bold());
        println!("  1. Plug in the ESP32-CAM's USB-to-serial adapter");
        println!("  2. Check the device node exists: ls -la /dev/ttyUSB* /dev/ttyACM*");
        println!("  3. Add your user to the 'dialout' group: sudo usermod -aG dialout $USER");
        println!("  4. Check dmesg for connection events: dmesg | tail -20");
        return Ok(());
    }

    println!("{}", "Candidate serial ports:".green().bold());
    println!("{}", "=".repeat(60));

    for info in &candidates {
        let status = if probe_open(&info.path) {
            "[ok]  ".green().bold()
        } else {
            "[busy]".yellow().bold()
        };
        println!("\n{} {}", status, info.path.white().bold());

        if let Some(usb) = &info.usb {
            if let Some(ref mfg) = usb.manufacturer {
                println!("  Manufacturer: {}", mfg);
            }
            if let Some(ref product) = usb.product {
                println!("  Product: {}", product);
            }
            println!("  VID:PID: {:04x}:{:04x}", usb.vid, usb.pid);
            if profile.is_known_bridge(usb.vid, usb.pid) {
                println!("  {}", format!("Known {} bridge", profile.name).cyan());
            }
        }
    }

    println!("\n{}", "=".repeat(60));
    Ok(())
}
