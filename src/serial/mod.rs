//! Serial port communication module
//!
//! This module provides functionality for:
//! - Listing candidate USB-to-serial ports and probing their availability
//! - Interactive port selection
//! - The post-flash live serial monitor

pub mod monitor;
pub mod port;

pub use monitor::{MonitorConfig, SerialMonitor};
pub use port::{PortConfig, SerialConnection};
