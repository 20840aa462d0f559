//! ESP32-CAM device profile
//!
//! Static description of the one supported chip family: serial settings,
//! the fixed flash image layout, and the USB-to-serial bridge IDs used to
//! annotate port listings.

use once_cell::sync::Lazy;
use std::time::Duration;

/// A firmware image expected in every project directory, with its fixed
/// target offset in flash memory.
#[derive(Debug, Clone)]
pub struct FlashImage {
    /// Fixed file name inside the project directory
    pub file_name: String,
    /// Flash memory offset the image is written to
    pub offset: u32,
    /// What the image is
    pub description: String,
}

/// Serial settings for a device
#[derive(Debug, Clone)]
pub struct SerialSettings {
    /// Default baud rate
    pub baud_rate: u32,
    /// Common alternative baud rates
    pub alt_baud_rates: Vec<u32>,
}

/// Complete device profile for an esptool-flashable chip.
#[derive(Debug, Clone)]
pub struct ChipProfile {
    /// Device name
    pub name: String,
    /// Identifier passed to esptool's `--chip` argument
    pub chip_id: String,
    /// Device description
    pub description: String,
    /// Serial settings
    pub serial: SerialSettings,
    /// Delay after deasserting the reset lines before reading boot output
    pub boot_delay: Duration,
    /// Images written on every flash, in flash-offset order
    pub flash_images: Vec<FlashImage>,
    /// USB vendor IDs of bridges commonly wired to this device
    pub usb_vendor_ids: Vec<u16>,
    /// USB product IDs paired with the vendor IDs above
    pub usb_product_ids: Vec<u16>,
}

impl ChipProfile {
    /// Whether a USB VID/PID pair looks like a bridge this device ships with.
    pub fn is_known_bridge(&self, vid: u16, pid: u16) -> bool {
        self.usb_vendor_ids.contains(&vid) || self.usb_product_ids.contains(&pid)
    }

    /// Whether a baud rate is one of the usual rates for this device.
    pub fn is_usual_baud(&self, baud: u32) -> bool {
        baud == self.serial.baud_rate || self.serial.alt_baud_rates.contains(&baud)
    }
}

/// ESP32-CAM device profile
pub static ESP32_CAM_PROFILE: Lazy<ChipProfile> = Lazy::new(|| ChipProfile {
    name: "ESP32-CAM".to_string(),
    chip_id: "esp32".to_string(),
    description: "AI-Thinker ESP32-CAM (ESP32 with OV2640 camera)".to_string(),
    serial: SerialSettings {
        baud_rate: 115200,
        alt_baud_rates: vec![9600, 19200, 38400, 57600, 230400, 460800, 921600],
    },
    // ESP32 needs ~2s to come out of reset and start printing boot output
    boot_delay: Duration::from_secs(2),
    flash_images: vec![
        FlashImage {
            file_name: "bootloader.bin".to_string(),
            offset: 0x1000,
            description: "Second-stage bootloader".to_string(),
        },
        FlashImage {
            file_name: "partitions.bin".to_string(),
            offset: 0x8000,
            description: "Partition table".to_string(),
        },
        FlashImage {
            file_name: "firmware.bin".to_string(),
            offset: 0x10000,
            description: "Application image".to_string(),
        },
    ],
    usb_vendor_ids: vec![
        0x1a86, // WCH CH340 (the usual ESP32-CAM programmer boards)
        0x10c4, // Silicon Labs CP210x
        0x0403, // FTDI
        0x067b, // Prolific PL2303
    ],
    usb_product_ids: vec![
        0x7523, // CH340
        0xea60, // CP2102
        0x2303, // PL2303
    ],
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esp32_cam_profile() {
        let profile = &*ESP32_CAM_PROFILE;
        assert_eq!(profile.chip_id, "esp32");
        assert_eq!(profile.serial.baud_rate, 115200);
        assert_eq!(profile.boot_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_image_layout_order() {
        let profile = &*ESP32_CAM_PROFILE;
        let offsets: Vec<u32> = profile.flash_images.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0x1000, 0x8000, 0x10000]);

        let names: Vec<&str> = profile
            .flash_images
            .iter()
            .map(|i| i.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["bootloader.bin", "partitions.bin", "firmware.bin"]);
    }

    #[test]
    fn test_known_bridges() {
        let profile = &*ESP32_CAM_PROFILE;
        assert!(profile.is_known_bridge(0x1a86, 0x7523)); // CH340
        assert!(profile.is_known_bridge(0x10c4, 0xea60)); // CP2102
        assert!(!profile.is_known_bridge(0x303a, 0x1001)); // native USB, not a bridge
    }

    #[test]
    fn test_usual_bauds() {
        let profile = &*ESP32_CAM_PROFILE;
        assert!(profile.is_usual_baud(115200));
        assert!(profile.is_usual_baud(9600));
        assert!(!profile.is_usual_baud(123456));
    }
}
