//! Firmware project resolution and validation
//!
//! A project is a directory holding the three images esptool writes:
//! `bootloader.bin`, `partitions.bin`, and `firmware.bin`. Every image must
//! be present and readable before any device command runs, because the erase
//! that precedes the write is irreversible.

use anyhow::{Context, Result};
use crc::{Crc, CRC_32_ISO_HDLC};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::device::ChipProfile;
use crate::flash::FlashError;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// A firmware image resolved on disk.
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub path: PathBuf,
    pub offset: u32,
    pub file_name: String,
    pub description: String,
}

/// Size and checksum of one image, reported before flashing.
#[derive(Debug, Clone)]
pub struct ImageSummary {
    pub file_name: String,
    pub description: String,
    pub offset: u32,
    pub size: u64,
    pub crc32: u32,
}

/// A validated firmware project directory.
#[derive(Debug, Clone)]
pub struct FirmwareProject {
    pub name: String,
    pub dir: PathBuf,
    /// Images in flash-offset order, as the profile lists them
    pub images: Vec<ResolvedImage>,
}

impl FirmwareProject {
    /// Resolve `name` under `base_dir` and check that every image the
    /// profile requires exists. The first missing image is named in the
    /// error, before anything touches the device.
    pub fn locate(base_dir: &Path, name: &str, profile: &ChipProfile) -> Result<Self, FlashError> {
        let dir = base_dir.join(name);
        if !dir.is_dir() {
            return Err(FlashError::ProjectNotFound(dir));
        }

        let mut images = Vec::with_capacity(profile.flash_images.len());
        for expected in &profile.flash_images {
            let path = dir.join(&expected.file_name);
            if !path.is_file() {
                return Err(FlashError::MissingImage {
                    name: expected.file_name.clone(),
                    dir,
                });
            }
            images.push(ResolvedImage {
                path,
                offset: expected.offset,
                file_name: expected.file_name.clone(),
                description: expected.description.clone(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            dir,
            images,
        })
    }

    /// Size and CRC32 of each image, in flash-offset order.
    ///
    /// Reading the images up front doubles as the readability check before
    /// the irreversible erase.
    pub fn image_summaries(&self) -> Result<Vec<ImageSummary>> {
        self.images
            .iter()
            .map(|image| {
                let data = fs::read(&image.path)
                    .with_context(|| format!("Failed to read {}", image.path.display()))?;
                Ok(ImageSummary {
                    file_name: image.file_name.clone(),
                    description: image.description.clone(),
                    offset: image.offset,
                    size: data.len() as u64,
                    crc32: CRC32.checksum(&data),
                })
            })
            .collect()
    }
}

/// Directories directly under `base_dir` that hold every required image.
/// Used to suggest valid projects when the requested one is missing.
pub fn discover_projects(base_dir: &Path, profile: &ChipProfile) -> Vec<String> {
    let mut found = Vec::new();

    for entry in WalkDir::new(base_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.path();
        if profile
            .flash_images
            .iter()
            .all(|image| dir.join(&image.file_name).is_file())
        {
            if let Some(name) = entry.file_name().to_str() {
                found.push(name.to_string());
            }
        }
    }

    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ESP32_CAM_PROFILE;
    use std::fs;

    fn make_project(base: &Path, name: &str, files: &[&str]) {
        let dir = base.join(name);
        fs::create_dir_all(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), b"image contents").unwrap();
        }
    }

    const ALL_IMAGES: &[&str] = &["bootloader.bin", "partitions.bin", "firmware.bin"];

    #[test]
    fn test_locate_complete_project() {
        let base = tempfile::tempdir().unwrap();
        make_project(base.path(), "blink", ALL_IMAGES);

        let project = FirmwareProject::locate(base.path(), "blink", &ESP32_CAM_PROFILE).unwrap();
        assert_eq!(project.name, "blink");
        assert_eq!(project.images.len(), 3);

        let offsets: Vec<u32> = project.images.iter().map(|i| i.offset).collect();
        assert_eq!(offsets, vec![0x1000, 0x8000, 0x10000]);
    }

    #[test]
    fn test_locate_missing_directory() {
        let base = tempfile::tempdir().unwrap();
        let err = FirmwareProject::locate(base.path(), "nope", &ESP32_CAM_PROFILE).unwrap_err();
        assert!(matches!(err, FlashError::ProjectNotFound(_)));
    }

    #[test]
    fn test_locate_missing_firmware_image() {
        let base = tempfile::tempdir().unwrap();
        make_project(base.path(), "partial", &["bootloader.bin", "partitions.bin"]);

        let err = FirmwareProject::locate(base.path(), "partial", &ESP32_CAM_PROFILE).unwrap_err();
        match err {
            FlashError::MissingImage { name, .. } => assert_eq!(name, "firmware.bin"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_image_order_independent_of_creation_order() {
        let base = tempfile::tempdir().unwrap();
        // Created in reverse of the flash order on purpose
        make_project(
            base.path(),
            "reversed",
            &["firmware.bin", "partitions.bin", "bootloader.bin"],
        );

        let project =
            FirmwareProject::locate(base.path(), "reversed", &ESP32_CAM_PROFILE).unwrap();
        let names: Vec<&str> = project
            .images
            .iter()
            .map(|i| i.file_name.as_str())
            .collect();
        assert_eq!(names, vec!["bootloader.bin", "partitions.bin", "firmware.bin"]);
    }

    #[test]
    fn test_image_summaries() {
        let base = tempfile::tempdir().unwrap();
        make_project(base.path(), "blink", ALL_IMAGES);
        // Known CRC32 check vector
        fs::write(base.path().join("blink/firmware.bin"), b"123456789").unwrap();

        let project = FirmwareProject::locate(base.path(), "blink", &ESP32_CAM_PROFILE).unwrap();
        let summaries = project.image_summaries().unwrap();

        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[2].file_name, "firmware.bin");
        assert_eq!(summaries[2].size, 9);
        assert_eq!(summaries[2].crc32, 0xcbf4_3926);
    }

    #[test]
    fn test_summaries_fail_on_unreadable_image() {
        let base = tempfile::tempdir().unwrap();
        make_project(base.path(), "blink", ALL_IMAGES);

        let project = FirmwareProject::locate(base.path(), "blink", &ESP32_CAM_PROFILE).unwrap();
        fs::remove_file(base.path().join("blink/partitions.bin")).unwrap();

        assert!(project.image_summaries().is_err());
    }

    #[test]
    fn test_discover_projects() {
        let base = tempfile::tempdir().unwrap();
        make_project(base.path(), "complete-a", ALL_IMAGES);
        make_project(base.path(), "complete-b", ALL_IMAGES);
        make_project(base.path(), "partial", &["firmware.bin"]);
        fs::write(base.path().join("stray.txt"), b"not a project").unwrap();

        let found = discover_projects(base.path(), &ESP32_CAM_PROFILE);
        assert_eq!(found, vec!["complete-a", "complete-b"]);
    }
}
