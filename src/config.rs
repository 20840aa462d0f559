//! Tool configuration
//!
//! Resolves the base firmware directory, the esptool program name, and the
//! default monitor baud rate from an optional `camflash.toml` plus
//! command-line overrides. Precedence: command line > config file > default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file looked up in the current directory when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "camflash.toml";

/// esptool program invoked when neither the config file nor the command line
/// names one.
pub const DEFAULT_ESPTOOL: &str = "esptool.py";

/// Raw contents of `camflash.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub flasher: FlasherSection,
    #[serde(default)]
    pub monitor: MonitorSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlasherSection {
    /// Directory containing firmware project folders
    pub base_dir: Option<PathBuf>,
    /// esptool program to invoke
    pub esptool: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorSection {
    /// Default monitor baud rate
    pub baud: Option<u32>,
}

impl ConfigFile {
    /// Parse a config file that must exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse a config file if it exists; `None` when it doesn't.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if path.is_file() {
            Ok(Some(Self::load(path)?))
        } else {
            Ok(None)
        }
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing firmware project folders
    pub base_dir: PathBuf,
    /// esptool program to invoke
    pub esptool: String,
    /// Default monitor baud rate
    pub default_baud: u32,
}

impl Config {
    /// Merge the config file (when present) with command-line overrides.
    ///
    /// The base directory falls back to the current working directory and
    /// the baud rate to the device profile default.
    pub fn resolve(
        file: Option<ConfigFile>,
        base_dir_flag: Option<PathBuf>,
        esptool_flag: Option<String>,
        baud_flag: Option<u32>,
        profile_baud: u32,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();

        let base_dir = match base_dir_flag.or(file.flasher.base_dir) {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };

        let esptool = esptool_flag
            .or(file.flasher.esptool)
            .unwrap_or_else(|| DEFAULT_ESPTOOL.to_string());

        let default_baud = baud_flag.or(file.monitor.baud).unwrap_or(profile_baud);

        Ok(Self {
            base_dir,
            esptool,
            default_baud,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"
            [flasher]
            base_dir = "/srv/firmware"
            esptool = "esptool"

            [monitor]
            baud = 921600
            "#,
        );

        let config = ConfigFile::load(file.path()).unwrap();
        assert_eq!(
            config.flasher.base_dir.as_deref(),
            Some(Path::new("/srv/firmware"))
        );
        assert_eq!(config.flasher.esptool.as_deref(), Some("esptool"));
        assert_eq!(config.monitor.baud, Some(921600));
    }

    #[test]
    fn test_load_empty_config() {
        let file = write_config("");
        let config = ConfigFile::load(file.path()).unwrap();
        assert!(config.flasher.base_dir.is_none());
        assert!(config.monitor.baud.is_none());
    }

    #[test]
    fn test_load_malformed_config() {
        let file = write_config("[flasher\nbase_dir = 3");
        assert!(ConfigFile::load(file.path()).is_err());
    }

    #[test]
    fn test_load_optional_missing() {
        let result = ConfigFile::load_optional(Path::new("/nonexistent/camflash.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_resolve_flag_beats_file() {
        let file = ConfigFile {
            flasher: FlasherSection {
                base_dir: Some(PathBuf::from("/from/file")),
                esptool: Some("file-esptool".to_string()),
            },
            monitor: MonitorSection { baud: Some(9600) },
        };

        let config = Config::resolve(
            Some(file),
            Some(PathBuf::from("/from/flag")),
            Some("flag-esptool".to_string()),
            Some(460800),
            115200,
        )
        .unwrap();

        assert_eq!(config.base_dir, PathBuf::from("/from/flag"));
        assert_eq!(config.esptool, "flag-esptool");
        assert_eq!(config.default_baud, 460800);
    }

    #[test]
    fn test_resolve_file_beats_default() {
        let file = ConfigFile {
            flasher: FlasherSection {
                base_dir: Some(PathBuf::from("/from/file")),
                esptool: None,
            },
            monitor: MonitorSection { baud: Some(9600) },
        };

        let config = Config::resolve(Some(file), None, None, None, 115200).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/from/file"));
        assert_eq!(config.esptool, DEFAULT_ESPTOOL);
        assert_eq!(config.default_baud, 9600);
    }

    #[test]
    fn test_resolve_defaults() {
        let config = Config::resolve(None, None, None, None, 115200).unwrap();
        assert_eq!(config.esptool, DEFAULT_ESPTOOL);
        assert_eq!(config.default_baud, 115200);
        // base_dir falls back to the current directory
        assert!(config.base_dir.is_absolute());
    }
}
