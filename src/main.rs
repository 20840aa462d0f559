//! camflash - ESP32-CAM firmware flasher
//!
//! Flashes the bootloader, partition table, and application images of a
//! firmware project onto an ESP32-CAM over a USB serial adapter, then
//! optionally attaches a live serial monitor. The serial bootloader
//! protocol itself is delegated to the external esptool program; this tool
//! handles port discovery, project validation, command ordering, and the
//! post-flash monitor.
//!
//! # Usage
//!
//! ```bash
//! # Flash ./blink/{bootloader,partitions,firmware}.bin, prompting for a port
//! camflash blink
//!
//! # Fully non-interactive
//! camflash blink --port /dev/ttyUSB0 --monitor --baud 921600
//!
//! # Just inspect the candidate ports
//! camflash --list-ports
//! ```

mod config;
mod device;
mod flash;
mod serial;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use config::{Config, ConfigFile};
use device::{ChipProfile, ESP32_CAM_PROFILE};
use flash::{project, EspTool, FirmwareProject, FlashError};
use serial::{port, MonitorConfig, PortConfig, SerialMonitor};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "camflash")]
#[command(version)]
#[command(about = "Flash ESP32-CAM firmware over serial and watch the boot log")]
struct Cli {
    /// Firmware project folder under the base directory; prompted for when
    /// omitted
    project: Option<String>,

    /// Directory containing firmware project folders [default: current dir]
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Serial port to use, skipping discovery (e.g., /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Monitor baud rate [default: 115200]
    #[arg(short, long)]
    baud: Option<u32>,

    /// esptool program to invoke [default: esptool.py]
    #[arg(long)]
    esptool: Option<String>,

    /// Configuration file [default: ./camflash.toml when present]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Launch the serial monitor without asking
    #[arg(long, conflicts_with = "no_monitor")]
    monitor: bool,

    /// Skip the serial monitor entirely
    #[arg(long)]
    no_monitor: bool,

    /// Mirror monitor output to this file with timestamps
    #[arg(long)]
    log: Option<PathBuf>,

    /// List candidate serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli) {
        eprintln!();
        eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
        wait_for_enter();
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let profile = &*ESP32_CAM_PROFILE;

    if cli.list_ports {
        return port::print_ports(profile);
    }

    let config = load_config(&cli, profile)?;

    print_banner(profile);

    let project_name = match &cli.project {
        Some(name) => name.clone(),
        None => prompt("Enter the name of the project folder (with .bin files): ")?,
    };
    if project_name.is_empty() {
        bail!("No project name given");
    }

    let project = locate_project(&config, &project_name, profile)?;
    print_image_summary(&project)?;

    let port_path = match &cli.port {
        Some(path) => path.clone(),
        None => port::choose_port(profile)?.path,
    };

    let tool = EspTool::new(&config.esptool, &profile.chip_id);
    tool.erase_flash(&port_path)?;
    tool.write_flash(&port_path, &project)?;
    println!("{} Flash complete!", "[OK]".green().bold());

    if cli.no_monitor {
        return Ok(());
    }

    let choice = if cli.monitor {
        MonitorChoice::Launch {
            baud: config.default_baud,
            fell_back: false,
        }
    } else {
        let answer = prompt("Launch serial monitor? [Y/n] (optionally: 'Y <baud_rate>'): ")?;
        parse_monitor_answer(&answer, config.default_baud)
    };

    match choice {
        MonitorChoice::Declined => Ok(()),
        MonitorChoice::Launch { baud, fell_back } => {
            if fell_back {
                println!(
                    "{} Invalid baud rate. Using default {}.",
                    "[WARN]".yellow().bold(),
                    baud
                );
            }
            if !profile.is_usual_baud(baud) {
                log::warn!("{} is not a typical {} baud rate", baud, profile.name);
            }

            let monitor_config = MonitorConfig {
                port_config: PortConfig::new(&port_path, baud),
                boot_delay: profile.boot_delay,
                log_file: cli.log.clone(),
            };
            SerialMonitor::new(monitor_config).run()
        }
    }
}

/// Resolve the configuration from the optional config file and CLI flags.
fn load_config(cli: &Cli, profile: &ChipProfile) -> Result<Config> {
    let file = match &cli.config {
        // An explicitly named config file must exist
        Some(path) => Some(ConfigFile::load(path)?),
        None => ConfigFile::load_optional(Path::new(config::CONFIG_FILE_NAME))?,
    };

    Config::resolve(
        file,
        cli.base_dir.clone(),
        cli.esptool.clone(),
        cli.baud,
        profile.serial.baud_rate,
    )
}

/// Locate the project, suggesting complete sibling projects when the
/// requested directory does not exist.
fn locate_project(
    config: &Config,
    name: &str,
    profile: &ChipProfile,
) -> Result<FirmwareProject> {
    match FirmwareProject::locate(&config.base_dir, name, profile) {
        Ok(project) => Ok(project),
        Err(e @ FlashError::ProjectNotFound(_)) => {
            let known = project::discover_projects(&config.base_dir, profile);
            if !known.is_empty() {
                eprintln!(
                    "{} Projects under {}:",
                    "[HINT]".yellow().bold(),
                    config.base_dir.display()
                );
                for name in &known {
                    eprintln!("  {}", name);
                }
            }
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Print sizes and checksums of the images about to be written. Reading
/// them here is also the readability gate before the irreversible erase.
fn print_image_summary(project: &FirmwareProject) -> Result<()> {
    let summaries = project.image_summaries()?;

    println!(
        "{} {}",
        "Firmware project:".white().bold(),
        project.dir.display()
    );
    for s in &summaries {
        println!(
            "  {:<9} {:<16} {:>9} bytes  CRC32 {:08x}  ({})",
            format!("{:#x}", s.offset),
            s.file_name,
            s.size,
            s.crc32,
            s.description.dimmed()
        );
    }
    println!();
    Ok(())
}

fn print_banner(profile: &ChipProfile) {
    println!("{}", "=".repeat(60));
    println!("{}", format!("{} Flasher", profile.name).cyan().bold());
    println!("{}", profile.description.dimmed());
    println!("{}", "=".repeat(60));
    println!();
}

/// Print a prompt and read one trimmed line from stdin.
fn prompt(message: &str) -> Result<String> {
    print!("{}", message);
    io::stdout().flush().with_context(|| "Failed to flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .with_context(|| "Failed to read from stdin")?;
    Ok(line.trim().to_string())
}

/// The tool is often run from a double-clicked shortcut; keep the window
/// open long enough to read the error.
fn wait_for_enter() {
    print!("\nPress Enter to exit...");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().read_line(&mut line);
}

/// Outcome of the "launch serial monitor?" prompt.
#[derive(Debug, PartialEq, Eq)]
enum MonitorChoice {
    Declined,
    Launch { baud: u32, fell_back: bool },
}

/// Parse the monitor prompt answer. Anything not starting with `y` declines;
/// an unparsable baud token falls back to the default with a warning flag.
fn parse_monitor_answer(answer: &str, default_baud: u32) -> MonitorChoice {
    let answer = answer.trim().to_ascii_lowercase();
    if !answer.starts_with('y') {
        return MonitorChoice::Declined;
    }

    let mut tokens = answer.split_whitespace();
    let _ = tokens.next();
    match tokens.next() {
        None => MonitorChoice::Launch {
            baud: default_baud,
            fell_back: false,
        },
        Some(token) => match token.parse::<u32>() {
            Ok(baud) => MonitorChoice::Launch {
                baud,
                fell_back: false,
            },
            Err(_) => MonitorChoice::Launch {
                baud: default_baud,
                fell_back: true,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_answer_with_baud() {
        assert_eq!(
            parse_monitor_answer("y 9600", 115200),
            MonitorChoice::Launch {
                baud: 9600,
                fell_back: false
            }
        );
    }

    #[test]
    fn test_monitor_answer_plain_yes() {
        for answer in ["y", "Y", "yes", " y "] {
            assert_eq!(
                parse_monitor_answer(answer, 115200),
                MonitorChoice::Launch {
                    baud: 115200,
                    fell_back: false
                },
                "answer: {answer:?}"
            );
        }
    }

    #[test]
    fn test_monitor_answer_bad_baud_falls_back() {
        assert_eq!(
            parse_monitor_answer("y abc", 115200),
            MonitorChoice::Launch {
                baud: 115200,
                fell_back: true
            }
        );
    }

    #[test]
    fn test_monitor_answer_declined() {
        for answer in ["n", "no", "", "q 9600"] {
            assert_eq!(
                parse_monitor_answer(answer, 115200),
                MonitorChoice::Declined,
                "answer: {answer:?}"
            );
        }
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
