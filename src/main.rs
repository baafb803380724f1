//! `apex` command-line entry point
//!
//! # Usage
//!
//! List the configured instruments and their identities:
//! ```bash
//! apex --config apex.toml id
//! ```
//!
//! List the modules of an AP1000 mainframe:
//! ```bash
//! apex slots --host 192.168.0.10
//! ```
//!
//! Read an Etuve chamber, optionally changing its setpoint:
//! ```bash
//! apex etuve --port /dev/ttyUSB0 --setpoint 40
//! ```
//!
//! `--simulate` runs every command against in-process simulators.

use std::path::PathBuf;

use anyhow::{Context, Result};
use apex_core::limits::AP1000_SLOT_MAX;
use apex_core::transport::DEFAULT_TCP_PORT;
use apex_daq::config::{ApexConfig, DEFAULT_CONFIG_FILE};
use apex_daq::{logging, DeviceRegistry};
use apex_driver_ap1000::Ap1000;
use apex_driver_etuve::Etuve;
use apex_driver_mock::{Ap1000Simulator, EtuveSimulator};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "apex")]
#[command(about = "Remote control of Apex Technologies optical instruments", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Use simulated instruments instead of hardware
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect the configured instruments and print their identities
    Id,

    /// List the modules installed in an AP1000 mainframe
    Slots {
        /// Mainframe host name or IP address
        #[arg(long, default_value = "localhost")]
        host: String,

        /// TCP port
        #[arg(long, default_value_t = DEFAULT_TCP_PORT)]
        port: u16,

        /// Highest slot to scan
        #[arg(long, default_value_t = AP1000_SLOT_MAX)]
        max_slot: u8,
    },

    /// Read the temperatures of an Etuve chamber
    Etuve {
        /// Serial port of the chamber
        #[arg(long)]
        port: String,

        /// New setpoint in °C
        #[arg(long)]
        setpoint: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ApexConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;
    apex_daq::link_drivers();

    match cli.command {
        Commands::Id => list_identities(&config, cli.simulate).await,
        Commands::Slots { host, port, max_slot } => list_slots(&host, port, max_slot, cli.simulate).await,
        Commands::Etuve { port, setpoint } => read_etuve(&port, setpoint, cli.simulate).await,
    }
}

async fn list_identities(config: &ApexConfig, simulate: bool) -> Result<()> {
    let mut registry = if simulate {
        DeviceRegistry::with_simulated_factories()
    } else {
        DeviceRegistry::with_default_factories()
    };
    registry.register_all(config).await?;

    if registry.is_empty() {
        println!("No instrument configured");
        return Ok(());
    }
    for device in registry.list_devices() {
        let capabilities: Vec<_> = device.capabilities.iter().map(|c| c.name()).collect();
        println!(
            "{:<16} {:<8} {}  [{}]",
            device.id,
            device.kind,
            device.identity.as_deref().unwrap_or("-"),
            capabilities.join(", ")
        );
        if let Some((min, max)) = device.wavelength_range {
            println!("{:<16} {:<8} wavelength {:.3} - {:.3} nm", "", "", min, max);
        }
    }
    Ok(())
}

async fn list_slots(host: &str, port: u16, max_slot: u8, simulate: bool) -> Result<()> {
    let mainframe = if simulate {
        let (conn, _log) = Ap1000Simulator::with_default_slots().spawn();
        Ap1000::from_connection(conn)
    } else {
        Ap1000::connect(host, Some(port)).await?
    };

    println!("{}", mainframe.id().await?);
    for (slot, content) in mainframe.scan_slots(max_slot).await? {
        println!("slot {:>2}: {}", slot, content);
    }
    mainframe.close().await?;
    Ok(())
}

async fn read_etuve(port: &str, setpoint: Option<f64>, simulate: bool) -> Result<()> {
    let etuve = if simulate {
        let (conn, _handle) = EtuveSimulator::new().spawn();
        Etuve::from_connection(conn, port)
    } else {
        Etuve::open(port).await?
    };

    if let Some(celsius) = setpoint {
        etuve.set_setpoint(celsius).await?;
    }
    println!("{}", etuve);
    println!("actual   {:.1} °C", etuve.actual_temperature().await?);
    println!("setpoint {:.1} °C", etuve.setpoint_temperature().await?);
    etuve.close().await?;
    Ok(())
}
