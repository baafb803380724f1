//! Registry factories for the AB3380 and AB3510 boards.
//!
//! Boards are opened through libusb, which is only available with the `usb`
//! feature. Without it the factories still validate configurations but
//! refuse to build.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use apex_core::capabilities::WavelengthTunable;
use apex_core::driver::{Capability, DeviceComponents, DriverFactory};
use apex_core::limits::AB3510_CHANNELS;
use futures::future::BoxFuture;
use serde::Deserialize;

use crate::ab3380::{Ab3380, Ab3380Filter};
use crate::ab3510::{Ab3510, Ab3510Sensor, Ab3510Source};

fn default_filter() -> u8 {
    1
}

/// Configuration of one AB3380 filter.
#[derive(Debug, Clone, Deserialize)]
pub struct Ab3380Config {
    /// Board index among the connected AB3380
    #[serde(default)]
    pub handle: usize,
    /// Filter number, 1 or 2
    #[serde(default = "default_filter")]
    pub filter: u8,
    /// Initial wavelength in nm
    #[serde(default)]
    pub wavelength_nm: Option<f64>,
}

/// Configuration of one AB3510 reading.
#[derive(Debug, Clone, Deserialize)]
pub struct Ab3510Config {
    /// Board index among the connected AB3510
    #[serde(default)]
    pub handle: usize,
    /// Channel to read (1..=4); the board temperature when absent
    #[serde(default)]
    pub channel: Option<u8>,
}

impl Ab3510Config {
    fn source(&self) -> Ab3510Source {
        match self.channel {
            Some(ch) => Ab3510Source::Channel(ch),
            None => Ab3510Source::Temperature,
        }
    }
}

// =============================================================================
// Ab3380Factory - DriverFactory implementation
// =============================================================================

/// Factory for AB3380 filters.
pub struct Ab3380Factory;

static AB3380_CAPABILITIES: &[Capability] = &[Capability::WavelengthTunable];

impl DriverFactory for Ab3380Factory {
    fn driver_type(&self) -> &'static str {
        "ab3380"
    }

    fn name(&self) -> &'static str {
        "Apex AB3380 Dual Tunable Filter"
    }

    fn capabilities(&self) -> &'static [Capability] {
        AB3380_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Ab3380Config = config.clone().try_into()?;
        if !matches!(cfg.filter, 1 | 2) {
            return Err(anyhow!("AB3380 filter must be 1 or 2, got {}", cfg.filter));
        }
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: Ab3380Config = config.try_into().context("Invalid AB3380 config")?;
            let board = open_ab3380(cfg.handle).await?;
            build_ab3380(&cfg, board).await
        })
    }
}

#[cfg(feature = "usb")]
async fn open_ab3380(handle: usize) -> Result<Arc<Ab3380>> {
    let board = tokio::task::spawn_blocking(move || Ab3380::open_usb(handle))
        .await
        .map_err(|e| anyhow!("Task join error: {}", e))??;
    Ok(Arc::new(board))
}

#[cfg(not(feature = "usb"))]
async fn open_ab3380(_handle: usize) -> Result<Arc<Ab3380>> {
    Err(anyhow!("AB3380 support requires the `usb` feature"))
}

/// Register one filter of an open AB3380.
pub async fn build_ab3380(cfg: &Ab3380Config, board: Arc<Ab3380>) -> Result<DeviceComponents> {
    let serial = board.calibration().serial;
    let filter = Arc::new(Ab3380Filter::new(board, cfg.filter)?);
    if let Some(nm) = cfg.wavelength_nm {
        filter.set_wavelength(nm).await?;
    }
    tracing::info!(handle = cfg.handle, filter = cfg.filter, %serial, "AB3380 filter registered");
    Ok(DeviceComponents::new()
        .with_wavelength_tunable(filter)
        .with_identity(format!("AB3380 #{} ({}) filter {}", cfg.handle, serial, cfg.filter)))
}

// =============================================================================
// Ab3510Factory - DriverFactory implementation
// =============================================================================

/// Factory for AB3510 readings.
pub struct Ab3510Factory;

static AB3510_CAPABILITIES: &[Capability] = &[Capability::Readable];

impl DriverFactory for Ab3510Factory {
    fn driver_type(&self) -> &'static str {
        "ab3510"
    }

    fn name(&self) -> &'static str {
        "Apex AB3510 Quad Photodetector"
    }

    fn capabilities(&self) -> &'static [Capability] {
        AB3510_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Ab3510Config = config.clone().try_into()?;
        if let Some(ch) = cfg.channel {
            if ch == 0 || usize::from(ch) > AB3510_CHANNELS {
                return Err(anyhow!("AB3510 channel must be in 1..={}, got {}", AB3510_CHANNELS, ch));
            }
        }
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: Ab3510Config = config.try_into().context("Invalid AB3510 config")?;
            let board = open_ab3510(cfg.handle).await?;
            build_ab3510(&cfg, board)
        })
    }
}

#[cfg(feature = "usb")]
async fn open_ab3510(handle: usize) -> Result<Arc<Ab3510>> {
    let board = tokio::task::spawn_blocking(move || Ab3510::open_usb(handle))
        .await
        .map_err(|e| anyhow!("Task join error: {}", e))??;
    Ok(Arc::new(board))
}

#[cfg(not(feature = "usb"))]
async fn open_ab3510(_handle: usize) -> Result<Arc<Ab3510>> {
    Err(anyhow!("AB3510 support requires the `usb` feature"))
}

/// Register one reading of an open AB3510.
pub fn build_ab3510(cfg: &Ab3510Config, board: Arc<Ab3510>) -> Result<DeviceComponents> {
    let source = cfg.source();
    let sensor = Ab3510Sensor::new(board, source)?;
    tracing::info!(handle = cfg.handle, ?source, "AB3510 reading registered");
    Ok(DeviceComponents::new()
        .with_readable(Arc::new(sensor))
        .with_identity(format!("AB3510 #{} {:?}", cfg.handle, source)))
}
