//! AP2XXX equipment: connection, identity and the embedded instruments.
//!
//! ```rust,ignore
//! let ap = Ap2xxx::connect("192.168.1.20", None).await?;
//! let osa = ap.osa();
//! osa.set_span(2.0).await?;
//! osa.run(RunMode::Single).await?;
//! let spectrum = osa.data(Scale::Log, 1).await?;
//! ```

use std::fmt;

use apex_core::error::Result;
use apex_core::identity::Identity;
use apex_core::limits::{Ap2xxxLimits, AP2XXX_LIMITS};
use apex_core::transport::{DEFAULT_TCP_PORT, DEFAULT_TIMEOUT};
use apex_core::Connection;
use serde::Deserialize;

use crate::osa::Osa;
use crate::osa_fs::OsaFastSweep;
use crate::powermeter::Powermeter;
use crate::tls::Tls;

/// Instrument generation, selected from the model field of the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ap2xxxModel {
    /// Current AP2XXX OSA/OCSA family
    #[default]
    Ap2xxx,
    /// Legacy AP2040
    Ap2040,
    /// Legacy AP2050
    Ap2050,
}

impl Ap2xxxModel {
    /// Model of an identity such as `APEX Technologies/2041-B/...`.
    pub fn from_identity(identity: &Identity) -> Self {
        match identity.model() {
            Some(model) if model.starts_with("204") => Ap2xxxModel::Ap2040,
            Some(model) if model.starts_with("205") => Ap2xxxModel::Ap2050,
            _ => Ap2xxxModel::Ap2xxx,
        }
    }

    /// Wavelength, span, resolution and point-count limits.
    ///
    /// The legacy models share the numbers of the current family.
    pub fn limits(self) -> Ap2xxxLimits {
        AP2XXX_LIMITS
    }
}

impl fmt::Display for Ap2xxxModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Ap2xxxModel::Ap2xxx => "AP2XXX",
            Ap2xxxModel::Ap2040 => "AP2040",
            Ap2xxxModel::Ap2050 => "AP2050",
        };
        write!(f, "{}", name)
    }
}

/// AP2XXX heterodyne OSA.
#[derive(Debug, Clone)]
pub struct Ap2xxx {
    conn: Connection,
    model: Ap2xxxModel,
}

impl Ap2xxx {
    /// Connect over TCP and detect the model from the identity.
    pub async fn connect(host: &str, port: Option<u16>) -> Result<Self> {
        let port = port.unwrap_or(DEFAULT_TCP_PORT);
        let conn = Connection::connect_tcp(host, port, DEFAULT_TIMEOUT, "AP2XXX").await?;
        let mut equipment = Self::from_connection(conn);
        let id = equipment.identify().await?;
        tracing::info!(host, port, model = %equipment.model, id = %id, "connected to AP2XXX");
        Ok(equipment)
    }

    /// Wrap an existing connection. The model defaults to the current family
    /// until [`Ap2xxx::identify`] or [`Ap2xxx::with_model`] is called.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            model: Ap2xxxModel::default(),
        }
    }

    /// Force the model.
    pub fn with_model(mut self, model: Ap2xxxModel) -> Self {
        self.model = model;
        self
    }

    /// Read the identity and update the model from it.
    pub async fn identify(&mut self) -> Result<Identity> {
        let id = self.id().await?;
        self.model = Ap2xxxModel::from_identity(&id);
        Ok(id)
    }

    /// Model in use.
    pub fn model(&self) -> Ap2xxxModel {
        self.model
    }

    /// Shared connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Identity (`*IDN?`).
    pub async fn id(&self) -> Result<Identity> {
        Ok(Identity::new(self.conn.query("*IDN?").await?))
    }

    /// Equipment type, `"AP"` followed by the model field of the identity.
    pub async fn osa_type(&self) -> Result<String> {
        let id = self.id().await?;
        Ok(format!("AP{}", id.model().unwrap_or_default()))
    }

    /// Heterodyne OSA.
    pub fn osa(&self) -> Osa {
        Osa::new(self.conn.clone(), self.model.limits())
    }

    /// Embedded tunable laser.
    pub async fn tls(&self) -> Result<Tls> {
        Ok(Tls::new(self.conn.clone(), self.id().await?))
    }

    /// Embedded powermeter.
    pub async fn power_meter(&self) -> Result<Powermeter> {
        Ok(Powermeter::new(self.conn.clone(), self.id().await?))
    }

    /// OSA fast-sweep.
    pub async fn fast_sweep(&self) -> Result<OsaFastSweep> {
        Ok(OsaFastSweep::new(self.conn.clone(), self.id().await?))
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<()> {
        self.conn.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_mock::ap2xxx::{SIMU_AP2040_ID, SIMU_AP2050_ID};
    use apex_driver_mock::Ap2xxxSimulator;

    #[test]
    fn test_model_from_identity() {
        assert_eq!(
            Ap2xxxModel::from_identity(&Identity::new(SIMU_AP2040_ID)),
            Ap2xxxModel::Ap2040
        );
        assert_eq!(
            Ap2xxxModel::from_identity(&Identity::new(SIMU_AP2050_ID)),
            Ap2xxxModel::Ap2050
        );
        assert_eq!(
            Ap2xxxModel::from_identity(&Identity::new("APEX Technologies/2083-A/1/1.0")),
            Ap2xxxModel::Ap2xxx
        );
        assert_eq!(Ap2xxxModel::Ap2040.to_string(), "AP2040");
    }

    #[tokio::test]
    async fn test_identify_and_type() {
        let (conn, log) = Ap2xxxSimulator::new().with_identity(SIMU_AP2040_ID).spawn();
        let mut ap = Ap2xxx::from_connection(conn);
        assert_eq!(ap.model(), Ap2xxxModel::Ap2xxx);
        ap.identify().await.unwrap();
        assert_eq!(ap.model(), Ap2xxxModel::Ap2040);
        assert_eq!(ap.osa_type().await.unwrap(), "AP2041-B");
        assert_eq!(log.last().as_deref(), Some("*IDN?"));
    }

    #[tokio::test]
    async fn test_embedded_instruments_share_the_link() {
        let (conn, _log) = Ap2xxxSimulator::new().spawn();
        let ap = Ap2xxx::from_connection(conn).with_model(Ap2xxxModel::Ap2050);
        let tls = ap.tls().await.unwrap();
        let pm = ap.power_meter().await.unwrap();
        let (wl, power) = tokio::join!(tls.wavelength(), pm.power());
        assert_eq!(wl.unwrap(), 1550.0);
        assert_eq!(power.unwrap(), -12.34);
        assert!(tls.to_string().starts_with("TLS of APEX Technologies/2050-A"));
    }
}
