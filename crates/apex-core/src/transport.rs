//! Link Abstractions for Driver Crates
//!
//! Apex instruments talk a line-oriented ASCII protocol over TCP (AP1000,
//! AP2XXX) or fixed-size binary frames over RS-232 (Etuve). This module
//! provides the shared link types and the [`Connection`] handle every driver
//! uses to exchange commands.
//!
//! # Types
//!
//! - [`LinkIO`]: Trait alias combining AsyncRead + AsyncWrite
//! - [`DynLink`]: Type-erased boxed link
//! - [`SharedLink`]: Thread-safe shared link with buffered reading
//! - [`Connection`]: Clonable command/reply handle with a reply timeout
//!
//! # Utilities
//!
//! - [`connect_tcp`]: Open a TCP link with a connection timeout
//! - [`open_serial_async`]: Open a serial port with spawn_blocking (feature `serial`)
//!
//! # Example
//!
//! ```rust,ignore
//! use apex_core::transport::{connect_tcp, Connection};
//!
//! let link = connect_tcp("192.168.1.10", 5900, Duration::from_secs(10)).await?;
//! let conn = Connection::new(link, "AP1000");
//! let id = conn.query("*IDN?").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::{ApexError, Result};
use crate::protocol;

// =============================================================================
// Link Trait
// =============================================================================

/// Trait alias for async link I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used
/// as a link. This includes:
/// - `tokio::net::TcpStream` (AP1000, AP2XXX)
/// - `tokio_serial::SerialStream` (Etuve)
/// - `tokio::io::DuplexStream` (simulators and tests)
pub trait LinkIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkIO for T {}

/// Type-erased boxed link.
pub type DynLink = Box<dyn LinkIO>;

/// Thread-safe shared link with buffered reading.
///
/// The `BufReader` wrapper enables `read_line()` for the ASCII protocols while
/// `get_mut()` still gives raw access for writes.
pub type SharedLink = Arc<Mutex<BufReader<DynLink>>>;

/// Create a SharedLink from a type-erased link.
pub fn wrap_shared(link: DynLink) -> SharedLink {
    Arc::new(Mutex::new(BufReader::new(link)))
}

/// Default TCP port of AP1000 and AP2XXX equipment.
pub const DEFAULT_TCP_PORT: u16 = 5900;

/// Default reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Link Utilities
// =============================================================================

/// Open a TCP link to an instrument.
///
/// # Errors
///
/// Returns [`ApexError::Communication`] if the host refuses the connection or
/// does not answer within `timeout`.
pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<DynLink> {
    let target = format!("{}:{}", host, port);
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&target)).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(%target, error = %e, "TCP_NODELAY not applied");
            }
            tracing::info!(%target, "TCP link established");
            Ok(Box::new(stream))
        }
        Ok(Err(e)) => Err(ApexError::Communication(format!("{} ({})", target, e))),
        Err(_) => Err(ApexError::Communication(format!("{} (connect timeout)", target))),
    }
}

/// Open a serial port asynchronously using spawn_blocking.
///
/// Standard settings are applied: 8N1, no flow control.
///
/// # Parameters
///
/// - `port_path`: Path to the serial port (e.g., "/dev/ttyUSB0", "COM1")
/// - `baud_rate`: Baud rate (e.g., 9600)
/// - `device_name`: Human-readable device name for error messages
#[cfg(feature = "serial")]
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> Result<tokio_serial::SerialStream> {
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| {
                ApexError::Communication(format!(
                    "{} on {} ({})",
                    device_name_owned, port_path_owned, e
                ))
            })
    })
    .await
    .map_err(|e| ApexError::Communication(format!("serial open task failed: {}", e)))?
}

// =============================================================================
// Connection
// =============================================================================

/// Command/reply handle over a shared link.
///
/// Cloning a `Connection` shares the link and the reply timeout: the AP1000
/// slot drivers all hold clones of their mainframe's connection, and every
/// exchange holds the link lock from write to reply so commands never
/// interleave.
#[derive(Clone)]
pub struct Connection {
    link: SharedLink,
    timeout: Arc<parking_lot::Mutex<Option<Duration>>>,
    name: Arc<str>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("timeout", &*self.timeout.lock())
            .finish()
    }
}

impl Connection {
    /// Wrap a link with the default 10 s reply timeout.
    pub fn new(link: DynLink, name: &str) -> Self {
        Self::from_shared(wrap_shared(link), name)
    }

    /// Wrap an already shared link.
    pub fn from_shared(link: SharedLink, name: &str) -> Self {
        Self {
            link,
            timeout: Arc::new(parking_lot::Mutex::new(Some(DEFAULT_TIMEOUT))),
            name: Arc::from(name),
        }
    }

    /// Connect over TCP and wrap the stream.
    pub async fn connect_tcp(host: &str, port: u16, timeout: Duration, name: &str) -> Result<Self> {
        let link = connect_tcp(host, port, timeout).await?;
        Ok(Self::new(link, name).with_timeout(Some(timeout)))
    }

    /// Builder form of [`Connection::set_timeout`].
    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        *self.timeout.lock() = timeout;
        self
    }

    /// Reply timeout; `None` waits forever.
    pub fn timeout(&self) -> Option<Duration> {
        *self.timeout.lock()
    }

    /// Change the reply timeout for this connection and all its clones.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.lock() = timeout;
    }

    /// Name used in log events and error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a command line without waiting for a reply.
    pub async fn send(&self, command: &str) -> Result<()> {
        let mut port = self.link.lock().await;
        self.write_line(&mut port, command).await
    }

    /// Send a command line and return the reply line without its terminator.
    pub async fn query(&self, command: &str) -> Result<String> {
        let mut port = self.link.lock().await;
        self.write_line(&mut port, command).await?;
        let reply = self.read_line(&mut port, command).await?;
        tracing::debug!(device = %self.name, cmd = %command, reply = %reply, "reply");
        Ok(reply)
    }

    /// Query and parse the reply as a float.
    pub async fn query_f64(&self, command: &str) -> Result<f64> {
        let reply = self.query(command).await?;
        protocol::parse_f64(command, &reply)
    }

    /// Query and parse the reply as an integer.
    pub async fn query_i64(&self, command: &str) -> Result<i64> {
        let reply = self.query(command).await?;
        protocol::parse_i64(command, &reply)
    }

    /// Write raw bytes (binary protocols).
    pub async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut port = self.link.lock().await;
        tracing::debug!(device = %self.name, len = bytes.len(), "write bytes");
        port.get_mut().write_all(bytes).await?;
        port.get_mut().flush().await?;
        Ok(())
    }

    /// Read exactly `len` bytes (binary protocols).
    pub async fn read_exact_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let mut port = self.link.lock().await;
        self.read_exact_locked(&mut port, len).await
    }

    /// Write raw bytes then read exactly `len` bytes back.
    pub async fn exchange_bytes(&self, bytes: &[u8], len: usize) -> Result<Vec<u8>> {
        let mut port = self.link.lock().await;
        port.get_mut().write_all(bytes).await?;
        port.get_mut().flush().await?;
        self.read_exact_locked(&mut port, len).await
    }

    async fn read_exact_locked(&self, port: &mut BufReader<DynLink>, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let read = port.read_exact(&mut buf);
        match self.timeout() {
            Some(t) => match tokio::time::timeout(t, read).await {
                Ok(r) => r.map(|_| ())?,
                Err(_) => return Err(ApexError::Timeout(format!("{} byte read", len))),
            },
            None => read.await.map(|_| ())?,
        }
        tracing::debug!(device = %self.name, len, "read bytes");
        Ok(buf)
    }

    /// Shut down the write side of the link.
    pub async fn close(&self) -> Result<()> {
        let mut port = self.link.lock().await;
        port.get_mut().shutdown().await?;
        tracing::info!(device = %self.name, "connection closed");
        Ok(())
    }

    async fn write_line(&self, port: &mut BufReader<DynLink>, command: &str) -> Result<()> {
        tracing::debug!(device = %self.name, cmd = %command, "send");
        let line = format!("{}\n", command);
        port.get_mut().write_all(line.as_bytes()).await?;
        port.get_mut().flush().await?;
        Ok(())
    }

    async fn read_line(&self, port: &mut BufReader<DynLink>, command: &str) -> Result<String> {
        let mut response = String::new();
        let read = port.read_line(&mut response);
        let n = match self.timeout() {
            Some(t) => match tokio::time::timeout(t, read).await {
                Ok(r) => r?,
                Err(_) => return Err(ApexError::Timeout(command.to_string())),
            },
            None => read.await?,
        };
        if n == 0 {
            return Err(ApexError::Communication(format!("{} (connection closed)", self.name)));
        }
        Ok(protocol::strip_terminator(&response).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_shared_link_with_duplex() {
        let (mut host, device) = tokio::io::duplex(64);
        let port: SharedLink = wrap_shared(Box::new(device));

        host.write_all(b"Hello\n").await.unwrap();

        let mut guard = port.lock().await;
        let mut line = String::new();
        guard.read_line(&mut line).await.unwrap();

        assert_eq!(line.trim(), "Hello");
    }

    #[tokio::test]
    async fn test_query_writes_line_and_strips_reply() {
        let (mut host, device) = tokio::io::duplex(64);
        let conn = Connection::new(Box::new(device), "test");

        let responder = tokio::spawn(async move {
            let mut buf = vec![0u8; 16];
            let n = host.read(&mut buf).await.unwrap();
            host.write_all(b"1550.000\n").await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        let value = conn.query_f64("TLS[03]:TWL?").await.unwrap();
        assert_eq!(value, 1550.0);
        assert_eq!(responder.await.unwrap(), "TLS[03]:TWL?\n");
    }

    #[tokio::test]
    async fn test_query_timeout() {
        let (_host, device) = tokio::io::duplex(64);
        let conn = Connection::new(Box::new(device), "test")
            .with_timeout(Some(Duration::from_millis(20)));

        let err = conn.query("*IDN?").await.unwrap_err();
        assert!(matches!(err, ApexError::Timeout(_)));
        assert_eq!(err.code(), crate::error::COMMUNICATION);
    }

    #[tokio::test]
    async fn test_closed_link_is_communication_error() {
        let (host, device) = tokio::io::duplex(64);
        drop(host);
        let conn = Connection::new(Box::new(device), "test");
        assert!(conn.query("*IDN?").await.unwrap_err().is_communication());
    }

    #[tokio::test]
    async fn test_timeout_shared_between_clones() {
        let (_host, device) = tokio::io::duplex(64);
        let conn = Connection::new(Box::new(device), "test");
        let clone = conn.clone();
        clone.set_timeout(None);
        assert_eq!(conn.timeout(), None);
    }

    #[tokio::test]
    async fn test_exchange_bytes() {
        let (mut host, device) = tokio::io::duplex(64);
        let conn = Connection::new(Box::new(device), "test");

        let responder = tokio::spawn(async move {
            let mut cmd = [0u8; 1];
            host.read_exact(&mut cmd).await.unwrap();
            host.write_all(&[1, 2, 3, 4]).await.unwrap();
            cmd[0]
        });

        let reply = conn.exchange_bytes(b"t", 4).await.unwrap();
        assert_eq!(reply, vec![1, 2, 3, 4]);
        assert_eq!(responder.await.unwrap(), b't');
    }
}
