//! Etuve XU thermal chamber.
//!
//! The chamber speaks a binary protocol at 9600 baud. A `t` byte requests a
//! status reply of 14 frames `0x81, index, lo, hi`; the value of frame
//! `index` lands in message slot `index / 2`. Slot 0 is the actual
//! temperature and slot 1 the setpoint, both in tenths of a degree.
//!
//! Status replies are cached: a temperature read polls the chamber only if
//! the last poll is older than the poll interval (10 s by default).

use std::fmt;
use std::time::Duration;

use anyhow::Result as AnyResult;
use apex_core::capabilities::Readable;
use apex_core::error::{ApexError, Result};
use apex_core::limits::{ETUVE_BAUD_RATE, ETUVE_POLL_INTERVAL};
use apex_core::transport::open_serial_async;
use apex_core::Connection;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Message slots in a status reply.
pub const MESSAGES: usize = 14;
/// Status reply length in bytes.
pub const STATUS_LEN: usize = MESSAGES * 4;

const FRAME_START: u8 = 0x81;
const MAX_INDEX: u8 = 26;
const POLL: &[u8] = b"t";
const SETPOINT_INDEX: u8 = 0x02;

/// Decode a status reply into its message slots.
///
/// Frames with a bad start byte or an index above 26 are skipped, slots
/// without a frame read 0. A trailing partial frame is ignored.
pub fn decode_status(data: &[u8]) -> [u16; MESSAGES] {
    let mut msg = [0u16; MESSAGES];
    for frame in data.chunks_exact(4) {
        if frame[0] == FRAME_START && frame[1] <= MAX_INDEX {
            msg[usize::from(frame[1] / 2)] = u16::from_le_bytes([frame[2], frame[3]]);
        }
    }
    msg
}

#[derive(Debug)]
struct PollState {
    msg: [u16; MESSAGES],
    last_poll: Option<Instant>,
}

/// Etuve XU chamber on a serial port.
#[derive(Debug)]
pub struct Etuve {
    conn: Connection,
    port: String,
    poll_interval: Duration,
    state: Mutex<PollState>,
}

impl Etuve {
    /// Open the chamber on serial port `port` (`/dev/ttyUSB0`, `COM3`...).
    pub async fn open(port: &str) -> Result<Self> {
        let stream = open_serial_async(port, ETUVE_BAUD_RATE, "Etuve").await?;
        tracing::info!(port, baud = ETUVE_BAUD_RATE, "Connected to Etuve");
        Ok(Self::from_connection(Connection::new(Box::new(stream), "etuve"), port))
    }

    /// Chamber on an established connection; `port` names it in messages.
    pub fn from_connection(conn: Connection, port: &str) -> Self {
        Self {
            conn,
            port: port.to_string(),
            poll_interval: ETUVE_POLL_INTERVAL,
            state: Mutex::new(PollState {
                msg: [0; MESSAGES],
                last_poll: None,
            }),
        }
    }

    /// Change the minimum age of a status reply before a new poll.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Serial port name.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Poll the chamber now and return the decoded message slots.
    pub async fn refresh(&self) -> Result<[u16; MESSAGES]> {
        let reply = self.conn.exchange_bytes(POLL, STATUS_LEN).await?;
        let msg = decode_status(&reply);
        tracing::debug!(actual = msg[0], setpoint = msg[1], "Etuve status");
        let mut state = self.state.lock();
        state.msg = msg;
        state.last_poll = Some(Instant::now());
        Ok(msg)
    }

    async fn messages(&self) -> Result<[u16; MESSAGES]> {
        let cached = {
            let state = self.state.lock();
            match state.last_poll {
                Some(at) if at.elapsed() <= self.poll_interval => Some(state.msg),
                _ => None,
            }
        };
        match cached {
            Some(msg) => Ok(msg),
            None => self.refresh().await,
        }
    }

    /// Actual chamber temperature in °C.
    pub async fn actual_temperature(&self) -> Result<f64> {
        Ok(f64::from(self.messages().await?[0]) / 10.0)
    }

    /// Setpoint temperature in °C.
    pub async fn setpoint_temperature(&self) -> Result<f64> {
        Ok(f64::from(self.messages().await?[1]) / 10.0)
    }

    /// Change the setpoint. The value is sent in tenths of a degree,
    /// truncated.
    pub async fn set_setpoint(&self, celsius: f64) -> Result<()> {
        let tenths = (celsius * 10.0).trunc();
        if !(0.0..=f64::from(u16::MAX)).contains(&tenths) {
            return Err(ApexError::argument_value("Temperature"));
        }
        let [lo, hi] = (tenths as u16).to_le_bytes();
        tracing::info!(celsius, "Etuve setpoint");
        self.conn.write_bytes(&[FRAME_START, SETPOINT_INDEX, lo, hi]).await
    }

    /// Close the serial link.
    pub async fn close(&self) -> Result<()> {
        self.conn.close().await
    }
}

impl fmt::Display for Etuve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thermal Etuve on {}", self.port)
    }
}

#[async_trait]
impl Readable for Etuve {
    async fn read(&self) -> AnyResult<f64> {
        Ok(self.actual_temperature().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_driver_mock::EtuveSimulator;
    use tracing_test::traced_test;

    #[test]
    fn test_decode_status() {
        let data = [
            0x81, 0, 0xEB, 0x00, // actual 23.5
            0x81, 2, 0xFA, 0x00, // setpoint 25.0
            0x80, 4, 0x01, 0x00, // bad start byte
            0x81, 27, 0x01, 0x00, // index out of range
            0x81, 26, 0x34, 0x12, // last slot
            0x81, 6,
        ];
        let msg = decode_status(&data);
        assert_eq!(msg[0], 235);
        assert_eq!(msg[1], 250);
        assert_eq!(msg[2], 0);
        assert_eq!(msg[3], 0);
        assert_eq!(msg[13], 0x1234);
    }

    #[tokio::test]
    async fn test_temperatures_are_cached() {
        let (conn, sim) = EtuveSimulator::new().spawn();
        let etuve = Etuve::from_connection(conn, "sim");
        assert_eq!(etuve.actual_temperature().await.unwrap(), 23.5);
        assert_eq!(etuve.setpoint_temperature().await.unwrap(), 25.0);
        assert_eq!(etuve.read().await.unwrap(), 23.5);
        assert_eq!(sim.polls(), 1);
        assert_eq!(etuve.to_string(), "Thermal Etuve on sim");
    }

    #[tokio::test]
    async fn test_stale_reply_triggers_poll() {
        let (conn, sim) = EtuveSimulator::new().with_temperatures(30.0, 30.0).spawn();
        let etuve = Etuve::from_connection(conn, "sim").with_poll_interval(Duration::ZERO);
        etuve.actual_temperature().await.unwrap();
        sim.set_actual(31.2);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(etuve.actual_temperature().await.unwrap(), 31.2);
        assert_eq!(sim.polls(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_set_setpoint() {
        let (conn, sim) = EtuveSimulator::new().spawn();
        let etuve = Etuve::from_connection(conn, "sim");
        etuve.set_setpoint(40.05).await.unwrap();
        let msg = etuve.refresh().await.unwrap();
        assert_eq!(msg[1], 400);
        assert_eq!(sim.setpoint(), 40.0);
        assert!(logs_contain("Etuve setpoint"));
        assert_eq!(etuve.setpoint_temperature().await.unwrap(), 40.0);

        assert!(matches!(etuve.set_setpoint(-1.0).await, Err(ApexError::ArgumentValue(_))));
        assert!(etuve.set_setpoint(7000.0).await.is_err());
    }
}
