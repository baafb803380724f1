//! Etuve XU thermal chamber simulator.
//!
//! The chamber answers a single `t` byte with 14 four-byte frames
//! `0x81, index, lo, hi`. Frame 0 carries the actual temperature and frame 1
//! the setpoint, both in tenths of a degree. A `0x81, 0x02, lo, hi` frame
//! written by the host changes the setpoint; the chamber then drifts towards
//! it by one tenth per poll.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use apex_core::Connection;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Number of message slots in a status reply.
pub const ETUVE_MESSAGES: usize = 14;
/// Status reply length in bytes.
pub const ETUVE_REPLY_LEN: usize = ETUVE_MESSAGES * 4;

const FRAME_START: u8 = 0x81;
const POLL: u8 = b't';

#[derive(Debug)]
struct ChamberState {
    actual_tenths: u16,
    setpoint_tenths: u16,
}

/// Handle on a running chamber simulator.
#[derive(Debug, Clone)]
pub struct EtuveHandle {
    state: Arc<Mutex<ChamberState>>,
    polls: Arc<AtomicUsize>,
}

impl EtuveHandle {
    /// Number of `t` polls received.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Current setpoint in °C.
    pub fn setpoint(&self) -> f64 {
        f64::from(self.state.lock().setpoint_tenths) / 10.0
    }

    /// Force the actual chamber temperature (°C).
    pub fn set_actual(&self, celsius: f64) {
        self.state.lock().actual_tenths = (celsius * 10.0).round() as u16;
    }
}

/// Etuve simulator builder.
#[derive(Debug, Clone)]
pub struct EtuveSimulator {
    actual: f64,
    setpoint: f64,
}

impl Default for EtuveSimulator {
    fn default() -> Self {
        Self {
            actual: 23.5,
            setpoint: 25.0,
        }
    }
}

impl EtuveSimulator {
    /// Chamber at 23.5 °C with a 25.0 °C setpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial temperatures in °C.
    pub fn with_temperatures(mut self, actual: f64, setpoint: f64) -> Self {
        self.actual = actual;
        self.setpoint = setpoint;
        self
    }

    /// Start the simulator and return a connection to it.
    pub fn spawn(self) -> (Connection, EtuveHandle) {
        let (client, server) = tokio::io::duplex(1024);
        let handle = EtuveHandle {
            state: Arc::new(Mutex::new(ChamberState {
                actual_tenths: (self.actual * 10.0).round() as u16,
                setpoint_tenths: (self.setpoint * 10.0).round() as u16,
            })),
            polls: Arc::new(AtomicUsize::new(0)),
        };
        tokio::spawn(serve_frames(server, handle.clone()));
        (Connection::new(Box::new(client), "etuve-sim"), handle)
    }
}

/// Encode a status reply.
pub fn status_reply(actual_tenths: u16, setpoint_tenths: u16) -> Vec<u8> {
    let mut msg = [0u16; ETUVE_MESSAGES];
    msg[0] = actual_tenths;
    msg[1] = setpoint_tenths;
    msg.iter()
        .enumerate()
        .flat_map(|(i, v)| {
            let [lo, hi] = v.to_le_bytes();
            [FRAME_START, (i * 2) as u8, lo, hi]
        })
        .collect()
}

async fn serve_frames(mut stream: DuplexStream, handle: EtuveHandle) {
    let mut byte = [0u8; 1];
    while stream.read_exact(&mut byte).await.is_ok() {
        match byte[0] {
            POLL => {
                handle.polls.fetch_add(1, Ordering::SeqCst);
                let reply = {
                    let mut s = handle.state.lock();
                    let reply = status_reply(s.actual_tenths, s.setpoint_tenths);
                    if s.actual_tenths < s.setpoint_tenths {
                        s.actual_tenths += 1;
                    } else if s.actual_tenths > s.setpoint_tenths {
                        s.actual_tenths -= 1;
                    }
                    reply
                };
                if stream.write_all(&reply).await.is_err() {
                    break;
                }
            }
            FRAME_START => {
                let mut rest = [0u8; 3];
                if stream.read_exact(&mut rest).await.is_err() {
                    break;
                }
                if rest[0] == 0x02 {
                    handle.state.lock().setpoint_tenths = u16::from_le_bytes([rest[1], rest[2]]);
                }
            }
            other => tracing::debug!(byte = other, "etuve simulator ignored byte"),
        }
    }
}
