//! Simulated Apex Technologies instruments.
//!
//! Simulators attach to drivers through the same seams as real hardware: the
//! line-protocol instruments get a [`apex_core::Connection`] over an
//! in-memory duplex pipe, the USB boards implement
//! [`apex_core::usb::ControlTransfer`]. Drivers therefore run unchanged
//! against a simulator, which is how the `--simulate` mode of the CLI and
//! the driver tests work.
//!
//! # Available Simulators
//!
//! - [`Ap1000Simulator`] - mainframe with configurable slot identities and per-slot state
//! - [`Ap2xxxSimulator`] - heterodyne OSA with embedded TLS, powermeter and fast-sweep
//! - [`EtuveSimulator`] - binary status frames of the Etuve XU chamber
//! - [`MockAb3380`], [`MockAb3510`] - USB boards
//!
//! # Example
//!
//! ```rust,ignore
//! use apex_driver_mock::Ap1000Simulator;
//!
//! let (conn, log) = Ap1000Simulator::with_default_slots().spawn();
//! let mainframe = Ap1000::from_connection(conn);
//! assert!(mainframe.slot_used(1).await?);
//! assert!(log.contains("SLT[01]:EMPTY?"));
//! ```

pub mod ap1000;
pub mod ap2xxx;
pub mod etuve;
mod rng;
pub mod server;
pub mod usb_board;

pub use ap1000::Ap1000Simulator;
pub use ap2xxx::Ap2xxxSimulator;
pub use etuve::{EtuveHandle, EtuveSimulator};
pub use rng::SimRng;
pub use server::{spawn_line_simulator, CommandLog, Responder};
pub use usb_board::{MockAb3380, MockAb3510};
