//! Reliable BLE adapter connection controller.
//!
//! Drives a USB Bluetooth Low-Energy adapter through discovery and
//! connection against a named peripheral, layered over external adapter
//! tooling that fails in every way real hardware does: adapters silently
//! dropping to a disabled state, noisy duplicate discovery output, refused
//! or hanging connection attempts, and sibling test processes fighting over
//! the same dongle.
//!
//! The pieces compose bottom-up:
//!
//! - [`command`] — deadline-bounded subprocess execution; every failure is a
//!   value, never an error.
//! - [`adapter`] — adapter enumeration, selection, and state control.
//! - [`retry`] — bounded retries with exponential backoff.
//! - [`lock`] — per-adapter advisory locking across processes.
//! - [`scan`] — discovery streaming and address resolution.
//! - [`connect`] — connection requests and outcome classification.
//! - [`controller`] — the ready → lock → scan → connect → unlock flow.

pub mod adapter;
pub mod command;
pub mod config;
pub mod connect;
pub mod controller;
pub mod error;
pub mod lock;
pub mod retry;
pub mod scan;

pub use adapter::AdapterHandle;
pub use command::CommandOutput;
pub use config::{ControllerConfig, ToolConfig};
pub use connect::ConnectionOutcome;
pub use controller::{Controller, RunReport};
pub use error::{Error, Result};
