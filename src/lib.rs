//! Cycle-stepped N64 CPU and memory core with a pollable telemetry port.
//!
//! An [`Emulator`] owns one worker thread that runs the VR4300 interpreter in
//! slices and publishes a [`Snapshot`] at a fixed interval. Any number of
//! threads can poll or subscribe to those snapshots while the core runs.

pub mod bus;
pub mod cartridge;
pub mod config;
pub mod cpu;
pub mod cpu_bus;
pub mod debug_flags;
pub mod devices;
pub mod emulator;
pub mod error;
pub mod memory;
pub mod session;
pub mod shutdown;
pub mod telemetry;

pub use cartridge::{CancelToken, RomIdentity, RomImage};
pub use config::CoreConfig;
pub use emulator::Emulator;
pub use error::{ExecutionFault, FaultError, LoadError, SchedulerError};
pub use session::SessionState;
pub use telemetry::Snapshot;
