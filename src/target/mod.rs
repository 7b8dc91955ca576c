//! Remote Execution Target
//!
//! `RemoteTarget` is the capability set the oracle needs from a simulator's
//! remote control interface. `GdbRemote` implements it over the GDB Remote
//! Serial Protocol; `ExecutionDriver` layers address translation, program
//! loading and reset on top of any implementation.

pub mod driver;
pub mod gdb;

pub use driver::{ExecutionDriver, MemoryRegion};
pub use gdb::GdbRemote;

use crate::avr::{RegisterState, WireError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// SIGHUP: delivered with a resume, asks the simulator to reset itself
pub const SIGHUP: u8 = 1;

/// SIGTRAP: reported after a step or a breakpoint
pub const SIGTRAP: u8 = 5;

/// Why the target stopped after a resume or step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Stopped with a signal (`S`/`T` reply)
    Signal(u8),
    /// Program exited with a status (`W` reply)
    Exited(u8),
    /// Terminated by a signal (`X` reply)
    Terminated(u8),
}

impl StopReason {
    /// True if the target is still alive and can accept further commands.
    pub fn is_stopped(&self) -> bool {
        matches!(self, StopReason::Signal(_))
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Signal(s) => write!(f, "stopped with signal {}", s),
            StopReason::Exited(s) => write!(f, "exited with status {}", s),
            StopReason::Terminated(s) => write!(f, "terminated by signal {}", s),
        }
    }
}

/// Why a single exchange with the target failed
#[derive(Debug, Error)]
pub enum IoFailure {
    #[error(transparent)]
    Transport(#[from] std::io::Error),
    #[error("connection closed by target")]
    Closed,
    #[error("session already closed")]
    NotConnected,
    #[error("packet rejected {0} times")]
    Rejected(u32),
    #[error("target replied with error {0}")]
    ErrorReply(String),
    #[error("reply exceeds {0} bytes")]
    Oversized(usize),
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error(transparent)]
    Registers(#[from] WireError),
    #[error("target {0}")]
    UnexpectedStop(StopReason),
}

/// Transport-level failures. Fatal for the remaining cases of a run.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("cannot connect to target at {addr}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("target I/O failed while {action}")]
    TargetIo {
        action: &'static str,
        #[source]
        source: IoFailure,
    },
}

impl DriverError {
    pub(crate) fn io(action: &'static str) -> impl FnOnce(IoFailure) -> DriverError {
        move |source| DriverError::TargetIo { action, source }
    }
}

/// Capability set of a remote execution-control interface.
///
/// Addresses are in the target's combined address space; see
/// `ExecutionDriver` for region translation. All operations block.
pub trait RemoteTarget {
    fn read_memory(&mut self, addr: u32, len: usize) -> Result<Vec<u8>, IoFailure>;
    fn write_memory(&mut self, addr: u32, data: &[u8]) -> Result<(), IoFailure>;
    fn read_registers(&mut self) -> Result<RegisterState, IoFailure>;
    fn write_registers(&mut self, state: &RegisterState) -> Result<(), IoFailure>;
    /// Continue, optionally delivering `signal`, until the target stops.
    fn resume(&mut self, signal: Option<u8>) -> Result<StopReason, IoFailure>;
    /// Execute a single instruction.
    fn step(&mut self) -> Result<StopReason, IoFailure>;
    /// Release the session. Further calls fail with `NotConnected`.
    fn close(&mut self) -> Result<(), IoFailure>;
}
