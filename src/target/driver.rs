//! Execution driver over a `RemoteTarget`.

use super::{DriverError, GdbRemote, IoFailure, RemoteTarget, StopReason, SIGHUP};
use crate::avr::RegisterState;
use crate::config::TargetConfig;
use log::debug;
use serde::{Deserialize, Serialize};

/// Offset of code memory (flash) in the combined address space
pub const CODE_BASE: u32 = 0x0000_0000;

/// Offset of data memory (SRAM) in the combined address space
pub const DATA_BASE: u32 = 0x0080_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryRegion {
    Code,
    Data,
}

impl MemoryRegion {
    pub const fn base(self) -> u32 {
        match self {
            MemoryRegion::Code => CODE_BASE,
            MemoryRegion::Data => DATA_BASE,
        }
    }

    /// Translate a region-relative address into the combined address space.
    pub const fn translate(self, addr: u32) -> u32 {
        self.base().wrapping_add(addr)
    }
}

/// Owns the single connection to a target.
///
/// Every operation borrows the driver mutably, so cases can never be
/// interleaved on one connection.
pub struct ExecutionDriver<T: RemoteTarget> {
    target: T,
}

impl ExecutionDriver<GdbRemote> {
    /// Connect to a remote stub over TCP.
    pub fn connect(config: &TargetConfig) -> Result<Self, DriverError> {
        Ok(Self::new(GdbRemote::connect(config)?))
    }
}

impl<T: RemoteTarget> ExecutionDriver<T> {
    pub fn new(target: T) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn write_block(
        &mut self,
        region: MemoryRegion,
        addr: u32,
        data: &[u8],
    ) -> Result<(), DriverError> {
        let combined = region.translate(addr);
        debug!("write {:?}[{:#x}] ({} bytes) at {:#08x}", region, addr, data.len(), combined);
        self.target
            .write_memory(combined, data)
            .map_err(DriverError::io("writing memory"))
    }

    pub fn read_block(
        &mut self,
        region: MemoryRegion,
        addr: u32,
        len: usize,
    ) -> Result<Vec<u8>, DriverError> {
        let combined = region.translate(addr);
        let data = self
            .target
            .read_memory(combined, len)
            .map_err(DriverError::io("reading memory"))?;
        if data.len() != len {
            return Err(DriverError::TargetIo {
                action: "reading memory",
                source: IoFailure::Malformed(format!(
                    "asked for {} bytes at {:#08x}, got {}",
                    len,
                    combined,
                    data.len()
                )),
            });
        }
        Ok(data)
    }

    /// Write a full program image at code address 0.
    pub fn load_program(&mut self, image: &[u8]) -> Result<(), DriverError> {
        self.write_block(MemoryRegion::Code, 0, image)
    }

    pub fn read_registers(&mut self) -> Result<RegisterState, DriverError> {
        self.target
            .read_registers()
            .map_err(DriverError::io("reading registers"))
    }

    pub fn write_registers(&mut self, state: &RegisterState) -> Result<(), DriverError> {
        self.target
            .write_registers(state)
            .map_err(DriverError::io("writing registers"))
    }

    /// Continue until the target stops. A target that exits or is killed
    /// cannot be driven further, so that is reported as an I/O failure.
    pub fn resume(&mut self, signal: Option<u8>) -> Result<StopReason, DriverError> {
        let reason = self
            .target
            .resume(signal)
            .map_err(DriverError::io("resuming"))?;
        Self::require_stopped("resuming", reason)
    }

    pub fn step(&mut self) -> Result<StopReason, DriverError> {
        let reason = self.target.step().map_err(DriverError::io("stepping"))?;
        Self::require_stopped("stepping", reason)
    }

    /// Reset is a resume delivering SIGHUP.
    pub fn reset(&mut self) -> Result<(), DriverError> {
        self.resume(Some(SIGHUP)).map(|_| ())
    }

    /// Release the connection. Dropping the driver also releases it.
    pub fn close(mut self) -> Result<(), DriverError> {
        self.target.close().map_err(DriverError::io("closing"))
    }

    fn require_stopped(
        action: &'static str,
        reason: StopReason,
    ) -> Result<StopReason, DriverError> {
        if reason.is_stopped() {
            Ok(reason)
        } else {
            Err(DriverError::TargetIo {
                action,
                source: IoFailure::UnexpectedStop(reason),
            })
        }
    }
}
