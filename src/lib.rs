//! avr-oracle - Instruction conformance oracle for remote AVR simulators
//!
//! This library generates per-instruction test cases, executes them on a
//! simulator through its GDB remote interface and checks both the
//! architectural result and the absence of stray register writes.

pub mod avr;
pub mod config;
pub mod generator;
pub mod isa;
pub mod report;
pub mod runner;
pub mod target;
pub mod verifier;

pub use avr::{Flag, Reg, RegisterState};
pub use config::Config;
pub use isa::{OpcodeSpec, SINGLE_REGISTER_OPS};
pub use report::{CaseResult, RunReport, Summary};
pub use runner::{run_opcode, run_opcodes, Campaign, RunError};
pub use target::{ExecutionDriver, GdbRemote, RemoteTarget};
