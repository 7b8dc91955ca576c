//! Run configuration
//!
//! Everything the driver and generator need is passed in explicitly as a
//! `Config`. It loads from a JSON file; missing fields take their defaults,
//! so `{}` is a valid configuration.

use crate::avr::RegisterState;
use crate::isa::{lookup, OpcodeSpec, SINGLE_REGISTER_OPS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Port simulavr's GDB server listens on by default
pub const DEFAULT_PORT: u16 = 1212;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Where the target lives and how to talk to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
    /// Socket read timeout. `None` blocks indefinitely.
    pub io_timeout_ms: Option<u64>,
    /// Ask the stub for `QStartNoAckMode`
    pub no_ack: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            io_timeout_ms: None,
            no_ack: false,
        }
    }
}

/// How a single instruction is executed on the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStrategy {
    /// Single-step over the instruction
    Step,
    /// Place a BREAK after the instruction and continue
    BreakAfter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub strategy: ExecStrategy,
    /// Reset the target (resume with SIGHUP) before every case
    pub reset_between_cases: bool,
    /// Code address the instruction under test is written to
    pub code_origin: u32,
    pub stack_pointer: u16,
    /// Mnemonics to run; empty runs every known opcode
    pub opcodes: Vec<String>,
    /// Write the JSON report here
    pub report_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            strategy: ExecStrategy::Step,
            reset_between_cases: true,
            code_origin: 0x0000,
            stack_pointer: 0x045F,
            opcodes: Vec::new(),
            report_path: None,
        }
    }
}

impl RunConfig {
    /// Register state every case starts from before operands are bound
    pub fn baseline(&self) -> RegisterState {
        RegisterState::patterned(self.code_origin, self.stack_pointer)
    }

    pub fn selected_specs(&self) -> Result<Vec<&'static OpcodeSpec>, ConfigError> {
        if self.opcodes.is_empty() {
            return Ok(SINGLE_REGISTER_OPS.iter().collect());
        }
        self.opcodes
            .iter()
            .map(|m| lookup(m).ok_or_else(|| ConfigError::UnknownOpcode(m.clone())))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub run: RunConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.host.is_empty() {
            return Err(ConfigError::Invalid("target.host is empty".to_string()));
        }
        if self.target.io_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "target.io_timeout_ms must be positive".to_string(),
            ));
        }
        if self.run.code_origin % 2 != 0 {
            return Err(ConfigError::Invalid(format!(
                "run.code_origin {:#x} is not word aligned",
                self.run.code_origin
            )));
        }
        self.run.selected_specs().map(|_| ())
    }
}
