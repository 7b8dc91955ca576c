//! Verification Results and Run Reports
//!
//! A run keeps going after a failing case, so a report holds one
//! `CaseResult` per executed case. Semantic mismatches (wrong answer) and
//! side-effect mismatches (a register outside the whitelist changed) are kept
//! apart throughout.

use crate::avr::{flag_differences, render_sreg, Reg, RegisterState};
use crate::generator::CaseLabel;
use crate::target::{StopReason, SIGTRAP};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MismatchKind {
    /// A whitelisted register holds the wrong value
    Semantic,
    /// A register outside the whitelist changed
    SideEffect,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchKind::Semantic => f.write_str("semantic"),
            MismatchKind::SideEffect => f.write_str("side effect"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub kind: MismatchKind,
    pub reg: Reg,
    pub expected: u32,
    pub actual: u32,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reg {
            Reg::Sreg => {
                let (e, a) = (self.expected as u8, self.actual as u8);
                let names: Vec<_> = flag_differences(e, a).iter().map(|f| f.name()).collect();
                write!(
                    f,
                    "{} {}: expected {:#04x} ({}), got {:#04x} ({}) [{}]",
                    self.kind,
                    self.reg,
                    e,
                    render_sreg(e),
                    a,
                    render_sreg(a),
                    names.join(", ")
                )
            }
            Reg::Pc | Reg::Sp => write!(
                f,
                "{} {}: expected {:#06x}, got {:#06x}",
                self.kind, self.reg, self.expected, self.actual
            ),
            Reg::R(_) => write!(
                f,
                "{} {}: expected {:#04x}, got {:#04x}",
                self.kind, self.reg, self.expected, self.actual
            ),
        }
    }
}

/// Outcome of one case, with enough context to diagnose it offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub label: CaseLabel,
    pub opcode: u16,
    pub initial: RegisterState,
    pub expected: RegisterState,
    pub actual: RegisterState,
    /// How the target halted after the instruction
    pub stop: StopReason,
    pub mismatches: Vec<Mismatch>,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty() && !self.unexpected_stop()
    }

    /// The target halted with something other than the trap that ends a step
    /// or a BREAK.
    pub fn unexpected_stop(&self) -> bool {
        self.stop != StopReason::Signal(SIGTRAP)
    }

    pub fn has(&self, kind: MismatchKind) -> bool {
        self.mismatches.iter().any(|m| m.kind == kind)
    }

    /// First differing register of a category, in register numbering order
    pub fn first(&self, kind: MismatchKind) -> Option<&Mismatch> {
        self.mismatches.iter().find(|m| m.kind == kind)
    }
}

impl fmt::Display for CaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return write!(f, "PASS {}", self.label);
        }
        writeln!(f, "FAIL {} (opcode {:#06x})", self.label, self.opcode)?;
        if self.unexpected_stop() {
            writeln!(f, "    target {}, expected signal {}", self.stop, SIGTRAP)?;
        }
        for m in &self.mismatches {
            writeln!(f, "    {}", m)?;
        }
        write!(
            f,
            "    initial SREG {} PC {:#06x}",
            render_sreg(self.initial.sreg),
            self.initial.pc
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub executed: usize,
    pub passed: usize,
    pub semantic_failures: usize,
    pub side_effect_failures: usize,
    pub unexpected_stops: usize,
    pub aborted_runs: usize,
}

impl Summary {
    pub fn merge(&mut self, other: &Summary) {
        self.executed += other.executed;
        self.passed += other.passed;
        self.semantic_failures += other.semantic_failures;
        self.side_effect_failures += other.side_effect_failures;
        self.unexpected_stops += other.unexpected_stops;
        self.aborted_runs += other.aborted_runs;
    }

    pub fn failed(&self) -> usize {
        self.executed - self.passed
    }

    pub fn all_passed(&self) -> bool {
        self.passed == self.executed && self.aborted_runs == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} executed, {} passed, {} failed ({} semantic, {} side effect)",
            self.executed,
            self.passed,
            self.failed(),
            self.semantic_failures,
            self.side_effect_failures
        )?;
        if self.unexpected_stops > 0 {
            write!(f, ", {} unexpected stop(s)", self.unexpected_stops)?;
        }
        if self.aborted_runs > 0 {
            write!(f, ", {} aborted", self.aborted_runs)?;
        }
        Ok(())
    }
}

/// All results for one opcode
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mnemonic: &'static str,
    pub started_at: DateTime<Utc>,
    pub results: Vec<CaseResult>,
    /// Set when a transport failure stopped the run early
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new(mnemonic: &'static str) -> Self {
        Self {
            mnemonic,
            started_at: Utc::now(),
            results: Vec::new(),
            aborted: None,
        }
    }

    pub fn push(&mut self, result: CaseResult) {
        self.results.push(result);
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.results.iter().filter(|r| !r.passed())
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary {
            executed: self.results.len(),
            aborted_runs: self.aborted.is_some() as usize,
            ..Default::default()
        };
        for r in &self.results {
            if r.passed() {
                summary.passed += 1;
            }
            if r.has(MismatchKind::Semantic) {
                summary.semantic_failures += 1;
            }
            if r.has(MismatchKind::SideEffect) {
                summary.side_effect_failures += 1;
            }
            if r.unexpected_stop() {
                summary.unexpected_stops += 1;
            }
        }
        summary
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}): {}",
            self.mnemonic,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.summary()
        )?;
        for failure in self.failures() {
            writeln!(f, "  {}", failure)?;
        }
        if let Some(reason) = &self.aborted {
            writeln!(f, "  ABORTED: {}", reason)?;
        }
        Ok(())
    }
}

/// Render an error with its whole source chain: `outer: inner: root`.
pub fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
