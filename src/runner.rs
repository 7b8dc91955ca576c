//! Run every case of one opcode against a target.
//!
//! Failing cases are recorded and the run continues. A transport failure
//! stops the run: the partial report travels inside the error. `run_opcodes`
//! chains several runs over one connection.

use crate::config::RunConfig;
use crate::generator::{generate, CaseLabel};
use crate::isa::{EncodeError, OpcodeSpec};
use crate::report::{error_chain, RunReport, Summary};
use crate::target::{DriverError, ExecutionDriver, RemoteTarget};
use crate::verifier::verify_case;
use log::{error, info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("{mnemonic} run aborted at {case}")]
    Aborted {
        mnemonic: &'static str,
        case: CaseLabel,
        /// Results gathered before the failure
        report: Box<RunReport>,
        #[source]
        source: DriverError,
    },
    #[error(transparent)]
    Spec(#[from] EncodeError),
}

impl RunError {
    /// Partial report of an aborted run
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunError::Aborted { report, .. } => Some(&**report),
            RunError::Spec(_) => None,
        }
    }
}

/// Generate the cases for `spec` and verify them in order.
pub fn run_opcode<T: RemoteTarget>(
    driver: &mut ExecutionDriver<T>,
    spec: &OpcodeSpec,
    run: &RunConfig,
) -> Result<RunReport, RunError> {
    let cases = generate(spec, &run.baseline())?;
    info!(
        "{}: {} cases ({} registers x {} values)",
        spec.mnemonic,
        cases.len(),
        spec.registers().count(),
        spec.values.len()
    );

    let mut report = RunReport::new(spec.mnemonic);
    for case in &cases {
        match verify_case(driver, spec, case, run) {
            Ok(result) => {
                if !result.passed() {
                    warn!("{}", result);
                }
                report.push(result);
            }
            Err(source) => {
                let reason = format!("at {}: {}", case.label, error_chain(&source));
                error!("{} aborted {}", spec.mnemonic, reason);
                report.aborted = Some(reason);
                return Err(RunError::Aborted {
                    mnemonic: spec.mnemonic,
                    case: case.label,
                    report: Box::new(report),
                    source,
                });
            }
        }
    }

    info!("{}: {}", spec.mnemonic, report.summary());
    Ok(report)
}

/// Outcome of several opcodes run over one connection
#[derive(Debug, Default)]
pub struct Campaign {
    pub reports: Vec<RunReport>,
    pub total: Summary,
    /// Opcodes skipped because their cases could not be built
    pub rejected: Vec<EncodeError>,
    /// Set when a transport failure ended the campaign early
    pub aborted: bool,
}

impl Campaign {
    pub fn all_passed(&self) -> bool {
        self.total.all_passed() && self.rejected.is_empty()
    }
}

/// Run each opcode in turn.
///
/// An opcode whose cases cannot be generated is logged and skipped. A
/// transport failure keeps the partial report and ends the campaign, since
/// the connection is unusable afterwards.
pub fn run_opcodes<'a, T: RemoteTarget>(
    driver: &mut ExecutionDriver<T>,
    specs: impl IntoIterator<Item = &'a OpcodeSpec>,
    run: &RunConfig,
) -> Campaign {
    let mut campaign = Campaign::default();
    for spec in specs {
        match run_opcode(driver, spec, run) {
            Ok(report) => {
                campaign.total.merge(&report.summary());
                campaign.reports.push(report);
            }
            Err(RunError::Spec(e)) => {
                error!("skipping {}: {}", spec.mnemonic, e);
                campaign.rejected.push(e);
            }
            Err(RunError::Aborted { report, .. }) => {
                campaign.total.merge(&report.summary());
                campaign.reports.push(*report);
                campaign.aborted = true;
                break;
            }
        }
    }
    campaign
}
