//! Top-level provisioning flow
//!
//! Base steps run first, in fixed order. The unit installer only runs when
//! asked for and only after every base step succeeded; both runs are joined
//! into one report.

use crate::config::Config;
use crate::host::Host;
use crate::steps::{HardwareInterface, OsPackages, PythonLibs, TargetDir, Venv};
use crate::unit::{self, UnitSpecError};
use declarative::{
    BoxedStep, CancelToken, ExecuteOptions, ExecutionReport, ProgressCallback, RunStatus,
};
use std::path::PathBuf;

/// Process exit status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    StepFailed,
    RebootRequired,
    InvalidArguments,
    Cancelled,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::StepFailed => 1,
            Self::RebootRequired => 2,
            Self::InvalidArguments => 3,
            Self::Cancelled => 130,
        }
    }

    pub fn from_report(report: &ExecutionReport) -> Self {
        match report.status() {
            RunStatus::Failed { .. } => Self::StepFailed,
            RunStatus::Cancelled => Self::Cancelled,
            RunStatus::Completed if report.reboot_required() => Self::RebootRequired,
            RunStatus::Completed => Self::Success,
        }
    }
}

/// What to run
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub dry_run: bool,
    pub with_service: bool,
}

/// Steps 1 to 5: files, packages, interface, venv, libraries
pub fn base_steps<'h>(config: &Config, source: PathBuf) -> Vec<BoxedStep<'static, Host<'h>>> {
    let venv = config.venv_dir();
    vec![
        Box::new(
            TargetDir::new(source, config.target_dir(), config.install.exclude.clone())
                .carrying(config.carried_entries()),
        ),
        Box::new(OsPackages::new(config.packages.os.clone())),
        Box::new(HardwareInterface::new(config.interface.name)),
        Box::new(Venv::new(config.install.python.clone(), venv.clone())),
        Box::new(PythonLibs::new(venv, config.packages.python.clone())),
    ]
}

/// Run the whole flow against `host`
///
/// The unit spec is validated before anything runs, so a bad service name
/// never leaves a half-provisioned host behind.
pub fn provision<P: ProgressCallback + ?Sized>(
    config: &Config,
    source: PathBuf,
    host: &Host<'_>,
    opts: &Options,
    progress: &mut P,
    cancel: &CancelToken,
) -> Result<ExecutionReport, UnitSpecError> {
    let unit_spec = config.unit_spec();
    if opts.with_service {
        unit_spec.validate()?;
    }

    let exec = ExecuteOptions {
        dry_run: opts.dry_run,
    };
    let steps = base_steps(config, source);
    let report = declarative::run(&steps, host, &exec, progress, cancel);

    if !opts.with_service || !report.is_success() {
        return Ok(report);
    }

    log::info!("Installing service unit {}", unit_spec.file_name());
    let unit_report = unit::install(
        &unit_spec,
        host,
        &exec,
        config.ready_timeout(),
        progress,
        cancel,
    )?;
    Ok(report.then(unit_report))
}
