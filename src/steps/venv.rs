//! Python virtual environment

use crate::fsutil;
use crate::host::{self, Host};
use declarative::{Applied, ErrorKind, Step, StepError};
use std::path::PathBuf;

/// Ensure a venv exists at `path`, owned by the invoking user
#[derive(Debug, Clone)]
pub struct Venv {
    python: String,
    path: PathBuf,
}

impl Venv {
    pub fn new(python: impl Into<String>, path: PathBuf) -> Self {
        Self {
            python: python.into(),
            path,
        }
    }
}

fn classify(message: &str) -> ErrorKind {
    if host::mentions_permission_problem(message) {
        ErrorKind::PermissionDenied
    } else {
        ErrorKind::CommandFailed
    }
}

impl Step<Host<'_>> for Venv {
    fn name(&self) -> &str {
        "venv"
    }

    fn description(&self) -> String {
        format!("Create virtual environment {}", self.path.display())
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        let path = host.paths().resolve(&self.path);
        if !host.probe().venv_exists(&path) {
            return Ok(false);
        }
        let owner = host.owner();
        fsutil::owned_by(&path, owner.uid, owner.gid).map_err(|e| {
            StepError::from_io(&e, ErrorKind::ProbeFailed, &format!("cannot inspect {}", path.display()))
        })
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        let path = host.paths().resolve(&self.path);
        if !host.probe().venv_exists(&path) {
            let arg = path.to_string_lossy();
            host.command_ok(&self.python, &["-m", "venv", &arg], classify)?;
            log::info!("Created virtual environment {}", path.display());
        }

        let owner = host.owner();
        fsutil::chown_tree(&path, owner.uid, owner.gid).map_err(|e| {
            StepError::from_io(&e, ErrorKind::Io, &format!("cannot hand {} to {owner}", path.display()))
        })?;
        Ok(Applied::Changed)
    }
}
