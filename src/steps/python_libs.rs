//! Python libraries inside the venv

use crate::fsutil;
use crate::host::probe::{requirement_name, venv_pip};
use crate::host::{self, Host};
use declarative::{Applied, ErrorKind, Step, StepError};
use std::path::PathBuf;

/// Classify pip's failure output
pub fn classify_pip(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("no matching distribution")
        || lower.contains("could not find a version that satisfies")
    {
        ErrorKind::PackageUnavailable
    } else if host::mentions_permission_problem(message) {
        ErrorKind::PermissionDenied
    } else {
        ErrorKind::CommandFailed
    }
}

/// Ensure the requirements are installed in the venv
#[derive(Debug, Clone)]
pub struct PythonLibs {
    venv: PathBuf,
    requirements: Vec<String>,
}

impl PythonLibs {
    pub fn new(venv: PathBuf, requirements: Vec<String>) -> Self {
        Self { venv, requirements }
    }

    fn missing(&self, host: &Host<'_>) -> Result<Vec<&str>, StepError> {
        let venv = host.paths().resolve(&self.venv);
        let probe = host.probe();
        if !probe.venv_exists(&venv) {
            return Ok(self.requirements.iter().map(String::as_str).collect());
        }

        let mut missing = Vec::new();
        for requirement in &self.requirements {
            if !probe.python_lib_installed(&venv, requirement)? {
                missing.push(requirement.as_str());
            }
        }
        Ok(missing)
    }
}

impl Step<Host<'_>> for PythonLibs {
    fn name(&self) -> &str {
        "python-libs"
    }

    fn description(&self) -> String {
        let names: Vec<&str> = self.requirements.iter().map(|r| requirement_name(r)).collect();
        format!("Install Python libraries ({})", names.join(", "))
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        Ok(self.missing(host)?.is_empty())
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        let missing = self.missing(host).unwrap_or_else(|e| {
            log::warn!("Could not list installed libraries ({e}), installing all");
            self.requirements.iter().map(String::as_str).collect()
        });
        if missing.is_empty() {
            return Ok(Applied::Changed);
        }

        let venv = host.paths().resolve(&self.venv);
        let pip = venv_pip(&venv);
        let mut args = vec!["install", "--disable-pip-version-check", "--quiet"];
        args.extend(missing);
        host.command_ok(&pip.to_string_lossy(), &args, classify_pip)?;

        // pip run as root leaves root-owned files behind
        let owner = host.owner();
        fsutil::chown_tree(&venv, owner.uid, owner.gid).map_err(|e| {
            StepError::from_io(&e, ErrorKind::Io, &format!("cannot hand {} to {owner}", venv.display()))
        })?;
        Ok(Applied::Changed)
    }
}
