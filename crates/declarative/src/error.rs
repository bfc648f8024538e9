//! Error types for provisioning steps.
//!
//! Errors are categorized so the executor can decide whether a failed
//! `check` should fall through to `apply`, and so the final report can name
//! what went wrong in terms the operator can act on.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Categories of step errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Privileged operation attempted without rights
    PermissionDenied,
    /// Requested package not found in the configured repositories
    PackageUnavailable,
    /// Host state could not be determined
    ProbeFailed,
    /// Scoped write / rename of a unit file did not complete
    UnitWriteFailed,
    /// The service manager returned non-zero for reload/enable/start
    ServiceManagerRejected,
    /// An external command failed for another reason
    CommandFailed,
    /// Filesystem error not covered above
    Io,
}

impl ErrorKind {
    /// Whether a `check` failing with this kind stops the run.
    ///
    /// `ProbeFailed` is the only non-fatal kind: the executor attempts
    /// `apply` instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ProbeFailed)
    }

    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Permission denied",
            Self::PackageUnavailable => "Package unavailable",
            Self::ProbeFailed => "Could not determine host state",
            Self::UnitWriteFailed => "Unit file write failed",
            Self::ServiceManagerRejected => "Service manager rejected request",
            Self::CommandFailed => "Command failed",
            Self::Io => "Filesystem error",
        }
    }

    /// Get actionable advice for resolving this error kind.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Re-run with root privileges (e.g. via sudo)",
            Self::PackageUnavailable => "Check the package name and run the package index update",
            Self::ProbeFailed => "Check that the probing tools are installed",
            Self::UnitWriteFailed => "Check free space and permissions of the unit directory",
            Self::ServiceManagerRejected => "Inspect the unit with the service manager's status tool",
            Self::CommandFailed => "Check the command output above",
            Self::Io => "Check the path and its permissions",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Error raised by a step's `check` or `apply`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct StepError {
    /// Category for reporting and fall-through decisions
    pub kind: ErrorKind,
    /// Detail, verbatim from the failing tool where there is one
    pub detail: String,
}

impl StepError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn service_manager_rejected(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceManagerRejected, detail)
    }

    /// Convert an io error, keeping EACCES/EPERM distinct.
    ///
    /// `fallback` is the kind used for everything that is not a permission
    /// problem.
    pub fn from_io(err: &io::Error, fallback: ErrorKind, what: &str) -> Self {
        let kind = if err.kind() == io::ErrorKind::PermissionDenied {
            ErrorKind::PermissionDenied
        } else {
            fallback
        };
        Self::new(kind, format!("{what}: {err}"))
    }
}
