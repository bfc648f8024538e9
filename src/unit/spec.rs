//! Service unit definition and its rendering

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// When the service manager restarts the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    #[default]
    Always,
    OnSuccess,
    OnFailure,
    OnAbnormal,
    OnAbort,
}

impl RestartPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::OnSuccess => "on-success",
            Self::OnFailure => "on-failure",
            Self::OnAbnormal => "on-abnormal",
            Self::OnAbort => "on-abort",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitSpecError {
    #[error("service name is empty")]
    EmptyName,
    #[error("service name '{0}' may only contain letters, digits and ':_.@-'")]
    InvalidName(String),
    #[error("{field} must be a single line")]
    Multiline { field: &'static str },
    #[error("start command is empty")]
    EmptyCommand,
}

/// Everything that determines the rendered unit file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUnitSpec {
    pub name: String,
    pub description: String,
    pub after: String,
    pub working_directory: PathBuf,
    pub start_command: String,
    pub restart: RestartPolicy,
    pub restart_sec: u64,
    pub start_delay: Duration,
    pub wanted_by: String,
    pub user: Option<String>,
}

impl ServiceUnitSpec {
    /// Unit name as the service manager knows it (`pihud` → `pihud.service`)
    pub fn file_name(&self) -> String {
        if self.name.ends_with(".service") {
            self.name.clone()
        } else {
            format!("{}.service", self.name)
        }
    }

    pub fn validate(&self) -> Result<(), UnitSpecError> {
        let stem = self.name.strip_suffix(".service").unwrap_or(&self.name);
        if stem.is_empty() {
            return Err(UnitSpecError::EmptyName);
        }
        let valid = |c: char| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '.' | '@' | '-');
        if !stem.chars().all(valid) {
            return Err(UnitSpecError::InvalidName(self.name.clone()));
        }
        if self.start_command.trim().is_empty() {
            return Err(UnitSpecError::EmptyCommand);
        }

        let fields = [
            ("description", self.description.as_str()),
            ("after", self.after.as_str()),
            ("start command", self.start_command.as_str()),
            ("wanted_by", self.wanted_by.as_str()),
            ("user", self.user.as_deref().unwrap_or("")),
        ];
        for (field, value) in fields {
            if value.contains('\n') {
                return Err(UnitSpecError::Multiline { field });
            }
        }
        if self.working_directory.to_string_lossy().contains('\n') {
            return Err(UnitSpecError::Multiline {
                field: "working directory",
            });
        }
        Ok(())
    }

    /// Render the unit file, byte for byte
    ///
    /// `User` is only written when one is set; every other field is always
    /// present, `ExecStartPre` included even with no start delay.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("[Unit]\n");
        out.push_str(&format!("Description={}\n", self.description));
        out.push_str(&format!("After={}\n", self.after));
        out.push('\n');
        out.push_str("[Service]\n");
        out.push_str("Type=simple\n");
        out.push_str(&format!(
            "WorkingDirectory={}\n",
            self.working_directory.display()
        ));
        out.push_str(&format!(
            "ExecStartPre=/bin/sleep {}\n",
            self.start_delay.as_secs()
        ));
        out.push_str(&format!("ExecStart={}\n", self.start_command));
        out.push_str(&format!("Restart={}\n", self.restart));
        out.push_str(&format!("RestartSec={}\n", self.restart_sec));
        if let Some(user) = &self.user {
            out.push_str(&format!("User={user}\n"));
        }
        out.push('\n');
        out.push_str("[Install]\n");
        out.push_str(&format!("WantedBy={}\n", self.wanted_by));
        out
    }
}
