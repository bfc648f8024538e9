//! System State Probe - read-only checks of host state
//!
//! Every probe answers a yes/no question. "Not there" is `Ok(false)`, never
//! an error. Errors mean the question could not be answered:
//!
//! | probe | absent | error |
//! |---|---|---|
//! | `package_installed` | dpkg-query exits non-zero | dpkg-query cannot be spawned → `ProbeFailed` |
//! | `kernel_module_loaded` | not listed | `/proc/modules` unreadable → `ProbeFailed` |
//! | `interface_enabled` | no active line, or no boot config | unreadable → `ProbeFailed` / `PermissionDenied` |
//! | `module_autoloaded` | not listed, or no modules file | unreadable → `ProbeFailed` / `PermissionDenied` |
//! | `service_active` / `service_enabled` | non-zero exit | systemctl cannot be spawned → `ProbeFailed` |
//! | `manager_needs_reload` | unit unknown | systemctl cannot be spawned → `ProbeFailed` |
//! | `service_started_at` | never started (`None`) | systemctl cannot be spawned → `ProbeFailed` |
//! | `venv_exists` | no interpreter | never |
//! | `python_lib_installed` | pip show exits non-zero | pip cannot be spawned → `ProbeFailed` |
//!
//! `ProbeFailed` makes the executor attempt the step anyway; a
//! `PermissionDenied` fails the step outright.

use crate::bootconfig::{self, DtParam};
use crate::host::{CommandOutput, CommandRunner, HostPaths};
use declarative::{ErrorKind, StepError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Read-only view of the host
pub struct Probe<'h> {
    runner: &'h dyn CommandRunner,
    paths: &'h HostPaths,
}

impl<'h> Probe<'h> {
    pub fn new(runner: &'h dyn CommandRunner, paths: &'h HostPaths) -> Self {
        Self { runner, paths }
    }

    fn query(&self, program: &str, args: &[&str]) -> Result<CommandOutput, StepError> {
        self.runner.run(program, args).map_err(|e| {
            StepError::from_io(&e, ErrorKind::ProbeFailed, &format!("cannot run {program}"))
        })
    }

    /// Is the OS package installed?
    pub fn package_installed(&self, name: &str) -> Result<bool, StepError> {
        let output = self.query("dpkg-query", &["-W", "-f=${Status}", name])?;
        if !output.success {
            return Ok(false);
        }
        Ok(output.stdout_str().trim_end().ends_with(" installed"))
    }

    /// Is the kernel module currently loaded?
    pub fn kernel_module_loaded(&self, name: &str) -> Result<bool, StepError> {
        let path = self.paths.proc_modules();
        let content = fs::read_to_string(&path).map_err(|e| {
            StepError::from_io(&e, ErrorKind::ProbeFailed, &format!("cannot read {}", path.display()))
        })?;
        Ok(bootconfig::module_loaded(&content, name))
    }

    /// Is the firmware parameter active in the boot config?
    pub fn interface_enabled(&self, param: DtParam<'_>) -> Result<bool, StepError> {
        let content = read_optional(&self.paths.boot_config())?;
        Ok(content.is_some_and(|c| bootconfig::is_param_set(&c, param)))
    }

    /// Is the module listed in the modules-load file?
    pub fn module_autoloaded(&self, name: &str) -> Result<bool, StepError> {
        let content = read_optional(&self.paths.modules_file())?;
        Ok(content.is_some_and(|c| bootconfig::lists_module(&c, name)))
    }

    /// Is the service unit running?
    pub fn service_active(&self, unit: &str) -> Result<bool, StepError> {
        Ok(self.query("systemctl", &["is-active", "--quiet", unit])?.success)
    }

    /// Is the service unit enabled for boot?
    pub fn service_enabled(&self, unit: &str) -> Result<bool, StepError> {
        Ok(self.query("systemctl", &["is-enabled", "--quiet", unit])?.success)
    }

    /// Has the unit file changed since the service manager last loaded it?
    pub fn manager_needs_reload(&self, unit: &str) -> Result<bool, StepError> {
        let output = self.query(
            "systemctl",
            &["show", "--property=NeedDaemonReload", "--value", unit],
        )?;
        Ok(output.success && output.stdout_str().trim() == "yes")
    }

    /// When the unit last entered the active state, if it ever did
    pub fn service_started_at(&self, unit: &str) -> Result<Option<SystemTime>, StepError> {
        let output = self.query(
            "systemctl",
            &[
                "show",
                "--property=ActiveEnterTimestamp",
                "--value",
                "--timestamp=unix",
                unit,
            ],
        )?;
        if !output.success {
            return Ok(None);
        }
        Ok(parse_unix_timestamp(&output.stdout_str()))
    }

    /// Does a virtual environment exist at `venv`?
    pub fn venv_exists(&self, venv: &Path) -> bool {
        venv_python(venv).is_file()
    }

    /// Is the Python distribution installed in the venv?
    pub fn python_lib_installed(&self, venv: &Path, requirement: &str) -> Result<bool, StepError> {
        let pip = venv_pip(venv);
        let pip = pip.to_string_lossy();
        let name = requirement_name(requirement);
        Ok(self.query(&pip, &["show", "--quiet", name])?.success)
    }
}

/// `@1718000000` as printed by `systemctl show --timestamp=unix`
fn parse_unix_timestamp(value: &str) -> Option<SystemTime> {
    let secs: u64 = value.trim().strip_prefix('@')?.parse().ok()?;
    UNIX_EPOCH.checked_add(Duration::from_secs(secs))
}

/// Read a file, treating "does not exist" as `None`
fn read_optional(path: &Path) -> Result<Option<String>, StepError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StepError::from_io(
            &e,
            ErrorKind::ProbeFailed,
            &format!("cannot read {}", path.display()),
        )),
    }
}

/// Interpreter inside a venv
pub fn venv_python(venv: &Path) -> PathBuf {
    venv.join("bin").join("python")
}

/// pip inside a venv
pub fn venv_pip(venv: &Path) -> PathBuf {
    venv.join("bin").join("pip")
}

/// Distribution name of a pip requirement (`smbus2>=0.4` → `smbus2`)
pub fn requirement_name(requirement: &str) -> &str {
    let end = requirement
        .find(|c: char| matches!(c, '=' | '<' | '>' | '!' | '~' | '[' | ';' | ' ' | '@'))
        .unwrap_or(requirement.len());
    requirement[..end].trim()
}
