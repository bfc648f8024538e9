//! Unit installation as a sequence of steps
//!
//! Writing, reloading, enabling and starting are separate steps so a
//! partial failure is reported precisely ("write applied, enable failed").
//! They share one flag: whether the running service may be using an older
//! definition than the one on disk. It is raised when this run rewrites the
//! unit, when the service manager still has to reload it, or when the unit
//! file is newer than the running process, so a run that follows a failed
//! one still finishes with a restart.

use super::ServiceUnitSpec;
use super::spec::UnitSpecError;
use crate::fsutil;
use crate::host::{self, Host};
use declarative::{
    Applied, BoxedStep, CancelToken, ErrorKind, ExecuteOptions, ExecutionReport, ProgressCallback,
    Step, StepError,
};
use std::cell::Cell;
use std::fs;
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

type Changed = Rc<Cell<bool>>;

fn classify_systemctl(message: &str) -> ErrorKind {
    if host::mentions_permission_problem(message) {
        ErrorKind::PermissionDenied
    } else {
        ErrorKind::ServiceManagerRejected
    }
}

fn systemctl(host: &Host<'_>, args: &[&str]) -> Result<(), StepError> {
    host.command_ok("systemctl", args, classify_systemctl)?;
    Ok(())
}

/// Put the rendered unit in the unit directory
#[derive(Debug)]
struct WriteUnit {
    file_name: String,
    content: String,
    changed: Changed,
}

impl Step<Host<'_>> for WriteUnit {
    fn name(&self) -> &str {
        "write-unit"
    }

    fn description(&self) -> String {
        format!("Write {}", self.file_name)
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        let path = host.paths().unit_file(&self.file_name);
        let same = match fs::read(&path) {
            Ok(existing) => existing == self.content.as_bytes(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                self.changed.set(true);
                return Err(StepError::from_io(
                    &e,
                    ErrorKind::ProbeFailed,
                    &format!("cannot read {}", path.display()),
                ));
            }
        };
        self.changed.set(!same);
        Ok(same)
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        let path = host.paths().unit_file(&self.file_name);
        self.changed.set(true);
        fsutil::write_atomic(&path, self.content.as_bytes(), 0o644).map_err(|e| {
            StepError::from_io(
                &e,
                ErrorKind::UnitWriteFailed,
                &format!("cannot write {}", path.display()),
            )
        })?;
        log::info!("Wrote {}", path.display());
        Ok(Applied::Changed)
    }
}

/// Make the service manager load the current unit definitions
#[derive(Debug)]
struct ReloadManager {
    unit: String,
    changed: Changed,
}

impl Step<Host<'_>> for ReloadManager {
    fn name(&self) -> &str {
        "reload-manager"
    }

    fn description(&self) -> String {
        "Reload service manager definitions".to_string()
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        if self.changed.get() {
            return Ok(false);
        }
        let pending = host.probe().manager_needs_reload(&self.unit)?;
        if pending {
            log::info!("{} has a definition the service manager never loaded", self.unit);
            self.changed.set(true);
        }
        Ok(!pending)
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        systemctl(host, &["daemon-reload"])?;
        Ok(Applied::Changed)
    }
}

/// Start the unit at boot
#[derive(Debug)]
struct EnableUnit {
    unit: String,
}

impl Step<Host<'_>> for EnableUnit {
    fn name(&self) -> &str {
        "enable-unit"
    }

    fn description(&self) -> String {
        format!("Enable {} at boot", self.unit)
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        host.probe().service_enabled(&self.unit)
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        systemctl(host, &["enable", &self.unit])?;
        Ok(Applied::Changed)
    }
}

/// Run the unit now, restarting it if its definition was just replaced
#[derive(Debug)]
struct StartUnit {
    unit: String,
    changed: Changed,
}

impl Step<Host<'_>> for StartUnit {
    fn name(&self) -> &str {
        "start-unit"
    }

    fn description(&self) -> String {
        format!("Start {}", self.unit)
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        if self.changed.get() {
            return Ok(false);
        }
        let probe = host.probe();
        if !probe.service_active(&self.unit)? {
            return Ok(false);
        }
        if let Some(started) = probe.service_started_at(&self.unit)? {
            let path = host.paths().unit_file(&self.unit);
            if written_after(&path, started) {
                log::info!("{} is running an older definition", self.unit);
                self.changed.set(true);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        let verb = if self.changed.get() { "restart" } else { "start" };
        systemctl(host, &[verb, &self.unit])?;
        Ok(Applied::Changed)
    }
}

/// Was `path` modified at least a second after `started`?
///
/// Start times only have second resolution.
fn written_after(path: &Path, started: SystemTime) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .is_ok_and(|modified| {
            modified
                .duration_since(started)
                .is_ok_and(|d| d >= Duration::from_secs(1))
        })
}

/// Bounded wait for the unit to report active
///
/// Covers the unit's own start delay plus a grace period instead of
/// sleeping blindly.
#[derive(Debug)]
struct AwaitActive {
    unit: String,
    deadline: Duration,
    poll: Duration,
}

impl Step<Host<'_>> for AwaitActive {
    fn name(&self) -> &str {
        "await-active"
    }

    fn description(&self) -> String {
        format!(
            "Wait up to {}s for {} to become active",
            self.deadline.as_secs(),
            self.unit
        )
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        host.probe().service_active(&self.unit)
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        let started = Instant::now();
        loop {
            match host.probe().service_active(&self.unit) {
                Ok(true) => return Ok(Applied::Changed),
                Ok(false) => {}
                Err(e) if !e.kind.is_fatal() => log::debug!("{e}"),
                Err(e) => return Err(e),
            }
            if started.elapsed() >= self.deadline {
                break;
            }
            thread::sleep(self.poll);
        }

        Err(StepError::service_manager_rejected(format!(
            "{} did not become active within {}s",
            self.unit,
            self.deadline.as_secs()
        )))
    }
}

/// The unit installer's steps, in order
///
/// `ready_timeout` of zero leaves out the wait for the unit to come up.
pub fn steps<'h>(
    spec: &ServiceUnitSpec,
    ready_timeout: Duration,
) -> Vec<BoxedStep<'static, Host<'h>>> {
    let unit = spec.file_name();
    let changed = Changed::default();

    let mut steps: Vec<BoxedStep<'static, Host<'h>>> = vec![
        Box::new(WriteUnit {
            file_name: unit.clone(),
            content: spec.render(),
            changed: Rc::clone(&changed),
        }),
        Box::new(ReloadManager {
            unit: unit.clone(),
            changed: Rc::clone(&changed),
        }),
        Box::new(EnableUnit { unit: unit.clone() }),
        Box::new(StartUnit {
            unit: unit.clone(),
            changed,
        }),
    ];

    if !ready_timeout.is_zero() {
        steps.push(Box::new(AwaitActive {
            unit,
            deadline: spec.start_delay + ready_timeout,
            poll: POLL_INTERVAL,
        }));
    }
    steps
}

/// Install, reload, enable and start the unit described by `spec`
pub fn install<P: ProgressCallback + ?Sized>(
    spec: &ServiceUnitSpec,
    host: &Host<'_>,
    opts: &ExecuteOptions,
    ready_timeout: Duration,
    progress: &mut P,
    cancel: &CancelToken,
) -> Result<ExecutionReport, UnitSpecError> {
    spec.validate()?;
    let steps = steps(spec, ready_timeout);
    Ok(declarative::run(&steps, host, opts, progress, cancel))
}
