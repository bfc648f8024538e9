//! Scripted command runner for tests
//!
//! Behaves like a tiny Debian host: dpkg/apt, python venv/pip and systemctl
//! keep in-memory state, so a provisioning run and a re-run can be checked
//! for idempotence without touching the real system.

use crate::host::{CommandOutput, CommandRunner};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
struct State {
    packages: BTreeMap<String, String>,
    python_libs: BTreeSet<(PathBuf, String)>,
    active: BTreeSet<String>,
    enabled: BTreeSet<String>,
    needs_reload: BTreeSet<String>,
    started_at: BTreeMap<String, SystemTime>,
    failures: Vec<(String, String)>,
    unavailable: BTreeSet<String>,
    proc_modules: Option<PathBuf>,
    calls: Vec<String>,
    mutating: usize,
}

#[derive(Debug, Default)]
pub struct FakeRunner {
    state: RefCell<State>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install_package(&self, name: &str) {
        self.set_package_status(name, "install ok installed");
    }

    pub fn set_package_status(&self, name: &str, status: &str) {
        self.state
            .borrow_mut()
            .packages
            .insert(name.to_string(), status.to_string());
    }

    pub fn install_python_lib(&self, venv: &Path, name: &str) {
        self.state
            .borrow_mut()
            .python_libs
            .insert((venv.to_path_buf(), name.to_string()));
    }

    pub fn set_service(&self, unit: &str, active: bool, enabled: bool) {
        let mut state = self.state.borrow_mut();
        toggle(&mut state.active, unit, active);
        toggle(&mut state.enabled, unit, enabled);
    }

    pub fn set_needs_reload(&self, unit: &str, needs: bool) {
        toggle(&mut self.state.borrow_mut().needs_reload, unit, needs);
    }

    pub fn set_started_at(&self, unit: &str, when: SystemTime) {
        self.state
            .borrow_mut()
            .started_at
            .insert(unit.to_string(), when);
    }

    /// Make every command line starting with `prefix` exit non-zero
    pub fn fail_when(&self, prefix: &str, stderr: &str) {
        self.state
            .borrow_mut()
            .failures
            .push((prefix.to_string(), stderr.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state.borrow_mut().failures.clear();
    }

    /// Make `program` impossible to spawn
    pub fn unavailable(&self, program: &str) {
        self.state
            .borrow_mut()
            .unavailable
            .insert(program.to_string());
    }

    /// Have `modprobe` list loaded modules in this file, like the kernel would
    pub fn track_modules(&self, proc_modules: &Path) {
        self.state.borrow_mut().proc_modules = Some(proc_modules.to_path_buf());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    /// Number of commands that would change the host
    pub fn mutating_calls(&self) -> usize {
        self.state.borrow().mutating
    }

    pub fn is_active(&self, unit: &str) -> bool {
        self.state.borrow().active.contains(unit)
    }

    pub fn is_enabled(&self, unit: &str) -> bool {
        self.state.borrow().enabled.contains(unit)
    }
}

fn toggle(set: &mut BTreeSet<String>, key: &str, on: bool) {
    if on {
        set.insert(key.to_string());
    } else {
        set.remove(key);
    }
}

fn ok(stdout: &str) -> io::Result<CommandOutput> {
    Ok(CommandOutput {
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
        success: true,
    })
}

fn fail(stderr: &str) -> io::Result<CommandOutput> {
    Ok(CommandOutput {
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
        success: false,
    })
}

fn is_query(program: &str, args: &[&str]) -> bool {
    match (program, args.first().copied()) {
        ("dpkg-query", _) => true,
        ("systemctl", Some("is-active" | "is-enabled" | "show")) => true,
        (p, Some("show")) if p.ends_with("/bin/pip") => true,
        _ => false,
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");

        let mut state = self.state.borrow_mut();
        state.calls.push(line.clone());

        if state.unavailable.contains(program) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
        }
        if !is_query(program, args) {
            state.mutating += 1;
        }
        if let Some((_, stderr)) = state.failures.iter().find(|(p, _)| line.starts_with(p.as_str())) {
            let stderr = stderr.clone();
            return fail(&stderr);
        }

        match (program, args) {
            ("dpkg-query", [.., name]) => match state.packages.get(*name) {
                Some(status) => ok(status),
                None => fail(&format!("dpkg-query: no packages found matching {name}")),
            },
            ("apt-get", ["update", ..]) => ok(""),
            ("apt-get", ["install", rest @ ..]) => {
                for pkg in rest.iter().filter(|a| !a.starts_with('-')) {
                    state
                        .packages
                        .insert((*pkg).to_string(), "install ok installed".to_string());
                }
                ok("")
            }
            ("modprobe", [.., module]) => {
                let tracked = state.proc_modules.clone();
                if let Some(path) = tracked {
                    drop(state);
                    let mut content = std::fs::read_to_string(&path).unwrap_or_default();
                    content.push_str(&format!(
                        "{} 16384 0 - Live 0x0\n",
                        crate::bootconfig::normalize_module(module)
                    ));
                    std::fs::write(&path, content)?;
                }
                ok("")
            }
            ("systemctl", ["is-active", "--quiet", unit]) => {
                if state.active.contains(*unit) { ok("") } else { fail("") }
            }
            ("systemctl", ["is-enabled", "--quiet", unit]) => {
                if state.enabled.contains(*unit) { ok("") } else { fail("") }
            }
            ("systemctl", ["show", "--property=NeedDaemonReload", "--value", unit]) => {
                if state.needs_reload.contains(*unit) { ok("yes\n") } else { ok("no\n") }
            }
            (
                "systemctl",
                ["show", "--property=ActiveEnterTimestamp", "--value", "--timestamp=unix", unit],
            ) => match state.started_at.get(*unit) {
                Some(when) => {
                    let secs = when.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
                    ok(&format!("@{secs}\n"))
                }
                None => ok("\n"),
            },
            ("systemctl", ["daemon-reload"]) => {
                state.needs_reload.clear();
                ok("")
            }
            ("systemctl", ["enable", unit]) => {
                state.enabled.insert((*unit).to_string());
                ok("")
            }
            ("systemctl", ["start" | "restart", unit]) => {
                state.active.insert((*unit).to_string());
                state
                    .started_at
                    .insert((*unit).to_string(), SystemTime::now());
                ok("")
            }
            (_, ["-m", "venv", path]) => {
                drop(state);
                let bin = Path::new(path).join("bin");
                std::fs::create_dir_all(&bin)?;
                std::fs::write(bin.join("python"), "")?;
                std::fs::write(bin.join("pip"), "")?;
                ok("")
            }
            (pip, ["show", "--quiet", name]) if pip.ends_with("/bin/pip") => {
                let venv = venv_of(pip);
                if state.python_libs.contains(&(venv, (*name).to_string())) {
                    ok("")
                } else {
                    fail(&format!("WARNING: Package(s) not found: {name}"))
                }
            }
            (pip, ["install", rest @ ..]) if pip.ends_with("/bin/pip") => {
                let venv = venv_of(pip);
                for req in rest.iter().filter(|a| !a.starts_with('-')) {
                    let name = crate::host::probe::requirement_name(req).to_string();
                    state.python_libs.insert((venv.clone(), name));
                }
                ok("")
            }
            _ => ok(""),
        }
    }
}

fn venv_of(pip: &str) -> PathBuf {
    Path::new(pip)
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Host rooted at `root`, owned by the user running the tests
pub fn host_in<'a>(runner: &'a FakeRunner, root: &Path) -> crate::host::Host<'a> {
    crate::host::Host::new(
        runner,
        crate::host::HostPaths::detect(root),
        crate::host::Owner::current(),
    )
}
