//! The provisioning capability
//!
//! [`Host`] is the only thing steps are given: a command runner, the host's
//! filesystem layout, and the owner for installed files. Swapping the runner
//! and rooting the layout in a temp dir is all the tests need.

pub mod identity;
pub mod probe;
pub mod runner;

#[cfg(test)]
pub mod fake;

use declarative::{ErrorKind, StepError};
use std::path::{Component, Path, PathBuf};

pub use identity::Owner;
pub use probe::Probe;
pub use runner::{CommandOutput, CommandRunner, SystemRunner};

/// Boot config location on current Raspberry Pi OS releases
pub const BOOT_CONFIG_FIRMWARE: &str = "/boot/firmware/config.txt";
/// Boot config location on older releases
pub const BOOT_CONFIG_LEGACY: &str = "/boot/config.txt";
/// Kernel modules loaded at boot
pub const MODULES_FILE: &str = "/etc/modules";
/// Directory for administrator-installed unit files
pub const UNIT_DIR: &str = "/etc/systemd/system";
/// Currently loaded kernel modules
pub const PROC_MODULES: &str = "/proc/modules";

/// Well-known host paths, all interpreted relative to `root`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    pub root: PathBuf,
    pub boot_config: PathBuf,
    pub modules_file: PathBuf,
    pub unit_dir: PathBuf,
    pub proc_modules: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self::detect(Path::new("/"))
    }
}

impl HostPaths {
    /// Standard layout under `root`, picking whichever boot config exists
    pub fn detect(root: &Path) -> Self {
        let firmware = Path::new(BOOT_CONFIG_FIRMWARE);
        let legacy = Path::new(BOOT_CONFIG_LEGACY);
        let boot_config = if reroot(root, firmware).exists() || !reroot(root, legacy).exists() {
            firmware.to_path_buf()
        } else {
            PathBuf::from(BOOT_CONFIG_LEGACY)
        };

        Self {
            root: root.to_path_buf(),
            boot_config,
            modules_file: PathBuf::from(MODULES_FILE),
            unit_dir: PathBuf::from(UNIT_DIR),
            proc_modules: PathBuf::from(PROC_MODULES),
        }
    }

    /// Map a logical host path onto the filesystem
    pub fn resolve(&self, logical: &Path) -> PathBuf {
        reroot(&self.root, logical)
    }

    pub fn boot_config(&self) -> PathBuf {
        self.resolve(&self.boot_config)
    }

    pub fn modules_file(&self) -> PathBuf {
        self.resolve(&self.modules_file)
    }

    pub fn proc_modules(&self) -> PathBuf {
        self.resolve(&self.proc_modules)
    }

    /// Where the unit file for `file_name` lives
    pub fn unit_file(&self, file_name: &str) -> PathBuf {
        self.resolve(&self.unit_dir).join(file_name)
    }
}

fn reroot(root: &Path, logical: &Path) -> PathBuf {
    let relative: PathBuf = logical
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}

/// Capability handed to every provisioning step
pub struct Host<'a> {
    runner: &'a dyn CommandRunner,
    paths: HostPaths,
    owner: Owner,
}

impl<'a> Host<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: HostPaths, owner: Owner) -> Self {
        Self {
            runner,
            paths,
            owner,
        }
    }

    pub fn paths(&self) -> &HostPaths {
        &self.paths
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Read-only view for state checks
    pub fn probe(&self) -> Probe<'_> {
        Probe::new(self.runner, &self.paths)
    }

    /// Run a command; only a spawn failure is an error
    pub fn command(&self, program: &str, args: &[&str]) -> Result<CommandOutput, StepError> {
        self.runner.run(program, args).map_err(|e| {
            StepError::from_io(&e, ErrorKind::CommandFailed, &format!("failed to execute {program}"))
        })
    }

    /// Run a command that must succeed
    ///
    /// On non-zero exit the tool's own message becomes the error detail and
    /// `classify` picks the kind from it.
    pub fn command_ok(
        &self,
        program: &str,
        args: &[&str],
        classify: impl Fn(&str) -> ErrorKind,
    ) -> Result<CommandOutput, StepError> {
        let output = self.command(program, args)?;
        if output.success {
            return Ok(output);
        }

        let message = output.failure_message();
        let detail = if message.is_empty() {
            format!("{program} {} exited non-zero", args.join(" "))
        } else {
            message
        };
        Err(StepError::new(classify(&detail), detail))
    }
}

/// Recognise permission failures in a tool's output
pub fn mentions_permission_problem(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("permission denied")
        || lower.contains("are you root")
        || lower.contains("could not open lock file")
        || lower.contains("access denied")
        || lower.contains("interactive authentication required")
}
