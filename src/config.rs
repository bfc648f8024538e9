//! Provisioning configuration
//!
//! Everything that varies between deployments lives here: which packages,
//! which interface, which service. With no file the defaults describe the
//! PiHUD display on a Raspberry Pi.

use crate::host::HostPaths;
use crate::host::probe::venv_python;
use crate::paths;
use crate::steps::{DEFAULT_EXCLUDE, Interface};
use crate::unit::{RestartPolicy, ServiceUnitSpec};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub install: InstallConfig,
    pub packages: PackagesConfig,
    pub interface: InterfaceConfig,
    pub service: ServiceConfig,
    pub host: HostConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstallConfig {
    pub target_dir: String,
    /// Defaults to the working directory
    pub source_dir: Option<String>,
    /// Defaults to `<target_dir>/venv`
    pub venv_dir: Option<String>,
    pub python: String,
    pub exclude: Vec<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            target_dir: "/opt/pihud".to_string(),
            source_dir: None,
            venv_dir: None,
            python: "python3".to_string(),
            exclude: DEFAULT_EXCLUDE.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackagesConfig {
    pub os: Vec<String>,
    pub python: Vec<String>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        let list = |names: &[&str]| names.iter().map(ToString::to_string).collect();
        Self {
            os: list(&[
                "python3",
                "python3-venv",
                "python3-pip",
                "i2c-tools",
                "python3-smbus",
                "gpsd",
                "gpsd-clients",
            ]),
            python: list(&[
                "adafruit-circuitpython-ssd1306",
                "adafruit-blinka",
                "smbus2",
                "python-dotenv",
                "gps",
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterfaceConfig {
    pub name: Interface,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: Interface::I2c,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub description: String,
    pub after: String,
    /// Script in the target directory run by the venv's interpreter
    pub script: String,
    /// Replaces the command built from `script`
    pub exec_start: Option<String>,
    pub restart: RestartPolicy,
    pub restart_sec: u64,
    pub start_delay_secs: u64,
    /// Grace period after the start delay; 0 skips waiting for the unit
    pub ready_timeout_secs: u64,
    pub wanted_by: String,
    pub user: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "pihud".to_string(),
            description: "PiHUD OLED display".to_string(),
            after: "network-online.target".to_string(),
            script: "pihud-ip.py".to_string(),
            exec_start: None,
            restart: RestartPolicy::Always,
            restart_sec: 5,
            start_delay_secs: 10,
            ready_timeout_secs: 5,
            wanted_by: "multi-user.target".to_string(),
            user: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Prefix for every host path, e.g. a mounted SD card image
    pub root: String,
    /// Detected under `root` when unset
    pub boot_config: Option<String>,
    pub modules_file: Option<String>,
    pub unit_dir: Option<String>,
    pub proc_modules: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            boot_config: None,
            modules_file: None,
            unit_dir: None,
            proc_modules: None,
        }
    }
}

/// Values given on the command line; they win over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target_dir: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub service_name: Option<String>,
}

impl Config {
    /// Load from an explicit file, or the usual locations, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match paths::config_file(explicit) {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(dir) = &overrides.target_dir {
            self.install.target_dir = dir.to_string_lossy().into_owned();
        }
        if let Some(dir) = &overrides.source_dir {
            self.install.source_dir = Some(dir.to_string_lossy().into_owned());
        }
        if let Some(name) = &overrides.service_name {
            self.service.name.clone_from(name);
        }
    }

    /// Reject values no run could succeed with
    pub fn validate(&self) -> Result<()> {
        let target = self.target_dir();
        if !target.is_absolute() {
            bail!("target directory must be absolute: {}", target.display());
        }
        if target.parent().is_none() {
            bail!("refusing to use / as the target directory");
        }
        if !self.venv_dir().is_absolute() {
            bail!("venv directory must be absolute: {}", self.venv_dir().display());
        }
        for name in self.packages.os.iter().chain(&self.packages.python) {
            if name.trim().is_empty() || name.starts_with('-') || name.contains(char::is_whitespace) {
                bail!("invalid package name '{name}'");
            }
        }
        Ok(())
    }

    pub fn target_dir(&self) -> PathBuf {
        paths::expand(&self.install.target_dir)
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.install
            .venv_dir
            .as_deref()
            .map_or_else(|| self.target_dir().join("venv"), paths::expand)
    }

    pub fn source_dir(&self) -> Result<PathBuf> {
        match &self.install.source_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => std::env::current_dir().context("Could not determine the working directory"),
        }
    }

    /// Entries of the target directory that survive a file refresh
    pub fn carried_entries(&self) -> Vec<String> {
        let venv = self.venv_dir();
        match venv.strip_prefix(self.target_dir()) {
            Ok(rel) => rel
                .components()
                .next()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .into_iter()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn host_paths(&self) -> HostPaths {
        let mut paths = HostPaths::detect(&paths::expand(&self.host.root));
        let host = &self.host;
        if let Some(p) = &host.boot_config {
            paths.boot_config = PathBuf::from(p);
        }
        if let Some(p) = &host.modules_file {
            paths.modules_file = PathBuf::from(p);
        }
        if let Some(p) = &host.unit_dir {
            paths.unit_dir = PathBuf::from(p);
        }
        if let Some(p) = &host.proc_modules {
            paths.proc_modules = PathBuf::from(p);
        }
        paths
    }

    /// The unit for the service, with paths as seen on the host
    pub fn unit_spec(&self) -> ServiceUnitSpec {
        let target = self.target_dir();
        let service = &self.service;
        let start_command = service.exec_start.clone().unwrap_or_else(|| {
            format!(
                "{} {}",
                venv_python(&self.venv_dir()).display(),
                target.join(&service.script).display()
            )
        });

        ServiceUnitSpec {
            name: service.name.clone(),
            description: service.description.clone(),
            after: service.after.clone(),
            working_directory: target,
            start_command,
            restart: service.restart,
            restart_sec: service.restart_sec,
            start_delay: Duration::from_secs(service.start_delay_secs),
            wanted_by: service.wanted_by.clone(),
            user: service.user.clone(),
        }
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.service.ready_timeout_secs)
    }
}
