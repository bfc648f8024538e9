//! Kernel hardware interface (I2C, SPI)
//!
//! Enabling an interface touches two files: the firmware `dtparam` in the
//! boot config, which only takes effect after a reboot, and the module list
//! in `/etc/modules`, whose module is also loaded right away.

use crate::bootconfig::{self, DtParam};
use crate::fsutil;
use crate::host::Host;
use declarative::{Applied, ErrorKind, Step, StepError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Hardware interface the application needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    I2c,
    Spi,
}

impl Interface {
    /// Firmware parameter that turns the bus on
    pub fn param(self) -> DtParam<'static> {
        let name = match self {
            Self::I2c => "i2c_arm",
            Self::Spi => "spi",
        };
        DtParam { name, value: "on" }
    }

    /// Kernel module exposing the bus to userspace
    pub fn module(self) -> &'static str {
        match self {
            Self::I2c => "i2c-dev",
            Self::Spi => "spidev",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::I2c => "i2c",
            Self::Spi => "spi",
        })
    }
}

/// Ensure the interface is enabled now and at boot
#[derive(Debug, Clone)]
pub struct HardwareInterface {
    interface: Interface,
}

impl HardwareInterface {
    pub fn new(interface: Interface) -> Self {
        Self { interface }
    }
}

/// Rewrite `path` through `edit`, keeping its mode; returns whether it changed
fn edit_file(
    path: &Path,
    edit: impl FnOnce(&str) -> bootconfig::Edit,
) -> Result<bool, StepError> {
    let io_err = |e: &std::io::Error| {
        StepError::from_io(e, ErrorKind::Io, &format!("cannot update {}", path.display()))
    };

    let current = fsutil::read_or_empty(path).map_err(|e| io_err(&e))?;
    let result = edit(&current);
    if !result.changed {
        return Ok(false);
    }

    let mode = path
        .metadata()
        .map_or(0o644, |m| m.permissions().mode() & 0o7777);
    fsutil::write_atomic(path, result.content.as_bytes(), mode).map_err(|e| io_err(&e))?;
    log::info!("Updated {}", path.display());
    Ok(true)
}

impl Step<Host<'_>> for HardwareInterface {
    fn name(&self) -> &str {
        "hardware-interface"
    }

    fn description(&self) -> String {
        format!("Enable the {} interface", self.interface)
    }

    fn check(&self, host: &Host<'_>) -> Result<bool, StepError> {
        let probe = host.probe();
        let module = self.interface.module();
        Ok(probe.interface_enabled(self.interface.param())?
            && probe.module_autoloaded(module)?
            && probe.kernel_module_loaded(module)?)
    }

    fn apply(&self, host: &Host<'_>) -> Result<Applied, StepError> {
        let paths = host.paths();
        let param = self.interface.param();
        let module = self.interface.module();

        let mut reboot =
            edit_file(&paths.boot_config(), |c| bootconfig::set_param(c, param))?;
        edit_file(&paths.modules_file(), |c| bootconfig::ensure_module(c, module))?;

        let loaded = host.probe().kernel_module_loaded(module).unwrap_or(false);
        if !loaded {
            // listed in the modules file, so it still loads on the next boot
            if let Err(e) = host.command_ok("modprobe", &[module], |_| ErrorKind::CommandFailed) {
                log::warn!("Could not load {module} now: {}", e.detail);
                reboot = true;
            }
        }

        Ok(if reboot {
            Applied::ChangedRebootRequired
        } else {
            Applied::Changed
        })
    }
}
