//! Provisioning steps, in the order the orchestrator runs them

mod interface;
mod packages;
mod python_libs;
mod target_dir;
mod venv;

pub use interface::{HardwareInterface, Interface};
pub use packages::OsPackages;
pub use python_libs::PythonLibs;
pub use target_dir::{DEFAULT_EXCLUDE, TargetDir};
pub use venv::Venv;
