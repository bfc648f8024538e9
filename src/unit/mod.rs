//! Service unit rendering and installation

mod installer;
mod spec;

pub use installer::install;
pub use spec::{RestartPolicy, ServiceUnitSpec, UnitSpecError};
