//! # Declarative
//!
//! A small framework for idempotent, ordered provisioning.
//!
//! Work is split into [`Step`]s. Each step knows how to tell whether the host
//! already satisfies it (`check`) and how to make it so (`apply`). The
//! executor walks the list strictly in order, skips what is already done,
//! stops at the first failure, and produces an [`ExecutionReport`].
//!
//! ## Core Concepts
//!
//! - **Step**: a named unit of work with `check` and `apply`
//! - **Capability**: the value handed to every `check`/`apply` (the host)
//! - **StepOutcome**: skipped, applied, would-apply (dry run), or failed
//! - **ExecutionReport**: ordered outcomes plus the run's terminal status
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     Applied, CancelToken, ExecuteOptions, FnStep, NoProgress, RunStatus, Step, run,
//! };
//! use std::cell::Cell;
//!
//! let flag = Cell::new(false);
//! let steps: Vec<Box<dyn Step<Cell<bool>>>> = vec![Box::new(FnStep::new(
//!     "flag",
//!     |host: &Cell<bool>| Ok(host.get()),
//!     |host: &Cell<bool>| {
//!         host.set(true);
//!         Ok(Applied::Changed)
//!     },
//! ))];
//!
//! let report = run(
//!     &steps,
//!     &flag,
//!     &ExecuteOptions::default(),
//!     &mut NoProgress,
//!     &CancelToken::new(),
//! );
//! assert_eq!(report.status(), &RunStatus::Completed);
//! assert!(flag.get());
//! ```
//!
//! ## Provider Traits
//!
//! - [`ProgressCallback`]: receives per-step start/complete notifications
//!
//! This keeps the crate free of any terminal, OS or service-manager
//! dependency; callers plug those in.

pub mod context;
pub mod error;
pub mod executor;
pub mod step;
pub mod types;

// Re-export main types at crate root
pub use context::{CancelToken, NoProgress, ProgressCallback};
pub use error::{ErrorKind, StepError};
pub use executor::run;
pub use step::{BoxedStep, FnStep, Step};
pub use types::{
    Applied, ExecuteOptions, ExecutionReport, RunStatus, StepOutcome, StepRecord,
};
