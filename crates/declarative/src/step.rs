//! Step trait for idempotent provisioning
//!
//! A Step is one named unit of work that can tell whether the host already
//! satisfies it, and can make the host satisfy it.

use crate::error::StepError;
use crate::types::Applied;
use std::fmt;

/// Core trait for provisioning steps
///
/// `H` is the capability every step receives: whatever the caller uses to
/// observe and mutate the host. Steps never reach the host by any other
/// route, which is what makes them testable against a fake.
///
/// # Contract
///
/// - `check` is read-only. "Not there yet" is `Ok(false)`, not an error.
/// - `apply` is atomic or safely retryable: when it returns an error the
///   host is either unchanged or in a state the next `apply` can finish.
/// - After a successful `apply`, `check` returns `Ok(true)` until something
///   else changes the host (idempotence).
pub trait Step<H: ?Sized>: fmt::Debug {
    /// Stable name, used in reports and on the error stream
    fn name(&self) -> &str;

    /// Human-readable description of what the step ensures
    fn description(&self) -> String {
        self.name().to_string()
    }

    /// Is the host already in the state this step ensures?
    fn check(&self, host: &H) -> Result<bool, StepError>;

    /// Bring the host into the state this step ensures
    fn apply(&self, host: &H) -> Result<Applied, StepError>;

    /// Whether a failed `apply` leaves the host untouched
    ///
    /// Steps returning `false` are still safe to re-run, but may leave
    /// partial work behind for the next run to finish.
    fn rollback_safe(&self) -> bool {
        true
    }
}

/// A boxed step for type-erased storage
pub type BoxedStep<'a, H> = Box<dyn Step<H> + 'a>;

type CheckFn<'a, H> = Box<dyn Fn(&H) -> Result<bool, StepError> + 'a>;
type ApplyFn<'a, H> = Box<dyn Fn(&H) -> Result<Applied, StepError> + 'a>;

/// A step built from two closures
pub struct FnStep<'a, H: ?Sized> {
    name: String,
    check: CheckFn<'a, H>,
    apply: ApplyFn<'a, H>,
    rollback_safe: bool,
}

impl<'a, H: ?Sized> FnStep<'a, H> {
    pub fn new(
        name: impl Into<String>,
        check: impl Fn(&H) -> Result<bool, StepError> + 'a,
        apply: impl Fn(&H) -> Result<Applied, StepError> + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            check: Box::new(check),
            apply: Box::new(apply),
            rollback_safe: true,
        }
    }

    pub fn with_rollback_safe(mut self, rollback_safe: bool) -> Self {
        self.rollback_safe = rollback_safe;
        self
    }
}

impl<H: ?Sized> fmt::Debug for FnStep<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep")
            .field("name", &self.name)
            .field("rollback_safe", &self.rollback_safe)
            .finish_non_exhaustive()
    }
}

impl<H: ?Sized> Step<H> for FnStep<'_, H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, host: &H) -> Result<bool, StepError> {
        (self.check)(host)
    }

    fn apply(&self, host: &H) -> Result<Applied, StepError> {
        (self.apply)(host)
    }

    fn rollback_safe(&self) -> bool {
        self.rollback_safe
    }
}
