//! Execution engine - applies steps strictly in order

use crate::context::{CancelToken, ProgressCallback};
use crate::step::Step;
use crate::types::{ExecuteOptions, ExecutionReport, RunStatus, StepOutcome, StepRecord};
use std::time::Instant;

/// Run steps in order and report every outcome
///
/// # Arguments
/// * `steps` - The steps, in the order they must run
/// * `host` - Capability handed to every `check` and `apply`
/// * `opts` - Execution options (dry_run)
/// * `progress` - Progress callback
/// * `cancel` - Checked before each step; once set no further step starts
///
/// # Behaviour
/// - satisfied `check` → `Skipped`
/// - `check` failing with a non-fatal kind (`ProbeFailed`) → logged, step
///   treated as unsatisfied
/// - `check` failing with any other kind → `Failed`, run stops
/// - dry run → `WouldApply`, `apply` is never called
/// - `apply` error → `Failed`, run stops; no retry here, re-running the whole
///   list is safe because steps are idempotent
pub fn run<H, P>(
    steps: &[Box<dyn Step<H> + '_>],
    host: &H,
    opts: &ExecuteOptions,
    progress: &mut P,
    cancel: &CancelToken,
) -> ExecutionReport
where
    H: ?Sized,
    P: ProgressCallback + ?Sized,
{
    let total = steps.len();
    let mut records = Vec::with_capacity(total);

    for (index, step) in steps.iter().enumerate() {
        if cancel.is_cancelled() {
            log::warn!("Cancelled before step '{}'", step.name());
            return ExecutionReport::new(opts.dry_run, records, RunStatus::Cancelled);
        }

        progress.on_step_start(index, total, step.name(), &step.description());
        let started = Instant::now();
        let outcome = run_step(step.as_ref(), host, opts);
        let record = StepRecord {
            name: step.name().to_string(),
            outcome,
            duration: started.elapsed(),
        };
        progress.on_step_complete(&record);

        let failed = !record.outcome.is_success();
        records.push(record);

        if failed {
            let status = RunStatus::Failed {
                step: step.name().to_string(),
            };
            return ExecutionReport::new(opts.dry_run, records, status);
        }
    }

    ExecutionReport::new(opts.dry_run, records, RunStatus::Completed)
}

/// Decide and (maybe) apply a single step
fn run_step<H: ?Sized>(step: &dyn Step<H>, host: &H, opts: &ExecuteOptions) -> StepOutcome {
    match step.check(host) {
        Ok(true) => {
            log::info!("{}: already satisfied", step.name());
            return StepOutcome::Skipped;
        }
        Ok(false) => {}
        Err(e) if !e.kind.is_fatal() => {
            log::warn!("{}: {}; attempting apply anyway", step.name(), e);
        }
        Err(e) => {
            log::debug!("{}: check failed: {}", step.name(), e);
            return StepOutcome::Failed {
                kind: e.kind,
                detail: e.detail,
            };
        }
    }

    if opts.dry_run {
        log::info!("{}: would apply (dry run)", step.name());
        return StepOutcome::WouldApply;
    }

    log::info!("{}: applying", step.name());
    match step.apply(host) {
        Ok(applied) => StepOutcome::from(applied),
        Err(e) => {
            if !step.rollback_safe() {
                log::warn!(
                    "{}: failed part-way; re-run to finish the remaining work",
                    step.name()
                );
            }
            log::debug!("{}: apply failed: {}", step.name(), e);
            StepOutcome::Failed {
                kind: e.kind,
                detail: e.detail,
            }
        }
    }
}
