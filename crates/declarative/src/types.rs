//! Core types for step execution

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a successful `apply` did to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    /// The change is in effect
    Changed,
    /// The change was written but only takes effect after a restart
    ChangedRebootRequired,
}

/// Outcome of one step in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// `check` reported the step as already satisfied
    Skipped,
    /// `apply` ran and succeeded
    Applied { reboot_required: bool },
    /// Dry run: `check` was not satisfied, `apply` was not called
    WouldApply,
    /// `check` or `apply` failed; the run stopped here
    Failed { kind: ErrorKind, detail: String },
}

impl StepOutcome {
    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the outcome represents a change made to the host
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Short label for one-line summaries
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Applied { .. } => "applied",
            Self::WouldApply => "would apply",
            Self::Failed { .. } => "failed",
        }
    }
}

impl From<Applied> for StepOutcome {
    fn from(applied: Applied) -> Self {
        Self::Applied {
            reboot_required: applied == Applied::ChangedRebootRequired,
        }
    }
}

/// One line of an execution report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

/// Terminal status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step was skipped, applied, or (dry run) would apply
    Completed,
    /// The named step failed; later steps were not attempted
    Failed { step: String },
    /// Cancellation was requested between steps
    Cancelled,
}

/// Ordered record of a single run
///
/// Built by the executor and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    dry_run: bool,
    records: Vec<StepRecord>,
    #[serde(flatten)]
    status: RunStatus,
}

impl ExecutionReport {
    pub(crate) fn new(dry_run: bool, records: Vec<StepRecord>, status: RunStatus) -> Self {
        Self {
            dry_run,
            records,
            status,
        }
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Check if the run finished without a failure or cancellation
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// The failing record, if any
    pub fn failure(&self) -> Option<&StepRecord> {
        self.records.iter().find(|r| !r.outcome.is_success())
    }

    /// Whether any applied step asked for a restart
    pub fn reboot_required(&self) -> bool {
        self.records.iter().any(|r| {
            matches!(
                r.outcome,
                StepOutcome::Applied {
                    reboot_required: true
                }
            )
        })
    }

    /// Outcome recorded for a step name
    pub fn outcome_of(&self, name: &str) -> Option<&StepOutcome> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    /// Step names in execution order
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }

    /// Join a run that continued this one into a single report
    ///
    /// Records are concatenated and the later run's status wins. Only
    /// meaningful when this run completed.
    pub fn then(self, next: Self) -> Self {
        let mut records = self.records;
        records.extend(next.records);
        Self {
            dry_run: self.dry_run || next.dry_run,
            records,
            status: next.status,
        }
    }

    /// Number of records with the given label
    pub fn count(&self, label: &str) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }
}

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just report what would change
    pub dry_run: bool,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, outcome: StepOutcome) -> StepRecord {
        StepRecord {
            name: name.to_string(),
            outcome,
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_reboot_required_only_from_applied() {
        let report = ExecutionReport::new(
            false,
            vec![
                record("a", StepOutcome::Skipped),
                record(
                    "b",
                    StepOutcome::Applied {
                        reboot_required: true,
                    },
                ),
            ],
            RunStatus::Completed,
        );
        assert!(report.reboot_required());
        assert!(report.is_success());
        assert_eq!(report.names(), vec!["a", "b"]);
        assert_eq!(report.count("applied"), 1);
    }

    #[test]
    fn test_failure_lookup() {
        let report = ExecutionReport::new(
            false,
            vec![
                record("a", StepOutcome::Skipped),
                record(
                    "b",
                    StepOutcome::Failed {
                        kind: ErrorKind::PackageUnavailable,
                        detail: "nope".into(),
                    },
                ),
            ],
            RunStatus::Failed { step: "b".into() },
        );
        assert!(!report.is_success());
        assert_eq!(report.failure().map(|r| r.name.as_str()), Some("b"));
        assert!(!report.reboot_required());
    }

    #[test]
    fn test_report_serializes_flat() {
        let report = ExecutionReport::new(
            true,
            vec![record("a", StepOutcome::WouldApply)],
            RunStatus::Completed,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["records"][0]["name"], "a");
        assert_eq!(json["records"][0]["outcome"], "would_apply");
        assert_eq!(json["records"][0]["duration"], 3);
    }

    #[test]
    fn test_applied_conversion() {
        assert_eq!(
            StepOutcome::from(Applied::Changed),
            StepOutcome::Applied {
                reboot_required: false
            }
        );
        assert_eq!(
            StepOutcome::from(Applied::ChangedRebootRequired),
            StepOutcome::Applied {
                reboot_required: true
            }
        );
    }

    #[test]
    fn test_then_joins_records_and_takes_later_status() {
        let first = ExecutionReport::new(
            false,
            vec![record("a", StepOutcome::Skipped)],
            RunStatus::Completed,
        );
        let second = ExecutionReport::new(
            false,
            vec![record(
                "b",
                StepOutcome::Failed {
                    kind: ErrorKind::ServiceManagerRejected,
                    detail: "masked".to_string(),
                },
            )],
            RunStatus::Failed {
                step: "b".to_string(),
            },
        );

        let joined = first.then(second);
        assert_eq!(joined.names(), vec!["a", "b"]);
        assert!(!joined.is_success());
        assert_eq!(joined.failure().map(|r| r.name.as_str()), Some("b"));
    }
}
