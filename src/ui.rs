use colored::Colorize;
use declarative::{ExecutionReport, ProgressCallback, RunStatus, StepOutcome, StepRecord};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::time::Duration;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Symbol for a step outcome
fn symbol(outcome: &StepOutcome) -> colored::ColoredString {
    match outcome {
        StepOutcome::Applied { .. } => "✓".green(),
        StepOutcome::Skipped => "○".dimmed(),
        StepOutcome::WouldApply => "→".cyan(),
        StepOutcome::Failed { .. } => "✗".red(),
    }
}

/// One summary line for a finished step
pub fn step_line(record: &StepRecord) -> String {
    let label = match &record.outcome {
        StepOutcome::Applied {
            reboot_required: true,
        } => "applied (reboot required)".yellow().to_string(),
        StepOutcome::Applied { .. } => "applied".green().to_string(),
        StepOutcome::Skipped => "already satisfied".dimmed().to_string(),
        StepOutcome::WouldApply => "would apply".cyan().to_string(),
        StepOutcome::Failed { kind, .. } => format!("failed: {kind}").red().to_string(),
    };
    format!("{} {:<20} {}", symbol(&record.outcome), record.name, label)
}

/// Per-step console output, with a spinner while a step works
pub struct ConsoleProgress {
    spinner: Option<ProgressBar>,
    quiet: bool,
    interactive: bool,
}

impl ConsoleProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            spinner: None,
            quiet,
            interactive: std::io::stdout().is_terminal(),
        }
    }

    fn spinner(message: String) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_step_start(&mut self, _index: usize, _total: usize, _name: &str, description: &str) {
        if self.quiet || !self.interactive {
            return;
        }
        self.spinner = Some(Self::spinner(description.to_string()));
    }

    fn on_step_complete(&mut self, record: &StepRecord) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
        if self.quiet && record.outcome.is_success() {
            return;
        }
        println!("{}", step_line(record));
    }
}

/// Final pass/fail report
pub fn summary(report: &ExecutionReport) {
    let applied = report.count("applied");
    let skipped = report.count("skipped");
    let pending = report.count("would apply");

    match report.status() {
        RunStatus::Completed if report.is_dry_run() => {
            if pending == 0 {
                success("Dry run: nothing to change");
            } else {
                info(&format!(
                    "Dry run: {pending} step(s) would apply, {skipped} already satisfied"
                ));
            }
        }
        RunStatus::Completed => {
            success(&format!(
                "Provisioned: {applied} applied, {skipped} already satisfied"
            ));
            if report.reboot_required() {
                warn("Reboot required for the changes to take effect");
            }
        }
        RunStatus::Failed { step } => {
            error(&format!("Step '{step}' failed"));
            if let Some(StepOutcome::Failed { kind, detail }) = report.outcome_of(step) {
                eprintln!("  {}", detail);
                eprintln!("  {}", kind.advice().dimmed());
            }
        }
        RunStatus::Cancelled => {
            warn(&format!(
                "Cancelled after {} step(s); re-run to continue",
                report.records().len()
            ));
        }
    }
}

/// Report as printed by `--json`
#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub exit_code: u8,
    pub reboot_required: bool,
    #[serde(flatten)]
    pub report: &'a ExecutionReport,
}

impl<'a> JsonReport<'a> {
    pub fn new(report: &'a ExecutionReport, exit_code: u8) -> Self {
        Self {
            generated_at: chrono::Utc::now(),
            exit_code,
            reboot_required: report.reboot_required(),
            report,
        }
    }
}
