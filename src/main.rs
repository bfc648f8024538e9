mod bootconfig;
mod cli;
mod config;
mod fsutil;
mod host;
mod orchestrator;
mod paths;
mod steps;
mod ui;
mod unit;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use config::Config;
use declarative::{CancelToken, NoProgress, ProgressCallback};
use host::{Host, Owner, SystemRunner};
use orchestrator::{ExitStatus, Options};
use std::path::PathBuf;
use std::process::ExitCode;

/// Log filter override, in `RUST_LOG` syntax
const ENV_LOG: &str = "PROVISION_LOG";

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also arrive here
            let status = if e.use_stderr() {
                ExitStatus::InvalidArguments
            } else {
                ExitStatus::Success
            };
            let _ = e.print();
            return ExitCode::from(status.code());
        }
    };

    init_logging(&cli);

    let (config, source) = match load(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            return ExitCode::from(ExitStatus::InvalidArguments.code());
        }
    };

    let status = execute(&cli, &config, source).unwrap_or_else(|e| {
        ui::error(&format!("{e:#}"));
        ExitStatus::StepFailed
    });
    ExitCode::from(status.code())
}

fn init_logging(cli: &Cli) {
    let var = if std::env::var_os(ENV_LOG).is_some() {
        ENV_LOG
    } else {
        "RUST_LOG"
    };

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_env(env_logger::Env::new().filter(var))
        .format_timestamp(None)
        .init();
}

/// Resolve configuration; any error here is a usage error
fn load(cli: &Cli) -> Result<(Config, PathBuf)> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(&cli.overrides());
    config.validate()?;
    if cli.with_service {
        config
            .unit_spec()
            .validate()
            .context("Invalid service definition")?;
    }
    let source = config.source_dir()?;
    Ok((config, source))
}

fn execute(cli: &Cli, config: &Config, source: PathBuf) -> Result<ExitStatus> {
    if !cli.dry_run && !host::identity::is_root() {
        log::warn!("Not running as root; privileged steps will fail");
    }

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        log::warn!("Interrupted, stopping after the current step");
        handler.cancel();
    })
    .context("Could not install the signal handler")?;

    let runner = SystemRunner;
    let owner = Owner::invoking();
    log::info!("Installing files for {owner}");
    let host = Host::new(&runner, config.host_paths(), owner);

    let opts = Options {
        dry_run: cli.dry_run,
        with_service: cli.with_service,
    };

    let mut progress: Box<dyn ProgressCallback> = if cli.json {
        Box::new(NoProgress)
    } else {
        if !cli.quiet {
            let mode = if cli.dry_run { " (dry run)" } else { "" };
            ui::header(&format!(
                "Provisioning {}{mode}",
                config.target_dir().display()
            ));
            ui::dim(&format!("source: {}", source.display()));
        }
        Box::new(ui::ConsoleProgress::new(cli.quiet))
    };

    let report = orchestrator::provision(config, source, &host, &opts, progress.as_mut(), &cancel)?;
    let status = ExitStatus::from_report(&report);

    if cli.json {
        let json = serde_json::to_string_pretty(&ui::JsonReport::new(&report, status.code()))
            .context("Could not serialize the report")?;
        println!("{json}");
        if let Some(failed) = report.failure() {
            ui::error(&format!("Step '{}' failed", failed.name));
        }
    } else {
        ui::summary(&report);
    }

    Ok(status)
}
