use crate::config::Overrides;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "provision")]
#[command(version)]
#[command(about = "Idempotent host provisioning for a single Python service", long_about = None)]
pub struct Cli {
    /// Directory the application files are installed to
    #[arg(long, value_name = "PATH")]
    pub target_dir: Option<PathBuf>,

    /// Name of the service unit
    #[arg(long, value_name = "NAME")]
    pub service_name: Option<String>,

    /// Also install, enable and start the service unit
    #[arg(long)]
    pub with_service: bool,

    /// Report what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Config file (default: $PROVISION_CONFIG, then /etc/provision/provision.toml)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the application files (default: working directory)
    #[arg(long, value_name = "PATH")]
    pub source_dir: Option<PathBuf>,

    /// Print the execution report as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            target_dir: self.target_dir.clone(),
            source_dir: self.source_dir.clone(),
            service_name: self.service_name.clone(),
        }
    }

    /// Log level from -v / -q
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
