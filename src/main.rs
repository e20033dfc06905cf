//! trustee-harness: run ACL enforcer scenarios against a synthetic fixture.
//!
//! Run from the test suite directory as root. Prints one
//! `<scenario>: passed|failed` line per scenario on stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use trustee_harness::config::DEFAULT_CONFIG_FILE;
use trustee_harness::runner::interrupt;
use trustee_harness::{Harness, HarnessConfig, ProcessCredentials, SettrusteesEnforcer, Summary};

/// Exit status for errors that stop the run before or while it executes.
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "trustee-harness")]
#[command(version, about = "Scenario runner for the trustees ACL enforcer", long_about = None)]
struct Cli {
    /// TOML configuration file [default: trustee-harness.toml if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Users and groups fixture
    #[arg(long)]
    passwd: Option<PathBuf>,

    /// Filesystem layout fixture
    #[arg(long)]
    filesystem: Option<PathBuf>,

    /// Name of the fixture root directory
    #[arg(long)]
    root_dir: Option<String>,

    /// Path to the enforcer's command-line tool
    #[arg(long)]
    enforcer: Option<PathBuf>,

    /// Directory searched for scenario directories
    #[arg(long)]
    scenarios_dir: Option<PathBuf>,

    /// Keep rules of earlier scenarios loaded instead of resetting
    #[arg(long)]
    accumulate_rules: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Scenarios to run; all discovered scenarios when omitted
    scenarios: Vec<String>,
}

impl Cli {
    fn load_config(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::load(path, true)?,
            None => HarnessConfig::load(&PathBuf::from(DEFAULT_CONFIG_FILE), false)?,
        };
        if let Some(p) = &self.passwd {
            config.passwd = p.clone();
        }
        if let Some(p) = &self.filesystem {
            config.filesystem = p.clone();
        }
        if let Some(r) = &self.root_dir {
            config.root_dir = r.clone();
        }
        if let Some(e) = &self.enforcer {
            config.enforcer = e.clone();
        }
        if let Some(d) = &self.scenarios_dir {
            config.scenarios_dir = d.clone();
        }
        if self.accumulate_rules {
            config.isolate_scenarios = false;
        }
        if let Some(f) = &self.log_file {
            config.log_file = Some(f.clone());
        }
        Ok(config)
    }
}

/// Install the subscriber; the returned guard flushes the log file on drop.
fn init_logging(level: &str, log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(guard)
}

fn run(cli: &Cli) -> Result<Summary> {
    let config = cli.load_config()?;
    let _guard = init_logging(&cli.log_level, config.log_file.as_ref())?;
    interrupt::install().context("failed to install Ctrl-C handler")?;

    let enforcer = SettrusteesEnforcer::new(&config.enforcer);
    let mut harness = Harness::prepare(config, ProcessCredentials, enforcer)?;
    let names = harness
        .select(&cli.scenarios)
        .context("failed to list scenarios")?;
    let summary = harness.run(&names)?;
    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(summary) => {
            print!("{}", summary);
            if summary.aborted.is_some() {
                ExitCode::from(EXIT_FATAL)
            } else if summary.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("trustee-harness: {:#}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
