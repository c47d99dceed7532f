use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use common::constants::{env, DEFAULT_CONTAINERFILE, DEFAULT_JOBS, DEFAULT_QUERY_TIMEOUT_SECS};
use common::{discover_socket, dotenv_init, init_tracing, normalize_address};
use tracing::{debug, info};

mod checker;
mod docker;
mod drivers;
mod parser;
mod pins;
mod report;
mod runner;
mod types;
mod version;

#[cfg(test)]
mod tests;

use checker::{CheckOptions, UpdateChecker};
use docker::DockerRuntime;
use report::{render, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Verbosity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Verbosity {
    /// Equivalent tracing filter directive
    fn directive(&self) -> &'static str {
        match self {
            Verbosity::Debug => "debug",
            Verbosity::Info => "info",
            Verbosity::Warning => "warn",
            Verbosity::Error => "error",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pinup")]
#[command(about = "Check pinned package versions in Containerfiles for available updates")]
struct Args {
    /// Containerfiles to check (default: ./Containerfile)
    files: Vec<PathBuf>,

    /// Additional Containerfile to check (repeatable)
    #[arg(short = 'f', long = "file")]
    extra_files: Vec<PathBuf>,

    /// Container runtime socket, e.g. unix:///run/user/1000/podman/podman.sock
    #[arg(long, env = env::PINUP_SOCKET)]
    socket: Option<String>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, ignore_case = true, default_value = "warning", env = env::PINUP_VERBOSITY)]
    verbosity: Verbosity,

    /// Per-query timeout in seconds, image pull included
    #[arg(long, default_value_t = DEFAULT_QUERY_TIMEOUT_SECS, env = env::PINUP_TIMEOUT_SECS)]
    timeout: u64,

    /// Number of stage queries to run at once
    #[arg(long, default_value_t = DEFAULT_JOBS, env = env::PINUP_JOBS)]
    jobs: usize,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl Args {
    fn containerfiles(&self) -> Vec<PathBuf> {
        let files: Vec<PathBuf> = self
            .files
            .iter()
            .chain(&self.extra_files)
            .cloned()
            .collect();

        if files.is_empty() {
            vec![PathBuf::from(DEFAULT_CONTAINERFILE)]
        } else {
            files
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv_init();

    let args = Args::parse();
    init_tracing(args.verbosity.directive());

    let files = args.containerfiles();
    for path in &files {
        if !path.is_file() {
            bail!("Containerfile not found: {}", path.display());
        }
    }

    let socket = match &args.socket {
        Some(socket) => normalize_address(socket)?,
        None => discover_socket()?,
    };
    debug!(socket = %socket, "Using container runtime socket");

    let options = CheckOptions {
        timeout: Duration::from_secs(args.timeout),
        jobs: args.jobs.max(1),
    };
    let reports = UpdateChecker::<DockerRuntime>::run(&files, &socket, options).await?;

    let total: usize = reports.iter().map(|r| r.results().count()).sum();
    info!(files = reports.len(), pins = total, "Scan complete");

    let output = render(&reports, args.format).context("Failed to render report")?;
    println!("{}", output);

    Ok(())
}
