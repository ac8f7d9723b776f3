mod builder;
mod cli;
mod config;
mod discovery;
mod error;
mod orchestrator;
mod partition;
mod report;
mod scan;
mod tool;
mod ui;
mod variant;
mod workspace;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use config::BuildConfig;
use orchestrator::Orchestrator;
use tool::CommandTool;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            let class = match e.downcast_ref::<error::ExbuildError>() {
                Some(err) if err.is_configuration() => "configuration error",
                Some(error::ExbuildError::ItemDiscoveryFailed { .. }) => "discovery error",
                _ => "error",
            };
            eprintln!("exbuild: {class}: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = BuildConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.apply_cli(&cli);

    let paths = config.paths()?;
    std::fs::create_dir_all(&paths.log_dir)
        .with_context(|| format!("log directory {} is not writable", paths.log_dir.display()))?;

    let tool = CommandTool::new(&config.tool);
    let orchestrator = Orchestrator::new(config, paths, tool);
    let job_name = cli.job_name.as_deref();

    if cli.dry_run {
        let listing = orchestrator.dry_run(job_name)?;
        ui::print_listing(&listing);
        return Ok(0);
    }

    let report = orchestrator.run(job_name).await?;
    ui::print_summary(&report);
    Ok(report.exit_code)
}
