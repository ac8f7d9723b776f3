//! Command line interface of exbuild, based on clap.
//!
//! A single command: an optional job name selects the slice of examples
//! this job instance builds; flags override configuration values.

use clap::Parser;
use std::path::PathBuf;

/// exbuild — partitioned, cache-aware builder for example projects in CI.
#[derive(Debug, Parser)]
#[command(name = "exbuild", version, about)]
pub struct Cli {
    /// CI job name of the form <label>_<index>. Omit to build every example.
    pub job_name: Option<String>,

    /// Configuration file.
    #[arg(long, default_value = "exbuild.toml")]
    pub config: PathBuf,

    /// Root directory scanned for examples.
    #[arg(long)]
    pub examples_root: Option<PathBuf>,

    /// Directory for build logs, the suspect log and the run report.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// CI configuration declaring the <label>_<n> jobs.
    #[arg(long)]
    pub ci_config: Option<PathBuf>,

    /// Directory holding one workspace per build variant.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// List the variants this job would build without building them.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Enables debug logging.
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_job_name() {
        let cli = Cli::parse_from(["exbuild", "build_examples_make_3"]);
        assert_eq!(cli.job_name.as_deref(), Some("build_examples_make_3"));
        assert_eq!(cli.config, PathBuf::from("exbuild.toml"));
        assert!(!cli.dry_run);
    }

    #[test]
    fn cli_without_job_name_builds_everything() {
        let cli = Cli::parse_from(["exbuild"]);
        assert!(cli.job_name.is_none());
    }

    #[test]
    fn cli_parses_overrides() {
        let cli = Cli::parse_from([
            "exbuild",
            "--examples-root",
            "/idf/examples",
            "--log-dir",
            "/logs",
            "--ci-config",
            "/idf/.gitlab-ci.yml",
            "--output-dir",
            "out",
            "--dry-run",
            "-v",
            "nightly_0",
        ]);
        assert_eq!(cli.examples_root, Some(PathBuf::from("/idf/examples")));
        assert_eq!(cli.log_dir, Some(PathBuf::from("/logs")));
        assert_eq!(cli.ci_config, Some(PathBuf::from("/idf/.gitlab-ci.yml")));
        assert_eq!(cli.output_dir, Some(PathBuf::from("out")));
        assert!(cli.dry_run);
        assert!(cli.verbose);
        assert_eq!(cli.job_name.as_deref(), Some("nightly_0"));
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
