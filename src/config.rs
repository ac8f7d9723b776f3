//! Configuration for exbuild, loaded from `exbuild.toml`.
//!
//! [`BuildConfig`] holds every tunable of a run. Values absent from the
//! file fall back to defaults matching the ESP-IDF example layout.
//! Environment variables take precedence over the file, and command line
//! flags take precedence over both.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::ExbuildError;

/// Top-level configuration loaded from `exbuild.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Root directory scanned for example projects.
    #[serde(default)]
    pub examples_root: Option<PathBuf>,

    /// Writable directory for per-variant logs, the suspect log and the report.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// CI configuration scanned for `<label>_<n>:` job declarations.
    #[serde(default)]
    pub ci_config: Option<PathBuf>,

    /// Directory holding one isolated workspace per variant.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Fewer discovered items than this means discovery is broken.
    #[serde(default = "default_min_items")]
    pub min_items: usize,

    /// File name marking a directory as a buildable example.
    #[serde(default = "default_build_file")]
    pub build_file: String,

    /// Path components that disqualify a build file (component makefiles).
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,

    /// Prefix of configuration overlay files; the rest of the name is the suffix.
    #[serde(default = "default_overlay_prefix")]
    pub overlay_prefix: String,

    /// Default configuration file overlays are appended to.
    #[serde(default = "default_default_config")]
    pub default_config: String,

    /// Persisted configuration removed before every build.
    #[serde(default = "default_stale_config")]
    pub stale_config: String,

    /// Artifact copied to `build/download.config` after a successful build.
    #[serde(default = "default_download_artifact")]
    pub download_artifact: PathBuf,

    /// Exit code used when logs contain issues but every build succeeded.
    #[serde(default = "default_issues_exit_code")]
    pub issues_exit_code: i32,

    /// File name of the deduplicated suspect log inside `log_dir`.
    #[serde(default = "default_suspect_log")]
    pub suspect_log: String,

    /// Regular expressions; lines matching any of them are never suspect.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// External build tool invocation.
    #[serde(default)]
    pub tool: ToolConfig,
}

/// How the external build tool is invoked inside a workspace.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
    /// Program to run.
    #[serde(default = "default_program")]
    pub program: String,

    /// Argument lists, one invocation each, run in order.
    #[serde(default = "default_steps")]
    pub steps: Vec<Vec<String>>,

    /// Extra environment; the defaults turn warnings into errors.
    #[serde(default = "default_tool_env")]
    pub env: BTreeMap<String, String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("example_builds")
}

fn default_min_items() -> usize {
    50
}

fn default_build_file() -> String {
    "Makefile".to_string()
}

fn default_excluded_dirs() -> Vec<String> {
    ["components", "common_components", "main"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_overlay_prefix() -> String {
    "sdkconfig.ci.".to_string()
}

fn default_default_config() -> String {
    "sdkconfig.defaults".to_string()
}

fn default_stale_config() -> String {
    "sdkconfig".to_string()
}

fn default_download_artifact() -> PathBuf {
    PathBuf::from("build/flash_project_args")
}

// Historical value, CI dashboards key on it.
fn default_issues_exit_code() -> i32 {
    22
}

fn default_suspect_log() -> String {
    "common_log.txt".to_string()
}

fn default_ignore_patterns() -> Vec<String> {
    [
        r"library/error\.o",
        r" -Werror",
        r"error.*\.c\.obj",
        r"error.*\.c\.o",
        r"error\.d",
        r"reassigning to symbol",
        r"changes choice state",
        r"crosstool_version_check\.cmake",
        r"(?i)toolchain version is not supported",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_program() -> String {
    "make".to_string()
}

fn default_steps() -> Vec<Vec<String>> {
    ["clean", "defconfig", "all"]
        .iter()
        .map(|s| vec![s.to_string()])
        .collect()
}

fn default_tool_env() -> BTreeMap<String, String> {
    let strict = "-Werror -Werror=deprecated-declarations".to_string();
    BTreeMap::from([
        ("EXTRA_CFLAGS".to_string(), strict.clone()),
        ("EXTRA_CXXFLAGS".to_string(), strict),
    ])
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            steps: default_steps(),
            env: default_tool_env(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            examples_root: None,
            log_dir: None,
            ci_config: None,
            output_dir: default_output_dir(),
            min_items: default_min_items(),
            build_file: default_build_file(),
            excluded_dirs: default_excluded_dirs(),
            overlay_prefix: default_overlay_prefix(),
            default_config: default_default_config(),
            stale_config: default_stale_config(),
            download_artifact: default_download_artifact(),
            issues_exit_code: default_issues_exit_code(),
            suspect_log: default_suspect_log(),
            ignore_patterns: default_ignore_patterns(),
            tool: ToolConfig::default(),
        }
    }
}

/// Concrete locations a run works with, after every layer is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub examples_root: PathBuf,
    pub log_dir: PathBuf,
    pub ci_config: PathBuf,
    pub output_dir: PathBuf,
}

impl Paths {
    pub fn suspect_log(&self, config: &BuildConfig) -> PathBuf {
        self.log_dir.join(&config.suspect_log)
    }

    pub fn report(&self) -> PathBuf {
        self.log_dir.join("build_report.json")
    }
}

impl BuildConfig {
    /// Loads configuration from `path`, using defaults if the file does not
    /// exist, then applies process environment overrides.
    pub fn load(path: &Path) -> Result<Self, ExbuildError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<BuildConfig>(&contents)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies environment overrides through `lookup`. Empty values are
    /// treated as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(root) = get("EXBUILD_EXAMPLES_ROOT") {
            self.examples_root = Some(PathBuf::from(root));
        } else if let Some(idf) = get("IDF_PATH") {
            self.examples_root = Some(PathBuf::from(idf).join("examples"));
        }
        if let Some(logs) = get("LOG_PATH") {
            self.log_dir = Some(PathBuf::from(logs));
        }
        if let Some(ci) = get("EXBUILD_CI_CONFIG") {
            self.ci_config = Some(PathBuf::from(ci));
        }
    }

    /// Applies command line overrides, the last layer.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(root) = &cli.examples_root {
            self.examples_root = Some(root.clone());
        }
        if let Some(logs) = &cli.log_dir {
            self.log_dir = Some(logs.clone());
        }
        if let Some(ci) = &cli.ci_config {
            self.ci_config = Some(ci.clone());
        }
        if let Some(out) = &cli.output_dir {
            self.output_dir = out.clone();
        }
    }

    /// Resolves the run's paths, failing with a configuration error naming
    /// the first missing setting.
    pub fn paths(&self) -> Result<Paths, ExbuildError> {
        let examples_root = self.examples_root.clone().ok_or_else(|| {
            ExbuildError::Config(
                "examples root is not set (use --examples-root, EXBUILD_EXAMPLES_ROOT or IDF_PATH)"
                    .into(),
            )
        })?;
        let log_dir = self.log_dir.clone().ok_or_else(|| {
            ExbuildError::Config("log directory is not set (use --log-dir or LOG_PATH)".into())
        })?;
        let ci_config = self.ci_config.clone().unwrap_or_else(|| {
            examples_root
                .parent()
                .unwrap_or(&examples_root)
                .join(".gitlab-ci.yml")
        });

        Ok(Paths {
            examples_root,
            log_dir,
            ci_config,
            output_dir: self.output_dir.clone(),
        })
    }
}
