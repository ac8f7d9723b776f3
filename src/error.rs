use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExbuildError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid job name `{0}`: expected <label>_<index>")]
    InvalidJobName(String),

    #[error("No jobs matching `{label}_<n>:` found in the CI configuration")]
    NoJobsFound { label: String },

    #[error("Item discovery failed: found {found} items, expected at least {minimum}")]
    ItemDiscoveryFailed { found: usize, minimum: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid log pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ExbuildError {
    /// Whether the error belongs to the configuration class (bad
    /// environment or job name) rather than discovery or I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExbuildError::Config(_) | ExbuildError::InvalidJobName(_) | ExbuildError::NoJobsFound { .. }
        )
    }
}

/// Classifies why a run ended with a nonzero status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// The external build tool exited nonzero for at least one variant.
    Build,
    /// Suspicious lines were found in the captured logs.
    LogAnomaly,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Build => write!(f, "Build"),
            FailureKind::LogAnomaly => write!(f, "LogAnomaly"),
        }
    }
}
