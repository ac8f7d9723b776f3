//! Invocation of the external build tool.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ToolConfig;
use crate::error::ExbuildError;

/// Exit status of one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    Failed(i32),
}

/// Something that can build a materialized workspace, appending its
/// combined output to `log`.
#[allow(async_fn_in_trait)]
pub trait BuildTool {
    async fn build(&self, workspace: &Path, log: &Path) -> Result<ToolStatus, ExbuildError>;
}

/// Runs a program once per configured step, stopping at the first failure.
#[derive(Debug, Clone)]
pub struct CommandTool {
    program: String,
    steps: Vec<Vec<String>>,
    env: BTreeMap<String, String>,
}

impl CommandTool {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            program: config.program.clone(),
            steps: config.steps.clone(),
            env: config.env.clone(),
        }
    }

    fn open_log(log: &Path) -> Result<File, ExbuildError> {
        Ok(OpenOptions::new().create(true).append(true).open(log)?)
    }
}

impl BuildTool for CommandTool {
    async fn build(&self, workspace: &Path, log: &Path) -> Result<ToolStatus, ExbuildError> {
        for args in &self.steps {
            info!(program = %self.program, args = ?args, "running build step");

            let stdout = Self::open_log(log)?;
            let stderr = stdout.try_clone()?;
            let spawned = Command::new(&self.program)
                .args(args)
                .current_dir(workspace)
                .envs(&self.env)
                .stdin(Stdio::null())
                .stdout(Stdio::from(stdout))
                .stderr(Stdio::from(stderr))
                .status()
                .await;

            let status = match spawned {
                Ok(status) => status,
                Err(e) => {
                    let mut file = Self::open_log(log)?;
                    writeln!(file, "exbuild: failed to run `{}`: {e}", self.program)?;
                    return Ok(ToolStatus::Failed(1));
                }
            };

            if !status.success() {
                let code = status.code().unwrap_or(1);
                debug!(code, args = ?args, "build step failed");
                return Ok(ToolStatus::Failed(code));
            }
        }
        Ok(ToolStatus::Success)
    }
}
