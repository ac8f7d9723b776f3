//! Cache-aware building of one item's variants.
//!
//! For each variant the [`Builder`] either skips it (success marker
//! present) or materializes a workspace, runs the build tool, records the
//! outcome and feeds the captured log to the suspect sink. A failing
//! variant never stops the others.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{BuildConfig, Paths};
use crate::discovery::Item;
use crate::error::ExbuildError;
use crate::scan::{LogScanner, SuspectSink};
use crate::tool::{BuildTool, ToolStatus};
use crate::variant::{self, BuildVariant};
use crate::workspace::Workspace;

/// What happened to one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VariantOutcome {
    /// A previous run left a success marker.
    Skipped,
    Succeeded,
    Failed { exit_code: i32, summary: String },
}

impl VariantOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, VariantOutcome::Failed { .. })
    }
}

/// Outcome of one variant plus where to look for details.
#[derive(Debug, Clone, Serialize)]
pub struct VariantReport {
    pub item_id: usize,
    pub item: String,
    pub variant: String,
    #[serde(flatten)]
    pub outcome: VariantOutcome,
    pub log: PathBuf,
    pub suspect_lines: usize,
}

/// Builds variants into isolated workspaces under the output directory.
pub struct Builder<'a, T: BuildTool> {
    config: &'a BuildConfig,
    paths: &'a Paths,
    tool: &'a T,
    scanner: LogScanner,
    sink: SuspectSink,
}

impl<'a, T: BuildTool> Builder<'a, T> {
    /// Fails if an ignore pattern is not a valid regular expression.
    pub fn new(
        config: &'a BuildConfig,
        paths: &'a Paths,
        tool: &'a T,
    ) -> Result<Self, ExbuildError> {
        Ok(Self {
            config,
            paths,
            tool,
            scanner: LogScanner::new(&config.ignore_patterns)?,
            sink: SuspectSink::new(paths.suspect_log(config)),
        })
    }

    pub fn scanner(&self) -> &LogScanner {
        &self.scanner
    }

    pub fn sink(&self) -> &SuspectSink {
        &self.sink
    }

    pub fn variants(&self, item: &Item) -> Result<Vec<BuildVariant>, ExbuildError> {
        variant::expand(item, &self.config.overlay_prefix)
    }

    pub fn workspace_for(&self, variant: &BuildVariant) -> Workspace {
        Workspace::at(self.paths.output_dir.join(&variant.name))
    }

    pub fn log_for(&self, variant: &BuildVariant) -> PathBuf {
        self.paths.log_dir.join(format!("ex_{}_log.txt", variant.name))
    }

    /// Builds every variant of `item` in suffix order.
    pub async fn build_item(&self, item: &Item) -> Vec<VariantReport> {
        let variants = match self.variants(item) {
            Ok(variants) => variants,
            Err(e) => {
                error!(item = %item.name, error = %e, "cannot expand variants");
                let name = variant::base_name(item);
                return vec![VariantReport {
                    item_id: item.id,
                    item: item.name.clone(),
                    log: self.paths.log_dir.join(format!("ex_{name}_log.txt")),
                    variant: name,
                    outcome: VariantOutcome::Failed {
                        exit_code: 1,
                        summary: e.to_string(),
                    },
                    suspect_lines: 0,
                }];
            }
        };

        debug!(
            item = %item.name,
            build_file = %item.build_file.display(),
            variants = variants.len(),
            "expanded variants"
        );

        let mut reports = Vec::with_capacity(variants.len());
        for variant in &variants {
            reports.push(self.build_variant(item, variant).await);
        }
        reports
    }

    /// Builds a single variant, or skips it if its marker exists.
    pub async fn build_variant(&self, item: &Item, variant: &BuildVariant) -> VariantReport {
        let workspace = self.workspace_for(variant);
        let log = self.log_for(variant);
        let report = |outcome: VariantOutcome, suspect_lines: usize| VariantReport {
            item_id: item.id,
            item: item.name.clone(),
            variant: variant.name.clone(),
            outcome,
            log: log.clone(),
            suspect_lines,
        };

        if workspace.is_built() {
            info!(variant = %variant.name, "already built, skipping");
            return report(VariantOutcome::Skipped, 0);
        }

        info!(variant = %variant.name, "building");
        let status = match self.run(item, variant, &workspace, &log).await {
            Ok(status) => status,
            Err(e) => {
                error!(variant = %variant.name, error = %e, "build setup failed");
                return report(
                    VariantOutcome::Failed {
                        exit_code: 1,
                        summary: e.to_string(),
                    },
                    0,
                );
            }
        };

        let suspects = match self.scanner.scan_file(&log) {
            Ok(lines) => lines,
            Err(e) => {
                warn!(log = %log.display(), error = %e, "cannot scan build log");
                Vec::new()
            }
        };
        if let Err(e) = self.sink.append(&suspects) {
            warn!(sink = %self.sink.path().display(), error = %e, "cannot record suspect lines");
        }

        let outcome = match status {
            ToolStatus::Success => VariantOutcome::Succeeded,
            ToolStatus::Failed(exit_code) => VariantOutcome::Failed {
                exit_code,
                summary: failure_summary(&suspects, exit_code),
            },
        };
        report(outcome, suspects.len())
    }

    async fn run(
        &self,
        item: &Item,
        variant: &BuildVariant,
        workspace: &Workspace,
        log: &Path,
    ) -> Result<ToolStatus, ExbuildError> {
        let workspace = Workspace::materialize(&item.dir, workspace.root())?;
        if let Some(overlay) = &variant.overlay {
            workspace.apply_overlay(
                &item.dir,
                overlay,
                &self.config.default_config,
                &self.config.overlay_prefix,
                |key| std::env::var(key).ok(),
            )?;
        }
        workspace.purge_stale(&self.config.stale_config)?;

        let status = self.tool.build(workspace.root(), log).await?;

        if status == ToolStatus::Success {
            if !workspace.install_download_config(&self.config.download_artifact)? {
                warn!(
                    variant = %variant.name,
                    artifact = %self.config.download_artifact.display(),
                    "download artifact missing"
                );
            }
            workspace.mark_success()?;
        }
        Ok(status)
    }
}

/// First error line of the log, else the bare exit status.
fn failure_summary(suspects: &[String], exit_code: i32) -> String {
    suspects
        .iter()
        .find(|line| line.to_lowercase().contains("error"))
        .cloned()
        .unwrap_or_else(|| format!("build tool exited with status {exit_code}"))
}
