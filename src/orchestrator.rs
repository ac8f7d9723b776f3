use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::builder::{Builder, VariantOutcome, VariantReport};
use crate::config::{BuildConfig, Paths};
use crate::discovery::{self, Item};
use crate::error::FailureKind;
use crate::partition::{self, JobSpec, PartitionRange};
use crate::report::RunReport;
use crate::tool::BuildTool;
use crate::ui::ItemProgress;

/// Items in scope for this job instance.
#[derive(Debug, Clone)]
pub struct Plan {
    pub items: Vec<Item>,
    pub range: PartitionRange,
}

impl Plan {
    pub fn selected(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| self.range.contains(item.id))
    }
}

/// Accumulated results of a run: failed item names and the exit code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    pub failed_items: Vec<String>,
    pub result_code: i32,
}

impl RunState {
    /// Folds one variant outcome in. The first nonzero code sticks.
    pub fn record(&mut self, report: &VariantReport) {
        if let VariantOutcome::Failed { exit_code, .. } = report.outcome {
            if !self.failed_items.contains(&report.item) {
                self.failed_items.push(report.item.clone());
            }
            if self.result_code == 0 {
                self.result_code = if exit_code == 0 { 1 } else { exit_code };
            }
        }
    }

    /// Applies the log-anomaly sentinel unless a build failure already set
    /// a code.
    pub fn flag_issues(&mut self, issues_exit_code: i32) {
        if self.result_code == 0 {
            self.result_code = issues_exit_code;
        }
    }
}

/// Discovers, partitions and builds the examples of one job instance.
pub struct Orchestrator<T: BuildTool> {
    pub config: BuildConfig,
    pub paths: Paths,
    pub tool: T,
}

impl<T: BuildTool> Orchestrator<T> {
    pub fn new(config: BuildConfig, paths: Paths, tool: T) -> Self {
        Self {
            config,
            paths,
            tool,
        }
    }

    /// Discovers items and computes the range `job_name` owns. Fails before
    /// any build on a bad job name, missing job declarations or an
    /// implausibly small item list.
    pub fn plan(&self, job_name: Option<&str>) -> Result<Plan> {
        let job = job_name.map(JobSpec::parse).transpose()?;

        let items = discovery::discover_items(
            &self.paths.examples_root,
            &self.config.build_file,
            &self.config.excluded_dirs,
        )
        .with_context(|| {
            format!(
                "failed to discover examples under {}",
                self.paths.examples_root.display()
            )
        })?;
        info!(count = items.len(), "discovered examples");

        let range = match &job {
            Some(job) => {
                let total_jobs = discovery::count_jobs_in_file(&self.paths.ci_config, &job.label)?;
                let range =
                    partition::partition(job, total_jobs, items.len(), self.config.min_items)?;
                info!(job = %job, total_jobs, range = %range, "partitioned");
                if range.clamp(items.len()).is_empty() {
                    warn!(
                        job = %job,
                        total_jobs,
                        items = items.len(),
                        "job index is past the last example, nothing to build"
                    );
                }
                range
            }
            None => {
                partition::check_item_count(items.len(), self.config.min_items)?;
                PartitionRange::all()
            }
        };

        Ok(Plan { items, range })
    }

    /// Lists every in-range variant with whether it is already built.
    pub fn dry_run(&self, job_name: Option<&str>) -> Result<Vec<(String, bool)>> {
        let plan = self.plan(job_name)?;
        let builder = Builder::new(&self.config, &self.paths, &self.tool)?;

        let mut listing = Vec::new();
        for item in plan.selected() {
            for variant in builder.variants(item)? {
                let built = builder.workspace_for(&variant).is_built();
                listing.push((variant.name, built));
            }
        }
        Ok(listing)
    }

    /// Runs the job: plans, builds every selected item in order, then
    /// finalizes the suspect log and writes the run report.
    pub async fn run(&self, job_name: Option<&str>) -> Result<RunReport> {
        let started_at = Utc::now();
        let plan = self.plan(job_name)?;

        std::fs::create_dir_all(&self.paths.output_dir).with_context(|| {
            format!(
                "cannot create output directory {}",
                self.paths.output_dir.display()
            )
        })?;

        let builder = Builder::new(&self.config, &self.paths, &self.tool)?;
        let mut state = RunState::default();
        let mut report = RunReport::new(job_name.map(str::to_string), started_at);
        report.range_start = plan.range.start;
        report.range_end = plan.range.bounded_end();
        report.items_total = plan.items.len();

        for item in plan.selected() {
            let progress = ItemProgress::start(item);
            let variants = builder.build_item(item).await;
            progress.complete(&variants);
            for variant in variants {
                state.record(&variant);
                report.variants.push(variant);
            }
        }

        let suspects = builder
            .sink()
            .finalize(builder.scanner())
            .context("failed to finalize suspect log")?;
        if !suspects.is_empty() {
            state.flag_issues(self.config.issues_exit_code);
        }

        report.failure = if !state.failed_items.is_empty() {
            Some(FailureKind::Build)
        } else if !suspects.is_empty() {
            Some(FailureKind::LogAnomaly)
        } else {
            None
        };
        report.failed_items = state.failed_items;
        report.exit_code = state.result_code;
        report.suspect_lines = suspects;
        report.finish();

        let path = self.paths.report();
        if let Err(e) = report.write(&path) {
            warn!(path = %path.display(), error = %e, "cannot write run report");
        }

        Ok(report)
    }
}
