use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::builder::VariantReport;
use crate::error::{ExbuildError, FailureKind};

/// Structured record of one run, written next to the build logs.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub job_name: Option<String>,
    pub range_start: usize,
    pub range_end: Option<usize>,
    pub items_total: usize,
    pub variants: Vec<VariantReport>,
    pub failed_items: Vec<String>,
    pub suspect_lines: Vec<String>,
    pub failure: Option<FailureKind>,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl RunReport {
    pub fn new(job_name: Option<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            job_name,
            range_start: 0,
            range_end: None,
            items_total: 0,
            variants: Vec::new(),
            failed_items: Vec::new(),
            suspect_lines: Vec::new(),
            failure: None,
            exit_code: 0,
            started_at,
            completed_at: started_at,
            duration_ms: 0,
        }
    }

    /// Stamps the completion time.
    pub fn finish(&mut self) {
        self.completed_at = Utc::now();
        self.duration_ms = (self.completed_at - self.started_at).num_milliseconds();
    }

    pub fn count(&self, pred: impl Fn(&VariantReport) -> bool) -> usize {
        self.variants.iter().filter(|v| pred(v)).count()
    }

    pub fn write(&self, path: &Path) -> Result<(), ExbuildError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::VariantOutcome;
    use std::path::PathBuf;

    fn variant(name: &str, outcome: VariantOutcome) -> VariantReport {
        VariantReport {
            item_id: 0,
            item: "blink".into(),
            variant: name.into(),
            outcome,
            log: PathBuf::from(format!("/logs/ex_{name}_log.txt")),
            suspect_lines: 0,
        }
    }

    #[test]
    fn new_report_defaults() {
        let started = Utc::now();
        let report = RunReport::new(Some("nightly_1".into()), started);
        assert_eq!(report.exit_code, 0);
        assert!(report.failure.is_none());
        assert_eq!(report.started_at, started);
        assert_eq!(Uuid::parse_str(&report.run_id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn finish_records_duration() {
        let started = Utc::now() - chrono::Duration::seconds(2);
        let mut report = RunReport::new(None, started);
        report.finish();
        assert!(report.duration_ms >= 2000);
        assert!(report.completed_at > report.started_at);
    }

    #[test]
    fn serializes_outcomes_inline() {
        let mut report = RunReport::new(None, Utc::now());
        report.variants.push(variant("0_blink", VariantOutcome::Skipped));
        report.variants.push(variant(
            "1_ota",
            VariantOutcome::Failed {
                exit_code: 2,
                summary: "boom".into(),
            },
        ));
        report.failure = Some(FailureKind::Build);

        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["variants"][0]["outcome"], "skipped");
        assert_eq!(json["variants"][1]["outcome"], "failed");
        assert_eq!(json["variants"][1]["exit_code"], 2);
        assert_eq!(json["failure"], "Build");
        assert_eq!(json["range_end"], serde_json::Value::Null);
        assert_eq!(report.count(|v| v.outcome.is_failure()), 1);
    }

    #[test]
    fn write_creates_json_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("build_report.json");
        RunReport::new(Some("ci_0".into()), Utc::now())
            .write(&path)
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains(r#""job_name": "ci_0""#));
    }
}
