//! Terminal output: a spinner per example and a colored run summary.
//!
//! Uses `indicatif` for the spinner and `console` for styling. The spinner
//! hides itself when stderr is not a terminal, which is the usual CI case.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::{VariantOutcome, VariantReport};
use crate::discovery::Item;
use crate::report::RunReport;

/// Spinner shown while one item's variants build.
pub struct ItemProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    dim: Style,
}

impl ItemProgress {
    pub fn start(item: &Item) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Building {} {}", item.id, item.name));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Clears the spinner and prints one line per variant.
    pub fn complete(&self, variants: &[VariantReport]) {
        self.pb.finish_and_clear();
        for v in variants {
            match &v.outcome {
                VariantOutcome::Succeeded => {
                    println!("  {} {}", self.green.apply_to("✓"), v.variant);
                }
                VariantOutcome::Skipped => {
                    println!(
                        "  {} {} {}",
                        self.dim.apply_to("↷"),
                        v.variant,
                        self.dim.apply_to("(cached)")
                    );
                }
                VariantOutcome::Failed { exit_code, summary } => {
                    println!(
                        "  {} {} (exit {exit_code}): {summary}",
                        self.red.apply_to("✗"),
                        v.variant
                    );
                    println!("    {}", self.dim.apply_to(format!("log: {}", v.log.display())));
                }
            }
        }
    }
}

/// Prints the dry-run listing.
pub fn print_listing(listing: &[(String, bool)]) {
    let dim = Style::new().dim();
    for (name, built) in listing {
        let state = if *built { "cached" } else { "pending" };
        println!("  {name} {}", dim.apply_to(state));
    }
    println!("{} variants", listing.len());
}

/// Prints the end-of-run summary.
pub fn print_summary(report: &RunReport) {
    let green = Style::new().green().bold();
    let red = Style::new().red().bold();
    let yellow = Style::new().yellow();

    println!();
    println!(
        "Built {}, cached {}, failed {} (of {} examples discovered)",
        report.count(|v| v.outcome == VariantOutcome::Succeeded),
        report.count(|v| v.outcome == VariantOutcome::Skipped),
        report.count(|v| v.outcome.is_failure()),
        report.items_total,
    );

    if !report.suspect_lines.is_empty() {
        println!("{}", yellow.apply_to("Found issues:"));
        for line in &report.suspect_lines {
            println!("\t{line}");
        }
    }

    if report.failed_items.is_empty() {
        println!("{}", green.apply_to("Build succeeded"));
    } else {
        println!(
            "{} {}",
            red.apply_to("Build failed for:"),
            report.failed_items.join(" ")
        );
    }
    if let Some(line) = status_line(report) {
        println!("{line}");
    }
}

/// Exit code and failure class, for runs that did not end cleanly.
fn status_line(report: &RunReport) -> Option<String> {
    if report.exit_code == 0 {
        return None;
    }
    Some(match report.failure {
        Some(kind) => format!("exit code {} ({kind})", report.exit_code),
        None => format!("exit code {}", report.exit_code),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use chrono::Utc;

    #[test]
    fn status_line_names_failure_class() {
        let mut report = RunReport::new(Some("nightly_0".into()), Utc::now());
        assert_eq!(status_line(&report), None);

        report.exit_code = 22;
        report.failure = Some(FailureKind::LogAnomaly);
        assert_eq!(status_line(&report).as_deref(), Some("exit code 22 (LogAnomaly)"));

        report.exit_code = 2;
        report.failure = Some(FailureKind::Build);
        assert_eq!(status_line(&report).as_deref(), Some("exit code 2 (Build)"));
    }
}
