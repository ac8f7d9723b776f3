//! Splits the sorted item list across parallel CI job instances.
//!
//! A job named `<label>_<index>` owns the half-open slice
//! `[index * per_job, (index + 1) * per_job)` where
//! `per_job = ceil(total_items / total_jobs)`. The last slice may run past
//! the end of the list; indices beyond it are simply "no item".

use std::fmt;
use std::ops::Range;

use crate::error::ExbuildError;

/// A job identifier parsed from `<label>_<index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub label: String,
    pub index: usize,
}

impl JobSpec {
    /// Parses a job name, splitting on the last underscore so labels may
    /// contain underscores themselves (`build_examples_make_3`).
    pub fn parse(name: &str) -> Result<Self, ExbuildError> {
        let invalid = || ExbuildError::InvalidJobName(name.to_string());

        let (label, index) = name.rsplit_once('_').ok_or_else(invalid)?;
        if label.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let index = index.parse::<usize>().map_err(|_| invalid())?;

        Ok(Self {
            label: label.to_string(),
            index,
        })
    }
}

impl fmt::Display for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.label, self.index)
    }
}

/// Half-open range of item indices owned by one job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRange {
    pub start: usize,
    pub end: usize,
}

impl PartitionRange {
    /// The whole-repository range used when no job name is given.
    pub fn all() -> Self {
        Self {
            start: 0,
            end: usize::MAX,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.end == usize::MAX
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.end
    }

    /// The indices that actually exist in a list of `total` items.
    pub fn clamp(&self, total: usize) -> Range<usize> {
        self.start.min(total)..self.end.min(total)
    }

    /// Upper bound as reported to humans; `None` when unbounded.
    pub fn bounded_end(&self) -> Option<usize> {
        (!self.is_unbounded()).then_some(self.end)
    }
}

impl fmt::Display for PartitionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bounded_end() {
            Some(end) => write!(f, "[{}, {end})", self.start),
            None => write!(f, "[{}, ∞)", self.start),
        }
    }
}

/// Rejects item counts below `min_items`, a sign of broken discovery.
pub fn check_item_count(total_items: usize, min_items: usize) -> Result<(), ExbuildError> {
    if total_items < min_items {
        return Err(ExbuildError::ItemDiscoveryFailed {
            found: total_items,
            minimum: min_items,
        });
    }
    Ok(())
}

/// Computes the range owned by `job` among `total_jobs` instances sharing
/// its label.
pub fn partition(
    job: &JobSpec,
    total_jobs: usize,
    total_items: usize,
    min_items: usize,
) -> Result<PartitionRange, ExbuildError> {
    if total_jobs == 0 {
        return Err(ExbuildError::NoJobsFound {
            label: job.label.clone(),
        });
    }
    check_item_count(total_items, min_items)?;

    let per_job = total_items.div_ceil(total_jobs);
    Ok(PartitionRange {
        start: job.index.saturating_mul(per_job),
        end: job.index.saturating_add(1).saturating_mul(per_job),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str) -> JobSpec {
        JobSpec::parse(name).unwrap()
    }

    #[test]
    fn parse_splits_on_last_underscore() {
        let spec = job("build_examples_make_3");
        assert_eq!(spec.label, "build_examples_make");
        assert_eq!(spec.index, 3);
        assert_eq!(spec.to_string(), "build_examples_make_3");
    }

    #[test]
    fn parse_rejects_malformed_names() {
        for name in ["nightly", "_3", "nightly_", "nightly_x", "nightly_+3", "nightly_-1", ""] {
            let err = JobSpec::parse(name).unwrap_err();
            assert!(
                matches!(err, ExbuildError::InvalidJobName(ref n) if n == name),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn fifty_seven_items_over_five_jobs() {
        let ranges: Vec<_> = (0..5)
            .map(|i| partition(&job(&format!("nightly_{i}")), 5, 57, 50).unwrap())
            .collect();
        let bounds: Vec<_> = ranges.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(bounds, vec![(0, 12), (12, 24), (24, 36), (36, 48), (48, 60)]);
        assert_eq!(ranges[4].clamp(57), 48..57);
    }

    #[test]
    fn ranges_cover_every_item_exactly_once() {
        for total_items in [50, 51, 57, 99, 100, 101, 313] {
            for total_jobs in 1..=12 {
                let mut owner = vec![0u32; total_items];
                let mut expected_start = 0;
                for i in 0..total_jobs {
                    let range =
                        partition(&job(&format!("ci_{i}")), total_jobs, total_items, 50).unwrap();
                    assert_eq!(range.start, expected_start, "gap before job {i}");
                    assert_eq!(range.end - range.start, total_items.div_ceil(total_jobs));
                    expected_start = range.end;
                    for idx in range.clamp(total_items) {
                        owner[idx] += 1;
                    }
                }
                assert!(
                    owner.iter().all(|&n| n == 1),
                    "{total_items} items over {total_jobs} jobs"
                );
            }
        }
    }

    #[test]
    fn out_of_range_index_yields_empty_slice() {
        // Only nightly_0 and nightly_1 are declared.
        let range = partition(&job("nightly_3"), 2, 60, 50).unwrap();
        assert_eq!(range.start, 90);
        assert!(range.clamp(60).is_empty());
    }

    #[test]
    fn zero_jobs_is_an_error() {
        let err = partition(&job("nightly_0"), 0, 60, 50).unwrap_err();
        assert!(matches!(err, ExbuildError::NoJobsFound { ref label } if label == "nightly"));
    }

    #[test]
    fn too_few_items_is_a_discovery_failure() {
        let err = partition(&job("nightly_0"), 2, 49, 50).unwrap_err();
        assert!(matches!(
            err,
            ExbuildError::ItemDiscoveryFailed {
                found: 49,
                minimum: 50
            }
        ));
    }

    #[test]
    fn huge_index_does_not_overflow() {
        let range = partition(&job(&format!("nightly_{}", usize::MAX)), 2, 60, 50).unwrap();
        assert!(range.clamp(60).is_empty());
    }

    #[test]
    fn whole_repository_range_contains_everything() {
        let range = PartitionRange::all();
        assert!(range.is_unbounded());
        assert!(range.contains(0));
        assert!(range.contains(10_000));
        assert_eq!(range.clamp(57), 0..57);
        assert_eq!(range.bounded_end(), None);
        assert_eq!(range.to_string(), "[0, ∞)");
    }
}
