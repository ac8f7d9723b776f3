//! Post-build log scanning for warnings and errors.
//!
//! [`LogScanner`] picks suspect lines out of a captured build log.
//! [`SuspectSink`] collects them across variants (and across runs sharing a
//! log directory) and deduplicates them once the run is over.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use regex::{Regex, RegexBuilder, RegexSet};

use crate::error::ExbuildError;

/// Flags lines mentioning "error" or "warning", minus known false positives.
#[derive(Debug, Clone)]
pub struct LogScanner {
    suspect: Regex,
    ignore: RegexSet,
}

impl LogScanner {
    /// Compiles the ignore patterns, grep `-v` style regular expressions.
    pub fn new<I, S>(ignore: I) -> Result<Self, ExbuildError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let suspect = RegexBuilder::new("error|warning")
            .case_insensitive(true)
            .build()?;
        let ignore = RegexSet::new(ignore)?;
        Ok(Self { suspect, ignore })
    }

    pub fn is_suspect(&self, line: &str) -> bool {
        self.suspect.is_match(line) && !self.ignore.is_match(line)
    }

    /// Suspect lines of `text`, in order of appearance.
    pub fn scan(&self, text: &str) -> Vec<String> {
        text.lines()
            .filter(|line| self.is_suspect(line))
            .map(str::to_string)
            .collect()
    }

    /// Scans a log file. Bytes that are not UTF-8 are replaced rather than
    /// failing the scan; a missing log has no suspects.
    pub fn scan_file(&self, path: &Path) -> Result<Vec<String>, ExbuildError> {
        match fs::read(path) {
            Ok(bytes) => Ok(self.scan(&String::from_utf8_lossy(&bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Append-only collection point for suspect lines.
#[derive(Debug, Clone)]
pub struct SuspectSink {
    path: PathBuf,
}

impl SuspectSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, lines: &[String]) -> Result<(), ExbuildError> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for line in lines {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    /// Sorts and deduplicates the sink in place, then returns the lines that
    /// still pass `scanner`.
    pub fn finalize(&self, scanner: &LogScanner) -> Result<Vec<String>, ExbuildError> {
        let contents = match fs::read(&self.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let unique: BTreeSet<&str> = contents.lines().filter(|l| !l.is_empty()).collect();
        let mut deduped = String::new();
        for line in &unique {
            deduped.push_str(line);
            deduped.push('\n');
        }
        fs::write(&self.path, deduped)?;

        Ok(unique
            .into_iter()
            .filter(|line| scanner.is_suspect(line))
            .map(str::to_string)
            .collect())
    }
}
