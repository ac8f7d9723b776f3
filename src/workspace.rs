//! Isolated per-variant build workspaces.
//!
//! A [`Workspace`] is a copy of an item's source tree under the output
//! directory. Builds never run in the source tree, so variants and job
//! instances cannot interfere. The tree is never wiped: logs and
//! artifacts stay for CI inspection, and the success marker inside it
//! makes later runs skip the variant.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::ExbuildError;

const MARKER: &str = "build/ci_build_success";
const DOWNLOAD_CONFIG: &str = "build/download.config";

/// Handle to a variant's build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Handle to an existing (or not yet created) workspace at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Copies `source` into `dest` and returns the handle. Files already in
    /// `dest` are overwritten; files only in `dest` are left alone.
    pub fn materialize(source: &Path, dest: &Path) -> Result<Self, ExbuildError> {
        for entry in WalkDir::new(source).follow_links(true) {
            let entry = entry?;
            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let target = dest.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        debug!(from = %source.display(), to = %dest.display(), "materialized workspace");
        Ok(Self::at(dest))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn marker_path(&self) -> PathBuf {
        self.root.join(MARKER)
    }

    /// Whether a previous run completed this variant.
    pub fn is_built(&self) -> bool {
        self.marker_path().is_file()
    }

    pub fn mark_success(&self) -> Result<(), ExbuildError> {
        let marker = self.marker_path();
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(marker, "")?;
        Ok(())
    }

    /// Rewrites the workspace's `default_config` as the source tree's copy
    /// followed by `overlay` (with environment references expanded), then
    /// deletes every file starting with `overlay_prefix` so the build tool
    /// sees exactly one overlay. Rebuilding a variant never stacks overlays.
    pub fn apply_overlay(
        &self,
        source: &Path,
        overlay: &Path,
        default_config: &str,
        overlay_prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ExbuildError> {
        let text = expand_env(&fs::read_to_string(overlay)?, lookup);

        let mut merged = match fs::read(source.join(default_config)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if !merged.is_empty() && !merged.ends_with(b"\n") {
            merged.push(b'\n');
        }
        merged.extend_from_slice(text.as_bytes());
        fs::write(self.root.join(default_config), merged)?;

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let is_overlay = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(overlay_prefix));
            if is_overlay && entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Removes configuration persisted by an earlier build. Returns whether
    /// a file was removed.
    pub fn purge_stale(&self, stale_config: &str) -> Result<bool, ExbuildError> {
        let path = self.root.join(stale_config);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale configuration");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Copies `artifact` (relative to the workspace) to
    /// `build/download.config`. Returns whether the artifact existed.
    pub fn install_download_config(&self, artifact: &Path) -> Result<bool, ExbuildError> {
        let source = self.root.join(artifact);
        if !source.is_file() {
            return Ok(false);
        }
        let dest = self.root.join(DOWNLOAD_CONFIG);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest)?;
        Ok(true)
    }
}

/// Expands `$NAME` and `${NAME}` references. Unknown variables expand to
/// the empty string; a `$` not followed by a name is kept.
pub fn expand_env(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let is_name = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(braced) = after.strip_prefix('{') {
            if let Some(close) = braced.find('}') {
                let name = &braced[..close];
                if !name.is_empty() && name.chars().all(is_name) {
                    out.push_str(&lookup(name).unwrap_or_default());
                    rest = &braced[close + 1..];
                    continue;
                }
            }
        } else {
            let len = after
                .char_indices()
                .find(|&(i, c)| !(is_name(c) && !(i == 0 && c.is_ascii_digit())))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            if len > 0 {
                out.push_str(&lookup(&after[..len]).unwrap_or_default());
                rest = &after[len..];
                continue;
            }
        }

        out.push('$');
        rest = after;
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(name: &str) -> Option<String> {
        match name {
            "IDF_PATH" => Some("/opt/idf".into()),
            "WIFI_SSID" => Some("ci-net".into()),
            _ => None,
        }
    }

    fn source_tree(tmp: &TempDir) -> PathBuf {
        let src = tmp.path().join("src/blink");
        fs::create_dir_all(src.join("main")).unwrap();
        fs::write(src.join("Makefile"), "PROJECT_NAME := blink\n").unwrap();
        fs::write(src.join("main/blink.c"), "int main(void) {}\n").unwrap();
        fs::write(src.join("sdkconfig.defaults"), "CONFIG_A=y").unwrap();
        fs::write(src.join("sdkconfig.ci.fast"), "CONFIG_FAST=${WIFI_SSID}\n").unwrap();
        fs::write(src.join("sdkconfig.ci.slow"), "CONFIG_SLOW=y\n").unwrap();
        src
    }

    #[test]
    fn materialize_copies_tree() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(&tmp);
        let dest = tmp.path().join("example_builds/0_blink");

        let ws = Workspace::materialize(&src, &dest).unwrap();
        assert_eq!(ws.root(), dest.as_path());
        assert_eq!(
            fs::read_to_string(dest.join("main/blink.c")).unwrap(),
            "int main(void) {}\n"
        );
        // Source is untouched.
        assert!(src.join("sdkconfig.ci.fast").exists());
    }

    #[test]
    fn overlay_is_appended_and_other_overlays_removed() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(&tmp);
        let dest = tmp.path().join("out");
        let ws = Workspace::materialize(&src, &dest).unwrap();

        ws.apply_overlay(
            &src,
            &src.join("sdkconfig.ci.fast"),
            "sdkconfig.defaults",
            "sdkconfig.ci.",
            vars,
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("sdkconfig.defaults")).unwrap(),
            "CONFIG_A=y\nCONFIG_FAST=ci-net\n"
        );
        assert!(!dest.join("sdkconfig.ci.fast").exists());
        assert!(!dest.join("sdkconfig.ci.slow").exists());
        assert!(src.join("sdkconfig.ci.slow").exists());
    }

    #[test]
    fn reapplying_overlay_starts_from_source_defaults() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(&tmp);
        fs::remove_file(src.join("sdkconfig.defaults")).unwrap();
        let dest = tmp.path().join("out");
        let ws = Workspace::materialize(&src, &dest).unwrap();
        let overlay = src.join("sdkconfig.ci.slow");

        ws.apply_overlay(&src, &overlay, "sdkconfig.defaults", "sdkconfig.ci.", vars)
            .unwrap();
        fs::write(&overlay, "CONFIG_SLOW=n\n").unwrap();
        let ws = Workspace::materialize(&src, &dest).unwrap();
        ws.apply_overlay(&src, &overlay, "sdkconfig.defaults", "sdkconfig.ci.", vars)
            .unwrap();

        assert_eq!(
            fs::read_to_string(dest.join("sdkconfig.defaults")).unwrap(),
            "CONFIG_SLOW=n\n"
        );
    }

    #[test]
    fn overlay_creates_missing_default_config() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::at(tmp.path());
        let overlay = tmp.path().join("sdkconfig.ci.only");
        fs::write(&overlay, "CONFIG_ONLY=y\n").unwrap();

        ws.apply_overlay(
            tmp.path(),
            &overlay,
            "sdkconfig.defaults",
            "sdkconfig.ci.",
            |_| None,
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(tmp.path().join("sdkconfig.defaults")).unwrap(),
            "CONFIG_ONLY=y\n"
        );
    }

    #[test]
    fn marker_round_trip() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::at(tmp.path().join("v"));
        assert!(!ws.is_built());
        ws.mark_success().unwrap();
        assert!(ws.is_built());
        assert!(tmp.path().join("v/build/ci_build_success").is_file());
    }

    #[test]
    fn purge_stale_removes_only_the_persisted_config() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::at(tmp.path());
        fs::write(tmp.path().join("sdkconfig"), "OLD").unwrap();
        fs::write(tmp.path().join("sdkconfig.defaults"), "KEEP").unwrap();

        assert!(ws.purge_stale("sdkconfig").unwrap());
        assert!(!ws.purge_stale("sdkconfig").unwrap());
        assert!(tmp.path().join("sdkconfig.defaults").exists());
    }

    #[test]
    fn download_config_copied_when_artifact_exists() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::at(tmp.path());
        let artifact = Path::new("build/flash_project_args");
        assert!(!ws.install_download_config(artifact).unwrap());

        fs::create_dir_all(tmp.path().join("build")).unwrap();
        fs::write(tmp.path().join(artifact), "--flash_mode dio").unwrap();
        assert!(ws.install_download_config(artifact).unwrap());
        assert_eq!(
            fs::read_to_string(tmp.path().join("build/download.config")).unwrap(),
            "--flash_mode dio"
        );
    }

    #[test]
    fn expand_env_forms() {
        assert_eq!(expand_env("$IDF_PATH/tools", vars), "/opt/idf/tools");
        assert_eq!(expand_env("ssid=${WIFI_SSID}!", vars), "ssid=ci-net!");
        assert_eq!(expand_env("x=$UNSET.", vars), "x=.");
        assert_eq!(expand_env("cost: 5$ or $", vars), "cost: 5$ or $");
        assert_eq!(expand_env("${unterminated", vars), "${unterminated");
        assert_eq!(expand_env("$1abc", vars), "$1abc");
    }
}
