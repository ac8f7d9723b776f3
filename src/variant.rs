//! Expansion of an item into its build variants.

use std::path::PathBuf;

use serde::Serialize;

use crate::discovery::Item;
use crate::error::ExbuildError;

/// One build configuration of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildVariant {
    pub item_id: usize,
    /// Unique name, also the workspace directory and log file stem.
    pub name: String,
    /// Overlay merged into the default configuration, if any.
    pub overlay: Option<PathBuf>,
}

/// Name shared by every variant of `item`.
pub fn base_name(item: &Item) -> String {
    format!("{}_{}", item.id, item.name)
}

/// Lists overlay files directly inside the item directory as
/// `(suffix, path)` pairs sorted by suffix.
pub fn find_overlays(item: &Item, prefix: &str) -> Result<Vec<(String, PathBuf)>, ExbuildError> {
    let mut overlays = Vec::new();
    for entry in std::fs::read_dir(&item.dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(suffix) = file_name.to_str().and_then(|n| n.strip_prefix(prefix)) else {
            continue;
        };
        if suffix.is_empty() {
            continue;
        }
        overlays.push((suffix.to_string(), entry.path()));
    }
    overlays.sort();
    Ok(overlays)
}

/// Expands `item` into one variant per overlay, or a single default
/// variant when there are none.
pub fn expand(item: &Item, overlay_prefix: &str) -> Result<Vec<BuildVariant>, ExbuildError> {
    let base = base_name(item);
    let overlays = find_overlays(item, overlay_prefix)?;

    if overlays.is_empty() {
        return Ok(vec![BuildVariant {
            item_id: item.id,
            name: base,
            overlay: None,
        }]);
    }

    Ok(overlays
        .into_iter()
        .map(|(suffix, path)| BuildVariant {
            item_id: item.id,
            name: format!("{base}_{suffix}"),
            overlay: Some(path),
        })
        .collect())
}
