//! Post-run export of the report feed.

use crate::model::{RunParameters, StatusEntry};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk shape of an exported feed.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedExport {
    pub exported_at_utc: String,
    pub parameters: RunParameters,
    /// Newest first, as displayed.
    pub entries: Vec<StatusEntry>,
}

impl FeedExport {
    pub fn new(parameters: &RunParameters, entries: Vec<StatusEntry>) -> Self {
        Self {
            exported_at_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            parameters: parameters.clone(),
            entries,
        }
    }
}

pub fn export_json(path: &Path, export: &FeedExport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export directory {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(export).context("serialize report feed")?;
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Export if a path was configured, returning a message for the user.
pub fn export_if_requested(
    path: Option<&Path>,
    parameters: &RunParameters,
    entries: Vec<StatusEntry>,
) -> Option<String> {
    let path = path?;
    let export = FeedExport::new(parameters, entries);
    Some(match export_json(path, &export) {
        Ok(()) => format!("Exported JSON: {}", path.display()),
        Err(e) => format!("Export JSON failed: {e:#}"),
    })
}
