//! Filesystem collection sync.
//!
//! Walks a collection's root directory, applies its glob pattern, and
//! upserts/deactivates documents through the [`Index`] trait. Grounded in
//! the teacher's `connector_fs::scan_filesystem`: `walkdir` for traversal,
//! `globset` for pattern matching, always excluding `.git`, `target`, and
//! `node_modules` regardless of configuration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use qmd_core::store::Index;

use crate::config::CollectionConfig;

/// Outcome counts from one `sync` pass over a collection.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub inserted: usize,
    pub replaced: usize,
    pub unchanged: usize,
    pub deactivated: usize,
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// The first `# Heading` line in `body`, or `None` if there isn't one in
/// the first 50 lines.
fn extract_heading(body: &str) -> Option<String> {
    for line in body.lines().take(50) {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("# ") {
            let heading = rest.trim();
            if !heading.is_empty() {
                return Some(heading.to_string());
            }
        }
    }
    None
}

fn title_for(path: &Path, body: &str) -> String {
    extract_heading(body).unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string())
    })
}

/// Sync `collection` against its configured root/pattern: every matching
/// file is read and upserted; every previously-active document whose file
/// no longer matches is deactivated.
pub async fn sync_collection(
    index: &dyn Index,
    collection: &str,
    config: &CollectionConfig,
) -> Result<SyncReport> {
    let root = &config.root;
    if !root.exists() {
        bail!("collection root does not exist: {}", root.display());
    }

    let include = build_globset(&[config.pattern.as_str()])?;
    let exclude = build_globset(&["**/.git/**", "**/target/**", "**/node_modules/**"])?;

    let mut report = SyncReport::default();
    let mut seen_paths: HashSet<String> = HashSet::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude.is_match(&rel_str) || !include.is_match(&rel_str) {
            continue;
        }

        let body = match std::fs::read_to_string(path) {
            Ok(body) => body,
            Err(_) => continue, // not valid UTF-8; not a Markdown document we can index
        };

        let modified_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(|t| {
                t.duration_since(std::time::SystemTime::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs() as i64
            })
            .unwrap_or(0);

        let title = title_for(path, &body);
        let result = index
            .upsert_document(collection, &rel_str, &title, &body, modified_at)
            .await?;

        match result.outcome {
            qmd_core::models::UpsertOutcome::Inserted => report.inserted += 1,
            qmd_core::models::UpsertOutcome::Replaced => report.replaced += 1,
            qmd_core::models::UpsertOutcome::Unchanged => report.unchanged += 1,
        }
        seen_paths.insert(rel_str);
    }

    // Deactivate any previously-active document under this collection whose
    // file was not seen on this pass (deleted, renamed, or filtered out).
    for doc in index.list_active_documents(collection).await? {
        if !seen_paths.contains(&doc.path) {
            index.deactivate_document(collection, &doc.path).await?;
            report.deactivated += 1;
        }
    }

    Ok(report)
}
