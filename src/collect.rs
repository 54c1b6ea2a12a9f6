//! Document collection from a local directory tree.
//!
//! Walks the root recursively, skips hidden files and directories, drops
//! paths matching `exclude_globs`, and classifies every remaining file.
//! Symlinks to files are collected under their link path; symlinked
//! directories are only descended with `follow_symlinks`. The first file
//! that cannot be classified aborts the collection.

use std::path::Path;

use doc_uploader_core::{parse_document, DocumentRecord, NamingConvention};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

use crate::error::UploadError;

/// Collect and classify every document under `root`, sorted by relative
/// path.
pub fn collect_documents(
    root: &Path,
    convention: NamingConvention,
    exclude_globs: &[String],
    follow_symlinks: bool,
) -> Result<Vec<DocumentRecord>, UploadError> {
    if !root.is_dir() {
        return Err(UploadError::RootMissing {
            root: root.to_path_buf(),
        });
    }

    let exclude_set = build_globset(root, exclude_globs)?;

    let mut documents = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry.map_err(|e| UploadError::Walk {
            root: root.to_path_buf(),
            message: e.to_string(),
        })?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if file_type.is_symlink() {
            if !points_to_file(entry.path()) {
                tracing::warn!(
                    path = %entry.path().display(),
                    "skipping symlink that does not resolve to a file"
                );
                continue;
            }
        } else if !file_type.is_file() {
            tracing::debug!(path = %entry.path().display(), "skipping special file");
            continue;
        }

        let relative = relative_path(root, entry.path());
        if exclude_set.is_match(&relative) {
            tracing::debug!(path = %relative, "excluded");
            continue;
        }

        let doc = parse_document(&relative, convention)?;
        tracing::debug!(
            path = %relative,
            entity_type = %doc.entity_type(),
            document_type = %doc.document_type(),
            "classified"
        );
        documents.push(doc);
    }

    if documents.is_empty() {
        return Err(UploadError::EmptyCollection {
            root: root.to_path_buf(),
        });
    }

    documents.sort_by(|a, b| a.source_path().cmp(b.source_path()));
    Ok(documents)
}

fn points_to_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// `/`-separated path of `path` below `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(root: &Path, patterns: &[String]) -> Result<GlobSet, UploadError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| UploadError::Walk {
            root: root.to_path_buf(),
            message: format!("invalid exclude glob '{}': {}", pattern, e),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| UploadError::Walk {
        root: root.to_path_buf(),
        message: e.to_string(),
    })
}
