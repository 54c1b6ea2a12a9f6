//! End-to-end run: collect → resolve → upload → attach.
//!
//! Stages run strictly in sequence and each requires the previous one to
//! have fully succeeded. Progress is reported to the status sink at fixed
//! milestones: 0.2 after collection, 0.4 after resolution, 0.4 to 0.8 across
//! upload chunks, and 0.8 to 1.0 across join-record chunks.

use std::collections::BTreeMap;
use std::path::PathBuf;

use doc_uploader_core::{DocumentRecord, EntityType, NamingConvention};

use crate::attachments::create_attachments;
use crate::collect::collect_documents;
use crate::config::Config;
use crate::error::UploadError;
use crate::progress::{ProgressSpan, StatusSink};
use crate::resolve::resolve_entities;
use crate::salesforce::OrgApi;
use crate::upload::{upload_content, UploadOptions};

const COLLECTED: f64 = 0.2;
const RESOLVED: f64 = 0.4;
const UPLOAD_SPAN: ProgressSpan = ProgressSpan::new(0.4, 0.8);
const ATTACH_SPAN: ProgressSpan = ProgressSpan::new(0.8, 1.0);

/// Everything a run needs besides the org and the sink.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub root: PathBuf,
    pub naming: NamingConvention,
    pub exclude_globs: Vec<String>,
    pub follow_symlinks: bool,
    pub upload: UploadOptions,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.upload.root.clone(),
            naming: config.upload.naming,
            exclude_globs: config.upload.exclude_globs.clone(),
            follow_symlinks: config.upload.follow_symlinks,
            upload: UploadOptions {
                batch: crate::batch::BatchOptions {
                    batch_size: config.upload.batch_size,
                    concurrency: config.upload.concurrency,
                },
                distribution: config.distribution.clone(),
            },
        }
    }

    pub fn with_root(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.root = root;
        }
        self
    }
}

/// Counts from a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub documents: usize,
    pub entities: usize,
    pub lookups: usize,
    pub uploaded: usize,
    pub bytes: u64,
    pub distributed: usize,
    pub attachments: usize,
}

/// Run the whole pipeline. On failure the sink receives one status line
/// with the error before it is returned.
pub async fn run_upload(
    org: &dyn OrgApi,
    options: &RunOptions,
    sink: &dyn StatusSink,
) -> Result<RunReport, UploadError> {
    let result = run_stages(org, options, sink).await;
    match &result {
        Ok(report) => {
            sink.status(&format!(
                "Done: {} documents uploaded, {} attachment records created",
                report.uploaded, report.attachments
            ));
        }
        Err(e) => {
            tracing::error!(error = %e, "upload failed");
            sink.status(&format!("Failed: {}", e));
        }
    }
    result
}

async fn run_stages(
    org: &dyn OrgApi,
    options: &RunOptions,
    sink: &dyn StatusSink,
) -> Result<RunReport, UploadError> {
    let mut report = RunReport::default();

    sink.status("Collecting documents...");
    sink.progress(0.0);
    let mut docs = collect_documents(
        &options.root,
        options.naming,
        &options.exclude_globs,
        options.follow_symlinks,
    )?;
    report.documents = docs.len();
    tracing::info!(documents = docs.len(), root = %options.root.display(), "collected");
    sink.progress(COLLECTED);

    sink.status("Resolving entities...");
    let resolved = resolve_entities(org, &mut docs).await?;
    report.entities = resolved.entities;
    report.lookups = resolved.lookups;
    sink.progress(RESOLVED);

    sink.status("Uploading content...");
    let uploaded = upload_content(
        org,
        &options.root,
        &mut docs,
        &options.upload,
        sink,
        UPLOAD_SPAN,
    )
    .await?;
    report.uploaded = uploaded.uploaded;
    report.bytes = uploaded.bytes;
    report.distributed = uploaded.distributed;

    sink.status("Creating attachment records...");
    report.attachments =
        create_attachments(org, &docs, options.upload.batch, sink, ATTACH_SPAN).await?;
    sink.progress(1.0);

    Ok(report)
}

/// Result of classifying a tree without touching the org.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub documents: Vec<DocumentRecord>,
    pub per_level: BTreeMap<EntityType, usize>,
}

/// Collect and classify only.
pub fn check(options: &RunOptions) -> Result<CheckReport, UploadError> {
    let documents = collect_documents(
        &options.root,
        options.naming,
        &options.exclude_globs,
        options.follow_symlinks,
    )?;
    let mut per_level = BTreeMap::new();
    for doc in &documents {
        *per_level.entry(doc.entity_type()).or_insert(0) += 1;
    }
    Ok(CheckReport {
        documents,
        per_level,
    })
}
