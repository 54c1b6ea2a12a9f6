//! Error types for the upload pipeline.
//!
//! Stages return [`UploadError`]; calls to the org return [`RemoteError`].
//! The CLI converts both into `anyhow` at the boundary.

use std::fmt;
use std::path::PathBuf;

use doc_uploader_core::{EntityType, ParseError};
use thiserror::Error;

/// Failure talking to the remote org.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("session expired or access token rejected at {endpoint}; log in again")]
    SessionExpired { endpoint: String },

    #[error("could not decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl RemoteError {
    /// Rate limits, server errors and network failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport { .. } => true,
            RemoteError::Status { status, .. } => *status == 429 || *status >= 500,
            RemoteError::SessionExpired { .. } | RemoteError::Decode { .. } => false,
        }
    }
}

/// Why one document could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The document's parent node was not resolved in an earlier pass.
    ParentNotResolved { parent: String },
    /// The lookup service returned an error, or nothing, for the path.
    Lookup { detail: String },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ParentNotResolved { parent } => {
                write!(f, "parent {} was not resolved", parent)
            }
            FailureKind::Lookup { detail } => f.write_str(detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionFailure {
    pub entity_type: EntityType,
    /// Human hierarchy path, e.g. `ProjA/Phase Ph1/Zone Zn1`.
    pub path: String,
    pub source_path: String,
    pub kind: FailureKind,
}

/// Every resolution failure from one run, in resolution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub failures: Vec<ResolutionFailure>,
}

impl ResolutionReport {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "The following entities could not be resolved:")?;
        for failure in &self.failures {
            write!(
                f,
                "\n- {}: {} ({})\n  Details: {}",
                failure.entity_type, failure.path, failure.source_path, failure.kind
            )?;
        }
        Ok(())
    }
}

/// Failure of a pipeline stage.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no documents found under {}", root.display())]
    EmptyCollection { root: PathBuf },

    #[error("document root does not exist: {}", root.display())]
    RootMissing { root: PathBuf },

    #[error("failed to walk {}: {message}", root.display())]
    Walk { root: PathBuf, message: String },

    #[error("{0}")]
    Resolution(ResolutionReport),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("failed to create {object} ({reference_id}, HTTP {status}): {error_code} - {message}")]
    PartialBatchFailure {
        object: String,
        reference_id: String,
        status: u16,
        error_code: String,
        message: String,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no {entity_type} id resolved for {source_path}")]
    Unresolved {
        source_path: String,
        entity_type: EntityType,
    },

    #[error("no ContentDocumentId returned for {source_path}")]
    MissingContentDocument { source_path: String },

    #[error("distribution link failed for {source_path}: {message}")]
    Distribution { source_path: String, message: String },

    #[error("no valid records to create")]
    NothingToCreate,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lists_every_failure() {
        let report = ResolutionReport {
            failures: vec![
                ResolutionFailure {
                    entity_type: EntityType::Zone,
                    path: "ProjA/Phase Ph1/Zone Zn1".into(),
                    source_path: "ProjA/Ph1/Zn1/f_tiles.jpg".into(),
                    kind: FailureKind::Lookup {
                        detail: "ERROR: Zone not found".into(),
                    },
                },
                ResolutionFailure {
                    entity_type: EntityType::Building,
                    path: "ProjA/Phase Ph1/Zone Zn1/Building B7".into(),
                    source_path: "ProjA/Ph1/Zn1/B7/bl_site.pdf".into(),
                    kind: FailureKind::ParentNotResolved {
                        parent: "ZONE_Zn1".into(),
                    },
                },
            ],
        };
        let text = UploadError::Resolution(report).to_string();
        assert_eq!(
            text,
            "The following entities could not be resolved:\n\
             - ZONE: ProjA/Phase Ph1/Zone Zn1 (ProjA/Ph1/Zn1/f_tiles.jpg)\n  \
             Details: ERROR: Zone not found\n\
             - BUILDING: ProjA/Phase Ph1/Zone Zn1/Building B7 (ProjA/Ph1/Zn1/B7/bl_site.pdf)\n  \
             Details: parent ZONE_Zn1 was not resolved"
        );
    }

    #[test]
    fn test_retryable_statuses() {
        let status = |status| RemoteError::Status {
            endpoint: "x".into(),
            status,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!RemoteError::SessionExpired {
            endpoint: "x".into()
        }
        .is_retryable());
    }
}
