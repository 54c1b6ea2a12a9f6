//! Hierarchical entity resolution.
//!
//! Levels are resolved one at a time in [`RESOLUTION_ORDER`], so a node's
//! parent is always known (or known to have failed) before the node is
//! looked up. Each level costs one bulk-lookup call carrying every distinct
//! name path of that level whose parent resolved.
//!
//! Failures are collected per document and reported together once every
//! level has been attempted. Only a transport failure of the lookup call
//! itself stops resolution early.

use std::collections::{BTreeSet, HashMap};

use doc_uploader_core::hierarchy::{node_key, resolution_parent, ParentKey, RESOLUTION_ORDER};
use doc_uploader_core::lookup::{BulkLookupRequest, EntityLookup, LookupIndex, LookupOutcome};
use doc_uploader_core::{DocumentRecord, EntityType, NamePath, ResolvedIds};

use crate::error::{FailureKind, ResolutionFailure, ResolutionReport, UploadError};
use crate::salesforce::OrgApi;

/// Counts from a successful resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    /// Distinct hierarchy nodes resolved.
    pub entities: usize,
    /// Bulk-lookup calls issued.
    pub lookups: usize,
}

/// Populate `resolved_ids` on every document, or fail with a report of
/// every document that could not be resolved.
pub async fn resolve_entities(
    org: &dyn OrgApi,
    docs: &mut [DocumentRecord],
) -> Result<ResolveSummary, UploadError> {
    let mut by_level: HashMap<EntityType, Vec<usize>> = HashMap::new();
    for (i, doc) in docs.iter().enumerate() {
        by_level.entry(doc.entity_type()).or_default().push(i);
    }

    // Ids of every resolved node plus its ancestors.
    let mut resolved: HashMap<ParentKey, ResolvedIds> = HashMap::new();
    let mut failures: Vec<ResolutionFailure> = Vec::new();
    let mut summary = ResolveSummary::default();

    for level in RESOLUTION_ORDER {
        let Some(indices) = by_level.get(&level) else {
            continue;
        };

        let mut pending: BTreeSet<NamePath> = BTreeSet::new();
        for &i in indices {
            let doc = &docs[i];
            match resolution_parent(doc.name_path()) {
                Some(parent) if !resolved.contains_key(&parent) => {
                    tracing::warn!(
                        path = doc.source_path(),
                        parent = %parent,
                        "parent not resolved, skipping"
                    );
                    failures.push(failure(
                        doc,
                        FailureKind::ParentNotResolved {
                            parent: parent.to_string(),
                        },
                    ));
                }
                _ => {
                    pending.insert(doc.name_path().clone());
                }
            }
        }

        if pending.is_empty() {
            continue;
        }

        let request = BulkLookupRequest {
            lookups: pending.iter().map(EntityLookup::for_path).collect(),
        };
        tracing::info!(level = %level, entities = request.lookups.len(), "looking up");
        let results = org.bulk_lookup(&request).await?;
        summary.lookups += 1;

        let index = LookupIndex::build(&results);
        for key in index.skipped_keys() {
            tracing::debug!(key = %key, "ignoring unparseable lookup key");
        }

        for path in &pending {
            let detail = match index.get(path) {
                Some(LookupOutcome::Found(id)) => {
                    let mut ids = match resolution_parent(path) {
                        Some(parent) => resolved.get(&parent).cloned().unwrap_or_default(),
                        None => ResolvedIds::default(),
                    };
                    ids.record_level(level, id)
                        .map_err(|e| UploadError::UnexpectedResponse(e.to_string()))?;
                    resolved.insert(node_key(path), ids);
                    summary.entities += 1;
                    continue;
                }
                Some(LookupOutcome::Failed(message)) => message.clone(),
                None => "no lookup result returned".to_string(),
            };
            tracing::warn!(path = %path.display_path(), detail = %detail, "lookup failed");
            for &i in indices {
                if docs[i].name_path() == path {
                    failures.push(failure(
                        &docs[i],
                        FailureKind::Lookup {
                            detail: detail.clone(),
                        },
                    ));
                }
            }
        }
    }

    for (level, indices) in &by_level {
        if RESOLUTION_ORDER.contains(level) {
            continue;
        }
        for &i in indices {
            failures.push(failure(
                &docs[i],
                FailureKind::Lookup {
                    detail: format!("{} documents cannot be resolved on their own", level),
                },
            ));
        }
    }

    if !failures.is_empty() {
        return Err(UploadError::Resolution(ResolutionReport { failures }));
    }

    for doc in docs.iter_mut() {
        let Some(ids) = resolved.get(&node_key(doc.name_path())) else {
            return Err(UploadError::Unresolved {
                source_path: doc.source_path().to_string(),
                entity_type: doc.entity_type(),
            });
        };
        for level in EntityType::ALL {
            if let Some(id) = ids.level(level) {
                doc.resolved_ids_mut()
                    .record_level(level, id)
                    .map_err(|e| UploadError::UnexpectedResponse(e.to_string()))?;
            }
        }
    }

    Ok(summary)
}

fn failure(doc: &DocumentRecord, kind: FailureKind) -> ResolutionFailure {
    ResolutionFailure {
        entity_type: doc.entity_type(),
        path: doc.name_path().display_path(),
        source_path: doc.source_path().to_string(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::salesforce::InMemoryOrg;
    use doc_uploader_core::parse::parse_flat;

    fn docs(names: &[&str]) -> Vec<DocumentRecord> {
        names.iter().map(|n| parse_flat(n).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_children_inherit_ancestor_ids() {
        let org = InMemoryOrg::new();
        let mut docs = docs(&[
            "pp_p_P_Ph1.pdf",
            "f_z_P_Ph1_Z1.jpg",
            "bl_b_P_Ph1_Z1_B1.pdf",
            "up_u_P_Ph1_Z1_B1_U1.pdf",
        ]);
        let unit_id = org.register_hierarchy(docs[3].name_path());

        let summary = resolve_entities(&org, &mut docs).await.unwrap();
        assert_eq!(summary.lookups, 4);
        assert_eq!(summary.entities, 4);

        let unit = &docs[3];
        assert_eq!(unit.entity_id(), Some(unit_id.as_str()));
        for level in [
            EntityType::Phase,
            EntityType::Zone,
            EntityType::Building,
            EntityType::Unit,
        ] {
            assert!(unit.resolved_ids().level(level).is_some(), "{level}");
        }
        assert_eq!(
            docs[0].resolved_ids().level(EntityType::Phase),
            unit.resolved_ids().level(EntityType::Phase)
        );
        assert_eq!(docs[0].resolved_ids().level(EntityType::Zone), None);
    }

    #[tokio::test]
    async fn test_missing_parent_excludes_only_that_document() {
        let org = InMemoryOrg::new();
        // No zone document for Z1, so the building cannot be checked
        // against a resolved parent. The design type is unaffected.
        let mut docs = docs(&[
            "pp_p_P_Ph1.pdf",
            "bl_b_P_Ph1_Z1_B1.pdf",
            "g_dt_P_Ph1_Villa.png",
        ]);
        org.register_hierarchy(docs[1].name_path());
        org.register_hierarchy(docs[2].name_path());

        let err = resolve_entities(&org, &mut docs).await.unwrap_err();
        let UploadError::Resolution(report) = err else {
            panic!("expected a resolution report");
        };
        assert_eq!(report.len(), 1);
        assert_eq!(report.failures[0].entity_type, EntityType::Building);
        assert_eq!(
            report.failures[0].kind,
            FailureKind::ParentNotResolved {
                parent: "ZONE_Z1".into()
            }
        );
        // Phase and design type were still looked up.
        let looked_up: Vec<EntityType> = org
            .lookup_requests()
            .iter()
            .map(|r| r.lookups[0].entity_type)
            .collect();
        assert_eq!(looked_up, vec![EntityType::Phase, EntityType::DesignType]);
    }

    #[tokio::test]
    async fn test_transport_failure_is_fatal() {
        let org = InMemoryOrg::new();
        org.expire_session();
        let mut docs = docs(&["pp_p_P_Ph1.pdf"]);
        let err = resolve_entities(&org, &mut docs).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::Remote(crate::error::RemoteError::SessionExpired { .. })
        ));
    }

    #[tokio::test]
    async fn test_lookup_deduplicates_paths() {
        let org = InMemoryOrg::new();
        let mut docs = docs(&["f_z_P_Ph1_Z1.jpg", "g_z_P_Ph1_Z1.png", "pp_p_P_Ph1.pdf"]);
        org.register_hierarchy(docs[0].name_path());

        resolve_entities(&org, &mut docs).await.unwrap();
        let requests = org.lookup_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].lookups.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_reported_per_document() {
        let org = InMemoryOrg::new();
        let mut docs = docs(&["pp_p_P_Ph1.pdf", "f_z_P_Ph1_Z1.jpg", "g_z_P_Ph1_Z1.png"]);
        org.register_hierarchy(docs[0].name_path());
        org.fail_lookup(docs[1].name_path(), "Zone not found");

        let err = resolve_entities(&org, &mut docs).await.unwrap_err();
        let UploadError::Resolution(report) = err else {
            panic!("expected a resolution report");
        };
        assert_eq!(report.len(), 2);
        assert!(report
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::Lookup { detail: "ERROR: Zone not found".into() }));
    }

    #[tokio::test]
    async fn test_unit_under_failed_building_is_excluded() {
        let org = InMemoryOrg::new();
        let mut docs = docs(&[
            "pp_p_P_Ph1.pdf",
            "f_z_P_Ph1_Z1.jpg",
            "bl_b_P_Ph1_Z1_B1.pdf",
            "bl_b_P_Ph1_Z1_B2.pdf",
            "up_u_P_Ph1_Z1_B1_U1.pdf",
            "up_u_P_Ph1_Z1_B1_U2.pdf",
            "up_u_P_Ph1_Z1_B2_U3.pdf",
        ]);
        org.register_hierarchy(docs[4].name_path());
        org.register_hierarchy(docs[5].name_path());
        org.fail_lookup(docs[3].name_path(), "Building not found");

        let err = resolve_entities(&org, &mut docs).await.unwrap_err();
        let UploadError::Resolution(report) = err else {
            panic!("expected a resolution report");
        };
        assert_eq!(report.len(), 2);
        assert_eq!(report.failures[0].entity_type, EntityType::Building);
        assert_eq!(report.failures[1].entity_type, EntityType::Unit);
        assert_eq!(report.failures[1].source_path, "up_u_P_Ph1_Z1_B2_U3.pdf");
        assert_eq!(
            report.failures[1].kind,
            FailureKind::ParentNotResolved {
                parent: "BUILDING_B2".into()
            }
        );

        // U1 and U2 under the resolved building were still looked up.
        let requests = org.lookup_requests();
        let units = requests.last().unwrap();
        assert_eq!(units.lookups.len(), 2);
        assert!(units.lookups.iter().all(|l| l.entity_type == EntityType::Unit));
    }
}
