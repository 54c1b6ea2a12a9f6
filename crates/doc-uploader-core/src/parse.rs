//! Filename and path classification.
//!
//! Turns a path relative to the ingestion root into a [`DocumentRecord`].
//! Two naming conventions are supported:
//!
//! - **Nested** (preferred): directories encode the hierarchy and the file
//!   name carries a document-type code plus, for units and design types, the
//!   leaf name.
//!
//!   ```text
//!   ProjA/Ph1/pp_master.pdf                      PHASE
//!   ProjA/Ph1/Zn1/f_tiles.jpg                    ZONE
//!   ProjA/Ph1/Zn1/Bd1/bl_site.pdf                BUILDING
//!   ProjA/Ph1/Zn1/Bd1/units/up_U101.pdf          UNIT  (unit = "U101")
//!   ProjA/Ph1/design_types/g_Villa_A.png         DESIGN_TYPE (designType = "Villa_A")
//!   ```
//!
//! - **Flat** (legacy): everything lives in an `_`-delimited file name,
//!   `[docType]_[entity]_[names...]`, where the entity code fixes the number
//!   of trailing names.
//!
//!   | Code | Entity | Names |
//!   |------|--------|-------|
//!   | `p` | PHASE | project, phase |
//!   | `z` | ZONE | project, phase, zone |
//!   | `b` | BUILDING | project, phase, zone, building |
//!   | `u` | UNIT | project, phase, zone, building, unit |
//!   | `dt` | DESIGN_TYPE | project, phase, designType |

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::models::{DocumentRecord, DocumentType, EntityType, NamePath};

/// Directory marker holding unit documents below a building.
pub const UNITS_DIR: &str = "units";
/// Directory marker holding design-type documents below a phase.
pub const DESIGN_TYPES_DIR: &str = "design_types";

/// Which naming convention to apply to a relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingConvention {
    /// Files directly under the root are flat, nested files use directories.
    #[default]
    Auto,
    Path,
    Flat,
}

/// Why a file could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown document type prefix '{code}' in {path}")]
    UnknownDocumentType { path: String, code: String },

    #[error("cannot determine entity type for {path}: {detail}")]
    UnknownEntityType { path: String, detail: String },

    #[error(
        "malformed name {path}: expected {expected} name components for {entity_type}, got {actual}"
    )]
    MalformedName {
        path: String,
        entity_type: EntityType,
        expected: usize,
        actual: usize,
    },

    #[error("empty {level} name in {path}")]
    EmptyName { path: String, level: EntityType },
}

impl ParseError {
    /// The relative path that failed to parse.
    pub fn path(&self) -> &str {
        match self {
            ParseError::UnknownDocumentType { path, .. }
            | ParseError::UnknownEntityType { path, .. }
            | ParseError::MalformedName { path, .. }
            | ParseError::EmptyName { path, .. } => path,
        }
    }
}

/// Classify `source_path` (relative, `/`-separated) under `convention`.
pub fn parse_document(
    source_path: &str,
    convention: NamingConvention,
) -> Result<DocumentRecord, ParseError> {
    match convention {
        NamingConvention::Flat => parse_flat(source_path),
        NamingConvention::Path => parse_nested(source_path),
        NamingConvention::Auto if source_path.contains('/') => parse_nested(source_path),
        NamingConvention::Auto => parse_flat(source_path),
    }
}

/// Parse a legacy flat file name. Directory components, if any, are ignored.
pub fn parse_flat(source_path: &str) -> Result<DocumentRecord, ParseError> {
    let file_name = file_name_of(source_path);
    let parts: Vec<&str> = file_stem(file_name).split('_').collect();

    let document_type = document_type_for(source_path, parts[0])?;

    let code = parts.get(1).copied().unwrap_or_default();
    let entity_type = match code {
        "p" => EntityType::Phase,
        "z" => EntityType::Zone,
        "b" => EntityType::Building,
        "u" => EntityType::Unit,
        "dt" => EntityType::DesignType,
        other => {
            return Err(ParseError::UnknownEntityType {
                path: source_path.to_string(),
                detail: format!("unknown entity code '{}'", other),
            })
        }
    };

    let names = parts.get(2..).unwrap_or_default();
    let expected = flat_arity(entity_type);
    if names.len() != expected {
        return Err(ParseError::MalformedName {
            path: source_path.to_string(),
            entity_type,
            expected,
            actual: names.len(),
        });
    }

    let name_path = build_name_path(source_path, entity_type, names)?;
    Ok(DocumentRecord::new(
        source_path,
        file_name,
        document_type,
        name_path,
    ))
}

/// Parse a path whose directories encode the hierarchy.
pub fn parse_nested(source_path: &str) -> Result<DocumentRecord, ParseError> {
    let mut components: Vec<&str> = source_path.split('/').filter(|c| !c.is_empty()).collect();
    let file_name = components.pop().unwrap_or_default();
    let dirs = components;

    let parts: Vec<&str> = file_stem(file_name).split('_').collect();
    let document_type = document_type_for(source_path, parts[0])?;

    let leaf = |entity_type: EntityType| -> Result<String, ParseError> {
        if parts.len() < 2 {
            return Err(ParseError::MalformedName {
                path: source_path.to_string(),
                entity_type,
                expected: 1,
                actual: 0,
            });
        }
        Ok(parts[1..].join("_"))
    };

    // Marker directories are only valid as the last directory at their own depth.
    for (depth, dir) in dirs.iter().enumerate() {
        let allowed = match *dir {
            UNITS_DIR => depth == 4 && dirs.len() == 5,
            DESIGN_TYPES_DIR => depth == 2 && dirs.len() == 3,
            _ => true,
        };
        if !allowed {
            return Err(ParseError::UnknownEntityType {
                path: source_path.to_string(),
                detail: format!("'{}' directory at an unexpected depth", dir),
            });
        }
    }

    let (entity_type, names): (EntityType, Vec<String>) = match dirs.as_slice() {
        [project, phase] => (EntityType::Phase, owned(&[project, phase])),
        [project, phase, DESIGN_TYPES_DIR] => {
            let design_type = leaf(EntityType::DesignType)?;
            (
                EntityType::DesignType,
                vec![project.to_string(), phase.to_string(), design_type],
            )
        }
        [project, phase, zone] => (EntityType::Zone, owned(&[project, phase, zone])),
        [project, phase, zone, building] => (
            EntityType::Building,
            owned(&[project, phase, zone, building]),
        ),
        [project, phase, zone, building, UNITS_DIR] => {
            let unit = leaf(EntityType::Unit)?;
            let mut names = owned(&[project, phase, zone, building]);
            names.push(unit);
            (EntityType::Unit, names)
        }
        [] => {
            return Err(ParseError::UnknownEntityType {
                path: source_path.to_string(),
                detail: "missing project directory".to_string(),
            })
        }
        other => {
            return Err(ParseError::UnknownEntityType {
                path: source_path.to_string(),
                detail: format!("unrecognised directory layout '{}'", other.join("/")),
            })
        }
    };

    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let name_path = build_name_path(source_path, entity_type, &names)?;
    Ok(DocumentRecord::new(
        source_path,
        file_name,
        document_type,
        name_path,
    ))
}

/// Number of trailing names a flat file name carries for `entity_type`.
pub fn flat_arity(entity_type: EntityType) -> usize {
    match entity_type {
        EntityType::Project => 1,
        EntityType::Phase => 2,
        EntityType::Zone => 3,
        EntityType::Building => 4,
        EntityType::Unit => 5,
        EntityType::DesignType => 3,
    }
}

fn owned(names: &[&&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn file_name_of(source_path: &str) -> &str {
    source_path.rsplit('/').next().unwrap_or(source_path)
}

fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}

fn document_type_for(source_path: &str, code: &str) -> Result<DocumentType, ParseError> {
    DocumentType::from_code(code).ok_or_else(|| ParseError::UnknownDocumentType {
        path: source_path.to_string(),
        code: code.to_string(),
    })
}

/// Assemble a [`NamePath`] from names ordered root first. The caller has
/// already checked the arity.
fn build_name_path(
    source_path: &str,
    entity_type: EntityType,
    names: &[&str],
) -> Result<NamePath, ParseError> {
    let levels: Vec<EntityType> = level_chain(entity_type);
    for (level, name) in levels.iter().zip(names) {
        if name.trim().is_empty() {
            return Err(ParseError::EmptyName {
                path: source_path.to_string(),
                level: *level,
            });
        }
    }

    let n = |i: usize| names[i].to_string();
    Ok(match entity_type {
        EntityType::Project => NamePath::Project { project: n(0) },
        EntityType::Phase => NamePath::Phase {
            project: n(0),
            phase: n(1),
        },
        EntityType::Zone => NamePath::Zone {
            project: n(0),
            phase: n(1),
            zone: n(2),
        },
        EntityType::Building => NamePath::Building {
            project: n(0),
            phase: n(1),
            zone: n(2),
            building: n(3),
        },
        EntityType::Unit => NamePath::Unit {
            project: n(0),
            phase: n(1),
            zone: n(2),
            building: n(3),
            unit: n(4),
        },
        EntityType::DesignType => NamePath::DesignType {
            project: n(0),
            phase: n(1),
            design_type: n(2),
        },
    })
}

/// Levels from the project down to `entity_type`.
fn level_chain(entity_type: EntityType) -> Vec<EntityType> {
    let mut chain = vec![entity_type];
    let mut current = entity_type;
    while let Some(parent) = current.parent() {
        chain.push(parent);
        current = parent;
    }
    chain.reverse();
    chain
}
