//! Hierarchy rules shared by the resolver and the join-record builder.

use std::fmt;

use crate::models::{DocumentRecord, EntityType, NamePath};

/// Levels in the order they are resolved. Each level's parent appears
/// earlier in the list. `PROJECT` is never looked up on its own.
pub const RESOLUTION_ORDER: [EntityType; 5] = [
    EntityType::Phase,
    EntityType::Zone,
    EntityType::Building,
    EntityType::Unit,
    EntityType::DesignType,
];

/// Identity of the parent node a document must wait for before it can be
/// looked up.
///
/// Renders as `{LEVEL}_{name}` (e.g. `ZONE_mdn-east`); equality compares the
/// parent's full name path, so equally named zones in different phases stay
/// distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParentKey(NamePath);

impl ParentKey {
    pub fn entity_type(&self) -> EntityType {
        self.0.entity_type()
    }

    pub fn name_path(&self) -> &NamePath {
        &self.0
    }
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.0.entity_type(), self.0.leaf())
    }
}

/// The parent that must already be resolved before `path` can be looked up.
/// `None` for phases, which are the roots of resolution.
pub fn resolution_parent(path: &NamePath) -> Option<ParentKey> {
    match path.entity_type() {
        EntityType::Project | EntityType::Phase => None,
        _ => path.parent().map(ParentKey),
    }
}

/// Key under which a resolved node is remembered for its children.
pub fn node_key(path: &NamePath) -> ParentKey {
    ParentKey(path.clone())
}

/// Display string stored on the join record.
pub fn display_value(doc: &DocumentRecord) -> String {
    let label = doc.document_type().label();
    match doc.name_path() {
        NamePath::Unit {
            project,
            phase,
            building,
            unit,
            ..
        } => format!(
            "{} for Unit {} of Building {} in Phase {} of {}",
            label, unit, building, phase, project
        ),
        NamePath::Building {
            project,
            phase,
            zone,
            building,
        } => format!(
            "{} for Building {} in Zone {} of Phase {} - {}",
            label, building, zone, phase, project
        ),
        NamePath::Zone {
            project,
            phase,
            zone,
        } => format!(
            "{} for Zone {} in Phase {} of {}",
            label, zone, phase, project
        ),
        NamePath::Phase { project, phase } => {
            format!("{} for Phase {} of {}", label, phase, project)
        }
        NamePath::DesignType {
            project,
            phase,
            design_type,
        } => format!(
            "{} for Design Type {} in Phase {} of {}",
            label, design_type, phase, project
        ),
        NamePath::Project { .. } => std::path::Path::new(doc.file_name())
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| doc.file_name().to_string()),
    }
}
