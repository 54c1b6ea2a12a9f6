//! Core data models used throughout doc-uploader.
//!
//! A [`DocumentRecord`] is created once per discovered file, enriched with
//! remote identifiers as the pipeline runs, and discarded at the end of the
//! run. The hierarchy position of a document is carried by [`NamePath`], a
//! closed enum with one variant per [`EntityType`]: the entity type is derived
//! from the name path, so the two can never disagree.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A level in the project hierarchy.
///
/// `PHASE < ZONE < BUILDING < UNIT` and `PHASE < DESIGN_TYPE`; units and
/// design types are independent branches under a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Project,
    Phase,
    Zone,
    Building,
    Unit,
    DesignType,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Project,
        EntityType::Phase,
        EntityType::Zone,
        EntityType::Building,
        EntityType::Unit,
        EntityType::DesignType,
    ];

    /// Wire tag, e.g. `"DESIGN_TYPE"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Project => "PROJECT",
            EntityType::Phase => "PHASE",
            EntityType::Zone => "ZONE",
            EntityType::Building => "BUILDING",
            EntityType::Unit => "UNIT",
            EntityType::DesignType => "DESIGN_TYPE",
        }
    }

    /// Key of this level inside a lookup `namePath` object.
    pub fn name_key(&self) -> &'static str {
        match self {
            EntityType::Project => "project",
            EntityType::Phase => "phase",
            EntityType::Zone => "zone",
            EntityType::Building => "building",
            EntityType::Unit => "unit",
            EntityType::DesignType => "designType",
        }
    }

    /// Key of this level inside [`ResolvedIds::as_map`] (lowercased tag).
    pub fn id_key(&self) -> &'static str {
        match self {
            EntityType::Project => "project",
            EntityType::Phase => "phase",
            EntityType::Zone => "zone",
            EntityType::Building => "building",
            EntityType::Unit => "unit",
            EntityType::DesignType => "design_type",
        }
    }

    /// Human label used in hierarchy paths and display values.
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::Project => "Project",
            EntityType::Phase => "Phase",
            EntityType::Zone => "Zone",
            EntityType::Building => "Building",
            EntityType::Unit => "Unit",
            EntityType::DesignType => "Design Type",
        }
    }

    /// Structural parent in the hierarchy tree.
    pub fn parent(&self) -> Option<EntityType> {
        match self {
            EntityType::Project => None,
            EntityType::Phase => Some(EntityType::Project),
            EntityType::Zone => Some(EntityType::Phase),
            EntityType::Building => Some(EntityType::Zone),
            EntityType::Unit => Some(EntityType::Building),
            EntityType::DesignType => Some(EntityType::Phase),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic document label, selected by the filename prefix code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    BuildingLocation,
    Finish,
    FloorPlan,
    Gallery,
    ProjectPlan,
    UnitPlan,
    Generic,
}

impl DocumentType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "bl" => Some(DocumentType::BuildingLocation),
            "f" => Some(DocumentType::Finish),
            "fp" => Some(DocumentType::FloorPlan),
            "g" => Some(DocumentType::Gallery),
            "pp" => Some(DocumentType::ProjectPlan),
            "up" => Some(DocumentType::UnitPlan),
            "gd" => Some(DocumentType::Generic),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::BuildingLocation => "bl",
            DocumentType::Finish => "f",
            DocumentType::FloorPlan => "fp",
            DocumentType::Gallery => "g",
            DocumentType::ProjectPlan => "pp",
            DocumentType::UnitPlan => "up",
            DocumentType::Generic => "gd",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::BuildingLocation => "Building Location",
            DocumentType::Finish => "Finish",
            DocumentType::FloorPlan => "Floor Plan",
            DocumentType::Gallery => "Gallery",
            DocumentType::ProjectPlan => "Project Plan",
            DocumentType::UnitPlan => "Unit Plan",
            DocumentType::Generic => "Generic Document",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Names identifying a hierarchy node from the project down to its level.
///
/// Each variant holds exactly the levels required for its entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NamePath {
    Project {
        project: String,
    },
    Phase {
        project: String,
        phase: String,
    },
    Zone {
        project: String,
        phase: String,
        zone: String,
    },
    Building {
        project: String,
        phase: String,
        zone: String,
        building: String,
    },
    Unit {
        project: String,
        phase: String,
        zone: String,
        building: String,
        unit: String,
    },
    DesignType {
        project: String,
        phase: String,
        design_type: String,
    },
}

impl NamePath {
    pub fn entity_type(&self) -> EntityType {
        match self {
            NamePath::Project { .. } => EntityType::Project,
            NamePath::Phase { .. } => EntityType::Phase,
            NamePath::Zone { .. } => EntityType::Zone,
            NamePath::Building { .. } => EntityType::Building,
            NamePath::Unit { .. } => EntityType::Unit,
            NamePath::DesignType { .. } => EntityType::DesignType,
        }
    }

    /// Populated levels, root first.
    pub fn segments(&self) -> Vec<(EntityType, &str)> {
        use EntityType as E;
        match self {
            NamePath::Project { project } => vec![(E::Project, project.as_str())],
            NamePath::Phase { project, phase } => {
                vec![(E::Project, project.as_str()), (E::Phase, phase.as_str())]
            }
            NamePath::Zone {
                project,
                phase,
                zone,
            } => vec![
                (E::Project, project.as_str()),
                (E::Phase, phase.as_str()),
                (E::Zone, zone.as_str()),
            ],
            NamePath::Building {
                project,
                phase,
                zone,
                building,
            } => vec![
                (E::Project, project.as_str()),
                (E::Phase, phase.as_str()),
                (E::Zone, zone.as_str()),
                (E::Building, building.as_str()),
            ],
            NamePath::Unit {
                project,
                phase,
                zone,
                building,
                unit,
            } => vec![
                (E::Project, project.as_str()),
                (E::Phase, phase.as_str()),
                (E::Zone, zone.as_str()),
                (E::Building, building.as_str()),
                (E::Unit, unit.as_str()),
            ],
            NamePath::DesignType {
                project,
                phase,
                design_type,
            } => vec![
                (E::Project, project.as_str()),
                (E::Phase, phase.as_str()),
                (E::DesignType, design_type.as_str()),
            ],
        }
    }

    /// Name at `level`, if this path reaches it.
    pub fn get(&self, level: EntityType) -> Option<&str> {
        self.segments()
            .into_iter()
            .find(|(l, _)| *l == level)
            .map(|(_, name)| name)
    }

    /// Name of the node this path identifies.
    pub fn leaf(&self) -> &str {
        match self {
            NamePath::Project { project } => project.as_str(),
            NamePath::Phase { phase, .. } => phase.as_str(),
            NamePath::Zone { zone, .. } => zone.as_str(),
            NamePath::Building { building, .. } => building.as_str(),
            NamePath::Unit { unit, .. } => unit.as_str(),
            NamePath::DesignType { design_type, .. } => design_type.as_str(),
        }
    }

    /// Path of the structural parent node.
    pub fn parent(&self) -> Option<NamePath> {
        match self.clone() {
            NamePath::Project { .. } => None,
            NamePath::Phase { project, .. } => Some(NamePath::Project { project }),
            NamePath::Zone { project, phase, .. } => Some(NamePath::Phase { project, phase }),
            NamePath::Building {
                project,
                phase,
                zone,
                ..
            } => Some(NamePath::Zone {
                project,
                phase,
                zone,
            }),
            NamePath::Unit {
                project,
                phase,
                zone,
                building,
                ..
            } => Some(NamePath::Building {
                project,
                phase,
                zone,
                building,
            }),
            NamePath::DesignType { project, phase, .. } => {
                Some(NamePath::Phase { project, phase })
            }
        }
    }

    /// The `namePath` object sent to and returned by the lookup service.
    pub fn to_wire(&self) -> BTreeMap<String, String> {
        self.segments()
            .into_iter()
            .map(|(level, name)| (level.name_key().to_string(), name.to_string()))
            .collect()
    }

    /// Rebuild a path from a wire `namePath`. The key set must match the
    /// entity type exactly.
    pub fn from_wire(entity_type: EntityType, map: &BTreeMap<String, String>) -> Option<NamePath> {
        let take = |level: EntityType| map.get(level.name_key()).cloned();
        let path = match entity_type {
            EntityType::Project => NamePath::Project {
                project: take(EntityType::Project)?,
            },
            EntityType::Phase => NamePath::Phase {
                project: take(EntityType::Project)?,
                phase: take(EntityType::Phase)?,
            },
            EntityType::Zone => NamePath::Zone {
                project: take(EntityType::Project)?,
                phase: take(EntityType::Phase)?,
                zone: take(EntityType::Zone)?,
            },
            EntityType::Building => NamePath::Building {
                project: take(EntityType::Project)?,
                phase: take(EntityType::Phase)?,
                zone: take(EntityType::Zone)?,
                building: take(EntityType::Building)?,
            },
            EntityType::Unit => NamePath::Unit {
                project: take(EntityType::Project)?,
                phase: take(EntityType::Phase)?,
                zone: take(EntityType::Zone)?,
                building: take(EntityType::Building)?,
                unit: take(EntityType::Unit)?,
            },
            EntityType::DesignType => NamePath::DesignType {
                project: take(EntityType::Project)?,
                phase: take(EntityType::Phase)?,
                design_type: take(EntityType::DesignType)?,
            },
        };
        if path.segments().len() != map.len() {
            return None;
        }
        Some(path)
    }

    /// Human-readable hierarchy path, e.g. `ProjA/Phase Ph1/Zone Z1`.
    pub fn display_path(&self) -> String {
        self.segments()
            .into_iter()
            .map(|(level, name)| match level {
                EntityType::Project => name.to_string(),
                other => format!("{} {}", other.label(), name),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Attempt to overwrite an identifier that was already recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("identifier '{key}' already set to '{existing}', refusing '{attempted}'")]
pub struct IdConflict {
    pub key: String,
    pub existing: String,
    pub attempted: String,
}

/// Remote identifiers collected for one document. Append-only: a key, once
/// set, keeps its value for the rest of the run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedIds {
    levels: BTreeMap<EntityType, String>,
    content_version_id: Option<String>,
    distribution_url: Option<String>,
}

fn record_once(slot: &mut Option<String>, key: &str, value: &str) -> Result<(), IdConflict> {
    match slot {
        Some(existing) if existing.as_str() != value => Err(IdConflict {
            key: key.to_string(),
            existing: existing.clone(),
            attempted: value.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            *slot = Some(value.to_string());
            Ok(())
        }
    }
}

impl ResolvedIds {
    pub fn level(&self, level: EntityType) -> Option<&str> {
        self.levels.get(&level).map(String::as_str)
    }

    pub fn record_level(&mut self, level: EntityType, id: &str) -> Result<(), IdConflict> {
        match self.levels.get(&level) {
            Some(existing) if existing != id => Err(IdConflict {
                key: level.id_key().to_string(),
                existing: existing.clone(),
                attempted: id.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.levels.insert(level, id.to_string());
                Ok(())
            }
        }
    }

    pub fn content_version_id(&self) -> Option<&str> {
        self.content_version_id.as_deref()
    }

    pub fn record_content_version_id(&mut self, id: &str) -> Result<(), IdConflict> {
        record_once(&mut self.content_version_id, "contentVersionId", id)
    }

    pub fn distribution_url(&self) -> Option<&str> {
        self.distribution_url.as_deref()
    }

    pub fn record_distribution_url(&mut self, url: &str) -> Result<(), IdConflict> {
        record_once(&mut self.distribution_url, "distributionUrl", url)
    }

    /// Flattened view keyed by lowercase level name plus the synthetic
    /// `contentVersionId` / `distributionUrl` keys.
    pub fn as_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self
            .levels
            .iter()
            .map(|(level, id)| (level.id_key().to_string(), id.clone()))
            .collect();
        if let Some(id) = &self.content_version_id {
            map.insert("contentVersionId".to_string(), id.clone());
        }
        if let Some(url) = &self.distribution_url {
            map.insert("distributionUrl".to_string(), url.clone());
        }
        map
    }
}

/// One discovered file and everything learned about it during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    source_path: String,
    file_name: String,
    document_type: DocumentType,
    name_path: NamePath,
    resolved_ids: ResolvedIds,
    content_document_id: Option<String>,
}

impl DocumentRecord {
    pub fn new(
        source_path: impl Into<String>,
        file_name: impl Into<String>,
        document_type: DocumentType,
        name_path: NamePath,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            file_name: file_name.into(),
            document_type,
            name_path,
            resolved_ids: ResolvedIds::default(),
            content_document_id: None,
        }
    }

    /// Path relative to the ingestion root, `/`-separated.
    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn entity_type(&self) -> EntityType {
        self.name_path.entity_type()
    }

    pub fn name_path(&self) -> &NamePath {
        &self.name_path
    }

    pub fn resolved_ids(&self) -> &ResolvedIds {
        &self.resolved_ids
    }

    pub fn resolved_ids_mut(&mut self) -> &mut ResolvedIds {
        &mut self.resolved_ids
    }

    /// Identifier of the remote record for this document's own level.
    pub fn entity_id(&self) -> Option<&str> {
        self.resolved_ids.level(self.entity_type())
    }

    pub fn content_document_id(&self) -> Option<&str> {
        self.content_document_id.as_deref()
    }

    pub fn set_content_document_id(&mut self, id: &str) -> Result<(), IdConflict> {
        record_once(&mut self.content_document_id, "contentDocumentId", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_path() -> NamePath {
        NamePath::Unit {
            project: "ProjA".into(),
            phase: "Ph1".into(),
            zone: "Zn1".into(),
            building: "Bd1".into(),
            unit: "U101".into(),
        }
    }

    #[test]
    fn test_entity_type_serde_tags() {
        assert_eq!(
            serde_json::to_string(&EntityType::DesignType).unwrap(),
            "\"DESIGN_TYPE\""
        );
        let parsed: EntityType = serde_json::from_str("\"BUILDING\"").unwrap();
        assert_eq!(parsed, EntityType::Building);
    }

    #[test]
    fn test_wire_keys_match_entity_type() {
        let wire = unit_path().to_wire();
        let keys: Vec<&str> = wire.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["building", "phase", "project", "unit", "zone"]);
    }

    #[test]
    fn test_from_wire_rejects_extra_or_missing_keys() {
        let mut wire = unit_path().to_wire();
        assert_eq!(NamePath::from_wire(EntityType::Unit, &wire), Some(unit_path()));

        wire.insert("designType".into(), "X".into());
        assert_eq!(NamePath::from_wire(EntityType::Unit, &wire), None);

        let mut short = unit_path().to_wire();
        short.remove("zone");
        assert_eq!(NamePath::from_wire(EntityType::Unit, &short), None);
    }

    #[test]
    fn test_parent_chain_reaches_project() {
        let mut path = Some(unit_path());
        let mut seen = Vec::new();
        while let Some(p) = path {
            seen.push(p.entity_type());
            path = p.parent();
        }
        assert_eq!(
            seen,
            vec![
                EntityType::Unit,
                EntityType::Building,
                EntityType::Zone,
                EntityType::Phase,
                EntityType::Project
            ]
        );
    }

    #[test]
    fn test_display_path() {
        assert_eq!(
            unit_path().display_path(),
            "ProjA/Phase Ph1/Zone Zn1/Building Bd1/Unit U101"
        );
        let dt = NamePath::DesignType {
            project: "ProjA".into(),
            phase: "Ph1".into(),
            design_type: "Villa".into(),
        };
        assert_eq!(dt.display_path(), "ProjA/Phase Ph1/Design Type Villa");
    }

    #[test]
    fn test_resolved_ids_append_only() {
        let mut ids = ResolvedIds::default();
        ids.record_level(EntityType::Phase, "a01").unwrap();
        ids.record_level(EntityType::Phase, "a01").unwrap();
        let err = ids.record_level(EntityType::Phase, "a02").unwrap_err();
        assert_eq!(err.existing, "a01");
        assert_eq!(ids.level(EntityType::Phase), Some("a01"));

        ids.record_content_version_id("068x").unwrap();
        assert!(ids.record_content_version_id("068y").is_err());

        let map = ids.as_map();
        assert_eq!(map.get("phase").map(String::as_str), Some("a01"));
        assert_eq!(map.get("contentVersionId").map(String::as_str), Some("068x"));
    }

    #[test]
    fn test_design_type_id_key() {
        let mut ids = ResolvedIds::default();
        ids.record_level(EntityType::DesignType, "a0D").unwrap();
        assert!(ids.as_map().contains_key("design_type"));
    }
}
