//! Save/Load functionality for persisting a base
//!
//! Uses bincode for compact binary saves and serde_json for readable
//! exports. Facilities are stored as rule id plus placement state and
//! resolved against the rule catalog on load.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use outpost_logic::base::{Base, Craft, Production, ResearchProject, Soldier, Transfer};
use outpost_logic::config::BaseConfig;
use outpost_logic::grid::Facility;
use outpost_logic::rules::RuleCatalog;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version number for save file format (increment when format changes)
pub const SAVE_VERSION: u32 = 1;

/// Persisted state of one facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityRecord {
    pub rule: String,
    pub x: i32,
    pub y: i32,
    pub build_time: u32,
    pub disabled: bool,
    pub had_previous_facility: bool,
    pub craft: Option<u32>,
}

impl From<&Facility> for FacilityRecord {
    fn from(f: &Facility) -> Self {
        Self {
            rule: f.rule.id.clone(),
            x: f.x,
            y: f.y,
            build_time: f.build_time,
            disabled: f.disabled,
            had_previous_facility: f.had_previous_facility,
            craft: f.craft,
        }
    }
}

/// Serializable snapshot of a base and its engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveData {
    /// Save format version
    pub version: u32,
    pub seed: u64,
    pub day: u32,
    pub funds: i64,
    pub base_name: String,
    pub config: BaseConfig,
    /// Facilities in grid scan order
    pub facilities: Vec<FacilityRecord>,
    pub soldiers: Vec<Soldier>,
    pub crafts: Vec<Craft>,
    pub research: Vec<ResearchProject>,
    pub productions: Vec<Production>,
    pub transfers: Vec<Transfer>,
    pub items: BTreeMap<String, u32>,
    pub idle_scientists: u32,
    pub idle_engineers: u32,
}

impl SaveData {
    pub fn capture(base: &Base, seed: u64, day: u32, funds: i64) -> Self {
        let facilities = base
            .grid
            .ids_in_scan_order()
            .into_iter()
            .filter_map(|id| base.facility(id))
            .map(FacilityRecord::from)
            .collect();
        Self {
            version: SAVE_VERSION,
            seed,
            day,
            funds,
            base_name: base.name.clone(),
            config: base.config.clone(),
            facilities,
            soldiers: base.soldiers.clone(),
            crafts: base.crafts.clone(),
            research: base.research.clone(),
            productions: base.productions.clone(),
            transfers: base.transfers.clone(),
            items: base.items.clone(),
            idle_scientists: base.idle_scientists,
            idle_engineers: base.idle_engineers,
        }
    }

    /// Rebuild the base against `catalog`.
    ///
    /// Every rule id must resolve. The layout itself is not re-validated:
    /// an inconsistent one still loads and is reported by the layout audit.
    pub fn restore(self, catalog: Arc<RuleCatalog>) -> Result<Base, SaveError> {
        let mut base = Base::new(self.base_name, Arc::clone(&catalog), self.config);
        for record in self.facilities {
            let rule = catalog
                .facility(&record.rule)
                .ok_or_else(|| SaveError::UnknownRule(record.rule.clone()))?;
            let mut facility = Facility::built(rule, record.x, record.y);
            facility.build_time = record.build_time;
            facility.disabled = record.disabled;
            facility.had_previous_facility = record.had_previous_facility;
            facility.craft = record.craft;
            base.insert_facility(facility);
        }

        let ids = self
            .soldiers
            .iter()
            .map(|s| s.id)
            .chain(self.crafts.iter().map(|c| c.id))
            .chain(self.research.iter().map(|r| r.id))
            .chain(self.productions.iter().map(|p| p.id))
            .chain(self.transfers.iter().map(|t| t.id))
            .max();
        if let Some(max) = ids {
            base.reserve_id(max);
        }

        base.soldiers = self.soldiers;
        base.crafts = self.crafts;
        base.research = self.research;
        base.productions = self.productions;
        base.transfers = self.transfers;
        base.items = self.items;
        base.idle_scientists = self.idle_scientists;
        base.idle_engineers = self.idle_engineers;

        let issues = base.audit_layout();
        if !issues.is_empty() {
            log::warn!(
                "{}: loaded with {} layout issues",
                base.name,
                issues.len()
            );
        }
        Ok(base)
    }
}

/// Write a save to a writer
pub fn save_base<W: Write>(writer: W, data: &SaveData) -> Result<(), SaveError> {
    bincode::serialize_into(writer, data)?;
    Ok(())
}

/// Read a save from a reader, checking its version
pub fn load_base<R: Read>(reader: R) -> Result<SaveData, SaveError> {
    let data: SaveData = bincode::deserialize_from(reader)?;

    if data.version != SAVE_VERSION {
        return Err(SaveError::VersionMismatch {
            expected: SAVE_VERSION,
            found: data.version,
        });
    }
    Ok(data)
}

/// Write a pretty-printed JSON snapshot
pub fn export_json<W: Write>(writer: W, data: &SaveData) -> Result<(), SaveError> {
    serde_json::to_writer_pretty(writer, data)?;
    Ok(())
}

/// Errors that can occur during save/load
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Save version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("Save references unknown facility rule `{0}`")]
    UnknownRule(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{BaseEngine, EngineConfig};
    use outpost_logic::base::TransferCargo;
    use outpost_logic::cascade::LayoutIssue;
    use outpost_logic::functions::BaseFunctions;
    use outpost_logic::grid::Area;
    use outpost_logic::rules::{FacilityRule, RuleSet};

    fn catalog() -> Arc<RuleCatalog> {
        let set = RuleSet {
            facilities: vec![
                FacilityRule {
                    access_lift: true,
                    ..FacilityRule::named("lift")
                },
                FacilityRule {
                    size: 2,
                    hangars: 1,
                    build_days: 25,
                    ..FacilityRule::named("hangar")
                },
                FacilityRule {
                    laboratories: 50,
                    provides: BaseFunctions::LAB_SERVICE,
                    build_days: 26,
                    ..FacilityRule::named("lab")
                },
            ],
            ..RuleSet::default()
        };
        Arc::new(RuleCatalog::from_rule_set(set).unwrap())
    }

    fn populated() -> BaseEngine {
        let mut engine = BaseEngine::found("Test Base", catalog(), EngineConfig::default(), 2, 2).unwrap();
        engine.funds = 5_000;
        let hangar = engine.base.catalog.facility("hangar").unwrap();
        let mut parked = Facility::built(hangar, 0, 2);
        parked.craft = Some(3);
        engine.base.insert_facility(parked);
        engine.commit_placement("lab", Area::new(3, 2, 1), None).unwrap();
        engine.base.crafts.push(Craft {
            id: 3,
            rule: "interceptor".into(),
            cargo: BTreeMap::new(),
        });
        engine.base.transfers.push(Transfer {
            id: 9,
            cargo: TransferCargo::Scientists(4),
            hours: 48,
        });
        engine.base.idle_scientists = 6;
        engine.advance_day();
        engine
    }

    #[test]
    fn test_save_load_roundtrip() {
        let engine = populated();

        let mut save_buffer = Vec::new();
        engine.save(&mut save_buffer).expect("Save failed");

        let mut loaded = BaseEngine::load(&save_buffer[..], catalog()).expect("Load failed");

        assert_eq!(loaded.day, 1);
        assert_eq!(loaded.funds, engine.funds);
        assert_eq!(loaded.facility_count(), 3);
        assert_eq!(loaded.base.idle_scientists, 6);
        assert!(loaded.audit().is_empty());
        assert!(loaded.base.hangar_of(3).is_some());

        let lab = loaded.base.grid.facility_at(3, 2).unwrap();
        assert_eq!(loaded.base.facility(lab).unwrap().build_time, 25);
        assert!(loaded.base.next_id() > 9);
    }

    #[test]
    fn test_version_mismatch() {
        let mut data = SaveData::capture(&populated().base, 0, 0, 0);
        data.version = SAVE_VERSION + 1;
        let mut buffer = Vec::new();
        save_base(&mut buffer, &data).unwrap();
        assert!(matches!(
            load_base(&buffer[..]),
            Err(SaveError::VersionMismatch { found, .. }) if found == SAVE_VERSION + 1
        ));
    }

    #[test]
    fn test_unknown_rule_fails_load() {
        let mut data = SaveData::capture(&populated().base, 0, 0, 0);
        data.facilities[0].rule = "missing".into();
        assert!(matches!(
            data.restore(catalog()),
            Err(SaveError::UnknownRule(ref id)) if id == "missing"
        ));
    }

    #[test]
    fn test_invalid_layout_loads_with_issues() {
        let mut data = SaveData::capture(&populated().base, 0, 0, 0);
        let lab = data
            .facilities
            .iter_mut()
            .find(|f| f.rule == "lab")
            .unwrap();
        lab.x = 5;
        lab.y = 5;
        let base = data.restore(catalog()).unwrap();
        let issues = base.audit_layout();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], LayoutIssue::Disconnected(_)));
    }

    #[test]
    fn test_json_export() {
        let engine = populated();
        let mut out = Vec::new();
        engine.export_json(&mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["base_name"], "Test Base");
        assert_eq!(value["facilities"].as_array().unwrap().len(), 3);
    }
}
