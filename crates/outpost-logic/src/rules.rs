//! Static rule data for facilities and items, shared by every instance.
//!
//! Rules are resolved once into a [`RuleCatalog`] and then handed out as
//! `Arc<FacilityRule>`; facilities never own their rule.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::functions::BaseFunctions;
use crate::grid::BASE_SIZE;

/// Item quantities charged when building and returned when dismantling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCost {
    /// Units consumed when construction is ordered.
    pub build: u32,
    /// Units returned when a started or finished facility is dismantled.
    pub refund: u32,
}

/// Immutable description of a facility type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacilityRule {
    pub id: String,
    /// Footprint edge length; the facility occupies `size × size` cells.
    pub size: i32,

    // ── Capacity contributions ──
    pub personnel: i64,
    pub storage: i64,
    pub laboratories: i64,
    pub workshops: i64,
    pub hangars: i64,
    pub psi_labs: i64,
    pub training_rooms: i64,
    pub containment: i64,
    pub prison_type: u32,
    pub defense: i64,
    pub radar_range: i32,
    /// Detection chance in percent.
    pub radar_chance: i32,
    pub hyperwave: bool,
    pub access_lift: bool,
    pub mind_shield: bool,
    pub grav_shield: bool,

    // ── Base functions ──
    pub provides: BaseFunctions,
    pub requires: BaseFunctions,
    pub forbids: BaseFunctions,

    pub missile_attraction: u32,

    // ── Economy ──
    pub build_cost: i64,
    pub build_days: u32,
    pub monthly_cost: i64,
    pub refund_value: i64,
    pub build_items: BTreeMap<String, ItemCost>,

    // ── Replacement ──
    /// Rule spawned over the footprint when a missile destroys this facility.
    pub destroyed_variant: Option<String>,
    /// Rules spawned over the footprint when a finished facility is dismantled.
    pub leaves_behind_on_sell: Vec<String>,
    /// Build time given to facilities left behind on dismantle.
    pub removal_days: u32,
    /// Facilities this rule may be built over. Empty means only an
    /// equal-size facility of another type at exactly the same spot.
    pub build_over: Vec<String>,
    pub max_per_base: Option<u32>,
}

impl Default for FacilityRule {
    fn default() -> Self {
        Self {
            id: String::new(),
            size: 1,
            personnel: 0,
            storage: 0,
            laboratories: 0,
            workshops: 0,
            hangars: 0,
            psi_labs: 0,
            training_rooms: 0,
            containment: 0,
            prison_type: 0,
            defense: 0,
            radar_range: 0,
            radar_chance: 0,
            hyperwave: false,
            access_lift: false,
            mind_shield: false,
            grav_shield: false,
            provides: BaseFunctions::empty(),
            requires: BaseFunctions::empty(),
            forbids: BaseFunctions::empty(),
            missile_attraction: 0,
            build_cost: 0,
            build_days: 0,
            monthly_cost: 0,
            refund_value: 0,
            build_items: BTreeMap::new(),
            destroyed_variant: None,
            leaves_behind_on_sell: Vec::new(),
            removal_days: 0,
            build_over: Vec::new(),
            max_per_base: None,
        }
    }
}

impl FacilityRule {
    /// Shorthand used by tests and tooling.
    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Footprint cell count, which is also the missile power a hit absorbs.
    pub fn cell_count(&self) -> u32 {
        (self.size * self.size).max(0) as u32
    }

    /// Effective per-base limit; an access lift is always unique.
    pub fn base_limit(&self) -> Option<u32> {
        if self.access_lift {
            Some(1)
        } else {
            self.max_per_base
        }
    }
}

/// Item rule, reduced to what capacity accounting needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemRule {
    pub id: String,
    /// Storage space per unit (fractional).
    pub size: f64,
    /// Live specimen that must be kept in containment.
    pub live_alien: bool,
    pub prison_type: u32,
}

impl Default for ItemRule {
    fn default() -> Self {
        Self {
            id: String::new(),
            size: 0.0,
            live_alien: false,
            prison_type: 0,
        }
    }
}

/// Raw rule set as authored in data files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub facilities: Vec<FacilityRule>,
    pub items: Vec<ItemRule>,
    /// Mod-wide 1×1 rubble placed on every cell of a missile-destroyed
    /// facility that has no `destroyed_variant` of its own.
    pub destroyed_facility: Option<String>,
}

/// Rule set validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("duplicate facility rule `{0}`")]
    DuplicateFacility(String),
    #[error("duplicate item rule `{0}`")]
    DuplicateItem(String),
    #[error("facility `{rule}` has size {size}, expected 1..={}", BASE_SIZE)]
    InvalidSize { rule: String, size: i32 },
    #[error("facility `{rule}` references unknown facility `{target}` in `{field}`")]
    UnknownFacility {
        rule: String,
        field: &'static str,
        target: String,
    },
    #[error("facility `{rule}` is damaged into `{variant}`, which has a different size")]
    VariantSizeMismatch { rule: String, variant: String },
    #[error("destroyed facility placeholder `{0}` is not a known 1x1 facility")]
    InvalidPlaceholder(String),
}

/// Resolved, validated rule lookup.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    facilities: BTreeMap<String, Arc<FacilityRule>>,
    items: BTreeMap<String, ItemRule>,
    destroyed_facility: Option<String>,
}

impl RuleCatalog {
    /// Empty catalog; fill with [`RuleCatalog::add_facility`] and friends.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a catalog from an authored rule set.
    pub fn from_rule_set(set: RuleSet) -> Result<Self, RuleError> {
        let mut catalog = Self::new();
        for rule in set.facilities {
            if catalog.facilities.contains_key(&rule.id) {
                return Err(RuleError::DuplicateFacility(rule.id));
            }
            catalog.add_facility(rule);
        }
        for item in set.items {
            if catalog.items.contains_key(&item.id) {
                return Err(RuleError::DuplicateItem(item.id));
            }
            catalog.add_item(item);
        }
        catalog.destroyed_facility = set.destroyed_facility;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn add_facility(&mut self, rule: FacilityRule) -> Arc<FacilityRule> {
        let rule = Arc::new(rule);
        self.facilities.insert(rule.id.clone(), Arc::clone(&rule));
        rule
    }

    pub fn add_item(&mut self, item: ItemRule) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn set_destroyed_facility(&mut self, id: Option<String>) {
        self.destroyed_facility = id;
    }

    pub fn facility(&self, id: &str) -> Option<Arc<FacilityRule>> {
        self.facilities.get(id).cloned()
    }

    pub fn facilities(&self) -> impl Iterator<Item = &Arc<FacilityRule>> {
        self.facilities.values()
    }

    pub fn item(&self, id: &str) -> Option<&ItemRule> {
        self.items.get(id)
    }

    /// Storage size per unit; unknown items take no space.
    pub fn item_size(&self, id: &str) -> f64 {
        self.items.get(id).map(|i| i.size).unwrap_or(0.0)
    }

    /// Prison type of a live specimen, `None` for ordinary items.
    pub fn prison_type_of(&self, id: &str) -> Option<u32> {
        self.items
            .get(id)
            .filter(|i| i.live_alien)
            .map(|i| i.prison_type)
    }

    pub fn destroyed_facility(&self) -> Option<Arc<FacilityRule>> {
        self.destroyed_facility
            .as_deref()
            .and_then(|id| self.facility(id))
    }

    /// Check sizes and that every rule reference resolves.
    pub fn validate(&self) -> Result<(), RuleError> {
        for rule in self.facilities.values() {
            if !(1..=BASE_SIZE).contains(&rule.size) {
                return Err(RuleError::InvalidSize {
                    rule: rule.id.clone(),
                    size: rule.size,
                });
            }
            let references = rule
                .destroyed_variant
                .iter()
                .map(|t| ("destroyed_variant", t))
                .chain(
                    rule.leaves_behind_on_sell
                        .iter()
                        .map(|t| ("leaves_behind_on_sell", t)),
                )
                .chain(rule.build_over.iter().map(|t| ("build_over", t)));
            for (field, target) in references {
                if !self.facilities.contains_key(target) {
                    return Err(RuleError::UnknownFacility {
                        rule: rule.id.clone(),
                        field,
                        target: target.clone(),
                    });
                }
            }
        }
        for rule in self.facilities.values() {
            let Some(variant) = rule.destroyed_variant.as_deref() else {
                continue;
            };
            if self.facilities.get(variant).is_some_and(|v| v.size != rule.size) {
                return Err(RuleError::VariantSizeMismatch {
                    rule: rule.id.clone(),
                    variant: variant.to_string(),
                });
            }
        }
        if let Some(id) = &self.destroyed_facility {
            match self.facilities.get(id) {
                Some(rule) if rule.size == 1 => {}
                _ => return Err(RuleError::InvalidPlaceholder(id.clone())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_set() -> RuleSet {
        RuleSet {
            facilities: vec![
                FacilityRule {
                    access_lift: true,
                    ..FacilityRule::named("lift")
                },
                FacilityRule {
                    storage: 50,
                    destroyed_variant: Some("rubble".into()),
                    ..FacilityRule::named("stores")
                },
                FacilityRule::named("rubble"),
            ],
            items: vec![ItemRule {
                id: "sectoid".into(),
                size: 0.5,
                live_alien: true,
                prison_type: 1,
            }],
            destroyed_facility: Some("rubble".into()),
        }
    }

    #[test]
    fn test_valid_rule_set_builds() {
        let catalog = RuleCatalog::from_rule_set(rule_set()).unwrap();
        assert!(catalog.facility("stores").is_some());
        assert_eq!(catalog.destroyed_facility().unwrap().id, "rubble");
        assert_eq!(catalog.prison_type_of("sectoid"), Some(1));
        assert_eq!(catalog.item_size("unknown"), 0.0);
    }

    #[test]
    fn test_dangling_variant_is_rejected() {
        let mut set = rule_set();
        set.facilities[1].destroyed_variant = Some("crater".into());
        let err = RuleCatalog::from_rule_set(set).unwrap_err();
        assert!(matches!(err, RuleError::UnknownFacility { ref target, .. } if target == "crater"));
    }

    #[test]
    fn test_variant_must_match_footprint() {
        let mut set = rule_set();
        set.facilities[1].size = 2;
        assert!(matches!(
            RuleCatalog::from_rule_set(set),
            Err(RuleError::VariantSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_oversized_rule_is_rejected() {
        let mut set = rule_set();
        set.facilities[1].size = 7;
        assert!(matches!(
            RuleCatalog::from_rule_set(set),
            Err(RuleError::InvalidSize { size: 7, .. })
        ));
    }

    #[test]
    fn test_duplicate_rule_is_rejected() {
        let mut set = rule_set();
        set.facilities.push(FacilityRule::named("lift"));
        assert_eq!(
            RuleCatalog::from_rule_set(set).unwrap_err(),
            RuleError::DuplicateFacility("lift".into())
        );
    }

    #[test]
    fn test_lift_is_limited_to_one() {
        let lift = FacilityRule {
            access_lift: true,
            ..FacilityRule::named("lift")
        };
        assert_eq!(lift.base_limit(), Some(1));
        assert_eq!(FacilityRule::named("x").base_limit(), None);
    }

    #[test]
    fn test_rule_json_uses_defaults_and_named_functions() {
        let json = r#"{ "id": "lab", "laboratories": 50, "provides": "LAB_SERVICE | POWER" }"#;
        let rule: FacilityRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.size, 1);
        assert_eq!(rule.laboratories, 50);
        assert_eq!(
            rule.provides,
            BaseFunctions::LAB_SERVICE | BaseFunctions::POWER
        );
        assert!(rule.build_over.is_empty());
    }
}
