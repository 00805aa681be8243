//! Capacity ledger: available versus used for every base resource.
//!
//! Availability is summed from facilities; usage is counted from the base's
//! dependents. Nothing here is cached; a [`CapacityLedger`] is a snapshot of
//! the facility totals taken when it is built.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::base::{Base, TransferCargo};
use crate::config::BaseConfig;
use crate::functions::BaseFunctions;
use crate::grid::{Area, Facility};

/// Tracked resource. Containment is partitioned by prison type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resource {
    Quarters,
    Storage,
    Laboratories,
    Workshops,
    Hangars,
    PsiLabs,
    Training,
    Containment(u32),
    Defense,
    ShortRangeRadar,
    LongRangeRadar,
}

impl Resource {
    /// Resources whose shortfall blocks a removal.
    pub const SPACE: [Resource; 7] = [
        Resource::Quarters,
        Resource::Storage,
        Resource::Laboratories,
        Resource::Workshops,
        Resource::Hangars,
        Resource::PsiLabs,
        Resource::Training,
    ];
}

// ── Facility totals ──

/// Summed facility contributions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityTotals {
    pub quarters: i64,
    pub storage: i64,
    pub laboratories: i64,
    pub workshops: i64,
    pub hangars: i64,
    pub psi_labs: i64,
    pub training: i64,
    pub containment: BTreeMap<u32, i64>,
    pub defense: i64,
    pub short_range_radars: i64,
    pub long_range_radars: i64,
}

impl CapacityTotals {
    /// Add what `facility` contributes in its current state.
    ///
    /// Finished, enabled facilities count in full. A facility mid-upgrade
    /// keeps its quarters and (unless storage limits are enforced) its
    /// storage when transitional capacity is counted. A hangar rebuilt
    /// around a parked craft keeps that craft's slot.
    pub fn add_facility(&mut self, facility: &Facility, config: &BaseConfig) {
        let rule = &facility.rule;
        let full = facility.is_operational() && !facility.disabled;
        let transitional = !facility.disabled
            && facility.is_upgrading()
            && config.count_transitional_capacity;

        if full || transitional {
            self.quarters += rule.personnel;
        }
        if full || (transitional && !config.storage_limits_enforced) {
            self.storage += rule.storage;
        }
        if !full {
            if !facility.disabled && facility.is_upgrading() && facility.craft.is_some() {
                self.hangars += rule.hangars.min(1);
            }
            return;
        }
        self.laboratories += rule.laboratories;
        self.workshops += rule.workshops;
        self.hangars += rule.hangars;
        self.psi_labs += rule.psi_labs;
        self.training += rule.training_rooms;
        if rule.containment != 0 {
            *self.containment.entry(rule.prison_type).or_insert(0) += rule.containment;
        }
        self.defense += rule.defense;
        if rule.radar_range > 0 {
            if rule.radar_range >= config.long_range_radar_threshold {
                self.long_range_radars += 1;
            } else {
                self.short_range_radars += 1;
            }
        }
    }

    pub fn get(&self, resource: Resource) -> i64 {
        match resource {
            Resource::Quarters => self.quarters,
            Resource::Storage => self.storage,
            Resource::Laboratories => self.laboratories,
            Resource::Workshops => self.workshops,
            Resource::Hangars => self.hangars,
            Resource::PsiLabs => self.psi_labs,
            Resource::Training => self.training,
            Resource::Containment(p) => self.containment.get(&p).copied().unwrap_or(0),
            Resource::Defense => self.defense,
            Resource::ShortRangeRadar => self.short_range_radars,
            Resource::LongRangeRadar => self.long_range_radars,
        }
    }
}

/// Storage check in two-decimal fixed point: overfull when
/// `round(used * 100) > available * 100`.
pub fn storage_overfull(used: f64, available: i64) -> bool {
    (used * 100.0).round() > (available as f64) * 100.0
}

// ── Ledger ──

/// Snapshot of a base's capacity accounting.
pub struct CapacityLedger<'a> {
    base: &'a Base,
    totals: CapacityTotals,
}

impl<'a> CapacityLedger<'a> {
    pub fn new(base: &'a Base) -> Self {
        let mut totals = CapacityTotals::default();
        for (_, facility) in base.grid.iter() {
            totals.add_facility(facility, &base.config);
        }
        Self { base, totals }
    }

    pub fn totals(&self) -> &CapacityTotals {
        &self.totals
    }

    pub fn available(&self, resource: Resource) -> i64 {
        self.totals.get(resource)
    }

    /// Units in use. Only storage is fractional.
    pub fn used(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Storage => self.used_storage(),
            other => self.used_units(other) as f64,
        }
    }

    pub fn free(&self, resource: Resource) -> f64 {
        self.available(resource) as f64 - self.used(resource)
    }

    /// Integral usage of every resource but storage.
    pub fn used_units(&self, resource: Resource) -> i64 {
        let b = self.base;
        match resource {
            Resource::Quarters => {
                let in_transit: u32 = b.transfers.iter().map(|t| t.personnel()).sum();
                b.soldiers.len() as i64
                    + b.total_scientists() as i64
                    + b.total_engineers() as i64
                    + in_transit as i64
            }
            Resource::Storage => self.used_storage().ceil() as i64,
            Resource::Laboratories => b.allocated_scientists() as i64,
            Resource::Workshops => b
                .productions
                .iter()
                .map(|p| (p.engineers + p.required_space) as i64)
                .sum(),
            Resource::Hangars => {
                b.crafts.len() as i64
                    + b.transfers.iter().filter(|t| t.is_craft()).count() as i64
                    + b.productions.iter().filter(|p| p.produces_craft).count() as i64
            }
            Resource::PsiLabs => b.soldiers.iter().filter(|s| s.psi_training).count() as i64,
            Resource::Training => b.soldiers.iter().filter(|s| s.training).count() as i64,
            Resource::Containment(prison) => self.used_containment(prison),
            Resource::Defense | Resource::ShortRangeRadar | Resource::LongRangeRadar => 0,
        }
    }

    /// Storage taken by the item store, craft cargo and items in transit.
    /// Live specimens sit in containment, not in stores.
    pub fn used_storage(&self) -> f64 {
        let b = self.base;
        let size = |item: &str, qty: u32| -> f64 {
            if b.catalog.prison_type_of(item).is_some() {
                0.0
            } else {
                b.catalog.item_size(item) * qty as f64
            }
        };
        let mut total: f64 = b.items.iter().map(|(i, &q)| size(i.as_str(), q)).sum();
        for craft in &b.crafts {
            total += craft.cargo.iter().map(|(i, &q)| size(i.as_str(), q)).sum::<f64>();
        }
        for transfer in &b.transfers {
            match &transfer.cargo {
                TransferCargo::Item { item, quantity } => total += size(item.as_str(), *quantity),
                TransferCargo::Craft(craft) => {
                    total += craft.cargo.iter().map(|(i, &q)| size(i.as_str(), q)).sum::<f64>();
                }
                _ => {}
            }
        }
        total
    }

    fn used_containment(&self, prison: u32) -> i64 {
        let b = self.base;
        let in_prison = |item: &str| b.catalog.prison_type_of(item) == Some(prison);
        let stored: u32 = b
            .items
            .iter()
            .filter(|(i, _)| in_prison(i.as_str()))
            .map(|(_, &q)| q)
            .sum();
        let in_transit: u32 = b
            .transfers
            .iter()
            .filter_map(|t| match &t.cargo {
                TransferCargo::Item { item, quantity } if in_prison(item.as_str()) => Some(*quantity),
                _ => None,
            })
            .sum();
        let held = b
            .research
            .iter()
            .filter(|r| r.held_item.as_deref().is_some_and(in_prison))
            .count() as u32;
        (stored + in_transit + held) as i64
    }

    /// Prison types with either capacity or inmates.
    pub fn prison_types(&self) -> BTreeSet<u32> {
        let b = self.base;
        let mut types: BTreeSet<u32> = self.totals.containment.keys().copied().collect();
        types.extend(b.items.keys().filter_map(|i| b.catalog.prison_type_of(i)));
        types.extend(
            b.research
                .iter()
                .filter_map(|r| r.held_item.as_deref())
                .filter_map(|i| b.catalog.prison_type_of(i)),
        );
        types
    }

    /// Whether adding `offset` more storage would overflow the stores.
    pub fn stores_overfull(&self, offset: f64) -> bool {
        storage_overfull(self.used_storage() + offset, self.available(Resource::Storage))
    }

    // ── Base functions ──

    /// Functions of facilities that are finished or mid-upgrade.
    pub fn provided_functions(&self, excluding: Option<&Area>) -> BaseFunctions {
        self.facilities_outside(excluding)
            .filter(|f| f.conducts())
            .fold(BaseFunctions::empty(), |acc, f| acc | f.rule.provides)
    }

    /// Functions required by facilities, research and production.
    pub fn required_functions(&self, excluding: Option<&Area>) -> BaseFunctions {
        let b = self.base;
        let from_facilities = self
            .facilities_outside(excluding)
            .fold(BaseFunctions::empty(), |acc, f| acc | f.rule.requires);
        let from_research = b
            .research
            .iter()
            .fold(BaseFunctions::empty(), |acc, r| acc | r.requires);
        let from_production = b
            .productions
            .iter()
            .fold(BaseFunctions::empty(), |acc, p| acc | p.requires);
        from_facilities | from_research | from_production
    }

    pub fn forbidden_functions(&self, excluding: Option<&Area>) -> BaseFunctions {
        self.facilities_outside(excluding)
            .fold(BaseFunctions::empty(), |acc, f| acc | f.rule.forbids)
    }

    fn facilities_outside<'s>(
        &'s self,
        excluding: Option<&'s Area>,
    ) -> impl Iterator<Item = &'s Facility> + 's {
        let base = self.base;
        base.grid
            .iter()
            .map(|(_, f)| f)
            .filter(move |f| excluding.map_or(true, |a| !f.area().intersects(a)))
    }
}

// ── Derived stats ──

impl Base {
    pub fn ledger(&self) -> CapacityLedger<'_> {
        CapacityLedger::new(self)
    }

    pub fn available(&self, resource: Resource) -> i64 {
        self.ledger().available(resource)
    }

    pub fn used(&self, resource: Resource) -> f64 {
        self.ledger().used(resource)
    }

    pub fn free(&self, resource: Resource) -> f64 {
        self.ledger().free(resource)
    }

    pub fn provided_functions(&self, excluding: Option<&Area>) -> BaseFunctions {
        self.ledger().provided_functions(excluding)
    }

    pub fn required_functions(&self, excluding: Option<&Area>) -> BaseFunctions {
        self.ledger().required_functions(excluding)
    }

    pub fn forbidden_functions(&self, excluding: Option<&Area>) -> BaseFunctions {
        self.ledger().forbidden_functions(excluding)
    }

    /// Upkeep per month of every finished facility.
    pub fn monthly_maintenance(&self) -> i64 {
        self.grid
            .iter()
            .filter(|(_, f)| f.is_operational())
            .map(|(_, f)| f.rule.monthly_cost)
            .sum()
    }

    pub fn defense_value(&self) -> i64 {
        self.available(Resource::Defense)
    }

    /// Best detection chance among working radars, in percent.
    pub fn detection_chance(&self) -> i32 {
        self.working_facilities()
            .filter(|f| f.rule.radar_range > 0)
            .map(|f| f.rule.radar_chance)
            .max()
            .unwrap_or(0)
    }

    pub fn has_hyperwave(&self) -> bool {
        self.working_facilities().any(|f| f.rule.hyperwave)
    }

    pub fn has_mind_shield(&self) -> bool {
        self.working_facilities().any(|f| f.rule.mind_shield)
    }

    pub fn has_grav_shield(&self) -> bool {
        self.working_facilities().any(|f| f.rule.grav_shield)
    }

    fn working_facilities(&self) -> impl Iterator<Item = &Facility> {
        self.grid
            .iter()
            .map(|(_, f)| f)
            .filter(|f| f.is_operational() && !f.disabled)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::base::{Craft, Production, ResearchProject, Soldier, Transfer};
    use crate::rules::{FacilityRule, ItemRule, RuleCatalog};

    fn catalog() -> Arc<RuleCatalog> {
        let mut c = RuleCatalog::new();
        c.add_item(ItemRule {
            id: "rifle".into(),
            size: 0.2,
            ..ItemRule::default()
        });
        c.add_item(ItemRule {
            id: "crate".into(),
            size: 1.5,
            ..ItemRule::default()
        });
        c.add_item(ItemRule {
            id: "sectoid".into(),
            size: 3.0,
            live_alien: true,
            prison_type: 0,
        });
        Arc::new(c)
    }

    fn rule(f: impl FnOnce(&mut FacilityRule)) -> Arc<FacilityRule> {
        let mut r = FacilityRule::named("r");
        f(&mut r);
        Arc::new(r)
    }

    fn base_with(config: BaseConfig) -> Base {
        Base::new("Alpha", catalog(), config)
    }

    #[test]
    fn test_transitional_storage_follows_policy() {
        let stores = rule(|r| {
            r.storage = 50;
            r.personnel = 10;
            r.build_days = 5;
        });
        let mut f = Facility::built(stores, 0, 0);
        f.build_time = 3;
        f.had_previous_facility = true;

        let mut lenient = CapacityTotals::default();
        lenient.add_facility(&f, &BaseConfig::default());
        assert_eq!(lenient.storage, 50);
        assert_eq!(lenient.quarters, 10);

        let strict_config = BaseConfig {
            storage_limits_enforced: true,
            ..BaseConfig::default()
        };
        let mut strict = CapacityTotals::default();
        strict.add_facility(&f, &strict_config);
        assert_eq!(strict.storage, 0);
        assert_eq!(strict.quarters, 10);

        let off = BaseConfig {
            count_transitional_capacity: false,
            ..BaseConfig::default()
        };
        let mut none = CapacityTotals::default();
        none.add_facility(&f, &off);
        assert_eq!(none, CapacityTotals::default());
    }

    #[test]
    fn test_disabled_and_unfinished_facilities_provide_nothing() {
        let lab = rule(|r| {
            r.laboratories = 50;
            r.build_days = 10;
        });
        let mut building = Facility::built(Arc::clone(&lab), 0, 0);
        building.build_time = 4;
        let mut disabled = Facility::built(lab, 1, 0);
        disabled.disabled = true;

        let mut totals = CapacityTotals::default();
        totals.add_facility(&building, &BaseConfig::default());
        totals.add_facility(&disabled, &BaseConfig::default());
        assert_eq!(totals.laboratories, 0);
    }

    #[test]
    fn test_rebuilt_hangar_keeps_parked_craft_slot() {
        let big = rule(|r| {
            r.size = 2;
            r.hangars = 2;
            r.build_days = 5;
        });
        let mut rebuilding = Facility::built(big, 0, 0);
        rebuilding.build_time = 5;
        rebuilding.had_previous_facility = true;

        let mut empty = CapacityTotals::default();
        empty.add_facility(&rebuilding, &BaseConfig::default());
        assert_eq!(empty.hangars, 0);

        rebuilding.craft = Some(4);
        let off = BaseConfig {
            count_transitional_capacity: false,
            ..BaseConfig::default()
        };
        let mut hosting = CapacityTotals::default();
        hosting.add_facility(&rebuilding, &off);
        assert_eq!(hosting.hangars, 1);

        rebuilding.disabled = true;
        let mut disabled = CapacityTotals::default();
        disabled.add_facility(&rebuilding, &off);
        assert_eq!(disabled.hangars, 0);
    }

    #[test]
    fn test_radar_split_uses_threshold() {
        let short = rule(|r| r.radar_range = 1000);
        let long = rule(|r| r.radar_range = 1500);
        let mut totals = CapacityTotals::default();
        let config = BaseConfig::default();
        totals.add_facility(&Facility::built(short, 0, 0), &config);
        totals.add_facility(&Facility::built(long, 1, 0), &config);
        assert_eq!(totals.get(Resource::ShortRangeRadar), 1);
        assert_eq!(totals.get(Resource::LongRangeRadar), 1);
    }

    #[test]
    fn test_overfull_uses_two_decimal_rounding() {
        assert!(!storage_overfull(50.004, 50));
        assert!(storage_overfull(50.006, 50));
        assert!(!storage_overfull(0.0, 0));
    }

    #[test]
    fn test_used_counts_come_from_dependents() {
        let mut b = base_with(BaseConfig::default());
        b.insert_facility(Facility::built(
            rule(|r| {
                r.storage = 10;
                r.containment = 4;
            }),
            0,
            0,
        ));
        b.add_items("rifle", 10);
        b.add_items("sectoid", 2);
        b.crafts.push(Craft {
            id: 1,
            rule: "interceptor".into(),
            cargo: BTreeMap::from([("crate".to_string(), 2)]),
        });
        b.transfers.push(Transfer {
            id: 2,
            cargo: TransferCargo::Item {
                item: "rifle".into(),
                quantity: 5,
            },
            hours: 24,
        });
        b.transfers.push(Transfer {
            id: 3,
            cargo: TransferCargo::Engineers(3),
            hours: 24,
        });
        b.soldiers.push(Soldier {
            id: 4,
            name: "Ana".into(),
            craft: Some(1),
            psi_training: true,
            training: false,
        });
        b.idle_scientists = 2;
        b.research.push(ResearchProject {
            id: 5,
            topic: "sectoid autopsy".into(),
            scientists: 3,
            requires: BaseFunctions::LAB_SERVICE,
            held_item: Some("sectoid".into()),
        });
        b.productions.push(Production {
            id: 6,
            item: "interceptor".into(),
            engineers: 4,
            required_space: 10,
            produces_craft: true,
            requires: BaseFunctions::WORKSHOP_SERVICE,
        });

        let ledger = b.ledger();
        // 10*0.2 + 2*1.5 + 5*0.2
        assert!((ledger.used_storage() - 6.0).abs() < 1e-9);
        assert_eq!(ledger.used_units(Resource::Containment(0)), 3);
        assert_eq!(ledger.used_units(Resource::Quarters), 1 + 5 + 4 + 3);
        assert_eq!(ledger.used_units(Resource::Laboratories), 3);
        assert_eq!(ledger.used_units(Resource::Workshops), 14);
        assert_eq!(ledger.used_units(Resource::Hangars), 2);
        assert_eq!(ledger.used_units(Resource::PsiLabs), 1);
        assert_eq!(ledger.free(Resource::Containment(0)), 1.0);
        assert!(!ledger.stores_overfull(4.0));
        assert!(ledger.stores_overfull(4.01));
        assert_eq!(
            ledger.required_functions(None),
            BaseFunctions::LAB_SERVICE | BaseFunctions::WORKSHOP_SERVICE
        );
    }

    #[test]
    fn test_function_sets_respect_excluded_area() {
        let mut b = base_with(BaseConfig::default());
        b.insert_facility(Facility::built(
            rule(|r| {
                r.provides = BaseFunctions::POWER;
                r.forbids = BaseFunctions::PSI_TRAINING;
            }),
            0,
            0,
        ));
        let mut unfinished = Facility::built(
            rule(|r| {
                r.provides = BaseFunctions::RADAR;
                r.requires = BaseFunctions::POWER;
                r.build_days = 5;
            }),
            1,
            0,
        );
        unfinished.build_time = 5;
        b.insert_facility(unfinished);

        assert_eq!(b.provided_functions(None), BaseFunctions::POWER);
        assert_eq!(b.required_functions(None), BaseFunctions::POWER);
        assert_eq!(b.forbidden_functions(None), BaseFunctions::PSI_TRAINING);
        let left = Area::new(0, 0, 1);
        assert!(b.provided_functions(Some(&left)).is_empty());
        assert!(b.forbidden_functions(Some(&left)).is_empty());
    }

    #[test]
    fn test_derived_stats_skip_unfinished_facilities() {
        let mut b = base_with(BaseConfig::default());
        b.insert_facility(Facility::built(
            rule(|r| {
                r.monthly_cost = 40;
                r.radar_range = 1500;
                r.radar_chance = 20;
                r.hyperwave = true;
                r.defense = 600;
            }),
            0,
            0,
        ));
        let mut building = Facility::built(
            rule(|r| {
                r.monthly_cost = 100;
                r.mind_shield = true;
                r.build_days = 3;
            }),
            1,
            0,
        );
        building.build_time = 3;
        b.insert_facility(building);

        assert_eq!(b.monthly_maintenance(), 40);
        assert_eq!(b.detection_chance(), 20);
        assert_eq!(b.defense_value(), 600);
        assert!(b.has_hyperwave());
        assert!(!b.has_mind_shield());
        assert!(!b.has_grav_shield());
    }
}
