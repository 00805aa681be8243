//! Base engine - main entry point for driving one base

use std::io::{Read, Write};
use std::sync::Arc;

use outpost_logic::base::Base;
use outpost_logic::capacity::Resource;
use outpost_logic::cascade::{DestroyedFacilityEvent, DismantlePreview, LayoutIssue, RefundSummary};
use outpost_logic::config::{validate_config, BaseConfig};
use outpost_logic::functions::BaseFunctions;
use outpost_logic::grid::{Area, Facility, FacilityId};
use outpost_logic::placement::PlacementResult;
use outpost_logic::rules::{FacilityRule, RuleCatalog};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persistence::{self, SaveData, SaveError};

/// Engine configuration: RNG seed plus the base policy switches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub seed: u64,
    pub base: BaseConfig,
}

/// Failures of engine commands. Placement verdicts other than `Ok` are
/// carried unchanged in [`EngineError::Rejected`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown facility rule `{0}`")]
    UnknownRule(String),
    #[error("no facility {0:?} in this base")]
    UnknownFacility(FacilityId),
    #[error("placement rejected: {0:?}")]
    Rejected(PlacementResult),
    #[error("not enough funds: need {needed}, have {available}")]
    InsufficientFunds { needed: i64, available: i64 },
    #[error("not enough `{item}`: need {needed}, have {available}")]
    MissingItems {
        item: String,
        needed: u32,
        available: u32,
    },
    #[error("rule set has no access lift")]
    NoLiftRule,
}

/// A committed placement and whatever it displaced.
#[derive(Debug, Clone, PartialEq)]
pub struct Placed {
    pub id: FacilityId,
    pub removed: Vec<DestroyedFacilityEvent>,
}

/// One base, its funds, and the RNG missile damage draws from.
pub struct BaseEngine {
    pub base: Base,
    /// Funds available for construction.
    pub funds: i64,
    /// Days elapsed since founding.
    pub day: u32,
    seed: u64,
    rng: StdRng,
}

impl BaseEngine {
    /// Create an engine around an empty base.
    pub fn new(name: impl Into<String>, catalog: Arc<RuleCatalog>, config: EngineConfig) -> Self {
        for problem in validate_config(&config.base) {
            log::warn!("base config: {problem:?}");
        }
        Self {
            base: Base::new(name, catalog, config.base),
            funds: 0,
            day: 0,
            seed: config.seed,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Create a base with a finished access lift at `(x, y)`.
    pub fn found(
        name: impl Into<String>,
        catalog: Arc<RuleCatalog>,
        config: EngineConfig,
        x: i32,
        y: i32,
    ) -> Result<Self, EngineError> {
        let lift = catalog
            .facilities()
            .find(|r| r.access_lift)
            .cloned()
            .ok_or(EngineError::NoLiftRule)?;
        let mut engine = Self::new(name, catalog, config);
        let area = Area::new(x, y, lift.size);
        let verdict = engine.base.validate_placement(&lift, area, None);
        if !verdict.is_ok() {
            return Err(EngineError::Rejected(verdict));
        }
        engine.base.insert_facility(Facility::built(lift, x, y));
        log::info!("{}: founded at ({x}, {y})", engine.base.name);
        Ok(engine)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.base.catalog
    }

    fn rule(&self, id: &str) -> Result<Arc<FacilityRule>, EngineError> {
        self.base
            .catalog
            .facility(id)
            .ok_or_else(|| EngineError::UnknownRule(id.to_string()))
    }

    // ── Placement ──

    pub fn validate_placement(
        &self,
        rule_id: &str,
        area: Area,
        replacing: Option<Area>,
    ) -> Result<PlacementResult, EngineError> {
        let rule = self.rule(rule_id)?;
        Ok(self.base.validate_placement(&rule, area, replacing))
    }

    /// Dry-run removal of `area`, as a hover preview would show it.
    pub fn is_area_in_use(
        &self,
        area: Area,
        replacement: Option<&str>,
    ) -> Result<PlacementResult, EngineError> {
        let rule = replacement.map(|id| self.rule(id)).transpose()?;
        Ok(self.base.is_area_in_use(area, rule.as_deref()))
    }

    /// Check funds and build items without committing anything.
    pub fn can_afford(&self, rule_id: &str) -> Result<(), EngineError> {
        let rule = self.rule(rule_id)?;
        self.check_cost(&rule)
    }

    fn check_cost(&self, rule: &FacilityRule) -> Result<(), EngineError> {
        if self.funds < rule.build_cost {
            return Err(EngineError::InsufficientFunds {
                needed: rule.build_cost,
                available: self.funds,
            });
        }
        for (item, cost) in &rule.build_items {
            let available = self.base.item_count(item);
            if available < cost.build {
                return Err(EngineError::MissingItems {
                    item: item.clone(),
                    needed: cost.build,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Validate, pay for and commit a placement.
    pub fn commit_placement(
        &mut self,
        rule_id: &str,
        area: Area,
        replacing: Option<Area>,
    ) -> Result<Placed, EngineError> {
        let rule = self.rule(rule_id)?;
        let verdict = self.base.validate_placement(&rule, area, replacing);
        if !verdict.is_ok() {
            return Err(EngineError::Rejected(verdict));
        }
        self.check_cost(&rule)?;

        let (id, removed) = self
            .base
            .commit_placement_with_events(&rule, area, replacing)
            .map_err(EngineError::Rejected)?;
        self.funds -= rule.build_cost;
        for (item, cost) in &rule.build_items {
            self.base.remove_items(item, cost.build);
        }
        Ok(Placed { id, removed })
    }

    pub fn buildable_rules(&self) -> Vec<Arc<FacilityRule>> {
        self.base.buildable_rules()
    }

    // ── Removal ──

    /// Dismantle a facility and credit its refund.
    pub fn dismantle(&mut self, id: FacilityId) -> Result<RefundSummary, EngineError> {
        let summary = self
            .base
            .dismantle(id)
            .ok_or(EngineError::UnknownFacility(id))?;
        self.funds += summary.funds;
        Ok(summary)
    }

    pub fn dismantle_preview(&self, id: FacilityId) -> Result<DismantlePreview, EngineError> {
        self.base
            .dismantle_preview(id)
            .ok_or(EngineError::UnknownFacility(id))
    }

    /// Missile strike using the engine's RNG.
    pub fn apply_missile_damage(&mut self, power: u32) -> Vec<DestroyedFacilityEvent> {
        self.base.apply_missile_damage(power, &mut self.rng).events
    }

    // ── Time ──

    /// Advance construction by one day. Returns facilities completed today.
    pub fn advance_day(&mut self) -> Vec<FacilityId> {
        self.day += 1;
        self.base.advance_construction_day()
    }

    /// Charge one month of facility upkeep. Returns the amount charged.
    pub fn pay_maintenance(&mut self) -> i64 {
        let cost = self.base.monthly_maintenance();
        self.funds -= cost;
        log::info!("{}: paid {cost} maintenance", self.base.name);
        cost
    }

    // ── Queries ──

    pub fn available(&self, resource: Resource) -> i64 {
        self.base.available(resource)
    }

    pub fn used(&self, resource: Resource) -> f64 {
        self.base.used(resource)
    }

    pub fn free(&self, resource: Resource) -> f64 {
        self.base.free(resource)
    }

    pub fn provided_functions(&self, excluding: Option<&Area>) -> BaseFunctions {
        self.base.provided_functions(excluding)
    }

    pub fn required_functions(&self, excluding: Option<&Area>) -> BaseFunctions {
        self.base.required_functions(excluding)
    }

    pub fn forbidden_functions(&self, excluding: Option<&Area>) -> BaseFunctions {
        self.base.forbidden_functions(excluding)
    }

    pub fn facility_count(&self) -> usize {
        self.base.facility_count()
    }

    pub fn audit(&self) -> Vec<LayoutIssue> {
        self.base.audit_layout()
    }

    // ── Persistence ──

    /// Save engine state to a writer
    pub fn save<W: Write>(&self, writer: W) -> Result<(), SaveError> {
        let data = SaveData::capture(&self.base, self.seed, self.day, self.funds);
        persistence::save_base(writer, &data)
    }

    /// Write a human-readable JSON snapshot of the base
    pub fn export_json<W: Write>(&self, writer: W) -> Result<(), SaveError> {
        let data = SaveData::capture(&self.base, self.seed, self.day, self.funds);
        persistence::export_json(writer, &data)
    }

    /// Load engine state from a reader, resolving rules against `catalog`.
    ///
    /// The RNG is reseeded from the saved seed and day, so strikes after a
    /// load are deterministic for a given save.
    pub fn load<R: Read>(reader: R, catalog: Arc<RuleCatalog>) -> Result<Self, SaveError> {
        let data = persistence::load_base(reader)?;
        let seed = data.seed;
        let day = data.day;
        let funds = data.funds;
        let base = data.restore(catalog)?;
        Ok(Self {
            base,
            funds,
            day,
            seed,
            rng: StdRng::seed_from_u64(seed ^ u64::from(day)),
        })
    }
}
