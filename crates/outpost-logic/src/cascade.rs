//! Committing placements and removing facilities.
//!
//! Every removal path (dismantle, missile hit, build-over, disconnection)
//! ends in the same settlement: the dependents that lost their space are
//! evicted or cancelled, then anything cut off from the lift is destroyed
//! until the layout is connected again.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::base::Base;
use crate::capacity::{CapacityTotals, Resource};
use crate::connectivity::disconnected_facilities;
use crate::grid::{Area, Facility, FacilityId, QUEUED_BUILD_TIME};
use crate::placement::{Adjacency, PlacementResult};
use crate::rules::{FacilityRule, RuleCatalog};
use crate::weighted::WeightedOptions;

/// Why a facility left the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestructionCause {
    Dismantled,
    MissileHit,
    Disconnected,
    BuiltOver,
    BaseLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyedFacilityEvent {
    pub facility: FacilityId,
    pub rule: String,
    pub area: Area,
    pub cause: DestructionCause,
    /// Facilities spawned in its place (rubble, leftovers). A facility
    /// damaged into itself lists its own id.
    pub replaced_by: Vec<FacilityId>,
}

impl DestroyedFacilityEvent {
    fn new(id: FacilityId, facility: &Facility, cause: DestructionCause) -> Self {
        Self {
            facility: id,
            rule: facility.rule.id.clone(),
            area: facility.area(),
            cause,
            replaced_by: Vec::new(),
        }
    }
}

/// What a dismantle paid back and took down with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundSummary {
    pub funds: i64,
    pub items: BTreeMap<String, u32>,
    pub removed: Vec<DestroyedFacilityEvent>,
    pub base_lost: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissileDamageReport {
    pub power: u32,
    /// Sum of footprint cells over every facility hit.
    pub power_spent: u32,
    pub events: Vec<DestroyedFacilityEvent>,
}

/// Dry-run of a dismantle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DismantlePreview {
    pub in_use: PlacementResult,
    pub disconnected: Vec<FacilityId>,
    pub funds: i64,
    pub items: BTreeMap<String, u32>,
    pub base_lost: bool,
}

/// Structural problem found in a loaded layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutIssue {
    OutOfBounds(FacilityId),
    Overlap(FacilityId, FacilityId),
    MissingLift,
    DuplicateLift(Vec<FacilityId>),
    Disconnected(FacilityId),
}

impl Base {
    // ── Placement commit ──

    /// Validate and commit a placement. A build-over removes what it
    /// covers, keeps any parked craft, and settles the base.
    pub fn commit_placement(
        &mut self,
        rule: &Arc<FacilityRule>,
        area: Area,
        replacing: Option<Area>,
    ) -> Result<FacilityId, PlacementResult> {
        self.commit_placement_with_events(rule, area, replacing)
            .map(|(id, _)| id)
    }

    /// [`Base::commit_placement`], also reporting what the build-over and
    /// its settlement removed.
    pub fn commit_placement_with_events(
        &mut self,
        rule: &Arc<FacilityRule>,
        area: Area,
        replacing: Option<Area>,
    ) -> Result<(FacilityId, Vec<DestroyedFacilityEvent>), PlacementResult> {
        let verdict = self.validate_placement(rule, area, replacing);
        if !verdict.is_ok() {
            return Err(verdict);
        }
        let replaced = match replacing {
            Some(_) => self.grid.facilities_intersecting(&area),
            None => Vec::new(),
        };
        if replaced.is_empty() {
            return Ok((self.commit_fresh(rule, area), Vec::new()));
        }
        Ok(self.commit_build_over(rule, area, &replaced))
    }

    fn commit_fresh(&mut self, rule: &Arc<FacilityRule>, area: Area) -> FacilityId {
        let queued =
            self.grid.lift().is_some() && self.adjacency(&area) == Adjacency::QueuedOnly;
        let mut facility = Facility::built(Arc::clone(rule), area.x, area.y);
        facility.build_time = if queued {
            QUEUED_BUILD_TIME
        } else {
            rule.build_days
        };
        let id = self.insert_facility(facility);
        if queued {
            self.recalc_queued_buildings();
        }
        log::info!(
            "{}: placed {} at ({}, {}){}",
            self.name,
            rule.id,
            area.x,
            area.y,
            if queued { ", queued" } else { "" }
        );
        id
    }

    fn commit_build_over(
        &mut self,
        rule: &Arc<FacilityRule>,
        area: Area,
        replaced: &[FacilityId],
    ) -> (FacilityId, Vec<DestroyedFacilityEvent>) {
        let mut removed: Vec<(FacilityId, Facility)> = replaced
            .iter()
            .rev()
            .filter_map(|&id| self.grid.facilities.remove(id).map(|f| (id, f)))
            .collect();

        let mut parked: Vec<u32> = Vec::new();
        for (_, facility) in removed.iter_mut() {
            parked.extend(facility.craft.take());
        }

        let mut incoming = Facility::built(Arc::clone(rule), area.x, area.y);
        incoming.build_time = rule.build_days;
        incoming.had_previous_facility = rule.build_days > 0;
        if rule.hangars > 0 && !parked.is_empty() {
            incoming.craft = Some(parked.remove(0));
        }
        let new_id = self.insert_facility(incoming);
        for craft in parked {
            match self.free_hangar(&[new_id]) {
                Some(hangar) => {
                    if let Some(f) = self.grid.get_mut(hangar) {
                        f.craft = Some(craft);
                    }
                }
                None => log::debug!("{}: craft {craft} has no hangar after rebuild", self.name),
            }
        }

        let mut events = Vec::with_capacity(removed.len());
        for (id, facility) in &removed {
            log::info!(
                "{}: {} at ({}, {}) built over by {}",
                self.name,
                facility.rule.id,
                facility.x,
                facility.y,
                rule.id
            );
            let mut event = DestroyedFacilityEvent::new(*id, facility, DestructionCause::BuiltOver);
            event.replaced_by.push(new_id);
            events.push(event);
            self.settle_after_removal(facility);
        }
        events.extend(self.destroy_disconnected());
        self.recalc_queued_buildings();
        (new_id, events)
    }

    // ── Dismantle ──

    /// Dismantle a facility. Returns `None` for an unknown id.
    ///
    /// Dismantling the access lift removes the whole base.
    pub fn dismantle(&mut self, id: FacilityId) -> Option<RefundSummary> {
        let facility = self.grid.get(id)?;
        let (funds, items) = refund_for(facility);
        let is_lift = facility.rule.access_lift;
        let finished = facility.is_operational();

        let mut summary = RefundSummary {
            funds,
            items,
            ..RefundSummary::default()
        };
        if is_lift {
            self.abandon(id, &mut summary);
            return Some(summary);
        }

        let removed = self.grid.facilities.remove(id)?;
        for (item, &qty) in &summary.items {
            self.add_items(item, qty);
        }
        let mut event = DestroyedFacilityEvent::new(id, &removed, DestructionCause::Dismantled);
        if finished {
            event.replaced_by = self.spawn_leftovers(&removed);
        }
        log::info!(
            "{}: dismantled {} at ({}, {}), refund {}",
            self.name,
            removed.rule.id,
            removed.x,
            removed.y,
            summary.funds
        );
        summary.removed.push(event);
        self.settle_after_removal(&removed);
        summary.removed.extend(self.destroy_disconnected());
        self.recalc_queued_buildings();
        Some(summary)
    }

    /// Dry-run of [`Base::dismantle`].
    pub fn dismantle_preview(&self, id: FacilityId) -> Option<DismantlePreview> {
        let facility = self.grid.get(id)?;
        let (funds, items) = refund_for(facility);
        let base_lost = facility.rule.access_lift;
        let leaves_cover = facility.is_operational()
            && facility
                .rule
                .leaves_behind_on_sell
                .iter()
                .any(|r| self.catalog.facility(r).is_some());
        let in_use = if base_lost {
            PlacementResult::Ok
        } else {
            self.is_area_in_use(facility.area(), None)
        };
        let disconnected = if leaves_cover {
            Vec::new()
        } else {
            disconnected_facilities(&self.grid, Some(id))
        };
        Some(DismantlePreview {
            in_use,
            disconnected,
            funds,
            items,
            base_lost,
        })
    }

    fn abandon(&mut self, lift: FacilityId, summary: &mut RefundSummary) {
        for id in self.grid.ids_in_scan_order() {
            if let Some(f) = self.grid.get(id) {
                let cause = if id == lift {
                    DestructionCause::Dismantled
                } else {
                    DestructionCause::BaseLost
                };
                summary.removed.push(DestroyedFacilityEvent::new(id, f, cause));
            }
        }
        summary.base_lost = true;
        log::info!(
            "{}: access lift dismantled, base with {} facilities lost",
            self.name,
            summary.removed.len()
        );
        self.clear();
    }

    /// Spawn the facilities a finished facility leaves behind when sold.
    fn spawn_leftovers(&mut self, removed: &Facility) -> Vec<FacilityId> {
        let catalog = Arc::clone(&self.catalog);
        let rule = &removed.rule;
        let leftovers: Vec<Arc<FacilityRule>> = rule
            .leaves_behind_on_sell
            .iter()
            .filter_map(|id| {
                let found = catalog.facility(id);
                if found.is_none() {
                    log::warn!("{}: unknown leftover facility {id}", rule.id);
                }
                found
            })
            .collect();
        let Some(first) = leftovers.first() else {
            return Vec::new();
        };

        let make = |leftover: &Arc<FacilityRule>, x: i32, y: i32| {
            let mut f = Facility::built(Arc::clone(leftover), x, y);
            f.build_time = rule.removal_days;
            f.had_previous_facility = rule.removal_days > 0;
            f
        };
        if first.size == rule.size {
            let f = make(first, removed.x, removed.y);
            return vec![self.insert_facility(f)];
        }
        let singles: Vec<&Arc<FacilityRule>> = leftovers.iter().filter(|r| r.size == 1).collect();
        if singles.is_empty() {
            return Vec::new();
        }
        let cells: Vec<(i32, i32)> = removed.area().cells().collect();
        cells
            .into_iter()
            .enumerate()
            .map(|(i, (cx, cy))| {
                let f = make(singles[i % singles.len()], cx, cy);
                self.insert_facility(f)
            })
            .collect()
    }

    // ── Missile damage ──

    /// Hit the base with `power` worth of missiles.
    ///
    /// Targets are drawn by missile attraction until the footprint cells
    /// destroyed reach `power`. The lift and zero-attraction facilities are
    /// never targeted and no facility is hit twice in one strike.
    pub fn apply_missile_damage<R: Rng + ?Sized>(
        &mut self,
        power: u32,
        rng: &mut R,
    ) -> MissileDamageReport {
        let catalog = Arc::clone(&self.catalog);
        let placeholder = catalog.destroyed_facility();
        let mut report = MissileDamageReport {
            power,
            ..MissileDamageReport::default()
        };
        let mut touched: Vec<FacilityId> = Vec::new();

        while report.power_spent < power {
            let mut options = WeightedOptions::new();
            for (id, f) in self.grid.iter() {
                if !f.rule.access_lift && !touched.contains(&id) {
                    options.set(id, f.rule.missile_attraction);
                }
            }
            let Some(&target) = options.choose(rng) else {
                break;
            };
            touched.push(target);
            let Some(cells) = self.grid.get(target).map(|f| f.rule.cell_count()) else {
                break;
            };
            let Some(event) = self.damage_facility(target, placeholder.as_ref(), &catalog) else {
                break;
            };
            report.power_spent += cells;
            touched.extend(event.replaced_by.iter().copied());
            report.events.push(event);
        }

        // Rubble keeps the grid connected; without it the strike can cut
        // off whatever lay behind the craters.
        if placeholder.is_none() {
            report.events.extend(self.destroy_disconnected());
        }
        self.recalc_queued_buildings();
        log::info!(
            "{}: missile strike of power {} hit {} facilities",
            self.name,
            power,
            report
                .events
                .iter()
                .filter(|e| e.cause == DestructionCause::MissileHit)
                .count()
        );
        report
    }

    fn damage_facility(
        &mut self,
        id: FacilityId,
        placeholder: Option<&Arc<FacilityRule>>,
        catalog: &RuleCatalog,
    ) -> Option<DestroyedFacilityEvent> {
        let facility = self.grid.get(id)?;
        let rule = Arc::clone(&facility.rule);
        let area = facility.area();
        let variant = rule
            .destroyed_variant
            .as_deref()
            .and_then(|v| catalog.facility(v));

        if variant.as_ref().is_some_and(|v| v.id == rule.id) {
            let mut event = DestroyedFacilityEvent::new(id, facility, DestructionCause::MissileHit);
            event.replaced_by.push(id);
            // Its parked craft stays put; only the capacity goes.
            let mut before = facility.clone();
            before.craft = None;
            if let Some(f) = self.grid.get_mut(id) {
                f.disabled = true;
            }
            log::debug!("{}: {} disabled by missile", self.name, rule.id);
            self.settle_after_removal(&before);
            return Some(event);
        }

        let mut removed = self.grid.facilities.remove(id)?;
        let mut event = DestroyedFacilityEvent::new(id, &removed, DestructionCause::MissileHit);
        match (variant, placeholder) {
            (Some(variant), _) => {
                let mut rubble = Facility::built(Arc::clone(&variant), area.x, area.y);
                if variant.hangars > 0 {
                    rubble.craft = removed.craft.take();
                }
                event.replaced_by.push(self.insert_facility(rubble));
            }
            (None, Some(placeholder)) => {
                for (cx, cy) in area.cells() {
                    let rubble = Facility::built(Arc::clone(placeholder), cx, cy);
                    event.replaced_by.push(self.insert_facility(rubble));
                }
            }
            (None, None) => {}
        }
        log::debug!(
            "{}: {} at ({}, {}) destroyed by missile",
            self.name,
            rule.id,
            area.x,
            area.y
        );
        self.settle_after_removal(&removed);
        Some(event)
    }

    // ── Settlement ──

    /// Destroy everything not reachable from the lift, repeating until the
    /// layout is connected. Each pass selects first and removes after.
    pub fn destroy_disconnected(&mut self) -> Vec<DestroyedFacilityEvent> {
        let mut events = Vec::new();
        loop {
            let cut = disconnected_facilities(&self.grid, None);
            if cut.is_empty() {
                break;
            }
            for &id in cut.iter().rev() {
                let Some(removed) = self.grid.facilities.remove(id) else {
                    continue;
                };
                log::info!(
                    "{}: {} at ({}, {}) lost connection and was destroyed",
                    self.name,
                    removed.rule.id,
                    removed.x,
                    removed.y
                );
                events.push(DestroyedFacilityEvent::new(
                    id,
                    &removed,
                    DestructionCause::Disconnected,
                ));
                self.settle_after_removal(&removed);
            }
        }
        events
    }

    /// Bring dependents back within capacity after `removed` left the grid.
    /// Only resources the removed facility was actually providing are
    /// touched, so an overflow that predates the removal stays put.
    fn settle_after_removal(&mut self, removed: &Facility) {
        let mut lost = CapacityTotals::default();
        lost.add_facility(removed, &self.config);
        if let Some(craft) = removed.craft {
            self.scrap_craft(craft);
        }
        if lost.hangars > 0 {
            self.fit_hangars();
        }
        if lost.psi_labs > 0 {
            self.evict_trainees(Resource::PsiLabs);
        }
        if lost.training > 0 {
            self.evict_trainees(Resource::Training);
        }
        if lost.laboratories > 0 {
            self.release_scientists();
        }
        if lost.workshops > 0 {
            self.release_engineers();
        }
        if lost.storage > 0 {
            self.cancel_item_transfers();
        }
        if lost.quarters > 0 {
            self.cancel_personnel_transfers();
        }
    }

    fn deficit(&self, resource: Resource) -> i64 {
        let ledger = self.ledger();
        ledger.used_units(resource) - ledger.available(resource)
    }

    /// Unload and delete a craft whose hangar is gone.
    fn scrap_craft(&mut self, craft_id: u32) {
        let Some(pos) = self.crafts.iter().position(|c| c.id == craft_id) else {
            return;
        };
        let craft = self.crafts.remove(pos);
        for soldier in self.soldiers.iter_mut().filter(|s| s.craft == Some(craft_id)) {
            soldier.craft = None;
        }
        for (item, qty) in &craft.cargo {
            self.add_items(item, *qty);
        }
        log::debug!("{}: craft {} scrapped with its hangar", self.name, craft.id);
    }

    fn fit_hangars(&mut self) {
        let mut deficit = self.deficit(Resource::Hangars);
        while deficit > 0 {
            if let Some(pos) = self.productions.iter().rposition(|p| p.produces_craft) {
                let cancelled = self.productions.remove(pos);
                self.idle_engineers += cancelled.engineers;
                log::debug!("{}: craft production {} cancelled", self.name, cancelled.item);
            } else if let Some(pos) = self.transfers.iter().rposition(|t| t.is_craft()) {
                let cancelled = self.transfers.remove(pos);
                log::debug!("{}: craft transfer {} cancelled", self.name, cancelled.id);
            } else {
                break;
            }
            deficit -= 1;
        }
    }

    fn evict_trainees(&mut self, resource: Resource) {
        let mut deficit = self.deficit(resource);
        for soldier in self.soldiers.iter_mut() {
            if deficit <= 0 {
                break;
            }
            let flag = match resource {
                Resource::PsiLabs => &mut soldier.psi_training,
                _ => &mut soldier.training,
            };
            if *flag {
                *flag = false;
                deficit -= 1;
            }
        }
    }

    fn release_scientists(&mut self) {
        let mut deficit = self.deficit(Resource::Laboratories).max(0) as u32;
        for project in self.research.iter_mut() {
            if deficit == 0 {
                break;
            }
            let taken = project.scientists.min(deficit);
            project.scientists -= taken;
            self.idle_scientists += taken;
            deficit -= taken;
        }
    }

    fn release_engineers(&mut self) {
        let mut deficit = self.deficit(Resource::Workshops);
        while deficit > 0 {
            let Some(first) = self.productions.first_mut() else {
                break;
            };
            if first.engineers as i64 >= deficit {
                first.engineers -= deficit as u32;
                self.idle_engineers += deficit as u32;
                break;
            }
            let cancelled = self.productions.remove(0);
            self.idle_engineers += cancelled.engineers;
            deficit -= (cancelled.engineers + cancelled.required_space) as i64;
            log::debug!("{}: production {} cancelled", self.name, cancelled.item);
        }
    }

    fn cancel_item_transfers(&mut self) {
        while self.ledger().stores_overfull(0.0) {
            let Some(pos) = self.transfers.iter().rposition(|t| t.is_item()) else {
                break;
            };
            let cancelled = self.transfers.remove(pos);
            log::debug!("{}: item transfer {} cancelled", self.name, cancelled.id);
        }
    }

    fn cancel_personnel_transfers(&mut self) {
        while self.deficit(Resource::Quarters) > 0 {
            let Some(pos) = self.transfers.iter().rposition(|t| t.personnel() > 0) else {
                break;
            };
            let cancelled = self.transfers.remove(pos);
            log::debug!("{}: personnel transfer {} cancelled", self.name, cancelled.id);
        }
    }

    // ── Audit ──

    /// Structural problems in the current layout, each logged at warn.
    pub fn audit_layout(&self) -> Vec<LayoutIssue> {
        let mut issues = Vec::new();
        let ids = self.grid.ids_in_scan_order();
        let areas: Vec<(FacilityId, Area)> = ids
            .iter()
            .filter_map(|&id| self.grid.get(id).map(|f| (id, f.area())))
            .collect();

        for (id, area) in &areas {
            if !area.in_bounds() {
                issues.push(LayoutIssue::OutOfBounds(*id));
            }
        }
        for (i, (a, area_a)) in areas.iter().enumerate() {
            for (b, area_b) in &areas[i + 1..] {
                if area_a.intersects(area_b) {
                    issues.push(LayoutIssue::Overlap(*a, *b));
                }
            }
        }
        let lifts: Vec<FacilityId> = ids
            .iter()
            .copied()
            .filter(|&id| self.grid.get(id).is_some_and(|f| f.rule.access_lift))
            .collect();
        match lifts.len() {
            0 if !ids.is_empty() => issues.push(LayoutIssue::MissingLift),
            0 | 1 => {}
            _ => issues.push(LayoutIssue::DuplicateLift(lifts.clone())),
        }
        if lifts.len() == 1 {
            issues.extend(
                disconnected_facilities(&self.grid, None)
                    .into_iter()
                    .map(LayoutIssue::Disconnected),
            );
        }

        for issue in &issues {
            log::warn!("{}: layout issue {issue:?}", self.name);
        }
        issues
    }
}

/// Funds and items a dismantle returns. A facility still waiting in the
/// queue refunds its full cost; anything started refunds the rule's
/// refund value.
fn refund_for(facility: &Facility) -> (i64, BTreeMap<String, u32>) {
    let rule = &facility.rule;
    let queued = facility.is_queued();
    let funds = if queued {
        rule.build_cost
    } else {
        rule.refund_value
    };
    let items = rule
        .build_items
        .iter()
        .map(|(item, cost)| (item.clone(), if queued { cost.build } else { cost.refund }))
        .filter(|(_, qty)| *qty > 0)
        .collect();
    (funds, items)
}
