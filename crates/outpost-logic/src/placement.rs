//! Placement validation and build queue scheduling.
//!
//! Validation is pure: it simulates the change against the capacity ledger
//! and connectivity, and reports the first problem as a [`PlacementResult`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::base::Base;
use crate::capacity::{storage_overfull, CapacityTotals, Resource};
use crate::connectivity::disconnected_facilities;
use crate::functions::BaseFunctions;
use crate::grid::{Area, Facility, FacilityId, QUEUED_BUILD_TIME};
use crate::rules::FacilityRule;

/// Outcome of a placement check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlacementResult {
    Ok,
    /// Outside the grid, overlapping, or not next to the connected base.
    NotConnected,
    /// Removal would leave something without space or a needed function.
    Used,
    /// A facility in the area is still being built or upgraded.
    Upgrading,
    UpgradeSizeMismatch,
    /// The new rule names what it may replace, and this is not on the list.
    UpgradeRequireSpecific,
    UpgradeDisallowed,
    /// Only unfinished neighbours and the build queue is off.
    QueueDisabled,
    /// Something already in the base forbids what this provides.
    ForbiddenByOther,
    /// This forbids something the base already provides.
    ForbiddenByThis,
}

impl PlacementResult {
    pub fn is_ok(self) -> bool {
        self == PlacementResult::Ok
    }
}

/// How a candidate area touches the connected part of the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Adjacency {
    /// Next to a finished (or upgrading) connected facility.
    Ready,
    /// Next to connected facilities that are all still under construction.
    QueuedOnly,
    Isolated,
}

impl Base {
    /// Check whether `rule` may be placed at `area`, optionally over the
    /// facilities at `replacing`.
    pub fn validate_placement(
        &self,
        rule: &FacilityRule,
        area: Area,
        replacing: Option<Area>,
    ) -> PlacementResult {
        if area.size != rule.size {
            return PlacementResult::UpgradeSizeMismatch;
        }
        if !area.in_bounds() {
            return PlacementResult::NotConnected;
        }
        let Some(replacing) = replacing else {
            return self.validate_fresh(rule, area);
        };
        if !area.contains(&replacing) {
            return PlacementResult::UpgradeSizeMismatch;
        }
        let replaced = self.grid.facilities_intersecting(&area);
        if replaced.is_empty() {
            return self.validate_fresh(rule, area);
        }
        self.validate_build_over(rule, area, &replaced)
    }

    fn validate_fresh(&self, rule: &FacilityRule, area: Area) -> PlacementResult {
        if self.grid.overlaps(&area) {
            return PlacementResult::NotConnected;
        }
        if self.limit_reached(rule, &[]) {
            return PlacementResult::ForbiddenByOther;
        }
        if let Some(forbidden) = self.forbid_conflict(rule, None) {
            return forbidden;
        }
        match self.grid.lift() {
            None if rule.access_lift => PlacementResult::Ok,
            None => PlacementResult::NotConnected,
            Some(_) => match self.adjacency(&area) {
                Adjacency::Ready => PlacementResult::Ok,
                Adjacency::QueuedOnly if self.config.allow_build_queue => PlacementResult::Ok,
                Adjacency::QueuedOnly => PlacementResult::QueueDisabled,
                Adjacency::Isolated => PlacementResult::NotConnected,
            },
        }
    }

    fn validate_build_over(
        &self,
        rule: &FacilityRule,
        area: Area,
        replaced: &[FacilityId],
    ) -> PlacementResult {
        let facilities: Vec<&Facility> =
            replaced.iter().filter_map(|&id| self.grid.get(id)).collect();

        for f in &facilities {
            if rule.build_over.is_empty() {
                if f.area() != area || f.rule.id == rule.id {
                    return PlacementResult::UpgradeDisallowed;
                }
            } else if !rule.build_over.iter().any(|id| *id == f.rule.id) {
                return PlacementResult::UpgradeRequireSpecific;
            }
        }
        if facilities.iter().any(|f| f.build_time > 0) {
            return PlacementResult::Upgrading;
        }
        if facilities.iter().any(|f| !area.contains(&f.area())) {
            return PlacementResult::UpgradeSizeMismatch;
        }
        if facilities.iter().any(|f| f.rule.access_lift) && !rule.access_lift {
            return PlacementResult::UpgradeDisallowed;
        }
        if self.limit_reached(rule, replaced) {
            return PlacementResult::ForbiddenByOther;
        }
        self.is_area_in_use(area, Some(rule))
    }

    /// Dry-run removal of everything in `area`, optionally replaced by
    /// `replacement` in the state it would be committed in.
    ///
    /// Reports `Used` when a function still required would be lost or a
    /// reduced resource would drop below its current use, and the forbid
    /// results when the replacement clashes with what remains.
    pub fn is_area_in_use(
        &self,
        area: Area,
        replacement: Option<&FacilityRule>,
    ) -> PlacementResult {
        let ledger = self.ledger();
        let replaced = self.grid.facilities_intersecting(&area);

        let mut removed = CapacityTotals::default();
        let mut lost_functions = BaseFunctions::empty();
        for f in replaced.iter().filter_map(|&id| self.grid.get(id)) {
            removed.add_facility(f, &self.config);
            if f.conducts() {
                lost_functions |= f.rule.provides;
            }
        }

        let mut added = CapacityTotals::default();
        let mut provided_after = ledger.provided_functions(Some(&area));
        let mut required_after = ledger.required_functions(Some(&area));
        if let Some(rule) = replacement {
            let mut incoming = committed_replacement(rule, area);
            if rule.hangars > 0 {
                incoming.craft = replaced
                    .iter()
                    .rev()
                    .filter_map(|&id| self.grid.get(id))
                    .find_map(|f| f.craft);
            }
            added.add_facility(&incoming, &self.config);
            if incoming.conducts() {
                provided_after |= rule.provides;
            }
            required_after |= rule.requires;
        }

        if !(required_after & lost_functions).difference(provided_after).is_empty() {
            return PlacementResult::Used;
        }

        for resource in Resource::SPACE {
            let lost = removed.get(resource);
            let gained = added.get(resource);
            if lost <= gained {
                continue;
            }
            let remaining = ledger.available(resource) - lost + gained;
            let short = match resource {
                Resource::Storage => storage_overfull(ledger.used_storage(), remaining),
                other => ledger.used_units(other) > remaining,
            };
            if short {
                return PlacementResult::Used;
            }
        }
        for (&prison, &lost) in &removed.containment {
            let resource = Resource::Containment(prison);
            let gained = added.get(resource);
            if lost > gained
                && ledger.used_units(resource) > ledger.available(resource) - lost + gained
            {
                return PlacementResult::Used;
            }
        }

        match replacement {
            Some(rule) => self
                .forbid_conflict(rule, Some(&area))
                .unwrap_or(PlacementResult::Ok),
            None => PlacementResult::Ok,
        }
    }

    // ── Build list ──

    /// Whether `rule` may appear in the build list: required functions are
    /// present, no forbids clash, and the per-base limit is not reached.
    pub fn can_build(&self, rule: &FacilityRule) -> bool {
        let provided = self.provided_functions(None);
        provided.covers(rule.requires)
            && !self.limit_reached(rule, &[])
            && self.forbid_conflict(rule, None).is_none()
    }

    pub fn buildable_rules(&self) -> Vec<Arc<FacilityRule>> {
        self.catalog
            .facilities()
            .filter(|rule| self.can_build(rule))
            .cloned()
            .collect()
    }

    fn limit_reached(&self, rule: &FacilityRule, replaced: &[FacilityId]) -> bool {
        if rule.access_lift {
            let other_lift = self
                .grid
                .iter()
                .any(|(id, f)| f.rule.access_lift && !replaced.contains(&id));
            if other_lift {
                return true;
            }
        }
        let Some(limit) = rule.base_limit() else {
            return false;
        };
        let existing = self
            .grid
            .iter()
            .filter(|(id, f)| f.rule.id == rule.id && !replaced.contains(id))
            .count() as u32;
        existing >= limit
    }

    fn forbid_conflict(
        &self,
        rule: &FacilityRule,
        excluding: Option<&Area>,
    ) -> Option<PlacementResult> {
        let ledger = self.ledger();
        if rule.provides.intersects(ledger.forbidden_functions(excluding)) {
            return Some(PlacementResult::ForbiddenByOther);
        }
        if rule.forbids.intersects(ledger.provided_functions(excluding)) {
            return Some(PlacementResult::ForbiddenByThis);
        }
        None
    }

    pub(crate) fn adjacency(&self, area: &Area) -> Adjacency {
        let disconnected = disconnected_facilities(&self.grid, None);
        let map = self.grid.cell_map(None);
        let mut queued = false;
        for (cx, cy) in area.neighbors() {
            let Some(id) = map[cy as usize][cx as usize] else {
                continue;
            };
            if disconnected.contains(&id) {
                continue;
            }
            match self.grid.get(id) {
                Some(f) if f.rule.access_lift || f.conducts() => return Adjacency::Ready,
                Some(_) => queued = true,
                None => {}
            }
        }
        if queued {
            Adjacency::QueuedOnly
        } else {
            Adjacency::Isolated
        }
    }

    // ── Build queue ──

    /// Recompute start times of queued facilities.
    ///
    /// A queued facility starts when its earliest-finishing neighbour is
    /// done, so its remaining time is its own build days plus that
    /// neighbour's remaining time. Neighbours that are themselves queued
    /// chain, which makes this a shortest-path pass over unfinished
    /// facilities.
    pub fn recalc_queued_buildings(&mut self) {
        let map = self.grid.cell_map(None);
        let mut pending: Vec<FacilityId> = self
            .grid
            .ids_in_scan_order()
            .into_iter()
            .filter(|&id| self.grid.get(id).is_some_and(|f| f.build_time > 0))
            .collect();

        for &id in &pending {
            let Some(f) = self.grid.get(id) else { continue };
            if !f.is_queued() {
                continue;
            }
            let area = f.area();
            let starts_now = area.neighbors().into_iter().any(|(cx, cy)| {
                map[cy as usize][cx as usize]
                    .and_then(|n| self.grid.get(n))
                    .is_some_and(|n| n.is_operational())
            });
            if let Some(f) = self.grid.get_mut(id) {
                f.build_time = if starts_now {
                    f.rule.build_days
                } else {
                    QUEUED_BUILD_TIME
                };
            }
        }

        while !pending.is_empty() {
            let Some((pos, done_at)) = pending
                .iter()
                .enumerate()
                .filter_map(|(i, &id)| self.grid.get(id).map(|f| (i, f.build_time)))
                .min_by_key(|&(_, t)| t)
            else {
                break;
            };
            let current = pending.remove(pos);
            if done_at == QUEUED_BUILD_TIME {
                log::debug!(
                    "{}: {} queued facilities have no start",
                    self.name,
                    pending.len() + 1
                );
                break;
            }
            let Some(area) = self.grid.get(current).map(|f| f.area()) else {
                continue;
            };
            for (cx, cy) in area.neighbors() {
                let Some(next) = map[cy as usize][cx as usize] else {
                    continue;
                };
                if !pending.contains(&next) {
                    continue;
                }
                if let Some(f) = self.grid.get_mut(next) {
                    if f.is_queued() {
                        let start = f.rule.build_days.saturating_add(done_at);
                        f.build_time = f.build_time.min(start);
                    }
                }
            }
        }
    }
}

/// The replacement half of a build-over as it will be committed.
pub(crate) fn committed_replacement(rule: &FacilityRule, area: Area) -> Facility {
    let mut facility = Facility::built(Arc::new(rule.clone()), area.x, area.y);
    facility.build_time = rule.build_days;
    facility.had_previous_facility = rule.build_days > 0;
    facility
}
