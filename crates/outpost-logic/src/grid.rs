//! Base grid geometry and facility storage.
//!
//! The grid is a fixed 6×6 square. Facilities live in a generational arena so
//! that ids taken before a cascade stay valid (or detectably stale) while
//! other facilities are removed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::rules::FacilityRule;

/// Edge length of every base grid.
pub const BASE_SIZE: i32 = 6;

/// Build-time sentinel for a facility whose queue position is not yet known.
pub const QUEUED_BUILD_TIME: u32 = u32::MAX;

// ── Areas ──

/// Square footprint anchored at its top-left cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Area {
    pub x: i32,
    pub y: i32,
    pub size: i32,
}

impl Area {
    pub fn new(x: i32, y: i32, size: i32) -> Self {
        Self { x, y, size }
    }

    /// Whether cell `(cx, cy)` lies inside this area.
    pub fn contains_cell(&self, cx: i32, cy: i32) -> bool {
        cx >= self.x && cx < self.x + self.size && cy >= self.y && cy < self.y + self.size
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (self.y..self.y + self.size)
            .flat_map(move |cy| (self.x..self.x + self.size).map(move |cx| (cx, cy)))
    }

    /// Two areas intersect iff their cell sets share a cell.
    pub fn intersects(&self, other: &Area) -> bool {
        self.x < other.x + other.size
            && other.x < self.x + self.size
            && self.y < other.y + other.size
            && other.y < self.y + self.size
    }

    /// Whether `other` lies entirely inside this area.
    pub fn contains(&self, other: &Area) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.size <= self.x + self.size
            && other.y + other.size <= self.y + self.size
    }

    pub fn in_bounds(&self) -> bool {
        self.size > 0
            && self.x >= 0
            && self.y >= 0
            && self.x + self.size <= BASE_SIZE
            && self.y + self.size <= BASE_SIZE
    }

    /// In-bounds cells 4-adjacent to the area but outside it.
    pub fn neighbors(&self) -> Vec<(i32, i32)> {
        let mut out = Vec::with_capacity(4 * self.size.max(0) as usize);
        for i in 0..self.size {
            out.push((self.x + i, self.y - 1));
            out.push((self.x + i, self.y + self.size));
            out.push((self.x - 1, self.y + i));
            out.push((self.x + self.size, self.y + i));
        }
        out.retain(|&(cx, cy)| cell_in_bounds(cx, cy));
        out
    }
}

pub fn cell_in_bounds(cx: i32, cy: i32) -> bool {
    (0..BASE_SIZE).contains(&cx) && (0..BASE_SIZE).contains(&cy)
}

// ── Facilities ──

/// Stable handle to a facility; stale after the facility is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FacilityId {
    pub index: u32,
    pub generation: u32,
}

/// A placed facility.
#[derive(Debug, Clone)]
pub struct Facility {
    pub rule: Arc<FacilityRule>,
    pub x: i32,
    pub y: i32,
    /// Days of construction left. 0 = operational; above `rule.build_days`
    /// means queued behind an unfinished neighbour.
    pub build_time: u32,
    /// Excluded from capacity and defense totals.
    pub disabled: bool,
    /// Set while this facility replaces an earlier one (upgrade/downgrade).
    pub had_previous_facility: bool,
    /// Craft parked in this hangar.
    pub craft: Option<u32>,
}

impl Facility {
    /// Finished facility at `(x, y)`.
    pub fn built(rule: Arc<FacilityRule>, x: i32, y: i32) -> Self {
        Self {
            rule,
            x,
            y,
            build_time: 0,
            disabled: false,
            had_previous_facility: false,
            craft: None,
        }
    }

    pub fn area(&self) -> Area {
        Area::new(self.x, self.y, self.rule.size)
    }

    pub fn is_operational(&self) -> bool {
        self.build_time == 0
    }

    pub fn is_queued(&self) -> bool {
        self.build_time > self.rule.build_days
    }

    pub fn is_upgrading(&self) -> bool {
        self.build_time > 0 && self.had_previous_facility
    }

    /// Whether connectivity passes through this facility.
    pub fn conducts(&self) -> bool {
        self.is_operational() || self.had_previous_facility
    }

    /// Tick one day of construction. Returns true when it just finished.
    pub fn advance_build_day(&mut self) -> bool {
        if self.build_time == 0 {
            return false;
        }
        self.build_time -= 1;
        if self.build_time == 0 {
            self.had_previous_facility = false;
            true
        } else {
            false
        }
    }
}

// ── Arena ──

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    facility: Option<Facility>,
}

/// Generation-indexed facility storage.
#[derive(Debug, Clone, Default)]
pub struct FacilityArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl FacilityArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, facility: Facility) -> FacilityId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.facility = Some(facility);
            return FacilityId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            facility: Some(facility),
        });
        FacilityId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: FacilityId) -> Option<&Facility> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.facility.as_ref())
    }

    pub fn get_mut(&mut self, id: FacilityId) -> Option<&mut Facility> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.facility.as_mut())
    }

    /// Remove and return a facility; its id becomes stale.
    pub fn remove(&mut self, id: FacilityId) -> Option<Facility> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let facility = slot.facility.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(facility)
    }

    pub fn contains(&self, id: FacilityId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live facilities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (FacilityId, &Facility)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.facility.as_ref().map(|f| {
                (
                    FacilityId {
                        index: i as u32,
                        generation: s.generation,
                    },
                    f,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (FacilityId, &mut Facility)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.facility.as_mut().map(|f| {
                (
                    FacilityId {
                        index: i as u32,
                        generation,
                    },
                    f,
                )
            })
        })
    }

    pub fn ids(&self) -> Vec<FacilityId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn clear(&mut self) {
        let ids = self.ids();
        for id in ids {
            self.remove(id);
        }
    }
}

// ── Grid ──

/// Per-cell owner map, indexed `[y][x]`.
pub type CellMap = [[Option<FacilityId>; BASE_SIZE as usize]; BASE_SIZE as usize];

/// Spatial view over a base's facilities.
#[derive(Debug, Clone, Default)]
pub struct BaseGrid {
    pub facilities: FacilityArena,
}

impl BaseGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FacilityId) -> Option<&Facility> {
        self.facilities.get(id)
    }

    pub fn get_mut(&mut self, id: FacilityId) -> Option<&mut Facility> {
        self.facilities.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FacilityId, &Facility)> {
        self.facilities.iter()
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    /// Facility covering cell `(cx, cy)`.
    pub fn facility_at(&self, cx: i32, cy: i32) -> Option<FacilityId> {
        self.iter()
            .find(|(_, f)| f.area().contains_cell(cx, cy))
            .map(|(id, _)| id)
    }

    /// Facilities whose footprint intersects `area`, in grid scan order.
    pub fn facilities_intersecting(&self, area: &Area) -> Vec<FacilityId> {
        let mut hits: Vec<(FacilityId, i32, i32)> = self
            .iter()
            .filter(|(_, f)| f.area().intersects(area))
            .map(|(id, f)| (id, f.y, f.x))
            .collect();
        hits.sort_by_key(|&(_, y, x)| (y, x));
        hits.into_iter().map(|(id, _, _)| id).collect()
    }

    /// Whether any facility overlaps `area`.
    pub fn overlaps(&self, area: &Area) -> bool {
        self.iter().any(|(_, f)| f.area().intersects(area))
    }

    /// Cell ownership map, skipping `excluding`.
    pub fn cell_map(&self, excluding: Option<FacilityId>) -> CellMap {
        let mut map: CellMap = [[None; BASE_SIZE as usize]; BASE_SIZE as usize];
        for (id, f) in self.iter() {
            if Some(id) == excluding {
                continue;
            }
            for (cx, cy) in f.area().cells() {
                if cell_in_bounds(cx, cy) {
                    map[cy as usize][cx as usize] = Some(id);
                }
            }
        }
        map
    }

    /// The access lift, if any.
    pub fn lift(&self) -> Option<FacilityId> {
        self.iter()
            .find(|(_, f)| f.rule.access_lift)
            .map(|(id, _)| id)
    }

    /// All ids sorted by grid scan order (row, then column).
    pub fn ids_in_scan_order(&self) -> Vec<FacilityId> {
        let mut ids: Vec<(FacilityId, i32, i32)> =
            self.iter().map(|(id, f)| (id, f.y, f.x)).collect();
        ids.sort_by_key(|&(_, y, x)| (y, x));
        ids.into_iter().map(|(id, _, _)| id).collect()
    }

    pub fn count_of(&self, rule_id: &str) -> u32 {
        self.iter().filter(|(_, f)| f.rule.id == rule_id).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(size: i32) -> Arc<FacilityRule> {
        Arc::new(FacilityRule {
            size,
            ..FacilityRule::named(format!("r{size}"))
        })
    }

    #[test]
    fn test_area_intersection_is_cell_based() {
        let a = Area::new(0, 0, 2);
        assert!(a.intersects(&Area::new(1, 1, 1)));
        assert!(!a.intersects(&Area::new(2, 0, 1)));
        assert!(!a.intersects(&Area::new(0, 2, 3)));
        assert!(Area::new(1, 1, 3).intersects(&Area::new(3, 3, 1)));
    }

    #[test]
    fn test_bounds_cover_the_six_by_six_grid() {
        assert!(Area::new(0, 0, 6).in_bounds());
        assert!(Area::new(4, 4, 2).in_bounds());
        assert!(!Area::new(5, 5, 2).in_bounds());
        assert!(!Area::new(-1, 0, 1).in_bounds());
        assert!(!Area::new(0, 0, 0).in_bounds());
    }

    #[test]
    fn test_neighbors_exclude_footprint_and_out_of_bounds() {
        let n = Area::new(0, 0, 2).neighbors();
        assert_eq!(n.len(), 4);
        assert!(n.contains(&(2, 0)));
        assert!(n.contains(&(0, 2)));
        assert!(!n.contains(&(1, 1)));
        assert_eq!(Area::new(2, 2, 1).neighbors().len(), 4);
    }

    #[test]
    fn test_cells_are_row_major() {
        let cells: Vec<_> = Area::new(1, 2, 2).cells().collect();
        assert_eq!(cells, vec![(1, 2), (2, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_arena_ids_go_stale_after_removal() {
        let mut arena = FacilityArena::new();
        let a = arena.insert(Facility::built(rule(1), 0, 0));
        let b = arena.insert(Facility::built(rule(1), 1, 0));
        assert!(arena.remove(a).is_some());
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());

        let c = arena.insert(Facility::built(rule(1), 2, 0));
        assert_eq!(c.index, a.index);
        assert_ne!(c.generation, a.generation);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b).map(|f| f.x), Some(1));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_grid_queries_use_footprints() {
        let mut grid = BaseGrid::new();
        let big = grid.facilities.insert(Facility::built(rule(2), 2, 2));
        let small = grid.facilities.insert(Facility::built(rule(1), 0, 0));
        assert_eq!(grid.facility_at(3, 3), Some(big));
        assert_eq!(grid.facility_at(4, 4), None);
        let hits = grid.facilities_intersecting(&Area::new(0, 0, 3));
        assert_eq!(hits, vec![small, big]);
        let map = grid.cell_map(Some(big));
        assert_eq!(map[2][2], None);
        assert_eq!(map[0][0], Some(small));
    }

    #[test]
    fn test_build_day_clears_transitional_flag_on_completion() {
        let mut f = Facility::built(rule(1), 0, 0);
        f.build_time = 2;
        f.had_previous_facility = true;
        assert!(f.conducts());
        assert!(!f.advance_build_day());
        assert!(f.advance_build_day());
        assert!(!f.had_previous_facility);
        assert!(f.is_operational());
        assert!(!f.advance_build_day());
    }
}
