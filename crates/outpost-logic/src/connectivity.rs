//! Reachability from the access lift.
//!
//! Flood fill over facilities, not cells: a facility is reached when any of
//! its cells is 4-adjacent to a reached facility that conducts (finished or
//! mid-upgrade). Facilities still under first construction are reached but
//! do not pass the fill on, except to facilities queued behind them.

use crate::grid::{BaseGrid, FacilityId};

/// Facilities not reachable from the lift, in grid scan order.
///
/// `excluding` is treated as already removed. Excluding the lift itself
/// reports every other facility, since the whole base goes with it.
pub fn disconnected_facilities(
    grid: &BaseGrid,
    excluding: Option<FacilityId>,
) -> Vec<FacilityId> {
    let all = grid.ids_in_scan_order();

    let Some(lift) = grid.lift() else {
        log::warn!("connectivity check on a base without an access lift");
        return Vec::new();
    };
    if excluding == Some(lift) {
        return all.into_iter().filter(|&id| id != lift).collect();
    }

    let connected = connected_set(grid, lift, excluding);
    all.into_iter()
        .filter(|&id| Some(id) != excluding && !connected.contains(&id))
        .collect()
}

/// Facilities reachable from `lift`, the lift included.
fn connected_set(
    grid: &BaseGrid,
    lift: FacilityId,
    excluding: Option<FacilityId>,
) -> Vec<FacilityId> {
    let map = grid.cell_map(excluding);
    let mut reached: Vec<FacilityId> = vec![lift];
    let mut stack: Vec<FacilityId> = vec![lift];

    while let Some(id) = stack.pop() {
        let Some(facility) = grid.get(id) else {
            continue;
        };
        // The lift anchors the base even while it is being rebuilt.
        let conducts = id == lift || facility.conducts();
        for (cx, cy) in facility.area().neighbors() {
            let Some(next) = map[cy as usize][cx as usize] else {
                continue;
            };
            if reached.contains(&next) {
                continue;
            }
            if conducts || grid.get(next).is_some_and(|n| n.is_queued()) {
                reached.push(next);
                stack.push(next);
            }
        }
    }
    reached
}

/// Whether every facility is the lift or reachable from it.
pub fn is_fully_connected(grid: &BaseGrid) -> bool {
    grid.lift().is_some() && disconnected_facilities(grid, None).is_empty()
}
