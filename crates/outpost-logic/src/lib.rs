//! Pure base-building logic for Outpost.
//!
//! This crate holds the facility grid and capacity engine with no I/O and
//! no engine dependencies. Functions take plain data and return results, so
//! everything here is unit-testable and usable from the engine facade, the
//! headless harness, or any future front end.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`base`] | Base aggregate: grid, personnel, craft, projects, transfers, items |
//! | [`capacity`] | Capacity ledger, available vs. used per resource, derived stats |
//! | [`cascade`] | Placement commit, dismantle, missile damage, removal side effects |
//! | [`config`] | Per-base policy switches and their validation |
//! | [`connectivity`] | Flood fill from the access lift |
//! | [`functions`] | Base function bit-set (provided / required / forbidden) |
//! | [`grid`] | 6×6 geometry, facility instances, generational arena |
//! | [`placement`] | Placement validation, build list filter, build queue |
//! | [`rules`] | Facility and item rules, rule catalog validation |
//! | [`weighted`] | Seeded weighted choice |

pub mod base;
pub mod capacity;
pub mod cascade;
pub mod config;
pub mod connectivity;
pub mod functions;
pub mod grid;
pub mod placement;
pub mod rules;
pub mod weighted;
