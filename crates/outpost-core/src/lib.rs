//! Outpost Core - base engine facade
//!
//! Wraps one [`outpost_logic::base::Base`] together with its rule catalog,
//! a seeded RNG and the base's funds, and exposes the commands and queries
//! the surrounding game calls.
//!
//! # Architecture
//!
//! - **Logic**: grid, capacity, placement and destruction live in
//!   `outpost-logic` as pure functions over plain data
//! - **Engine**: [`engine::BaseEngine`] charges build costs, credits refunds
//!   and owns the RNG that missile damage draws from
//! - **Data**: [`catalog`] loads rule sets from JSON, [`persistence`] saves
//!   and restores a base with bincode
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use outpost_core::prelude::*;
//!
//! let catalog = load_catalog_file("data/facility_rules.json").unwrap();
//! let mut engine = BaseEngine::found("Alpha", Arc::new(catalog), EngineConfig::default(), 2, 2).unwrap();
//!
//! let stores = Area::new(1, 2, 1);
//! if engine.validate_placement("STR_GENERAL_STORES", stores, None).unwrap().is_ok() {
//!     engine.commit_placement("STR_GENERAL_STORES", stores, None).unwrap();
//! }
//! engine.advance_day();
//! ```

pub mod catalog;
pub mod engine;
pub mod persistence;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::catalog::{load_catalog_file, load_catalog_str, CatalogError};
    pub use crate::engine::{BaseEngine, EngineConfig, EngineError};
    pub use outpost_logic::capacity::Resource;
    pub use outpost_logic::grid::{Area, FacilityId};
    pub use outpost_logic::placement::PlacementResult;
}
