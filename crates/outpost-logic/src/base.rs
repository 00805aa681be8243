//! The base aggregate: facility grid plus everything that lives in it.
//!
//! Capacity, placement and destruction are implemented on [`Base`] in their
//! own modules; this one holds the data and the bookkeeping they share.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::BaseConfig;
use crate::functions::BaseFunctions;
use crate::grid::{BaseGrid, Facility, FacilityId};
use crate::rules::RuleCatalog;

// ── Dependents ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Soldier {
    pub id: u32,
    pub name: String,
    /// Craft the soldier is assigned to.
    pub craft: Option<u32>,
    pub psi_training: bool,
    /// Martial training.
    pub training: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Craft {
    pub id: u32,
    pub rule: String,
    pub cargo: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchProject {
    pub id: u32,
    pub topic: String,
    pub scientists: u32,
    pub requires: BaseFunctions,
    /// Live specimen kept in containment for the duration of the project.
    pub held_item: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Production {
    pub id: u32,
    pub item: String,
    pub engineers: u32,
    /// Workshop space taken on top of the assigned engineers.
    pub required_space: u32,
    /// Output is a craft, which needs a hangar while being built.
    pub produces_craft: bool,
    pub requires: BaseFunctions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferCargo {
    Item { item: String, quantity: u32 },
    Craft(Craft),
    Soldier(Soldier),
    Scientists(u32),
    Engineers(u32),
}

/// Incoming transfer, still in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: u32,
    pub cargo: TransferCargo,
    pub hours: u32,
}

impl Transfer {
    /// Heads that will need quarters on arrival.
    pub fn personnel(&self) -> u32 {
        match &self.cargo {
            TransferCargo::Soldier(_) => 1,
            TransferCargo::Scientists(n) | TransferCargo::Engineers(n) => *n,
            _ => 0,
        }
    }

    pub fn is_craft(&self) -> bool {
        matches!(self.cargo, TransferCargo::Craft(_))
    }

    pub fn is_item(&self) -> bool {
        matches!(self.cargo, TransferCargo::Item { .. })
    }
}

// ── Base ──

/// One base: its grid, its people, projects, craft, items and transfers.
#[derive(Debug, Clone)]
pub struct Base {
    pub name: String,
    pub grid: BaseGrid,
    pub soldiers: Vec<Soldier>,
    pub crafts: Vec<Craft>,
    pub research: Vec<ResearchProject>,
    pub productions: Vec<Production>,
    pub transfers: Vec<Transfer>,
    pub items: BTreeMap<String, u32>,
    pub idle_scientists: u32,
    pub idle_engineers: u32,
    pub catalog: Arc<RuleCatalog>,
    pub config: BaseConfig,
    next_id: u32,
}

impl Base {
    pub fn new(name: impl Into<String>, catalog: Arc<RuleCatalog>, config: BaseConfig) -> Self {
        Self {
            name: name.into(),
            grid: BaseGrid::new(),
            soldiers: Vec::new(),
            crafts: Vec::new(),
            research: Vec::new(),
            productions: Vec::new(),
            transfers: Vec::new(),
            items: BTreeMap::new(),
            idle_scientists: 0,
            idle_engineers: 0,
            catalog,
            config,
            next_id: 1,
        }
    }

    /// Fresh id for a dependent (soldier, craft, project, transfer).
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Make sure later `next_id` calls never collide with `id`.
    pub fn reserve_id(&mut self, id: u32) {
        self.next_id = self.next_id.max(id.saturating_add(1));
    }

    /// Insert a facility without validation. Used by loaders and tests;
    /// gameplay goes through `commit_placement`.
    pub fn insert_facility(&mut self, facility: Facility) -> FacilityId {
        self.grid.facilities.insert(facility)
    }

    pub fn facility(&self, id: FacilityId) -> Option<&Facility> {
        self.grid.get(id)
    }

    pub fn facility_count(&self) -> usize {
        self.grid.len()
    }

    // ── Personnel ──

    pub fn allocated_scientists(&self) -> u32 {
        self.research.iter().map(|r| r.scientists).sum()
    }

    pub fn total_scientists(&self) -> u32 {
        self.idle_scientists + self.allocated_scientists()
    }

    pub fn allocated_engineers(&self) -> u32 {
        self.productions.iter().map(|p| p.engineers).sum()
    }

    pub fn total_engineers(&self) -> u32 {
        self.idle_engineers + self.allocated_engineers()
    }

    // ── Items ──

    pub fn add_items(&mut self, item: &str, quantity: u32) {
        if quantity == 0 {
            return;
        }
        *self.items.entry(item.to_string()).or_insert(0) += quantity;
    }

    /// Remove up to `quantity`; returns how many were actually removed.
    pub fn remove_items(&mut self, item: &str, quantity: u32) -> u32 {
        let Some(held) = self.items.get_mut(item) else {
            return 0;
        };
        let taken = quantity.min(*held);
        *held -= taken;
        if *held == 0 {
            self.items.remove(item);
        }
        taken
    }

    pub fn item_count(&self, item: &str) -> u32 {
        self.items.get(item).copied().unwrap_or(0)
    }

    // ── Craft ──

    pub fn craft(&self, id: u32) -> Option<&Craft> {
        self.crafts.iter().find(|c| c.id == id)
    }

    /// Facility whose hangar holds `craft`.
    pub fn hangar_of(&self, craft: u32) -> Option<FacilityId> {
        self.grid
            .iter()
            .find(|(_, f)| f.craft == Some(craft))
            .map(|(id, _)| id)
    }

    /// First hangar-bearing facility with no craft parked.
    pub fn free_hangar(&self, excluding: &[FacilityId]) -> Option<FacilityId> {
        self.grid
            .ids_in_scan_order()
            .into_iter()
            .filter(|id| !excluding.contains(id))
            .find(|&id| {
                self.grid
                    .get(id)
                    .is_some_and(|f| f.rule.hangars > 0 && f.craft.is_none())
            })
    }

    // ── Construction ──

    /// One day of construction on every unfinished facility. Returns the
    /// facilities that completed today.
    pub fn advance_construction_day(&mut self) -> Vec<FacilityId> {
        let mut finished = Vec::new();
        for (id, facility) in self.grid.facilities.iter_mut() {
            if facility.advance_build_day() {
                log::info!(
                    "{}: {} at ({}, {}) completed",
                    self.name,
                    facility.rule.id,
                    facility.x,
                    facility.y
                );
                finished.push(id);
            }
        }
        finished
    }

    /// Drop every facility and dependent. The base is gone.
    pub(crate) fn clear(&mut self) {
        self.grid.facilities.clear();
        self.soldiers.clear();
        self.crafts.clear();
        self.research.clear();
        self.productions.clear();
        self.transfers.clear();
        self.items.clear();
        self.idle_scientists = 0;
        self.idle_engineers = 0;
    }
}
