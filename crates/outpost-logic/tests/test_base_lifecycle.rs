//! Integration tests for the facility lifecycle.
//!
//! Exercises: RuleCatalog → Base → validate/commit → construction days
//! → dismantle / missile damage → settlement
//!
//! All tests are pure logic with seeded randomness.

use std::collections::BTreeMap;
use std::sync::Arc;

use outpost_logic::base::{Base, ResearchProject};
use outpost_logic::capacity::Resource;
use outpost_logic::cascade::DestructionCause;
use outpost_logic::config::BaseConfig;
use outpost_logic::connectivity::is_fully_connected;
use outpost_logic::functions::BaseFunctions;
use outpost_logic::grid::{Area, Facility};
use outpost_logic::placement::PlacementResult;
use outpost_logic::rules::{FacilityRule, ItemCost, ItemRule, RuleCatalog, RuleSet};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

// ── Helpers ────────────────────────────────────────────────────────────

const BUILDABLE: [&str; 5] = ["stores", "lab", "small_radar", "hangar", "quarters"];

fn rule_set(placeholder: bool) -> RuleSet {
    RuleSet {
        facilities: vec![
            FacilityRule {
                access_lift: true,
                provides: BaseFunctions::ACCESS,
                build_days: 1,
                ..FacilityRule::named("lift")
            },
            FacilityRule {
                storage: 50,
                build_days: 10,
                build_cost: 150_000,
                refund_value: 15_000,
                build_items: BTreeMap::from([(
                    "alloy".to_string(),
                    ItemCost {
                        build: 6,
                        refund: 2,
                    },
                )]),
                missile_attraction: 4,
                ..FacilityRule::named("stores")
            },
            FacilityRule {
                laboratories: 50,
                provides: BaseFunctions::LAB_SERVICE,
                build_days: 26,
                missile_attraction: 6,
                ..FacilityRule::named("lab")
            },
            FacilityRule {
                radar_range: 1000,
                radar_chance: 10,
                build_days: 12,
                missile_attraction: 2,
                build_over: vec!["stores".into(), "quarters".into()],
                ..FacilityRule::named("small_radar")
            },
            FacilityRule {
                size: 2,
                hangars: 1,
                build_days: 25,
                missile_attraction: 10,
                ..FacilityRule::named("hangar")
            },
            FacilityRule {
                personnel: 50,
                build_days: 16,
                missile_attraction: 3,
                ..FacilityRule::named("quarters")
            },
            FacilityRule::named("rubble"),
        ],
        items: vec![ItemRule {
            id: "crate".into(),
            size: 1.0,
            ..ItemRule::default()
        }],
        destroyed_facility: placeholder.then(|| "rubble".to_string()),
    }
}

fn new_base(placeholder: bool) -> Base {
    let catalog = RuleCatalog::from_rule_set(rule_set(placeholder)).unwrap();
    let mut base = Base::new("Alpha", Arc::new(catalog), BaseConfig::default());
    let lift = base.catalog.facility("lift").unwrap();
    base.insert_facility(Facility::built(lift, 2, 2));
    base
}

fn rule(base: &Base, id: &str) -> Arc<FacilityRule> {
    base.catalog.facility(id).unwrap()
}

fn build(base: &mut Base, id: &str, x: i32, y: i32) -> outpost_logic::grid::FacilityId {
    let r = rule(base, id);
    base.insert_facility(Facility::built(r, x, y))
}

fn no_overlap(base: &Base) -> bool {
    let areas: Vec<Area> = base.grid.iter().map(|(_, f)| f.area()).collect();
    areas.iter().enumerate().all(|(i, a)| {
        a.in_bounds() && areas[i + 1..].iter().all(|b| !a.intersects(b))
    })
}

// ── Scenarios ──────────────────────────────────────────────────────────

#[test]
fn adjacency_scenario() {
    let base = new_base(false);
    let stores = rule(&base, "stores");
    assert_eq!(
        base.validate_placement(&stores, Area::new(4, 4, 1), None),
        PlacementResult::NotConnected
    );
    assert_eq!(
        base.validate_placement(&stores, Area::new(1, 2, 1), None),
        PlacementResult::Ok
    );
}

#[test]
fn upgrade_over_capacity_scenario() {
    let mut base = new_base(false);
    build(&mut base, "stores", 1, 2);
    base.add_items("crate", 45);
    assert_eq!(base.available(Resource::Storage), 50);
    let radar = rule(&base, "small_radar");
    let spot = Area::new(1, 2, 1);
    assert_eq!(
        base.validate_placement(&radar, spot, Some(spot)),
        PlacementResult::Used
    );
    // Dry-run agrees with the validator.
    assert_eq!(base.is_area_in_use(spot, Some(radar.as_ref())), PlacementResult::Used);
}

#[test]
fn missile_scenario_hits_once() {
    let mut base = new_base(false);
    let hangar = build(&mut base, "hangar", 0, 2);
    let mut rng = StdRng::seed_from_u64(2024);
    let report = base.apply_missile_damage(3, &mut rng);
    assert_eq!(report.power_spent, 4);
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].facility, hangar);
    assert_eq!(report.events[0].cause, DestructionCause::MissileHit);
}

#[test]
fn dismantle_refund_scenario() {
    let mut base = new_base(false);
    let stores = rule(&base, "stores");
    let started = base
        .commit_placement(&stores, Area::new(1, 2, 1), None)
        .unwrap();
    let queued = base
        .commit_placement(&stores, Area::new(0, 2, 1), None)
        .unwrap();
    assert!(base.facility(queued).unwrap().is_queued());

    let full = base.dismantle(queued).unwrap();
    assert_eq!(full.funds, 150_000);
    assert_eq!(full.items["alloy"], 6);

    let partial = base.dismantle(started).unwrap();
    assert_eq!(partial.funds, 15_000);
    assert_eq!(partial.items["alloy"], 2);
}

#[test]
fn lift_dismantle_removes_everything() {
    let mut base = new_base(false);
    build(&mut base, "stores", 1, 2);
    build(&mut base, "lab", 3, 2);
    let lift = base.grid.lift().unwrap();
    let summary = base.dismantle(lift).unwrap();
    assert!(summary.base_lost);
    assert_eq!(base.facility_count(), 0);
}

#[test]
fn construction_finishes_and_unblocks_the_queue() {
    let mut base = new_base(false);
    let stores = rule(&base, "stores");
    let first = base
        .commit_placement(&stores, Area::new(1, 2, 1), None)
        .unwrap();
    let second = base
        .commit_placement(&stores, Area::new(0, 2, 1), None)
        .unwrap();
    let mut finished = Vec::new();
    for _ in 0..20 {
        finished.extend(base.advance_construction_day());
    }
    assert_eq!(finished, vec![first, second]);
    assert_eq!(base.available(Resource::Storage), 100);
    assert!(is_fully_connected(&base.grid));
}

#[test]
fn scientists_are_conserved_when_labs_burn() {
    let mut base = new_base(false);
    build(&mut base, "lab", 1, 2);
    build(&mut base, "lab", 3, 2);
    base.idle_scientists = 5;
    base.research.push(ResearchProject {
        id: 1,
        topic: "laser weapons".into(),
        scientists: 70,
        requires: BaseFunctions::empty(),
        held_item: None,
    });
    let before = base.total_scientists();
    let mut rng = StdRng::seed_from_u64(9);
    base.apply_missile_damage(1, &mut rng);
    assert_eq!(base.allocated_scientists(), 50);
    assert_eq!(base.allocated_scientists() + base.idle_scientists, before);
}

#[test]
fn catalog_round_trips_through_rule_set() {
    let catalog = RuleCatalog::from_rule_set(rule_set(true)).unwrap();
    assert_eq!(catalog.destroyed_facility().unwrap().id, "rubble");
    for id in BUILDABLE {
        assert!(catalog.facility(id).is_some(), "{id} missing");
    }
}

// ── Properties ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    Place {
        rule: usize,
        x: i32,
        y: i32,
        over: bool,
    },
    Dismantle(usize),
    Missile {
        power: u32,
        seed: u64,
    },
    Day,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..BUILDABLE.len(), 0..6i32, 0..6i32, any::<bool>())
            .prop_map(|(rule, x, y, over)| Op::Place { rule, x, y, over }),
        2 => (0..36usize).prop_map(Op::Dismantle),
        1 => (1..12u32, any::<u64>()).prop_map(|(power, seed)| Op::Missile { power, seed }),
        2 => Just(Op::Day),
    ]
}

fn apply(base: &mut Base, op: &Op) {
    match *op {
        Op::Place { rule, x, y, over } => {
            let r = base.catalog.facility(BUILDABLE[rule]).unwrap();
            let area = Area::new(x, y, r.size);
            let replacing = over.then_some(area);
            let first = base.validate_placement(&r, area, replacing);
            assert_eq!(first, base.validate_placement(&r, area, replacing));
            let committed = base.commit_placement(&r, area, replacing);
            assert_eq!(committed.is_ok(), first.is_ok());
        }
        Op::Dismantle(pick) => {
            let ids: Vec<_> = base
                .grid
                .ids_in_scan_order()
                .into_iter()
                .filter(|&id| base.facility(id).is_some_and(|f| !f.rule.access_lift))
                .collect();
            if !ids.is_empty() {
                base.dismantle(ids[pick % ids.len()]);
            }
        }
        Op::Missile { power, seed } => {
            let mut rng = StdRng::seed_from_u64(seed);
            let report = base.apply_missile_damage(power, &mut rng);
            let hits: Vec<u32> = report
                .events
                .iter()
                .filter(|e| e.cause == DestructionCause::MissileHit)
                .map(|e| (e.area.size * e.area.size) as u32)
                .collect();
            assert_eq!(report.power_spent, hits.iter().sum::<u32>());
            if let Some(last) = hits.last() {
                assert!(report.power_spent - last < power);
            }
        }
        Op::Day => {
            base.advance_construction_day();
        }
    }
}

proptest! {
    #[test]
    fn layout_invariants_hold(ops in prop::collection::vec(op(), 1..40), placeholder in any::<bool>()) {
        let mut base = new_base(placeholder);
        base.idle_scientists = 10;
        let scientists = base.total_scientists();
        for op in &ops {
            apply(&mut base, op);
            prop_assert!(no_overlap(&base), "overlap after {:?}", op);
            prop_assert!(is_fully_connected(&base.grid), "disconnected after {:?}", op);
            prop_assert_eq!(base.total_scientists(), scientists);
        }
    }

    #[test]
    fn validation_is_idempotent(x in 0..6i32, y in 0..6i32, rule in 0..BUILDABLE.len(), over in any::<bool>()) {
        let mut base = new_base(false);
        build(&mut base, "stores", 1, 2);
        build(&mut base, "quarters", 3, 2);
        let r = base.catalog.facility(BUILDABLE[rule]).unwrap();
        let area = Area::new(x, y, r.size);
        let replacing = over.then_some(area);
        prop_assert_eq!(
            base.validate_placement(&r, area, replacing),
            base.validate_placement(&r, area, replacing)
        );
    }
}
