//! Outpost Headless Scenario Harness
//!
//! Replays base-building scenarios against the bundled rule data.
//! Runs entirely in-process: no rendering, no save files on disk.
//!
//! Usage:
//!   cargo run -p outpost-simtest
//!   cargo run -p outpost-simtest -- --verbose

use std::collections::BTreeMap;
use std::sync::Arc;

use outpost_core::catalog::load_catalog_str;
use outpost_core::engine::{BaseEngine, EngineConfig, EngineError};
use outpost_logic::capacity::Resource;
use outpost_logic::cascade::DestructionCause;
use outpost_logic::grid::{Area, Facility, BASE_SIZE};
use outpost_logic::placement::PlacementResult;
use outpost_logic::rules::{FacilityRule, RuleCatalog};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

// ── Rule data (same JSON the game loads) ────────────────────────────────
const RULES_JSON: &str = include_str!("../../../data/facility_rules.json");

const LIFT: &str = "STR_ACCESS_LIFT";
const STORES: &str = "STR_GENERAL_STORES";
const SMALL_RADAR: &str = "STR_SMALL_RADAR_SYSTEM";
const HANGAR: &str = "STR_HANGAR";

#[derive(Debug, Deserialize)]
struct RawRuleFile {
    facilities: Vec<RawFacility>,
}

#[derive(Debug, Deserialize)]
struct RawFacility {
    id: String,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    println!("=== Outpost Scenario Harness ===\n");

    let mut results = Vec::new();

    // 1. Rule data validation
    let catalog = match validate_rule_data(&mut results) {
        Some(c) => Arc::new(c),
        None => {
            report(&results, verbose);
            std::process::exit(1);
        }
    };

    // 2. Placement scenarios
    results.extend(validate_placement(&catalog, verbose));

    // 3. Missile damage
    results.extend(validate_missile_damage(&catalog, verbose));

    // 4. Dismantle and refunds
    results.extend(validate_dismantle(&catalog, verbose));

    // 5. Build queue
    results.extend(validate_build_queue(&catalog, verbose));

    // 6. Random operation sweep
    results.extend(validate_random_sweep(&catalog, verbose));

    // 7. Save / load
    results.extend(validate_persistence(&catalog, verbose));

    if !report(&results, verbose) {
        std::process::exit(1);
    }
}

/// Print the summary. Returns whether everything passed.
fn report(results: &[TestResult], verbose: bool) -> bool {
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );
    failed == 0
}

fn engine(catalog: &Arc<RuleCatalog>) -> Option<BaseEngine> {
    let mut engine =
        BaseEngine::found("Harness", Arc::clone(catalog), EngineConfig::default(), 2, 2).ok()?;
    engine.funds = 100_000_000;
    Some(engine)
}

fn rule(catalog: &RuleCatalog, id: &str) -> Option<Arc<FacilityRule>> {
    catalog.facility(id)
}

// ── 1. Rule Data ────────────────────────────────────────────────────────

fn validate_rule_data(results: &mut Vec<TestResult>) -> Option<RuleCatalog> {
    println!("--- Rule Data ---");

    let raw: RawRuleFile = match serde_json::from_str(RULES_JSON) {
        Ok(r) => r,
        Err(e) => {
            results.push(TestResult {
                name: "rules_parse".into(),
                passed: false,
                detail: format!("JSON parse error: {}", e),
            });
            return None;
        }
    };

    let mut seen: BTreeMap<&str, u32> = BTreeMap::new();
    for f in &raw.facilities {
        *seen.entry(f.id.as_str()).or_default() += 1;
    }
    let duplicates: Vec<&str> = seen
        .iter()
        .filter(|(_, &n)| n > 1)
        .map(|(id, _)| *id)
        .collect();
    results.push(TestResult {
        name: "rules_unique_ids".into(),
        passed: duplicates.is_empty(),
        detail: if duplicates.is_empty() {
            format!("{} facility rules", raw.facilities.len())
        } else {
            format!("duplicated: {}", duplicates.join(", "))
        },
    });

    let catalog = match load_catalog_str(RULES_JSON) {
        Ok(c) => c,
        Err(e) => {
            results.push(TestResult {
                name: "rules_valid".into(),
                passed: false,
                detail: e.to_string(),
            });
            return None;
        }
    };
    results.push(TestResult {
        name: "rules_valid".into(),
        passed: true,
        detail: "every size and reference checks out".into(),
    });

    let lifts = catalog.facilities().filter(|r| r.access_lift).count();
    results.push(TestResult {
        name: "rules_single_lift".into(),
        passed: lifts == 1,
        detail: format!("{} access lift rules", lifts),
    });

    let placeholder = catalog.destroyed_facility();
    results.push(TestResult {
        name: "rules_placeholder".into(),
        passed: placeholder.as_ref().is_some_and(|p| p.size == 1),
        detail: format!(
            "destroyed placeholder = {}",
            placeholder.map(|p| p.id.clone()).unwrap_or_else(|| "none".into())
        ),
    });

    let unbuildable: Vec<&str> = catalog
        .facilities()
        .filter(|r| !r.access_lift && r.build_cost > 0 && r.build_days == 0)
        .map(|r| r.id.as_str())
        .collect();
    results.push(TestResult {
        name: "rules_build_times".into(),
        passed: unbuildable.is_empty(),
        detail: if unbuildable.is_empty() {
            "every purchasable facility takes time to build".into()
        } else {
            format!("instant builds: {}", unbuildable.join(", "))
        },
    });

    Some(catalog)
}

// ── 2. Placement ────────────────────────────────────────────────────────

fn validate_placement(catalog: &Arc<RuleCatalog>, verbose: bool) -> Vec<TestResult> {
    println!("--- Placement ---");
    let mut results = Vec::new();
    let Some(mut engine) = engine(catalog) else {
        results.push(TestResult {
            name: "placement_found_base".into(),
            passed: false,
            detail: "could not found a base".into(),
        });
        return results;
    };

    // Lift only: far cell is not connected, neighbour cell is fine
    let far = engine.validate_placement(STORES, Area::new(4, 4, 1), None);
    let near = engine.validate_placement(STORES, Area::new(1, 2, 1), None);
    results.push(TestResult {
        name: "placement_adjacency".into(),
        passed: far == Ok(PlacementResult::NotConnected) && near == Ok(PlacementResult::Ok),
        detail: format!("(4,4) → {:?}, (1,2) → {:?}", far, near),
    });

    // A second lift is never allowed
    let second = engine.validate_placement(LIFT, Area::new(3, 2, 1), None);
    results.push(TestResult {
        name: "placement_second_lift".into(),
        passed: second == Ok(PlacementResult::ForbiddenByOther),
        detail: format!("second lift → {:?}", second),
    });

    // Upgrade over full stores must be refused
    if let Some(stores) = rule(catalog, STORES) {
        engine.base.insert_facility(Facility::built(stores, 1, 2));
    }
    engine.base.add_items("STR_LASER_RIFLE", 225);
    let spot = Area::new(1, 2, 1);
    let verdict = engine.validate_placement(SMALL_RADAR, spot, Some(spot));
    let preview = engine.is_area_in_use(spot, Some(SMALL_RADAR));
    results.push(TestResult {
        name: "placement_upgrade_in_use".into(),
        passed: verdict == Ok(PlacementResult::Used) && preview == verdict,
        detail: format!(
            "used {:.1} of {} storage → {:?}",
            engine.used(Resource::Storage),
            engine.available(Resource::Storage),
            verdict
        ),
    });

    // Out-of-bounds footprints are rejected
    let edge = engine.validate_placement(HANGAR, Area::new(BASE_SIZE - 1, 2, 2), None);
    results.push(TestResult {
        name: "placement_bounds".into(),
        passed: edge == Ok(PlacementResult::NotConnected),
        detail: format!("hangar over the edge → {:?}", edge),
    });

    if verbose {
        println!("  Buildable from a fresh base:");
        for rule in engine.buildable_rules() {
            println!("    {:28} size {}", rule.id, rule.size);
        }
    }

    results
}

// ── 3. Missile Damage ───────────────────────────────────────────────────

fn validate_missile_damage(catalog: &Arc<RuleCatalog>, _verbose: bool) -> Vec<TestResult> {
    println!("--- Missile Damage ---");
    let mut results = Vec::new();
    let (Some(mut engine), Some(hangar)) = (engine(catalog), rule(catalog, HANGAR)) else {
        return results;
    };
    engine.base.insert_facility(Facility::built(hangar, 0, 2));

    let events = engine.apply_missile_damage(3);
    let hits: Vec<_> = events
        .iter()
        .filter(|e| e.cause == DestructionCause::MissileHit)
        .collect();
    results.push(TestResult {
        name: "missile_single_hit".into(),
        passed: hits.len() == 1 && hits[0].area.size == 2,
        detail: format!("{} hits on power 3", hits.len()),
    });

    let rubble = hits.first().map(|e| e.replaced_by.len()).unwrap_or(0);
    results.push(TestResult {
        name: "missile_rubble_fills_footprint".into(),
        passed: rubble == 4,
        detail: format!("{} rubble cells", rubble),
    });

    results.push(TestResult {
        name: "missile_layout_intact".into(),
        passed: engine.audit().is_empty(),
        detail: format!("{} facilities after strike", engine.facility_count()),
    });

    // A self-variant facility is disabled in place
    if let (Some(mut engine), Some(fusion)) =
        (self::engine(catalog), rule(catalog, "STR_FUSION_BALL_DEFENSE"))
    {
        let id = engine.base.insert_facility(Facility::built(fusion, 1, 2));
        let before = engine.available(Resource::Defense);
        engine.apply_missile_damage(1);
        let disabled = engine.base.facility(id).is_some_and(|f| f.disabled);
        results.push(TestResult {
            name: "missile_disables_self_variant".into(),
            passed: disabled && engine.available(Resource::Defense) == 0,
            detail: format!("defense {} → {}", before, engine.available(Resource::Defense)),
        });
    }

    results
}

// ── 4. Dismantle ────────────────────────────────────────────────────────

fn validate_dismantle(catalog: &Arc<RuleCatalog>, _verbose: bool) -> Vec<TestResult> {
    println!("--- Dismantle ---");
    let mut results = Vec::new();
    let Some(mut engine) = engine(catalog) else {
        return results;
    };
    engine.base.add_items("STR_ALIEN_ALLOYS", 20);

    let started = engine.commit_placement(STORES, Area::new(1, 2, 1), None);
    let queued = engine.commit_placement(STORES, Area::new(0, 2, 1), None);
    let (Ok(started), Ok(queued)) = (started, queued) else {
        results.push(TestResult {
            name: "dismantle_setup".into(),
            passed: false,
            detail: "could not place stores".into(),
        });
        return results;
    };

    let full = engine.dismantle(queued.id);
    results.push(TestResult {
        name: "dismantle_queued_full_refund".into(),
        passed: full.as_ref().is_ok_and(|r| {
            r.funds == 150_000 && r.items.get("STR_ALIEN_ALLOYS") == Some(&6)
        }),
        detail: format!("{:?}", full.map(|r| (r.funds, r.items))),
    });

    for _ in 0..10 {
        engine.advance_day();
    }
    let partial = engine.dismantle(started.id);
    results.push(TestResult {
        name: "dismantle_built_partial_refund".into(),
        passed: partial.as_ref().is_ok_and(|r| {
            r.funds == 15_000 && r.items.get("STR_ALIEN_ALLOYS") == Some(&2)
        }),
        detail: format!("{:?}", partial.map(|r| (r.funds, r.items))),
    });

    let again = engine.dismantle(started.id);
    results.push(TestResult {
        name: "dismantle_stale_id".into(),
        passed: again == Err(EngineError::UnknownFacility(started.id)),
        detail: "stale id is rejected".into(),
    });

    if let Some(lift) = engine.base.grid.lift() {
        let lost = engine.dismantle(lift);
        results.push(TestResult {
            name: "dismantle_lift_loses_base".into(),
            passed: lost.is_ok_and(|r| r.base_lost) && engine.facility_count() == 0,
            detail: format!("{} facilities left", engine.facility_count()),
        });
    }

    results
}

// ── 5. Build Queue ──────────────────────────────────────────────────────

fn validate_build_queue(catalog: &Arc<RuleCatalog>, verbose: bool) -> Vec<TestResult> {
    println!("--- Build Queue ---");
    let mut results = Vec::new();
    let Some(mut engine) = engine(catalog) else {
        return results;
    };
    engine.base.add_items("STR_ALIEN_ALLOYS", 20);

    let first = engine.commit_placement(STORES, Area::new(1, 2, 1), None);
    let second = engine.commit_placement(STORES, Area::new(0, 2, 1), None);
    let (Ok(first), Ok(second)) = (first, second) else {
        return results;
    };
    let waiting = engine.base.facility(second.id).map(|f| f.build_time);
    results.push(TestResult {
        name: "queue_start_after_neighbour".into(),
        passed: waiting == Some(20),
        detail: format!("queued build time {:?}", waiting),
    });

    let mut finished = Vec::new();
    for day in 1..=20 {
        for id in engine.advance_day() {
            finished.push((day, id));
        }
    }
    results.push(TestResult {
        name: "queue_completion_order".into(),
        passed: finished == vec![(10, first.id), (20, second.id)],
        detail: format!("completed on days {:?}", finished.iter().map(|(d, _)| d).collect::<Vec<_>>()),
    });

    let strict = BaseEngine::found(
        "Strict",
        Arc::clone(catalog),
        EngineConfig {
            base: outpost_logic::config::BaseConfig {
                allow_build_queue: false,
                ..Default::default()
            },
            ..Default::default()
        },
        2,
        2,
    );
    if let Ok(mut strict) = strict {
        strict.funds = 1_000_000;
        strict.base.add_items("STR_ALIEN_ALLOYS", 20);
        let _ = strict.commit_placement(STORES, Area::new(1, 2, 1), None);
        let refused = strict.validate_placement(STORES, Area::new(0, 2, 1), None);
        results.push(TestResult {
            name: "queue_disabled".into(),
            passed: refused == Ok(PlacementResult::QueueDisabled),
            detail: format!("{:?}", refused),
        });
    }

    if verbose {
        println!("  Funds after two stores: {}", engine.funds);
    }

    results
}

// ── 6. Random Sweep ─────────────────────────────────────────────────────

fn validate_random_sweep(catalog: &Arc<RuleCatalog>, verbose: bool) -> Vec<TestResult> {
    println!("--- Random Sweep ---");
    let mut results = Vec::new();
    let buildable: Vec<Arc<FacilityRule>> = catalog
        .facilities()
        .filter(|r| !r.access_lift && r.build_cost > 0)
        .cloned()
        .collect();

    let seeds = 50u64;
    let steps = 80;
    let mut broken = Vec::new();
    let mut placed = 0u32;
    let mut strikes = 0u32;

    for seed in 0..seeds {
        let Some(mut engine) = engine(catalog) else {
            continue;
        };
        engine.base.add_items("STR_ALIEN_ALLOYS", 500);
        let mut rng = StdRng::seed_from_u64(seed);

        for step in 0..steps {
            match rng.gen_range(0..10) {
                0..=4 => {
                    let rule = &buildable[rng.gen_range(0..buildable.len())];
                    let area = Area::new(
                        rng.gen_range(0..BASE_SIZE),
                        rng.gen_range(0..BASE_SIZE),
                        rule.size,
                    );
                    let replacing = rng.gen_bool(0.3).then_some(area);
                    if engine.commit_placement(&rule.id, area, replacing).is_ok() {
                        placed += 1;
                    }
                }
                5 | 6 => {
                    let ids: Vec<_> = engine
                        .base
                        .grid
                        .ids_in_scan_order()
                        .into_iter()
                        .filter(|&id| engine.base.facility(id).is_some_and(|f| !f.rule.access_lift))
                        .collect();
                    if !ids.is_empty() {
                        let _ = engine.dismantle(ids[rng.gen_range(0..ids.len())]);
                    }
                }
                7 => {
                    engine.apply_missile_damage(rng.gen_range(1..8));
                    strikes += 1;
                }
                _ => {
                    engine.advance_day();
                }
            }
            let issues = engine.audit();
            if !issues.is_empty() {
                broken.push(format!("seed {} step {}: {:?}", seed, step, issues));
                break;
            }
        }
    }

    results.push(TestResult {
        name: "sweep_layout_invariants".into(),
        passed: broken.is_empty(),
        detail: if broken.is_empty() {
            format!(
                "{} seeds x {} steps, {} placements, {} strikes",
                seeds, steps, placed, strikes
            )
        } else {
            broken.join("; ")
        },
    });

    if verbose && placed == 0 {
        println!("  warning: sweep never placed a facility");
    }

    results
}

// ── 7. Persistence ──────────────────────────────────────────────────────

fn validate_persistence(catalog: &Arc<RuleCatalog>, _verbose: bool) -> Vec<TestResult> {
    println!("--- Persistence ---");
    let mut results = Vec::new();
    let Some(mut engine) = engine(catalog) else {
        return results;
    };
    engine.base.add_items("STR_ALIEN_ALLOYS", 20);
    let _ = engine.commit_placement(STORES, Area::new(1, 2, 1), None);
    let _ = engine.commit_placement(HANGAR, Area::new(3, 2, 2), None);
    engine.advance_day();

    let mut buffer = Vec::new();
    let saved = engine.save(&mut buffer);
    let loaded = saved
        .map_err(|e| e.to_string())
        .and_then(|_| BaseEngine::load(&buffer[..], Arc::clone(catalog)).map_err(|e| e.to_string()));

    match loaded {
        Ok(loaded) => {
            let same_storage = loaded.available(Resource::Storage) == engine.available(Resource::Storage);
            results.push(TestResult {
                name: "persist_roundtrip".into(),
                passed: loaded.facility_count() == engine.facility_count()
                    && loaded.funds == engine.funds
                    && same_storage
                    && loaded.audit().is_empty(),
                detail: format!("{} bytes, {} facilities", buffer.len(), loaded.facility_count()),
            });
        }
        Err(e) => results.push(TestResult {
            name: "persist_roundtrip".into(),
            passed: false,
            detail: e,
        }),
    }

    let mut json = Vec::new();
    results.push(TestResult {
        name: "persist_json_export".into(),
        passed: engine.export_json(&mut json).is_ok() && !json.is_empty(),
        detail: format!("{} bytes of JSON", json.len()),
    });

    results
}
