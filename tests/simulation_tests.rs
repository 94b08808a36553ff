//! Integration tests for the combat simulation
//!
//! These step real headless apps at the fixed 60 Hz virtual timestep and
//! observe behavior through the world and the combat log: phase ordering,
//! targeting rules, timed-effect semantics and death cleanup.

use std::sync::Arc;

use bevy::prelude::*;
use wildsim::abilities::attack_cast::{layers, AttackCast, CastShape};
use wildsim::abilities::definitions::{
    AbilityDefinition, AbilityKind, CastPolicy, LaunchPolicy, PhaseAvailability,
};
use wildsim::abilities::state_machine::{AbilityHolder, AbilityLoadout, AbilityPhase};
use wildsim::abilities::AbilityBook;
use wildsim::actors::stats::{StatKind, TimedEffectSpec, Vitals};
use wildsim::actors::stats::{EffectChannel, EffectPolarity, EffectType};
use wildsim::actors::{ActorName, Dead};
use wildsim::combat::events::{AbilityTriggerEvent, EffectRequest};
use wildsim::combat::log::{CombatLog, CombatLogEventType};
use wildsim::headless::config::{MobSetup, PlayerSetup, ScriptedAction, ScriptedInput};
use wildsim::headless::runner::build_scenario_app;
use wildsim::headless::ScenarioConfig;

// ============================================================================
// Harness helpers
// ============================================================================

fn scenario(
    abilities: Vec<&str>,
    mobs: Vec<(&str, [f32; 3])>,
    script: Vec<ScriptedInput>,
) -> ScenarioConfig {
    ScenarioConfig {
        player: PlayerSetup {
            position: [0.0, 0.0, 0.0],
            abilities: abilities.into_iter().map(String::from).collect(),
        },
        mobs: mobs
            .into_iter()
            .map(|(kind, position)| MobSetup {
                kind: kind.to_string(),
                position,
                abilities: vec![],
            })
            .collect(),
        max_duration_secs: 300.0,
        random_seed: Some(42),
        output_path: None,
        script,
    }
}

fn step(app: &mut App, frames: usize) {
    for _ in 0..frames {
        app.update();
    }
}

fn find_actor(app: &mut App, name: &str) -> Entity {
    let mut query = app.world_mut().query::<(Entity, &ActorName)>();
    query
        .iter(app.world())
        .find(|(_, actor)| actor.0 == name)
        .map(|(entity, _)| entity)
        .unwrap_or_else(|| panic!("actor '{name}' not found"))
}

fn health_of(app: &mut App, entity: Entity) -> f32 {
    app.world()
        .get::<Vitals>(entity)
        .and_then(|v| v.current(StatKind::Health))
        .expect("actor has a health pool")
}

/// Phase transitions for one ability, as "(from, to)" pairs from the log.
fn phase_transitions(app: &App, ability: &str) -> Vec<(String, String)> {
    let log = app.world().resource::<CombatLog>();
    log.filter_by_type(CombatLogEventType::AbilityPhase)
        .iter()
        .filter(|entry| entry.message.contains(ability))
        .filter_map(|entry| {
            let tail = entry.message.split(": ").nth(1)?;
            let arrow = tail.rsplit_once(" -> ")?;
            let from = arrow.0.rsplit(' ').next()?.to_string();
            Some((from, arrow.1.to_string()))
        })
        .collect()
}

/// A bare-bones instant area ability for targeting tests.
fn area_blast(caster_is_immune: bool, max_hit_cap: bool) -> AbilityDefinition {
    AbilityDefinition {
        name: "Test Blast".to_string(),
        duration: 0.5,
        cool_down: 60.0,
        cast_duration: 0.0,
        final_launch_time: 0.0,
        life_span: 0.0,
        speed: 0.0,
        number_of_targets: 1,
        cast_policy: CastPolicy::None,
        launch_policy: LaunchPolicy::DelayedFixed,
        multi_area_effect: true,
        caster_is_immune,
        caster_receives_benefits: false,
        is_ground_fixed_position: false,
        needs_confirmation_click: false,
        has_max_hit_per_collider: max_hit_cap,
        availability: PhaseAvailability::default(),
        attack_cast: AttackCast {
            shape: CastShape::Sphere { radius: 6.0 },
            offset: [0.0, 0.0, 0.0],
            layer_mask: layers::PLAYER | layers::MOB,
        },
        effects: vec![wildsim::abilities::definitions::AttackEffect {
            effect: EffectType {
                stat: StatKind::Health,
                channel: EffectChannel::Direct,
            },
            amount_min: 50.0,
            amount_max: 50.0,
            time_buff_effect: 0.0,
            time_buff_effect_max: None,
            tick_cooldown: 0.0,
            tick_cooldown_max: None,
            is_procedural: false,
            is_stackable: false,
            probability_to_apply: 1.0,
            critical_chance: 0.0,
            critical_damage_multiplier: 1.5,
            enemy_effect: true,
            max_hit_times: 2,
            buff_name: None,
        }],
    }
}

/// Swap the player's loadout for a single custom ability and trigger it.
fn arm_and_trigger(app: &mut App, player: Entity, def: AbilityDefinition) {
    let holder = AbilityHolder::new(AbilityKind::Firebolt, Arc::new(def));
    app.world_mut()
        .entity_mut(player)
        .insert(AbilityLoadout { holders: vec![holder] });
    app.world_mut()
        .send_event(AbilityTriggerEvent { actor: player, slot: 0 });
}

// ============================================================================
// Phase ordering
// ============================================================================

#[test]
fn firebolt_visits_every_phase_in_order() {
    // Mob far outside aggro range so the flight expires in peace.
    let config = scenario(
        vec!["Firebolt"],
        vec![("Wolf", [120.0, 0.0, 0.0])],
        vec![ScriptedInput {
            at: 0.2,
            action: ScriptedAction::TriggerAbility { slot: 0 },
        }],
    );
    let mut app = build_scenario_app(config).unwrap();
    // Cast 1.2 + flight 2.5 + active 0.5 + cooldown 3.0 ~= 7.2s.
    step(&mut app, 8 * 60);

    let transitions = phase_transitions(&app, "Firebolt");
    let sequence: Vec<&str> = transitions.iter().map(|(_, to)| to.as_str()).collect();
    assert_eq!(
        sequence,
        vec!["Casting", "Launching", "Active", "InCooldown", "Ready"],
        "full transitions: {transitions:?}"
    );
}

#[test]
fn instant_ability_never_visits_casting() {
    let config = scenario(
        vec!["SecondWind"],
        vec![],
        vec![ScriptedInput {
            at: 0.2,
            action: ScriptedAction::TriggerAbility { slot: 0 },
        }],
    );
    let mut app = build_scenario_app(config).unwrap();
    step(&mut app, 120);

    let transitions = phase_transitions(&app, "Second Wind");
    assert!(!transitions.is_empty());
    assert_eq!(transitions[0].1, "Launching");
    assert!(
        transitions.iter().all(|(_, to)| to != "Casting"),
        "Casting must be skipped entirely: {transitions:?}"
    );
}

// ============================================================================
// Targeting
// ============================================================================

#[test]
fn immune_caster_is_excluded_from_its_own_area_effect() {
    let config = scenario(
        vec!["Firebolt"],
        vec![("Wolf", [3.0, 0.0, 0.0]), ("Wolf", [-3.0, 0.0, 0.0])],
        vec![],
    );
    let mut app = build_scenario_app(config).unwrap();
    step(&mut app, 1);

    let player = find_actor(&mut app, "Player");
    arm_and_trigger(&mut app, player, area_blast(true, false));
    step(&mut app, 10);

    // Both wolves inside the volume were hit; the caster's own collider
    // overlapped it too but was excluded.
    assert!((health_of(&mut app, player) - 100.0).abs() < 0.5);
    let mut wolves_hit = 0;
    let mut query = app.world_mut().query::<(&ActorName, &Vitals)>();
    for (name, vitals) in query.iter(app.world()) {
        if name.0 == "Wolf" && vitals.current(StatKind::Health).unwrap() < 60.0 {
            wolves_hit += 1;
        }
    }
    assert_eq!(wolves_hit, 2);
}

#[test]
fn multi_hit_cap_limits_colliders_hit() {
    // Five wolves in the blast, cap of two per effect.
    let config = scenario(
        vec!["Firebolt"],
        vec![
            ("Wolf", [2.0, 0.0, 0.0]),
            ("Wolf", [-2.0, 0.0, 0.0]),
            ("Wolf", [0.0, 0.0, 2.0]),
            ("Wolf", [0.0, 0.0, -2.0]),
            ("Wolf", [3.0, 0.0, 3.0]),
        ],
        vec![],
    );
    let mut app = build_scenario_app(config).unwrap();
    step(&mut app, 1);

    let player = find_actor(&mut app, "Player");
    arm_and_trigger(&mut app, player, area_blast(true, true));
    step(&mut app, 10);

    let mut wolves_hit = 0;
    let mut query = app.world_mut().query::<(&ActorName, &Vitals)>();
    for (name, vitals) in query.iter(app.world()) {
        if name.0 == "Wolf" && vitals.current(StatKind::Health).unwrap() < 60.0 {
            wolves_hit += 1;
        }
    }
    assert_eq!(wolves_hit, 2, "max_hit_times=2 must cap a 5-collider overlap");
}

// ============================================================================
// Timed-effect semantics through the full pipeline
// ============================================================================

#[test]
fn non_stackable_dot_refreshes_instead_of_stacking() {
    let config = scenario(vec!["Firebolt"], vec![], vec![]);
    let mut app = build_scenario_app(config).unwrap();
    step(&mut app, 1);
    let player = find_actor(&mut app, "Player");

    let dot = {
        let book = app.world().resource::<AbilityBook>();
        // VenomSpit's second effect is the non-stackable "Raider Venom" DoT.
        book.get_expected(AbilityKind::VenomSpit).effects[1].clone()
    };
    assert!(!dot.is_stackable);

    for _ in 0..2 {
        app.world_mut().send_event(EffectRequest {
            caster: player,
            target: player,
            ability: AbilityKind::VenomSpit,
            ability_name: "Venom Spit".to_string(),
            effect: dot.clone(),
        });
        step(&mut app, 5);
    }

    let vitals = app.world().get::<Vitals>(player).unwrap();
    let pool = vitals.pool(StatKind::Health).unwrap();
    assert_eq!(pool.active_effect_count("Raider Venom"), 1);
    // Timer was reset by the second application: nearly the full duration
    // remains even though ~10 frames passed since the first one.
    assert!(pool.effect_remaining("Raider Venom").unwrap() > 4.5);
}

#[test]
fn stackable_buff_runs_independent_timers() {
    let config = scenario(vec!["Firebolt"], vec![], vec![]);
    let mut app = build_scenario_app(config).unwrap();
    step(&mut app, 1);
    let player = find_actor(&mut app, "Player");

    let regen = {
        let book = app.world().resource::<AbilityBook>();
        book.get_expected(AbilityKind::SecondWind).effects[1].clone()
    };
    assert!(regen.is_stackable);

    for _ in 0..2 {
        app.world_mut().send_event(EffectRequest {
            caster: player,
            target: player,
            ability: AbilityKind::SecondWind,
            ability_name: "Second Wind".to_string(),
            effect: regen.clone(),
        });
        step(&mut app, 2);
    }

    let vitals = app.world().get::<Vitals>(player).unwrap();
    let pool = vitals.pool(StatKind::Stamina).unwrap();
    assert_eq!(pool.active_effect_count("Second Wind"), 2);
    // Both timers contribute: effective regen = base 5 + 2 * 8.
    assert!((pool.effective_regen() - 21.0).abs() < 1e-3);
}

// ============================================================================
// Death cleanup
// ============================================================================

#[test]
fn death_halts_machines_and_freezes_pools() {
    let config = scenario(
        vec!["MendingGlow"],
        vec![("Wolf", [150.0, 0.0, 0.0])],
        vec![ScriptedInput {
            at: 0.2,
            action: ScriptedAction::TriggerAbility { slot: 0 },
        }],
    );
    let mut app = build_scenario_app(config).unwrap();
    // Let the cast get going so there is a live action to halt.
    step(&mut app, 30);
    let player = find_actor(&mut app, "Player");

    // Lethal poison straight into the pool registry.
    {
        let mut vitals = app.world_mut().get_mut::<Vitals>(player).unwrap();
        vitals.pool_mut(StatKind::Health).unwrap().add_timed_effect(TimedEffectSpec {
            name: "Lethal Poison".to_string(),
            amount: -100000.0,
            duration: 2.0,
            tick_interval: 0.1,
            channel: EffectChannel::Direct,
            procedural: true,
            stackable: false,
            polarity: EffectPolarity::Harmful,
        });
    }

    // Step until the death pipeline fires.
    let mut died_at = None;
    for frame in 0..300 {
        app.update();
        if app.world().get::<Dead>(player).is_some() {
            died_at = Some(frame);
            break;
        }
    }
    assert!(died_at.is_some(), "player should have died");

    // Every timed effect on every pool was cancelled, machines are back in
    // Ready with no live slots.
    {
        let vitals = app.world().get::<Vitals>(player).unwrap();
        for stat in [StatKind::Health, StatKind::Stamina, StatKind::Hunger] {
            assert_eq!(
                vitals.pool(stat).unwrap().active_effect_count("Lethal Poison"),
                0
            );
        }
        let loadout = app.world().get::<AbilityLoadout>(player).unwrap();
        for holder in &loadout.holders {
            assert_eq!(holder.phase(), AbilityPhase::Ready);
            assert!(holder.data.slots.is_empty());
        }
    }

    // No further mutation of the dead actor's pools - not even survival
    // decay - no matter how long the simulation keeps running.
    let snapshot: Vec<(StatKind, f32)> = {
        let vitals = app.world().get::<Vitals>(player).unwrap();
        [StatKind::Health, StatKind::Stamina, StatKind::Hunger, StatKind::Thirst]
            .into_iter()
            .map(|stat| (stat, vitals.current(stat).unwrap()))
            .collect()
    };
    step(&mut app, 240);
    let vitals = app.world().get::<Vitals>(player).unwrap();
    for (stat, value) in snapshot {
        assert_eq!(vitals.current(stat).unwrap(), value, "{stat:?} mutated after death");
    }
}

// ============================================================================
// Confirmation click flow
// ============================================================================

#[test]
fn right_click_cancels_and_left_click_places_exactly_one_trap() {
    let config = scenario(
        vec!["BriarTrap"],
        vec![("Wolf", [150.0, 0.0, 0.0])],
        vec![
            ScriptedInput {
                at: 0.2,
                action: ScriptedAction::TriggerAbility { slot: 0 },
            },
            ScriptedInput {
                at: 0.5,
                action: ScriptedAction::Click {
                    button: "Right".to_string(),
                    at: [5.0, 0.0, 5.0],
                },
            },
            ScriptedInput {
                at: 1.5,
                action: ScriptedAction::TriggerAbility { slot: 0 },
            },
            ScriptedInput {
                at: 2.0,
                action: ScriptedAction::Click {
                    button: "Left".to_string(),
                    at: [5.0, 0.0, 5.0],
                },
            },
        ],
    );
    let mut app = build_scenario_app(config).unwrap();

    // After the right click the ability must still be Ready and unused.
    step(&mut app, 60);
    {
        let player = find_actor(&mut app, "Player");
        let loadout = app.world().get::<AbilityLoadout>(player).unwrap();
        assert_eq!(loadout.holders[0].phase(), AbilityPhase::Ready);
        assert!(!loadout.holders[0].data.trigger_requested);
        let log = app.world().resource::<CombatLog>();
        assert!(log.filter_by_type(CombatLogEventType::AbilityUsed).is_empty());
    }

    // The left click resolves one world target and starts exactly one cast.
    step(&mut app, 120);
    let log = app.world().resource::<CombatLog>();
    let used = log.filter_by_type(CombatLogEventType::AbilityUsed);
    assert_eq!(used.len(), 1);
    assert!(used[0].message.contains("Briar Trap"));
}

// ============================================================================
// Mob AI end-to-end
// ============================================================================

#[test]
fn wolf_chases_and_bites_the_player() {
    let config = scenario(vec!["SecondWind"], vec![("Wolf", [10.0, 0.0, 0.0])], vec![]);
    let mut app = build_scenario_app(config).unwrap();
    step(&mut app, 15 * 60);

    let player = find_actor(&mut app, "Player");
    assert!(
        health_of(&mut app, player) < 100.0,
        "the wolf should have landed at least one bite"
    );
    let log = app.world().resource::<CombatLog>();
    assert!(log
        .filter_by_type(CombatLogEventType::Damage)
        .iter()
        .any(|entry| entry.source.as_deref() == Some("Wolf")));
}
