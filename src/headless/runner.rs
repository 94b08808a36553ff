//! Headless scenario execution
//!
//! Builds a windowless app around the combat simulation and steps it at a
//! fixed, deterministic 60 Hz virtual timestep until the scenario resolves
//! (player death, last mob down, or timeout).

use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;

use crate::abilities::definitions::{AbilityBookPlugin, AbilityKind};
use crate::actors::movement::PlayerMoveIntent;
use crate::actors::stats::{death_cleanup, Vitals};
use crate::actors::{spawn_mob, spawn_player, ActorKind, ActorName, Dead, MobKind};
use crate::abilities::definitions::AbilityBook;
use crate::combat::events::{AbilityTriggerEvent, PointerClickEvent};
use crate::combat::log::{ActorMetadata, CombatLog, CombatLogEventType, ScenarioMetadata};
use crate::combat::{CombatPlugin, GameRng, SimSystemPhase};
use crate::abilities::runtime::collect_ability_triggers;
use crate::actors::stats::StatKind;

use super::config::{parse_click_button, parse_mob_kind, ScenarioConfig, ScriptedAction};

/// Result of a completed headless scenario.
///
/// Provides programmatic access to the outcome for testing and analysis.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// "player survived", "player died" or "timeout".
    pub outcome: String,
    pub player_survived: bool,
    /// Simulated seconds the scenario ran for.
    pub elapsed: f32,
    /// Random seed used (if deterministic mode).
    pub random_seed: Option<u64>,
    /// Final per-actor statistics.
    pub actors: Vec<ActorMetadata>,
}

/// Resource tracking headless scenario state.
#[derive(Resource)]
pub struct HeadlessState {
    pub max_duration: f32,
    pub elapsed: f32,
    pub scenario_complete: bool,
    pub output_path: Option<String>,
    pub random_seed: Option<u64>,
    /// How many mobs the scenario spawned (0 = survival-only run).
    pub total_mobs: usize,
    pub result: Option<ScenarioResult>,
}

/// Scripted inputs, sorted by time, drained as scenario time passes.
#[derive(Resource)]
struct ScriptQueue {
    events: Vec<super::config::ScriptedInput>,
    cursor: usize,
}

/// The player entity, once spawned.
#[derive(Resource)]
struct PlayerHandle(Entity);

/// Plugin for headless scenario execution.
pub struct HeadlessScenarioPlugin {
    pub config: ScenarioConfig,
}

impl Plugin for HeadlessScenarioPlugin {
    fn build(&self, app: &mut App) {
        let mut script = self.config.script.clone();
        script.sort_by(|a, b| a.at.total_cmp(&b.at));

        // Seeded RNG for deterministic runs; overrides the default entropy
        // RNG the combat plugin installed.
        let rng = match self.config.random_seed {
            Some(seed) => {
                info!("Using deterministic RNG with seed: {seed}");
                GameRng::from_seed(seed)
            }
            None => GameRng::from_entropy(),
        };

        app.insert_resource(self.config.clone())
            .insert_resource(rng)
            .insert_resource(HeadlessState {
                max_duration: self.config.max_duration_secs,
                elapsed: 0.0,
                scenario_complete: false,
                output_path: self.config.output_path.clone(),
                random_seed: self.config.random_seed,
                total_mobs: self.config.mobs.len(),
                result: None,
            })
            .insert_resource(ScriptQueue { events: script, cursor: 0 });

        app.add_systems(Startup, headless_setup);
        app.add_systems(
            Update,
            pump_scenario_script
                .in_set(SimSystemPhase::Inputs)
                .before(collect_ability_triggers),
        );
        app.add_systems(
            Update,
            (headless_track_time, headless_check_end)
                .chain()
                .in_set(SimSystemPhase::Resolution)
                .after(death_cleanup),
        );
        app.add_systems(PostUpdate, headless_exit_on_complete);
    }
}

/// Spawn the scenario's actors.
fn headless_setup(
    mut commands: Commands,
    book: Res<AbilityBook>,
    config: Res<ScenarioConfig>,
    mut log: ResMut<CombatLog>,
) {
    log.clear();
    log.log(
        CombatLogEventType::Scenario,
        "Scenario started (headless mode)".to_string(),
    );

    let player_abilities: Vec<AbilityKind> = config.player_abilities();
    match spawn_player(
        &mut commands,
        &book,
        Vec3::from(config.player.position),
        &player_abilities,
    ) {
        Ok(player) => {
            commands.insert_resource(PlayerHandle(player));
        }
        Err(e) => {
            // Misconfigured player: log and let the scenario time out.
            error!("failed to spawn player: {e}");
        }
    }

    for mob in &config.mobs {
        let kind = match parse_mob_kind(&mob.kind) {
            Ok(kind) => kind,
            Err(e) => {
                error!("failed to spawn mob: {e}");
                continue;
            }
        };
        let abilities: Vec<AbilityKind> = mob
            .abilities
            .iter()
            .filter_map(|name| AbilityKind::parse(name).ok())
            .collect();
        if let Err(e) = spawn_mob(&mut commands, &book, kind, Vec3::from(mob.position), &abilities)
        {
            error!("failed to spawn {}: {e}", kind.name());
        }
    }

    info!(
        "Headless scenario setup complete: player vs {} mobs",
        config.mobs.len()
    );
}

/// Feed due script events into the simulation as input events.
fn pump_scenario_script(
    time: Res<Time>,
    mut queue: ResMut<ScriptQueue>,
    player: Option<Res<PlayerHandle>>,
    mut triggers: EventWriter<AbilityTriggerEvent>,
    mut clicks: EventWriter<PointerClickEvent>,
    mut intents: Query<&mut PlayerMoveIntent>,
) {
    let Some(player) = player else {
        return;
    };
    let now = time.elapsed_secs();
    while queue.cursor < queue.events.len() && queue.events[queue.cursor].at <= now {
        let input = queue.events[queue.cursor].clone();
        queue.cursor += 1;
        match input.action {
            ScriptedAction::TriggerAbility { slot } => {
                triggers.send(AbilityTriggerEvent {
                    actor: player.0,
                    slot,
                });
            }
            ScriptedAction::Click { button, at } => {
                let Ok(button) = parse_click_button(&button) else {
                    continue;
                };
                // Stand-in for a camera ray: straight down onto the point.
                clicks.send(PointerClickEvent {
                    button,
                    origin: Vec3::from(at) + Vec3::Y * 30.0,
                    direction: Vec3::NEG_Y,
                });
            }
            ScriptedAction::Move { direction, running } => {
                if let Ok(mut intent) = intents.get_mut(player.0) {
                    intent.direction = Vec3::from(direction);
                    intent.running = running;
                }
            }
            ScriptedAction::Stop => {
                if let Ok(mut intent) = intents.get_mut(player.0) {
                    intent.direction = Vec3::ZERO;
                    intent.running = false;
                }
            }
        }
    }
}

/// Track elapsed scenario time for timeout detection.
fn headless_track_time(time: Res<Time>, mut state: ResMut<HeadlessState>) {
    if !state.scenario_complete {
        state.elapsed += time.delta_secs();
    }
}

/// Check whether the scenario has resolved.
fn headless_check_end(
    actors: Query<(&ActorKind, &ActorName, &Vitals, Option<&Dead>)>,
    mut state: ResMut<HeadlessState>,
    mut log: ResMut<CombatLog>,
) {
    if state.scenario_complete {
        return;
    }

    let player_alive = actors
        .iter()
        .any(|(kind, _, _, dead)| *kind == ActorKind::Player && dead.is_none());
    let mobs_alive = actors
        .iter()
        .filter(|(kind, _, _, dead)| **kind == ActorKind::Mob && dead.is_none())
        .count();

    let timeout = state.elapsed >= state.max_duration;
    let cleared = state.total_mobs > 0 && mobs_alive == 0;

    let outcome = if !player_alive {
        "player died"
    } else if cleared {
        "player survived"
    } else if timeout {
        "timeout"
    } else {
        return;
    };

    log.log(
        CombatLogEventType::Scenario,
        format!("Scenario ended after {:.1}s: {outcome}", state.elapsed),
    );

    let actor_reports: Vec<ActorMetadata> = actors
        .iter()
        .map(|(kind, name, vitals, dead)| ActorMetadata {
            name: name.0.clone(),
            kind: kind.name().to_string(),
            survived: dead.is_none(),
            final_health: vitals.current(StatKind::Health).unwrap_or(0.0),
            max_health: vitals
                .pool(StatKind::Health)
                .map(|p| p.max())
                .unwrap_or(0.0),
        })
        .collect();

    let metadata = ScenarioMetadata {
        outcome: outcome.to_string(),
        elapsed: state.elapsed,
        random_seed: state.random_seed,
        actors: actor_reports.clone(),
    };
    if let Some(path) = state.output_path.clone() {
        match log.save_to_file(&metadata, Some(&path)) {
            Ok(filename) => println!("Scenario complete. Log saved to: {filename}"),
            Err(e) => eprintln!("Failed to save combat log: {e}"),
        }
    }

    state.result = Some(ScenarioResult {
        outcome: outcome.to_string(),
        player_survived: player_alive,
        elapsed: state.elapsed,
        random_seed: state.random_seed,
        actors: actor_reports,
    });
    state.scenario_complete = true;
}

/// Exit the app when the scenario is complete.
fn headless_exit_on_complete(state: Res<HeadlessState>, mut exit: EventWriter<AppExit>) {
    if state.scenario_complete {
        exit.send(AppExit::Success);
    }
}

/// Build a windowless app for the given scenario. Tests step the returned
/// app manually with `app.update()`; `run_headless_scenario` runs it to
/// completion.
pub fn build_scenario_app(config: ScenarioConfig) -> Result<App, String> {
    config.validate()?;

    let mut app = App::new();
    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)),
    );
    app.add_plugins(TransformPlugin);
    // Fixed virtual timestep: every update advances the clock by exactly one
    // 60 Hz frame, independent of wall time. This is what makes seeded runs
    // reproducible.
    app.insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
        1.0 / 60.0,
    )));
    app.add_plugins(AbilityBookPlugin);
    app.add_plugins(CombatPlugin);
    app.add_plugins(HeadlessScenarioPlugin { config });
    Ok(app)
}

/// Run a headless scenario to completion with the given configuration.
pub fn run_headless_scenario(config: ScenarioConfig) -> Result<ScenarioResult, String> {
    println!("Starting headless scenario...");
    println!("  Player abilities: {:?}", config.player.abilities);
    println!("  Mobs: {}", config.mobs.len());
    println!("  Max duration: {:.0}s", config.max_duration_secs);

    let mut app = build_scenario_app(config)?;
    app.run();

    app.world()
        .resource::<HeadlessState>()
        .result
        .clone()
        .ok_or_else(|| "scenario ended without a result".to_string())
}
