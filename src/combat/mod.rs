//! Combat simulation wiring
//!
//! Wires the per-frame pipeline together:
//! - Events between the input layer, ability drivers and effect application
//! - The [`CombatLog`] resource and the seeded [`GameRng`]
//! - Ordered system phases so effect application within a frame is
//!   well-defined (dispatch order, no batching)
//!
//! The whole simulation is single-threaded per frame from the perspective of
//! shared state: system sets are chained, so two casters targeting the same
//! actor mutate its pools in dispatch order.

use bevy::prelude::*;
use rand::prelude::*;
use rand::rngs::StdRng;

pub mod events;
pub mod log;

use crate::abilities::effects::apply_effect_requests;
use crate::abilities::runtime::{
    collect_ability_triggers, drive_ability_machines, expire_vfx, late_drive_ability_machines,
};
use crate::actors::movement::{drive_mob_brains, drive_player_locomotion};
use crate::actors::stats::{death_cleanup, detect_deaths, tick_vitals};
use events::*;
use log::{advance_log_clock, CombatLog};

/// System set labels for the per-frame simulation phases.
///
/// Use these to order custom systems against the core pipeline.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimSystemPhase {
    /// Clock/log upkeep and input intake (scripted or live)
    Inputs,
    /// Movement and AI brains (may request ability triggers)
    Brains,
    /// Ability phase machines, targeting, effect dispatch
    Abilities,
    /// Effect application into resource pools
    Effects,
    /// Pool ticking, death detection and cleanup, vfx expiry
    Resolution,
}

/// Configures the ordering between simulation phases.
///
/// Call this once during app setup before adding simulation systems.
pub fn configure_sim_system_ordering(app: &mut App) {
    app.configure_sets(
        Update,
        (
            SimSystemPhase::Inputs,
            SimSystemPhase::Brains,
            SimSystemPhase::Abilities,
            SimSystemPhase::Effects,
            SimSystemPhase::Resolution,
        )
            .chain(),
    );
}

/// Adds the core simulation systems. Both the default binary and test
/// harnesses go through here so internal renames stay contained.
pub fn add_core_sim_systems(app: &mut App) {
    app.add_systems(
        Update,
        (advance_log_clock, sync_simulation_speed, collect_ability_triggers)
            .chain()
            .in_set(SimSystemPhase::Inputs),
    );
    app.add_systems(
        Update,
        (drive_player_locomotion, drive_mob_brains)
            .chain()
            .in_set(SimSystemPhase::Brains),
    );
    app.add_systems(
        Update,
        drive_ability_machines.in_set(SimSystemPhase::Abilities),
    );
    app.add_systems(Update, apply_effect_requests.in_set(SimSystemPhase::Effects));
    app.add_systems(
        Update,
        (tick_vitals, detect_deaths, death_cleanup, expire_vfx)
            .chain()
            .in_set(SimSystemPhase::Resolution),
    );
    // Second pass: camera-order-dependent hooks (vfx position sync).
    app.add_systems(PostUpdate, late_drive_ability_machines);
}

/// Plugin for the full combat simulation pipeline.
pub struct CombatPlugin;

impl Plugin for CombatPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<AbilityTriggerEvent>()
            .add_event::<PointerClickEvent>()
            .add_event::<EffectRequest>()
            .add_event::<ActorDeathEvent>()
            .add_event::<AnimationRequest>()
            .init_resource::<CombatLog>()
            .init_resource::<SimulationSpeed>()
            .init_resource::<GameRng>();

        configure_sim_system_ordering(app);
        add_core_sim_systems(app);
    }
}

// ============================================================================
// Shared resources
// ============================================================================

/// Seeded random number generator for deterministic simulation.
///
/// When a seed is provided (e.g., via scenario config), the same seed always
/// produces the same scenario outcome. Without a seed, uses system entropy.
#[derive(Resource)]
pub struct GameRng {
    rng: StdRng,
    /// The seed used to initialize this RNG (if deterministic)
    pub seed: Option<u64>,
}

impl GameRng {
    /// Create a new GameRng with a specific seed for deterministic behavior.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Create a new GameRng with random entropy (non-deterministic).
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Generate a random f32 in the range [0.0, 1.0).
    pub fn random_f32(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Generate a random f32 in the given range.
    pub fn random_range(&mut self, min: f32, max: f32) -> f32 {
        min + self.random_f32() * (max - min)
    }
}

impl Default for GameRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// Controls the speed of the simulation. Mapped onto the virtual clock, so
/// pausing freezes every phase deadline uniformly.
#[derive(Resource)]
pub struct SimulationSpeed {
    pub multiplier: f32,
}

impl Default for SimulationSpeed {
    fn default() -> Self {
        Self { multiplier: 1.0 }
    }
}

impl SimulationSpeed {
    pub fn pause(&mut self) {
        self.multiplier = 0.0;
    }

    pub fn normal_speed(&mut self) {
        self.multiplier = 1.0;
    }

    pub fn is_paused(&self) -> bool {
        self.multiplier == 0.0
    }
}

/// Apply [`SimulationSpeed`] to the virtual clock whenever it changes.
fn sync_simulation_speed(speed: Res<SimulationSpeed>, mut time: ResMut<Time<Virtual>>) {
    if !speed.is_changed() {
        return;
    }
    if speed.is_paused() {
        time.pause();
    } else {
        time.unpause();
        time.set_relative_speed(speed.multiplier);
    }
}
