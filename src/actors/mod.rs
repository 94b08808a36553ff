//! Actor definitions
//!
//! Components and spawn helpers for the two actor kinds the simulation
//! knows about: the player and mobs. Which resource pools an actor carries
//! and which abilities it brings are decided here, at spawn time; everything
//! downstream (effect dispatch, movement, death) is kind-agnostic and keyed
//! off the [`ActorKind`] component.

use bevy::prelude::*;

pub mod movement;
pub mod stats;

use crate::abilities::attack_cast::{layers, Collider};
use crate::abilities::definitions::{AbilityBook, AbilityKind};
use crate::abilities::state_machine::AbilityLoadout;
use movement::{MobBrain, PlayerLocomotion, PlayerMoveIntent};
use stats::{StatKind, Vitals};

/// Which handler family an effect is routed through when it lands on this
/// actor. Carried as an explicit component instead of probing for marker
/// components at dispatch time.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorKind {
    Player,
    Mob,
}

impl ActorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActorKind::Player => "Player",
            ActorKind::Mob => "Mob",
        }
    }
}

/// Display name for log attribution.
#[derive(Component, Debug, Clone)]
pub struct ActorName(pub String);

/// Marker inserted by death cleanup. Dead actors are excluded from every
/// driver query, so nothing ticks or mutates them afterwards.
#[derive(Component, Debug, Clone, Copy)]
pub struct Dead;

// ============================================================================
// Mob kinds
// ============================================================================

/// Available mob kinds, each with its own pool set and brain tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MobKind {
    Wolf,
    Raider,
    ForestTroll,
}

impl MobKind {
    pub fn all() -> &'static [MobKind] {
        &[MobKind::Wolf, MobKind::Raider, MobKind::ForestTroll]
    }

    /// Get the display name.
    pub fn name(&self) -> &'static str {
        match self {
            MobKind::Wolf => "Wolf",
            MobKind::Raider => "Raider",
            MobKind::ForestTroll => "Forest Troll",
        }
    }

    /// Pool set for this kind. Mobs carry fewer pools than the player; an
    /// effect aimed at a pool the mob lacks is skipped at dispatch.
    pub fn vitals(&self) -> Vitals {
        match self {
            MobKind::Wolf => Vitals::new()
                .with_pool(StatKind::Health, 60.0, 0.0)
                .with_pool(StatKind::Stamina, 80.0, 4.0)
                .with_pool(StatKind::Speed, 8.0, 0.0),
            MobKind::Raider => Vitals::new()
                .with_pool(StatKind::Health, 90.0, 0.2)
                .with_pool(StatKind::Stamina, 90.0, 4.0)
                .with_pool(StatKind::Mana, 40.0, 1.0)
                .with_pool(StatKind::Speed, 5.5, 0.0),
            MobKind::ForestTroll => Vitals::new()
                .with_pool(StatKind::Health, 220.0, 1.0)
                .with_pool(StatKind::Stamina, 120.0, 3.0)
                .with_pool(StatKind::Speed, 4.0, 0.0),
        }
    }

    /// Default ability loadout when a scenario does not override it.
    pub fn default_abilities(&self) -> &'static [AbilityKind] {
        match self {
            MobKind::Wolf => &[AbilityKind::MawBite, AbilityKind::ChillingHowl],
            MobKind::Raider => &[AbilityKind::VenomSpit, AbilityKind::MawBite],
            MobKind::ForestTroll => &[AbilityKind::Quake, AbilityKind::MawBite],
        }
    }

    pub fn collider_radius(&self) -> f32 {
        match self {
            MobKind::Wolf => 0.6,
            MobKind::Raider => 0.5,
            MobKind::ForestTroll => 1.1,
        }
    }

    /// Distance at which the brain switches from wandering to chasing.
    pub fn aggro_radius(&self) -> f32 {
        match self {
            MobKind::Wolf => 14.0,
            MobKind::Raider => 12.0,
            MobKind::ForestTroll => 10.0,
        }
    }

    /// Distance at which the brain starts triggering its abilities.
    pub fn attack_range(&self) -> f32 {
        match self {
            MobKind::Wolf => 1.8,
            MobKind::Raider => 9.0,
            MobKind::ForestTroll => 3.0,
        }
    }
}

/// The player's full pool set. Hunger/thirst/sleep decay slowly (negative
/// base regen); stamina and oxygen recover on their own.
pub fn player_vitals() -> Vitals {
    Vitals::new()
        .with_pool(StatKind::Health, 100.0, 0.5)
        .with_pool(StatKind::Stamina, 100.0, 5.0)
        .with_pool(StatKind::Hunger, 100.0, -0.15)
        .with_pool(StatKind::Thirst, 100.0, -0.25)
        .with_pool(StatKind::Weight, 60.0, 0.0)
        .with_pool(StatKind::Speed, 6.0, 0.0)
        .with_pool(StatKind::Sleep, 100.0, -0.05)
        .with_pool(StatKind::Sanity, 100.0, 0.0)
        .with_pool(StatKind::Mana, 100.0, 1.5)
        .with_pool(StatKind::BodyHeat, 100.0, 0.0)
        .with_pool(StatKind::Oxygen, 100.0, 10.0)
}

// ============================================================================
// Spawn helpers
// ============================================================================

/// Spawn the player actor with the given ability loadout.
pub fn spawn_player(
    commands: &mut Commands,
    book: &AbilityBook,
    position: Vec3,
    abilities: &[AbilityKind],
) -> Result<Entity, String> {
    let loadout = AbilityLoadout::from_kinds(book, abilities)?;
    Ok(commands
        .spawn((
            Transform::from_translation(position),
            ActorKind::Player,
            ActorName("Player".to_string()),
            player_vitals(),
            Collider {
                radius: 0.5,
                layers: layers::PLAYER,
            },
            loadout,
            PlayerLocomotion::new(),
            PlayerMoveIntent::default(),
        ))
        .id())
}

/// Spawn a mob of the given kind. `abilities` overrides the kind's default
/// loadout when non-empty.
pub fn spawn_mob(
    commands: &mut Commands,
    book: &AbilityBook,
    kind: MobKind,
    position: Vec3,
    abilities: &[AbilityKind],
) -> Result<Entity, String> {
    let kinds: &[AbilityKind] = if abilities.is_empty() {
        kind.default_abilities()
    } else {
        abilities
    };
    let loadout = AbilityLoadout::from_kinds(book, kinds)?;
    Ok(commands
        .spawn((
            Transform::from_translation(position),
            ActorKind::Mob,
            ActorName(kind.name().to_string()),
            kind.vitals(),
            Collider {
                radius: kind.collider_radius(),
                layers: layers::MOB,
            },
            loadout,
            MobBrain::new(kind, position),
        ))
        .id())
}
