//! Combat events
//!
//! Cross-module events flowing through the simulation each frame. These are
//! also the narrow seams to the excluded collaborators: the input layer feeds
//! [`AbilityTriggerEvent`] and [`PointerClickEvent`] in, the animation layer
//! consumes [`AnimationRequest`] out.

use bevy::prelude::*;

use crate::abilities::definitions::{AbilityKind, AttackEffect};

/// Discrete "ability slot N triggered" signal from the input collaborator
/// (or from a mob brain deciding to attack).
#[derive(Event, Debug, Clone, Copy)]
pub struct AbilityTriggerEvent {
    /// The caster whose loadout slot is being triggered.
    pub actor: Entity,
    /// Zero-based index into the caster's ability loadout.
    pub slot: usize,
}

/// Mouse button as seen by the confirmation-wait subroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickButton {
    Left,
    Right,
}

/// A pointer click sampled this frame, carried as a world-space ray so the
/// core never talks to a camera directly.
#[derive(Event, Debug, Clone, Copy)]
pub struct PointerClickEvent {
    pub button: ClickButton,
    /// Ray origin in world space.
    pub origin: Vec3,
    /// Normalized ray direction.
    pub direction: Vec3,
}

/// One attack effect to apply to one target. Emitted by the ability driver
/// after targeting resolution; consumed by the effect-application system.
#[derive(Event, Debug, Clone)]
pub struct EffectRequest {
    pub caster: Entity,
    pub target: Entity,
    pub ability: AbilityKind,
    /// Display name of the ability, for log attribution.
    pub ability_name: String,
    pub effect: AttackEffect,
}

/// Fired once when an actor's health pool reaches zero.
#[derive(Event, Debug, Clone, Copy)]
pub struct ActorDeathEvent {
    pub actor: Entity,
}

/// "Play/crossfade named animation state" request for the (external)
/// animation collaborator. The core pushes these and never reads back.
#[derive(Event, Debug, Clone)]
pub struct AnimationRequest {
    pub actor: Entity,
    /// Name of the animation state to crossfade into.
    pub state: String,
    /// Blend time in seconds.
    pub crossfade: f32,
}
