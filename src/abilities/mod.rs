//! Ability system
//!
//! Everything between "slot N triggered" and pool deltas landing on targets:
//! - `definitions`: authored ability data (RON), load-time policy derivation
//! - `state_machine`: the per-caster phase machine (Ready -> Casting ->
//!   Launching -> Active -> InCooldown)
//! - `attack_cast`: geometric targeting volumes and raycasts
//! - `effects`: effect application into resource pools
//! - `runtime`: the ECS drivers and the visual-effect collaborator stub

pub mod attack_cast;
pub mod definitions;
pub mod effects;
pub mod runtime;
pub mod state_machine;

pub use definitions::{AbilityBook, AbilityBookPlugin, AbilityKind};
pub use state_machine::{AbilityLoadout, AbilityPhase};
