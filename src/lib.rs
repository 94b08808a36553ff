//! wildsim - Survival RPG ability & combat simulation prototype
//!
//! A headless, frame-stepped simulation of a survival RPG's combat core:
//! ability phase machines (cast -> launch -> active -> cooldown), a generic
//! resource pool engine with timed buffs/debuffs, shape-based targeting, and
//! mob AI - all driven by the same reusable state machine framework.
//!
//! This library exposes the core game modules for testing and reuse.

pub mod abilities;
pub mod actors;
pub mod cli;
pub mod combat;
pub mod headless;
pub mod machine;

// Re-export commonly used types
pub use abilities::{AbilityBook, AbilityKind, AbilityLoadout, AbilityPhase};
pub use actors::{ActorKind, MobKind};
pub use combat::log::{CombatLog, CombatLogEventType};
pub use combat::{CombatPlugin, GameRng};
pub use headless::{ScenarioConfig, ScenarioResult};
