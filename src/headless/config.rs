//! JSON configuration parsing for headless scenarios
//!
//! Parses scenario configurations and validates them before the app is
//! built, so a typo in an ability or mob name fails fast instead of
//! mid-simulation.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::abilities::definitions::AbilityKind;
use crate::actors::MobKind;
use crate::combat::events::ClickButton;

/// Headless scenario configuration loaded from JSON.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// The player actor.
    pub player: PlayerSetup,
    /// Mob spawns (may be empty for pure survival runs).
    #[serde(default)]
    pub mobs: Vec<MobSetup>,
    /// Maximum scenario duration in seconds (default: 120).
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f32,
    /// Random seed for deterministic reproduction.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Custom output path for the combat log (optional).
    #[serde(default)]
    pub output_path: Option<String>,
    /// Timed input events standing in for the live input layer.
    #[serde(default)]
    pub script: Vec<ScriptedInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSetup {
    #[serde(default)]
    pub position: [f32; 3],
    /// Ability loadout, by name (1+ slots).
    pub abilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobSetup {
    /// Mob kind name ("Wolf", "Raider", "ForestTroll").
    pub kind: String,
    pub position: [f32; 3],
    /// Loadout override; empty = the kind's default abilities.
    #[serde(default)]
    pub abilities: Vec<String>,
}

/// One scripted input at a point in scenario time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedInput {
    /// Scenario time in seconds at which the input fires.
    pub at: f32,
    pub action: ScriptedAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScriptedAction {
    /// Trigger the player's ability slot.
    TriggerAbility { slot: usize },
    /// Click at a world position ("Left" or "Right").
    Click { button: String, at: [f32; 3] },
    /// Start moving the player.
    Move {
        direction: [f32; 3],
        #[serde(default)]
        running: bool,
    },
    /// Stop moving.
    Stop,
}

fn default_max_duration() -> f32 {
    120.0
}

impl ScenarioConfig {
    /// Load configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;

        let config: ScenarioConfig =
            serde_json::from_str(&contents).map_err(|e| format!("Failed to parse JSON: {e}"))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.player.abilities.is_empty() {
            return Err("player needs at least one ability".to_string());
        }
        for name in &self.player.abilities {
            AbilityKind::parse(name)?;
        }
        for mob in &self.mobs {
            parse_mob_kind(&mob.kind)?;
            for name in &mob.abilities {
                AbilityKind::parse(name)?;
            }
        }
        if self.max_duration_secs <= 0.0 {
            return Err("max_duration_secs must be positive".to_string());
        }
        for input in &self.script {
            if input.at < 0.0 {
                return Err("script times must be non-negative".to_string());
            }
            if let ScriptedAction::Click { button, .. } = &input.action {
                parse_click_button(button)?;
            }
        }
        Ok(())
    }

    /// The player's loadout as parsed ability kinds.
    pub fn player_abilities(&self) -> Vec<AbilityKind> {
        self.player
            .abilities
            .iter()
            .filter_map(|name| AbilityKind::parse(name).ok())
            .collect()
    }

    /// A small built-in demo scenario used when no config file is given.
    pub fn demo() -> Self {
        Self {
            player: PlayerSetup {
                position: [0.0, 0.0, 0.0],
                abilities: vec!["Firebolt".to_string(), "SecondWind".to_string()],
            },
            mobs: vec![MobSetup {
                kind: "Wolf".to_string(),
                position: [12.0, 0.0, 0.0],
                abilities: vec![],
            }],
            max_duration_secs: 60.0,
            random_seed: Some(1),
            output_path: None,
            script: vec![
                ScriptedInput {
                    at: 0.5,
                    action: ScriptedAction::TriggerAbility { slot: 0 },
                },
                ScriptedInput {
                    at: 4.0,
                    action: ScriptedAction::TriggerAbility { slot: 0 },
                },
            ],
        }
    }
}

/// Parse a mob kind name.
pub fn parse_mob_kind(name: &str) -> Result<MobKind, String> {
    match name {
        "Wolf" => Ok(MobKind::Wolf),
        "Raider" => Ok(MobKind::Raider),
        "ForestTroll" | "Forest Troll" => Ok(MobKind::ForestTroll),
        _ => Err(format!(
            "Unknown mob kind: '{name}'. Valid kinds: Wolf, Raider, ForestTroll"
        )),
    }
}

/// Parse a click button name.
pub fn parse_click_button(name: &str) -> Result<ClickButton, String> {
    match name {
        "Left" => Ok(ClickButton::Left),
        "Right" => Ok(ClickButton::Right),
        _ => Err(format!("Unknown click button: '{name}'. Valid: Left, Right")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_config_validates() {
        assert!(ScenarioConfig::demo().validate().is_ok());
    }

    #[test]
    fn unknown_ability_is_rejected() {
        let mut config = ScenarioConfig::demo();
        config.player.abilities = vec!["Megabolt".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_mob_kind_is_rejected() {
        let mut config = ScenarioConfig::demo();
        config.mobs[0].kind = "Dragon".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_click_button_is_rejected() {
        let mut config = ScenarioConfig::demo();
        config.script.push(ScriptedInput {
            at: 1.0,
            action: ScriptedAction::Click {
                button: "Middle".to_string(),
                at: [0.0, 0.0, 0.0],
            },
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = ScenarioConfig::demo();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ScenarioConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.player.abilities, config.player.abilities);
        assert_eq!(parsed.mobs.len(), 1);
        assert_eq!(parsed.random_seed, Some(1));
    }
}
