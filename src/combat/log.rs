//! Combat logging
//!
//! Records all simulation events for display and post-scenario analysis.
//! Headless runs export the log as JSON next to a scenario summary.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// A single entry in the combat log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatLogEntry {
    /// Timestamp in simulation time (seconds since scenario start).
    pub timestamp: f32,
    /// The type of event.
    pub event_type: CombatLogEventType,
    /// Actor that caused the event, if attributable.
    pub source: Option<String>,
    /// Actor the event happened to, if any.
    pub target: Option<String>,
    /// Magnitude for damage/healing entries.
    pub amount: Option<f32>,
    /// Human-readable description of the event.
    pub message: String,
}

/// Types of combat log events for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatLogEventType {
    /// Damage dealt to a resource pool
    Damage,
    /// Healing/restoration applied to a resource pool
    Healing,
    /// A timed effect was registered on a pool
    EffectApplied,
    /// A timed effect expired or was cancelled
    EffectRemoved,
    /// An ability changed phase (Ready -> Casting -> ...)
    AbilityPhase,
    /// An ability action was started
    AbilityUsed,
    /// An actor died
    Death,
    /// Scenario event (start, end, timeout)
    Scenario,
}

/// The combat log resource storing all events.
#[derive(Resource, Default)]
pub struct CombatLog {
    /// All log entries in chronological order.
    pub entries: Vec<CombatLogEntry>,
    /// Current simulation time, advanced once per frame.
    pub sim_time: f32,
}

impl CombatLog {
    /// Clear the log for a new scenario.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.sim_time = 0.0;
    }

    /// Add a plain entry to the log.
    pub fn log(&mut self, event_type: CombatLogEventType, message: String) {
        self.entries.push(CombatLogEntry {
            timestamp: self.sim_time,
            event_type,
            source: None,
            target: None,
            amount: None,
            message,
        });
    }

    /// Log a damage event with structured attribution.
    pub fn log_damage(&mut self, source: &str, target: &str, ability: &str, amount: f32, crit: bool) {
        let crit_tag = if crit { " (critical)" } else { "" };
        self.entries.push(CombatLogEntry {
            timestamp: self.sim_time,
            event_type: CombatLogEventType::Damage,
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            amount: Some(amount),
            message: format!("{source}'s {ability} hits {target} for {amount:.0}{crit_tag}"),
        });
    }

    /// Log a healing/restoration event with structured attribution.
    pub fn log_healing(&mut self, source: &str, target: &str, ability: &str, amount: f32) {
        self.entries.push(CombatLogEntry {
            timestamp: self.sim_time,
            event_type: CombatLogEventType::Healing,
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            amount: Some(amount),
            message: format!("{source}'s {ability} restores {amount:.0} on {target}"),
        });
    }

    /// Log a timed effect being registered on a target's pool.
    pub fn log_effect_applied(&mut self, source: &str, target: &str, effect_name: &str, duration: f32) {
        self.entries.push(CombatLogEntry {
            timestamp: self.sim_time,
            event_type: CombatLogEventType::EffectApplied,
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            amount: None,
            message: format!("{target} gains {effect_name} ({duration:.1}s) from {source}"),
        });
    }

    /// Log a timed effect expiring or being cancelled.
    pub fn log_effect_removed(&mut self, target: &str, effect_name: &str, reason: &str) {
        self.entries.push(CombatLogEntry {
            timestamp: self.sim_time,
            event_type: CombatLogEventType::EffectRemoved,
            source: None,
            target: Some(target.to_string()),
            amount: None,
            message: format!("{target} loses {effect_name} ({reason})"),
        });
    }

    /// Log an ability phase transition.
    pub fn log_phase(&mut self, actor: &str, ability: &str, from: &str, to: &str) {
        self.entries.push(CombatLogEntry {
            timestamp: self.sim_time,
            event_type: CombatLogEventType::AbilityPhase,
            source: Some(actor.to_string()),
            target: None,
            amount: None,
            message: format!("{actor}: {ability} {from} -> {to}"),
        });
    }

    /// Log an ability action starting.
    pub fn log_ability_used(&mut self, actor: &str, ability: &str) {
        self.entries.push(CombatLogEntry {
            timestamp: self.sim_time,
            event_type: CombatLogEventType::AbilityUsed,
            source: Some(actor.to_string()),
            target: None,
            amount: None,
            message: format!("{actor} uses {ability}"),
        });
    }

    /// Log an actor's death.
    pub fn log_death(&mut self, actor: &str) {
        self.entries.push(CombatLogEntry {
            timestamp: self.sim_time,
            event_type: CombatLogEventType::Death,
            source: None,
            target: Some(actor.to_string()),
            amount: None,
            message: format!("{actor} has died"),
        });
    }

    /// Get entries filtered by event type.
    pub fn filter_by_type(&self, event_type: CombatLogEventType) -> Vec<&CombatLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Get only pool-changing events (damage and healing).
    pub fn pool_changes_only(&self) -> Vec<&CombatLogEntry> {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e.event_type,
                    CombatLogEventType::Damage | CombatLogEventType::Healing
                )
            })
            .collect()
    }

    /// Get the last N entries.
    pub fn recent(&self, count: usize) -> Vec<&CombatLogEntry> {
        self.entries.iter().rev().take(count).rev().collect()
    }

    /// Serialize the log plus scenario metadata to a JSON file.
    /// Returns the path written to.
    pub fn save_to_file(
        &self,
        metadata: &ScenarioMetadata,
        output_path: Option<&str>,
    ) -> Result<String, String> {
        let export = LogExport {
            metadata: metadata.clone(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&export)
            .map_err(|e| format!("Failed to serialize combat log: {e}"))?;
        let filename = output_path
            .map(String::from)
            .unwrap_or_else(|| "scenario_log.json".to_string());
        std::fs::write(&filename, json)
            .map_err(|e| format!("Failed to write {filename}: {e}"))?;
        Ok(filename)
    }
}

/// Final per-actor statistics exported next to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorMetadata {
    pub name: String,
    pub kind: String,
    pub survived: bool,
    pub final_health: f32,
    pub max_health: f32,
}

/// Scenario-level metadata exported next to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    /// Outcome summary ("player survived", "player died", "timeout").
    pub outcome: String,
    /// Simulated seconds the scenario ran for.
    pub elapsed: f32,
    /// Random seed used, if deterministic.
    pub random_seed: Option<u64>,
    pub actors: Vec<ActorMetadata>,
}

#[derive(Serialize)]
struct LogExport {
    metadata: ScenarioMetadata,
    entries: Vec<CombatLogEntry>,
}

/// Advance the log clock once per frame. Runs first in the frame so every
/// entry logged this frame shares one timestamp.
pub fn advance_log_clock(time: Res<Time>, mut log: ResMut<CombatLog>) {
    log.sim_time += time.delta_secs();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entries_carry_current_sim_time() {
        let mut log = CombatLog::default();
        log.sim_time = 3.25;
        log.log_damage("Wolf", "Player", "Maw Bite", 12.0, false);
        assert_eq!(log.entries.len(), 1);
        assert_eq!(log.entries[0].timestamp, 3.25);
        assert_eq!(log.entries[0].amount, Some(12.0));
    }

    #[test]
    fn filter_by_type_selects_matching_entries() {
        let mut log = CombatLog::default();
        log.log_damage("a", "b", "x", 1.0, false);
        log.log_healing("a", "a", "y", 2.0);
        log.log_death("b");
        assert_eq!(log.filter_by_type(CombatLogEventType::Damage).len(), 1);
        assert_eq!(log.pool_changes_only().len(), 2);
    }

    #[test]
    fn recent_returns_last_entries_in_order() {
        let mut log = CombatLog::default();
        for i in 0..5 {
            log.log(CombatLogEventType::Scenario, format!("e{i}"));
        }
        let recent: Vec<_> = log.recent(2).into_iter().map(|e| e.message.clone()).collect();
        assert_eq!(recent, vec!["e3", "e4"]);
    }

    #[test]
    fn clear_resets_time_and_entries() {
        let mut log = CombatLog::default();
        log.sim_time = 9.0;
        log.log(CombatLogEventType::Scenario, "x".into());
        log.clear();
        assert!(log.entries.is_empty());
        assert_eq!(log.sim_time, 0.0);
    }
}
