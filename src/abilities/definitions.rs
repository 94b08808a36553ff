//! Data-Driven Ability Definitions
//!
//! Ability stats are not hardcoded in Rust: they are authored in
//! `assets/config/abilities.ron` and loaded read-only at startup. Every
//! caster using an ability shares the same `Arc<AbilityDefinition>`; only the
//! per-caster `AbilityHolder` carries mutable phase/timer/target state.
//!
//! The config format still speaks the designers' language of boolean flags
//! (`should_launch`, `should_mark_at_cast`, ...). Those flags are collapsed
//! exactly once, at load time, into two closed policy enums - [`CastPolicy`]
//! and [`LaunchPolicy`] - so phase code switches on a variant instead of
//! re-deriving the flag combination every frame. Incoherent flag
//! combinations are rejected while loading.

use std::collections::HashMap;
use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

use crate::abilities::attack_cast::{layers, AttackCast, CastShape};
use crate::actors::stats::{EffectChannel, EffectPolarity, EffectType};

/// Enum of every authored ability.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter,
)]
pub enum AbilityKind {
    Firebolt,
    VenomousCloud,
    MendingGlow,
    BriarTrap,
    SecondWind,
    MawBite,
    ChillingHowl,
    VenomSpit,
    Quake,
}

impl AbilityKind {
    /// Parse a scenario-config ability name.
    pub fn parse(name: &str) -> Result<AbilityKind, String> {
        match name {
            "Firebolt" => Ok(AbilityKind::Firebolt),
            "VenomousCloud" => Ok(AbilityKind::VenomousCloud),
            "MendingGlow" => Ok(AbilityKind::MendingGlow),
            "BriarTrap" => Ok(AbilityKind::BriarTrap),
            "SecondWind" => Ok(AbilityKind::SecondWind),
            "MawBite" => Ok(AbilityKind::MawBite),
            "ChillingHowl" => Ok(AbilityKind::ChillingHowl),
            "VenomSpit" => Ok(AbilityKind::VenomSpit),
            "Quake" => Ok(AbilityKind::Quake),
            _ => Err(format!(
                "Unknown ability: '{name}'. Valid abilities: Firebolt, VenomousCloud, \
                 MendingGlow, BriarTrap, SecondWind, MawBite, ChillingHowl, VenomSpit, Quake"
            )),
        }
    }
}

/// How the target transform is resolved while casting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastPolicy {
    /// Resolve once when the action starts, then leave it alone.
    None,
    /// Re-resolve to the caster's current position every frame.
    DynamicTrack,
    /// Snapshot the position once at cast start and hold it fixed.
    StaticMark,
}

/// Which of the three mutually exclusive launch behaviors the ability uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchPolicy {
    /// The effect position advances along a direction at `speed`, checking
    /// for contact every frame; applies on contact or `life_span` expiry.
    BulletLike,
    /// The position is re-locked to the caster for `final_launch_time`, then
    /// the ability applies at the caster's final position.
    PermanentFollow,
    /// Waits `final_launch_time` with no movement, then applies at the
    /// marked/fixed position.
    DelayedFixed,
}

/// Per-phase re-trigger availability. Ready is always available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseAvailability {
    #[serde(default)]
    pub while_casting: bool,
    #[serde(default)]
    pub while_launching: bool,
    #[serde(default)]
    pub while_active: bool,
    #[serde(default)]
    pub while_cooldown: bool,
}

/// One discrete effect within an ability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackEffect {
    /// Which pool, through which channel.
    pub effect: EffectType,
    /// Magnitude range; resolved per application.
    pub amount_min: f32,
    pub amount_max: f32,
    /// 0 = instantaneous one-shot application; > 0 = registered timed effect.
    #[serde(default)]
    pub time_buff_effect: f32,
    /// Optional upper bound when the duration itself is randomized.
    #[serde(default)]
    pub time_buff_effect_max: Option<f32>,
    /// Seconds between ticks for timed effects.
    #[serde(default)]
    pub tick_cooldown: f32,
    /// Optional upper bound when the tick interval is randomized.
    #[serde(default)]
    pub tick_cooldown_max: Option<f32>,
    /// Spread the amount across ticks instead of a single pulse.
    #[serde(default)]
    pub is_procedural: bool,
    /// Concurrent same-name timers accumulate instead of replacing.
    #[serde(default)]
    pub is_stackable: bool,
    /// Chance this effect applies at all.
    #[serde(default = "default_probability")]
    pub probability_to_apply: f32,
    #[serde(default)]
    pub critical_chance: f32,
    #[serde(default = "default_crit_multiplier")]
    pub critical_damage_multiplier: f32,
    /// true = hostile/damage semantics against detected targets;
    /// false = beneficial/self semantics.
    #[serde(default)]
    pub enemy_effect: bool,
    /// Cap on colliders hit when the ability enforces per-collider limits.
    #[serde(default = "default_max_hits")]
    pub max_hit_times: u32,
    /// Registry name override for the timed effect; defaults to a name
    /// derived from the ability and the pool.
    #[serde(default)]
    pub buff_name: Option<String>,
}

fn default_probability() -> f32 {
    1.0
}

fn default_crit_multiplier() -> f32 {
    1.5
}

fn default_max_hits() -> u32 {
    1
}

impl AttackEffect {
    pub fn is_instantaneous(&self) -> bool {
        self.time_buff_effect == 0.0
    }

    pub fn polarity(&self) -> EffectPolarity {
        if self.enemy_effect {
            EffectPolarity::Harmful
        } else {
            EffectPolarity::Beneficial
        }
    }

    /// Registry key for the timed effect this applies.
    pub fn timed_effect_name(&self, ability_name: &str) -> String {
        self.buff_name
            .clone()
            .unwrap_or_else(|| format!("{ability_name} ({})", self.effect.stat.name()))
    }
}

/// Target layer names as authored in config.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum TargetLayer {
    Player,
    Mob,
}

/// Authored attack-cast volume; resolved to an [`AttackCast`] at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackCastConfig {
    pub shape: CastShape,
    #[serde(default)]
    pub offset: [f32; 3],
    pub target_layers: Vec<TargetLayer>,
}

impl AttackCastConfig {
    fn resolve(&self) -> AttackCast {
        let mut mask = 0;
        for layer in &self.target_layers {
            mask |= match layer {
                TargetLayer::Player => layers::PLAYER,
                TargetLayer::Mob => layers::MOB,
            };
        }
        AttackCast {
            shape: self.shape,
            offset: self.offset,
            layer_mask: mask,
        }
    }
}

/// The authored shape of one ability, as designers write it: numeric phase
/// timings plus the boolean behavior flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAbilityConfig {
    /// Display name of the ability.
    pub name: String,

    // === Phase timings (seconds) ===
    #[serde(default)]
    pub duration: f32,
    #[serde(default)]
    pub cool_down: f32,
    #[serde(default)]
    pub cast_duration: f32,
    #[serde(default)]
    pub final_launch_time: f32,
    #[serde(default)]
    pub life_span: f32,
    /// Projectile travel speed in units/second (launched abilities).
    #[serde(default)]
    pub speed: f32,
    /// Simultaneous action slots started per trigger.
    #[serde(default = "default_one_target")]
    pub number_of_targets: usize,

    // === Behavior flags ===
    #[serde(default)]
    pub should_launch: bool,
    #[serde(default)]
    pub is_fixed_position: bool,
    #[serde(default)]
    pub is_partial_permanent_target_while_casting: bool,
    #[serde(default)]
    pub is_permanent_target: bool,
    #[serde(default)]
    pub should_mark_at_cast: bool,
    #[serde(default)]
    pub multi_area_effect: bool,
    #[serde(default)]
    pub caster_is_immune: bool,
    #[serde(default)]
    pub caster_receives_benefits: bool,
    #[serde(default)]
    pub is_ground_fixed_position: bool,
    #[serde(default)]
    pub needs_confirmation_click: bool,
    #[serde(default)]
    pub has_max_hit_per_collider: bool,

    #[serde(default)]
    pub availability: PhaseAvailability,
    pub attack_cast: AttackCastConfig,
    pub effects: Vec<AttackEffect>,
}

fn default_one_target() -> usize {
    1
}

/// Resolved, validated ability data shared read-only across all casters.
#[derive(Debug, Clone)]
pub struct AbilityDefinition {
    pub name: String,
    pub duration: f32,
    pub cool_down: f32,
    pub cast_duration: f32,
    pub final_launch_time: f32,
    pub life_span: f32,
    pub speed: f32,
    pub number_of_targets: usize,
    pub cast_policy: CastPolicy,
    pub launch_policy: LaunchPolicy,
    pub multi_area_effect: bool,
    pub caster_is_immune: bool,
    pub caster_receives_benefits: bool,
    pub is_ground_fixed_position: bool,
    pub needs_confirmation_click: bool,
    pub has_max_hit_per_collider: bool,
    pub availability: PhaseAvailability,
    pub attack_cast: AttackCast,
    pub effects: Vec<AttackEffect>,
}

impl AbilityDefinition {
    /// Collapse the authored flags into the policy variants, rejecting
    /// incoherent combinations.
    pub fn from_raw(raw: RawAbilityConfig) -> Result<Self, String> {
        let name = raw.name.clone();
        let fail = |msg: &str| Err(format!("ability '{name}': {msg}"));

        if raw.should_launch && raw.is_permanent_target {
            return fail("should_launch and is_permanent_target are mutually exclusive");
        }
        if raw.should_mark_at_cast
            && (raw.is_partial_permanent_target_while_casting || raw.is_fixed_position)
        {
            return fail("should_mark_at_cast conflicts with dynamic target tracking flags");
        }

        let cast_policy = if raw.should_mark_at_cast {
            CastPolicy::StaticMark
        } else if raw.is_partial_permanent_target_while_casting || raw.is_fixed_position {
            CastPolicy::DynamicTrack
        } else {
            CastPolicy::None
        };

        let launch_policy = if raw.should_launch {
            LaunchPolicy::BulletLike
        } else if raw.is_permanent_target {
            LaunchPolicy::PermanentFollow
        } else {
            LaunchPolicy::DelayedFixed
        };

        if launch_policy == LaunchPolicy::BulletLike && (raw.speed <= 0.0 || raw.life_span <= 0.0)
        {
            return fail("launched abilities need positive speed and life_span");
        }
        if raw.number_of_targets == 0 {
            return fail("number_of_targets must be at least 1");
        }
        if raw.effects.is_empty() {
            return fail("ability has no effects");
        }
        for timing in [
            raw.duration,
            raw.cool_down,
            raw.cast_duration,
            raw.final_launch_time,
            raw.life_span,
        ] {
            if timing < 0.0 {
                return fail("phase timings must be non-negative");
            }
        }
        for effect in &raw.effects {
            if effect.amount_min > effect.amount_max {
                return fail("effect amount_min exceeds amount_max");
            }
            if !(0.0..=1.0).contains(&effect.probability_to_apply) {
                return fail("probability_to_apply must be within [0, 1]");
            }
            if !(0.0..=1.0).contains(&effect.critical_chance) {
                return fail("critical_chance must be within [0, 1]");
            }
            if effect.effect.channel != EffectChannel::Direct && effect.is_instantaneous() {
                return fail("regeneration/factor effects need time_buff_effect > 0");
            }
            if effect.is_procedural && effect.tick_cooldown <= 0.0 {
                return fail("procedural effects need tick_cooldown > 0");
            }
            if effect.max_hit_times == 0 {
                return fail("max_hit_times must be at least 1");
            }
        }

        Ok(Self {
            name: raw.name,
            duration: raw.duration,
            cool_down: raw.cool_down,
            cast_duration: raw.cast_duration,
            final_launch_time: raw.final_launch_time,
            life_span: raw.life_span,
            speed: raw.speed,
            number_of_targets: raw.number_of_targets,
            cast_policy,
            launch_policy,
            multi_area_effect: raw.multi_area_effect,
            caster_is_immune: raw.caster_is_immune,
            caster_receives_benefits: raw.caster_receives_benefits,
            is_ground_fixed_position: raw.is_ground_fixed_position,
            needs_confirmation_click: raw.needs_confirmation_click,
            has_max_hit_per_collider: raw.has_max_hit_per_collider,
            availability: raw.availability,
            attack_cast: raw.attack_cast.resolve(),
            effects: raw.effects,
        })
    }

    /// Scaled lifetime for the transient visual handle: the whole window the
    /// action can be on screen. A small margin keeps the backstop expiry from
    /// racing the normal despawn at Active exit.
    pub fn vfx_lifetime(&self) -> f32 {
        let launch_window = match self.launch_policy {
            LaunchPolicy::BulletLike => self.life_span,
            LaunchPolicy::PermanentFollow | LaunchPolicy::DelayedFixed => self.final_launch_time,
        };
        (self.cast_duration + launch_window + self.duration) * 1.5 + 1.0
    }

    /// Rough visual scale hint from the targeting volume.
    pub fn vfx_scale(&self) -> f32 {
        match self.attack_cast.shape {
            CastShape::Sphere { radius } => radius,
            CastShape::Box { half_extents } => {
                half_extents[0].max(half_extents[1]).max(half_extents[2])
            }
        }
    }
}

/// Root structure of the abilities.ron file.
#[derive(Debug, Serialize, Deserialize)]
pub struct AbilitiesFile {
    pub abilities: HashMap<AbilityKind, RawAbilityConfig>,
}

/// Resource containing all ability definitions.
///
/// Loaded from `assets/config/abilities.ron` at startup.
/// Access via `Res<AbilityBook>` in systems.
#[derive(Resource)]
pub struct AbilityBook {
    definitions: HashMap<AbilityKind, Arc<AbilityDefinition>>,
}

impl Default for AbilityBook {
    /// Load from the default config file. Panics if the file cannot be
    /// loaded - use for tests only.
    fn default() -> Self {
        load_ability_book(DEFAULT_ABILITIES_PATH)
            .expect("Failed to load ability definitions in Default impl")
    }
}

pub const DEFAULT_ABILITIES_PATH: &str = "assets/config/abilities.ron";

impl AbilityBook {
    pub fn new(definitions: HashMap<AbilityKind, Arc<AbilityDefinition>>) -> Self {
        Self { definitions }
    }

    /// Get the shared definition for an ability.
    pub fn get(&self, kind: AbilityKind) -> Option<Arc<AbilityDefinition>> {
        self.definitions.get(&kind).cloned()
    }

    /// Get a definition, panicking if absent. Use when the ability set was
    /// validated at startup.
    pub fn get_expected(&self, kind: AbilityKind) -> Arc<AbilityDefinition> {
        self.definitions
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| panic!("Ability {kind:?} not found in definitions"))
    }

    /// Check that every [`AbilityKind`] has a definition.
    pub fn validate(&self) -> Result<(), Vec<AbilityKind>> {
        let missing: Vec<AbilityKind> = AbilityKind::iter()
            .filter(|kind| !self.definitions.contains_key(kind))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    pub fn ability_kinds(&self) -> impl Iterator<Item = &AbilityKind> {
        self.definitions.keys()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Load and validate ability definitions from a RON file.
pub fn load_ability_book(path: &str) -> Result<AbilityBook, String> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read {path}: {e}"))?;

    let file: AbilitiesFile =
        ron::from_str(&contents).map_err(|e| format!("Failed to parse {path}: {e}"))?;

    let mut definitions = HashMap::new();
    for (kind, raw) in file.abilities {
        definitions.insert(kind, Arc::new(AbilityDefinition::from_raw(raw)?));
    }
    let book = AbilityBook::new(definitions);

    book.validate()
        .map_err(|missing| format!("Missing ability definitions: {missing:?}"))?;

    info!("Loaded {} ability definitions from {path}", book.len());
    Ok(book)
}

/// Bevy plugin that loads the ability book at startup.
pub struct AbilityBookPlugin;

impl Plugin for AbilityBookPlugin {
    fn build(&self, app: &mut App) {
        match load_ability_book(DEFAULT_ABILITIES_PATH) {
            Ok(book) => {
                app.insert_resource(book);
            }
            Err(e) => {
                // Config must be valid; a broken ability file is a build
                // problem, not something to limp past at runtime.
                panic!("Failed to load ability definitions: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::stats::StatKind;

    fn raw(name: &str) -> RawAbilityConfig {
        RawAbilityConfig {
            name: name.to_string(),
            duration: 1.0,
            cool_down: 2.0,
            cast_duration: 0.5,
            final_launch_time: 0.5,
            life_span: 0.0,
            speed: 0.0,
            number_of_targets: 1,
            should_launch: false,
            is_fixed_position: false,
            is_partial_permanent_target_while_casting: false,
            is_permanent_target: false,
            should_mark_at_cast: false,
            multi_area_effect: false,
            caster_is_immune: false,
            caster_receives_benefits: false,
            is_ground_fixed_position: false,
            needs_confirmation_click: false,
            has_max_hit_per_collider: false,
            availability: PhaseAvailability::default(),
            attack_cast: AttackCastConfig {
                shape: CastShape::Sphere { radius: 2.0 },
                offset: [0.0, 0.0, 0.0],
                target_layers: vec![TargetLayer::Mob],
            },
            effects: vec![AttackEffect {
                effect: EffectType {
                    stat: StatKind::Health,
                    channel: EffectChannel::Direct,
                },
                amount_min: 5.0,
                amount_max: 10.0,
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
                max_hit_times: 1,
                buff_name: None,
            }],
        }
    }

    #[test]
    fn flags_collapse_to_policies_at_load() {
        let mut launched = raw("bolt");
        launched.should_launch = true;
        launched.speed = 12.0;
        launched.life_span = 2.0;
        launched.is_fixed_position = true;
        let def = AbilityDefinition::from_raw(launched).unwrap();
        assert_eq!(def.launch_policy, LaunchPolicy::BulletLike);
        assert_eq!(def.cast_policy, CastPolicy::DynamicTrack);

        let mut marked = raw("trap");
        marked.should_mark_at_cast = true;
        marked.is_permanent_target = true;
        let def = AbilityDefinition::from_raw(marked).unwrap();
        assert_eq!(def.cast_policy, CastPolicy::StaticMark);
        assert_eq!(def.launch_policy, LaunchPolicy::PermanentFollow);

        let plain = AbilityDefinition::from_raw(raw("plain")).unwrap();
        assert_eq!(plain.cast_policy, CastPolicy::None);
        assert_eq!(plain.launch_policy, LaunchPolicy::DelayedFixed);
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        let mut bad = raw("bad");
        bad.should_launch = true;
        bad.is_permanent_target = true;
        bad.speed = 10.0;
        bad.life_span = 1.0;
        assert!(AbilityDefinition::from_raw(bad).is_err());

        let mut bad = raw("bad2");
        bad.should_mark_at_cast = true;
        bad.is_fixed_position = true;
        assert!(AbilityDefinition::from_raw(bad).is_err());
    }

    #[test]
    fn launched_ability_requires_speed_and_lifespan() {
        let mut bad = raw("bolt");
        bad.should_launch = true;
        assert!(AbilityDefinition::from_raw(bad).is_err());
    }

    #[test]
    fn factor_effect_requires_duration() {
        let mut bad = raw("slow");
        bad.effects[0].effect.channel = EffectChannel::Factor;
        bad.effects[0].time_buff_effect = 0.0;
        assert!(AbilityDefinition::from_raw(bad).is_err());
    }

    #[test]
    fn timed_effect_name_prefers_override() {
        let mut effect = raw("x").effects.remove(0);
        assert_eq!(effect.timed_effect_name("Venom Spit"), "Venom Spit (Health)");
        effect.buff_name = Some("Serpent Toxin".to_string());
        assert_eq!(effect.timed_effect_name("Venom Spit"), "Serpent Toxin");
    }
}
