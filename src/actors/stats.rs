//! Attribute & Resource Pool Engine
//!
//! Every actor carries a set of named resource pools (health, stamina,
//! hunger, ...). A pool is a clamped `current`/`max` pair with a base
//! regeneration rate and a registry of independently-timed named effects
//! (buffs/debuffs) that can stack, tick, and expire.
//!
//! Effect channels:
//! - `Direct` effects mutate `current` (instantly, as a one-shot pulse, or
//!   spread evenly across ticks when procedural)
//! - `Regeneration` effects add to the pool's regen rate while active
//! - `Factor` effects multiply every application to the pool *and* the
//!   pool's derived reading (movement speed uses this)
//! - `HealFactor` / `DamageFactor` effects multiply only positive/negative
//!   applications respectively
//!
//! Invariant: `0 <= current <= max` after every mutation. Pools with
//! `max <= 0` reject all operations (guards percentage math downstream).

use std::collections::BTreeMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::abilities::runtime::VfxInstance;
use crate::abilities::state_machine::AbilityLoadout;
use crate::actors::{ActorName, Dead};
use crate::combat::events::ActorDeathEvent;
use crate::combat::log::{CombatLog, CombatLogEventType};

// ============================================================================
// Core types
// ============================================================================

/// Every resource pool an actor can carry. Players carry all of them; mob
/// kinds carry a subset (see `actors::MobKind`).
// Ord keeps pool iteration (and therefore log output) deterministic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter,
)]
pub enum StatKind {
    Health,
    Stamina,
    Hunger,
    Thirst,
    Weight,
    Speed,
    Sleep,
    Sanity,
    Mana,
    BodyHeat,
    Oxygen,
}

impl StatKind {
    pub fn name(&self) -> &'static str {
        match self {
            StatKind::Health => "Health",
            StatKind::Stamina => "Stamina",
            StatKind::Hunger => "Hunger",
            StatKind::Thirst => "Thirst",
            StatKind::Weight => "Weight",
            StatKind::Speed => "Speed",
            StatKind::Sleep => "Sleep",
            StatKind::Sanity => "Sanity",
            StatKind::Mana => "Mana",
            StatKind::BodyHeat => "BodyHeat",
            StatKind::Oxygen => "Oxygen",
        }
    }
}

/// How an effect interacts with its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectChannel {
    /// Mutates `current` directly.
    Direct,
    /// Adds to the pool's regeneration rate while active.
    Regeneration,
    /// Multiplies every application and the pool's derived reading.
    Factor,
    /// Multiplies positive applications only.
    HealFactor,
    /// Multiplies negative applications only.
    DamageFactor,
}

/// The full routing key of an attack effect: which pool, through which
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectType {
    pub stat: StatKind,
    pub channel: EffectChannel,
}

/// Whether a timed effect counts as a buff or a debuff for cleanse/death
/// bookkeeping. Derived from the hostile/beneficial flag of the attack
/// effect that registered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectPolarity {
    Beneficial,
    Harmful,
}

/// Parameters for registering a timed effect on a pool.
#[derive(Debug, Clone)]
pub struct TimedEffectSpec {
    /// Registry key. Non-stackable effects de-duplicate on this name.
    pub name: String,
    /// Signed magnitude. For factor channels this is the multiplier itself.
    pub amount: f32,
    /// Total lifetime in seconds. Must be > 0.
    pub duration: f32,
    /// Seconds between ticks for procedural direct effects.
    pub tick_interval: f32,
    pub channel: EffectChannel,
    /// Spread `amount` evenly across ticks instead of a single pulse.
    pub procedural: bool,
    /// A second application with the same name runs independently instead of
    /// replacing the first.
    pub stackable: bool,
    pub polarity: EffectPolarity,
}

/// A live timed effect inside a pool's registry.
#[derive(Debug, Clone)]
struct TimedEffect {
    spec: TimedEffectSpec,
    remaining: f32,
    until_next_tick: f32,
}

/// Observable pool mutations produced by a tick, for log attribution.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    EffectTicked {
        stat: StatKind,
        name: String,
        delta: f32,
    },
    EffectExpired {
        stat: StatKind,
        name: String,
    },
}

// ============================================================================
// ResourcePool
// ============================================================================

/// A single clamped resource pool with regen and a timed-effect registry.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    current: f32,
    max: f32,
    regen_per_sec: f32,
    effects: Vec<TimedEffect>,
}

impl ResourcePool {
    /// Create a full pool.
    pub fn new(max: f32, regen_per_sec: f32) -> Self {
        Self {
            current: max.max(0.0),
            max,
            regen_per_sec,
            effects: Vec::new(),
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn base_regen(&self) -> f32 {
        self.regen_per_sec
    }

    /// Pools with non-positive capacity reject all operations.
    pub fn is_usable(&self) -> bool {
        self.max > 0.0
    }

    /// `current` scaled by the pool's factor stack. Derived stats (movement
    /// speed) read this instead of `current`.
    pub fn scaled_current(&self) -> f32 {
        self.current * self.factor()
    }

    /// Apply a raw delta, clamped into `[0, max]`. Returns the delta that
    /// actually landed.
    pub fn add_current(&mut self, delta: f32) -> f32 {
        if !self.is_usable() {
            return 0.0;
        }
        let before = self.current;
        self.current = (self.current + delta).clamp(0.0, self.max);
        self.current - before
    }

    /// Change capacity. Does not change `current` except to re-clamp it when
    /// the pool shrank below it.
    pub fn modify_max(&mut self, delta: f32) {
        self.max += delta;
        if self.current > self.max {
            self.current = self.max.max(0.0);
        }
    }

    /// Apply a delta through the factor stacks: positive deltas are scaled by
    /// the heal multiplier, negative by the damage multiplier. Returns the
    /// applied delta.
    pub fn apply_scaled(&mut self, delta: f32) -> f32 {
        let scaled = if delta >= 0.0 {
            delta * self.heal_multiplier()
        } else {
            delta * self.damage_multiplier()
        };
        self.add_current(scaled)
    }

    /// Product of all active `Factor` effects.
    pub fn factor(&self) -> f32 {
        self.effects
            .iter()
            .filter(|e| e.spec.channel == EffectChannel::Factor)
            .map(|e| e.spec.amount)
            .product()
    }

    /// Multiplier applied to positive deltas.
    pub fn heal_multiplier(&self) -> f32 {
        self.factor()
            * self
                .effects
                .iter()
                .filter(|e| e.spec.channel == EffectChannel::HealFactor)
                .map(|e| e.spec.amount)
                .product::<f32>()
    }

    /// Multiplier applied to negative deltas.
    pub fn damage_multiplier(&self) -> f32 {
        self.factor()
            * self
                .effects
                .iter()
                .filter(|e| e.spec.channel == EffectChannel::DamageFactor)
                .map(|e| e.spec.amount)
                .product::<f32>()
    }

    /// Base regen plus the contribution of active `Regeneration` effects.
    pub fn effective_regen(&self) -> f32 {
        self.regen_per_sec
            + self
                .effects
                .iter()
                .filter(|e| e.spec.channel == EffectChannel::Regeneration)
                .map(|e| e.spec.amount)
                .sum::<f32>()
    }

    /// Register a timed effect.
    ///
    /// De-dup policy: when the spec is non-stackable and an effect with the
    /// same name is already active, the existing entry's timer is reset from
    /// this call (duration and amount refreshed) instead of a second timer
    /// being added. One-shot pulses are not re-applied on refresh, so
    /// refreshing never stacks magnitude.
    ///
    /// One-shot rule: a non-procedural `Direct` effect applies its full
    /// amount exactly once, immediately on registration; the timer that
    /// remains only tracks the effect for cleanse/expiry bookkeeping.
    pub fn add_timed_effect(&mut self, spec: TimedEffectSpec) -> bool {
        if !self.is_usable() || spec.duration <= 0.0 {
            return false;
        }

        if !spec.stackable {
            if let Some(existing) = self.effects.iter_mut().find(|e| e.spec.name == spec.name) {
                existing.remaining = spec.duration;
                existing.until_next_tick = spec.tick_interval;
                existing.spec = spec;
                return true;
            }
        }

        let one_shot = spec.channel == EffectChannel::Direct && !spec.procedural;
        let effect = TimedEffect {
            remaining: spec.duration,
            until_next_tick: spec.tick_interval,
            spec,
        };
        if one_shot {
            self.apply_scaled(effect.spec.amount);
        }
        self.effects.push(effect);
        true
    }

    /// Number of active effects with the given registry name.
    pub fn active_effect_count(&self, name: &str) -> usize {
        self.effects.iter().filter(|e| e.spec.name == name).count()
    }

    /// Remaining duration of the first active effect with the given name.
    pub fn effect_remaining(&self, name: &str) -> Option<f32> {
        self.effects
            .iter()
            .find(|e| e.spec.name == name)
            .map(|e| e.remaining)
    }

    /// Cancel active effects without applying their remaining ticks.
    /// `polarity: None` cancels everything (death); `Some(p)` cancels only
    /// effects of that polarity (cleanse). Returns the cancelled names.
    pub fn stop_all_effects(&mut self, polarity: Option<EffectPolarity>) -> Vec<String> {
        let mut cancelled = Vec::new();
        self.effects.retain(|e| {
            let matches = polarity.map_or(true, |p| e.spec.polarity == p);
            if matches {
                cancelled.push(e.spec.name.clone());
            }
            !matches
        });
        cancelled
    }

    /// Advance the pool by `dt`: regen, procedural effect ticks, expiry.
    ///
    /// A procedural effect whose duration elapses between ticks fires its
    /// final tick exactly at expiry, so the total applied converges on the
    /// configured amount.
    pub fn tick(&mut self, kind: StatKind, dt: f32, out: &mut Vec<PoolEvent>) {
        if !self.is_usable() || dt <= 0.0 {
            return;
        }

        let regen = self.effective_regen() * dt;
        if regen != 0.0 {
            self.apply_scaled(regen);
        }

        // Collect due ticks first; applying them mutates the factor stacks
        // the remaining iteration would otherwise observe mid-change.
        let mut due: Vec<(String, f32)> = Vec::new();
        for effect in &mut self.effects {
            let expiring = effect.remaining <= dt;
            if effect.spec.channel == EffectChannel::Direct && effect.spec.procedural {
                effect.until_next_tick -= dt;
                let normal_tick = effect.until_next_tick <= 0.0;
                if normal_tick || expiring {
                    let ticks = if effect.spec.tick_interval > 0.0 {
                        (effect.spec.duration / effect.spec.tick_interval).max(1.0)
                    } else {
                        1.0
                    };
                    due.push((effect.spec.name.clone(), effect.spec.amount / ticks));
                    if normal_tick {
                        effect.until_next_tick += effect.spec.tick_interval;
                    }
                }
            }
            effect.remaining -= dt;
        }

        for (name, delta) in due {
            let applied = self.apply_scaled(delta);
            out.push(PoolEvent::EffectTicked {
                stat: kind,
                name,
                delta: applied,
            });
        }

        self.effects.retain(|e| {
            if e.remaining <= 0.0 {
                out.push(PoolEvent::EffectExpired {
                    stat: kind,
                    name: e.spec.name.clone(),
                });
                false
            } else {
                true
            }
        });
    }
}

// ============================================================================
// Vitals component
// ============================================================================

/// The set of resource pools carried by one actor.
#[derive(Component, Debug, Clone, Default)]
pub struct Vitals {
    pools: BTreeMap<StatKind, ResourcePool>,
}

impl Vitals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(mut self, kind: StatKind, max: f32, regen_per_sec: f32) -> Self {
        self.pools.insert(kind, ResourcePool::new(max, regen_per_sec));
        self
    }

    pub fn pool(&self, kind: StatKind) -> Option<&ResourcePool> {
        self.pools.get(&kind)
    }

    pub fn pool_mut(&mut self, kind: StatKind) -> Option<&mut ResourcePool> {
        self.pools.get_mut(&kind)
    }

    pub fn current(&self, kind: StatKind) -> Option<f32> {
        self.pools.get(&kind).map(|p| p.current())
    }

    /// Derived stat reading: `current` scaled by the pool's factor stack.
    pub fn scaled_current(&self, kind: StatKind) -> Option<f32> {
        self.pools.get(&kind).map(|p| p.scaled_current())
    }

    /// Dead means the health pool has been emptied. Actors without a health
    /// pool cannot die through combat.
    pub fn is_dead(&self) -> bool {
        self.pools
            .get(&StatKind::Health)
            .map(|p| p.current() <= 0.0)
            .unwrap_or(false)
    }

    /// Cancel timed effects across every pool. Returns `(stat, name)` pairs.
    pub fn stop_all_effects(
        &mut self,
        polarity: Option<EffectPolarity>,
    ) -> Vec<(StatKind, String)> {
        let mut cancelled = Vec::new();
        for (kind, pool) in self.pools.iter_mut() {
            for name in pool.stop_all_effects(polarity) {
                cancelled.push((*kind, name));
            }
        }
        cancelled
    }

    /// Advance every pool by `dt`, collecting observable mutations.
    pub fn tick(&mut self, dt: f32, out: &mut Vec<PoolEvent>) {
        for (kind, pool) in self.pools.iter_mut() {
            pool.tick(*kind, dt, out);
        }
    }
}

// ============================================================================
// Systems
// ============================================================================

/// Advance every living actor's pools once per frame. Regen, procedural
/// ticks and expiry all happen here, in one place, after effect application.
pub fn tick_vitals(
    time: Res<Time>,
    mut actors: Query<(&ActorName, &mut Vitals), Without<Dead>>,
    mut log: ResMut<CombatLog>,
) {
    let dt = time.delta_secs();
    let mut events = Vec::new();
    for (name, mut vitals) in actors.iter_mut() {
        events.clear();
        vitals.tick(dt, &mut events);
        for event in &events {
            match event {
                PoolEvent::EffectTicked {
                    name: effect,
                    delta,
                    ..
                } => {
                    if *delta < 0.0 {
                        log.log_damage(effect, &name.0, effect, -delta, false);
                    } else if *delta > 0.0 {
                        log.log_healing(effect, &name.0, effect, *delta);
                    }
                }
                PoolEvent::EffectExpired { name: effect, .. } => {
                    log.log_effect_removed(&name.0, effect, "expired");
                }
            }
        }
    }
}

/// Detect emptied health pools and fire the death event exactly once.
pub fn detect_deaths(
    actors: Query<(Entity, &ActorName, &Vitals), (Changed<Vitals>, Without<Dead>)>,
    mut deaths: EventWriter<ActorDeathEvent>,
    mut log: ResMut<CombatLog>,
) {
    for (entity, name, vitals) in actors.iter() {
        if vitals.is_dead() {
            log.log_death(&name.0);
            deaths.send(ActorDeathEvent { actor: entity });
        }
    }
}

/// Hard synchronous teardown when an actor dies: halt its ability machines,
/// cancel every timed effect on its pools, and despawn its transient visual
/// handles. After this frame nothing may mutate the dead actor's pools.
pub fn death_cleanup(
    mut deaths: EventReader<ActorDeathEvent>,
    time: Res<Time>,
    mut commands: Commands,
    mut actors: Query<(&ActorName, &mut Vitals, Option<&mut AbilityLoadout>)>,
    vfx: Query<(Entity, &VfxInstance)>,
    mut log: ResMut<CombatLog>,
) {
    let now = time.elapsed_secs();
    for death in deaths.read() {
        let Ok((name, mut vitals, loadout)) = actors.get_mut(death.actor) else {
            continue;
        };
        commands.entity(death.actor).insert(Dead);

        for (_, effect) in vitals.stop_all_effects(None) {
            log.log_effect_removed(&name.0, &effect, "death");
        }

        if let Some(mut loadout) = loadout {
            for holder in loadout.holders.iter_mut() {
                holder.halt(now);
            }
        }

        for (vfx_entity, instance) in vfx.iter() {
            if instance.owner == death.actor {
                commands.entity(vfx_entity).despawn();
            }
        }

        log.log(
            CombatLogEventType::Scenario,
            format!("{} removed from simulation", name.0),
        );
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
