//! Effect Application
//!
//! Consumes the [`EffectRequest`] events produced by the ability driver and
//! lands them on the target's resource pools. This is the single outer
//! boundary for effect application: every failure mode here (missing target,
//! missing pool, failed probability roll) degrades to "this one effect did
//! not happen" and the simulation continues.
//!
//! Dispatch is keyed off the target's [`ActorKind`] pool set: the player
//! carries every pool, mobs a subset, so an effect aimed at a pool the
//! target does not carry is a dispatch miss - logged as a warning, skipped.

use bevy::prelude::*;

use crate::actors::stats::{EffectChannel, TimedEffectSpec, Vitals};
use crate::actors::{ActorKind, ActorName, Dead};
use crate::combat::events::EffectRequest;
use crate::combat::log::CombatLog;
use crate::combat::GameRng;

/// Apply queued effect requests in dispatch order.
pub fn apply_effect_requests(
    mut requests: EventReader<EffectRequest>,
    mut rng: ResMut<GameRng>,
    mut targets: Query<(&ActorKind, &ActorName, &mut Vitals), Without<Dead>>,
    names: Query<&ActorName>,
    mut log: ResMut<CombatLog>,
) {
    for request in requests.read() {
        let Ok((kind, target_name, mut vitals)) = targets.get_mut(request.target) else {
            // Target despawned or died earlier this frame.
            continue;
        };
        let caster_name = names
            .get(request.caster)
            .map(|n| n.0.clone())
            .unwrap_or_else(|_| "Unknown".to_string());

        let effect = &request.effect;

        if effect.probability_to_apply < 1.0 && rng.random_f32() >= effect.probability_to_apply {
            continue;
        }

        let mut amount = rng.random_range(effect.amount_min, effect.amount_max);
        let mut crit = false;
        if effect.critical_chance > 0.0 && rng.random_f32() < effect.critical_chance {
            amount *= effect.critical_damage_multiplier;
            crit = true;
        }

        // Factor channels carry the multiplier itself; direct/regen channels
        // carry a signed pool delta.
        let signed = match effect.effect.channel {
            EffectChannel::Factor | EffectChannel::HealFactor | EffectChannel::DamageFactor => {
                amount
            }
            _ if effect.enemy_effect => -amount,
            _ => amount,
        };

        let stat = effect.effect.stat;
        let Some(pool) = vitals.pool_mut(stat) else {
            warn!(
                "effect '{}' targets {} pool, which {:?} actors do not carry; skipped",
                request.ability_name,
                stat.name(),
                kind
            );
            continue;
        };

        if effect.is_instantaneous() {
            let applied = pool.apply_scaled(signed);
            if applied < 0.0 {
                log.log_damage(&caster_name, &target_name.0, &request.ability_name, -applied, crit);
            } else {
                log.log_healing(&caster_name, &target_name.0, &request.ability_name, applied);
            }
        } else {
            let duration = match effect.time_buff_effect_max {
                Some(max) => rng.random_range(effect.time_buff_effect, max),
                None => effect.time_buff_effect,
            };
            let tick_interval = match effect.tick_cooldown_max {
                Some(max) => rng.random_range(effect.tick_cooldown, max),
                None => effect.tick_cooldown,
            };
            let spec = TimedEffectSpec {
                name: effect.timed_effect_name(&request.ability_name),
                amount: signed,
                duration,
                tick_interval,
                channel: effect.effect.channel,
                procedural: effect.is_procedural,
                stackable: effect.is_stackable,
                polarity: effect.polarity(),
            };
            let name = spec.name.clone();
            if pool.add_timed_effect(spec) {
                log.log_effect_applied(&caster_name, &target_name.0, &name, duration);
            }
        }
    }
}
