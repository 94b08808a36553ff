//! Ability Runtime Systems
//!
//! The ECS side of the ability system. Each frame the driver:
//!
//! 1. samples this frame's inputs for every holder (clicks, nearby actors,
//!    projectile contacts),
//! 2. ticks the holder's phase machine,
//! 3. executes the commands the machine emitted - spawning/moving transient
//!    visual-effect entities, resolving attack casts, and dispatching
//!    [`EffectRequest`]s toward the effect-application system.
//!
//! Missing transient references (a despawned vfx handle, an empty target
//! set) are skipped defensively; the phase timers keep advancing.

use bevy::prelude::*;
use smallvec::SmallVec;

use crate::abilities::attack_cast::{raycast, Detection};
use crate::abilities::definitions::{AbilityDefinition, LaunchPolicy};
use crate::abilities::state_machine::{
    AbilityCommand, AbilityFrame, AbilityHolder, AbilityLoadout, AbilityPhase, ClickSample,
};
use crate::actors::{ActorKind, ActorName, Dead};
use crate::combat::events::{
    AbilityTriggerEvent, AnimationRequest, ClickButton, EffectRequest, PointerClickEvent,
};
use crate::combat::log::CombatLog;
use crate::abilities::attack_cast::Collider;

/// A transient visual-effect entity owned by an ability action. Purely a
/// collaborator stub: the core decides position, scale and lifetime; nothing
/// here has timing logic of its own.
#[derive(Component, Debug, Clone, Copy)]
pub struct VfxInstance {
    /// The caster whose action spawned this handle.
    pub owner: Entity,
    /// Backstop expiry on the virtual clock; the normal teardown happens
    /// when the owning action leaves its Active phase.
    pub expires_at: f32,
}

/// Mark holders as triggered from the input events, gated by the cached
/// per-phase availability flag.
pub fn collect_ability_triggers(
    mut events: EventReader<AbilityTriggerEvent>,
    mut loadouts: Query<&mut AbilityLoadout, Without<Dead>>,
) {
    for event in events.read() {
        let Ok(mut loadout) = loadouts.get_mut(event.actor) else {
            continue;
        };
        let Some(holder) = loadout.holders.get_mut(event.slot) else {
            warn!("trigger for unknown ability slot {} ignored", event.slot);
            continue;
        };
        if holder.retrigger_available() {
            holder.data.trigger_requested = true;
        }
    }
}

/// Drive every living caster's ability machines for this frame.
#[allow(clippy::too_many_arguments)]
pub fn drive_ability_machines(
    time: Res<Time>,
    mut clicks: EventReader<PointerClickEvent>,
    mut casters: Query<
        (Entity, &Transform, &ActorKind, &ActorName, &mut AbilityLoadout),
        Without<Dead>,
    >,
    colliders: Query<(Entity, &Transform, &Collider), Without<Dead>>,
    mut vfx_transforms: Query<
        &mut Transform,
        (With<VfxInstance>, Without<Collider>, Without<AbilityLoadout>),
    >,
    mut effects: EventWriter<EffectRequest>,
    mut animations: EventWriter<AnimationRequest>,
    mut log: ResMut<CombatLog>,
    mut commands: Commands,
) {
    let now = time.elapsed_secs();
    let dt = time.delta_secs();
    let mut pending_clicks: Vec<PointerClickEvent> = clicks.read().copied().collect();

    for (caster, transform, kind, name, mut loadout) in casters.iter_mut() {
        let caster_pos = transform.translation;
        let caster_rot = transform.rotation;
        let caster_forward = *transform.forward();

        for holder in loadout.holders.iter_mut() {
            // Confirmation-wait click sampling. Only a left click pays for a
            // raycast; a right click cancels without ever resolving.
            let click = if *kind == ActorKind::Player
                && holder.data.awaiting_confirmation
                && !pending_clicks.is_empty()
            {
                let event = pending_clicks.remove(0);
                Some(sample_click(&event, holder, &colliders))
            } else {
                None
            };

            // Pre-resolve the caster's surroundings for slot fan-out.
            let nearby: SmallVec<[Detection; 8]> =
                if holder.phase() == AbilityPhase::Ready && holder.data.trigger_requested {
                    holder.def.attack_cast.detect_objects(
                        caster_pos,
                        caster_rot,
                        colliders.iter().map(|(e, t, c)| (e, t.translation, c)),
                    )
                } else {
                    SmallVec::new()
                };

            // Per-frame contact checks for bullets in flight, forwarded as
            // trigger callbacks.
            let mut contacts: SmallVec<[Entity; 4]> = SmallVec::new();
            if holder.phase() == AbilityPhase::Launching
                && holder.def.launch_policy == LaunchPolicy::BulletLike
            {
                for slot in holder.data.slots.iter() {
                    if slot.applied || slot.contact.is_some() {
                        continue;
                    }
                    if let Some((contacted, _)) = holder.def.attack_cast.check_contact(
                        slot.pos,
                        caster_rot,
                        caster,
                        colliders.iter().map(|(e, t, c)| (e, t.translation, c)),
                    ) {
                        contacts.push(contacted);
                    }
                }
            }

            let frame = AbilityFrame {
                now,
                dt,
                caster,
                caster_pos,
                caster_forward,
                click,
                nearby,
            };
            let before = holder.phase();
            let emitted = holder.tick(frame, &contacts);
            let after = holder.phase();
            if after != before {
                log.log_phase(&name.0, &holder.def.name, before.name(), after.name());
                if before == AbilityPhase::Ready {
                    log.log_ability_used(&name.0, &holder.def.name);
                }
            }

            execute_commands(
                emitted,
                holder,
                caster,
                caster_rot,
                now,
                &colliders,
                &mut vfx_transforms,
                &mut effects,
                &mut animations,
                &mut commands,
            );
        }
    }
}

/// Resolve a click event into the sample the machine consumes.
fn sample_click(
    event: &PointerClickEvent,
    holder: &AbilityHolder,
    colliders: &Query<(Entity, &Transform, &Collider), Without<Dead>>,
) -> ClickSample {
    match event.button {
        ClickButton::Left => {
            let hit = raycast(
                event.origin,
                event.direction,
                500.0,
                holder.def.attack_cast.layer_mask,
                colliders.iter().map(|(e, t, c)| (e, t.translation, c)),
            );
            ClickSample {
                button: ClickButton::Left,
                world_point: hit.map(|h| h.point),
                entity: hit.and_then(|h| h.entity),
            }
        }
        ClickButton::Right => ClickSample {
            button: ClickButton::Right,
            world_point: None,
            entity: None,
        },
    }
}

/// Execute the commands one holder emitted this tick.
#[allow(clippy::too_many_arguments)]
fn execute_commands(
    emitted: Vec<AbilityCommand>,
    holder: &mut AbilityHolder,
    caster: Entity,
    caster_rot: Quat,
    now: f32,
    colliders: &Query<(Entity, &Transform, &Collider), Without<Dead>>,
    vfx_transforms: &mut Query<
        &mut Transform,
        (With<VfxInstance>, Without<Collider>, Without<AbilityLoadout>),
    >,
    effects: &mut EventWriter<EffectRequest>,
    animations: &mut EventWriter<AnimationRequest>,
    commands: &mut Commands,
) {
    for command in emitted {
        match command {
            AbilityCommand::SpawnVfx { slot, pos } => {
                let def = holder.def.clone();
                let handle = commands
                    .spawn((
                        Transform::from_translation(pos)
                            .with_scale(Vec3::splat(def.vfx_scale())),
                        VfxInstance {
                            owner: caster,
                            expires_at: now + def.vfx_lifetime(),
                        },
                    ))
                    .id();
                if let Some(slot) = holder.data.slots.get_mut(slot) {
                    slot.vfx = Some(handle);
                }
            }
            AbilityCommand::MoveVfx { slot, pos } => {
                let Some(handle) = holder.data.slots.get(slot).and_then(|s| s.vfx) else {
                    continue;
                };
                if let Ok(mut transform) = vfx_transforms.get_mut(handle) {
                    transform.translation = pos;
                }
            }
            AbilityCommand::DespawnVfx { slot } => {
                let Some(handle) = holder.data.slots.get_mut(slot).and_then(|s| s.vfx.take())
                else {
                    continue;
                };
                if let Some(mut entity_commands) = commands.get_entity(handle) {
                    entity_commands.despawn();
                }
            }
            AbilityCommand::ApplyAt { pos, .. } => {
                apply_area(&holder.def, holder, caster, pos, caster_rot, colliders, effects);
            }
            AbilityCommand::ApplyContact { target, .. } => {
                apply_to_contact(&holder.def, holder.kind, caster, target, effects);
            }
            AbilityCommand::Animate { state } => {
                animations.send(AnimationRequest {
                    actor: caster,
                    state: state.to_string(),
                    crossfade: 0.1,
                });
            }
        }
    }
}

/// Resolve the attack cast at `pos` and dispatch every effect to the
/// eligible targets.
fn apply_area(
    def: &AbilityDefinition,
    holder: &AbilityHolder,
    caster: Entity,
    pos: Vec3,
    rot: Quat,
    colliders: &Query<(Entity, &Transform, &Collider), Without<Dead>>,
    effects: &mut EventWriter<EffectRequest>,
) {
    let detected = def.attack_cast.detect_objects(
        pos,
        rot,
        colliders.iter().map(|(e, t, c)| (e, t.translation, c)),
    );

    for effect in &def.effects {
        if effect.enemy_effect {
            let mut targets: Vec<Entity> = detected
                .iter()
                .filter(|(entity, _)| !(def.caster_is_immune && *entity == caster))
                .map(|(entity, _)| *entity)
                .collect();
            if !def.multi_area_effect {
                targets.truncate(1);
            }
            if def.has_max_hit_per_collider {
                targets.truncate(effect.max_hit_times as usize);
            }
            for target in targets {
                effects.send(EffectRequest {
                    caster,
                    target,
                    ability: holder.kind,
                    ability_name: def.name.clone(),
                    effect: effect.clone(),
                });
            }
        } else if def.caster_receives_benefits {
            // Beneficial effects ride home to the caster even when the
            // action resolved far away.
            effects.send(EffectRequest {
                caster,
                target: caster,
                ability: holder.kind,
                ability_name: def.name.clone(),
                effect: effect.clone(),
            });
        } else {
            // Beneficial zone: whoever stands in it gets it, caster included.
            for (target, _) in detected.iter() {
                effects.send(EffectRequest {
                    caster,
                    target: *target,
                    ability: holder.kind,
                    ability_name: def.name.clone(),
                    effect: effect.clone(),
                });
            }
        }
    }
}

/// Dispatch effects for a projectile contact.
fn apply_to_contact(
    def: &AbilityDefinition,
    kind: crate::abilities::definitions::AbilityKind,
    caster: Entity,
    target: Entity,
    effects: &mut EventWriter<EffectRequest>,
) {
    for effect in &def.effects {
        let routed = if effect.enemy_effect { target } else { caster };
        effects.send(EffectRequest {
            caster,
            target: routed,
            ability: kind,
            ability_name: def.name.clone(),
            effect: effect.clone(),
        });
    }
}

/// Second per-frame pass: visual sync after movement has run.
pub fn late_drive_ability_machines(
    time: Res<Time>,
    mut casters: Query<(Entity, &Transform, &mut AbilityLoadout), Without<Dead>>,
    mut vfx_transforms: Query<
        &mut Transform,
        (With<VfxInstance>, Without<Collider>, Without<AbilityLoadout>),
    >,
) {
    let now = time.elapsed_secs();
    let dt = time.delta_secs();
    for (caster, transform, mut loadout) in casters.iter_mut() {
        for holder in loadout.holders.iter_mut() {
            let frame = AbilityFrame {
                now,
                dt,
                caster,
                caster_pos: transform.translation,
                caster_forward: *transform.forward(),
                click: None,
                nearby: SmallVec::new(),
            };
            for command in holder.late_tick(frame) {
                if let AbilityCommand::MoveVfx { slot, pos } = command {
                    let Some(handle) = holder.data.slots.get(slot).and_then(|s| s.vfx) else {
                        continue;
                    };
                    if let Ok(mut vfx) = vfx_transforms.get_mut(handle) {
                        vfx.translation = pos;
                    }
                }
            }
        }
    }
}

/// Backstop expiry for visual handles whose owning action never tore them
/// down (owner died mid-phase, for example).
pub fn expire_vfx(
    time: Res<Time>,
    mut commands: Commands,
    vfx: Query<(Entity, &VfxInstance)>,
) {
    let now = time.elapsed_secs();
    for (entity, instance) in vfx.iter() {
        if now >= instance.expires_at {
            commands.entity(entity).despawn();
        }
    }
}
