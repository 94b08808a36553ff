//! Ability State Machine
//!
//! Per-caster, per-ability phase machine: Ready -> Casting -> Launching ->
//! Active -> InCooldown -> Ready, built on the generic machine framework.
//!
//! The states never touch the ECS directly. Each tick the driver assembles an
//! [`AbilityFrame`] (clock, caster transform, click sample, nearby actors),
//! the states mutate their [`HolderData`] and emit [`AbilityCommand`]s, and
//! the driver executes those commands with full world access afterwards.
//! That keeps every phase rule in one place and testable without a world.
//!
//! All phase durations are absolute deadlines against the virtual clock
//! (`phase_entered_at` + duration), so pausing or scaling the whole
//! simulation pauses every phase uniformly.

use std::sync::Arc;

use bevy::prelude::*;
use smallvec::SmallVec;
use strum::EnumIter;

use crate::abilities::definitions::{
    AbilityBook, AbilityDefinition, AbilityKind, CastPolicy, LaunchPolicy,
};
use crate::combat::events::ClickButton;
use crate::machine::{MachineBuilder, State, StateMachine, TriggerPhase};

/// The five ability phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum AbilityPhase {
    Ready,
    Casting,
    Launching,
    Active,
    InCooldown,
}

impl AbilityPhase {
    pub fn name(&self) -> &'static str {
        match self {
            AbilityPhase::Ready => "Ready",
            AbilityPhase::Casting => "Casting",
            AbilityPhase::Launching => "Launching",
            AbilityPhase::Active => "Active",
            AbilityPhase::InCooldown => "InCooldown",
        }
    }
}

/// A resolved click passed into the machine during confirmation-wait.
#[derive(Debug, Clone, Copy)]
pub struct ClickSample {
    pub button: ClickButton,
    /// World point the click resolved to (collider hit or ground).
    pub world_point: Option<Vec3>,
    /// Actor the click hit, if any.
    pub entity: Option<Entity>,
}

/// Per-tick inputs assembled by the driver.
#[derive(Debug, Clone)]
pub struct AbilityFrame {
    pub now: f32,
    pub dt: f32,
    pub caster: Entity,
    pub caster_pos: Vec3,
    pub caster_forward: Vec3,
    /// Click sampled this frame (players only).
    pub click: Option<ClickSample>,
    /// Actors detected around the caster this frame, for slot fan-out.
    pub nearby: SmallVec<[(Entity, Vec3); 8]>,
}

impl AbilityFrame {
    /// An empty frame for out-of-band machine operations (halting).
    pub fn idle(caster: Entity, caster_pos: Vec3, now: f32) -> Self {
        Self {
            now,
            dt: 0.0,
            caster,
            caster_pos,
            caster_forward: Vec3::NEG_Z,
            click: None,
            nearby: SmallVec::new(),
        }
    }
}

/// One simultaneous action slot. Abilities with `number_of_targets > 1` run
/// one slot per target, each evaluated against its own transform.
#[derive(Debug, Clone)]
pub struct ActionSlot {
    /// Current effect position: the resolved target, the marked point, or
    /// the in-flight projectile position depending on phase and policy.
    pub pos: Vec3,
    /// Flight direction for launched abilities.
    pub direction: Vec3,
    /// Transient visual handle owned by this slot.
    pub vfx: Option<Entity>,
    /// Contact resolved during flight.
    pub contact: Option<Entity>,
    /// The slot's effects have been dispatched.
    pub applied: bool,
}

impl ActionSlot {
    fn new(pos: Vec3, direction: Vec3) -> Self {
        Self {
            pos,
            direction,
            vfx: None,
            contact: None,
            applied: false,
        }
    }
}

/// Mutable per-caster runtime state for one ability.
#[derive(Debug, Clone)]
pub struct HolderData {
    /// Virtual-clock timestamp of the last phase entry.
    pub phase_entered_at: f32,
    /// The input layer asked for this ability to fire.
    pub trigger_requested: bool,
    /// Cached per-phase availability flag, recomputed on every phase entry
    /// and read by the input collaborator.
    pub retrigger_available: bool,
    /// Waiting for a confirmation click before starting.
    pub awaiting_confirmation: bool,
    /// Snapshot/click position held for marked and ground-fixed abilities.
    pub marked_pos: Option<Vec3>,
    pub slots: Vec<ActionSlot>,
    /// Contacts forwarded by the driver, not yet matched to a slot.
    pub pending_contacts: SmallVec<[Entity; 4]>,
    /// An action is in flight (set from trigger until cooldown entry).
    pub active: bool,
}

impl Default for HolderData {
    fn default() -> Self {
        Self {
            phase_entered_at: 0.0,
            trigger_requested: false,
            retrigger_available: true,
            awaiting_confirmation: false,
            marked_pos: None,
            slots: Vec::new(),
            pending_contacts: SmallVec::new(),
            active: false,
        }
    }
}

/// Commands the phase states emit; executed by the driver with world access.
#[derive(Debug, Clone, PartialEq)]
pub enum AbilityCommand {
    SpawnVfx { slot: usize, pos: Vec3 },
    MoveVfx { slot: usize, pos: Vec3 },
    DespawnVfx { slot: usize },
    /// Resolve the attack cast at `pos` and dispatch the ability's effects.
    ApplyAt { slot: usize, pos: Vec3 },
    /// Dispatch the ability's effects at a contacted target.
    ApplyContact { slot: usize, target: Entity },
    Animate { state: &'static str },
}

/// Everything a phase state can see and touch during one tick.
pub struct AbilityCtx {
    pub def: Arc<AbilityDefinition>,
    pub data: HolderData,
    pub frame: AbilityFrame,
    pub out: Vec<AbilityCommand>,
}

impl AbilityCtx {
    fn elapsed(&self) -> f32 {
        self.frame.now - self.data.phase_entered_at
    }

    fn enter_phase(&mut self, available: bool) {
        self.data.phase_entered_at = self.frame.now;
        self.data.retrigger_available = available;
    }
}

/// Begin the action: fan out one slot per target, spawn visual handles, and
/// mark the holder active so `next` leaves Ready.
fn start_action(ctx: &mut AbilityCtx) {
    ctx.data.trigger_requested = false;
    ctx.data.awaiting_confirmation = false;
    ctx.data.active = true;
    ctx.data.slots.clear();
    ctx.data.pending_contacts.clear();

    let base = ctx.data.marked_pos.unwrap_or(ctx.frame.caster_pos);
    let count = ctx.def.number_of_targets;

    // Slot fan-out is zero-based: every slot participates, including slot 0.
    // Slots lock onto distinct detected actors where possible; leftovers
    // spread in a ring around the base position. A marked position (from a
    // confirmation click) is authoritative and disables target locking.
    let locked: Vec<Vec3> = if ctx.data.marked_pos.is_some() {
        Vec::new()
    } else {
        ctx.frame
            .nearby
            .iter()
            .filter(|(entity, _)| *entity != ctx.frame.caster)
            .map(|(_, pos)| *pos)
            .collect()
    };

    for index in 0..count {
        let pos = match locked.get(index) {
            Some(target) => *target,
            None if count > 1 => {
                let angle = index as f32 / count as f32 * std::f32::consts::TAU;
                base + Vec3::new(angle.cos(), 0.0, angle.sin()) * ctx.def.vfx_scale().max(1.0)
            }
            None => base,
        };
        let direction = (pos - ctx.frame.caster_pos)
            .try_normalize()
            .unwrap_or(ctx.frame.caster_forward);
        ctx.data.slots.push(ActionSlot::new(pos, direction));
        ctx.out.push(AbilityCommand::SpawnVfx { slot: index, pos });
    }
}

// ============================================================================
// Phase states
// ============================================================================

struct ReadyState;

impl State<AbilityPhase, AbilityCtx> for ReadyState {
    fn enter(&mut self, ctx: &mut AbilityCtx) {
        ctx.enter_phase(true);
        ctx.data.active = false;
        ctx.data.awaiting_confirmation = false;
        ctx.data.marked_pos = None;
        ctx.data.slots.clear();
        ctx.data.pending_contacts.clear();
    }

    fn update(&mut self, ctx: &mut AbilityCtx) {
        if !ctx.data.trigger_requested {
            return;
        }
        if ctx.def.needs_confirmation_click && ctx.data.marked_pos.is_none() {
            // Hold in a confirmation-wait subroutine: a left click resolves a
            // world target and starts the action; a right click cancels back
            // to plain Ready without any target resolution.
            ctx.data.awaiting_confirmation = true;
            let Some(click) = ctx.frame.click else {
                return;
            };
            match click.button {
                ClickButton::Left => {
                    if let Some(point) = click.world_point {
                        ctx.data.marked_pos = Some(point);
                        start_action(ctx);
                    }
                }
                ClickButton::Right => {
                    ctx.data.trigger_requested = false;
                    ctx.data.awaiting_confirmation = false;
                }
            }
        } else {
            start_action(ctx);
        }
    }

    fn next(&self, ctx: &AbilityCtx) -> AbilityPhase {
        if !ctx.data.active {
            AbilityPhase::Ready
        } else if ctx.def.cast_duration != 0.0 {
            AbilityPhase::Casting
        } else {
            AbilityPhase::Launching
        }
    }
}

struct CastingState;

impl State<AbilityPhase, AbilityCtx> for CastingState {
    fn enter(&mut self, ctx: &mut AbilityCtx) {
        let available = ctx.def.availability.while_casting;
        ctx.enter_phase(available);
        if ctx.def.cast_policy == CastPolicy::StaticMark && ctx.data.marked_pos.is_none() {
            // Snapshot once at cast start and hold it fixed. The slots
            // already carry their cast-start positions; nothing re-tracks
            // them while this policy is active.
            ctx.data.marked_pos = Some(ctx.frame.caster_pos);
        }
        ctx.out.push(AbilityCommand::Animate { state: "cast" });
    }

    fn update(&mut self, ctx: &mut AbilityCtx) {
        if ctx.def.cast_policy == CastPolicy::DynamicTrack {
            // Re-resolve the target transform to the caster's current
            // position every frame.
            let pos = ctx.frame.caster_pos;
            for index in 0..ctx.data.slots.len() {
                ctx.data.slots[index].pos = pos;
                ctx.out.push(AbilityCommand::MoveVfx { slot: index, pos });
            }
        }
    }

    fn next(&self, ctx: &AbilityCtx) -> AbilityPhase {
        if ctx.elapsed() >= ctx.def.cast_duration {
            AbilityPhase::Launching
        } else {
            AbilityPhase::Casting
        }
    }

    fn late_update(&mut self, ctx: &mut AbilityCtx) {
        // Visual sync after the movement pass, so tracking effects never lag
        // a frame behind their caster.
        for index in 0..ctx.data.slots.len() {
            if ctx.data.slots[index].vfx.is_some() {
                let pos = ctx.data.slots[index].pos;
                ctx.out.push(AbilityCommand::MoveVfx { slot: index, pos });
            }
        }
    }
}

struct LaunchingState;

impl State<AbilityPhase, AbilityCtx> for LaunchingState {
    fn enter(&mut self, ctx: &mut AbilityCtx) {
        let available = ctx.def.availability.while_launching;
        ctx.enter_phase(available);
        if ctx.def.launch_policy == LaunchPolicy::BulletLike {
            // Bullets fly from the caster toward the slot's resolved target.
            let origin = ctx.frame.caster_pos;
            for slot in ctx.data.slots.iter_mut() {
                slot.pos = origin;
                slot.contact = None;
            }
        }
        ctx.out.push(AbilityCommand::Animate { state: "attack" });
    }

    fn on_trigger(&mut self, ctx: &mut AbilityCtx, phase: TriggerPhase, other: Entity) {
        if phase == TriggerPhase::Enter {
            ctx.data.pending_contacts.push(other);
        }
    }

    fn update(&mut self, ctx: &mut AbilityCtx) {
        match ctx.def.launch_policy {
            LaunchPolicy::BulletLike => {
                // Match forwarded contacts to in-flight slots.
                while let Some(contacted) = ctx.data.pending_contacts.pop() {
                    if let Some(slot) = ctx
                        .data
                        .slots
                        .iter_mut()
                        .find(|s| !s.applied && s.contact.is_none())
                    {
                        slot.contact = Some(contacted);
                    }
                }

                let expired = ctx.elapsed() >= ctx.def.life_span;
                let step = ctx.def.speed * ctx.frame.dt;
                for index in 0..ctx.data.slots.len() {
                    let slot = &mut ctx.data.slots[index];
                    if slot.applied {
                        continue;
                    }
                    if let Some(target) = slot.contact {
                        slot.applied = true;
                        ctx.out.push(AbilityCommand::ApplyContact { slot: index, target });
                        continue;
                    }
                    slot.pos += slot.direction * step;
                    let pos = slot.pos;
                    if expired {
                        slot.applied = true;
                        ctx.out.push(AbilityCommand::ApplyAt { slot: index, pos });
                    } else {
                        ctx.out.push(AbilityCommand::MoveVfx { slot: index, pos });
                    }
                }
            }
            LaunchPolicy::PermanentFollow => {
                // Continuously re-lock to the caster, then apply at the
                // caster's final position.
                let pos = ctx.frame.caster_pos;
                let done = ctx.elapsed() >= ctx.def.final_launch_time;
                for index in 0..ctx.data.slots.len() {
                    let slot = &mut ctx.data.slots[index];
                    if slot.applied {
                        continue;
                    }
                    slot.pos = pos;
                    if done {
                        slot.applied = true;
                        ctx.out.push(AbilityCommand::ApplyAt { slot: index, pos });
                    } else {
                        ctx.out.push(AbilityCommand::MoveVfx { slot: index, pos });
                    }
                }
            }
            LaunchPolicy::DelayedFixed => {
                // No movement: wait out the delay, then apply at the marked
                // or originally resolved position.
                if ctx.elapsed() >= ctx.def.final_launch_time {
                    for index in 0..ctx.data.slots.len() {
                        let slot = &mut ctx.data.slots[index];
                        if !slot.applied {
                            slot.applied = true;
                            let pos = slot.pos;
                            ctx.out.push(AbilityCommand::ApplyAt { slot: index, pos });
                        }
                    }
                }
            }
        }
    }

    fn next(&self, ctx: &AbilityCtx) -> AbilityPhase {
        if ctx.data.slots.iter().all(|s| s.applied) {
            AbilityPhase::Active
        } else {
            AbilityPhase::Launching
        }
    }
}

struct ActiveState;

impl State<AbilityPhase, AbilityCtx> for ActiveState {
    fn enter(&mut self, ctx: &mut AbilityCtx) {
        let available = ctx.def.availability.while_active;
        ctx.enter_phase(available);
    }

    fn next(&self, ctx: &AbilityCtx) -> AbilityPhase {
        if ctx.elapsed() >= ctx.def.duration {
            AbilityPhase::InCooldown
        } else {
            AbilityPhase::Active
        }
    }

    fn exit(&mut self, ctx: &mut AbilityCtx) {
        // The applied-effect window is over; tear down the transient
        // visual handles.
        for index in 0..ctx.data.slots.len() {
            if ctx.data.slots[index].vfx.is_some() {
                ctx.out.push(AbilityCommand::DespawnVfx { slot: index });
            }
        }
    }
}

struct CooldownState;

impl State<AbilityPhase, AbilityCtx> for CooldownState {
    fn enter(&mut self, ctx: &mut AbilityCtx) {
        let available = ctx.def.availability.while_cooldown;
        ctx.enter_phase(available);
        ctx.data.active = false;
        ctx.data.marked_pos = None;
    }

    fn next(&self, ctx: &AbilityCtx) -> AbilityPhase {
        if ctx.elapsed() >= ctx.def.cool_down {
            AbilityPhase::Ready
        } else {
            AbilityPhase::InCooldown
        }
    }
}

// ============================================================================
// Holder & loadout
// ============================================================================

/// Per-caster runtime wrapper around one shared ability definition.
pub struct AbilityHolder {
    pub kind: AbilityKind,
    pub def: Arc<AbilityDefinition>,
    pub data: HolderData,
    machine: StateMachine<AbilityPhase, AbilityCtx>,
}

impl AbilityHolder {
    pub fn new(kind: AbilityKind, def: Arc<AbilityDefinition>) -> Self {
        let machine = MachineBuilder::new()
            .state(AbilityPhase::Ready, ReadyState)
            .state(AbilityPhase::Casting, CastingState)
            .state(AbilityPhase::Launching, LaunchingState)
            .state(AbilityPhase::Active, ActiveState)
            .state(AbilityPhase::InCooldown, CooldownState)
            .build(AbilityPhase::Ready)
            .expect("ability machine covers all phases");
        Self {
            kind,
            def,
            data: HolderData::default(),
            machine,
        }
    }

    pub fn phase(&self) -> AbilityPhase {
        self.machine.current()
    }

    /// Whether the input layer may request a (re)trigger right now.
    pub fn retrigger_available(&self) -> bool {
        self.data.retrigger_available
    }

    /// Run one machine tick. `contacts` are this frame's projectile contacts,
    /// forwarded as trigger callbacks before the update pass.
    pub fn tick(&mut self, frame: AbilityFrame, contacts: &[Entity]) -> Vec<AbilityCommand> {
        let mut ctx = AbilityCtx {
            def: self.def.clone(),
            data: std::mem::take(&mut self.data),
            frame,
            out: Vec::new(),
        };
        for &other in contacts {
            self.machine.trigger(&mut ctx, TriggerPhase::Enter, other);
        }
        self.machine.tick(&mut ctx);
        self.data = ctx.data;
        ctx.out
    }

    /// Run the late pass (visual sync after movement).
    pub fn late_tick(&mut self, frame: AbilityFrame) -> Vec<AbilityCommand> {
        let mut ctx = AbilityCtx {
            def: self.def.clone(),
            data: std::mem::take(&mut self.data),
            frame,
            out: Vec::new(),
        };
        self.machine.late_tick(&mut ctx);
        self.data = ctx.data;
        ctx.out
    }

    /// Hard synchronous stop (caster death): drop any in-flight action and
    /// return the machine to Ready. Returns the visual handles that were
    /// owned by the dropped action so the caller can despawn them.
    pub fn halt(&mut self, now: f32) -> Vec<Entity> {
        let orphaned: Vec<Entity> = self.data.slots.iter().filter_map(|s| s.vfx).collect();
        let frame = AbilityFrame::idle(Entity::PLACEHOLDER, Vec3::ZERO, now);
        let mut ctx = AbilityCtx {
            def: self.def.clone(),
            data: std::mem::take(&mut self.data),
            frame,
            out: Vec::new(),
        };
        self.machine.force_transition(&mut ctx, AbilityPhase::Ready);
        self.data = ctx.data;
        self.data.trigger_requested = false;
        self.data.slots.clear();
        self.data.pending_contacts.clear();
        orphaned
    }
}

/// An actor's equipped abilities, one holder per slot.
#[derive(Component, Default)]
pub struct AbilityLoadout {
    pub holders: Vec<AbilityHolder>,
}

impl AbilityLoadout {
    /// Build a loadout from the shared book. Fails on unknown abilities so a
    /// misconfigured actor is caught at spawn, not mid-fight.
    pub fn from_kinds(book: &AbilityBook, kinds: &[AbilityKind]) -> Result<Self, String> {
        let mut holders = Vec::new();
        for &kind in kinds {
            let def = book
                .get(kind)
                .ok_or_else(|| format!("ability {kind:?} missing from ability book"))?;
            holders.push(AbilityHolder::new(kind, def));
        }
        Ok(Self { holders })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
