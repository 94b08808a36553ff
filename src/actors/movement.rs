//! Movement & AI state machines
//!
//! Both the player locomotion machine and the mob brains are built on the
//! same state machine framework as the ability system. Movement speed is
//! read from the actor's Speed pool through its factor stack, so slow/haste
//! effects land here without the machines knowing about them.

use bevy::prelude::*;
use strum::EnumIter;

use crate::abilities::state_machine::AbilityLoadout;
use crate::actors::stats::{StatKind, Vitals};
use crate::actors::{ActorKind, Dead, MobKind};
use crate::combat::events::{AbilityTriggerEvent, AnimationRequest};
use crate::combat::GameRng;
use crate::machine::{MachineBuilder, State, StateMachine};

/// Fallback speed when an actor has no Speed pool.
const DEFAULT_SPEED: f32 = 4.0;

/// Walking moves at this fraction of the Speed pool reading.
const WALK_FRACTION: f32 = 0.55;

/// Mobs give up a chase this far from their home point.
const LEASH_RADIUS: f32 = 40.0;

/// How far from home a patrol waypoint may land.
const PATROL_RADIUS: f32 = 8.0;

// ============================================================================
// Player locomotion
// ============================================================================

/// Movement intent for the player, written by the input collaborator (the
/// scenario script in headless runs).
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PlayerMoveIntent {
    pub direction: Vec3,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum PlayerMoveKey {
    Idle,
    Walking,
    Running,
}

/// Per-tick context for the locomotion machine.
pub struct LocoCtx {
    pub direction: Vec3,
    pub running: bool,
    pub speed: f32,
    /// Velocity decided by the current state this tick.
    pub velocity: Vec3,
    /// Animation state to crossfade into, set on transitions.
    pub animation: Option<&'static str>,
}

struct IdleMove;
struct WalkingMove;
struct RunningMove;

impl State<PlayerMoveKey, LocoCtx> for IdleMove {
    fn enter(&mut self, ctx: &mut LocoCtx) {
        ctx.animation = Some("idle");
    }
    fn next(&self, ctx: &LocoCtx) -> PlayerMoveKey {
        if ctx.direction.length_squared() < 1e-6 {
            PlayerMoveKey::Idle
        } else if ctx.running {
            PlayerMoveKey::Running
        } else {
            PlayerMoveKey::Walking
        }
    }
}

impl State<PlayerMoveKey, LocoCtx> for WalkingMove {
    fn enter(&mut self, ctx: &mut LocoCtx) {
        ctx.animation = Some("walk");
    }
    fn update(&mut self, ctx: &mut LocoCtx) {
        ctx.velocity = ctx.direction.normalize_or_zero() * ctx.speed * WALK_FRACTION;
    }
    fn next(&self, ctx: &LocoCtx) -> PlayerMoveKey {
        if ctx.direction.length_squared() < 1e-6 {
            PlayerMoveKey::Idle
        } else if ctx.running {
            PlayerMoveKey::Running
        } else {
            PlayerMoveKey::Walking
        }
    }
}

impl State<PlayerMoveKey, LocoCtx> for RunningMove {
    fn enter(&mut self, ctx: &mut LocoCtx) {
        ctx.animation = Some("run");
    }
    fn update(&mut self, ctx: &mut LocoCtx) {
        ctx.velocity = ctx.direction.normalize_or_zero() * ctx.speed;
    }
    fn next(&self, ctx: &LocoCtx) -> PlayerMoveKey {
        if ctx.direction.length_squared() < 1e-6 {
            PlayerMoveKey::Idle
        } else if ctx.running {
            PlayerMoveKey::Running
        } else {
            PlayerMoveKey::Walking
        }
    }
}

/// The player's locomotion machine.
#[derive(Component)]
pub struct PlayerLocomotion {
    machine: StateMachine<PlayerMoveKey, LocoCtx>,
}

impl PlayerLocomotion {
    pub fn new() -> Self {
        let machine = MachineBuilder::new()
            .state(PlayerMoveKey::Idle, IdleMove)
            .state(PlayerMoveKey::Walking, WalkingMove)
            .state(PlayerMoveKey::Running, RunningMove)
            .build(PlayerMoveKey::Idle)
            .expect("locomotion machine covers all keys");
        Self { machine }
    }

    pub fn mode(&self) -> PlayerMoveKey {
        self.machine.current()
    }
}

impl Default for PlayerLocomotion {
    fn default() -> Self {
        Self::new()
    }
}

/// Drive the player locomotion machine and integrate the resulting velocity.
pub fn drive_player_locomotion(
    time: Res<Time>,
    mut players: Query<
        (
            Entity,
            &mut Transform,
            &mut PlayerLocomotion,
            &PlayerMoveIntent,
            &Vitals,
        ),
        Without<Dead>,
    >,
    mut animations: EventWriter<AnimationRequest>,
) {
    let dt = time.delta_secs();
    for (entity, mut transform, mut locomotion, intent, vitals) in players.iter_mut() {
        let speed = vitals
            .scaled_current(StatKind::Speed)
            .unwrap_or(DEFAULT_SPEED);
        let mut ctx = LocoCtx {
            direction: intent.direction,
            running: intent.running,
            speed,
            velocity: Vec3::ZERO,
            animation: None,
        };
        locomotion.machine.tick(&mut ctx);
        if ctx.velocity != Vec3::ZERO {
            transform.translation += ctx.velocity * dt;
            let flat = Vec3::new(ctx.velocity.x, 0.0, ctx.velocity.z);
            if flat.length_squared() > 1e-6 {
                transform.look_to(flat.normalize(), Vec3::Y);
            }
        }
        if let Some(animation) = ctx.animation {
            animations.send(AnimationRequest {
                actor: entity,
                state: animation.to_string(),
                crossfade: 0.15,
            });
        }
    }
}

// ============================================================================
// Mob brains
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum MobMoveKey {
    Idle,
    Patrol,
    Chasing,
}

/// Commands a brain state can issue this tick; executed by the driver with
/// full world access.
pub enum MobCommand {
    MoveToward(Vec3),
    TriggerAbility(usize),
    Animate(&'static str),
}

/// Persistent brain data between ticks.
#[derive(Debug, Clone, Default)]
pub struct MobData {
    patrol_target: Option<Vec3>,
    idle_until: f32,
}

/// Per-tick context for a mob brain.
pub struct MobCtx {
    pub data: MobData,
    pub now: f32,
    pub self_pos: Vec3,
    pub home: Vec3,
    pub aggro_radius: f32,
    pub attack_range: f32,
    /// Nearest living player this frame, if any.
    pub player: Option<(Entity, Vec3)>,
    /// Two pre-rolled uniform samples for waypoint/dwell decisions.
    pub rand: [f32; 2],
    pub ability_slots: usize,
    pub out: Vec<MobCommand>,
}

impl MobCtx {
    fn player_in_aggro(&self) -> bool {
        self.player
            .map(|(_, pos)| pos.distance(self.self_pos) <= self.aggro_radius)
            .unwrap_or(false)
    }
}

struct IdleBrain;
struct PatrolBrain;
struct ChasingBrain;

impl State<MobMoveKey, MobCtx> for IdleBrain {
    fn enter(&mut self, ctx: &mut MobCtx) {
        ctx.data.idle_until = ctx.now + 1.5 + ctx.rand[0] * 2.0;
        ctx.out.push(MobCommand::Animate("idle"));
    }
    fn next(&self, ctx: &MobCtx) -> MobMoveKey {
        if ctx.player_in_aggro() {
            MobMoveKey::Chasing
        } else if ctx.now >= ctx.data.idle_until {
            MobMoveKey::Patrol
        } else {
            MobMoveKey::Idle
        }
    }
}

impl State<MobMoveKey, MobCtx> for PatrolBrain {
    fn enter(&mut self, ctx: &mut MobCtx) {
        let angle = ctx.rand[0] * std::f32::consts::TAU;
        let distance = 2.0 + ctx.rand[1] * (PATROL_RADIUS - 2.0);
        ctx.data.patrol_target =
            Some(ctx.home + Vec3::new(angle.cos(), 0.0, angle.sin()) * distance);
        ctx.out.push(MobCommand::Animate("walk"));
    }
    fn update(&mut self, ctx: &mut MobCtx) {
        if let Some(target) = ctx.data.patrol_target {
            ctx.out.push(MobCommand::MoveToward(target));
        }
    }
    fn next(&self, ctx: &MobCtx) -> MobMoveKey {
        if ctx.player_in_aggro() {
            return MobMoveKey::Chasing;
        }
        match ctx.data.patrol_target {
            Some(target) if target.distance(ctx.self_pos) > 0.3 => MobMoveKey::Patrol,
            _ => MobMoveKey::Idle,
        }
    }
    fn exit(&mut self, ctx: &mut MobCtx) {
        ctx.data.patrol_target = None;
    }
}

impl State<MobMoveKey, MobCtx> for ChasingBrain {
    fn enter(&mut self, ctx: &mut MobCtx) {
        ctx.out.push(MobCommand::Animate("run"));
    }
    fn update(&mut self, ctx: &mut MobCtx) {
        let Some((_, player_pos)) = ctx.player else {
            return;
        };
        if player_pos.distance(ctx.self_pos) > ctx.attack_range {
            ctx.out.push(MobCommand::MoveToward(player_pos));
        } else if ctx.ability_slots > 0 {
            // In range: pick one of the loadout slots and let the ability
            // machine's availability gating decide whether it goes off.
            let slot = ((ctx.rand[1] * ctx.ability_slots as f32) as usize)
                .min(ctx.ability_slots - 1);
            ctx.out.push(MobCommand::TriggerAbility(slot));
        }
    }
    fn next(&self, ctx: &MobCtx) -> MobMoveKey {
        let leashed = ctx.self_pos.distance(ctx.home) > LEASH_RADIUS;
        if ctx.player.is_none() || leashed {
            MobMoveKey::Idle
        } else {
            MobMoveKey::Chasing
        }
    }
}

/// A mob's AI brain: the movement machine plus its kind tuning.
#[derive(Component)]
pub struct MobBrain {
    machine: StateMachine<MobMoveKey, MobCtx>,
    data: MobData,
    pub kind: MobKind,
    pub home: Vec3,
}

impl MobBrain {
    pub fn new(kind: MobKind, home: Vec3) -> Self {
        let machine = MachineBuilder::new()
            .state(MobMoveKey::Idle, IdleBrain)
            .state(MobMoveKey::Patrol, PatrolBrain)
            .state(MobMoveKey::Chasing, ChasingBrain)
            .build(MobMoveKey::Idle)
            .expect("mob brain covers all keys");
        Self {
            machine,
            data: MobData::default(),
            kind,
            home,
        }
    }

    pub fn mode(&self) -> MobMoveKey {
        self.machine.current()
    }
}

/// Drive every mob brain: find the nearest living player, tick the machine,
/// then execute the movement/trigger commands it produced.
pub fn drive_mob_brains(
    time: Res<Time>,
    mut rng: ResMut<GameRng>,
    mut mobs: Query<
        (
            Entity,
            &mut Transform,
            &mut MobBrain,
            &Vitals,
            &AbilityLoadout,
        ),
        Without<Dead>,
    >,
    players: Query<(Entity, &Transform, &ActorKind), (Without<MobBrain>, Without<Dead>)>,
    mut triggers: EventWriter<AbilityTriggerEvent>,
    mut animations: EventWriter<AnimationRequest>,
) {
    let dt = time.delta_secs();
    let now = time.elapsed_secs();

    let player_positions: Vec<(Entity, Vec3)> = players
        .iter()
        .filter(|(_, _, kind)| **kind == ActorKind::Player)
        .map(|(entity, transform, _)| (entity, transform.translation))
        .collect();

    for (entity, mut transform, mut brain, vitals, loadout) in mobs.iter_mut() {
        let self_pos = transform.translation;
        let nearest = player_positions
            .iter()
            .copied()
            .min_by(|a, b| {
                a.1.distance_squared(self_pos)
                    .total_cmp(&b.1.distance_squared(self_pos))
            });

        let mut ctx = MobCtx {
            data: std::mem::take(&mut brain.data),
            now,
            self_pos,
            home: brain.home,
            aggro_radius: brain.kind.aggro_radius(),
            attack_range: brain.kind.attack_range(),
            player: nearest,
            rand: [rng.random_f32(), rng.random_f32()],
            ability_slots: loadout.holders.len(),
            out: Vec::new(),
        };
        brain.machine.tick(&mut ctx);
        brain.data = ctx.data;

        let speed = vitals
            .scaled_current(StatKind::Speed)
            .unwrap_or(DEFAULT_SPEED);
        for command in ctx.out {
            match command {
                MobCommand::MoveToward(target) => {
                    let to_target = Vec3::new(target.x - self_pos.x, 0.0, target.z - self_pos.z);
                    let distance = to_target.length();
                    if distance > 1e-3 {
                        let step = (speed * dt).min(distance);
                        transform.translation += to_target / distance * step;
                        transform.look_to(to_target / distance, Vec3::Y);
                    }
                }
                MobCommand::TriggerAbility(slot) => {
                    triggers.send(AbilityTriggerEvent { actor: entity, slot });
                }
                MobCommand::Animate(state) => {
                    animations.send(AnimationRequest {
                        actor: entity,
                        state: state.to_string(),
                        crossfade: 0.2,
                    });
                }
            }
        }
    }
}
