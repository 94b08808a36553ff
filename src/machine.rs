//! Generic State Machine Framework
//!
//! A reusable finite-state-machine container shared by the ability system and
//! the movement/AI brains. Each state owns its lifecycle hooks:
//!
//! - `enter` / `exit` run exactly once around a transition
//! - `update` runs every tick, then `next` computes the successor key
//! - `late_update` runs in a second, later pass each frame
//! - `on_trigger` receives collision-style trigger callbacks, which are
//!   forwarded to the **current** state only
//!
//! Transitions are synchronous: there is never a tick on which a machine is
//! "between" states. A state returning its own key from `next` is a valid
//! self-loop and causes no transition.
//!
//! Machines are built through [`MachineBuilder`], which rejects any machine
//! whose state map does not cover every key of the key enum. A missing key is
//! a programmer error and must fail at construction time, not mid-simulation.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use bevy::prelude::*;
use strum::IntoEnumIterator;

/// Bound alias for state-machine keys (ability phases, movement modes, ...).
pub trait MachineKey: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}
impl<T: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static> MachineKey for T {}

/// Which edge of a trigger volume produced a forwarded callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Enter,
    Stay,
    Exit,
}

/// One state of a machine, parameterized over the key type `K` and the
/// per-tick context `C` assembled by whatever drives the machine.
pub trait State<K: MachineKey, C>: Send + Sync {
    fn enter(&mut self, _ctx: &mut C) {}

    fn update(&mut self, _ctx: &mut C) {}

    /// Compute the successor key. Returning the current key keeps the machine
    /// in place.
    fn next(&self, ctx: &C) -> K;

    fn late_update(&mut self, _ctx: &mut C) {}

    fn exit(&mut self, _ctx: &mut C) {}

    fn on_trigger(&mut self, _ctx: &mut C, _phase: TriggerPhase, _other: Entity) {}
}

/// Construction-time validation failures.
#[derive(Debug, PartialEq, Eq)]
pub enum MachineError {
    /// A key of the enum has no registered state.
    MissingState(String),
    /// The requested initial key has no registered state.
    UnknownInitial(String),
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineError::MissingState(key) => {
                write!(f, "state machine is missing a state for key {key}")
            }
            MachineError::UnknownInitial(key) => {
                write!(f, "state machine has no state for initial key {key}")
            }
        }
    }
}

impl std::error::Error for MachineError {}

/// Builder that collects states and validates coverage before producing a
/// runnable [`StateMachine`].
pub struct MachineBuilder<K: MachineKey, C> {
    states: HashMap<K, Box<dyn State<K, C>>>,
}

impl<K: MachineKey, C> Default for MachineBuilder<K, C> {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
        }
    }
}

impl<K: MachineKey, C> MachineBuilder<K, C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, key: K, state: impl State<K, C> + 'static) -> Self {
        self.states.insert(key, Box::new(state));
        self
    }

    /// Finish the machine, verifying that every enum key has a state and that
    /// the initial key is registered.
    pub fn build(self, initial: K) -> Result<StateMachine<K, C>, MachineError>
    where
        K: IntoEnumIterator,
    {
        for key in K::iter() {
            if !self.states.contains_key(&key) {
                return Err(MachineError::MissingState(format!("{key:?}")));
            }
        }
        if !self.states.contains_key(&initial) {
            return Err(MachineError::UnknownInitial(format!("{initial:?}")));
        }
        Ok(StateMachine {
            states: self.states,
            current: initial,
            started: false,
        })
    }
}

/// Owns a key-to-state map and exactly one current key.
pub struct StateMachine<K: MachineKey, C> {
    states: HashMap<K, Box<dyn State<K, C>>>,
    current: K,
    started: bool,
}

impl<K: MachineKey, C> StateMachine<K, C> {
    pub fn current(&self) -> K {
        self.current
    }

    /// Run one tick: `update` on the current state, then `next`; on a key
    /// change, `exit` the old state, swap, and `enter` the new one.
    ///
    /// The initial state's `enter` hook runs lazily on the first tick, so a
    /// machine can be constructed before any context exists.
    pub fn tick(&mut self, ctx: &mut C) {
        if !self.started {
            self.started = true;
            if let Some(state) = self.states.get_mut(&self.current) {
                state.enter(ctx);
            }
        }

        let current = self.current;
        let next = match self.states.get_mut(&current) {
            Some(state) => {
                state.update(ctx);
                state.next(ctx)
            }
            None => return,
        };

        if next != current {
            self.transition(ctx, current, next);
        }
    }

    /// Second per-frame pass, forwarded to the current state only.
    pub fn late_tick(&mut self, ctx: &mut C) {
        if !self.started {
            return;
        }
        if let Some(state) = self.states.get_mut(&self.current) {
            state.late_update(ctx);
        }
    }

    /// Forward a trigger callback to the current state only.
    pub fn trigger(&mut self, ctx: &mut C, phase: TriggerPhase, other: Entity) {
        if let Some(state) = self.states.get_mut(&self.current) {
            state.on_trigger(ctx, phase, other);
        }
    }

    /// Externally force the machine into `key`, running the usual exit/enter
    /// hooks. Used for hard interruptions (death) that bypass `next`.
    pub fn force_transition(&mut self, ctx: &mut C, key: K) {
        let current = self.current;
        if key == current {
            return;
        }
        self.transition(ctx, current, key);
    }

    fn transition(&mut self, ctx: &mut C, from: K, to: K) {
        // A state may compute a key that was never registered. That is a bug
        // in the state, not a reason to poison the whole machine: log and
        // stay put.
        if !self.states.contains_key(&to) {
            warn!("state machine: transition to unregistered key {to:?} ignored");
            return;
        }
        if let Some(old) = self.states.get_mut(&from) {
            old.exit(ctx);
        }
        self.current = to;
        if let Some(new) = self.states.get_mut(&to) {
            new.enter(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::EnumIter;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
    enum TestKey {
        A,
        B,
        C,
    }

    /// Test context records every hook invocation in order.
    #[derive(Default)]
    struct Trace {
        calls: Vec<String>,
        go_b: bool,
        go_c: bool,
    }

    struct TracingState {
        name: &'static str,
        key: TestKey,
    }

    impl State<TestKey, Trace> for TracingState {
        fn enter(&mut self, ctx: &mut Trace) {
            ctx.calls.push(format!("enter {}", self.name));
        }
        fn update(&mut self, ctx: &mut Trace) {
            ctx.calls.push(format!("update {}", self.name));
        }
        fn next(&self, ctx: &Trace) -> TestKey {
            match self.key {
                TestKey::A if ctx.go_b => TestKey::B,
                TestKey::B if ctx.go_c => TestKey::C,
                _ => self.key,
            }
        }
        fn exit(&mut self, ctx: &mut Trace) {
            ctx.calls.push(format!("exit {}", self.name));
        }
        fn on_trigger(&mut self, ctx: &mut Trace, phase: TriggerPhase, _other: Entity) {
            ctx.calls.push(format!("trigger {} {:?}", self.name, phase));
        }
    }

    fn machine() -> StateMachine<TestKey, Trace> {
        MachineBuilder::new()
            .state(TestKey::A, TracingState { name: "a", key: TestKey::A })
            .state(TestKey::B, TracingState { name: "b", key: TestKey::B })
            .state(TestKey::C, TracingState { name: "c", key: TestKey::C })
            .build(TestKey::A)
            .expect("complete machine")
    }

    #[test]
    fn build_rejects_missing_state() {
        let result: Result<StateMachine<TestKey, Trace>, _> = MachineBuilder::new()
            .state(TestKey::A, TracingState { name: "a", key: TestKey::A })
            .build(TestKey::A);
        assert!(matches!(result, Err(MachineError::MissingState(_))));
    }

    #[test]
    fn self_loop_causes_no_transition() {
        let mut fsm = machine();
        let mut ctx = Trace::default();
        fsm.tick(&mut ctx);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current(), TestKey::A);
        // Entered once, updated twice, never exited.
        assert_eq!(
            ctx.calls,
            vec!["enter a", "update a", "update a"]
        );
    }

    #[test]
    fn transition_runs_exit_then_enter_in_order() {
        let mut fsm = machine();
        let mut ctx = Trace::default();
        fsm.tick(&mut ctx);
        ctx.go_b = true;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current(), TestKey::B);
        assert_eq!(
            ctx.calls,
            vec!["enter a", "update a", "update a", "exit a", "enter b"]
        );
    }

    #[test]
    fn chained_transitions_take_one_tick_each() {
        let mut fsm = machine();
        let mut ctx = Trace {
            go_b: true,
            go_c: true,
            ..Default::default()
        };
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current(), TestKey::B);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current(), TestKey::C);
    }

    #[test]
    fn triggers_reach_current_state_only() {
        let mut fsm = machine();
        let mut ctx = Trace::default();
        fsm.tick(&mut ctx);
        fsm.trigger(&mut ctx, TriggerPhase::Enter, Entity::from_raw(7));
        assert_eq!(ctx.calls.last().unwrap(), "trigger a Enter");
    }

    #[test]
    fn force_transition_runs_hooks() {
        let mut fsm = machine();
        let mut ctx = Trace::default();
        fsm.tick(&mut ctx);
        fsm.force_transition(&mut ctx, TestKey::C);
        assert_eq!(fsm.current(), TestKey::C);
        assert_eq!(ctx.calls.last().unwrap(), "enter c");
        assert_eq!(ctx.calls[ctx.calls.len() - 2], "exit a");
    }
}
