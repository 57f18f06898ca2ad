//! Multi-phase interactions: a single-pass sequence of states with a
//! shared store.
//!
//! A typical chain is "select a source block, wait for the throw, fly".
//! Each state runs until it reports completion (or an outside trigger forces
//! it), then the next one is entered. States are never revisited.

use std::collections::BTreeMap;

use bendsim_common::{BlockPos, EntityId};
use glam::DVec3;

use crate::archetype::AsAny;
use crate::context::AbilityContext;
use crate::error::ChainError;

/// A value a state publishes for later states or the owning ability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChainValue {
    Block(BlockPos),
    Position(DVec3),
    Number(f64),
    Flag(bool),
    Entity(EntityId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainStore {
    values: BTreeMap<String, ChainValue>,
}

impl ChainStore {
    pub fn insert(&mut self, key: impl Into<String>, value: ChainValue) -> Option<ChainValue> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<ChainValue> {
        self.values.get(key).copied()
    }

    pub fn remove(&mut self, key: &str) -> Option<ChainValue> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn block(&self, key: &str) -> Option<BlockPos> {
        match self.get(key)? {
            ChainValue::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn position(&self, key: &str) -> Option<DVec3> {
        match self.get(key)? {
            ChainValue::Position(p) => Some(p),
            ChainValue::Block(b) => Some(b.center()),
            _ => None,
        }
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            ChainValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(ChainValue::Flag(true)))
    }

    pub fn entity(&self, key: &str) -> Option<EntityId> {
        match self.get(key)? {
            ChainValue::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What a state reports after one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateStatus {
    Running,
    Complete,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    NotStarted,
    Running,
    Finished,
    Aborted,
}

impl ChainStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Aborted)
    }
}

/// One phase of a chain.
pub trait State: AsAny {
    fn name(&self) -> &'static str;

    /// Entered as the current state.
    fn start(&mut self, _store: &mut ChainStore) {}

    fn update(&mut self, ctx: &mut AbilityContext<'_>, store: &mut ChainStore) -> StateStatus;

    /// Finish early because something outside asked. Publish whatever the
    /// natural completion would have.
    fn complete(&mut self, _store: &mut ChainStore) {}
}

pub struct StateChain {
    states: Vec<Box<dyn State>>,
    current: usize,
    status: ChainStatus,
    store: ChainStore,
}

impl std::fmt::Debug for StateChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.states.iter().map(|s| s.name()).collect();
        f.debug_struct("StateChain")
            .field("states", &names)
            .field("current", &self.current)
            .field("status", &self.status)
            .finish()
    }
}

impl Default for StateChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl StateChain {
    pub fn new(states: Vec<Box<dyn State>>) -> Self {
        Self {
            states,
            current: 0,
            status: ChainStatus::NotStarted,
            store: ChainStore::default(),
        }
    }

    /// Append a state. Only allowed before [`StateChain::start`].
    pub fn push(&mut self, state: Box<dyn State>) -> Result<(), ChainError> {
        if self.status != ChainStatus::NotStarted {
            return Err(ChainError::AlreadyStarted);
        }
        self.states.push(state);
        Ok(())
    }

    /// Enter the first state. An empty chain finishes immediately. Calling
    /// this again is a no-op.
    pub fn start(&mut self) -> ChainStatus {
        if self.status != ChainStatus::NotStarted {
            return self.status;
        }
        match self.states.first_mut() {
            Some(first) => {
                first.start(&mut self.store);
                self.status = ChainStatus::Running;
            }
            None => self.status = ChainStatus::Finished,
        }
        self.status
    }

    /// Update the current state. Natural completion moves to the next state,
    /// which first runs on the following update.
    pub fn update(&mut self, ctx: &mut AbilityContext<'_>) -> ChainStatus {
        if self.status != ChainStatus::Running {
            return self.status;
        }
        let Some(state) = self.states.get_mut(self.current) else {
            self.status = ChainStatus::Finished;
            return self.status;
        };
        match state.update(ctx, &mut self.store) {
            StateStatus::Running => {}
            StateStatus::Complete => self.advance(),
            StateStatus::Abort => {
                tracing::debug!(state = state.name(), "chain aborted");
                self.status = ChainStatus::Aborted;
            }
        }
        self.status
    }

    /// Force the current state to finish and move on by exactly one state.
    pub fn complete_current(&mut self) -> ChainStatus {
        if self.status != ChainStatus::Running {
            return self.status;
        }
        if let Some(state) = self.states.get_mut(self.current) {
            state.complete(&mut self.store);
        }
        self.advance();
        self.status
    }

    pub fn abort(&mut self) {
        if !self.status.is_terminal() {
            self.status = ChainStatus::Aborted;
        }
    }

    fn advance(&mut self) {
        self.current += 1;
        match self.states.get_mut(self.current) {
            Some(next) => next.start(&mut self.store),
            None => self.status = ChainStatus::Finished,
        }
    }

    pub fn current(&self) -> Option<&dyn State> {
        if self.status != ChainStatus::Running {
            return None;
        }
        self.states.get(self.current).map(|s| &**s)
    }

    pub fn current_mut(&mut self) -> Option<&mut dyn State> {
        if self.status != ChainStatus::Running {
            return None;
        }
        match self.states.get_mut(self.current) {
            Some(state) => Some(&mut **state),
            None => None,
        }
    }

    /// Current state as a concrete type.
    pub fn current_as<T: State>(&self) -> Option<&T> {
        self.current()?.as_any().downcast_ref::<T>()
    }

    pub fn status(&self) -> ChainStatus {
        self.status
    }

    pub fn finished(&self) -> bool {
        self.status == ChainStatus::Finished
    }

    /// States that have completed, naturally or by force.
    pub fn completed_states(&self) -> usize {
        self.current.min(self.states.len())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ChainStore {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::with_context;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Completes after `ticks` updates and records every call.
    struct Wait {
        name: &'static str,
        ticks: u32,
        log: Log,
    }

    impl State for Wait {
        fn name(&self) -> &'static str {
            self.name
        }

        fn start(&mut self, _store: &mut ChainStore) {
            self.log.borrow_mut().push(format!("start {}", self.name));
        }

        fn update(&mut self, _ctx: &mut AbilityContext<'_>, store: &mut ChainStore) -> StateStatus {
            self.log.borrow_mut().push(format!("update {}", self.name));
            if self.ticks <= 1 {
                store.insert(self.name, ChainValue::Flag(true));
                return StateStatus::Complete;
            }
            self.ticks -= 1;
            StateStatus::Running
        }

        fn complete(&mut self, store: &mut ChainStore) {
            self.log.borrow_mut().push(format!("complete {}", self.name));
            store.insert(self.name, ChainValue::Flag(true));
        }
    }

    fn wait(name: &'static str, ticks: u32, log: &Log) -> Box<dyn State> {
        Box::new(Wait {
            name,
            ticks,
            log: log.clone(),
        })
    }

    struct Bail;

    impl State for Bail {
        fn name(&self) -> &'static str {
            "bail"
        }

        fn update(
            &mut self,
            _ctx: &mut AbilityContext<'_>,
            _store: &mut ChainStore,
        ) -> StateStatus {
            StateStatus::Abort
        }
    }

    #[test]
    fn runs_every_state_once_in_order() {
        let log = Log::default();
        let mut chain = StateChain::new(vec![
            wait("a", 1, &log),
            wait("b", 2, &log),
            wait("c", 1, &log),
        ]);
        assert_eq!(chain.start(), ChainStatus::Running);

        with_context(|ctx| {
            let mut updates = 0;
            while chain.update(ctx) == ChainStatus::Running {
                updates += 1;
                assert!(updates < 10);
            }
        });

        assert!(chain.finished());
        assert_eq!(chain.completed_states(), 3);
        assert!(chain.store().flag("a") && chain.store().flag("b") && chain.store().flag("c"));
        assert_eq!(
            *log.borrow(),
            ["start a", "update a", "start b", "update b", "update b", "start c", "update c"]
        );
    }

    #[test]
    fn complete_current_advances_exactly_one() {
        let log = Log::default();
        let mut chain = StateChain::new(vec![wait("a", 100, &log), wait("b", 100, &log)]);
        chain.start();
        assert_eq!(chain.current().map(|s| s.name()), Some("a"));

        assert_eq!(chain.complete_current(), ChainStatus::Running);
        assert_eq!(chain.current().map(|s| s.name()), Some("b"));
        assert_eq!(chain.completed_states(), 1);
        assert!(chain.store().flag("a"));
        assert!(!chain.store().flag("b"));

        assert_eq!(chain.complete_current(), ChainStatus::Finished);
        assert_eq!(chain.complete_current(), ChainStatus::Finished);
        assert_eq!(chain.completed_states(), 2);
        assert!(chain.current().is_none());
    }

    #[test]
    fn abort_stops_the_chain() {
        let log = Log::default();
        let mut chain =
            StateChain::new(vec![Box::new(Bail) as Box<dyn State>, wait("after", 1, &log)]);
        chain.start();
        with_context(|ctx| {
            assert_eq!(chain.update(ctx), ChainStatus::Aborted);
            assert_eq!(chain.update(ctx), ChainStatus::Aborted);
        });
        assert!(log.borrow().is_empty());
        assert_eq!(chain.completed_states(), 0);
    }

    #[test]
    fn update_before_start_touches_nothing() {
        let log = Log::default();
        let mut chain = StateChain::new(vec![wait("a", 1, &log)]);
        with_context(|ctx| assert_eq!(chain.update(ctx), ChainStatus::NotStarted));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn push_after_start_is_rejected() {
        let log = Log::default();
        let mut chain = StateChain::default();
        assert!(chain.push(wait("a", 1, &log)).is_ok());
        chain.start();
        assert_eq!(chain.push(wait("b", 1, &log)), Err(ChainError::AlreadyStarted));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn empty_chain_finishes_on_start() {
        let mut chain = StateChain::default();
        assert_eq!(chain.start(), ChainStatus::Finished);
    }

    #[test]
    fn current_downcasts_to_concrete_state() {
        let log = Log::default();
        let mut chain = StateChain::new(vec![wait("a", 5, &log)]);
        chain.start();
        assert_eq!(chain.current_as::<Wait>().map(|w| w.ticks), Some(5));
        assert!(chain.current_as::<Bail>().is_none());
    }

    #[test]
    fn store_accessors_check_types() {
        let mut store = ChainStore::default();
        store.insert("source", ChainValue::Block(BlockPos::new(1, 2, 3)));
        store.insert("power", ChainValue::Number(2.5));
        assert_eq!(store.block("source"), Some(BlockPos::new(1, 2, 3)));
        assert_eq!(store.position("source"), Some(DVec3::new(1.5, 2.5, 3.5)));
        assert_eq!(store.number("source"), None);
        assert_eq!(store.number("power"), Some(2.5));
        assert!(!store.flag("missing"));
    }
}
