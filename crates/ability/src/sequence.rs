//! Ability sequences.
//!
//! Every named activation an actor performs is recorded as an [`Action`].
//! A sequence's combo archetype fires once the actor's recent actions end
//! with the sequence's steps.

use std::collections::VecDeque;
use std::time::Duration;

use bendsim_common::Timestamp;
use serde::{Deserialize, Serialize};

use crate::archetype::{ActivationMethod, ArchetypeId};

/// One input: which archetype, triggered how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub archetype: ArchetypeId,
    pub method: ActivationMethod,
}

impl Action {
    pub fn new(archetype: ArchetypeId, method: ActivationMethod) -> Self {
        Self { archetype, method }
    }
}

/// Steps that, performed in order, activate `combo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub combo: ArchetypeId,
    pub steps: Vec<Action>,
}

impl Sequence {
    pub fn matches(&self, history: &ActionHistory) -> bool {
        history.ends_with(&self.steps)
    }
}

/// Recent actions of one actor, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ActionHistory {
    entries: VecDeque<(Action, Timestamp)>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `action`. Entries older than `window` are forgotten, and the
    /// oldest go first once more than `capacity` are held.
    pub fn record(&mut self, action: Action, now: Timestamp, capacity: usize, window: Duration) {
        self.expire(now, window);
        self.entries.push_back((action, now));
        while self.entries.len() > capacity {
            self.entries.pop_front();
        }
    }

    pub fn expire(&mut self, now: Timestamp, window: Duration) {
        while let Some((_, at)) = self.entries.front() {
            if now.saturating_since(*at) <= window {
                break;
            }
            self.entries.pop_front();
        }
    }

    /// True when the latest actions are exactly `steps`. Empty `steps`
    /// never match.
    pub fn ends_with(&self, steps: &[Action]) -> bool {
        if steps.is_empty() || steps.len() > self.entries.len() {
            return false;
        }
        let skip = self.entries.len() - steps.len();
        self.entries
            .iter()
            .skip(skip)
            .map(|(action, _)| action)
            .eq(steps.iter())
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.entries.iter().map(|(action, _)| action)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
