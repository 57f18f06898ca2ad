use std::collections::BTreeMap;
use std::time::Duration;

use bendsim_common::{EntityId, Timestamp};

use crate::archetype::ArchetypeId;

/// Per-(actor, archetype) cooldown deadlines. Outlives the instances that
/// started them.
#[derive(Debug, Default, Clone)]
pub struct Cooldowns {
    until: BTreeMap<(EntityId, ArchetypeId), Timestamp>,
}

impl Cooldowns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or extend) a cooldown. A zero duration is ignored and an
    /// existing later deadline is kept.
    pub fn add(
        &mut self,
        actor: EntityId,
        archetype: ArchetypeId,
        duration: Duration,
        now: Timestamp,
    ) {
        if duration.is_zero() {
            return;
        }
        let until = now.after(duration);
        let entry = self.until.entry((actor, archetype)).or_insert(until);
        *entry = (*entry).max(until);
        tracing::trace!(%actor, %archetype, until = until.as_millis(), "cooldown added");
    }

    pub fn is_on_cooldown(&self, actor: EntityId, archetype: ArchetypeId, now: Timestamp) -> bool {
        self.remaining(actor, archetype, now).is_some()
    }

    /// Time left, or `None` once the deadline has been reached.
    pub fn remaining(
        &self,
        actor: EntityId,
        archetype: ArchetypeId,
        now: Timestamp,
    ) -> Option<Duration> {
        let until = *self.until.get(&(actor, archetype))?;
        (until > now).then(|| until.saturating_since(now))
    }

    pub fn clear(&mut self, actor: EntityId, archetype: ArchetypeId) -> bool {
        self.until.remove(&(actor, archetype)).is_some()
    }

    /// Forget everything about one actor.
    pub fn clear_actor(&mut self, actor: EntityId) {
        self.until.retain(|(a, _), _| *a != actor);
    }

    /// Drop entries whose deadline has passed. Returns how many went.
    pub fn purge_expired(&mut self, now: Timestamp) -> usize {
        let before = self.until.len();
        self.until.retain(|_, until| *until > now);
        before - self.until.len()
    }

    pub fn len(&self) -> usize {
        self.until.len()
    }

    pub fn is_empty(&self) -> bool {
        self.until.is_empty()
    }
}
