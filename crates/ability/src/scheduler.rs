//! Per-tick scheduling of ability instances.
//!
//! Instances live in a `BTreeMap` keyed by [`InstanceId`], so every scan
//! (update, collision, removal) walks them in creation order. Removal is
//! always deferred: requests land in a set that is drained once the scan
//! that produced them has finished.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};

use bendsim_common::{EntityId, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::archetype::{Ability, Activation, ActivationMethod, ArchetypeId, UpdateResult};
use crate::context::{AbilityContext, Env};
use crate::cooldown::Cooldowns;
use crate::error::{ActivationFailure, SchedulerFault};
use crate::policy::{ActivationCondition, ConditionContext, PolicyContext};

/// Session-unique handle of one instance. Ordering is creation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct InstanceId(pub u64);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Where a registered instance is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    /// Flagged this tick; it will not be updated again and is destroyed
    /// with the next batch of removals.
    PendingRemoval,
}

pub(crate) struct Instance {
    pub(crate) id: InstanceId,
    pub(crate) actor: EntityId,
    pub(crate) archetype: ArchetypeId,
    pub(crate) ability: Box<dyn Ability>,
    pub(crate) created_at: Timestamp,
}

/// Owns every live instance of one session.
#[derive(Default)]
pub struct AbilityManager {
    pub(crate) instances: BTreeMap<InstanceId, Instance>,
    pub(crate) removals: BTreeSet<InstanceId>,
    pub(crate) cooldowns: Cooldowns,
    next_id: u64,
}

impl std::fmt::Debug for AbilityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilityManager")
            .field("instances", &self.instances.len())
            .field("pending_removal", &self.removals.len())
            .field("cooldowns", &self.cooldowns.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl AbilityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every precondition, then run the archetype's factory.
    ///
    /// Only a successful factory registers anything. A failure consumes no
    /// id, starts no cooldown and never reaches `update` or `destroy`.
    pub fn activate(
        &mut self,
        env: &mut Env<'_>,
        actor: EntityId,
        archetype: ArchetypeId,
        method: ActivationMethod,
    ) -> Result<InstanceId, ActivationFailure> {
        let result = self.try_activate(env, actor, archetype, method);
        match &result {
            Ok(id) => debug!(
                %id,
                %actor,
                archetype = env.registry.name(archetype),
                ?method,
                "activated"
            ),
            Err(reason) => debug!(%actor, %archetype, ?method, %reason, "activation rejected"),
        }
        result
    }

    fn try_activate(
        &mut self,
        env: &mut Env<'_>,
        actor: EntityId,
        archetype: ArchetypeId,
        method: ActivationMethod,
    ) -> Result<InstanceId, ActivationFailure> {
        let registry = env.registry;
        let actors = env.actors;
        let descriptor = registry
            .descriptor(archetype)
            .ok_or(ActivationFailure::UnknownArchetype(archetype))?;
        let state = actors.get(actor).ok_or(ActivationFailure::UnknownActor)?;
        if !descriptor.accepts(method) {
            return Err(ActivationFailure::Declined("activation method not accepted"));
        }
        ActivationCondition::check_all(&ConditionContext {
            actor: state,
            descriptor,
            enabled: registry.is_enabled(archetype),
            cooldown: self.cooldowns.remaining(actor, archetype, env.now),
        })?;

        let existing = self.instances_of(actor, archetype);
        if let Some(limit) = descriptor.max_instances {
            if existing.len() >= limit {
                return Err(ActivationFailure::LimitReached(limit));
            }
        }
        let factory = registry
            .archetype(archetype)
            .ok_or(ActivationFailure::UnknownArchetype(archetype))?;

        let id = InstanceId(self.next_id);
        let activation = Activation { method, existing };
        let built = {
            let mut ctx = AbilityContext::new(
                env,
                &mut self.cooldowns,
                &mut self.removals,
                id,
                actor,
                archetype,
            );
            factory.activate(&mut ctx, &activation)
        };
        let ability = match built {
            Ok(ability) => ability,
            Err(failure) => {
                // The id was never handed out, so nothing may stay queued under it.
                self.removals.remove(&id);
                return Err(failure);
            }
        };

        self.next_id += 1;
        self.instances.insert(
            id,
            Instance {
                id,
                actor,
                archetype,
                ability,
                created_at: env.now,
            },
        );
        Ok(id)
    }

    /// Advance every active instance once, in creation order.
    ///
    /// Returns how many instances ran `update`, and the faults of those
    /// that failed. A faulted instance is flagged for removal; the others
    /// carry on.
    pub fn update_all(&mut self, env: &mut Env<'_>) -> (usize, Vec<SchedulerFault>) {
        let ids: Vec<InstanceId> = self.instances.keys().copied().collect();
        let mut updated = 0;
        let mut faults = Vec::new();

        for id in ids {
            let Self {
                instances,
                removals,
                cooldowns,
                ..
            } = self;
            if removals.contains(&id) {
                continue;
            }
            let Some(instance) = instances.get_mut(&id) else {
                continue;
            };
            let Some(actor) = env.actors.get(instance.actor) else {
                debug!(%id, actor = %instance.actor, "owner is gone");
                removals.insert(id);
                continue;
            };
            if let Some(policies) = instance.ability.removal_policy() {
                let pctx = PolicyContext {
                    actor,
                    instance: id,
                    archetype: instance.archetype,
                    now: env.now,
                };
                if let Some(fired) = policies.check(&pctx) {
                    trace!(%id, policy = fired.name(), "removal policy fired");
                    removals.insert(id);
                    continue;
                }
            }

            let mut ctx = AbilityContext::new(
                env,
                cooldowns,
                removals,
                id,
                instance.actor,
                instance.archetype,
            );
            let ability = &mut instance.ability;
            let outcome = catch_unwind(AssertUnwindSafe(|| ability.update(&mut ctx)));
            updated += 1;

            let reason = match outcome {
                Ok(Ok(UpdateResult::Continue)) => continue,
                Ok(Ok(UpdateResult::Remove)) => {
                    removals.insert(id);
                    continue;
                }
                Ok(Err(err)) => err.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            let fault = SchedulerFault {
                id,
                archetype: env.registry.name(instance.archetype).to_string(),
                reason,
            };
            error!(%fault, "instance faulted; force-removing");
            removals.insert(id);
            faults.push(fault);
        }

        (updated, faults)
    }

    /// Destroy everything flagged for removal. Destroy hooks that flag
    /// further instances are honoured in the same call.
    pub fn apply_removals(&mut self, env: &mut Env<'_>) -> Vec<InstanceId> {
        let mut removed = Vec::new();
        while let Some(id) = self.removals.pop_first() {
            if let Some(instance) = self.instances.remove(&id) {
                self.finish(env, instance);
                removed.push(id);
            }
        }
        removed
    }

    /// Destroy one instance now. Returns false if it was already gone.
    pub fn destroy(&mut self, env: &mut Env<'_>, id: InstanceId) -> bool {
        let Some(instance) = self.instances.remove(&id) else {
            return false;
        };
        self.removals.remove(&id);
        self.finish(env, instance);
        true
    }

    /// Destroy every instance one actor owns, e.g. when it leaves the world.
    pub fn destroy_actor(&mut self, env: &mut Env<'_>, actor: EntityId) -> usize {
        let owned: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| i.actor == actor)
            .map(|i| i.id)
            .collect();
        owned.into_iter().filter(|id| self.destroy(env, *id)).count()
    }

    /// Teardown: destroy every instance and drop pending requests.
    pub fn clear(&mut self, env: &mut Env<'_>) -> usize {
        let mut destroyed = 0;
        while let Some((_, instance)) = self.instances.pop_first() {
            self.finish(env, instance);
            destroyed += 1;
        }
        self.removals.clear();
        destroyed
    }

    fn finish(&mut self, env: &mut Env<'_>, mut instance: Instance) {
        let Self {
            removals,
            cooldowns,
            ..
        } = self;
        let mut ctx = AbilityContext::new(
            env,
            cooldowns,
            removals,
            instance.id,
            instance.actor,
            instance.archetype,
        );
        instance.ability.destroy(&mut ctx);
        debug!(
            id = %instance.id,
            archetype = env.registry.name(instance.archetype),
            lived_ms = u64::try_from(env.now.saturating_since(instance.created_at).as_millis())
                .unwrap_or(u64::MAX),
            "destroyed"
        );
    }

    /// Flag `id` for removal after the current scan.
    pub fn request_removal(&mut self, id: InstanceId) -> bool {
        self.instances.contains_key(&id) && self.removals.insert(id)
    }

    /// One actor's instances of one archetype that are not on their way
    /// out, oldest first.
    pub fn instances_of(&self, actor: EntityId, archetype: ArchetypeId) -> Vec<InstanceId> {
        self.active()
            .filter(|i| i.actor == actor && i.archetype == archetype)
            .map(|i| i.id)
            .collect()
    }

    /// Every active instance of one archetype, oldest first.
    pub fn instances(&self, archetype: ArchetypeId) -> Vec<InstanceId> {
        self.active()
            .filter(|i| i.archetype == archetype)
            .map(|i| i.id)
            .collect()
    }

    pub fn get(&self, id: InstanceId) -> Option<&dyn Ability> {
        self.instances.get(&id).map(|i| &*i.ability)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut dyn Ability> {
        match self.instances.get_mut(&id) {
            Some(i) => Some(&mut *i.ability),
            None => None,
        }
    }

    pub fn downcast_ref<T: Ability>(&self, id: InstanceId) -> Option<&T> {
        let instance = self.instances.get(&id)?;
        (*instance.ability).as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Ability>(&mut self, id: InstanceId) -> Option<&mut T> {
        let instance = self.instances.get_mut(&id)?;
        (*instance.ability).as_any_mut().downcast_mut::<T>()
    }

    pub fn owner(&self, id: InstanceId) -> Option<EntityId> {
        self.instances.get(&id).map(|i| i.actor)
    }

    pub fn archetype_of(&self, id: InstanceId) -> Option<ArchetypeId> {
        self.instances.get(&id).map(|i| i.archetype)
    }

    /// `None` once the instance has been destroyed (or never existed).
    pub fn lifecycle(&self, id: InstanceId) -> Option<Lifecycle> {
        if !self.instances.contains_key(&id) {
            return None;
        }
        Some(if self.removals.contains(&id) {
            Lifecycle::PendingRemoval
        } else {
            Lifecycle::Active
        })
    }

    pub fn has_instance(&self, actor: EntityId, archetype: ArchetypeId) -> bool {
        self.active()
            .any(|i| i.actor == actor && i.archetype == archetype)
    }

    /// Registered instances, including ones pending removal.
    pub fn count(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.keys().copied()
    }

    pub fn cooldowns(&self) -> &Cooldowns {
        &self.cooldowns
    }

    pub fn cooldowns_mut(&mut self) -> &mut Cooldowns {
        &mut self.cooldowns
    }

    fn active(&self) -> impl Iterator<Item = &Instance> {
        self.instances
            .values()
            .filter(|i| !self.removals.contains(&i.id))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
