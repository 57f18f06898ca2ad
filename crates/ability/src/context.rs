use std::collections::BTreeSet;
use std::time::Duration;

use bendsim_common::{BlockPos, BlockState, EntityId, GameWorld, Timestamp};
use bendsim_temporal::{TempBlock, TempBlockManager, TempBlockOptions};

use crate::actor::{ActorState, ActorTable};
use crate::archetype::{AbilityDescriptor, ArchetypeId};
use crate::config::{Attribute, AttributeSet, EngineConfig};
use crate::cooldown::Cooldowns;
use crate::policy::PolicyContext;
use crate::registry::AbilityRegistry;
use crate::scheduler::InstanceId;

static NO_ATTRIBUTES: AttributeSet = AttributeSet::EMPTY;

/// Session state the scheduler needs for one tick.
pub struct Env<'a> {
    pub world: &'a mut dyn GameWorld,
    pub overlay: &'a mut TempBlockManager,
    pub actors: &'a ActorTable,
    pub registry: &'a AbilityRegistry,
    pub config: &'a EngineConfig,
    pub now: Timestamp,
}

/// Everything one instance may touch while it runs.
///
/// Handed to activation, update, collision and destroy hooks. Removal of
/// any instance (including this one) can only be requested, never done
/// directly; the scheduler applies requests after the current scan.
pub struct AbilityContext<'a> {
    pub world: &'a mut dyn GameWorld,
    pub overlay: &'a mut TempBlockManager,
    pub cooldowns: &'a mut Cooldowns,
    pub now: Timestamp,
    pub instance: InstanceId,
    pub actor: EntityId,
    pub archetype: ArchetypeId,
    actors: &'a ActorTable,
    registry: &'a AbilityRegistry,
    config: &'a EngineConfig,
    removals: &'a mut BTreeSet<InstanceId>,
}

impl<'a> AbilityContext<'a> {
    pub(crate) fn new(
        env: &'a mut Env<'_>,
        cooldowns: &'a mut Cooldowns,
        removals: &'a mut BTreeSet<InstanceId>,
        instance: InstanceId,
        actor: EntityId,
        archetype: ArchetypeId,
    ) -> Self {
        Self {
            world: &mut *env.world,
            overlay: &mut *env.overlay,
            cooldowns,
            now: env.now,
            instance,
            actor,
            archetype,
            actors: env.actors,
            registry: env.registry,
            config: env.config,
            removals,
        }
    }

    /// The owning actor's current snapshot.
    pub fn actor_state(&self) -> Option<&'a ActorState> {
        self.actors.get(self.actor)
    }

    pub fn actor_of(&self, id: EntityId) -> Option<&'a ActorState> {
        self.actors.get(id)
    }

    pub fn descriptor(&self) -> Option<&'a AbilityDescriptor> {
        self.registry.descriptor(self.archetype)
    }

    pub fn attributes(&self) -> &'a AttributeSet {
        self.registry
            .attributes(self.archetype)
            .unwrap_or(&NO_ATTRIBUTES)
    }

    /// A resolved attribute, zero when the archetype does not define it.
    pub fn attribute(&self, attribute: Attribute) -> f64 {
        self.attributes().get_or(attribute, 0.0)
    }

    pub fn registry(&self) -> &'a AbilityRegistry {
        self.registry
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    pub fn policy_context(&self) -> Option<PolicyContext<'a>> {
        Some(PolicyContext {
            actor: self.actor_state()?,
            instance: self.instance,
            archetype: self.archetype,
            now: self.now,
        })
    }

    /// Ask for `id` to be removed after the current scan. It will not be
    /// updated again.
    pub fn request_removal(&mut self, id: InstanceId) {
        self.removals.insert(id);
    }

    pub fn remove_self(&mut self) {
        self.removals.insert(self.instance);
    }

    pub fn is_removal_requested(&self, id: InstanceId) -> bool {
        self.removals.contains(&id)
    }

    /// Start this archetype's configured cooldown for the owning actor.
    pub fn add_cooldown(&mut self) {
        let duration = self.attributes().millis(Attribute::Cooldown);
        self.cooldowns
            .add(self.actor, self.archetype, duration, self.now);
    }

    /// Override a block through the overlay. `None` keeps it until reverted.
    pub fn temp_block(
        &mut self,
        pos: BlockPos,
        state: BlockState,
        ttl: Option<Duration>,
    ) -> &TempBlock {
        self.overlay
            .create(&mut *self.world, pos, state, ttl, false, self.now)
    }

    pub fn temp_block_with(
        &mut self,
        pos: BlockPos,
        state: BlockState,
        opts: TempBlockOptions,
    ) -> &TempBlock {
        self.overlay
            .create_with(&mut *self.world, pos, state, opts, self.now)
    }

    pub fn revert_block(&mut self, pos: BlockPos) -> bool {
        self.overlay.revert(&mut *self.world, pos)
    }
}
