//! One world's worth of ability state, driven one tick at a time.

use std::collections::BTreeMap;
use std::sync::mpsc;

use bendsim_common::{BlockPos, Clock, EntityId, GameWorld, Timestamp};
use bendsim_temporal::TempBlockManager;
use tracing::{debug, info_span};

use crate::actor::{ActorState, ActorTable};
use crate::archetype::{ActivationMethod, ArchetypeId};
use crate::collision::CollisionTable;
use crate::config::EngineConfig;
use crate::context::Env;
use crate::error::{ActivationFailure, SchedulerFault, SessionError};
use crate::registry::AbilityRegistry;
use crate::scheduler::{AbilityManager, InstanceId};
use crate::sequence::{Action, ActionHistory};

/// Work handed to the tick thread from elsewhere.
pub type Job = Box<dyn FnOnce(&mut WorldSession, &mut dyn GameWorld) + Send>;

/// Cloneable, `Send` handle for queueing [`Job`]s onto a session. Jobs run
/// at the start of the session's next tick, in submission order.
#[derive(Clone)]
pub struct Handoff {
    tx: mpsc::Sender<Job>,
}

impl Handoff {
    /// Returns false once the session has been dropped.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut WorldSession, &mut dyn GameWorld) + Send + 'static,
    {
        self.tx.send(Box::new(job)).is_ok()
    }
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handoff")
    }
}

/// What one call to [`WorldSession::run_tick`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub now: Timestamp,
    pub handoffs: usize,
    pub updated: usize,
    pub entity_hits: usize,
    pub collisions: usize,
    pub removed: usize,
    pub reverted: usize,
    pub cooldowns_purged: usize,
    /// Instances alive after the tick.
    pub active: usize,
    pub faults: Vec<SchedulerFault>,
}

/// Owns the registry, scheduler, overlay and actor snapshots of one world.
///
/// The world itself stays with the host and is lent to each call.
pub struct WorldSession {
    registry: AbilityRegistry,
    config: EngineConfig,
    collisions: CollisionTable,
    abilities: AbilityManager,
    overlay: TempBlockManager,
    actors: ActorTable,
    histories: BTreeMap<EntityId, ActionHistory>,
    clock: Box<dyn Clock>,
    tick: u64,
    jobs_tx: mpsc::Sender<Job>,
    jobs_rx: mpsc::Receiver<Job>,
}

impl std::fmt::Debug for WorldSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldSession")
            .field("tick", &self.tick)
            .field("registry", &self.registry)
            .field("abilities", &self.abilities)
            .field("overlay", &self.overlay.len())
            .field("actors", &self.actors.len())
            .finish()
    }
}

impl WorldSession {
    /// Validate `config`, resolve it into the registry and build the
    /// collision table from its rules.
    pub fn new(
        mut registry: AbilityRegistry,
        config: EngineConfig,
        clock: impl Clock + 'static,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        registry.apply_config(&config);
        let collisions = CollisionTable::from_config(&config.collisions, &registry)?;
        let (jobs_tx, jobs_rx) = mpsc::channel();
        debug!(
            archetypes = registry.len(),
            collision_rules = collisions.len(),
            "session created"
        );
        Ok(Self {
            registry,
            config,
            collisions,
            abilities: AbilityManager::new(),
            overlay: TempBlockManager::new(),
            actors: ActorTable::new(),
            histories: BTreeMap::new(),
            clock: Box::new(clock),
            tick: 0,
            jobs_tx,
            jobs_rx,
        })
    }

    fn split<'a>(
        &'a mut self,
        world: &'a mut dyn GameWorld,
    ) -> (&'a mut AbilityManager, &'a CollisionTable, Env<'a>) {
        let now = self.clock.now();
        let Self {
            registry,
            config,
            collisions,
            abilities,
            overlay,
            actors,
            ..
        } = self;
        (
            abilities,
            collisions,
            Env {
                world,
                overlay,
                actors,
                registry,
                config,
                now,
            },
        )
    }

    pub fn activate(
        &mut self,
        world: &mut dyn GameWorld,
        actor: EntityId,
        archetype: ArchetypeId,
        method: ActivationMethod,
    ) -> Result<InstanceId, ActivationFailure> {
        let (abilities, _, mut env) = self.split(world);
        abilities.activate(&mut env, actor, archetype, method)
    }

    /// Activate by name, as a command or key binding would.
    ///
    /// The input is recorded in the actor's action history whether or not
    /// the activation succeeds, and may complete a sequence.
    pub fn activate_named(
        &mut self,
        world: &mut dyn GameWorld,
        actor: EntityId,
        name: &str,
        method: ActivationMethod,
    ) -> Result<InstanceId, ActivationFailure> {
        let archetype = self
            .registry
            .id_of(name)
            .ok_or(ActivationFailure::Declined("no archetype with that name"))?;
        let result = self.activate(world, actor, archetype, method);
        self.record_action(world, actor, Action::new(archetype, method));
        result
    }

    /// Append `action` to the actor's history. When that completes a
    /// registered sequence the history is cleared and the combo archetype
    /// is activated; its id and outcome are returned.
    pub fn record_action(
        &mut self,
        world: &mut dyn GameWorld,
        actor: EntityId,
        action: Action,
    ) -> Option<(ArchetypeId, Result<InstanceId, ActivationFailure>)> {
        if self.actors.get(actor).is_none() {
            return None;
        }
        let now = self.clock.now();
        let history = self.histories.entry(actor).or_default();
        history.record(action, now, self.config.sequence_history, self.config.sequence_window());
        let combo = self.registry.completed_sequence(history)?.combo;
        history.clear();
        debug!(%actor, %combo, name = self.registry.name(combo), "sequence completed");
        let result = self.activate(world, actor, combo, ActivationMethod::Sequence);
        Some((combo, result))
    }

    pub fn history(&self, actor: EntityId) -> Option<&ActionHistory> {
        self.histories.get(&actor)
    }

    /// Start every passive the actor's elements grant and it is not
    /// already running. Returns the new instances.
    pub fn activate_passives(
        &mut self,
        world: &mut dyn GameWorld,
        actor: EntityId,
    ) -> Vec<InstanceId> {
        let Some(state) = self.actors.get(actor) else {
            return Vec::new();
        };
        let passives: Vec<ArchetypeId> = state
            .elements
            .iter()
            .flat_map(|e| self.registry.passives(*e))
            .filter(|id| !self.abilities.has_instance(actor, *id))
            .collect();
        passives
            .into_iter()
            .filter_map(|id| {
                self.activate(world, actor, id, ActivationMethod::Passive)
                    .ok()
            })
            .collect()
    }

    pub fn instances_of(&self, actor: EntityId, archetype: ArchetypeId) -> Vec<InstanceId> {
        self.abilities.instances_of(actor, archetype)
    }

    /// Destroy one instance right away. Idempotent.
    pub fn destroy(&mut self, world: &mut dyn GameWorld, id: InstanceId) -> bool {
        let (abilities, _, mut env) = self.split(world);
        let destroyed = abilities.destroy(&mut env, id);
        self.release_orphaned_slots();
        destroyed
    }

    pub fn destroy_actor(&mut self, world: &mut dyn GameWorld, actor: EntityId) -> usize {
        let (abilities, _, mut env) = self.split(world);
        let destroyed = abilities.destroy_actor(&mut env, actor);
        self.release_orphaned_slots();
        destroyed
    }

    /// Give the owner's actor a temporary set of abilities in place of its
    /// bound slots, for as long as instance `owner` lives. Refused when the
    /// instance is unknown or the actor already has a set.
    pub fn push_multi(&mut self, owner: InstanceId, abilities: Vec<ArchetypeId>) -> bool {
        let (Some(actor), Some(archetype)) =
            (self.abilities.owner(owner), self.abilities.archetype_of(owner))
        else {
            return false;
        };
        let pushed = self
            .actors
            .get_mut(actor)
            .is_some_and(|state| state.slots.push_multi(owner, archetype, abilities));
        if pushed {
            debug!(%owner, %actor, "multi-ability slots pushed");
        }
        pushed
    }

    /// Restore the bound slots that `owner` replaced.
    pub fn pop_multi(&mut self, owner: InstanceId) -> bool {
        self.actors.iter_mut().any(|state| state.slots.pop_multi(owner))
    }

    /// Multi sets outlive their owner only until the next removal pass.
    fn release_orphaned_slots(&mut self) {
        let Self {
            abilities,
            actors,
            ..
        } = self;
        for state in actors.iter_mut() {
            let Some(owner) = state.slots.multi().map(|m| m.owner) else {
                continue;
            };
            if abilities.lifecycle(owner).is_none() {
                state.slots.pop_multi(owner);
                debug!(%owner, actor = %state.id, "multi-ability slots released");
            }
        }
    }

    /// Deferred removal, applied at the end of the current or next tick.
    pub fn request_removal(&mut self, id: InstanceId) -> bool {
        self.abilities.request_removal(id)
    }

    /// Insert or replace an actor snapshot. Hosts call this whenever the
    /// player's position, look or input state changes. An active
    /// multi-ability set carries over to the new snapshot.
    pub fn upsert_actor(&mut self, mut actor: ActorState) {
        if let Some(previous) = self.actors.get(actor.id) {
            actor.slots.carry_multi(&previous.slots);
        }
        self.actors.insert(actor);
    }

    /// The actor left the world: end its instances and forget its cooldowns.
    pub fn remove_actor(
        &mut self,
        world: &mut dyn GameWorld,
        actor: EntityId,
    ) -> Option<ActorState> {
        self.destroy_actor(world, actor);
        self.abilities.cooldowns_mut().clear_actor(actor);
        self.histories.remove(&actor);
        self.actors.remove(actor)
    }

    /// Someone outside the engine edited `pos`. Unforced overlay records
    /// there are forgotten.
    pub fn notify_block_edit(&mut self, pos: BlockPos) -> bool {
        self.overlay.mark_for_removal(pos)
    }

    /// One simulation step.
    pub fn run_tick(&mut self, world: &mut dyn GameWorld) -> TickReport {
        self.tick += 1;
        let span = info_span!("tick", tick = self.tick);
        let _guard = span.enter();

        let jobs: Vec<Job> = self.jobs_rx.try_iter().collect();
        let handoffs = jobs.len();
        for job in jobs {
            job(self, &mut *world);
        }

        let tick = self.tick;
        let (abilities, collisions, mut env) = self.split(world);
        let now = env.now;
        let (updated, faults) = abilities.update_all(&mut env);
        let entity_hits = abilities.run_entity_scans(&mut env);
        let collided = abilities.run_collisions(&mut env, collisions);
        let removed = abilities.apply_removals(&mut env).len();
        let reverted = env.overlay.sweep(&mut *env.world, now).len();
        let cooldowns_purged = abilities.cooldowns_mut().purge_expired(now);
        let active = abilities.count();
        self.release_orphaned_slots();

        let report = TickReport {
            tick,
            now,
            handoffs,
            updated,
            entity_hits,
            collisions: collided,
            removed,
            reverted,
            cooldowns_purged,
            active,
            faults,
        };
        debug!(
            updated,
            collisions = collided,
            removed,
            reverted,
            active = report.active,
            faults = report.faults.len(),
            "tick done"
        );
        report
    }

    pub fn handoff(&self) -> Handoff {
        Handoff {
            tx: self.jobs_tx.clone(),
        }
    }

    /// Destroy every instance, then restore every overlay record. Returns
    /// `(instances destroyed, blocks reverted)`.
    pub fn teardown(&mut self, world: &mut dyn GameWorld) -> (usize, usize) {
        let (abilities, _, mut env) = self.split(world);
        let destroyed = abilities.clear(&mut env);
        let reverted = env.overlay.revert_all(&mut *env.world);
        self.release_orphaned_slots();
        self.histories.clear();
        debug!(destroyed, reverted, "session torn down");
        (destroyed, reverted)
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn registry(&self) -> &AbilityRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn collisions(&self) -> &CollisionTable {
        &self.collisions
    }

    pub fn abilities(&self) -> &AbilityManager {
        &self.abilities
    }

    pub fn abilities_mut(&mut self) -> &mut AbilityManager {
        &mut self.abilities
    }

    pub fn overlay(&self) -> &TempBlockManager {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut TempBlockManager {
        &mut self.overlay
    }

    pub fn actors(&self) -> &ActorTable {
        &self.actors
    }

    pub fn actors_mut(&mut self) -> &mut ActorTable {
        &mut self.actors
    }
}
