//! Shared fixtures for this crate's unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use bendsim_collider::{Collider, Sphere};
use bendsim_common::{EntityId, EntityRef, Timestamp};
use bendsim_kernel::World;
use bendsim_temporal::TempBlockManager;
use glam::DVec3;

use crate::actor::{ActorState, ActorTable};
use crate::archetype::{
    Ability, AbilityDescriptor, Activation, ActivationMethod, Archetype, ArchetypeId, Element,
    UpdateResult,
};
use crate::collision::{Collision, CollisionTable, EntityResponse, EntityScan};
use crate::config::EngineConfig;
use crate::context::{AbilityContext, Env};
use crate::cooldown::Cooldowns;
use crate::error::{AbilityError, ActivationFailure, SchedulerFault};
use crate::policy::PolicySet;
use crate::registry::AbilityRegistry;
use crate::scheduler::{AbilityManager, InstanceId};

pub(crate) type Log = Rc<RefCell<Vec<String>>>;

/// What an archetype factory returns.
pub(crate) type Built = Result<Box<dyn Ability>, ActivationFailure>;

pub(crate) fn sphere(center: [f64; 3], radius: f64) -> Collider {
    Sphere::new(DVec3::from_array(center), radius)
        .unwrap()
        .into()
}

/// Run `f` with a context over a fresh reference world and empty session.
pub(crate) fn with_context<R>(f: impl FnOnce(&mut AbilityContext<'_>) -> R) -> R {
    let mut world = World::new();
    let mut overlay = TempBlockManager::new();
    let actors = ActorTable::new();
    let registry = AbilityRegistry::new();
    let config = EngineConfig::default();
    let mut cooldowns = Cooldowns::new();
    let mut removals = Default::default();
    let mut env = Env {
        world: &mut world,
        overlay: &mut overlay,
        actors: &actors,
        registry: &registry,
        config: &config,
        now: Timestamp::ZERO,
    };
    let mut ctx = AbilityContext::new(
        &mut env,
        &mut cooldowns,
        &mut removals,
        InstanceId(0),
        EntityId::new(),
        ArchetypeId(0),
    );
    f(&mut ctx)
}

/// Scriptable ability that writes every hook call to a shared log.
#[derive(Clone)]
pub(crate) struct Scripted {
    pub label: String,
    pub log: Log,
    pub updates: u32,
    lasting: Option<u32>,
    fail_at: Option<u32>,
    panic_at: Option<u32>,
    colliders: Vec<Collider>,
    policy: Option<PolicySet>,
    scan: Option<EntityScan>,
    consume: bool,
    remove_on_hit: bool,
    collide_flags: Option<(bool, bool)>,
    victim: Option<InstanceId>,
    destroy_victim: Option<InstanceId>,
    cooldown: bool,
}

impl Scripted {
    pub fn new(label: &str, log: Log) -> Self {
        Self {
            label: label.to_string(),
            log,
            updates: 0,
            lasting: None,
            fail_at: None,
            panic_at: None,
            colliders: Vec::new(),
            policy: None,
            scan: None,
            consume: false,
            remove_on_hit: false,
            collide_flags: None,
            victim: None,
            destroy_victim: None,
            cooldown: false,
        }
    }

    /// Asks to be removed after `n` updates.
    pub fn lasting(mut self, n: u32) -> Self {
        self.lasting = Some(n);
        self
    }

    pub fn failing_at(mut self, n: u32) -> Self {
        self.fail_at = Some(n);
        self
    }

    pub fn panicking_at(mut self, n: u32) -> Self {
        self.panic_at = Some(n);
        self
    }

    pub fn with_collider(mut self, collider: Collider) -> Self {
        self.colliders.push(collider);
        self
    }

    pub fn with_policy(mut self, policy: PolicySet) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn scanning(mut self, scan: EntityScan) -> Self {
        self.scan = Some(scan);
        self
    }

    pub fn consuming(mut self) -> Self {
        self.consume = true;
        self
    }

    pub fn removed_on_hit(mut self) -> Self {
        self.remove_on_hit = true;
        self
    }

    /// Overwrite `(remove_self, remove_other)` in every collision it sees.
    pub fn on_collide(mut self, remove_self: bool, remove_other: bool) -> Self {
        self.collide_flags = Some((remove_self, remove_other));
        self
    }

    /// Requests removal of `victim` on its first update.
    pub fn removing(mut self, victim: InstanceId) -> Self {
        self.victim = Some(victim);
        self
    }

    /// Requests removal of `victim` from its destroy hook.
    pub fn removing_on_destroy(mut self, victim: InstanceId) -> Self {
        self.destroy_victim = Some(victim);
        self
    }

    /// Starts the archetype cooldown when activated.
    pub fn with_cooldown(mut self) -> Self {
        self.cooldown = true;
        self
    }

    fn record(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }
}

impl Ability for Scripted {
    fn update(&mut self, ctx: &mut AbilityContext<'_>) -> Result<UpdateResult, AbilityError> {
        self.updates += 1;
        if self.panic_at == Some(self.updates) {
            panic!("{} blew up", self.label);
        }
        if self.fail_at == Some(self.updates) {
            return Err(AbilityError::Other(format!("{} failed", self.label)));
        }
        self.record(format!("update {}", self.label));
        if self.updates == 1 {
            if let Some(victim) = self.victim {
                ctx.request_removal(victim);
            }
        }
        match self.lasting {
            Some(n) if self.updates >= n => Ok(UpdateResult::Remove),
            _ => Ok(UpdateResult::Continue),
        }
    }

    fn destroy(&mut self, ctx: &mut AbilityContext<'_>) {
        self.record(format!("destroy {}", self.label));
        if let Some(victim) = self.destroy_victim {
            ctx.request_removal(victim);
        }
    }

    fn colliders(&self) -> Vec<Collider> {
        self.colliders.clone()
    }

    fn removal_policy(&self) -> Option<&PolicySet> {
        self.policy.as_ref()
    }

    fn on_collision(&mut self, _ctx: &mut AbilityContext<'_>, collision: &mut Collision) {
        self.record(format!("collide {}", self.label));
        if let Some((remove_self, remove_other)) = self.collide_flags {
            collision.remove_self = remove_self;
            collision.remove_other = remove_other;
        }
    }

    fn entity_scan(&self) -> Option<EntityScan> {
        self.scan
    }

    fn on_entity_hit(
        &mut self,
        _ctx: &mut AbilityContext<'_>,
        _entity: &EntityRef,
    ) -> EntityResponse {
        self.record(format!("hit {}", self.label));
        EntityResponse {
            consumed: self.consume,
            remove: self.remove_on_hit,
        }
    }
}

/// A whole session's worth of state, unbundled so tests can reach into
/// any part of it between ticks.
pub(crate) struct Rig {
    pub world: World,
    pub overlay: TempBlockManager,
    pub actors: ActorTable,
    pub registry: AbilityRegistry,
    pub config: EngineConfig,
    pub manager: AbilityManager,
    pub table: CollisionTable,
    pub now: Timestamp,
    pub log: Log,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            overlay: TempBlockManager::new(),
            actors: ActorTable::new(),
            registry: AbilityRegistry::new(),
            config: EngineConfig::default(),
            manager: AbilityManager::new(),
            table: CollisionTable::new(),
            now: Timestamp(1_000),
            log: Log::default(),
        }
    }

    /// An air bender standing on the ground at the origin.
    pub fn actor(&mut self) -> EntityId {
        let id = EntityId::new();
        self.actors
            .insert(ActorState::new(id, DVec3::new(0.0, 64.0, 0.0)).with_element(Element::Air));
        id
    }

    pub fn register(
        &mut self,
        descriptor: AbilityDescriptor,
        archetype: impl Archetype + 'static,
    ) -> ArchetypeId {
        self.registry.register(descriptor, archetype).unwrap()
    }

    /// Register a scripted archetype; `configure` shapes every new instance.
    pub fn register_scripted(
        &mut self,
        descriptor: AbilityDescriptor,
        configure: impl Fn(Scripted) -> Scripted + 'static,
    ) -> ArchetypeId {
        let label = descriptor.name.clone();
        let log = self.log.clone();
        self.register(
            descriptor,
            move |ctx: &mut AbilityContext<'_>, _: &Activation| -> Built {
                let scripted = configure(Scripted::new(&label, log.clone()));
                if scripted.cooldown {
                    ctx.add_cooldown();
                }
                Ok(Box::new(scripted))
            },
        )
    }

    pub fn scripted(
        &mut self,
        name: &str,
        configure: impl Fn(Scripted) -> Scripted + 'static,
    ) -> ArchetypeId {
        self.register_scripted(AbilityDescriptor::new(name, Element::Air), configure)
    }

    pub fn split(&mut self) -> (&mut AbilityManager, Env<'_>) {
        (
            &mut self.manager,
            Env {
                world: &mut self.world,
                overlay: &mut self.overlay,
                actors: &self.actors,
                registry: &self.registry,
                config: &self.config,
                now: self.now,
            },
        )
    }

    pub fn activate(
        &mut self,
        actor: EntityId,
        archetype: ArchetypeId,
    ) -> Result<InstanceId, ActivationFailure> {
        let (manager, mut env) = self.split();
        manager.activate(&mut env, actor, archetype, ActivationMethod::Punch)
    }

    pub fn destroy(&mut self, id: InstanceId) -> bool {
        let (manager, mut env) = self.split();
        manager.destroy(&mut env, id)
    }

    /// Update, entity scan, pairwise scan, then removals.
    pub fn tick(&mut self) -> Vec<SchedulerFault> {
        let table = std::mem::take(&mut self.table);
        let (manager, mut env) = self.split();
        let (_, faults) = manager.update_all(&mut env);
        manager.run_entity_scans(&mut env);
        manager.run_collisions(&mut env, &table);
        manager.apply_removals(&mut env);
        self.table = table;
        faults
    }

    pub fn advance(&mut self, ms: u64) {
        self.now = Timestamp(self.now.0 + ms);
    }

    pub fn entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}
