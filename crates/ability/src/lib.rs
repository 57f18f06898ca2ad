//! Ability instances and the machinery that runs them.
//!
//! A [`WorldSession`] owns everything for one world: the archetype
//! registry, the [`AbilityManager`] scheduling live instances, the
//! temporal block overlay, per-actor cooldowns and the collision table.
//! The host lends it the world once per tick through [`WorldSession::run_tick`].
//!
//! # Invariants
//! - An instance exists only after its archetype's factory returned `Ok`.
//! - Every instance is destroyed exactly once.
//! - Removal is deferred: nothing leaves the scheduler mid-scan, and an
//!   instance flagged for removal is never updated or collided again.
//! - Scans run in creation order, so a tick is deterministic given the
//!   same inputs.

pub mod actor;
pub mod archetype;
pub mod chain;
pub mod collision;
pub mod config;
pub mod context;
pub mod cooldown;
pub mod error;
pub mod policy;
pub mod registry;
pub mod scheduler;
pub mod sequence;
pub mod session;

#[cfg(test)]
mod testing;

pub use actor::{ActorState, ActorTable, MultiSlots, SLOT_COUNT, Slots};
pub use archetype::{
    Ability, AbilityDescriptor, Activation, ActivationMethod, Archetype, ArchetypeId, AsAny,
    Element, UpdateResult,
};
pub use chain::{ChainStatus, ChainStore, ChainValue, State, StateChain, StateStatus};
pub use collision::{
    Collision, CollisionRule, CollisionTable, EntityResponse, EntityScan, ScanOutcome,
    scan_entities,
};
pub use config::{
    Attribute, AttributeModifier, AttributeSet, CollisionRuleConfig, ConfigError, EngineConfig,
    ModifierKind,
};
pub use context::{AbilityContext, Env};
pub use cooldown::Cooldowns;
pub use error::{
    AbilityError, ActivationFailure, ChainError, RegistryError, SchedulerFault, SessionError,
};
pub use policy::{
    ActivationCondition, ConditionContext, PolicyContext, PolicySet, RemovalPolicy,
};
pub use registry::AbilityRegistry;
pub use scheduler::{AbilityManager, InstanceId, Lifecycle};
pub use sequence::{Action, ActionHistory, Sequence};
pub use session::{Handoff, Job, TickReport, WorldSession};
