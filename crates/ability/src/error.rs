use std::time::Duration;

use crate::archetype::ArchetypeId;
use crate::scheduler::InstanceId;

/// Why an activation produced no instance.
///
/// Returned, never raised. A failed activation registers nothing and
/// starts no cooldown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationFailure {
    #[error("unknown archetype {0}")]
    UnknownArchetype(ArchetypeId),
    #[error("archetype {0} is disabled")]
    Disabled(String),
    #[error("actor is not tracked by this session")]
    UnknownActor,
    #[error("spectators cannot bend")]
    Spectator,
    #[error("actor lacks the {0} element")]
    MissingElement(crate::archetype::Element),
    #[error("on cooldown for another {}ms", remaining.as_millis())]
    OnCooldown { remaining: Duration },
    #[error("no valid target")]
    InvalidTarget,
    #[error("path is obstructed")]
    Obstructed,
    #[error("instance limit of {0} reached")]
    LimitReached(usize),
    #[error("declined: {0}")]
    Declined(&'static str),
}

/// An update step that could not continue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AbilityError {
    #[error("owning actor disappeared")]
    ActorGone,
    #[error("world rejected the change at {0}")]
    WorldRejected(bendsim_common::BlockPos),
    #[error(transparent)]
    Geometry(#[from] bendsim_collider::GeometryError),
    #[error("{0}")]
    Other(String),
}

/// One instance failed during its update and was force-removed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("instance {id} ({archetype}) faulted: {reason}")]
pub struct SchedulerFault {
    pub id: InstanceId,
    pub archetype: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("archetype name must not be empty")]
    EmptyName,
    #[error("archetype {0} is already registered")]
    Duplicate(String),
    #[error("no archetype named {0}")]
    Unknown(String),
    #[error("sequence for {0} has no steps")]
    EmptySequence(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("cannot add states to a chain that has started")]
    AlreadyStarted,
}

/// A session could not be assembled from its registry and config.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("collision rule: {0}")]
    Registry(#[from] RegistryError),
}
