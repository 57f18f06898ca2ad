//! Removal policies and activation conditions.
//!
//! Both are plain tagged values interpreted here, so an instance's policy
//! set can be inspected and tested without running any ability code.

use std::time::Duration;

use bendsim_common::Timestamp;
use glam::DVec3;

use crate::actor::ActorState;
use crate::archetype::{AbilityDescriptor, ArchetypeId};
use crate::error::ActivationFailure;
use crate::scheduler::InstanceId;

/// What a removal policy gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub actor: &'a ActorState,
    pub instance: InstanceId,
    pub archetype: ArchetypeId,
    pub now: Timestamp,
}

/// One reason an instance should end.
#[derive(Debug, Clone)]
pub enum RemovalPolicy {
    /// Fires once `now` passes the deadline.
    Expire(Timestamp),
    /// Fires when the actor strays more than `range` from `origin`.
    OutOfRange { origin: DVec3, range: f64 },
    NotSneaking,
    InLiquid,
    /// Fires when the held slot no longer shows this archetype. While the
    /// instance owns the actor's multi-ability set, any slot of that set
    /// keeps it alive.
    SwappedSlots,
    Custom {
        name: &'static str,
        fires: fn(&PolicyContext<'_>) -> bool,
    },
}

impl RemovalPolicy {
    /// Expire `duration` after `now`. A zero duration never expires.
    pub fn expire_after(now: Timestamp, duration: Duration) -> Self {
        if duration.is_zero() {
            Self::Expire(Timestamp(u64::MAX))
        } else {
            Self::Expire(now.after(duration))
        }
    }

    pub fn out_of_range(origin: DVec3, range: f64) -> Self {
        Self::OutOfRange { origin, range }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Expire(_) => "expire",
            Self::OutOfRange { .. } => "out_of_range",
            Self::NotSneaking => "not_sneaking",
            Self::InLiquid => "in_liquid",
            Self::SwappedSlots => "swapped_slots",
            Self::Custom { name, .. } => *name,
        }
    }

    pub fn fires(&self, ctx: &PolicyContext<'_>) -> bool {
        match self {
            Self::Expire(deadline) => ctx.now > *deadline,
            Self::OutOfRange { origin, range } => {
                ctx.actor.position.distance_squared(*origin) > range * range
            }
            Self::NotSneaking => !ctx.actor.sneaking,
            Self::InLiquid => ctx.actor.in_liquid,
            Self::SwappedSlots => match ctx.actor.slots.multi() {
                Some(multi) if multi.owner == ctx.instance => ctx.actor.selected().is_none(),
                _ => ctx.actor.selected() != Some(ctx.archetype),
            },
            Self::Custom { fires, .. } => fires(ctx),
        }
    }
}

/// An instance lives while none of its policies fire.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<RemovalPolicy>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, policy: RemovalPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn push(&mut self, policy: RemovalPolicy) {
        self.policies.push(policy);
    }

    /// Drop every policy called `name`, e.g. lifting `not_sneaking` once a
    /// charge has been released.
    pub fn remove(&mut self, name: &str) {
        self.policies.retain(|p| p.name() != name);
    }

    /// The first policy that fires, if any.
    pub fn check(&self, ctx: &PolicyContext<'_>) -> Option<&RemovalPolicy> {
        self.policies.iter().find(|p| p.fires(ctx))
    }

    pub fn should_remove(&self, ctx: &PolicyContext<'_>) -> bool {
        self.check(ctx).is_some()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// What an activation condition gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    pub actor: &'a ActorState,
    pub descriptor: &'a AbilityDescriptor,
    pub enabled: bool,
    /// Time left on the actor's cooldown for this archetype.
    pub cooldown: Option<Duration>,
}

/// Checked before an archetype's factory runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCondition {
    Enabled,
    NotSpectator,
    Element,
    /// Skipped for cooldown-exempt archetypes.
    Cooldown,
}

impl ActivationCondition {
    /// Every condition, in the order they are checked.
    pub const ALL: [ActivationCondition; 4] = [
        Self::Enabled,
        Self::NotSpectator,
        Self::Element,
        Self::Cooldown,
    ];

    pub fn check(self, ctx: &ConditionContext<'_>) -> Result<(), ActivationFailure> {
        match self {
            Self::Enabled if !ctx.enabled => {
                Err(ActivationFailure::Disabled(ctx.descriptor.name.clone()))
            }
            Self::NotSpectator if ctx.actor.spectator => Err(ActivationFailure::Spectator),
            Self::Element if !ctx.actor.has_element(ctx.descriptor.element) => {
                Err(ActivationFailure::MissingElement(ctx.descriptor.element))
            }
            Self::Cooldown if !ctx.descriptor.cooldown_exempt => match ctx.cooldown {
                Some(remaining) => Err(ActivationFailure::OnCooldown { remaining }),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    pub fn check_all(ctx: &ConditionContext<'_>) -> Result<(), ActivationFailure> {
        Self::ALL.iter().try_for_each(|c| c.check(ctx))
    }
}
