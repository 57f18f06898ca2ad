use std::any::Any;
use std::collections::BTreeSet;

use bendsim_collider::Collider;
use bendsim_common::EntityRef;
use serde::{Deserialize, Serialize};

use crate::collision::{Collision, EntityResponse, EntityScan};
use crate::config::{Attribute, AttributeSet};
use crate::context::AbilityContext;
use crate::error::{AbilityError, ActivationFailure};
use crate::policy::PolicySet;
use crate::scheduler::InstanceId;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Air,
    Water,
    Earth,
    Fire,
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Air => "air",
            Self::Water => "water",
            Self::Earth => "earth",
            Self::Fire => "fire",
        };
        f.write_str(name)
    }
}

/// Registry-assigned handle for one kind of ability.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ArchetypeId(pub u32);

impl std::fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The input that asked for an activation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMethod {
    Punch,
    Sneak,
    SneakRelease,
    Interact,
    Fall,
    Passive,
    /// Started by a completed ability sequence.
    Sequence,
}

/// Immutable identity and base parameters of an archetype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityDescriptor {
    pub name: String,
    pub element: Element,
    pub activations: BTreeSet<ActivationMethod>,
    /// Activates even while the actor's cooldown for it runs.
    pub cooldown_exempt: bool,
    /// Not listed to players; still activatable.
    pub hidden: bool,
    /// Live instances allowed per actor.
    pub max_instances: Option<usize>,
    pub attributes: AttributeSet,
}

impl AbilityDescriptor {
    pub fn new(name: impl Into<String>, element: Element) -> Self {
        Self {
            name: name.into(),
            element,
            activations: BTreeSet::new(),
            cooldown_exempt: false,
            hidden: false,
            max_instances: None,
            attributes: AttributeSet::default(),
        }
    }

    pub fn activated_by(mut self, method: ActivationMethod) -> Self {
        self.activations.insert(method);
        self
    }

    pub fn cooldown_exempt(mut self) -> Self {
        self.cooldown_exempt = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn max_instances(mut self, limit: usize) -> Self {
        self.max_instances = Some(limit);
        self
    }

    pub fn with(mut self, attribute: Attribute, value: f64) -> Self {
        self.attributes.set(attribute, value);
        self
    }

    pub fn is_passive(&self) -> bool {
        self.activations.contains(&ActivationMethod::Passive)
    }

    /// An empty activation set accepts any method.
    pub fn accepts(&self, method: ActivationMethod) -> bool {
        self.activations.is_empty() || self.activations.contains(&method)
    }
}

/// What the factory gets to decide with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub method: ActivationMethod,
    /// The actor's live instances of the same archetype, oldest first.
    pub existing: Vec<InstanceId>,
}

/// Factory for one kind of ability.
///
/// Must perform every failure check before touching the world: a returned
/// failure is treated as if nothing happened.
pub trait Archetype {
    fn activate(
        &self,
        ctx: &mut AbilityContext<'_>,
        activation: &Activation,
    ) -> Result<Box<dyn Ability>, ActivationFailure>;
}

impl<F> Archetype for F
where
    F: Fn(&mut AbilityContext<'_>, &Activation) -> Result<Box<dyn Ability>, ActivationFailure>,
{
    fn activate(
        &self,
        ctx: &mut AbilityContext<'_>,
        activation: &Activation,
    ) -> Result<Box<dyn Ability>, ActivationFailure> {
        self(ctx, activation)
    }
}

/// Returned by [`Ability::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    Continue,
    Remove,
}

/// Lets the scheduler hand back concrete ability types.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One running cast.
///
/// Only `update` is required. Everything else defaults to "no colliders,
/// no policy, ignore collisions".
pub trait Ability: AsAny {
    /// Advance one tick.
    fn update(&mut self, ctx: &mut AbilityContext<'_>) -> Result<UpdateResult, AbilityError>;

    /// Called exactly once, after the instance has left the scheduler.
    fn destroy(&mut self, _ctx: &mut AbilityContext<'_>) {}

    /// Volumes tested against other instances and entities this tick.
    fn colliders(&self) -> Vec<Collider> {
        Vec::new()
    }

    /// Evaluated by the scheduler before every update.
    fn removal_policy(&self) -> Option<&PolicySet> {
        None
    }

    /// Another instance's collider hit one of ours. Flip the flags on
    /// `collision` to change who gets removed.
    fn on_collision(&mut self, _ctx: &mut AbilityContext<'_>, _collision: &mut Collision) {}

    /// Opt in to the per-tick entity scan.
    fn entity_scan(&self) -> Option<EntityScan> {
        None
    }

    fn on_entity_hit(
        &mut self,
        _ctx: &mut AbilityContext<'_>,
        _entity: &EntityRef,
    ) -> EntityResponse {
        EntityResponse::IGNORED
    }
}
