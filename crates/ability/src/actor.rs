use std::collections::{BTreeMap, BTreeSet};

use bendsim_common::EntityId;
use glam::DVec3;

use crate::archetype::{ArchetypeId, Element};
use crate::scheduler::InstanceId;

/// Hotbar size.
pub const SLOT_COUNT: usize = 9;

/// A temporary ability set that shadows an actor's bound slots while the
/// instance that pushed it is alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSlots {
    pub owner: InstanceId,
    pub archetype: ArchetypeId,
    abilities: Vec<ArchetypeId>,
}

impl MultiSlots {
    pub fn abilities(&self) -> &[ArchetypeId] {
        &self.abilities
    }

    pub fn contains(&self, archetype: ArchetypeId) -> bool {
        self.abilities.contains(&archetype)
    }
}

/// Slot bindings, plus at most one multi-ability set on top of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slots {
    bound: [Option<ArchetypeId>; SLOT_COUNT],
    multi: Option<MultiSlots>,
}

impl Slots {
    /// Bind `slot`. Refused while a multi-ability set is active or when the
    /// slot is out of range.
    pub fn bind(&mut self, slot: usize, archetype: Option<ArchetypeId>) -> bool {
        if self.multi.is_some() {
            return false;
        }
        match self.bound.get_mut(slot) {
            Some(entry) => {
                *entry = archetype;
                true
            }
            None => false,
        }
    }

    /// What `slot` currently holds. An active multi set hides the bindings.
    pub fn get(&self, slot: usize) -> Option<ArchetypeId> {
        match &self.multi {
            Some(multi) => multi.abilities.get(slot).copied(),
            None => self.bound.get(slot).copied().flatten(),
        }
    }

    /// The base binding of `slot`, ignoring any multi set.
    pub fn bound(&self, slot: usize) -> Option<ArchetypeId> {
        self.bound.get(slot).copied().flatten()
    }

    /// Swap in `abilities` for instance `owner`. Only one set may be
    /// active; extra abilities past the last slot are dropped.
    pub fn push_multi(
        &mut self,
        owner: InstanceId,
        archetype: ArchetypeId,
        mut abilities: Vec<ArchetypeId>,
    ) -> bool {
        if self.multi.is_some() {
            return false;
        }
        abilities.truncate(SLOT_COUNT);
        self.multi = Some(MultiSlots {
            owner,
            archetype,
            abilities,
        });
        true
    }

    /// Restore the bound slots if `owner` pushed the active set.
    pub fn pop_multi(&mut self, owner: InstanceId) -> bool {
        if self.multi.as_ref().is_some_and(|m| m.owner == owner) {
            self.multi = None;
            true
        } else {
            false
        }
    }

    pub fn multi(&self) -> Option<&MultiSlots> {
        self.multi.as_ref()
    }

    /// Keep `previous`'s multi set across a snapshot refresh.
    pub fn carry_multi(&mut self, previous: &Slots) {
        if self.multi.is_none() {
            self.multi = previous.multi.clone();
        }
    }
}

/// Host-supplied snapshot of one actor, refreshed before each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorState {
    pub id: EntityId,
    /// Feet position.
    pub position: DVec3,
    pub eye: DVec3,
    /// Unit look direction.
    pub direction: DVec3,
    pub sneaking: bool,
    pub in_liquid: bool,
    pub spectator: bool,
    pub elements: BTreeSet<Element>,
    pub slots: Slots,
    /// Index of the held slot.
    pub held: usize,
}

impl ActorState {
    /// Eye height of a standing player.
    pub const EYE_HEIGHT: f64 = 1.62;

    pub fn new(id: EntityId, position: DVec3) -> Self {
        Self {
            id,
            position,
            eye: position + DVec3::new(0.0, Self::EYE_HEIGHT, 0.0),
            direction: DVec3::Z,
            sneaking: false,
            in_liquid: false,
            spectator: false,
            elements: BTreeSet::new(),
            slots: Slots::default(),
            held: 0,
        }
    }

    pub fn with_element(mut self, element: Element) -> Self {
        self.elements.insert(element);
        self
    }

    /// Bind `archetype` to the held slot.
    pub fn selecting(mut self, archetype: ArchetypeId) -> Self {
        self.slots.bind(self.held, Some(archetype));
        self
    }

    /// Archetype in the held slot.
    pub fn selected(&self) -> Option<ArchetypeId> {
        self.slots.get(self.held)
    }

    pub fn has_element(&self, element: Element) -> bool {
        self.elements.contains(&element)
    }

    /// Move the feet and keep the eye on top of them.
    pub fn move_to(&mut self, position: DVec3) {
        self.position = position;
        self.eye = position + DVec3::new(0.0, Self::EYE_HEIGHT, 0.0);
    }

    /// Turn to look along `direction`. A zero vector is ignored.
    pub fn look(&mut self, direction: DVec3) {
        if let Some(d) = direction.try_normalize() {
            self.direction = d;
        }
    }
}

/// Every actor the session knows about.
#[derive(Debug, Default, Clone)]
pub struct ActorTable {
    actors: BTreeMap<EntityId, ActorState>,
}

impl ActorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, actor: ActorState) {
        self.actors.insert(actor.id, actor);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<ActorState> {
        self.actors.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&ActorState> {
        self.actors.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut ActorState> {
        self.actors.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActorState> {
        self.actors.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ActorState> {
        self.actors.values_mut()
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
