//! Instance/instance and instance/entity collisions.
//!
//! Only archetype pairs listed in the [`CollisionTable`] are ever tested.
//! Hits do not remove anything directly: they feed the same deferred
//! removal set the scheduler drains after the tick's scans.

use std::collections::{BTreeMap, BTreeSet};

use bendsim_collider::{Aabb, Collider};
use bendsim_common::{EntityId, EntityRef};
use tracing::trace;

use crate::archetype::ArchetypeId;
use crate::config::CollisionRuleConfig;
use crate::context::{AbilityContext, Env};
use crate::error::RegistryError;
use crate::registry::AbilityRegistry;
use crate::scheduler::{AbilityManager, InstanceId};

/// What happens when instances of two archetypes touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionRule {
    pub first: ArchetypeId,
    pub second: ArchetypeId,
    pub remove_first: bool,
    pub remove_second: bool,
}

impl CollisionRule {
    pub fn new(
        first: ArchetypeId,
        second: ArchetypeId,
        remove_first: bool,
        remove_second: bool,
    ) -> Self {
        Self {
            first,
            second,
            remove_first,
            remove_second,
        }
    }
}

/// Rules keyed by unordered archetype pair. The last rule added for a pair
/// wins.
#[derive(Debug, Clone, Default)]
pub struct CollisionTable {
    rules: BTreeMap<(ArchetypeId, ArchetypeId), CollisionRule>,
}

impl CollisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rule: CollisionRule) {
        self.rules.insert(key(rule.first, rule.second), rule);
    }

    pub fn with(mut self, rule: CollisionRule) -> Self {
        self.add(rule);
        self
    }

    /// Resolve rules written by archetype name.
    pub fn from_config(
        rules: &[CollisionRuleConfig],
        registry: &AbilityRegistry,
    ) -> Result<Self, RegistryError> {
        let lookup = |name: &str| {
            registry
                .id_of(name)
                .ok_or_else(|| RegistryError::Unknown(name.to_string()))
        };
        let mut table = Self::new();
        for rule in rules {
            table.add(CollisionRule::new(
                lookup(&rule.first)?,
                lookup(&rule.second)?,
                rule.remove_first,
                rule.remove_second,
            ));
        }
        Ok(table)
    }

    /// Removal flags oriented as `(remove a, remove b)`, or `None` when the
    /// pair never collides.
    pub fn flags(&self, a: ArchetypeId, b: ArchetypeId) -> Option<(bool, bool)> {
        let rule = self.rules.get(&key(a, b))?;
        if rule.first == a {
            Some((rule.remove_first, rule.remove_second))
        } else {
            Some((rule.remove_second, rule.remove_first))
        }
    }

    pub fn contains(&self, a: ArchetypeId, b: ArchetypeId) -> bool {
        self.rules.contains_key(&key(a, b))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn key(a: ArchetypeId, b: ArchetypeId) -> (ArchetypeId, ArchetypeId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// One hit as seen from the receiving instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub own: InstanceId,
    pub other: InstanceId,
    pub own_archetype: ArchetypeId,
    pub other_archetype: ArchetypeId,
    pub own_collider: Collider,
    pub other_collider: Collider,
    pub remove_self: bool,
    pub remove_other: bool,
}

impl Collision {
    /// The same hit from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            own: self.other,
            other: self.own,
            own_archetype: self.other_archetype,
            other_archetype: self.own_archetype,
            own_collider: self.other_collider,
            other_collider: self.own_collider,
            remove_self: self.remove_other,
            remove_other: self.remove_self,
        }
    }
}

/// How an instance wants to be scanned against world entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityScan {
    /// Also report the owning actor.
    pub include_actor: bool,
    pub living_only: bool,
    /// Keep scanning after a consumed hit.
    pub piercing: bool,
}

impl EntityScan {
    pub fn living() -> Self {
        Self {
            living_only: true,
            ..Self::default()
        }
    }

    pub fn piercing(mut self) -> Self {
        self.piercing = true;
        self
    }

    pub fn including_actor(mut self) -> Self {
        self.include_actor = true;
        self
    }
}

/// Returned by an entity hit handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntityResponse {
    /// The hit "used up" the instance for this tick.
    pub consumed: bool,
    pub remove: bool,
}

impl EntityResponse {
    pub const IGNORED: Self = Self {
        consumed: false,
        remove: false,
    };
    pub const CONSUMED: Self = Self {
        consumed: true,
        remove: false,
    };

    pub fn and_remove(mut self) -> Self {
        self.remove = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanOutcome {
    pub hits: usize,
    pub consumed: bool,
    pub remove: bool,
}

/// Report every entity touched by `colliders`, each at most once.
///
/// Collider bounding boxes go to the world's spatial query; each candidate
/// is then confirmed against its exact box. Stops at the first consumed
/// hit unless the scan is piercing.
pub fn scan_entities<F>(
    ctx: &mut AbilityContext<'_>,
    colliders: &[Collider],
    scan: EntityScan,
    mut on_hit: F,
) -> ScanOutcome
where
    F: FnMut(&mut AbilityContext<'_>, &EntityRef) -> EntityResponse,
{
    let mut outcome = ScanOutcome::default();
    let mut seen: BTreeSet<EntityId> = BTreeSet::new();
    for collider in colliders {
        let Some(bounds) = collider.bounding_box() else {
            continue;
        };
        for entity in ctx.world.entities_in_box(bounds.min(), bounds.max()) {
            if entity.id == ctx.actor && !scan.include_actor {
                continue;
            }
            if scan.living_only && !entity.living {
                continue;
            }
            if seen.contains(&entity.id) {
                continue;
            }
            if !collider.intersects(&Collider::Aabb(Aabb::of_entity(&entity))) {
                continue;
            }
            seen.insert(entity.id);
            outcome.hits += 1;
            let response = on_hit(ctx, &entity);
            outcome.remove |= response.remove;
            if response.consumed {
                outcome.consumed = true;
                if !scan.piercing {
                    return outcome;
                }
            }
        }
    }
    outcome
}

impl AbilityManager {
    /// Entity scan for every active instance that opts in. Returns the
    /// number of entity hits delivered.
    pub fn run_entity_scans(&mut self, env: &mut Env<'_>) -> usize {
        let ids: Vec<InstanceId> = self.instances.keys().copied().collect();
        let mut hits = 0;
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
            let Some(scan) = instance.ability.entity_scan() else {
                continue;
            };
            let colliders = instance.ability.colliders();
            if colliders.is_empty() {
                continue;
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
            let outcome = scan_entities(&mut ctx, &colliders, scan, |ctx, entity| {
                ability.on_entity_hit(ctx, entity)
            });
            if outcome.remove {
                ctx.remove_self();
            }
            if outcome.hits > 0 {
                trace!(%id, hits = outcome.hits, consumed = outcome.consumed, "entity hits");
            }
            hits += outcome.hits;
        }
        hits
    }

    /// Pairwise scan in creation order. Returns the number of collisions
    /// delivered. Pairs owned by the same actor are skipped.
    pub fn run_collisions(&mut self, env: &mut Env<'_>, table: &CollisionTable) -> usize {
        if table.is_empty() {
            return 0;
        }
        let candidates: Vec<(InstanceId, ArchetypeId, EntityId, Vec<Collider>)> = self
            .instances
            .values()
            .filter(|i| !self.removals.contains(&i.id))
            .map(|i| (i.id, i.archetype, i.actor, i.ability.colliders()))
            .filter(|(.., colliders)| colliders.iter().any(|c| !c.is_null()))
            .collect();

        let mut delivered = 0;
        for (i, (a, a_type, a_actor, a_colliders)) in candidates.iter().enumerate() {
            for (b, b_type, b_actor, b_colliders) in &candidates[i + 1..] {
                if self.removals.contains(a) {
                    break;
                }
                if self.removals.contains(b) || a_actor == b_actor {
                    continue;
                }
                let Some((remove_a, remove_b)) = table.flags(*a_type, *b_type) else {
                    continue;
                };
                let Some((own_collider, other_collider)) = first_hit(a_colliders, b_colliders)
                else {
                    continue;
                };
                let collision = Collision {
                    own: *a,
                    other: *b,
                    own_archetype: *a_type,
                    other_archetype: *b_type,
                    own_collider,
                    other_collider,
                    remove_self: remove_a,
                    remove_other: remove_b,
                };
                self.deliver(env, collision);
                delivered += 1;
            }
        }
        delivered
    }

    /// A's handler first, then B sees the reversed view with A's flags.
    fn deliver(&mut self, env: &mut Env<'_>, mut collision: Collision) {
        trace!(a = %collision.own, b = %collision.other, "collision");
        self.handle(env, &mut collision);
        let mut theirs = collision.reversed();
        self.handle(env, &mut theirs);

        if theirs.remove_other {
            self.removals.insert(theirs.other);
        }
        if theirs.remove_self {
            self.removals.insert(theirs.own);
        }
    }

    fn handle(&mut self, env: &mut Env<'_>, collision: &mut Collision) {
        let Self {
            instances,
            removals,
            cooldowns,
            ..
        } = self;
        let Some(instance) = instances.get_mut(&collision.own) else {
            return;
        };
        let mut ctx = AbilityContext::new(
            env,
            cooldowns,
            removals,
            instance.id,
            instance.actor,
            instance.archetype,
        );
        instance.ability.on_collision(&mut ctx, collision);
    }
}

fn first_hit(a: &[Collider], b: &[Collider]) -> Option<(Collider, Collider)> {
    for ca in a {
        let Some(bounds_a) = ca.bounding_box() else {
            continue;
        };
        for cb in b {
            let Some(bounds_b) = cb.bounding_box() else {
                continue;
            };
            if bounds_a.intersects(&bounds_b) && ca.intersects(cb) {
                return Some((*ca, *cb));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollisionRuleConfig;
    use crate::scheduler::Lifecycle;
    use crate::testing::{Rig, sphere};
    use bendsim_kernel::EntityData;
    use glam::DVec3;

    #[test]
    fn table_flags_follow_argument_order() {
        let (a, b) = (ArchetypeId(0), ArchetypeId(1));
        let table = CollisionTable::new().with(CollisionRule::new(a, b, false, true));
        assert_eq!(table.flags(a, b), Some((false, true)));
        assert_eq!(table.flags(b, a), Some((true, false)));
        assert_eq!(table.flags(a, a), None);
    }

    #[test]
    fn table_from_config_resolves_names() {
        let mut rig = Rig::new();
        let shield = rig.scripted("Shield", |p| p);
        let blast = rig.scripted("blast", |p| p);
        let rules = vec![CollisionRuleConfig {
            first: "blast".into(),
            second: "SHIELD".into(),
            remove_first: true,
            remove_second: false,
        }];
        let table = CollisionTable::from_config(&rules, &rig.registry).unwrap();
        assert_eq!(table.flags(shield, blast), Some((false, true)));

        let bad = vec![CollisionRuleConfig {
            first: "blast".into(),
            second: "wall".into(),
            remove_first: true,
            remove_second: true,
        }];
        assert_eq!(
            CollisionTable::from_config(&bad, &rig.registry).unwrap_err(),
            RegistryError::Unknown("wall".into())
        );
    }

    #[test]
    fn reversed_swaps_every_side() {
        let c = Collision {
            own: InstanceId(1),
            other: InstanceId(2),
            own_archetype: ArchetypeId(3),
            other_archetype: ArchetypeId(4),
            own_collider: Collider::Null,
            other_collider: sphere([0.0; 3], 1.0),
            remove_self: true,
            remove_other: false,
        };
        let r = c.reversed();
        assert_eq!(r.own, InstanceId(2));
        assert_eq!(r.other_archetype, ArchetypeId(3));
        assert!(!r.remove_self && r.remove_other);
        assert_eq!(r.reversed(), c);
    }

    #[test]
    fn pairs_outside_the_table_never_collide() {
        let mut rig = Rig::new();
        let (p, q) = (rig.actor(), rig.actor());
        let here = sphere([0.0, 65.0, 0.0], 1.0);
        let a = rig.scripted("a", move |x| x.with_collider(here));
        let b = rig.scripted("b", move |x| x.with_collider(here));
        rig.activate(p, a).unwrap();
        rig.activate(q, b).unwrap();
        rig.tick();
        assert!(!rig.entries().iter().any(|e| e.starts_with("collide")));

        rig.table.add(CollisionRule::new(a, b, false, false));
        rig.tick();
        assert!(rig.entries().contains(&"collide a".to_string()));
        assert!(rig.entries().contains(&"collide b".to_string()));
    }

    #[test]
    fn rule_flags_remove_the_loser() {
        let mut rig = Rig::new();
        let (p, q) = (rig.actor(), rig.actor());
        let here = sphere([0.0, 65.0, 0.0], 1.0);
        let blast = rig.scripted("blast", move |x| x.with_collider(here));
        let shield = rig.scripted("shield", move |x| x.with_collider(here));
        rig.table.add(CollisionRule::new(blast, shield, true, false));
        let b = rig.activate(p, blast).unwrap();
        let s = rig.activate(q, shield).unwrap();
        rig.tick();
        assert_eq!(rig.manager.lifecycle(b), None);
        assert_eq!(rig.manager.lifecycle(s), Some(Lifecycle::Active));
    }

    #[test]
    fn handlers_can_override_rule_flags() {
        let mut rig = Rig::new();
        let (p, q) = (rig.actor(), rig.actor());
        let here = sphere([0.0, 65.0, 0.0], 1.0);
        let blast = rig.scripted("blast", move |x| x.with_collider(here));
        // The shield absorbs the hit and sacrifices itself instead.
        let shield = rig.scripted("shield", move |x| x.with_collider(here).on_collide(true, false));
        rig.table.add(CollisionRule::new(blast, shield, true, false));
        let b = rig.activate(p, blast).unwrap();
        let s = rig.activate(q, shield).unwrap();
        rig.tick();
        assert_eq!(rig.manager.lifecycle(b), Some(Lifecycle::Active));
        assert_eq!(rig.manager.lifecycle(s), None);
    }

    #[test]
    fn first_handler_runs_before_second() {
        let mut rig = Rig::new();
        let (p, q) = (rig.actor(), rig.actor());
        let here = sphere([0.0, 65.0, 0.0], 1.0);
        let a = rig.scripted("a", move |x| x.with_collider(here));
        let b = rig.scripted("b", move |x| x.with_collider(here));
        rig.table.add(CollisionRule::new(b, a, false, false));
        rig.activate(p, a).unwrap();
        rig.activate(q, b).unwrap();
        rig.tick();
        let log: Vec<String> = rig
            .entries()
            .into_iter()
            .filter(|e| e.starts_with("collide"))
            .collect();
        assert_eq!(log, vec!["collide a", "collide b"]);
    }

    #[test]
    fn flagged_instance_is_skipped_by_later_pairs() {
        let mut rig = Rig::new();
        let (p, q, r) = (rig.actor(), rig.actor(), rig.actor());
        let here = sphere([0.0, 65.0, 0.0], 1.0);
        let blast = rig.scripted("blast", move |x| x.with_collider(here));
        let wall = rig.scripted("wall", move |x| x.with_collider(here));
        rig.table.add(CollisionRule::new(blast, wall, true, false));
        rig.activate(p, blast).unwrap();
        rig.activate(q, wall).unwrap();
        rig.activate(r, wall).unwrap();
        rig.tick();
        // The blast is spent on the first wall and never reaches the second.
        let hits = rig
            .entries()
            .into_iter()
            .filter(|e| e == "collide wall")
            .count();
        assert_eq!(hits, 1);
    }

    #[test]
    fn same_actor_pairs_are_skipped() {
        let mut rig = Rig::new();
        let p = rig.actor();
        let here = sphere([0.0, 65.0, 0.0], 1.0);
        let a = rig.scripted("a", move |x| x.with_collider(here));
        let b = rig.scripted("b", move |x| x.with_collider(here));
        rig.table.add(CollisionRule::new(a, b, true, true));
        let ia = rig.activate(p, a).unwrap();
        let ib = rig.activate(p, b).unwrap();
        rig.tick();
        assert_eq!(rig.manager.lifecycle(ia), Some(Lifecycle::Active));
        assert_eq!(rig.manager.lifecycle(ib), Some(Lifecycle::Active));
    }

    #[test]
    fn separated_colliders_miss() {
        let mut rig = Rig::new();
        let (p, q) = (rig.actor(), rig.actor());
        let a = rig.scripted("a", |x| x.with_collider(sphere([0.0, 65.0, 0.0], 1.0)));
        let b = rig.scripted("b", |x| x.with_collider(sphere([5.0, 65.0, 0.0], 1.0)));
        rig.table.add(CollisionRule::new(a, b, true, true));
        rig.activate(p, a).unwrap();
        rig.activate(q, b).unwrap();
        rig.tick();
        assert_eq!(rig.manager.count(), 2);
    }

    #[test]
    fn entity_scan_excludes_own_actor() {
        let mut rig = Rig::new();
        let actor = rig.actor();
        rig.world.spawn_with_id(actor, EntityData::living(DVec3::new(0.0, 64.0, 0.0)));
        let aura = rig.scripted("aura", |x| {
            x.with_collider(sphere([0.0, 65.0, 0.0], 2.0))
                .scanning(EntityScan::living())
        });
        rig.activate(actor, aura).unwrap();
        rig.tick();
        assert!(!rig.entries().iter().any(|e| e.starts_with("hit")));

        let selfish = rig.scripted("selfish", |x| {
            x.with_collider(sphere([0.0, 65.0, 0.0], 2.0))
                .scanning(EntityScan::living().including_actor())
        });
        rig.activate(actor, selfish).unwrap();
        rig.tick();
        assert!(rig.entries().contains(&"hit selfish".to_string()));
    }

    #[test]
    fn consumed_hit_stops_unless_piercing() {
        let mut rig = Rig::new();
        let actor = rig.actor();
        for x in [-1.0, 0.0, 1.0] {
            rig.world.spawn(EntityData::living(DVec3::new(x, 64.0, 0.0)));
        }
        let column = sphere([0.0, 65.0, 0.0], 3.0);
        let dart = rig.scripted("dart", move |x| {
            x.with_collider(column).scanning(EntityScan::living()).consuming()
        });
        let lance = rig.scripted("lance", move |x| {
            x.with_collider(column)
                .scanning(EntityScan::living().piercing())
                .consuming()
        });
        rig.activate(actor, dart).unwrap();
        rig.activate(actor, lance).unwrap();
        rig.tick();
        let count = |label: &str| {
            rig.entries()
                .iter()
                .filter(|e| e.as_str() == format!("hit {label}"))
                .count()
        };
        assert_eq!(count("dart"), 1);
        assert_eq!(count("lance"), 3);
    }

    #[test]
    fn living_only_skips_objects() {
        let mut rig = Rig::new();
        let actor = rig.actor();
        rig.world
            .spawn(EntityData::object(DVec3::new(0.0, 64.0, 0.0), 0.25, 0.5));
        let aura = rig.scripted("aura", |x| {
            x.with_collider(sphere([0.0, 65.0, 0.0], 2.0))
                .scanning(EntityScan::living())
        });
        let any = rig.scripted("any", |x| {
            x.with_collider(sphere([0.0, 65.0, 0.0], 2.0))
                .scanning(EntityScan::default())
        });
        rig.activate(actor, aura).unwrap();
        rig.activate(actor, any).unwrap();
        rig.tick();
        assert!(!rig.entries().contains(&"hit aura".to_string()));
        assert!(rig.entries().contains(&"hit any".to_string()));
    }

    #[test]
    fn hit_response_can_remove_instance() {
        let mut rig = Rig::new();
        let actor = rig.actor();
        rig.world.spawn(EntityData::living(DVec3::new(0.0, 64.0, 0.0)));
        let bolt = rig.scripted("bolt", |x| {
            x.with_collider(sphere([0.0, 65.0, 0.0], 1.0))
                .scanning(EntityScan::living())
                .removed_on_hit()
        });
        let id = rig.activate(actor, bolt).unwrap();
        rig.tick();
        assert_eq!(rig.manager.lifecycle(id), None);
    }

    #[test]
    fn broad_phase_candidate_must_pass_exact_test() {
        let mut rig = Rig::new();
        let actor = rig.actor();
        // Inside the sphere's bounding box corner, outside the sphere.
        rig.world
            .spawn(EntityData::object(DVec3::new(1.9, 63.0, 1.9), 0.05, 0.1));
        let orb = rig.scripted("orb", |x| {
            x.with_collider(sphere([0.0, 65.0, 0.0], 2.0))
                .scanning(EntityScan::default())
        });
        rig.activate(actor, orb).unwrap();
        rig.tick();
        assert!(!rig.entries().contains(&"hit orb".to_string()));
    }
}
