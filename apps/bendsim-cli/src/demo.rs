//! Reference archetypes driven by the host loop. Small enough to read in
//! one sitting; each leans on a different part of the ability crate.

use std::time::Duration;

use bendsim_ability::{
    Ability, AbilityContext, AbilityDescriptor, AbilityError, AbilityRegistry, Activation,
    ActivationFailure, ActivationMethod, Attribute, ChainStatus, ChainStore, ChainValue,
    CollisionRuleConfig, Element, EngineConfig, EntityResponse, EntityScan, PolicySet,
    RegistryError, RemovalPolicy, State, StateChain, StateStatus, UpdateResult,
};
use bendsim_collider::{Collider, Sphere};
use bendsim_common::{BlockPos, BlockState, EntityRef, Material};
use glam::DVec3;

pub const AIR_BLAST: &str = "AirBlast";
pub const AIR_SHIELD: &str = "AirShield";
pub const EARTH_TUNNEL: &str = "EarthTunnel";
pub const TORRENT: &str = "Torrent";

pub fn register_all(registry: &mut AbilityRegistry) -> Result<(), RegistryError> {
    registry.register(
        AbilityDescriptor::new(AIR_BLAST, Element::Air)
            .activated_by(ActivationMethod::Punch)
            .with(Attribute::Cooldown, 1250.0)
            .with(Attribute::Range, 20.0)
            .with(Attribute::Speed, 1.25)
            .with(Attribute::Radius, 0.5)
            .with(Attribute::Strength, 0.8),
        AirBlast::activate,
    )?;
    registry.register(
        AbilityDescriptor::new(AIR_SHIELD, Element::Air)
            .activated_by(ActivationMethod::Sneak)
            .max_instances(1)
            .with(Attribute::Radius, 3.0)
            .with(Attribute::Duration, 4000.0)
            .with(Attribute::Strength, 0.3),
        AirShield::activate,
    )?;
    registry.register(
        AbilityDescriptor::new(EARTH_TUNNEL, Element::Earth)
            .activated_by(ActivationMethod::Sneak)
            .with(Attribute::Range, 8.0)
            .with(Attribute::SelectionRange, 6.0)
            .with(Attribute::Cooldown, 2000.0),
        EarthTunnel::activate,
    )?;
    registry.register(
        AbilityDescriptor::new(TORRENT, Element::Water)
            .activated_by(ActivationMethod::Sneak)
            .with(Attribute::SelectionRange, 8.0)
            .with(Attribute::ChargeTime, 500.0)
            .with(Attribute::Range, 16.0)
            .with(Attribute::Speed, 1.0)
            .with(Attribute::Radius, 0.75)
            .with(Attribute::Cooldown, 3000.0),
        Torrent::activate,
    )?;
    Ok(())
}

/// Built-in config for the demo: shields stop blasts, torrents and blasts
/// cancel each other out.
pub fn config() -> EngineConfig {
    EngineConfig {
        collisions: vec![
            CollisionRuleConfig {
                first: AIR_SHIELD.into(),
                second: AIR_BLAST.into(),
                remove_first: false,
                remove_second: true,
            },
            CollisionRuleConfig {
                first: TORRENT.into(),
                second: AIR_BLAST.into(),
                remove_first: true,
                remove_second: true,
            },
        ],
        ..EngineConfig::default()
    }
}

fn sphere(center: DVec3, radius: f64) -> Result<Sphere, ActivationFailure> {
    Sphere::new(center, radius).map_err(|_| ActivationFailure::Declined("radius must be positive"))
}

/// A gust that flies straight out from the eye and shoves the first living
/// thing it meets.
struct AirBlast {
    origin: DVec3,
    direction: DVec3,
    speed: f64,
    range: f64,
    strength: f64,
    shape: Sphere,
}

impl AirBlast {
    fn activate(
        ctx: &mut AbilityContext<'_>,
        _: &Activation,
    ) -> Result<Box<dyn Ability>, ActivationFailure> {
        let actor = ctx.actor_state().ok_or(ActivationFailure::UnknownActor)?;
        if actor.in_liquid {
            return Err(ActivationFailure::Obstructed);
        }
        let blast = AirBlast {
            origin: actor.eye,
            direction: actor.direction,
            speed: ctx.attribute(Attribute::Speed),
            range: ctx.attribute(Attribute::Range),
            strength: ctx.attribute(Attribute::Strength),
            shape: sphere(actor.eye, ctx.attribute(Attribute::Radius))?,
        };
        ctx.add_cooldown();
        Ok(Box::new(blast))
    }
}

impl Ability for AirBlast {
    fn update(&mut self, ctx: &mut AbilityContext<'_>) -> Result<UpdateResult, AbilityError> {
        let next = self.shape.center() + self.direction * self.speed;
        if next.distance_squared(self.origin) > self.range * self.range {
            return Ok(UpdateResult::Remove);
        }
        if ctx.world.is_solid(BlockPos::containing(next)) {
            return Ok(UpdateResult::Remove);
        }
        self.shape = self.shape.at(next);
        Ok(UpdateResult::Continue)
    }

    fn colliders(&self) -> Vec<Collider> {
        vec![self.shape.into()]
    }

    fn entity_scan(&self) -> Option<EntityScan> {
        Some(EntityScan::living())
    }

    fn on_entity_hit(
        &mut self,
        ctx: &mut AbilityContext<'_>,
        entity: &EntityRef,
    ) -> EntityResponse {
        ctx.world
            .set_velocity(entity.id, entity.velocity + self.direction * self.strength);
        EntityResponse::CONSUMED.and_remove()
    }
}

/// A sphere of moving air around the actor, held while sneaking.
struct AirShield {
    shape: Sphere,
    strength: f64,
    policies: PolicySet,
}

impl AirShield {
    fn activate(
        ctx: &mut AbilityContext<'_>,
        _: &Activation,
    ) -> Result<Box<dyn Ability>, ActivationFailure> {
        let actor = ctx.actor_state().ok_or(ActivationFailure::UnknownActor)?;
        let duration = ctx.attributes().millis(Attribute::Duration);
        Ok(Box::new(AirShield {
            shape: sphere(actor.eye, ctx.attribute(Attribute::Radius))?,
            strength: ctx.attribute(Attribute::Strength),
            policies: PolicySet::new()
                .with(RemovalPolicy::NotSneaking)
                .with(RemovalPolicy::expire_after(ctx.now, duration)),
        }))
    }
}

impl Ability for AirShield {
    fn update(&mut self, ctx: &mut AbilityContext<'_>) -> Result<UpdateResult, AbilityError> {
        let actor = ctx.actor_state().ok_or(AbilityError::ActorGone)?;
        self.shape = self.shape.at(actor.eye);
        Ok(UpdateResult::Continue)
    }

    fn colliders(&self) -> Vec<Collider> {
        vec![self.shape.into()]
    }

    fn removal_policy(&self) -> Option<&PolicySet> {
        Some(&self.policies)
    }

    fn entity_scan(&self) -> Option<EntityScan> {
        Some(EntityScan::default().piercing())
    }

    fn on_entity_hit(
        &mut self,
        ctx: &mut AbilityContext<'_>,
        entity: &EntityRef,
    ) -> EntityResponse {
        let away = (entity.center() - self.shape.center()).normalize_or_zero();
        ctx.world.set_velocity(entity.id, away * self.strength);
        EntityResponse::IGNORED
    }
}

/// Bores a line of air through bendable earth, one block per tick. The
/// earth comes back on its own after the configured revert time.
struct EarthTunnel {
    cursor: DVec3,
    direction: DVec3,
    remaining: u32,
    revert: Duration,
    policies: PolicySet,
}

impl EarthTunnel {
    fn activate(
        ctx: &mut AbilityContext<'_>,
        _: &Activation,
    ) -> Result<Box<dyn Ability>, ActivationFailure> {
        let actor = ctx.actor_state().ok_or(ActivationFailure::UnknownActor)?;
        let reach = ctx.attribute(Attribute::SelectionRange);
        let target = march(actor.eye, actor.direction, reach)
            .find(|pos| {
                ctx.world.block(*pos).material.is_earthbendable() && ctx.overlay.is_bendable(*pos)
            })
            .ok_or(ActivationFailure::InvalidTarget)?;
        ctx.add_cooldown();
        Ok(Box::new(EarthTunnel {
            cursor: target.center(),
            direction: actor.direction,
            remaining: ctx.attribute(Attribute::Range).max(0.0) as u32,
            revert: ctx.config().earth_revert(),
            policies: PolicySet::new().with(RemovalPolicy::NotSneaking),
        }))
    }
}

impl Ability for EarthTunnel {
    fn update(&mut self, ctx: &mut AbilityContext<'_>) -> Result<UpdateResult, AbilityError> {
        if self.remaining == 0 {
            return Ok(UpdateResult::Remove);
        }
        let pos = BlockPos::containing(self.cursor);
        let block = ctx.world.block(pos);
        if block.material.is_unbreakable() {
            return Ok(UpdateResult::Remove);
        }
        if block.material.is_earthbendable() && ctx.overlay.is_bendable(pos) {
            ctx.temp_block(pos, BlockState::AIR, Some(self.revert));
        }
        self.cursor += self.direction;
        self.remaining -= 1;
        Ok(UpdateResult::Continue)
    }

    fn removal_policy(&self) -> Option<&PolicySet> {
        Some(&self.policies)
    }
}

/// Blocks crossed walking `reach` along `direction`, nearest first.
fn march(from: DVec3, direction: DVec3, reach: f64) -> impl Iterator<Item = BlockPos> {
    let steps = (reach.max(0.0) * 2.0) as u32;
    (1..=steps)
        .map(move |i| BlockPos::containing(from + direction * (f64::from(i) * 0.5)))
        .scan(None, |last, pos| {
            let fresh = *last != Some(pos);
            *last = Some(pos);
            Some(fresh.then_some(pos))
        })
        .flatten()
}

/// Pick a water source, charge, then surge forward as a moving water block.
struct Torrent {
    chain: StateChain,
    radius: f64,
    policies: PolicySet,
}

impl Torrent {
    fn activate(
        ctx: &mut AbilityContext<'_>,
        _: &Activation,
    ) -> Result<Box<dyn Ability>, ActivationFailure> {
        let actor = ctx.actor_state().ok_or(ActivationFailure::UnknownActor)?;
        let reach = ctx.attribute(Attribute::SelectionRange);
        // Look a little downwards so a pool at the feet counts.
        let look = (actor.direction - DVec3::Y * 0.5).normalize_or_zero();
        let source = march(actor.eye, look, reach)
            .find(|pos| ctx.world.block(*pos).material == Material::Water)
            .ok_or(ActivationFailure::InvalidTarget)?;

        let tick = ctx.config().tick_millis.max(1);
        let charge_ticks = ctx.attributes().millis(Attribute::ChargeTime).as_millis() as u64 / tick;
        let mut chain = StateChain::new(vec![
            Box::new(Charge {
                left: charge_ticks as u32,
            }) as Box<dyn State>,
            Box::new(Surge {
                direction: actor.direction,
                speed: ctx.attribute(Attribute::Speed),
                remaining: ctx.attribute(Attribute::Range),
                head: None,
            }) as Box<dyn State>,
        ]);
        chain.store_mut().insert("source", ChainValue::Block(source));
        chain.start();
        ctx.add_cooldown();
        Ok(Box::new(Torrent {
            chain,
            radius: ctx.attribute(Attribute::Radius),
            policies: PolicySet::new().with(RemovalPolicy::out_of_range(
                actor.position,
                ctx.attribute(Attribute::Range) * 2.0,
            )),
        }))
    }
}

impl Ability for Torrent {
    fn update(&mut self, ctx: &mut AbilityContext<'_>) -> Result<UpdateResult, AbilityError> {
        match self.chain.update(ctx) {
            ChainStatus::Running => Ok(UpdateResult::Continue),
            ChainStatus::Finished | ChainStatus::Aborted | ChainStatus::NotStarted => {
                Ok(UpdateResult::Remove)
            }
        }
    }

    fn destroy(&mut self, ctx: &mut AbilityContext<'_>) {
        if let Some(head) = self.chain.store().block("head") {
            ctx.revert_block(head);
        }
    }

    fn colliders(&self) -> Vec<Collider> {
        match self.chain.store().position("head") {
            Some(at) => Sphere::new(at, self.radius)
                .map(|s| vec![s.into()])
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn removal_policy(&self) -> Option<&PolicySet> {
        Some(&self.policies)
    }
}

struct Charge {
    left: u32,
}

impl State for Charge {
    fn name(&self) -> &'static str {
        "charge"
    }

    fn update(&mut self, ctx: &mut AbilityContext<'_>, _: &mut ChainStore) -> StateStatus {
        let Some(actor) = ctx.actor_state() else {
            return StateStatus::Abort;
        };
        if !actor.sneaking {
            return StateStatus::Abort;
        }
        if self.left == 0 {
            return StateStatus::Complete;
        }
        self.left -= 1;
        StateStatus::Running
    }

    fn complete(&mut self, _: &mut ChainStore) {
        self.left = 0;
    }
}

struct Surge {
    direction: DVec3,
    speed: f64,
    remaining: f64,
    head: Option<BlockPos>,
}

impl State for Surge {
    fn name(&self) -> &'static str {
        "surge"
    }

    fn start(&mut self, store: &mut ChainStore) {
        self.head = store.block("source");
    }

    fn update(&mut self, ctx: &mut AbilityContext<'_>, store: &mut ChainStore) -> StateStatus {
        let Some(from) = self.head else {
            return StateStatus::Abort;
        };
        if self.remaining <= 0.0 || self.speed <= 0.0 {
            return StateStatus::Complete;
        }
        let to = BlockPos::containing(from.center() + self.direction * self.speed);
        if to == from {
            self.remaining -= self.speed;
            return StateStatus::Running;
        }
        if !ctx.world.is_passable(to) {
            return StateStatus::Complete;
        }
        if ctx.overlay.is_temp(from) && store.contains("head") {
            ctx.revert_block(from);
        }
        ctx.temp_block(to, BlockState::with_data(Material::Water, 1), None);
        store.insert("head", ChainValue::Block(to));
        self.head = Some(to);
        self.remaining -= self.speed;
        StateStatus::Running
    }
}
