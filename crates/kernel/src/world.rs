use std::collections::BTreeMap;

use bendsim_common::{BlockAccess, BlockPos, BlockState, EntityId, EntityQuery, EntityRef, Material};
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::grid::GridPartition;

/// Cell size of the entity grid, in blocks.
const GRID_CELL: f64 = 16.0;

/// Fraction of velocity lost per step.
pub const DEFAULT_DRAG: f64 = 0.02;

/// Speeds below this are snapped to rest so drifting entities settle.
const REST_SPEED_SQ: f64 = 1e-8;

/// An event record produced by every mutation to the world.
///
/// The event log is the foundation for replay. Each event captures enough
/// information to reconstruct or reverse the mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    /// Block at `pos` changed from `old` to `new`.
    BlockChanged {
        pos: BlockPos,
        old: BlockState,
        new: BlockState,
    },
    /// Entity was spawned.
    Spawned { id: EntityId, data: EntityData },
    /// Entity was despawned. Carries the data it had for undo support.
    Despawned { id: EntityId, data: EntityData },
    /// Entity was teleported.
    Moved { id: EntityId, old: DVec3, new: DVec3 },
    /// Entity velocity was overwritten.
    VelocityChanged { id: EntityId, old: DVec3, new: DVec3 },
    /// Simulation advanced one tick with the given seed.
    Stepped { tick: u64, seed: u64 },
}

/// Per-entity data stored in the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    /// Feet position.
    pub position: DVec3,
    /// Blocks per tick.
    pub velocity: DVec3,
    pub half_width: f64,
    pub height: f64,
    pub living: bool,
}

impl EntityData {
    /// A player-sized living entity standing at `position`.
    pub fn living(position: DVec3) -> Self {
        Self {
            position,
            velocity: DVec3::ZERO,
            half_width: 0.3,
            height: 1.8,
            living: true,
        }
    }

    /// A non-living object such as a dropped item or falling block.
    pub fn object(position: DVec3, half_width: f64, height: f64) -> Self {
        Self {
            position,
            velocity: DVec3::ZERO,
            half_width,
            height,
            living: false,
        }
    }

    fn bounds(&self) -> (DVec3, DVec3) {
        let half = DVec3::new(self.half_width, 0.0, self.half_width);
        (
            self.position - half,
            self.position + half + DVec3::new(0.0, self.height, 0.0),
        )
    }

    fn to_ref(self, id: EntityId) -> EntityRef {
        EntityRef {
            id,
            position: self.position,
            velocity: self.velocity,
            half_width: self.half_width,
            height: self.height,
            living: self.living,
        }
    }
}

/// In-memory world: sparse voxel blocks over a flat filled ground, plus a
/// table of simple moving entities.
///
/// All mutations go through explicit operations and are logged. Uses
/// BTreeMap for deterministic iteration order. Given the same seed and
/// sequence of operations the world produces identical states.
#[derive(Debug, Clone)]
pub struct World {
    /// Blocks that differ from the generated terrain.
    blocks: BTreeMap<BlockPos, BlockState>,
    /// Every `y` below this is `fill`, everything else air.
    ground_level: i32,
    fill: BlockState,
    entities: BTreeMap<EntityId, EntityData>,
    grid: GridPartition,
    drag: f64,
    tick: u64,
    /// Seed for deterministic RNG. Advanced each step for reproducibility.
    seed: u64,
    /// Append-only event log of all mutations.
    event_log: Vec<WorldEvent>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Stone below y = 64, seed 0.
    pub fn new() -> Self {
        Self::with_ground(64, Material::Stone)
    }

    pub fn with_ground(ground_level: i32, fill: Material) -> Self {
        Self {
            blocks: BTreeMap::new(),
            ground_level,
            fill: BlockState::of(fill),
            entities: BTreeMap::new(),
            grid: GridPartition::new(GRID_CELL),
            drag: DEFAULT_DRAG,
            tick: 0,
            seed: 0,
            event_log: Vec::new(),
        }
    }

    /// Create a world with a specific seed for deterministic replay.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::new()
        }
    }

    pub fn with_drag(mut self, drag: f64) -> Self {
        self.drag = drag.clamp(0.0, 1.0);
        self
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn ground_level(&self) -> i32 {
        self.ground_level
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of blocks that differ from the generated terrain.
    pub fn edited_block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.event_log)
    }

    pub fn events(&self) -> &[WorldEvent] {
        &self.event_log
    }

    pub fn entities(&self) -> &BTreeMap<EntityId, EntityData> {
        &self.entities
    }

    fn terrain(&self, pos: BlockPos) -> BlockState {
        if pos.y < self.ground_level {
            self.fill
        } else {
            BlockState::AIR
        }
    }

    /// Fill every block in the inclusive region with `state`.
    pub fn fill(&mut self, from: BlockPos, to: BlockPos, state: BlockState) {
        for x in from.x.min(to.x)..=from.x.max(to.x) {
            for y in from.y.min(to.y)..=from.y.max(to.y) {
                for z in from.z.min(to.z)..=from.z.max(to.z) {
                    self.set_block(BlockPos::new(x, y, z), state);
                }
            }
        }
    }

    pub fn spawn(&mut self, data: EntityData) -> EntityId {
        let id = EntityId::new();
        self.spawn_with_id(id, data);
        id
    }

    /// Spawn an entity with a specific id (used for replay).
    pub fn spawn_with_id(&mut self, id: EntityId, data: EntityData) {
        self.insert_entity(id, data);
        tracing::debug!(%id, pos = ?data.position, "entity spawned");
        self.event_log.push(WorldEvent::Spawned { id, data });
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<EntityData> {
        let data = self.entities.remove(&id)?;
        self.grid.remove(id);
        self.event_log.push(WorldEvent::Despawned { id, data });
        Some(data)
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityData> {
        self.entities.get(&id)
    }

    fn insert_entity(&mut self, id: EntityId, data: EntityData) {
        let (min, max) = data.bounds();
        self.grid.insert(id, min, max);
        self.entities.insert(id, data);
    }

    fn move_entity(&mut self, id: EntityId, position: DVec3) {
        if let Some(data) = self.entities.get_mut(&id) {
            data.position = position;
            let (min, max) = data.bounds();
            self.grid.insert(id, min, max);
        }
    }

    /// Advance the simulation by one tick: every entity moves by its
    /// velocity, then loses `drag` of it.
    pub fn step(&mut self) {
        self.integrate();
        self.tick += 1;
        self.seed = splitmix64(self.seed);
        self.event_log.push(WorldEvent::Stepped {
            tick: self.tick,
            seed: self.seed,
        });
    }

    fn integrate(&mut self) {
        let keep = 1.0 - self.drag;
        let moving: Vec<(EntityId, DVec3)> = self
            .entities
            .iter_mut()
            .filter(|(_, d)| d.velocity != DVec3::ZERO)
            .map(|(id, d)| {
                let next = d.position + d.velocity;
                d.velocity *= keep;
                if d.velocity.length_squared() < REST_SPEED_SQ {
                    d.velocity = DVec3::ZERO;
                }
                (*id, next)
            })
            .collect();
        tracing::trace!(tick = self.tick, moving = moving.len(), "integrate");
        for (id, pos) in moving {
            self.move_entity(id, pos);
        }
    }

    /// Reconstruct world state from a sequence of events.
    ///
    /// `Stepped` re-runs integration, so the events must come from a world
    /// with the same ground, drag and starting seed.
    pub fn replay_onto(mut base: World, events: &[WorldEvent]) -> Self {
        for event in events {
            match event {
                WorldEvent::BlockChanged { pos, new, .. } => base.store_block(*pos, *new),
                WorldEvent::Spawned { id, data } => base.insert_entity(*id, *data),
                WorldEvent::Despawned { id, .. } => {
                    base.entities.remove(id);
                    base.grid.remove(*id);
                }
                WorldEvent::Moved { id, new, .. } => base.move_entity(*id, *new),
                WorldEvent::VelocityChanged { id, new, .. } => {
                    if let Some(data) = base.entities.get_mut(id) {
                        data.velocity = *new;
                    }
                }
                WorldEvent::Stepped { tick, seed } => {
                    base.integrate();
                    base.tick = *tick;
                    base.seed = *seed;
                }
            }
        }
        base
    }

    /// Replay onto a default world.
    pub fn replay(events: &[WorldEvent]) -> Self {
        Self::replay_onto(Self::new(), events)
    }

    /// Deterministic FNV-1a hash of blocks, entities, tick and seed.
    pub fn state_hash(&self) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        let mix = |h: &mut u64, bytes: &[u8]| {
            for &b in bytes {
                *h ^= b as u64;
                *h = h.wrapping_mul(0x0100_0000_01b3);
            }
        };
        mix(&mut h, &self.tick.to_le_bytes());
        mix(&mut h, &self.seed.to_le_bytes());
        for (pos, state) in &self.blocks {
            mix(&mut h, &pos.x.to_le_bytes());
            mix(&mut h, &pos.y.to_le_bytes());
            mix(&mut h, &pos.z.to_le_bytes());
            mix(&mut h, &[state.material as u8, state.data]);
        }
        for (id, data) in &self.entities {
            mix(&mut h, id.0.as_bytes());
            for v in [data.position, data.velocity] {
                mix(&mut h, &v.x.to_le_bytes());
                mix(&mut h, &v.y.to_le_bytes());
                mix(&mut h, &v.z.to_le_bytes());
            }
            mix(&mut h, &data.half_width.to_le_bytes());
            mix(&mut h, &data.height.to_le_bytes());
            mix(&mut h, &[data.living as u8]);
        }
        h
    }

    /// Store without logging; terrain-equal states drop the override.
    fn store_block(&mut self, pos: BlockPos, state: BlockState) {
        if state == self.terrain(pos) {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, state);
        }
    }
}

impl BlockAccess for World {
    fn block(&self, pos: BlockPos) -> BlockState {
        self.blocks
            .get(&pos)
            .copied()
            .unwrap_or_else(|| self.terrain(pos))
    }

    fn set_block(&mut self, pos: BlockPos, state: BlockState) {
        let old = self.block(pos);
        if old == state {
            return;
        }
        self.store_block(pos, state);
        self.event_log.push(WorldEvent::BlockChanged {
            pos,
            old,
            new: state,
        });
    }
}

impl EntityQuery for World {
    fn entities_in_box(&self, min: DVec3, max: DVec3) -> Vec<EntityRef> {
        self.grid
            .candidates(min, max)
            .into_iter()
            .filter_map(|id| {
                let data = self.entities.get(&id)?;
                let (lo, hi) = data.bounds();
                let overlaps = lo.cmple(max).all() && hi.cmpge(min).all();
                overlaps.then(|| data.to_ref(id))
            })
            .collect()
    }

    fn entity(&self, id: EntityId) -> Option<EntityRef> {
        self.entities.get(&id).map(|d| d.to_ref(id))
    }

    fn set_velocity(&mut self, id: EntityId, velocity: DVec3) -> bool {
        let Some(data) = self.entities.get_mut(&id) else {
            return false;
        };
        let old = data.velocity;
        data.velocity = velocity;
        self.event_log.push(WorldEvent::VelocityChanged {
            id,
            old,
            new: velocity,
        });
        true
    }

    fn set_position(&mut self, id: EntityId, position: DVec3) -> bool {
        let Some(old) = self.entities.get(&id).map(|d| d.position) else {
            return false;
        };
        self.move_entity(id, position);
        self.event_log.push(WorldEvent::Moved {
            id,
            old,
            new: position,
        });
        true
    }
}

/// Splitmix64: a fast deterministic PRNG step function.
fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
