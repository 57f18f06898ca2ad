//! Collaborator interfaces onto the externally-owned game world.
//!
//! The engine never owns the world. It reads and writes blocks, queries
//! entities near a region and nudges their motion, nothing more.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::block::BlockState;
use crate::types::{BlockPos, EntityId};

/// Read/write access to block state at integer coordinates.
pub trait BlockAccess {
    fn block(&self, pos: BlockPos) -> BlockState;

    fn set_block(&mut self, pos: BlockPos, state: BlockState);

    fn is_liquid(&self, pos: BlockPos) -> bool {
        self.block(pos).is_liquid()
    }

    fn is_solid(&self, pos: BlockPos) -> bool {
        self.block(pos).is_solid()
    }

    fn is_passable(&self, pos: BlockPos) -> bool {
        self.block(pos).is_passable()
    }
}

/// A copy of the fields the engine is allowed to see on a live entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: EntityId,
    /// Feet position (bottom centre of the bounding box).
    pub position: DVec3,
    pub velocity: DVec3,
    /// Half width on x/z and full height on y.
    pub half_width: f64,
    pub height: f64,
    pub living: bool,
}

impl EntityRef {
    pub fn bounds_min(&self) -> DVec3 {
        self.position - DVec3::new(self.half_width, 0.0, self.half_width)
    }

    pub fn bounds_max(&self) -> DVec3 {
        self.position + DVec3::new(self.half_width, self.height, self.half_width)
    }

    pub fn center(&self) -> DVec3 {
        self.position + DVec3::new(0.0, self.height * 0.5, 0.0)
    }
}

/// Spatial queries and motion writes on live entities.
pub trait EntityQuery {
    /// Entities whose bounding boxes overlap the region `[min, max]`.
    fn entities_in_box(&self, min: DVec3, max: DVec3) -> Vec<EntityRef>;

    fn entity(&self, id: EntityId) -> Option<EntityRef>;

    /// Returns false if the entity is gone.
    fn set_velocity(&mut self, id: EntityId, velocity: DVec3) -> bool;

    /// Returns false if the entity is gone.
    fn set_position(&mut self, id: EntityId, position: DVec3) -> bool;
}

/// Everything the engine needs from a world.
pub trait GameWorld: BlockAccess + EntityQuery {}

impl<T: BlockAccess + EntityQuery> GameWorld for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_bounds_enclose_center() {
        let e = EntityRef {
            id: EntityId::new(),
            position: DVec3::new(0.0, 64.0, 0.0),
            velocity: DVec3::ZERO,
            half_width: 0.3,
            height: 1.8,
            living: true,
        };
        let c = e.center();
        assert!(c.cmpge(e.bounds_min()).all());
        assert!(c.cmple(e.bounds_max()).all());
        assert!((e.bounds_max().y - 65.8).abs() < 1e-9);
    }
}
