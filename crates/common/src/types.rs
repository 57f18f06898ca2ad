use glam::DVec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an entity in the world (players, mobs, projectiles).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.8}", self.0.to_string())
    }
}

/// Integer block coordinate.
///
/// Ordered (x, y, z) so block maps keyed by position iterate deterministically.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The block containing a world-space point.
    pub fn containing(point: DVec3) -> Self {
        let f = point.floor();
        Self {
            x: f.x as i32,
            y: f.y as i32,
            z: f.z as i32,
        }
    }

    /// Minimum corner of the unit cube.
    pub fn corner(self) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// Centre of the unit cube.
    pub fn center(self) -> DVec3 {
        self.corner() + DVec3::splat(0.5)
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn up(self) -> Self {
        self.offset(0, 1, 0)
    }

    pub fn down(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// Squared distance between block centres.
    pub fn distance_sq(self, other: BlockPos) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dy * dy + dz * dz
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
