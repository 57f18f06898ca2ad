use bendsim_common::{BlockPos, EntityRef};
use glam::DVec3;

use crate::error::{GeometryError, finite};

/// Axis-aligned box given by its minimum and maximum corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    min: DVec3,
    max: DVec3,
}

impl Aabb {
    /// Build from corners. Touching faces count as overlap, so a zero-volume
    /// box is allowed; inverted corners are not.
    pub fn new(min: DVec3, max: DVec3) -> Result<Self, GeometryError> {
        let min = finite(min, "box min")?;
        let max = finite(max, "box max")?;
        for (axis, lo, hi) in [('x', min.x, max.x), ('y', min.y, max.y), ('z', min.z, max.z)] {
            if lo > hi {
                return Err(GeometryError::InvertedBounds {
                    axis,
                    min: lo,
                    max: hi,
                });
            }
        }
        Ok(Self { min, max })
    }

    pub fn from_center(center: DVec3, half_extents: DVec3) -> Result<Self, GeometryError> {
        let half_extents = finite(half_extents, "box half extents")?;
        if let Some(e) = half_extents.to_array().into_iter().find(|e| *e < 0.0) {
            return Err(GeometryError::NegativeExtent(e));
        }
        Self::new(center - half_extents, center + half_extents)
    }

    /// The unit cube `[0, 1]^3`.
    pub fn block_bounds() -> Self {
        Self {
            min: DVec3::ZERO,
            max: DVec3::ONE,
        }
    }

    /// The unit cube occupied by a block.
    pub fn of_block(pos: BlockPos) -> Self {
        let min = pos.corner();
        Self {
            min,
            max: min + DVec3::ONE,
        }
    }

    pub fn of_entity(entity: &EntityRef) -> Self {
        Self {
            min: entity.bounds_min(),
            max: entity.bounds_max(),
        }
    }

    pub fn min(&self) -> DVec3 {
        self.min
    }

    pub fn max(&self) -> DVec3 {
        self.max
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Expand (or shrink, with negative components) every face by `amount`.
    pub fn grow(&self, amount: DVec3) -> Result<Self, GeometryError> {
        Self::new(self.min - amount, self.max + amount)
    }

    /// Same box centred on `center`.
    pub fn at(&self, center: DVec3) -> Self {
        let half = self.half_extents();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn contains(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Nearest point of the box to `point` (the point itself when inside).
    pub fn closest_point(&self, point: DVec3) -> DVec3 {
        point.clamp(self.min, self.max)
    }

    pub fn distance_sq(&self, point: DVec3) -> f64 {
        self.closest_point(point).distance_squared(point)
    }

    /// Smallest box enclosing both.
    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Every block position the box touches.
    pub fn blocks(&self) -> impl Iterator<Item = BlockPos> + use<> {
        let lo = BlockPos::containing(self.min);
        let hi = BlockPos::containing(self.max);
        (lo.x..=hi.x).flat_map(move |x| {
            (lo.y..=hi.y).flat_map(move |y| (lo.z..=hi.z).map(move |z| BlockPos::new(x, y, z)))
        })
    }

    pub(crate) fn from_corners_unchecked(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(min: [f64; 3], max: [f64; 3]) -> Aabb {
        Aabb::new(DVec3::from_array(min), DVec3::from_array(max)).unwrap()
    }

    #[test]
    fn overlapping_boxes_intersect() {
        let a = cube([0.0; 3], [1.0; 3]);
        let b = cube([0.5; 3], [2.0; 3]);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn distant_boxes_do_not_intersect() {
        let a = cube([0.0; 3], [1.0; 3]);
        let b = cube([5.0; 3], [6.0; 3]);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn separated_on_one_axis_only() {
        let a = cube([0.0; 3], [1.0; 3]);
        let b = cube([0.0, 0.0, 1.5], [1.0, 1.0, 2.0]);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn touching_faces_count() {
        let a = cube([0.0; 3], [1.0; 3]);
        let b = cube([1.0, 0.0, 0.0], [2.0, 1.0, 1.0]);
        assert!(a.intersects(&b));
    }

    #[test]
    fn inverted_corners_rejected() {
        let err = Aabb::new(DVec3::ONE, DVec3::ZERO).unwrap_err();
        assert!(matches!(err, GeometryError::InvertedBounds { axis: 'x', .. }));
    }

    #[test]
    fn nan_rejected() {
        let err = Aabb::new(DVec3::new(f64::NAN, 0.0, 0.0), DVec3::ONE).unwrap_err();
        assert!(matches!(err, GeometryError::NonFinite { .. }));
    }

    #[test]
    fn at_recentres_without_resizing() {
        let a = Aabb::block_bounds().at(DVec3::new(10.0, 64.0, -3.0));
        assert_eq!(a.center(), DVec3::new(10.0, 64.0, -3.0));
        assert_eq!(a.half_extents(), DVec3::splat(0.5));
    }

    #[test]
    fn grow_expands_each_face() {
        let a = Aabb::block_bounds().grow(DVec3::splat(0.25)).unwrap();
        assert_eq!(a.min(), DVec3::splat(-0.25));
        assert_eq!(a.max(), DVec3::splat(1.25));
    }

    #[test]
    fn blocks_covers_every_touched_cell() {
        let a = cube([0.5, 0.5, 0.5], [1.5, 0.9, 0.9]);
        let cells: Vec<_> = a.blocks().collect();
        assert_eq!(cells, vec![BlockPos::new(0, 0, 0), BlockPos::new(1, 0, 0)]);
    }

    #[test]
    fn closest_point_clamps() {
        let a = cube([0.0; 3], [1.0; 3]);
        assert_eq!(a.distance_sq(DVec3::new(3.0, 0.5, 0.5)), 4.0);
        assert_eq!(a.distance_sq(DVec3::splat(0.5)), 0.0);
    }
}
