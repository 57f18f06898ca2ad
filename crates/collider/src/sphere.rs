use glam::DVec3;

use crate::aabb::Aabb;
use crate::error::{GeometryError, finite, finite_scalar};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    center: DVec3,
    radius: f64,
}

impl Sphere {
    pub fn new(center: DVec3, radius: f64) -> Result<Self, GeometryError> {
        let center = finite(center, "sphere center")?;
        let radius = finite_scalar(radius, "sphere radius")?;
        if radius <= 0.0 {
            return Err(GeometryError::NonPositiveRadius(radius));
        }
        Ok(Self { center, radius })
    }

    /// A sphere around the origin, to be placed later with [`Sphere::at`].
    pub fn with_radius(radius: f64) -> Result<Self, GeometryError> {
        Self::new(DVec3::ZERO, radius)
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn at(&self, center: DVec3) -> Self {
        Self {
            center,
            radius: self.radius,
        }
    }

    pub fn contains(&self, point: DVec3) -> bool {
        self.center.distance_squared(point) <= self.radius * self.radius
    }

    pub fn intersects_sphere(&self, other: &Sphere) -> bool {
        let r = self.radius + other.radius;
        self.center.distance_squared(other.center) <= r * r
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        aabb.distance_sq(self.center) <= self.radius * self.radius
    }

    pub fn bounding_box(&self) -> Aabb {
        let r = DVec3::splat(self.radius);
        Aabb::from_corners_unchecked(self.center - r, self.center + r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_radius_rejected() {
        assert_eq!(
            Sphere::new(DVec3::ZERO, 0.0).unwrap_err(),
            GeometryError::NonPositiveRadius(0.0)
        );
    }

    #[test]
    fn infinite_radius_rejected() {
        assert!(matches!(
            Sphere::new(DVec3::ZERO, f64::INFINITY),
            Err(GeometryError::NonFinite { .. })
        ));
    }

    #[test]
    fn spheres_touching_intersect() {
        let a = Sphere::new(DVec3::ZERO, 1.0).unwrap();
        let b = Sphere::new(DVec3::new(2.0, 0.0, 0.0), 1.0).unwrap();
        assert!(a.intersects_sphere(&b));
        let c = b.at(DVec3::new(2.1, 0.0, 0.0));
        assert!(!a.intersects_sphere(&c));
    }

    #[test]
    fn sphere_near_box_corner() {
        let aabb = Aabb::block_bounds();
        // Distance from (1.5, 1.5, 1.5) to corner (1, 1, 1) is sqrt(0.75) ~ 0.866.
        let s = Sphere::new(DVec3::splat(1.5), 0.9).unwrap();
        assert!(s.intersects_aabb(&aabb));
        let s = s.at(DVec3::splat(1.6));
        assert!(!s.intersects_aabb(&aabb));
    }

    #[test]
    fn contains_is_inclusive() {
        let s = Sphere::new(DVec3::ZERO, 2.0).unwrap();
        assert!(s.contains(DVec3::new(0.0, 2.0, 0.0)));
        assert!(!s.contains(DVec3::new(0.0, 2.01, 0.0)));
    }
}
