use glam::DVec3;

use crate::aabb::Aabb;
use crate::error::{GeometryError, finite, finite_scalar};
use crate::obb::Obb;
use crate::sphere::Sphere;

/// How close a point must be to the segment to count as lying on it.
pub const RAY_TOLERANCE: f64 = 1e-6;

/// Finite ray: the segment from `origin` to `origin + direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    origin: DVec3,
    direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Result<Self, GeometryError> {
        let origin = finite(origin, "ray origin")?;
        let direction = finite(direction, "ray direction")?;
        if direction.length_squared() <= f64::EPSILON {
            return Err(GeometryError::ZeroLengthRay);
        }
        Ok(Self { origin, direction })
    }

    /// A ray of `range` length along `direction` (any non-zero length).
    pub fn towards(origin: DVec3, direction: DVec3, range: f64) -> Result<Self, GeometryError> {
        let range = finite_scalar(range, "ray range")?;
        let dir = direction.try_normalize().ok_or(GeometryError::ZeroLengthRay)?;
        Self::new(origin, dir * range)
    }

    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    pub fn direction(&self) -> DVec3 {
        self.direction
    }

    pub fn end(&self) -> DVec3 {
        self.origin + self.direction
    }

    pub fn length(&self) -> f64 {
        self.direction.length()
    }

    pub fn at(&self, origin: DVec3) -> Self {
        Self { origin, ..*self }
    }

    pub fn closest_point(&self, point: DVec3) -> DVec3 {
        let t = (point - self.origin).dot(self.direction) / self.direction.length_squared();
        self.origin + self.direction * t.clamp(0.0, 1.0)
    }

    pub fn distance_sq(&self, point: DVec3) -> f64 {
        self.closest_point(point).distance_squared(point)
    }

    pub fn contains(&self, point: DVec3) -> bool {
        self.distance_sq(point) <= RAY_TOLERANCE * RAY_TOLERANCE
    }

    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        let r = sphere.radius();
        self.distance_sq(sphere.center()) <= r * r
    }

    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        slab_test(self.origin, self.direction, aabb.min(), aabb.max())
    }

    pub fn intersects_obb(&self, obb: &Obb) -> bool {
        let e = obb.half_extents();
        slab_test(
            obb.to_local(self.origin),
            obb.to_local_dir(self.direction),
            -e,
            e,
        )
    }

    /// Closest approach of two segments within [`RAY_TOLERANCE`].
    pub fn intersects_ray(&self, other: &Ray) -> bool {
        segment_distance_sq(self.origin, self.direction, other.origin, other.direction)
            <= RAY_TOLERANCE * RAY_TOLERANCE
    }

    pub fn bounding_box(&self) -> Aabb {
        let end = self.end();
        Aabb::from_corners_unchecked(self.origin.min(end), self.origin.max(end))
    }
}

/// Segment `origin + t * dir` for `t` in `[0, 1]` against the box `[min, max]`.
fn slab_test(origin: DVec3, dir: DVec3, min: DVec3, max: DVec3) -> bool {
    let mut t_min = 0.0f64;
    let mut t_max = 1.0f64;
    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() < f64::EPSILON {
            if o < min[axis] || o > max[axis] {
                return false;
            }
            continue;
        }
        let inv = 1.0 / d;
        let mut t1 = (min[axis] - o) * inv;
        let mut t2 = (max[axis] - o) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        t_min = t_min.max(t1);
        t_max = t_max.min(t2);
        if t_min > t_max {
            return false;
        }
    }
    true
}

/// Squared distance between the closest points of two non-degenerate segments.
fn segment_distance_sq(p1: DVec3, d1: DVec3, p2: DVec3, d2: DVec3) -> f64 {
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);
    let c = d1.dot(r);
    let b = d1.dot(d2);
    let denom = a * e - b * b;

    let mut s = if denom > f64::EPSILON {
        ((b * f - c * e) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut t = (b * s + f) / e;
    if t < 0.0 {
        t = 0.0;
        s = (-c / a).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / a).clamp(0.0, 1.0);
    }

    (p1 + d1 * s).distance_squared(p2 + d2 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DQuat;

    fn ray(o: [f64; 3], d: [f64; 3]) -> Ray {
        Ray::new(DVec3::from_array(o), DVec3::from_array(d)).unwrap()
    }

    #[test]
    fn zero_direction_rejected() {
        assert_eq!(
            Ray::new(DVec3::ZERO, DVec3::ZERO).unwrap_err(),
            GeometryError::ZeroLengthRay
        );
        assert!(Ray::towards(DVec3::ZERO, DVec3::ZERO, 5.0).is_err());
    }

    #[test]
    fn towards_scales_to_range() {
        let r = Ray::towards(DVec3::ZERO, DVec3::new(0.0, 0.0, 3.0), 10.0).unwrap();
        assert!((r.length() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn segment_stops_short_of_box() {
        let aabb = Aabb::new(DVec3::new(5.0, -1.0, -1.0), DVec3::new(6.0, 1.0, 1.0)).unwrap();
        assert!(!ray([0.0; 3], [4.0, 0.0, 0.0]).intersects_aabb(&aabb));
        assert!(ray([0.0; 3], [5.5, 0.0, 0.0]).intersects_aabb(&aabb));
    }

    #[test]
    fn axis_parallel_ray_outside_slab_misses() {
        let aabb = Aabb::block_bounds();
        assert!(!ray([-1.0, 2.0, 0.5], [3.0, 0.0, 0.0]).intersects_aabb(&aabb));
        assert!(ray([-1.0, 0.5, 0.5], [3.0, 0.0, 0.0]).intersects_aabb(&aabb));
    }

    #[test]
    fn ray_against_rotated_box() {
        let obb = Obb::new(
            DVec3::new(5.0, 0.0, 0.0),
            DVec3::new(0.1, 2.0, 2.0),
            DQuat::from_rotation_y(0.3),
        )
        .unwrap();
        assert!(ray([0.0; 3], [10.0, 0.0, 0.0]).intersects_obb(&obb));
        assert!(!ray([0.0, 5.0, 0.0], [10.0, 0.0, 0.0]).intersects_obb(&obb));
    }

    #[test]
    fn ray_grazing_sphere() {
        let s = Sphere::new(DVec3::new(5.0, 1.0, 0.0), 1.0).unwrap();
        assert!(ray([0.0; 3], [10.0, 0.0, 0.0]).intersects_sphere(&s));
        assert!(!ray([0.0, -0.5, 0.0], [10.0, 0.0, 0.0]).intersects_sphere(&s));
    }

    #[test]
    fn crossing_rays_meet() {
        let a = ray([-1.0, 0.0, 0.0], [2.0, 0.0, 0.0]);
        let b = ray([0.0, -1.0, 0.0], [0.0, 2.0, 0.0]);
        assert!(a.intersects_ray(&b));
        assert!(b.intersects_ray(&a));
        let c = ray([0.0, -1.0, 0.5], [0.0, 2.0, 0.0]);
        assert!(!a.intersects_ray(&c));
    }

    #[test]
    fn parallel_rays_do_not_meet() {
        let a = ray([0.0; 3], [1.0, 0.0, 0.0]);
        let b = ray([0.0, 0.1, 0.0], [1.0, 0.0, 0.0]);
        assert!(!a.intersects_ray(&b));
    }

    #[test]
    fn contains_points_on_segment_only() {
        let r = ray([0.0; 3], [2.0, 0.0, 0.0]);
        assert!(r.contains(DVec3::new(1.0, 0.0, 0.0)));
        assert!(!r.contains(DVec3::new(3.0, 0.0, 0.0)));
    }
}
