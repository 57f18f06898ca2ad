use glam::DVec3;

use crate::aabb::Aabb;
use crate::disk::Disk;
use crate::obb::Obb;
use crate::ray::Ray;
use crate::sphere::Sphere;

/// Any collision volume an ability can own.
///
/// `Null` is a placeholder for "no shape yet": it never intersects and
/// contains nothing, so callers never need an `Option<Collider>`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Collider {
    #[default]
    Null,
    Aabb(Aabb),
    Obb(Obb),
    Sphere(Sphere),
    Disk(Disk),
    Ray(Ray),
}

impl Collider {
    /// Symmetric intersection test. Each unordered pair of variants is
    /// handled by exactly one arm, so `a.intersects(b) == b.intersects(a)`
    /// holds by construction.
    pub fn intersects(&self, other: &Collider) -> bool {
        use Collider as C;
        match (self, other) {
            (C::Null, _) | (_, C::Null) => false,
            (C::Disk(a), C::Disk(b)) => a.intersects_disk(b),
            (C::Disk(d), o) | (o, C::Disk(d)) => {
                C::Sphere(*d.sphere()).intersects(o) && C::Obb(*d.obb()).intersects(o)
            }
            (C::Aabb(a), C::Aabb(b)) => a.intersects(b),
            (C::Aabb(a), C::Sphere(s)) | (C::Sphere(s), C::Aabb(a)) => s.intersects_aabb(a),
            (C::Aabb(a), C::Obb(o)) | (C::Obb(o), C::Aabb(a)) => o.intersects_obb(&Obb::from(*a)),
            (C::Aabb(a), C::Ray(r)) | (C::Ray(r), C::Aabb(a)) => r.intersects_aabb(a),
            (C::Sphere(a), C::Sphere(b)) => a.intersects_sphere(b),
            (C::Sphere(s), C::Obb(o)) | (C::Obb(o), C::Sphere(s)) => o.intersects_sphere(s),
            (C::Sphere(s), C::Ray(r)) | (C::Ray(r), C::Sphere(s)) => r.intersects_sphere(s),
            (C::Obb(a), C::Obb(b)) => a.intersects_obb(b),
            (C::Obb(o), C::Ray(r)) | (C::Ray(r), C::Obb(o)) => r.intersects_obb(o),
            (C::Ray(a), C::Ray(b)) => a.intersects_ray(b),
        }
    }

    pub fn contains(&self, point: DVec3) -> bool {
        match self {
            Self::Null => false,
            Self::Aabb(a) => a.contains(point),
            Self::Obb(o) => o.contains(point),
            Self::Sphere(s) => s.contains(point),
            Self::Disk(d) => d.contains(point),
            Self::Ray(r) => r.contains(point),
        }
    }

    /// Re-anchor: centres move to `position` (rays move their origin).
    /// Size and orientation are untouched.
    pub fn at(&self, position: DVec3) -> Collider {
        match self {
            Self::Null => Self::Null,
            Self::Aabb(a) => Self::Aabb(a.at(position)),
            Self::Obb(o) => Self::Obb(o.at(position)),
            Self::Sphere(s) => Self::Sphere(s.at(position)),
            Self::Disk(d) => Self::Disk(d.at(position)),
            Self::Ray(r) => Self::Ray(r.at(position)),
        }
    }

    /// Centre of the shape; ray origin for rays. `None` for `Null`.
    pub fn position(&self) -> Option<DVec3> {
        match self {
            Self::Null => None,
            Self::Aabb(a) => Some(a.center()),
            Self::Obb(o) => Some(o.center()),
            Self::Sphere(s) => Some(s.center()),
            Self::Disk(d) => Some(d.center()),
            Self::Ray(r) => Some(r.origin()),
        }
    }

    /// Axis-aligned region enclosing the shape, used as a broad phase.
    pub fn bounding_box(&self) -> Option<Aabb> {
        match self {
            Self::Null => None,
            Self::Aabb(a) => Some(*a),
            Self::Obb(o) => Some(o.bounding_box()),
            Self::Sphere(s) => Some(s.bounding_box()),
            Self::Disk(d) => Some(d.bounding_box()),
            Self::Ray(r) => Some(r.bounding_box()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Aabb(_) => "aabb",
            Self::Obb(_) => "obb",
            Self::Sphere(_) => "sphere",
            Self::Disk(_) => "disk",
            Self::Ray(_) => "ray",
        }
    }
}

impl From<Aabb> for Collider {
    fn from(v: Aabb) -> Self {
        Self::Aabb(v)
    }
}

impl From<Obb> for Collider {
    fn from(v: Obb) -> Self {
        Self::Obb(v)
    }
}

impl From<Sphere> for Collider {
    fn from(v: Sphere) -> Self {
        Self::Sphere(v)
    }
}

impl From<Disk> for Collider {
    fn from(v: Disk) -> Self {
        Self::Disk(v)
    }
}

impl From<Ray> for Collider {
    fn from(v: Ray) -> Self {
        Self::Ray(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DQuat;
    use std::f64::consts::FRAC_PI_4;

    fn aabb(min: [f64; 3], max: [f64; 3]) -> Collider {
        Aabb::new(DVec3::from_array(min), DVec3::from_array(max))
            .unwrap()
            .into()
    }

    fn sphere(c: [f64; 3], r: f64) -> Collider {
        Sphere::new(DVec3::from_array(c), r).unwrap().into()
    }

    fn obb(c: [f64; 3], e: [f64; 3], rot: DQuat) -> Collider {
        Obb::new(DVec3::from_array(c), DVec3::from_array(e), rot)
            .unwrap()
            .into()
    }

    fn disk(c: [f64; 3], r: f64, rot: DQuat) -> Collider {
        let o = Obb::new(DVec3::from_array(c), DVec3::new(r, r, 0.1), rot).unwrap();
        Disk::new(o, Sphere::with_radius(r).unwrap()).into()
    }

    fn ray(o: [f64; 3], d: [f64; 3]) -> Collider {
        Ray::new(DVec3::from_array(o), DVec3::from_array(d))
            .unwrap()
            .into()
    }

    /// A spread of shapes of every variant, some overlapping, some not.
    fn zoo() -> Vec<Collider> {
        let tilt = DQuat::from_rotation_y(FRAC_PI_4);
        vec![
            Collider::Null,
            aabb([0.0; 3], [1.0; 3]),
            aabb([0.5; 3], [2.0; 3]),
            aabb([5.0; 3], [6.0; 3]),
            aabb([-3.0, 0.0, 0.0], [-2.0, 4.0, 1.0]),
            sphere([0.0; 3], 1.0),
            sphere([3.0, 0.0, 0.0], 0.5),
            sphere([5.5; 3], 2.0),
            obb([1.0, 0.5, 0.5], [0.5, 0.5, 0.5], tilt),
            obb([4.0, 4.0, 4.0], [2.0, 0.2, 0.2], DQuat::from_rotation_z(0.7)),
            obb([-2.5, 2.0, 0.5], [0.3, 3.0, 0.3], DQuat::from_rotation_x(0.2)),
            disk([0.0, 0.0, 0.0], 2.0, DQuat::IDENTITY),
            disk([3.0, 1.0, 0.0], 1.5, tilt),
            ray([-5.0, 0.5, 0.5], [20.0, 0.0, 0.0]),
            ray([3.0, -2.0, 0.0], [0.0, 4.0, 0.0]),
            ray([0.0, 10.0, 0.0], [0.0, 1.0, 0.0]),
        ]
    }

    #[test]
    fn intersection_is_symmetric_for_every_pair() {
        let shapes = zoo();
        for (i, a) in shapes.iter().enumerate() {
            for (j, b) in shapes.iter().enumerate() {
                assert_eq!(
                    a.intersects(b),
                    b.intersects(a),
                    "asymmetric: #{i} {} vs #{j} {}",
                    a.kind(),
                    b.kind()
                );
            }
        }
    }

    #[test]
    fn zoo_has_hits_and_misses() {
        let shapes = zoo();
        let mut hits = 0;
        let mut misses = 0;
        for a in &shapes {
            for b in &shapes {
                if a.intersects(b) {
                    hits += 1;
                } else {
                    misses += 1;
                }
            }
        }
        assert!(hits > shapes.len());
        assert!(misses > shapes.len());
    }

    #[test]
    fn null_never_intersects_or_contains() {
        for shape in zoo() {
            assert!(!Collider::Null.intersects(&shape));
            assert!(!shape.intersects(&Collider::Null));
        }
        assert!(!Collider::Null.contains(DVec3::ZERO));
        assert!(Collider::Null.bounding_box().is_none());
        assert!(Collider::default().is_null());
    }

    #[test]
    fn box_scenarios() {
        let unit = aabb([0.0; 3], [1.0; 3]);
        assert!(unit.intersects(&aabb([0.5; 3], [2.0; 3])));
        assert!(!unit.intersects(&aabb([5.0; 3], [6.0; 3])));
    }

    #[test]
    fn every_shape_contains_its_centre_and_not_far_points() {
        for shape in zoo().into_iter().filter(|s| !s.is_null()) {
            let centre = shape.position().unwrap();
            if !matches!(shape, Collider::Ray(_)) {
                assert!(shape.contains(centre), "{} misses its centre", shape.kind());
            }
            let bb = shape.bounding_box().unwrap();
            let far = bb.max() + DVec3::splat(10.0);
            assert!(!shape.contains(far), "{} contains a far point", shape.kind());
        }
    }

    #[test]
    fn ray_contains_its_origin() {
        let r = ray([1.0, 2.0, 3.0], [0.0, 0.0, 5.0]);
        assert!(r.contains(DVec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn at_preserves_geometry() {
        let target = DVec3::new(100.0, 70.0, -40.0);
        for shape in zoo().into_iter().filter(|s| !s.is_null()) {
            let moved = shape.at(target);
            assert_eq!(moved.position(), Some(target));
            let before = shape.bounding_box().unwrap();
            let after = moved.bounding_box().unwrap();
            let d = (before.max() - before.min()) - (after.max() - after.min());
            assert!(d.length() < 1e-9, "{} changed size when moved", shape.kind());
        }
    }

    #[test]
    fn disk_needs_both_parts_to_hit() {
        let d = disk([0.0; 3], 2.0, DQuat::IDENTITY);
        // Corner region of the thin box, outside the sphere.
        assert!(!d.intersects(&sphere([1.9, 1.9, 0.0], 0.1)));
        // Inside the sphere but off the thin face.
        assert!(!d.intersects(&sphere([0.0, 0.0, 1.0], 0.5)));
        assert!(d.intersects(&sphere([0.0, 0.0, 0.5], 0.5)));
    }

    #[test]
    fn aabb_against_tilted_obb() {
        let o = obb([1.6, 0.5, 0.5], [0.5, 0.5, 0.5], DQuat::from_rotation_y(FRAC_PI_4));
        // Tilted cube reaches 0.707 towards -x, so 0.893 < 1.0: overlap.
        assert!(o.intersects(&aabb([0.0; 3], [1.0; 3])));
        let far = o.at(DVec3::new(1.8, 0.5, 0.5));
        assert!(!far.intersects(&aabb([0.0; 3], [1.0; 3])));
    }

    #[test]
    fn ray_hits_box_it_passes_through() {
        let r = ray([-5.0, 0.5, 0.5], [20.0, 0.0, 0.0]);
        assert!(r.intersects(&aabb([0.0; 3], [1.0; 3])));
        assert!(!r.intersects(&aabb([0.0, 2.0, 0.0], [1.0, 3.0, 1.0])));
    }
}
