use glam::DVec3;

use crate::aabb::Aabb;
use crate::obb::Obb;
use crate::sphere::Sphere;

/// A flat round shield: a thin oriented box clipped by a bounding sphere.
///
/// A shape hits the disk only if it hits both parts, which rounds off the
/// corners of the box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disk {
    obb: Obb,
    sphere: Sphere,
}

impl Disk {
    /// The sphere is re-centred on the box so both parts always share a centre.
    pub fn new(obb: Obb, sphere: Sphere) -> Self {
        Self {
            sphere: sphere.at(obb.center()),
            obb,
        }
    }

    pub fn obb(&self) -> &Obb {
        &self.obb
    }

    pub fn sphere(&self) -> &Sphere {
        &self.sphere
    }

    pub fn center(&self) -> DVec3 {
        self.obb.center()
    }

    pub fn at(&self, center: DVec3) -> Self {
        Self {
            obb: self.obb.at(center),
            sphere: self.sphere.at(center),
        }
    }

    pub fn contains(&self, point: DVec3) -> bool {
        self.obb.contains(point) && self.sphere.contains(point)
    }

    pub fn intersects_disk(&self, other: &Disk) -> bool {
        self.sphere.intersects_sphere(&other.sphere) && self.obb.intersects_obb(&other.obb)
    }

    pub fn bounding_box(&self) -> Aabb {
        let a = self.obb.bounding_box();
        let b = self.sphere.bounding_box();
        // Both boxes share a centre, so the intersection is the tighter one.
        Aabb::from_corners_unchecked(a.min().max(b.min()), a.max().min(b.max()))
    }
}
