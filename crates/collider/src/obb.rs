use glam::{DMat3, DQuat, DVec3};

use crate::aabb::Aabb;
use crate::error::{GeometryError, finite};
use crate::sphere::Sphere;

/// Added to the absolute rotation terms so near-parallel edge pairs, whose
/// cross product is close to zero, cannot produce a false separating axis.
const PARALLEL_EPSILON: f64 = 1e-9;

/// Oriented box: centre, half extents along its local axes, and the local
/// axes as the columns of an orthonormal matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    center: DVec3,
    half_extents: DVec3,
    axes: DMat3,
}

impl Obb {
    pub fn new(center: DVec3, half_extents: DVec3, rotation: DQuat) -> Result<Self, GeometryError> {
        let center = finite(center, "obb center")?;
        let half_extents = finite(half_extents, "obb half extents")?;
        if let Some(e) = half_extents.to_array().into_iter().find(|e| *e < 0.0) {
            return Err(GeometryError::NegativeExtent(e));
        }
        let len_sq = rotation.length_squared();
        if !len_sq.is_finite() || len_sq < 1e-12 {
            return Err(GeometryError::DegenerateRotation);
        }
        Ok(Self {
            center,
            half_extents,
            axes: DMat3::from_quat(rotation.normalize()),
        })
    }

    /// Rotate a box about the origin. A box centred on the origin keeps its
    /// centre; an off-centre box swings around with the rotation.
    pub fn from_aabb(aabb: &Aabb, rotation: DQuat) -> Result<Self, GeometryError> {
        let len_sq = rotation.length_squared();
        if !len_sq.is_finite() || len_sq < 1e-12 {
            return Err(GeometryError::DegenerateRotation);
        }
        let rotation = rotation.normalize();
        Ok(Self {
            center: rotation * aabb.center(),
            half_extents: aabb.half_extents(),
            axes: DMat3::from_quat(rotation),
        })
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    pub fn half_extents(&self) -> DVec3 {
        self.half_extents
    }

    /// Local axis `i` (0..3) in world space.
    pub fn axis(&self, i: usize) -> DVec3 {
        self.axes.col(i)
    }

    pub fn at(&self, center: DVec3) -> Self {
        Self { center, ..*self }
    }

    /// World point expressed in the box's local frame.
    pub fn to_local(&self, point: DVec3) -> DVec3 {
        self.axes.transpose() * (point - self.center)
    }

    /// Direction expressed in the box's local frame.
    pub fn to_local_dir(&self, dir: DVec3) -> DVec3 {
        self.axes.transpose() * dir
    }

    pub fn contains(&self, point: DVec3) -> bool {
        self.to_local(point).abs().cmple(self.half_extents).all()
    }

    pub fn closest_point(&self, point: DVec3) -> DVec3 {
        let local = self.to_local(point).clamp(-self.half_extents, self.half_extents);
        self.center + self.axes * local
    }

    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        let c = sphere.center();
        let r = sphere.radius();
        self.closest_point(c).distance_squared(c) <= r * r
    }

    /// Separating-axis test over the three face normals of each box and the
    /// nine pairwise edge cross products.
    pub fn intersects_obb(&self, other: &Obb) -> bool {
        let a = self.half_extents.to_array();
        let b = other.half_extents.to_array();

        let mut r = [[0.0f64; 3]; 3];
        let mut abs_r = [[0.0f64; 3]; 3];
        for (i, (row, abs_row)) in r.iter_mut().zip(abs_r.iter_mut()).enumerate() {
            for j in 0..3 {
                row[j] = self.axis(i).dot(other.axis(j));
                abs_row[j] = row[j].abs() + PARALLEL_EPSILON;
            }
        }

        let d = other.center - self.center;
        let t = [d.dot(self.axis(0)), d.dot(self.axis(1)), d.dot(self.axis(2))];

        for i in 0..3 {
            let ra = a[i];
            let rb = b[0] * abs_r[i][0] + b[1] * abs_r[i][1] + b[2] * abs_r[i][2];
            if t[i].abs() > ra + rb {
                return false;
            }
        }

        for j in 0..3 {
            let ra = a[0] * abs_r[0][j] + a[1] * abs_r[1][j] + a[2] * abs_r[2][j];
            let rb = b[j];
            let dist = t[0] * r[0][j] + t[1] * r[1][j] + t[2] * r[2][j];
            if dist.abs() > ra + rb {
                return false;
            }
        }

        // Edge axes A_i x B_j. Indices (i1, i2) and (j1, j2) are the two
        // axes other than i and j respectively.
        for i in 0..3 {
            let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
            for j in 0..3 {
                let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
                let ra = a[i1] * abs_r[i2][j] + a[i2] * abs_r[i1][j];
                let rb = b[j1] * abs_r[i][j2] + b[j2] * abs_r[i][j1];
                let dist = t[i2] * r[i1][j] - t[i1] * r[i2][j];
                if dist.abs() > ra + rb {
                    return false;
                }
            }
        }

        true
    }

    pub fn bounding_box(&self) -> Aabb {
        let e = self.half_extents;
        let half = self.axis(0).abs() * e.x + self.axis(1).abs() * e.y + self.axis(2).abs() * e.z;
        Aabb::from_corners_unchecked(self.center - half, self.center + half)
    }
}

impl From<Aabb> for Obb {
    fn from(aabb: Aabb) -> Self {
        Self {
            center: aabb.center(),
            half_extents: aabb.half_extents(),
            axes: DMat3::IDENTITY,
        }
    }
}
