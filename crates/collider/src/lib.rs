//! Collider geometry for abilities.
//!
//! Shapes are immutable values in world coordinates. Constructors validate
//! their input and return [`GeometryError`] instead of producing shapes that
//! would poison every later test with NaN.
//!
//! # Invariants
//! - `a.intersects(b) == b.intersects(a)` for every pair of colliders.
//! - [`Collider::Null`] intersects nothing and contains nothing.
//! - `at(p)` moves a shape without changing its size or orientation.

mod aabb;
mod collider;
mod disk;
mod error;
mod obb;
mod ray;
mod sphere;

pub use aabb::Aabb;
pub use collider::Collider;
pub use disk::Disk;
pub use error::GeometryError;
pub use obb::Obb;
pub use ray::{RAY_TOLERANCE, Ray};
pub use sphere::Sphere;
