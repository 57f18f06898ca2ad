use glam::DVec3;

/// Construction-time rejection of a degenerate or non-finite shape.
///
/// Fatal to the construction that produced it: callers must not fall back to
/// a partially built collider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("{what} is not finite")]
    NonFinite { what: &'static str },
    #[error("inverted bounds on {axis} axis: min {min} > max {max}")]
    InvertedBounds { axis: char, min: f64, max: f64 },
    #[error("radius must be positive, got {0}")]
    NonPositiveRadius(f64),
    #[error("half extent must not be negative, got {0}")]
    NegativeExtent(f64),
    #[error("ray direction has zero length")]
    ZeroLengthRay,
    #[error("rotation is degenerate")]
    DegenerateRotation,
}

pub(crate) fn finite(v: DVec3, what: &'static str) -> Result<DVec3, GeometryError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(GeometryError::NonFinite { what })
    }
}

pub(crate) fn finite_scalar(v: f64, what: &'static str) -> Result<f64, GeometryError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(GeometryError::NonFinite { what })
    }
}
