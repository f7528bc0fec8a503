//! Target Detection Boundary
//!
//! The core never performs raycast or physics hit-testing itself. A
//! [`TargetDetector`] strategy is injected per dwell session and asked once
//! per control step for at most one candidate target.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Stable handle to an interactive target in the dwell registry.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u32);

/// A gaze/pointer ray, in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    /// Ray origin.
    pub origin: Vec3,
    /// Ray direction (not required to be normalized; the detector decides).
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray.
    pub const fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }
}

/// A detected candidate target.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    /// The candidate target.
    pub target: TargetId,
    /// Hit distance along the ray. Exposed for downstream visual feedback
    /// (reticle scaling); carries no gating semantics.
    pub distance: f32,
}

/// Detection strategy: turn a ray into at most one candidate target.
///
/// Chosen per session instantiation; swapping strategies (head gaze versus
/// controller ray) never requires a different session type.
pub trait TargetDetector {
    /// Detect the current candidate, if any.
    fn detect(&mut self, ray: Ray) -> Option<RayHit>;
}
