//! Dwell-based interaction negotiation.

pub mod detect;
pub mod dwell;

pub use detect::{Ray, RayHit, TargetDetector, TargetId};
pub use dwell::{DwellEvent, DwellSession, DwellTarget, SessionId, TargetRegistry};
