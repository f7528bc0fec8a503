//! Deterministic primitives.
//!
//! Everything in this module is free of system time, global state, and
//! platform-dependent behavior.

pub mod rng;

pub use rng::{derive_stage_seed, DeterministicRng};
