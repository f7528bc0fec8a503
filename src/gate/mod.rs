//! Hierarchical interaction gating.

pub mod tree;

pub use tree::{GateError, GateEvent, GateId, GateKey, GateTree};
