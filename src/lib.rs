//! # Echo Pads
//!
//! Deterministic gameplay core for a memory-sequence game played with
//! dwell-based aiming: the machine demonstrates a growing sequence of
//! lit pads, and the player reproduces it by holding their aim on each
//! pad in turn.
//!
//! ## Architecture
//!
//! ```text
//!             +--------------------------+
//!             |        step driver       |  one call per control step
//!             +-----+--------+------+----+
//!                   |        |      |
//!         +---------v--+  +--v---+  +v---------+
//!         |   dwell    |  | pads |  | director |
//!         |  session   |  |      |  | (stages) |
//!         +---------+--+  +--+---+  +----+-----+
//!                   |        |           |
//!              +----v--------v----+  +---v-------+
//!              |    gate tree     |  | sequencer |
//!              | (input gating)   |  |           |
//!              +------------------+  +-----------+
//! ```
//!
//! The interaction layer negotiates one-to-one dwell sessions over ray
//! hits and reports completions. Completions become pad presses, which
//! pass through the gate tree before reaching the sequencer's matcher.
//! The director runs the stage loop on top, reseeding the RNG per stage
//! so a failed stage replays the identical sequence.
//!
//! All mutation happens through free functions over [`game::GameState`];
//! every observable change is surfaced as a [`game::GameEvent`] drained
//! from the step driver.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod gate;
pub mod interact;
pub mod services;

pub use game::{
    step, GameConfig, GameEvent, GameEventData, GameState, PadId, PadSpec, RecordOutcome,
};
pub use gate::{GateEvent, GateId, GateTree};
pub use interact::{DwellSession, Ray, SessionId, TargetDetector, TargetId};
pub use services::Services;

/// Library version, from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
