//! Game state
//!
//! The single aggregate every gameplay operation mutates. Owns the gate
//! tree, the dwell target registry, the pad roster, the sequencer and
//! director machines, and the per-stage RNG. Entity maps are BTreeMaps so
//! iteration order is deterministic.

use std::collections::BTreeMap;
use std::mem;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::DeterministicRng;
use crate::game::director::{DirectorConfig, DirectorState};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::pad::{NoteId, PadId, PadState};
use crate::game::sequencer::SequencerState;
use crate::gate::{GateEvent, GateKey, GateTree};
use crate::interact::{TargetId, TargetRegistry};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Pad presentation tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Shortest allowed pad cycle, seconds.
    pub min_play_duration: f32,
    /// Longest allowed pad cycle, seconds.
    pub max_play_duration: f32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            min_play_duration: 1.0,
            max_play_duration: 3.0,
        }
    }
}

/// Dwell interaction tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DwellConfig {
    /// Seconds of sustained aim required to complete a target.
    pub required: f32,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self { required: 1.0 }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GameConfig {
    /// Pad presentation tuning.
    pub sequence: SequenceConfig,
    /// Dwell interaction tuning.
    pub dwell: DwellConfig,
    /// Stage loop tuning.
    pub director: DirectorConfig,
}

/// Description of a pad to attach.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PadSpec {
    /// Note to fire when the pad plays.
    pub note: NoteId,
    /// World position, for spatial audio.
    pub position: Vec3,
    /// Requested cycle duration, clamped into the configured range.
    pub play_duration: f32,
}

impl Default for PadSpec {
    fn default() -> Self {
        Self {
            note: NoteId(0),
            position: Vec3::ZERO,
            play_duration: 1.0,
        }
    }
}

// =============================================================================
// STATE
// =============================================================================

/// The full gameplay state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameState {
    /// Control steps taken since construction; stamps every event.
    pub step: u64,
    /// Configuration the state was built with.
    pub config: GameConfig,
    /// Gate tree controlling which pads accept input.
    pub gates: GateTree,
    /// Dwell target registry.
    pub targets: TargetRegistry,
    /// Attached pads, keyed for deterministic iteration.
    pub pads: BTreeMap<PadId, PadState>,
    /// Sequence engine.
    pub sequencer: SequencerState,
    /// Stage loop.
    pub director: DirectorState,
    /// Per-stage deterministic RNG.
    pub rng: DeterministicRng,
    /// Events produced since the last drain.
    #[serde(skip)]
    pending_events: Vec<GameEvent>,
    pub(crate) next_pad_id: u32,
}

impl GameState {
    /// Build a fresh state. The sequencer gate starts open, so pads are
    /// unpowered until a recording session closes it.
    pub fn new(config: GameConfig, seed: u64) -> Self {
        let mut rng = DeterministicRng::new(seed);
        let mut gates = GateTree::new();
        let gate_key = GateKey(rng.next_u64());
        let gate = gates.insert(false, gate_key);
        let _ = gates.propagate_from(gate);
        Self {
            step: 0,
            config,
            gates,
            targets: TargetRegistry::new(),
            pads: BTreeMap::new(),
            sequencer: SequencerState::new(gate, gate_key),
            director: DirectorState::new(seed),
            rng,
            pending_events: Vec::new(),
            next_pad_id: 0,
        }
    }

    /// Record an event at the current step.
    pub fn push_event(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.step, data));
    }

    /// Record a batch of gate events at the current step.
    pub fn push_gate_events(&mut self, events: Vec<GateEvent>) {
        let step = self.step;
        self.pending_events
            .extend(events.into_iter().map(|e| GameEvent::new(step, GameEventData::Gate(e))));
    }

    /// Drain everything recorded since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        mem::take(&mut self.pending_events)
    }

    /// Look up the pad owning a dwell target.
    pub fn pad_by_target(&self, target: TargetId) -> Option<PadId> {
        self.pads
            .values()
            .find(|p| p.target == target)
            .map(|p| p.id)
    }
}

// =============================================================================
// TESTS
// =============================================================================
