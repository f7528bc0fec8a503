//! Sequence engine
//!
//! Owns the pad roster and the memory sequence, and drives the two halves
//! of a round: playback (the machine demonstrates the sequence) and
//! recording (the player reproduces it). Recording a session closes the
//! sequencer gate, powering the pad gates beneath it; resolving the
//! session opens it again, cutting input off.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::game::events::GameEventData;
use crate::game::pad::{self, PadId, PadState};
use crate::game::state::{GameState, PadSpec};
use crate::gate::{GateId, GateKey};
use crate::services::Services;

// =============================================================================
// TYPES
// =============================================================================

/// Errors from sequencer operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    /// No pads are attached, so no sequence can be drawn.
    #[error("cannot generate a sequence with no pads attached")]
    EmptyDomain,
    /// A sequence index does not map to an attached pad.
    #[error("sequence index {0} out of range for the attached pads")]
    IndexOutOfRange(u32),
}

/// How a recording session ended. `Incomplete` while one is still running
/// (or before any has run).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOutcome {
    /// No verdict yet.
    Incomplete,
    /// The player reproduced the whole sequence.
    Correct,
    /// The player pressed a pad out of order.
    Wrong,
}

/// Playback cursor over the sequence during the demonstration phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackRun {
    /// Not demonstrating.
    Idle,
    /// Demonstrating, at the given sequence position.
    Playing {
        /// Position in the sequence being shown.
        index: usize,
        /// Whether the pad at `index` has been triggered yet.
        started: bool,
    },
}

/// Sequencer state: the sequence itself plus the recording/playback machines.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SequencerState {
    /// The sequencer's gate node, parent of every pad gate.
    pub(crate) gate: GateId,
    /// Key authorizing operations on the sequencer gate.
    pub(crate) gate_key: GateKey,
    sequence: Vec<PadId>,
    cursor: usize,
    recording: bool,
    outcome: RecordOutcome,
    playback: PlaybackRun,
}

impl SequencerState {
    pub(crate) fn new(gate: GateId, gate_key: GateKey) -> Self {
        Self {
            gate,
            gate_key,
            sequence: Vec::new(),
            cursor: 0,
            recording: false,
            outcome: RecordOutcome::Incomplete,
            playback: PlaybackRun::Idle,
        }
    }

    /// The current sequence.
    #[inline]
    pub fn sequence(&self) -> &[PadId] {
        &self.sequence
    }

    /// Position of the next expected press within the sequence.
    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Is a recording session running?
    #[inline]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Verdict of the most recent recording session.
    #[inline]
    pub fn outcome(&self) -> RecordOutcome {
        self.outcome
    }

    /// Is the demonstration playback running?
    #[inline]
    pub fn is_playing_back(&self) -> bool {
        !matches!(self.playback, PlaybackRun::Idle)
    }
}

// =============================================================================
// PAD ROSTER
// =============================================================================

/// Attach a new pad to the sequencer.
///
/// Creates the pad's gate node under the sequencer gate and registers its
/// dwell target. A failed gate attachment is logged and tolerated; the pad
/// still joins the roster, so attachment itself cannot fail.
pub fn attach_pad(state: &mut GameState, spec: PadSpec) -> PadId {
    let id = PadId(state.next_pad_id);
    state.next_pad_id += 1;

    let gate_key = GateKey(state.rng.next_u64());
    let gate = state.gates.insert(true, gate_key);
    match state.gates.attach(state.sequencer.gate, gate) {
        Ok(events) => state.push_gate_events(events),
        Err(err) => {
            error!(?id, %err, "pad gate attachment failed, pad joins unparented");
        }
    }

    let target = state.targets.insert(state.config.dwell.required);

    let play_duration = spec.play_duration.clamp(
        state.config.sequence.min_play_duration,
        state.config.sequence.max_play_duration,
    );
    state.pads.insert(
        id,
        PadState {
            id,
            note: spec.note,
            position: spec.position,
            play_duration,
            playback: pad::PadPlayback::Idle,
            gate,
            gate_key,
            target,
        },
    );
    debug!(?id, ?gate, ?target, "pad attached");
    id
}

/// Detach a pad, scrubbing it from the sequence and adjusting the cursors.
///
/// Occurrences ahead of the cursor shift it back so the remaining entries
/// stay aligned. Detaching the pad the player was expected to press next
/// resolves the running recording session as `Wrong`.
pub fn detach_pad(state: &mut GameState, id: PadId) {
    let Some(pad) = state.pads.remove(&id) else {
        debug!(?id, "detach of unknown pad ignored");
        return;
    };
    let events = state.gates.remove(pad.gate);
    state.push_gate_events(events);
    state.targets.remove(pad.target);

    let was_expected =
        state.sequencer.recording && state.sequencer.sequence.get(state.sequencer.cursor) == Some(&id);

    let before_cursor = state.sequencer.sequence[..state.sequencer.cursor]
        .iter()
        .filter(|p| **p == id)
        .count();
    state.sequencer.cursor -= before_cursor;

    if let PlaybackRun::Playing { index, started } = state.sequencer.playback {
        let capped = index.min(state.sequencer.sequence.len());
        let before_index = state.sequencer.sequence[..capped]
            .iter()
            .filter(|p| **p == id)
            .count();
        let at_index = state.sequencer.sequence.get(index) == Some(&id);
        state.sequencer.playback = PlaybackRun::Playing {
            index: index - before_index,
            started: started && !at_index,
        };
    }

    state.sequencer.sequence.retain(|p| *p != id);
    debug!(?id, "pad detached");

    if was_expected {
        info!(?id, "expected pad detached mid-recording");
        resolve(state, RecordOutcome::Wrong);
    }
}

// =============================================================================
// SEQUENCE GENERATION
// =============================================================================

/// Draw a fresh sequence of `count` entries from the attached pads.
pub fn generate(state: &mut GameState, count: usize) -> Result<(), SequenceError> {
    let domain = state.pads.len() as u32;
    if domain == 0 {
        error!("sequence generation with no pads attached");
        state.sequencer.sequence.clear();
        return Err(SequenceError::EmptyDomain);
    }
    let indices: Vec<u32> = (0..count).map(|_| state.rng.next_int(domain)).collect();
    generate_from_indices(state, &indices)
}

/// Build the sequence from explicit indices into the pad roster, ordered
/// by pad id. `generate` delegates here after drawing its indices.
pub fn generate_from_indices(state: &mut GameState, indices: &[u32]) -> Result<(), SequenceError> {
    let roster: Vec<PadId> = state.pads.keys().copied().collect();
    if roster.is_empty() {
        return Err(SequenceError::EmptyDomain);
    }
    let mut sequence = Vec::with_capacity(indices.len());
    for &i in indices {
        let pad = roster
            .get(i as usize)
            .copied()
            .ok_or(SequenceError::IndexOutOfRange(i))?;
        sequence.push(pad);
    }
    state.sequencer.sequence = sequence;
    state.sequencer.cursor = 0;
    state.sequencer.outcome = RecordOutcome::Incomplete;
    let len = state.sequencer.sequence.len();
    info!(len, "sequence generated");
    state.push_event(GameEventData::SequenceGenerated { len });
    Ok(())
}

// =============================================================================
// PLAYBACK
// =============================================================================

/// Begin demonstrating the current sequence from the start.
pub fn play(state: &mut GameState) {
    state.sequencer.playback = PlaybackRun::Playing {
        index: 0,
        started: false,
    };
}

/// Advance the sequencer's ongoing work by one control step.
///
/// Steps the demonstration playback (one pad at a time, waiting for each
/// pad's cycle to finish before triggering the next) and resolves a
/// recording session whose sequence has been fully consumed, which
/// includes the degenerate zero-length sequence.
pub fn poll(state: &mut GameState, services: &mut Services) {
    if let PlaybackRun::Playing { index, started } = state.sequencer.playback {
        step_playback(state, index, started, services);
    }

    if state.sequencer.recording && state.sequencer.cursor >= state.sequencer.sequence.len() {
        resolve(state, RecordOutcome::Correct);
    }
}

fn step_playback(state: &mut GameState, index: usize, started: bool, services: &mut Services) {
    let Some(&pad_id) = state.sequencer.sequence.get(index) else {
        state.sequencer.playback = PlaybackRun::Idle;
        info!("sequence playback finished");
        state.push_event(GameEventData::SequencePlaybackFinished);
        return;
    };
    let Some(pad) = state.pads.get(&pad_id) else {
        // Scrubbed between polls; move along.
        state.sequencer.playback = PlaybackRun::Playing {
            index: index + 1,
            started: false,
        };
        return;
    };
    let mid_cycle = pad.is_playing();
    if !started {
        pad::start_playback(state, pad_id, services);
        state.sequencer.playback = PlaybackRun::Playing {
            index,
            started: true,
        };
    } else if !mid_cycle {
        state.sequencer.playback = PlaybackRun::Playing {
            index: index + 1,
            started: false,
        };
    }
}

// =============================================================================
// RECORDING
// =============================================================================

/// Open a recording session: the player's presses are matched against the
/// sequence from the start. Closes the sequencer gate, powering the pads.
pub fn record(state: &mut GameState) {
    if state.sequencer.recording {
        debug!("record requested while already recording, ignored");
        return;
    }
    state.sequencer.cursor = 0;
    state.sequencer.outcome = RecordOutcome::Incomplete;
    state.sequencer.recording = true;
    let (gate, key) = (state.sequencer.gate, state.sequencer.gate_key);
    let events = state.gates.close(gate, key);
    state.push_gate_events(events);
    info!(len = state.sequencer.sequence.len(), "recording started");
    state.push_event(GameEventData::RecordingStarted);
}

/// Handle a pad press during a recording session.
///
/// Called by [`pad::press`] after the gate check. A press outside a
/// session is stale input and ignored.
pub fn pressed(state: &mut GameState, id: PadId, services: &mut Services) {
    if !state.sequencer.recording {
        debug!(?id, "press outside a recording session ignored");
        return;
    }
    let Some(&expected) = state.sequencer.sequence.get(state.sequencer.cursor) else {
        return;
    };
    if id == expected {
        // Echo the press back as playback feedback.
        pad::start_playback(state, id, services);
        state.sequencer.cursor += 1;
        let cursor = state.sequencer.cursor;
        state.push_event(GameEventData::PadMatched { pad: id, cursor });
        if cursor >= state.sequencer.sequence.len() {
            resolve(state, RecordOutcome::Correct);
        }
    } else {
        state.push_event(GameEventData::PadMismatched { pad: id, expected });
        resolve(state, RecordOutcome::Wrong);
    }
}

fn resolve(state: &mut GameState, outcome: RecordOutcome) {
    state.sequencer.outcome = outcome;
    state.sequencer.recording = false;
    let (gate, key) = (state.sequencer.gate, state.sequencer.gate_key);
    let events = state.gates.open(gate, key);
    state.push_gate_events(events);
    info!(?outcome, "recording ended");
    state.push_event(GameEventData::RecordingEnded { outcome });
}

// =============================================================================
// TESTS
// =============================================================================
