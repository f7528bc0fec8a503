//! Game Events
//!
//! Events generated during a control step, drained by the step driver and
//! handed to the caller for dispatch. The state machines never broadcast
//! through embedded callbacks.

use serde::{Deserialize, Serialize};

use crate::game::pad::PadId;
use crate::game::sequencer::RecordOutcome;
use crate::gate::GateEvent;
use crate::interact::DwellEvent;

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// A gate node changed state.
    Gate(GateEvent),

    /// A dwell session changed state.
    Dwell(DwellEvent),

    /// A pad began its on/off presentation cycle.
    PadPlaybackStarted {
        /// Pad that started.
        pad: PadId,
    },

    /// A pad finished its on/off presentation cycle.
    PadPlaybackFinished {
        /// Pad that finished.
        pad: PadId,
    },

    /// A powered pad was pressed.
    PadPressed {
        /// Pad that was pressed.
        pad: PadId,
    },

    /// A press matched the sequence entry at the cursor.
    PadMatched {
        /// Matching pad.
        pad: PadId,
        /// Cursor position after the match.
        cursor: usize,
    },

    /// A press did not match the sequence entry at the cursor.
    PadMismatched {
        /// Pressed pad.
        pad: PadId,
        /// Pad the sequence expected.
        expected: PadId,
    },

    /// A new sequence was generated.
    SequenceGenerated {
        /// Number of entries.
        len: usize,
    },

    /// Sequential playback of the whole sequence finished.
    SequencePlaybackFinished,

    /// A recording session started.
    RecordingStarted,

    /// A recording session resolved.
    RecordingEnded {
        /// Terminal outcome of the session.
        outcome: RecordOutcome,
    },

    /// A stage began.
    StageStarted {
        /// Stage index, starting at 0.
        stage: u32,
        /// Sequence length for the stage.
        len: usize,
    },

    /// A stage was reproduced correctly.
    StageCleared {
        /// Cleared stage index.
        stage: u32,
        /// Score after the award.
        score: u32,
    },

    /// A wrong reproduction cost a life.
    LifeLost {
        /// Lives remaining.
        remaining: u32,
    },

    /// A message was put on screen.
    MessageShown {
        /// Message text.
        text: String,
    },

    /// The game ended.
    GameEnded {
        /// Final score.
        score: u32,
        /// Best score on record after this game.
        high_score: u32,
        /// Whether this game set the record.
        new_record: bool,
    },
}

/// A game event with its control-step timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Control step when the event occurred.
    pub step: u64,
    /// Event data.
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(step: u64, data: GameEventData) -> Self {
        Self { step, data }
    }
}
