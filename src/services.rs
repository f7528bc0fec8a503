//! External service boundaries.
//!
//! The core invokes these interfaces; it never implements presentation,
//! audio, or persistence itself. Services are constructed by the embedder
//! and injected at startup; there is no ambient global instance.

use std::collections::BTreeMap;

use glam::Vec3;
use tracing::info;

use crate::game::pad::{NoteId, PadId};

/// Visual presentation of pads. The timed on/off cycle itself is owned by
/// the pad's playback state machine; this is a thin setter.
pub trait PadPresenter {
    /// Switch a pad's lit state.
    fn set_lit(&mut self, pad: PadId, lit: bool);
}

/// Fire-and-forget audio playback.
pub trait AudioSink {
    /// Play a note clip at a world position.
    fn play_clip(&mut self, note: NoteId, at: Vec3);
}

/// Persisted high scores.
pub trait ScoreStore {
    /// Best score on record for a key; 0 if none.
    fn high_score(&self, key: &str) -> u32;
    /// Persist a new best score.
    fn set_high_score(&mut self, key: &str, value: u32);
}

/// On-screen player messaging. Display duration is timed by the director.
pub trait MessageScreen {
    /// Put a message on screen.
    fn show(&mut self, text: &str);
}

/// Bundle of injected services passed through the step driver.
pub struct Services {
    /// Pad visuals.
    pub presenter: Box<dyn PadPresenter>,
    /// Audio output.
    pub audio: Box<dyn AudioSink>,
    /// High-score persistence.
    pub scores: Box<dyn ScoreStore>,
    /// Player messaging.
    pub screen: Box<dyn MessageScreen>,
}

impl Services {
    /// Headless services: no-op presentation and audio, in-memory scores,
    /// log-backed messaging. Used by the demo binary and tests.
    pub fn headless() -> Self {
        Self {
            presenter: Box::new(NullPresenter),
            audio: Box::new(NullAudio),
            scores: Box::new(MemoryScoreStore::default()),
            screen: Box::new(LogScreen),
        }
    }
}

/// Presenter that discards lit-state changes.
pub struct NullPresenter;

impl PadPresenter for NullPresenter {
    fn set_lit(&mut self, _pad: PadId, _lit: bool) {}
}

/// Audio sink that discards clips.
pub struct NullAudio;

impl AudioSink for NullAudio {
    fn play_clip(&mut self, _note: NoteId, _at: Vec3) {}
}

/// In-memory score store.
#[derive(Debug, Default)]
pub struct MemoryScoreStore {
    scores: BTreeMap<String, u32>,
}

impl ScoreStore for MemoryScoreStore {
    fn high_score(&self, key: &str) -> u32 {
        self.scores.get(key).copied().unwrap_or(0)
    }

    fn set_high_score(&mut self, key: &str, value: u32) {
        self.scores.insert(key.to_string(), value);
    }
}

/// Message screen that writes to the log.
pub struct LogScreen;

impl MessageScreen for LogScreen {
    fn show(&mut self, text: &str) {
        info!(message = text, "screen");
    }
}
