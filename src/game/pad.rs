//! Pads
//!
//! A pad is a presentable unit: it can be played (a timed lit/unlit cycle
//! with its note fired at the start) and pressed (reported to the owning
//! sequencer). Pressing is gated by the pad's gate node; playing disables
//! the pad's own gate for the duration of the cycle.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::game::events::GameEventData;
use crate::game::sequencer;
use crate::game::state::GameState;
use crate::gate::{GateId, GateKey};
use crate::interact::TargetId;
use crate::services::Services;

/// Stable handle to a pad.
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PadId(pub u32);

/// Note/tone assigned to a pad, resolved to a clip by the audio sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteId(pub u8);

/// Playback state machine for a pad's on/off presentation cycle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PadPlayback {
    /// Not presenting.
    Idle,
    /// Mid-cycle, lit, with time left in seconds.
    Playing {
        /// Seconds until the cycle ends.
        remaining: f32,
    },
}

/// State of a single pad.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PadState {
    /// Handle of this pad.
    pub id: PadId,
    /// Assigned note.
    pub note: NoteId,
    /// World position, for spatial audio.
    pub position: Vec3,
    /// Full on/off cycle duration in seconds (clamped at registration).
    pub play_duration: f32,
    /// Current playback state.
    pub playback: PadPlayback,
    /// This pad's gate node.
    pub gate: GateId,
    /// Key authorizing the pad's own gate operations.
    pub(crate) gate_key: GateKey,
    /// This pad's target in the dwell registry.
    pub target: TargetId,
}

impl PadState {
    /// Is the pad mid-cycle?
    #[inline]
    pub fn is_playing(&self) -> bool {
        matches!(self.playback, PadPlayback::Playing { .. })
    }

    /// Is the pad currently lit?
    #[inline]
    pub fn is_on(&self) -> bool {
        self.is_playing()
    }
}

/// Start a pad's on/off presentation cycle.
///
/// Reentrant-safe: a pad already mid-playback ignores the request rather
/// than overlapping two cycles. Returns whether a cycle started.
pub fn start_playback(state: &mut GameState, id: PadId, services: &mut Services) -> bool {
    let Some(pad) = state.pads.get_mut(&id) else {
        debug!(?id, "play on unknown pad ignored");
        return false;
    };
    if pad.is_playing() {
        debug!(?id, "pad already mid-playback, play ignored");
        return false;
    }
    pad.playback = PadPlayback::Playing {
        remaining: pad.play_duration,
    };
    let (gate, gate_key, note, position) = (pad.gate, pad.gate_key, pad.note, pad.position);

    services.presenter.set_lit(id, true);
    services.audio.play_clip(note, position);
    state.push_event(GameEventData::PadPlaybackStarted { pad: id });

    // Disable the pad's own gate so it cannot be pressed while animating.
    // While the sequencer gate is powered (a recording session is running)
    // the open is refused by the parent-power rule; the mid-playback guard
    // above covers that window instead.
    let gate_events = state.gates.open(gate, gate_key);
    state.push_gate_events(gate_events);
    true
}

/// Advance every pad's playback by one control step.
pub fn advance_playbacks(state: &mut GameState, dt: f32, services: &mut Services) {
    let ids: Vec<PadId> = state.pads.keys().copied().collect();
    for id in ids {
        let Some(pad) = state.pads.get_mut(&id) else {
            continue;
        };
        let PadPlayback::Playing { remaining } = pad.playback else {
            continue;
        };
        let remaining = remaining - dt;
        if remaining > 0.0 {
            pad.playback = PadPlayback::Playing { remaining };
            continue;
        }
        pad.playback = PadPlayback::Idle;
        let (gate, gate_key) = (pad.gate, pad.gate_key);

        services.presenter.set_lit(id, false);
        state.push_event(GameEventData::PadPlaybackFinished { pad: id });

        // Re-enable the pad's gate now the cycle is over. A no-op if the
        // self-disable was refused at cycle start.
        let gate_events = state.gates.close(gate, gate_key);
        state.push_gate_events(gate_events);
    }
}

/// Press a pad, forwarding to the owning sequencer.
///
/// Only meaningful while the pad's gate node is powered; an unpowered press
/// is a normal stale-state outcome and is silently ignored.
pub fn press(state: &mut GameState, id: PadId, services: &mut Services) {
    let Some(pad) = state.pads.get(&id) else {
        debug!(?id, "press on unknown pad ignored");
        return;
    };
    if !state.gates.is_powered(pad.gate) {
        debug!(?id, "press on unpowered pad ignored");
        return;
    }
    state.push_event(GameEventData::PadPressed { pad: id });
    sequencer::pressed(state, id, services);
}

// =============================================================================
// TESTS
// =============================================================================
