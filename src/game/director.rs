//! Game director
//!
//! Thin stage loop over the sequencer: show a message, demonstrate a
//! sequence, record the player's answer, then score it. Each stage draws
//! its sequence from a seed derived from the base seed and the stage
//! number, so a failed stage replays the identical sequence.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::{derive_stage_seed, DeterministicRng};
use crate::game::events::GameEventData;
use crate::game::sequencer::{self, RecordOutcome, SequenceError};
use crate::game::state::GameState;
use crate::services::Services;

// =============================================================================
// TYPES
// =============================================================================

/// Tuning knobs for the stage loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectorConfig {
    /// Lives at the start of a game.
    pub starting_lives: u32,
    /// Sequence length at stage 0; grows by one per stage.
    pub base_sequence_len: usize,
    /// How long each interstitial message stays up, in seconds.
    pub message_duration: f32,
    /// Points awarded per cleared stage.
    pub points_per_stage: u32,
    /// Key under which the high score is persisted.
    pub score_key: String,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            starting_lives: 3,
            base_sequence_len: 3,
            message_duration: 2.0,
            points_per_stage: 100,
            score_key: "echo_pads".to_string(),
        }
    }
}

/// What to do once the current message times out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AfterMessage {
    /// Draw and demonstrate the next stage's sequence.
    StartStage,
    /// Re-demonstrate the current sequence after a miss.
    ReplayStage,
    /// Wrap the game up.
    Finish,
}

/// Phase machine of the stage loop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum DirectorPhase {
    /// No game running.
    Idle,
    /// An interstitial message is up.
    Message {
        /// Seconds until the message times out.
        remaining: f32,
        /// Transition once it does.
        then: AfterMessage,
    },
    /// The sequencer is demonstrating the sequence.
    Playback,
    /// The player is reproducing the sequence.
    Recording,
    /// The game has ended.
    GameOver,
}

/// Director state: stage progress, lives and score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectorState {
    /// Current stage, counted from zero.
    pub stage: u32,
    /// Remaining lives.
    pub lives: u32,
    /// Accumulated score.
    pub score: u32,
    /// Current phase.
    pub phase: DirectorPhase,
    /// Seed every stage seed is derived from.
    pub(crate) base_seed: u64,
}

impl DirectorState {
    pub(crate) fn new(base_seed: u64) -> Self {
        Self {
            stage: 0,
            lives: 0,
            score: 0,
            phase: DirectorPhase::Idle,
            base_seed,
        }
    }

    /// Is a game in progress?
    #[inline]
    pub fn is_running(&self) -> bool {
        !matches!(self.phase, DirectorPhase::Idle | DirectorPhase::GameOver)
    }
}

// =============================================================================
// STAGE LOOP
// =============================================================================

/// Start a fresh game from stage zero.
pub fn start_game(state: &mut GameState, services: &mut Services) {
    state.director.stage = 0;
    state.director.score = 0;
    state.director.lives = state.config.director.starting_lives;
    info!(lives = state.director.lives, "game started");
    show_message(state, services, "Watch the pads", AfterMessage::StartStage);
}

/// Advance the stage loop by one control step.
pub fn poll(state: &mut GameState, dt: f32, services: &mut Services) {
    match state.director.phase {
        DirectorPhase::Idle | DirectorPhase::GameOver => {}
        DirectorPhase::Message { remaining, then } => {
            let remaining = remaining - dt;
            if remaining > 0.0 {
                state.director.phase = DirectorPhase::Message { remaining, then };
            } else {
                dispatch(state, then, services);
            }
        }
        DirectorPhase::Playback => {
            if !state.sequencer.is_playing_back() {
                sequencer::record(state);
                state.director.phase = DirectorPhase::Recording;
            }
        }
        DirectorPhase::Recording => {
            if !state.sequencer.is_recording() {
                score_round(state, services);
            }
        }
    }
}

fn dispatch(state: &mut GameState, then: AfterMessage, services: &mut Services) {
    match then {
        AfterMessage::StartStage => start_stage(state, services),
        AfterMessage::ReplayStage => {
            debug!(stage = state.director.stage, "replaying stage");
            sequencer::play(state);
            state.director.phase = DirectorPhase::Playback;
        }
        AfterMessage::Finish => finish_game(state, services),
    }
}

fn start_stage(state: &mut GameState, services: &mut Services) {
    let stage = state.director.stage;
    let len = state.config.director.base_sequence_len + stage as usize;
    state.rng = DeterministicRng::new(derive_stage_seed(state.director.base_seed, stage));
    match sequencer::generate(state, len) {
        Ok(()) => {
            sequencer::play(state);
            state.director.phase = DirectorPhase::Playback;
            info!(stage, len, "stage started");
            state.push_event(GameEventData::StageStarted { stage, len });
        }
        Err(SequenceError::EmptyDomain) => {
            warn!(stage, "no pads attached, ending game");
            finish_game(state, services);
        }
        Err(err) => {
            warn!(stage, %err, "stage generation failed, ending game");
            finish_game(state, services);
        }
    }
}

fn score_round(state: &mut GameState, services: &mut Services) {
    match state.sequencer.outcome() {
        RecordOutcome::Correct => {
            let stage = state.director.stage;
            state.director.score += state.config.director.points_per_stage;
            let score = state.director.score;
            info!(stage, score, "stage cleared");
            state.push_event(GameEventData::StageCleared { stage, score });
            state.director.stage += 1;
            show_message(state, services, "Well done", AfterMessage::StartStage);
        }
        RecordOutcome::Wrong => {
            state.director.lives = state.director.lives.saturating_sub(1);
            let remaining = state.director.lives;
            info!(remaining, "life lost");
            state.push_event(GameEventData::LifeLost { remaining });
            if remaining == 0 {
                show_message(state, services, "Game over", AfterMessage::Finish);
            } else {
                show_message(state, services, "Try again", AfterMessage::ReplayStage);
            }
        }
        RecordOutcome::Incomplete => {
            // The session resolved without a verdict; treat as a miss.
            warn!("recording resolved without a verdict");
            show_message(state, services, "Try again", AfterMessage::ReplayStage);
        }
    }
}

fn finish_game(state: &mut GameState, services: &mut Services) {
    state.director.phase = DirectorPhase::GameOver;
    let score = state.director.score;
    let key = &state.config.director.score_key;
    let previous = services.scores.high_score(key);
    let new_record = score > previous;
    if new_record {
        services.scores.set_high_score(key, score);
    }
    let high_score = score.max(previous);
    info!(score, high_score, new_record, "game ended");
    state.push_event(GameEventData::GameEnded {
        score,
        high_score,
        new_record,
    });
}

fn show_message(state: &mut GameState, services: &mut Services, text: &str, then: AfterMessage) {
    services.screen.show(text);
    state.director.phase = DirectorPhase::Message {
        remaining: state.config.director.message_duration,
        then,
    };
    state.push_event(GameEventData::MessageShown {
        text: text.to_string(),
    });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::pad::{self, PadId};
    use crate::game::state::{GameConfig, PadSpec};

    const DT: f32 = 1.0 / 60.0;

    fn fixture(seed: u64) -> (GameState, Services) {
        let mut state = GameState::new(GameConfig::default(), seed);
        let services = Services::headless();
        for _ in 0..4 {
            sequencer::attach_pad(&mut state, PadSpec::default());
        }
        (state, services)
    }

    /// One full control step, minus the dwell layer.
    fn tick(state: &mut GameState, services: &mut Services) {
        pad::advance_playbacks(state, DT, services);
        sequencer::poll(state, services);
        poll(state, DT, services);
    }

    fn run_until(
        state: &mut GameState,
        services: &mut Services,
        pred: impl Fn(&GameState) -> bool,
    ) {
        for _ in 0..36_000 {
            tick(state, services);
            if pred(state) {
                return;
            }
        }
        panic!("condition not reached within the step budget");
    }

    fn answer(state: &mut GameState, services: &mut Services, presses: &[PadId]) {
        for &p in presses {
            pad::press(state, p, services);
        }
    }

    #[test]
    fn test_stage_loop_clears_and_advances() {
        let (mut state, mut services) = fixture(11);
        start_game(&mut state, &mut services);
        assert!(matches!(state.director.phase, DirectorPhase::Message { .. }));

        run_until(&mut state, &mut services, |s| {
            s.director.phase == DirectorPhase::Recording
        });
        assert_eq!(state.sequencer.sequence().len(), 3);

        let answer_pads: Vec<PadId> = state.sequencer.sequence().to_vec();
        answer(&mut state, &mut services, &answer_pads);

        run_until(&mut state, &mut services, |s| {
            s.director.phase == DirectorPhase::Recording
        });
        assert_eq!(state.director.stage, 1);
        assert_eq!(state.director.score, 100);
        // Stage 1 is one entry longer.
        assert_eq!(state.sequencer.sequence().len(), 4);
    }

    #[test]
    fn test_miss_replays_the_same_sequence() {
        let (mut state, mut services) = fixture(11);
        start_game(&mut state, &mut services);
        run_until(&mut state, &mut services, |s| {
            s.director.phase == DirectorPhase::Recording
        });
        let sequence = state.sequencer.sequence().to_vec();

        // Press the wrong pad first.
        let wrong = *state
            .pads
            .keys()
            .find(|p| **p != sequence[0])
            .expect("a non-matching pad exists");
        pad::press(&mut state, wrong, &mut services);
        assert_eq!(state.director.lives, state.config.director.starting_lives);

        run_until(&mut state, &mut services, |s| {
            s.director.phase == DirectorPhase::Recording
        });
        assert_eq!(state.director.lives, 2);
        assert_eq!(state.director.stage, 0);
        assert_eq!(state.sequencer.sequence(), sequence.as_slice());
    }

    #[test]
    fn test_losing_all_lives_ends_the_game() {
        let (mut state, mut services) = fixture(11);
        start_game(&mut state, &mut services);

        for _ in 0..state.config.director.starting_lives {
            run_until(&mut state, &mut services, |s| {
                s.director.phase == DirectorPhase::Recording
            });
            let wrong = *state
                .pads
                .keys()
                .find(|p| **p != state.sequencer.sequence()[0])
                .unwrap();
            pad::press(&mut state, wrong, &mut services);
        }
        run_until(&mut state, &mut services, |s| {
            s.director.phase == DirectorPhase::GameOver
        });
        assert!(!state.director.is_running());
        let events = state.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e.data, GameEventData::GameEnded { score: 0, .. })));
    }

    #[test]
    fn test_high_score_persists_across_games() {
        let (mut state, mut services) = fixture(11);
        start_game(&mut state, &mut services);

        // Clear one stage, then lose.
        run_until(&mut state, &mut services, |s| {
            s.director.phase == DirectorPhase::Recording
        });
        let seq = state.sequencer.sequence().to_vec();
        answer(&mut state, &mut services, &seq);
        for _ in 0..state.config.director.starting_lives {
            run_until(&mut state, &mut services, |s| {
                s.director.phase == DirectorPhase::Recording
            });
            let wrong = *state
                .pads
                .keys()
                .find(|p| **p != state.sequencer.sequence()[0])
                .unwrap();
            pad::press(&mut state, wrong, &mut services);
        }
        run_until(&mut state, &mut services, |s| {
            s.director.phase == DirectorPhase::GameOver
        });
        assert_eq!(
            services.scores.high_score(&state.config.director.score_key),
            100
        );

        // An immediate loss in a new game does not beat the record.
        start_game(&mut state, &mut services);
        for _ in 0..state.config.director.starting_lives {
            run_until(&mut state, &mut services, |s| {
                s.director.phase == DirectorPhase::Recording
            });
            let wrong = *state
                .pads
                .keys()
                .find(|p| **p != state.sequencer.sequence()[0])
                .unwrap();
            pad::press(&mut state, wrong, &mut services);
        }
        run_until(&mut state, &mut services, |s| {
            s.director.phase == DirectorPhase::GameOver
        });
        let events = state.take_events();
        assert!(events.iter().any(|e| matches!(
            e.data,
            GameEventData::GameEnded {
                score: 0,
                high_score: 100,
                new_record: false,
            }
        )));
    }

    #[test]
    fn test_same_seed_same_stage_sequence() {
        let (mut a, mut sa) = fixture(99);
        let (mut b, mut sb) = fixture(99);
        start_game(&mut a, &mut sa);
        start_game(&mut b, &mut sb);
        run_until(&mut a, &mut sa, |s| {
            s.director.phase == DirectorPhase::Recording
        });
        run_until(&mut b, &mut sb, |s| {
            s.director.phase == DirectorPhase::Recording
        });
        assert_eq!(a.sequencer.sequence(), b.sequencer.sequence());
    }

    #[test]
    fn test_game_over_without_pads() {
        let mut state = GameState::new(GameConfig::default(), 5);
        let mut services = Services::headless();
        start_game(&mut state, &mut services);
        run_until(&mut state, &mut services, |s| {
            s.director.phase == DirectorPhase::GameOver
        });
    }
}
