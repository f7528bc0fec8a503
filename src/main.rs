//! Echo Pads demo driver
//!
//! Runs a full headless game: a scripted player dwells on the right pads
//! for a few stages, then starts missing until the game ends.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use echo_pads::{
    game::{director, sequencer, state::PadSpec, DirectorPhase, GameConfig, GameState, NoteId},
    interact::RayHit,
    step, DwellSession, GameEventData, Ray, SessionId, Services, TargetDetector, TargetId, VERSION,
};

const DT: f32 = 1.0 / 60.0;
const PAD_COUNT: u32 = 4;
const STAGES_TO_CLEAR: u32 = 3;

/// Detector steered by the script instead of real geometry.
struct SteeredDetector {
    aim: Rc<RefCell<Option<TargetId>>>,
}

impl TargetDetector for SteeredDetector {
    fn detect(&mut self, _ray: Ray) -> Option<RayHit> {
        self.aim.borrow().map(|target| RayHit {
            target,
            distance: 1.5,
        })
    }
}

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Echo Pads v{}", VERSION);

    let seed = 12345u64;
    let mut state = GameState::new(GameConfig::default(), seed);
    let mut services = Services::headless();
    info!("RNG seed: {}", seed);

    for i in 0..PAD_COUNT {
        let angle = i as f32 * std::f32::consts::TAU / PAD_COUNT as f32;
        sequencer::attach_pad(
            &mut state,
            PadSpec {
                note: NoteId(i as u8),
                position: Vec3::new(angle.cos() * 2.0, 1.2, angle.sin() * 2.0),
                play_duration: 1.0,
            },
        );
    }
    info!("Attached {} pads", PAD_COUNT);

    let aim = Rc::new(RefCell::new(None));
    let mut session = DwellSession::new(
        SessionId(0),
        Box::new(SteeredDetector { aim: Rc::clone(&aim) }),
    );

    director::start_game(&mut state, &mut services);

    let ray = Ray::new(Vec3::new(0.0, 1.6, 0.0), Vec3::Z);
    let mut total_events = 0usize;
    let mut steps = 0u64;

    while state.director.phase != DirectorPhase::GameOver && steps < 3_600_000 {
        // Steer: while recording, dwell on the expected pad for the first
        // few stages, then on a deliberately wrong one.
        *aim.borrow_mut() = if state.director.phase == DirectorPhase::Recording {
            let cursor = state.sequencer.cursor();
            state
                .sequencer
                .sequence()
                .get(cursor)
                .map(|expected| {
                    if state.director.stage < STAGES_TO_CLEAR {
                        *expected
                    } else {
                        // Any pad other than the expected one.
                        state
                            .pads
                            .keys()
                            .copied()
                            .find(|p| p != expected)
                            .unwrap_or(*expected)
                    }
                })
                .map(|pad| state.pads[&pad].target)
        } else {
            None
        };

        let result = step(&mut state, &mut session, ray, DT, &mut services);
        for event in &result.events {
            total_events += 1;
            match &event.data {
                GameEventData::StageStarted { stage, len } => {
                    info!(stage, len, "stage started");
                }
                GameEventData::StageCleared { stage, score } => {
                    info!(stage, score, "stage cleared");
                }
                GameEventData::LifeLost { remaining } => {
                    info!(remaining, "life lost");
                }
                GameEventData::GameEnded {
                    score,
                    high_score,
                    new_record,
                } => {
                    info!(score, high_score, new_record, "game ended");
                }
                _ => {}
            }
        }
        steps += 1;
    }

    info!(
        steps,
        total_events,
        seconds = steps as f32 * DT,
        "demo finished"
    );

    let summary = serde_json::json!({
        "seed": seed,
        "steps": steps,
        "score": state.director.score,
        "stage_reached": state.director.stage,
        "events": total_events,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
