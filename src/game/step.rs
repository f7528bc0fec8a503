//! Control step driver
//!
//! Glues the layers together once per control step: the dwell session
//! feeds completed targets into pad presses, pad playbacks advance, the
//! sequencer and director poll, and everything produced along the way is
//! drained into one event batch.

use crate::game::events::{GameEvent, GameEventData};
use crate::game::state::GameState;
use crate::game::{director, pad, sequencer};
use crate::interact::{DwellEvent, DwellSession, Ray};
use crate::services::Services;

/// What one control step produced.
#[derive(Debug)]
pub struct StepResult {
    /// Events in the order they occurred.
    pub events: Vec<GameEvent>,
}

/// Run one control step of the whole game.
pub fn step(
    state: &mut GameState,
    session: &mut DwellSession,
    ray: Ray,
    dt: f32,
    services: &mut Services,
) -> StepResult {
    state.step += 1;

    let dwell_events = session.step(&mut state.targets, ray, dt);
    let mut completed = Vec::new();
    for event in dwell_events {
        if let DwellEvent::Completed { target, .. } = event {
            completed.push(target);
        }
        state.push_event(GameEventData::Dwell(event));
    }
    for target in completed {
        if let Some(pad_id) = state.pad_by_target(target) {
            pad::press(state, pad_id, services);
        }
    }

    pad::advance_playbacks(state, dt, services);
    sequencer::poll(state, services);
    director::poll(state, dt, services);

    StepResult {
        events: state.take_events(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;
    use crate::game::director::DirectorPhase;
    use crate::game::sequencer::RecordOutcome;
    use crate::game::state::{GameConfig, PadSpec};
    use crate::interact::{RayHit, SessionId, TargetDetector, TargetId};

    const DT: f32 = 1.0 / 60.0;

    /// Detector whose hit is scripted by the test.
    struct ScriptedDetector {
        aim: Rc<RefCell<Option<TargetId>>>,
    }

    impl TargetDetector for ScriptedDetector {
        fn detect(&mut self, _ray: Ray) -> Option<RayHit> {
            self.aim.borrow().map(|target| RayHit {
                target,
                distance: 1.0,
            })
        }
    }

    struct Rig {
        state: GameState,
        session: DwellSession,
        services: Services,
        aim: Rc<RefCell<Option<TargetId>>>,
    }

    fn rig(seed: u64, pads: u32) -> Rig {
        let mut state = GameState::new(GameConfig::default(), seed);
        let services = Services::headless();
        for _ in 0..pads {
            sequencer::attach_pad(&mut state, PadSpec::default());
        }
        let aim = Rc::new(RefCell::new(None));
        let session = DwellSession::new(
            SessionId(0),
            Box::new(ScriptedDetector { aim: Rc::clone(&aim) }),
        );
        Rig {
            state,
            session,
            services,
            aim,
        }
    }

    impl Rig {
        fn tick(&mut self) -> Vec<GameEvent> {
            step(
                &mut self.state,
                &mut self.session,
                Ray::new(Vec3::ZERO, Vec3::Z),
                DT,
                &mut self.services,
            )
            .events
        }

        fn aim_at(&mut self, target: Option<TargetId>) {
            *self.aim.borrow_mut() = target;
        }

        fn run_until_recording(&mut self) {
            for _ in 0..36_000 {
                self.tick();
                if self.state.director.phase == DirectorPhase::Recording {
                    return;
                }
            }
            panic!("recording phase not reached");
        }
    }

    #[test]
    fn test_dwell_press_matches_the_sequence() {
        let mut rig = rig(21, 4);
        director::start_game(&mut rig.state, &mut rig.services);
        rig.run_until_recording();

        // Dwell on the first expected pad until the target completes.
        let first = rig.state.sequencer.sequence()[0];
        rig.aim_at(Some(rig.state.pads[&first].target));
        let required = rig.state.config.dwell.required;
        let mut matched = false;
        for _ in 0..((required / DT) as usize + 10) {
            let events = rig.tick();
            if events
                .iter()
                .any(|e| matches!(e.data, GameEventData::PadMatched { .. }))
            {
                matched = true;
                break;
            }
        }
        assert!(matched);
        assert_eq!(rig.state.sequencer.cursor(), 1);
    }

    #[test]
    fn test_full_stage_by_dwelling() {
        let mut rig = rig(21, 4);
        director::start_game(&mut rig.state, &mut rig.services);
        rig.run_until_recording();

        let sequence = rig.state.sequencer.sequence().to_vec();
        for expected in sequence {
            rig.aim_at(Some(rig.state.pads[&expected].target));
            for _ in 0..36_000 {
                rig.tick();
                if rig.state.sequencer.cursor() == 0 && !rig.state.sequencer.is_recording() {
                    break;
                }
                if rig.state.sequencer.sequence().get(rig.state.sequencer.cursor())
                    != Some(&expected)
                {
                    break;
                }
            }
            // Let the dwell target release before re-aiming.
            rig.aim_at(None);
            rig.tick();
        }
        assert_eq!(rig.state.sequencer.outcome(), RecordOutcome::Correct);
        // The round is scored in the same step the last press lands.
        assert_eq!(rig.state.director.stage, 1);

        // The next stage's sequence is one entry longer.
        rig.run_until_recording();
        assert_eq!(rig.state.sequencer.sequence().len(), 4);
    }

    #[test]
    fn test_wandering_aim_never_presses() {
        let mut rig = rig(21, 2);
        director::start_game(&mut rig.state, &mut rig.services);
        rig.run_until_recording();

        // Flick between the two targets faster than the dwell requirement.
        let targets: Vec<TargetId> = rig.state.pads.values().map(|p| p.target).collect();
        for i in 0..600 {
            rig.aim_at(Some(targets[i % 2]));
            let events = rig.tick();
            assert!(!events
                .iter()
                .any(|e| matches!(e.data, GameEventData::PadPressed { .. })));
        }
        assert!(rig.state.sequencer.is_recording());
    }

    #[test]
    fn test_step_counter_stamps_events() {
        let mut rig = rig(21, 1);
        director::start_game(&mut rig.state, &mut rig.services);
        for _ in 0..1_000 {
            let events = rig.tick();
            if let Some(e) = events
                .iter()
                .find(|e| matches!(e.data, GameEventData::StageStarted { .. }))
            {
                assert_eq!(e.step, rig.state.step);
                return;
            }
        }
        panic!("stage never started");
    }
}
