//! Gameplay core: pads, the sequence engine, the stage loop, and the
//! per-step driver that ties them to the interaction layer.

pub mod director;
pub mod events;
pub mod pad;
pub mod sequencer;
pub mod state;
pub mod step;

pub use director::{DirectorConfig, DirectorPhase, DirectorState};
pub use events::{GameEvent, GameEventData};
pub use pad::{NoteId, PadId, PadPlayback, PadState};
pub use sequencer::{RecordOutcome, SequenceError, SequencerState};
pub use state::{DwellConfig, GameConfig, GameState, PadSpec, SequenceConfig};
pub use step::{step, StepResult};
