//! State machine for a recording session
//!
//! This module implements the session lifecycle using a single-writer pattern.
//! All state transitions go through the `reduce()` function, which returns
//! a new state and a list of effects to execute. The session executes the
//! effects synchronously, in order.

use uuid::Uuid;

use crate::region::CaptureTarget;

/// Lifecycle of one recording.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    /// Nothing is capturing. `paused` means a recording is in progress and
    /// waiting for a new region (after reselect); its frames are kept.
    Idle { paused: bool },
    Capturing {
        sub_run: Uuid,
        target: CaptureTarget,
    },
    /// Recording finished; frames and audio are ready for export
    Stopped,
}

impl Default for State {
    fn default() -> Self {
        State::Idle { paused: false }
    }
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Idle { paused: false } => "idle",
            State::Idle { paused: true } => "paused",
            State::Capturing { .. } => "capturing",
            State::Stopped => "stopped",
        }
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, State::Capturing { .. })
    }
}

/// Commands coming from the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start { target: CaptureTarget },
    /// Finish the recording
    Stop,
    /// Stop the current sub-run but keep the recording open for a new region
    Reselect,
    /// Discard everything recorded so far
    Reset,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Stop => "stop",
            Command::Reselect => "reselect",
            Command::Reset => "reset",
        }
    }
}

/// Effects to be executed after a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start the frame scheduler (and audio, if enabled) for a new sub-run.
    /// With `fresh`, the previous recording is dropped once the sub-run is up.
    StartSubRun {
        id: Uuid,
        target: CaptureTarget,
        fresh: bool,
    },
    /// Stop both capture subsystems, wait for them, merge their output
    StopSubRun { id: Uuid },
    /// Drop accumulated frames and the audio artifact
    ClearRecording,
    /// Tell the front end the recording is finished
    EmitStopped,
}

/// Reducer function: (state, command) -> (next_state, effects)
///
/// Key rules:
/// - At most one sub-run is active; Start while capturing is ignored
/// - A sub-run is always stopped (and merged) before the state leaves Capturing
/// - An ignored command returns the current state and no effects
pub fn reduce(state: &State, command: Command) -> (State, Vec<Effect>) {
    use Command::*;
    use Effect::*;

    match (state, command) {
        // -----------------
        // Idle
        // -----------------
        (State::Idle { paused }, Start { target }) => {
            let id = Uuid::new_v4();
            (
                State::Capturing { sub_run: id, target },
                vec![StartSubRun {
                    id,
                    target,
                    fresh: !*paused,
                }],
            )
        }
        // Reselect was cancelled: finish with what we have
        (State::Idle { paused: true }, Stop) => (State::Stopped, vec![EmitStopped]),
        (State::Idle { paused: true }, Reset) => (State::default(), vec![ClearRecording]),

        // -----------------
        // Capturing
        // -----------------
        (State::Capturing { sub_run, .. }, Stop) => (
            State::Stopped,
            vec![StopSubRun { id: *sub_run }, EmitStopped],
        ),
        (State::Capturing { sub_run, .. }, Reselect) => (
            State::Idle { paused: true },
            vec![StopSubRun { id: *sub_run }],
        ),
        (State::Capturing { sub_run, .. }, Reset) => (
            State::default(),
            vec![StopSubRun { id: *sub_run }, ClearRecording],
        ),

        // -----------------
        // Stopped
        // -----------------
        // A new recording replaces the finished one, but only once it is running
        (State::Stopped, Start { target }) => {
            let id = Uuid::new_v4();
            (
                State::Capturing { sub_run: id, target },
                vec![StartSubRun {
                    id,
                    target,
                    fresh: true,
                }],
            )
        }
        (State::Stopped, Reset) => (State::default(), vec![ClearRecording]),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;

    fn region() -> CaptureTarget {
        CaptureTarget::Region(Region::new(10, 10, 320, 240).unwrap())
    }

    fn capturing() -> (State, Uuid) {
        let (state, _) = reduce(&State::default(), Command::Start { target: region() });
        match state {
            State::Capturing { sub_run, .. } => (state, sub_run),
            other => panic!("expected Capturing, got {:?}", other),
        }
    }

    #[test]
    fn idle_start_transitions_to_capturing() {
        let (next, effects) = reduce(&State::default(), Command::Start { target: region() });
        assert!(next.is_capturing());
        assert!(matches!(
            effects.as_slice(),
            [Effect::StartSubRun { target, fresh: true, .. }] if *target == region()
        ));
    }

    #[test]
    fn stop_quiesces_then_notifies() {
        let (state, id) = capturing();
        let (next, effects) = reduce(&state, Command::Stop);
        assert_eq!(next, State::Stopped);
        assert_eq!(effects, vec![Effect::StopSubRun { id }, Effect::EmitStopped]);
    }

    #[test]
    fn reselect_pauses_without_finishing() {
        let (state, id) = capturing();
        let (next, effects) = reduce(&state, Command::Reselect);
        assert_eq!(next, State::Idle { paused: true });
        assert_eq!(effects, vec![Effect::StopSubRun { id }]);
        // Frames are not cleared on reselect
        assert!(!effects.contains(&Effect::ClearRecording));
    }

    #[test]
    fn paused_start_resumes_without_clearing() {
        let (next, effects) = reduce(
            &State::Idle { paused: true },
            Command::Start { target: CaptureTarget::Monitor(1) },
        );
        assert!(next.is_capturing());
        assert!(matches!(
            effects.as_slice(),
            [Effect::StartSubRun { fresh: false, .. }]
        ));
    }

    #[test]
    fn paused_stop_finishes_recording() {
        let (next, effects) = reduce(&State::Idle { paused: true }, Command::Stop);
        assert_eq!(next, State::Stopped);
        assert_eq!(effects, vec![Effect::EmitStopped]);
    }

    #[test]
    fn start_while_capturing_is_ignored() {
        let (state, _) = capturing();
        let (next, effects) = reduce(&state, Command::Start { target: region() });
        assert_eq!(next, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn fresh_idle_stop_is_ignored() {
        let (next, effects) = reduce(&State::default(), Command::Stop);
        assert_eq!(next, State::default());
        assert!(effects.is_empty());

        let (_, effects) = reduce(&State::default(), Command::Reselect);
        assert!(effects.is_empty());
    }

    #[test]
    fn start_after_stop_begins_new_recording() {
        let (next, effects) = reduce(&State::Stopped, Command::Start { target: region() });
        assert!(next.is_capturing());
        // Clearing is deferred to the session so a failed start keeps the recording
        assert!(matches!(
            effects.as_slice(),
            [Effect::StartSubRun { fresh: true, .. }]
        ));
    }

    #[test]
    fn reset_while_capturing_stops_then_clears() {
        let (state, id) = capturing();
        let (next, effects) = reduce(&state, Command::Reset);
        assert_eq!(next, State::default());
        assert_eq!(effects, vec![Effect::StopSubRun { id }, Effect::ClearRecording]);
    }

    #[test]
    fn each_start_gets_a_new_sub_run_id() {
        let (_, first) = capturing();
        let (_, second) = capturing();
        assert_ne!(first, second);
    }

    #[test]
    fn state_names() {
        assert_eq!(State::default().name(), "idle");
        assert_eq!(State::Idle { paused: true }.name(), "paused");
        assert_eq!(State::Stopped.name(), "stopped");
    }
}
