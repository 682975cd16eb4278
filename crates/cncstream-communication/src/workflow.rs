//! Workflow state machine
//!
//! | from      | start   | pause  | resume  | stop |
//! |-----------|---------|--------|---------|------|
//! | `Idle`    | Running | -      | -       | Idle |
//! | `Running` | -       | Paused | -       | Idle |
//! | `Paused`  | -       | -      | Running | Idle |
//!
//! The workflow never writes; the controller applies the side effects of a
//! successful transition to the feeder and sender.

use cncstream_core::{ControllerError, WorkflowState};
use std::fmt;

/// The four workflow transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Pause,
    Resume,
    Stop,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Pause => write!(f, "pause"),
            Self::Resume => write!(f, "resume"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Workflow {
    state: WorkflowState,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == WorkflowState::Idle
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkflowState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == WorkflowState::Paused
    }

    /// Target state of `transition` from `from`, if the transition exists
    pub fn target(from: WorkflowState, transition: Transition) -> Option<WorkflowState> {
        use WorkflowState::*;
        match (from, transition) {
            (Idle, Transition::Start) => Some(Running),
            (Running, Transition::Pause) => Some(Paused),
            (Paused, Transition::Resume) => Some(Running),
            (_, Transition::Stop) => Some(Idle),
            _ => None,
        }
    }

    /// Apply a transition; an unavailable transition leaves the state unchanged
    pub fn apply(&mut self, transition: Transition) -> Result<WorkflowState, ControllerError> {
        match Self::target(self.state, transition) {
            Some(next) => {
                if next != self.state {
                    tracing::info!("Workflow {} -> {}", self.state, next);
                }
                self.state = next;
                Ok(next)
            }
            None => Err(ControllerError::InvalidStateTransition {
                current: self.state.to_string(),
                requested: transition.to_string(),
            }),
        }
    }

    pub fn start(&mut self) -> bool {
        self.apply(Transition::Start).is_ok()
    }

    pub fn pause(&mut self) -> bool {
        self.apply(Transition::Pause).is_ok()
    }

    pub fn resume(&mut self) -> bool {
        self.apply(Transition::Resume).is_ok()
    }

    /// Always succeeds
    pub fn stop(&mut self) -> bool {
        self.apply(Transition::Stop).is_ok()
    }
}
