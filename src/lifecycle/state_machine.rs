use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::types::AgentState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Initialized,
    TaskStarted,
    TaskSucceeded,
    TaskFailed,
    FailureClassified,
    Paused,
    Resumed,
    Terminated,
}

pub struct AgentStateMachine;

impl AgentStateMachine {
    pub fn next(state: AgentState, event: LifecycleEvent) -> Result<AgentState> {
        let next = match (state, event) {
            (AgentState::Initialized, LifecycleEvent::Initialized) => AgentState::Ready,
            (AgentState::Ready, LifecycleEvent::TaskStarted) => AgentState::Executing,
            (AgentState::Executing, LifecycleEvent::TaskSucceeded) => AgentState::Ready,
            (AgentState::Executing, LifecycleEvent::TaskFailed) => AgentState::Error,
            (AgentState::Error, LifecycleEvent::FailureClassified) => AgentState::Ready,
            (AgentState::Ready, LifecycleEvent::Paused) => AgentState::Paused,
            (AgentState::Paused, LifecycleEvent::Resumed) => AgentState::Ready,

            (AgentState::Terminated, _) => {
                return Err(OrchestratorError::InvalidState(format!(
                    "agent is terminated, cannot apply {:?}",
                    event
                )));
            }
            (_, LifecycleEvent::Terminated) => AgentState::Terminated,

            _ => {
                return Err(OrchestratorError::InvalidState(format!(
                    "invalid transition from {} with event {:?}",
                    state.as_str(),
                    event
                )));
            }
        };

        Ok(next)
    }

    pub fn transition(state: &mut AgentState, event: LifecycleEvent) -> Result<AgentState> {
        let next = Self::next(*state, event)?;
        *state = next;
        Ok(next)
    }
}
