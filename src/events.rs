use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::error::ErrorKind;
use crate::types::{AgentId, ArtifactId, DecisionId, SessionId, TaskId};

const DEFAULT_CAPACITY: usize = 256;

/// Observational events. Nothing in the core depends on them being
/// delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    AgentCreated {
        agent_id: AgentId,
        name: String,
        model: String,
    },
    TaskCompleted {
        agent_id: AgentId,
        task_id: TaskId,
        task_type: String,
        duration_ms: u64,
    },
    AgentError {
        agent_id: AgentId,
        task_id: TaskId,
        kind: ErrorKind,
        message: String,
    },
    AgentTerminated {
        agent_id: AgentId,
        name: String,
    },
    ValidationCompleted {
        agent_id: AgentId,
        stage: String,
        passed: bool,
        skipped: bool,
    },
    CouncilStarted {
        session_id: SessionId,
        purpose: String,
    },
    RoleSummoned {
        session_id: SessionId,
        role: String,
    },
    RoleContribution {
        session_id: SessionId,
        role: String,
    },
    ArtifactCreated {
        session_id: SessionId,
        artifact_id: ArtifactId,
        creator: String,
    },
    DecisionReached {
        session_id: SessionId,
        decision_id: DecisionId,
        approved: bool,
    },
    CouncilEnded {
        session_id: SessionId,
        duration_ms: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: DomainEvent,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishing never fails; with no subscribers the event is dropped.
    pub fn publish(&self, event: DomainEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if self.sender.send(envelope).is_err() {
            log::trace!("event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Lagged receivers skip missed events rather than erroring.
    pub fn stream(&self) -> impl Stream<Item = EventEnvelope> {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|item| item.ok())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
