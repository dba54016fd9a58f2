pub mod agent;
pub mod task;

pub use agent::{is_read_only_model, AgentState, CapabilitySet, Permission, Role};
pub use task::{ArtifactDraft, Issue, Refinement, Task, TaskOutput};

use uuid::Uuid;

pub type AgentId = Uuid;
pub type SessionId = Uuid;
pub type ArtifactId = Uuid;
pub type TaskId = Uuid;
pub type DecisionId = Uuid;
