pub mod retry;
pub mod state_machine;

pub use retry::RetryPolicy;
pub use state_machine::{AgentStateMachine, LifecycleEvent};
