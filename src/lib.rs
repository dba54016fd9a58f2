pub mod agent;
pub mod config;
pub mod council;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod providers;
pub mod registry;
pub mod tools;
pub mod types;
pub mod validation;

pub use agent::{Agent, AgentSpec, AgentStatus};
pub use config::Config;
pub use council::Council;
pub use error::{ErrorKind, OrchestratorError, Result};
pub use registry::Registry;
pub use types::*;
