pub mod anthropic;
pub mod backend;
pub mod local;

pub use anthropic::AnthropicBackend;
pub use backend::{Analysis, Backend, Generation};
pub use local::LocalBackend;
