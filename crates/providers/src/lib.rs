pub mod host;
pub mod manager;
pub mod ollama;

pub use host::{CapabilityHost, CreateRequest, HostSession};
pub use manager::{Session, SessionManager};
pub use ollama::OllamaCapabilityHost;
