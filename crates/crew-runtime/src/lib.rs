//! # crew-runtime
//!
//! Model providers for the crew execution core.
//!
//! The only provider shipped here speaks the common chat-completions wire
//! shape over HTTP, which covers local inference servers and most hosted
//! gateways alike. Anything implementing `crew_core::LlmProvider` plugs in
//! the same way.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crew_runtime::ChatApiProvider;
//!
//! let provider = Arc::new(ChatApiProvider::from_env()?);
//! let model = ModelHandle::new(provider, "llama3.2");
//! ```

pub mod chat_api;

pub use chat_api::{ChatApiConfig, ChatApiProvider};

// Re-export core types for convenience
pub use crew_core::{
    Agent, AgentTeam, CrewError, LlmProvider, Message, ModelHandle, Result, Role, Tool,
    ToolRegistry,
};
