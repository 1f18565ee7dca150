//! # crew-tools
//!
//! Tools with external effects for crew agents: file output and web search.
//! The side-effect-free built-ins (calculator, clock) live in `crew-core`
//! next to the tool contract itself.

pub mod file_save;
pub mod web_search;

pub use file_save::FileSaveTool;
pub use web_search::WebSearchTool;
