// src/clients/mod.rs

pub mod completion;
pub mod mock;
pub mod search;

pub use completion::{ChatCompletionClient, CompletionError, CompletionProvider};
pub use mock::ScriptedCompletion;
pub use search::{SearchProvider, SearchTool, TavilySearch};
