pub mod agent_prompts;
pub mod athena;
pub mod chart;
pub mod conversation;
pub mod cost;
pub mod error;
pub mod llm;
pub mod normalize;
pub mod render;
pub mod settings;
pub mod sql_extract;
pub mod tools;

pub use conversation::{ChatMessage, Conversation, TurnObserver, TurnOptions, TurnStage};
pub use error::{PilotError, Result};
