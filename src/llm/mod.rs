//! LLM integration for scenic-nl.
//!
//! - [`client`]: wire types, the [`LlmProvider`] trait and an OpenAI-compatible HTTP client
//! - [`gateway`]: the two-message conversation contract plus timeout and retry policy
//!
//! ```ignore
//! use scenic_nl::llm::{Conversation, Gateway, GatewayConfig};
//!
//! let gateway = Gateway::from_config(GatewayConfig::default())?;
//! let completion = gateway
//!     .query(&Conversation::new("You are a Scenic expert.", "List the objects."), 0.7, None)
//!     .await?;
//! println!("{}", completion.text);
//! ```

pub mod client;
pub mod gateway;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Role, Usage,
};
pub use gateway::{
    Completion, Conversation, Gateway, GatewayConfig, DEFAULT_API_BASE, DEFAULT_API_KEY,
    DEFAULT_MODEL,
};
