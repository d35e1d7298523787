//! Operating Memory Core
//!
//! Conversational memory for LLM-backed agents across retention tiers:
//! - Scores retained facts with the CIAR model
//!   (Certainty x Impact x Age-decay x Recency-boost)
//! - Compresses batches of raw turns into scored topic segments
//! - Generates text through a multi-provider client with ordered fallback
//! - Persists private per-agent scratchpads and shared multi-agent
//!   workspaces, publishing a notification per shared-state write
//!
//! Storage backends (key-value, relational, vector, graph, full-text) are
//! external collaborators reached only through the traits in [`storage`].

pub mod error;
pub mod llm;
pub mod memory;
pub mod models;
pub mod storage;

pub use error::Result;

// Re-export common types
pub use llm::{GenerateOptions, LlmClient, LlmProvider, LlmResponse};
pub use memory::{
    ConversationTurn, PersonalMemoryState, SharedWorkspaceState, TieredStateStore, TopicSegment,
    TopicSegmenter,
};
pub use models::{Fact, FactCategory, FactQuery, FactType};
