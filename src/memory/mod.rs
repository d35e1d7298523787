//! Agent Memory System
//!
//! Batch topic segmentation over raw conversational turns, and the tiered
//! state store holding per-agent scratchpads and shared workspaces

pub mod segmenter;
pub mod state;

pub use segmenter::{ConversationTurn, SegmenterConfig, TopicSegment, TopicSegmenter};
pub use state::{
    EventStatus, PersonalMemoryState, SharedWorkspaceState, StateUpdate, TieredStateStore,
};
