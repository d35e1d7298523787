//! Tiered operating-memory state
//!
//! Two kinds of durable state, each stored as one self-describing JSON
//! document under a namespaced key: private per-agent scratch state and
//! shared multi-agent workspace state. Updates overwrite the whole
//! document; shared updates additionally publish a notification on the
//! event's channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::storage::KeyValueStore;
use crate::Result;

//
// ================= State Documents =================
//

/// An agent's private scratchpad
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonalMemoryState {
    pub agent_id: String,
    pub current_task_id: Option<String>,
    /// Intermediate thoughts, calculations, or API results
    #[serde(default)]
    pub scratchpad: HashMap<String, Value>,
    /// Data being evaluated for promotion according to the CIAR model
    #[serde(default)]
    pub promotion_candidates: HashMap<String, Value>,
    pub last_updated: DateTime<Utc>,
}

impl PersonalMemoryState {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            current_task_id: None,
            scratchpad: HashMap::new(),
            promotion_candidates: HashMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// Lifecycle status of a collaborative event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Active,
    Resolved,
    Cancelled,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventStatus::Active => "active",
            EventStatus::Resolved => "resolved",
            EventStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Shared workspace for one collaborative event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SharedWorkspaceState {
    pub event_id: String,
    pub status: EventStatus,
    /// The core, shared facts and state data for the event
    #[serde(default)]
    pub shared_data: HashMap<String, Value>,
    /// Log of agents who have contributed to this event, append-only
    #[serde(default)]
    pub participating_agents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl SharedWorkspaceState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            event_id: format!("evt_{}", Uuid::new_v4().simple()),
            status: EventStatus::Active,
            shared_data: HashMap::new(),
            participating_agents: Vec::new(),
            created_at: now,
            last_updated: now,
        }
    }
}

impl Default for SharedWorkspaceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Notification payload published after every shared-state write
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateUpdate {
    pub event_id: String,
    pub status: EventStatus,
    pub last_updated_by: String,
}

//
// ================= Tiered State Store =================
//

fn personal_key(agent_id: &str) -> String {
    format!("personal_state:{}", agent_id)
}

fn shared_key(event_id: &str) -> String {
    format!("shared_state:{}", event_id)
}

fn channel_key(event_id: &str) -> String {
    format!("channel:shared_state:{}", event_id)
}

/// State store over an abstract key-value backend.
///
/// Writes are whole-document overwrites with last-writer-wins semantics per
/// key. There is no transaction across a caller's read-modify-write cycle;
/// concurrent writers to the same shared event must serialize externally.
/// Notifications are liveness hints, not delivery guarantees: the publish
/// step is not transactional with the write, and consumers that need
/// correctness must re-read state.
pub struct TieredStateStore<B: KeyValueStore> {
    backend: B,
}

impl<B: KeyValueStore> TieredStateStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Retrieve an agent's personal state, constructing a default when none
    /// exists. Stored bytes that fail validation are logged and replaced
    /// with a fresh default rather than surfaced as fatal.
    pub async fn get_personal_state(&self, agent_id: &str) -> Result<PersonalMemoryState> {
        let raw = self.backend.get(&personal_key(agent_id)).await?;

        match raw {
            None => Ok(PersonalMemoryState::new(agent_id)),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(state) => Ok(state),
                Err(e) => {
                    warn!(
                        agent_id = %agent_id,
                        "Corrupted personal state, returning fresh default: {}",
                        e
                    );
                    Ok(PersonalMemoryState::new(agent_id))
                }
            },
        }
    }

    /// Overwrite an agent's personal state, stamping `last_updated`.
    pub async fn update_personal_state(&self, state: &mut PersonalMemoryState) -> Result<()> {
        state.last_updated = Utc::now();
        let serialized = serde_json::to_string(state)?;
        self.backend
            .set(&personal_key(&state.agent_id), &serialized)
            .await
    }

    /// Retrieve the state of a shared event.
    ///
    /// A missing event is a [`MemoryError::NotFound`]; stored bytes that
    /// fail validation are a [`MemoryError::CorruptedState`], never silently
    /// replaced, since multiple agents depend on them.
    pub async fn get_shared_state(&self, event_id: &str) -> Result<SharedWorkspaceState> {
        let raw = self
            .backend
            .get(&shared_key(event_id))
            .await?
            .ok_or_else(|| {
                MemoryError::NotFound(format!(
                    "no shared workspace found for event_id: {}",
                    event_id
                ))
            })?;

        serde_json::from_str(&raw).map_err(|e| {
            MemoryError::CorruptedState(format!(
                "corrupted data for event_id {}: {}",
                event_id, e
            ))
        })
    }

    /// Overwrite a shared event's state, stamping `last_updated`, then
    /// publish a notification on the event's channel.
    pub async fn update_shared_state(&self, state: &mut SharedWorkspaceState) -> Result<()> {
        state.last_updated = Utc::now();
        let serialized = serde_json::to_string(state)?;
        self.backend
            .set(&shared_key(&state.event_id), &serialized)
            .await?;

        let update = StateUpdate {
            event_id: state.event_id.clone(),
            status: state.status,
            last_updated_by: state
                .participating_agents
                .last()
                .cloned()
                .unwrap_or_else(|| "system".to_string()),
        };
        info!(event_id = %state.event_id, "Shared state updated");
        self.publish_update(&state.event_id, &update).await
    }

    /// Best-effort broadcast on the event's notification channel.
    pub async fn publish_update(&self, event_id: &str, update: &StateUpdate) -> Result<()> {
        let payload = serde_json::to_string(update)?;
        self.backend
            .publish(&channel_key(event_id), &payload)
            .await
    }
}
