//! In-memory key-value backend for development and tests
//!
//! Keyspace semantics match the production backend contract: whole-value
//! overwrites, per-channel broadcast with no backlog. Subscribers that join
//! after a publish never see it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::storage::KeyValueStore;
use crate::Result;

const CHANNEL_CAPACITY: usize = 64;

/// In-memory [`KeyValueStore`] with broadcast pub/sub
#[derive(Clone)]
pub struct InMemoryStore {
    data: Arc<RwLock<HashMap<String, String>>>,
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to a notification channel. Only messages published after
    /// this call are delivered.
    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.data.write().await;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(channel) {
            // send() errs when no subscriber is listening; fire-and-forget
            let _ = sender.send(payload.to_string());
        }
        Ok(())
    }
}
