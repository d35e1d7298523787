//! Storage backend boundary
//!
//! The memory core reaches its persistence tiers only through these traits.
//! Concrete network clients (Redis, Postgres, Qdrant, Neo4j, Meilisearch)
//! live outside this crate; the in-memory backend here exists for tests and
//! local development.

pub mod memory;

pub use memory::InMemoryStore;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::MemoryError;
use crate::models::{Fact, FactQuery};
use crate::Result;

/// Key-value store with a fire-and-forget notification channel.
///
/// Backs the tiered state store. `publish` is best-effort broadcast: no
/// acknowledgment, no backlog for absent subscribers.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn publish(&self, channel: &str, payload: &str) -> Result<()>;
}

/// Relational tier holding promoted facts
#[async_trait::async_trait]
pub trait FactStore: Send + Sync {
    async fn put_fact(&self, fact: &Fact) -> Result<()>;
    async fn query_facts(&self, query: &FactQuery) -> Result<Vec<Fact>>;
}

/// A document as stored in the vector or full-text tiers
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: HashMap<String, Value>,
}

/// Vector tier for similarity retrieval; embedding happens behind the trait
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn add_documents(&self, documents: &[Document]) -> Result<()>;
    async fn query_similar(&self, query_text: &str, top_k: usize) -> Result<Vec<Document>>;
}

/// Graph tier queried with a backend-native query string
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    async fn query(
        &self,
        query: &str,
        params: &HashMap<String, Value>,
    ) -> Result<Vec<HashMap<String, Value>>>;
}

/// Full-text tier
#[async_trait::async_trait]
pub trait SearchIndex: Send + Sync {
    async fn add_documents(&self, documents: &[Document]) -> Result<()>;
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Document>>;
}

/// A query routed by [`KnowledgeStoreManager`] to one of the knowledge tiers
#[derive(Debug, Clone)]
pub enum KnowledgeQuery {
    Vector {
        query_text: String,
        top_k: usize,
    },
    Graph {
        query: String,
        params: HashMap<String, Value>,
    },
    Search {
        query: String,
        top_k: usize,
    },
}

/// Routes knowledge queries to the appropriate specialized store.
pub struct KnowledgeStoreManager {
    vector_store: Arc<dyn VectorStore>,
    graph_store: Arc<dyn GraphStore>,
    search_index: Arc<dyn SearchIndex>,
}

impl KnowledgeStoreManager {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        graph_store: Arc<dyn GraphStore>,
        search_index: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            vector_store,
            graph_store,
            search_index,
        }
    }

    /// Run a query against the tier it addresses, normalizing rows to JSON
    /// values.
    pub async fn query(&self, query: KnowledgeQuery) -> Result<Vec<Value>> {
        match query {
            KnowledgeQuery::Vector { query_text, top_k } => {
                let docs = self.vector_store.query_similar(&query_text, top_k).await?;
                documents_to_values(docs)
            }
            KnowledgeQuery::Graph { query, params } => {
                let rows = self.graph_store.query(&query, &params).await?;
                rows.into_iter()
                    .map(|row| serde_json::to_value(row).map_err(MemoryError::from))
                    .collect()
            }
            KnowledgeQuery::Search { query, top_k } => {
                let docs = self.search_index.search(&query, top_k).await?;
                documents_to_values(docs)
            }
        }
    }
}

fn documents_to_values(docs: Vec<Document>) -> Result<Vec<Value>> {
    docs.into_iter()
        .map(|doc| {
            let mut value = serde_json::Map::new();
            value.insert("id".to_string(), Value::String(doc.id));
            value.insert("content".to_string(), Value::String(doc.content));
            for (k, v) in doc.metadata {
                value.insert(k, v);
            }
            Ok(Value::Object(value))
        })
        .collect()
}
