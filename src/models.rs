//! Core data models for the memory system
//!
//! Facts carry a CIAR significance score (Certainty x Impact x Age-decay x
//! Recency-boost) that decides whether they survive promotion between
//! retention tiers. All numeric ranges are enforced at construction and on
//! every read of a stored fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::MemoryError;
use crate::Result;

/// Default decay rate per day for [`Fact::apply_age_decay`]
pub const DEFAULT_DECAY_LAMBDA: f64 = 0.1;

/// Stored scores further than this from the recomputed product are replaced
const CIAR_TOLERANCE: f64 = 0.01;

const MAX_CONTENT_LEN: usize = 5000;

//
// ================= Enums =================
//

/// Classification of fact types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    /// User preferences (high impact)
    Preference,
    /// Business rules, requirements
    Constraint,
    /// Named entities, objects
    Entity,
    /// Casual mentions (low impact)
    Mention,
    /// Entity relationships
    Relationship,
    /// Temporal events
    Event,
}

/// Domain-specific fact categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Personal,
    Business,
    Technical,
    Operational,
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactType::Preference => "preference",
            FactType::Constraint => "constraint",
            FactType::Entity => "entity",
            FactType::Mention => "mention",
            FactType::Relationship => "relationship",
            FactType::Event => "event",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for FactCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactCategory::Personal => "personal",
            FactCategory::Business => "business",
            FactCategory::Technical => "technical",
            FactCategory::Operational => "operational",
        };
        write!(f, "{}", s)
    }
}

//
// ================= CIAR =================
//

/// Compute a CIAR score from its four components, rounded to 4 decimals.
///
/// Inputs are assumed to already satisfy their documented ranges
/// (certainty, impact, age_decay in [0, 1]; recency_boost >= 0).
pub fn compute_ciar_score(certainty: f64, impact: f64, age_decay: f64, recency_boost: f64) -> f64 {
    round4(certainty * impact * age_decay * recency_boost)
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn in_unit_range(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}

//
// ================= Fact =================
//

/// A scored unit of retained information in working memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub fact_id: String,
    pub session_id: String,
    /// Natural language fact statement (1-5000 chars)
    pub content: String,

    // CIAR components
    pub ciar_score: f64,
    pub certainty: f64,
    pub impact: f64,
    pub age_decay: f64,
    pub recency_boost: f64,

    // Provenance
    pub source_uri: Option<String>,
    pub source_type: String,

    // Classification
    pub fact_type: Option<FactType>,
    pub fact_category: Option<FactCategory>,

    // Metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    // Timestamps
    pub extracted_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u32,
}

impl Fact {
    /// Create a fact with default CIAR components at extraction time.
    pub fn new(session_id: impl Into<String>, content: impl Into<String>) -> Result<Self> {
        let content = content.into();
        validate_content(&content)?;

        let certainty = 0.7;
        let impact = 0.5;
        let age_decay = 1.0;
        let recency_boost = 1.0;
        let now = Utc::now();

        Ok(Self {
            fact_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            content,
            ciar_score: compute_ciar_score(certainty, impact, age_decay, recency_boost),
            certainty,
            impact,
            age_decay,
            recency_boost,
            source_uri: None,
            source_type: "extracted".to_string(),
            fact_type: None,
            fact_category: None,
            metadata: HashMap::new(),
            extracted_at: now,
            last_accessed: now,
            access_count: 0,
        })
    }

    /// Set the CIAR components, validating ranges and recomputing the score.
    pub fn set_components(
        &mut self,
        certainty: f64,
        impact: f64,
        age_decay: f64,
        recency_boost: f64,
    ) -> Result<()> {
        if !in_unit_range(certainty) {
            return Err(MemoryError::ValidationError(format!(
                "certainty must be in [0, 1], got {}",
                certainty
            )));
        }
        if !in_unit_range(impact) {
            return Err(MemoryError::ValidationError(format!(
                "impact must be in [0, 1], got {}",
                impact
            )));
        }
        if !in_unit_range(age_decay) {
            return Err(MemoryError::ValidationError(format!(
                "age_decay must be in [0, 1], got {}",
                age_decay
            )));
        }
        if recency_boost < 0.0 {
            return Err(MemoryError::ValidationError(format!(
                "recency_boost must be >= 0, got {}",
                recency_boost
            )));
        }

        self.certainty = certainty;
        self.impact = impact;
        self.age_decay = age_decay;
        self.recency_boost = recency_boost;
        self.recompute_score();
        Ok(())
    }

    /// Re-check a fact loaded from storage.
    ///
    /// Range violations are rejected. A stored `ciar_score` inconsistent with
    /// the components by more than 0.01 is recomputed, not trusted.
    pub fn validate(&mut self) -> Result<()> {
        validate_content(&self.content)?;

        if !in_unit_range(self.certainty)
            || !in_unit_range(self.impact)
            || !in_unit_range(self.age_decay)
        {
            return Err(MemoryError::ValidationError(format!(
                "fact '{}' has CIAR components out of range",
                self.fact_id
            )));
        }
        if self.recency_boost < 0.0 {
            return Err(MemoryError::ValidationError(format!(
                "fact '{}' has negative recency_boost",
                self.fact_id
            )));
        }

        let expected = compute_ciar_score(
            self.certainty,
            self.impact,
            self.age_decay,
            self.recency_boost,
        );
        if (self.ciar_score - expected).abs() > CIAR_TOLERANCE {
            self.ciar_score = expected;
        }

        Ok(())
    }

    /// Record an access: bump the counter, boost recency, rescore.
    pub fn mark_accessed(&mut self) {
        self.last_accessed = Utc::now();
        self.access_count += 1;
        // 5% boost per access
        self.recency_boost = 1.0 + 0.05 * self.access_count as f64;
        self.recompute_score();
    }

    /// Refresh the age-decay factor from the time since extraction.
    ///
    /// Decay halves the factor every `1 / decay_lambda` days. Negative
    /// elapsed time (clock skew) counts as zero days, so the factor stays
    /// within [0, 1].
    pub fn apply_age_decay(&mut self, decay_lambda: f64) {
        let age_days = (Utc::now() - self.extracted_at).num_days().max(0);
        let decay = 2f64.powf(-decay_lambda * age_days as f64);
        self.age_decay = round4(decay.clamp(0.0, 1.0));
        self.recompute_score();
    }

    fn recompute_score(&mut self) {
        self.ciar_score = compute_ciar_score(
            self.certainty,
            self.impact,
            self.age_decay,
            self.recency_boost,
        );
    }
}

fn validate_content(content: &str) -> Result<()> {
    if content.is_empty() || content.chars().count() > MAX_CONTENT_LEN {
        return Err(MemoryError::ValidationError(format!(
            "fact content must be 1-{} chars, got {}",
            MAX_CONTENT_LEN,
            content.chars().count()
        )));
    }
    Ok(())
}

//
// ================= Fact Query =================
//

/// Ordering key for fact retrieval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FactOrdering {
    CiarScoreDesc,
    ExtractedAtDesc,
    LastAccessedDesc,
}

/// Query parameters for retrieving facts from a fact store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactQuery {
    pub session_id: Option<String>,
    /// Minimum CIAR score for a fact to qualify
    pub min_ciar_score: f64,
    pub fact_types: Option<Vec<FactType>>,
    pub fact_categories: Option<Vec<FactCategory>>,
    /// Result cap (1-100)
    pub limit: usize,
    pub order_by: FactOrdering,
}

impl Default for FactQuery {
    fn default() -> Self {
        Self {
            session_id: None,
            min_ciar_score: 0.6,
            fact_types: None,
            fact_categories: None,
            limit: 10,
            order_by: FactOrdering::CiarScoreDesc,
        }
    }
}

impl FactQuery {
    pub fn validate(&self) -> Result<()> {
        if !in_unit_range(self.min_ciar_score) {
            return Err(MemoryError::ValidationError(format!(
                "min_ciar_score must be in [0, 1], got {}",
                self.min_ciar_score
            )));
        }
        if self.limit < 1 || self.limit > 100 {
            return Err(MemoryError::ValidationError(format!(
                "limit must be 1-100, got {}",
                self.limit
            )));
        }
        Ok(())
    }
}
