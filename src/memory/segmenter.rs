//! Topic segmentation engine for batch compression of conversational turns
//!
//! Takes 10-20 raw turns at a time, makes a single LLM call, compresses
//! conversational noise, and segments the batch into coherent topics with
//! certainty/impact metadata for CIAR scoring. Segmentation never fails for
//! a well-formed batch: any LLM or parsing failure degrades to a single
//! fallback segment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::llm::{GenerateOptions, GenerationParams, LlmClient};
use crate::Result;

const SEGMENTATION_TEMPERATURE: f32 = 0.3;
const SEGMENTATION_MAX_TOKENS: u32 = 2048;

/// One raw conversational turn as accumulated by the capture tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConversationTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// A coherent topic extracted from a batch of turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSegment {
    pub segment_id: String,
    /// Brief topic label (3-200 chars)
    pub topic: String,
    /// Concise summary of the conversation segment (10-2000 chars)
    pub summary: String,
    /// Significant points discussed, at most 20
    pub key_points: Vec<String>,
    /// Indices of source turns in the batch that produced this segment
    pub turn_indices: Vec<usize>,
    /// Confidence in segment extraction (0.0-1.0)
    pub certainty: f64,
    /// Estimated importance of this topic (0.0-1.0)
    pub impact: f64,
    pub participant_count: u32,
    pub message_count: u32,
    /// Temporal markers mentioned in the segment (dates, deadlines)
    #[serde(default)]
    pub temporal_context: HashMap<String, Value>,
}

impl TopicSegment {
    /// Check constraints against the batch this segment was produced from.
    pub fn validate(&self, batch_len: usize) -> Result<()> {
        let topic_len = self.topic.chars().count();
        if !(3..=200).contains(&topic_len) {
            return Err(MemoryError::ValidationError(format!(
                "topic must be 3-200 chars, got {}",
                topic_len
            )));
        }

        let summary_len = self.summary.chars().count();
        if !(10..=2000).contains(&summary_len) {
            return Err(MemoryError::ValidationError(format!(
                "summary must be 10-2000 chars, got {}",
                summary_len
            )));
        }

        if self.key_points.len() > 20 {
            return Err(MemoryError::ValidationError(format!(
                "at most 20 key points allowed, got {}",
                self.key_points.len()
            )));
        }

        if !(0.0..=1.0).contains(&self.certainty) || !(0.0..=1.0).contains(&self.impact) {
            return Err(MemoryError::ValidationError(
                "certainty and impact must be in [0, 1]".to_string(),
            ));
        }

        if let Some(&idx) = self.turn_indices.iter().find(|&&idx| idx >= batch_len) {
            return Err(MemoryError::ValidationError(format!(
                "turn index {} outside batch of {} turns",
                idx, batch_len
            )));
        }

        Ok(())
    }
}

/// Configuration for the segmentation engine
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Model used for the per-batch segmentation call
    pub model_name: String,
    /// Batches smaller than this are skipped entirely
    pub min_turns: usize,
    /// Larger batches keep only their most recent turns
    pub max_turns: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            model_name: "gemini-2.5-flash".to_string(),
            min_turns: 10,
            max_turns: 20,
        }
    }
}

/// Segments batches of conversation turns into coherent topics using one
/// LLM call per batch.
pub struct TopicSegmenter {
    llm_client: Arc<LlmClient>,
    config: SegmenterConfig,
    system_prompt: String,
}

impl TopicSegmenter {
    pub fn new(llm_client: Arc<LlmClient>) -> Self {
        Self::with_config(llm_client, SegmenterConfig::default())
    }

    pub fn with_config(llm_client: Arc<LlmClient>, config: SegmenterConfig) -> Self {
        Self {
            llm_client,
            config,
            system_prompt: build_system_prompt(),
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Segment a batch of turns into coherent topics.
    ///
    /// An empty batch or one below `min_turns` yields no segments. Batches
    /// above `max_turns` keep only the most recent turns, renumbered from
    /// zero. Every other outcome yields at least one segment: LLM failure,
    /// unparseable output, or all candidates failing validation produce a
    /// single fallback segment spanning the retained batch.
    pub async fn segment_turns(
        &self,
        turns: &[ConversationTurn],
        metadata: Option<&HashMap<String, Value>>,
    ) -> Vec<TopicSegment> {
        if turns.is_empty() {
            return Vec::new();
        }

        if turns.len() < self.config.min_turns {
            info!(
                "Turn count ({}) below minimum ({}). Skipping segmentation.",
                turns.len(),
                self.config.min_turns
            );
            return Vec::new();
        }

        let retained = if turns.len() > self.config.max_turns {
            warn!(
                "Turn count ({}) exceeds maximum ({}). Truncating.",
                turns.len(),
                self.config.max_turns
            );
            &turns[turns.len() - self.config.max_turns..]
        } else {
            turns
        };

        match self.segment_with_llm(retained, metadata).await {
            Ok(segments) if !segments.is_empty() => segments,
            Ok(_) => {
                warn!("No valid segments from LLM. Using fallback.");
                vec![fallback_segment(retained)]
            }
            Err(e) => {
                error!("Topic segmentation failed: {}", e);
                vec![fallback_segment(retained)]
            }
        }
    }

    async fn segment_with_llm(
        &self,
        turns: &[ConversationTurn],
        metadata: Option<&HashMap<String, Value>>,
    ) -> Result<Vec<TopicSegment>> {
        let formatted = format_conversation(turns);

        let context_line = match metadata {
            Some(meta) if !meta.is_empty() => {
                format!("\nSession context: {}\n", serde_json::to_string(meta)?)
            }
            _ => String::new(),
        };

        let prompt = format!(
            "{}\n\nConversation to segment:\n\n{}\n{}\nNow segment this conversation into coherent topics. Return JSON only.",
            self.system_prompt, formatted, context_line
        );

        let options = GenerateOptions {
            model: Some(self.config.model_name.clone()),
            params: GenerationParams {
                temperature: SEGMENTATION_TEMPERATURE,
                max_output_tokens: SEGMENTATION_MAX_TOKENS,
            },
            ..Default::default()
        };

        let response = self.llm_client.generate(&prompt, options).await?;
        parse_segments(&response.text, turns.len())
    }
}

/// Parse the model's JSON into validated segments. Candidates that fail to
/// deserialize or validate are dropped individually; a response that cannot
/// be parsed at all is an error.
fn parse_segments(raw: &str, batch_len: usize) -> Result<Vec<TopicSegment>> {
    let cleaned = strip_code_fences(raw);

    let data: Value = serde_json::from_str(cleaned)?;
    let raw_segments = data
        .get("segments")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut segments = Vec::new();
    for rs in raw_segments {
        let candidate: SegmentCandidate = match serde_json::from_value(rs) {
            Ok(c) => c,
            Err(e) => {
                warn!("Skipping malformed segment from LLM: {}", e);
                continue;
            }
        };

        let segment = candidate.into_segment();
        match segment.validate(batch_len) {
            Ok(()) => segments.push(segment),
            Err(e) => warn!("Skipping invalid segment from LLM: {}", e),
        }
    }

    Ok(segments)
}

/// Shape the LLM is asked to produce per segment; missing optional fields
/// take the documented defaults
#[derive(Debug, Deserialize)]
struct SegmentCandidate {
    topic: String,
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    turn_indices: Vec<usize>,
    certainty: Option<f64>,
    impact: Option<f64>,
    participant_count: Option<u32>,
    message_count: Option<u32>,
    #[serde(default)]
    temporal_context: HashMap<String, Value>,
}

impl SegmentCandidate {
    fn into_segment(self) -> TopicSegment {
        TopicSegment {
            segment_id: Uuid::new_v4().to_string(),
            topic: self.topic,
            summary: self.summary,
            key_points: self.key_points,
            turn_indices: self.turn_indices,
            certainty: self.certainty.unwrap_or(0.7),
            impact: self.impact.unwrap_or(0.5),
            participant_count: self.participant_count.unwrap_or(0),
            message_count: self.message_count.unwrap_or(0),
            temporal_context: self.temporal_context,
        }
    }
}

/// Strip a surrounding markdown code fence, if present
fn strip_code_fences(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Format turns as `[idx] Role (timestamp): content`, indices renumbered
/// from 0 over the retained subset
fn format_conversation(turns: &[ConversationTurn]) -> String {
    let mut lines = Vec::with_capacity(turns.len());
    for (idx, turn) in turns.iter().enumerate() {
        let ts_str = turn
            .timestamp
            .map(|ts| format!(" ({})", ts.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_default();
        lines.push(format!(
            "[{}] {}{}: {}",
            idx,
            capitalize(&turn.role),
            ts_str,
            turn.content
        ));
    }
    lines.join("\n")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Single degraded segment covering the whole retained batch
fn fallback_segment(turns: &[ConversationTurn]) -> TopicSegment {
    let participants: HashSet<&str> = turns.iter().map(|t| t.role.as_str()).collect();

    TopicSegment {
        segment_id: Uuid::new_v4().to_string(),
        topic: "General Discussion".to_string(),
        summary: format!(
            "Conversation with {} turns discussing various topics.",
            turns.len()
        ),
        key_points: vec!["Fallback segmentation due to LLM failure".to_string()],
        turn_indices: (0..turns.len()).collect(),
        certainty: 0.3,
        impact: 0.5,
        participant_count: participants.len() as u32,
        message_count: turns.len() as u32,
        temporal_context: HashMap::new(),
    }
}

fn build_system_prompt() -> String {
    r#"You are an expert at analyzing supply chain and logistics conversations.

Your task: Segment a batch of conversation turns into coherent topics.

Instructions:
1. Identify distinct topics or themes discussed in the conversation
2. Group related turns into segments
3. For each segment, extract:
   - topic: Brief descriptive label (3-50 words)
   - summary: Concise narrative of what was discussed (50-500 words)
   - key_points: List of 3-10 significant points from the segment
   - turn_indices: Indices (0-based) of turns belonging to this segment
   - certainty: Your confidence in this segmentation (0.0-1.0)
   - impact: Estimated importance/urgency of this topic (0.0-1.0)
   - participant_count: Number of distinct speakers
   - message_count: Number of messages in segment
   - temporal_context: Any dates, times, deadlines mentioned

Guidelines:
- Compress noise: Skip greetings, acknowledgments, filler
- Merge related sub-topics into one segment
- Assign high impact (0.7-1.0) to: urgent requests, critical alerts, decisions, commitments
- Assign medium impact (0.4-0.7) to: informational queries, status updates
- Assign low impact (0.0-0.4) to: casual discussion, small talk
- Certainty based on: clarity of topic, coherence of discussion

Return JSON: {"segments": [list of segment objects]}"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmProvider, LlmResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted provider that records prompts and counts calls
    struct ScriptedProvider {
        response: Option<String>,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedProvider {
        fn responding(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Some(response.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: None,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            prompt: &str,
            model: Option<&str>,
            _params: &GenerationParams,
        ) -> Result<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            match &self.response {
                Some(text) => Ok(LlmResponse {
                    text: text.clone(),
                    provider: "scripted".to_string(),
                    model: model.map(|m| m.to_string()),
                    usage: None,
                    metadata: None,
                }),
                None => Err(MemoryError::ProviderError("scripted failure".to_string())),
            }
        }
    }

    fn segmenter_with(provider: Arc<ScriptedProvider>) -> TopicSegmenter {
        let mut client = LlmClient::new();
        client.register_provider("scripted", provider);
        TopicSegmenter::new(Arc::new(client))
    }

    fn make_turns(count: usize) -> Vec<ConversationTurn> {
        (0..count)
            .map(|i| {
                let role = if i % 2 == 0 { "user" } else { "agent" };
                ConversationTurn::new(role, format!("Turn {} about vessel scheduling", i))
            })
            .collect()
    }

    const TWO_SEGMENT_RESPONSE: &str = r#"{
        "segments": [
            {
                "topic": "Container ETA Query",
                "summary": "Discussion about the expected arrival of container MSKU-443 and berth assignment.",
                "key_points": ["ETA pushed to Thursday", "Berth B7 reserved"],
                "turn_indices": [0, 1, 2, 3, 4],
                "certainty": 0.9,
                "impact": 0.7,
                "participant_count": 2,
                "message_count": 5
            },
            {
                "topic": "Customs Hold",
                "summary": "A secondary inspection was flagged for vessel V-123, pending broker documents.",
                "key_points": ["Secondary inspection required"],
                "turn_indices": [5, 6, 7, 8, 9],
                "certainty": 0.8,
                "impact": 0.9,
                "participant_count": 2,
                "message_count": 5
            }
        ]
    }"#;

    #[tokio::test]
    async fn test_empty_batch_yields_no_segments() {
        let provider = ScriptedProvider::responding(TWO_SEGMENT_RESPONSE);
        let segmenter = segmenter_with(provider.clone());

        let segments = segmenter.segment_turns(&[], None).await;
        assert!(segments.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_below_minimum_is_skipped() {
        let provider = ScriptedProvider::responding(TWO_SEGMENT_RESPONSE);
        let segmenter = segmenter_with(provider.clone());

        let segments = segmenter.segment_turns(&make_turns(5), None).await;
        assert!(segments.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_call_parses_segments() {
        let provider = ScriptedProvider::responding(TWO_SEGMENT_RESPONSE);
        let segmenter = segmenter_with(provider.clone());

        let segments = segmenter.segment_turns(&make_turns(10), None).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].topic, "Container ETA Query");
        assert_eq!(segments[1].impact, 0.9);
        assert_eq!(segments[1].turn_indices, vec![5, 6, 7, 8, 9]);
    }

    #[tokio::test]
    async fn test_fenced_response_is_parsed() {
        let fenced = format!("```json\n{}\n```", TWO_SEGMENT_RESPONSE);
        let provider = ScriptedProvider::responding(&fenced);
        let segmenter = segmenter_with(provider);

        let segments = segmenter.segment_turns(&make_turns(10), None).await;
        assert_eq!(segments.len(), 2);
    }

    #[tokio::test]
    async fn test_llm_failure_yields_single_fallback() {
        let provider = ScriptedProvider::failing();
        let segmenter = segmenter_with(provider);

        let turns = make_turns(12);
        let segments = segmenter.segment_turns(&turns, None).await;

        assert_eq!(segments.len(), 1);
        let fallback = &segments[0];
        assert_eq!(fallback.topic, "General Discussion");
        assert_eq!(fallback.certainty, 0.3);
        assert_eq!(fallback.impact, 0.5);
        assert_eq!(fallback.turn_indices, (0..12).collect::<Vec<_>>());
        assert_eq!(fallback.participant_count, 2);
        assert_eq!(fallback.message_count, 12);
    }

    #[tokio::test]
    async fn test_oversized_batch_truncates_to_most_recent() {
        let provider = ScriptedProvider::failing();
        let segmenter = segmenter_with(provider.clone());

        let segments = segmenter.segment_turns(&make_turns(25), None).await;

        // Fallback covers exactly the retained 20 most recent turns
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].message_count, 20);
        assert_eq!(segments[0].turn_indices, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_transcript_indices_renumbered_after_truncation() {
        let provider = ScriptedProvider::responding(TWO_SEGMENT_RESPONSE);
        let segmenter = segmenter_with(provider.clone());

        segmenter.segment_turns(&make_turns(25), None).await;

        let prompt = provider.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("[0] "));
        assert!(prompt.contains("[19] "));
        assert!(!prompt.contains("[20] "));
        // Oldest turns dropped; the retained window starts at original turn 5
        assert!(prompt.contains("Turn 5 about vessel scheduling"));
        assert!(!prompt.contains("Turn 4 about vessel scheduling"));
    }

    #[tokio::test]
    async fn test_unparseable_response_yields_fallback() {
        let provider = ScriptedProvider::responding("I could not segment this conversation.");
        let segmenter = segmenter_with(provider);

        let segments = segmenter.segment_turns(&make_turns(10), None).await;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].topic, "General Discussion");
    }

    #[tokio::test]
    async fn test_empty_segment_list_yields_fallback() {
        let provider = ScriptedProvider::responding(r#"{"segments": []}"#);
        let segmenter = segmenter_with(provider);

        let segments = segmenter.segment_turns(&make_turns(10), None).await;
        assert_eq!(segments.len(), 1);
        assert_eq!(
            segments[0].key_points,
            vec!["Fallback segmentation due to LLM failure"]
        );
    }

    #[tokio::test]
    async fn test_invalid_candidates_dropped_individually() {
        let mixed = r#"{
            "segments": [
                {
                    "topic": "Ok",
                    "summary": "short",
                    "turn_indices": [0]
                },
                {
                    "topic": "Berth Planning",
                    "summary": "Assignments were settled for the incoming vessels this week.",
                    "turn_indices": [1, 2]
                }
            ]
        }"#;
        let provider = ScriptedProvider::responding(mixed);
        let segmenter = segmenter_with(provider);

        // First candidate fails validation (summary too short), second survives
        let segments = segmenter.segment_turns(&make_turns(10), None).await;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].topic, "Berth Planning");
        assert_eq!(segments[0].certainty, 0.7);
        assert_eq!(segments[0].impact, 0.5);
    }

    #[tokio::test]
    async fn test_out_of_range_turn_index_drops_candidate() {
        let out_of_range = r#"{
            "segments": [
                {
                    "topic": "Berth Planning",
                    "summary": "Assignments were settled for the incoming vessels this week.",
                    "turn_indices": [99]
                }
            ]
        }"#;
        let provider = ScriptedProvider::responding(out_of_range);
        let segmenter = segmenter_with(provider);

        let segments = segmenter.segment_turns(&make_turns(10), None).await;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].topic, "General Discussion");
    }

    #[tokio::test]
    async fn test_metadata_reaches_prompt() {
        let provider = ScriptedProvider::responding(TWO_SEGMENT_RESPONSE);
        let segmenter = segmenter_with(provider.clone());

        let mut meta = HashMap::new();
        meta.insert(
            "session_id".to_string(),
            Value::String("session-42".to_string()),
        );
        segmenter.segment_turns(&make_turns(10), Some(&meta)).await;

        let prompt = provider.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("session-42"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("{}"), "{}");
    }

    #[test]
    fn test_format_conversation_shape() {
        let turns = vec![
            ConversationTurn {
                role: "user".to_string(),
                content: "Where is MSKU-443?".to_string(),
                timestamp: None,
            },
            ConversationTurn {
                role: "agent".to_string(),
                content: "In transit.".to_string(),
                timestamp: None,
            },
        ];

        let formatted = format_conversation(&turns);
        assert_eq!(formatted, "[0] User: Where is MSKU-443?\n[1] Agent: In transit.");
    }

    #[test]
    fn test_segment_validation_bounds() {
        let mut segment = fallback_segment(&make_turns(3));
        segment.validate(3).unwrap();

        segment.topic = "ab".to_string();
        assert!(segment.validate(3).is_err());

        segment.topic = "Valid Topic".to_string();
        segment.certainty = 1.5;
        assert!(segment.validate(3).is_err());

        segment.certainty = 0.5;
        segment.key_points = vec!["p".to_string(); 21];
        assert!(segment.validate(3).is_err());
    }
}
