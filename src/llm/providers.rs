//! Provider implementations for the generation client
//!
//! Wraps the Gemini, Groq, and Mistral REST APIs behind the [`LlmProvider`]
//! interface. Each provider holds a long-lived reqwest::Client for
//! connection pooling.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::error;

use crate::error::MemoryError;
use crate::llm::{GenerationParams, LlmProvider, LlmResponse, TokenUsage};
use crate::Result;

fn build_http_client() -> Client {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .build()
        .expect("Failed to build HTTP client")
}

//
// ================= Gemini =================
//

/// Google Gemini provider (generateContent API)
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    pub const DEFAULT_MODEL: &'static str = "gemini-2.5-flash";

    pub fn new(api_key: String) -> Self {
        Self {
            client: build_http_client(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    /// Build from `GEMINI_API_KEY`, if set
    pub fn from_env() -> Option<Self> {
        env::var("GEMINI_API_KEY").ok().map(Self::new)
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &GenerationParams,
    ) -> Result<LlmResponse> {
        let model = model.unwrap_or(Self::DEFAULT_MODEL);
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_output_tokens,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(MemoryError::ProviderError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let body: GeminiResponse = response.json().await?;

        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                MemoryError::ProviderError("Empty response from Gemini".to_string())
            })?;

        let usage = body.usage_metadata.map(|u| TokenUsage {
            prompt_tokens: u.prompt_token_count,
            response_tokens: u.candidates_token_count,
            total: u.total_token_count,
        });

        Ok(LlmResponse {
            text,
            provider: self.name().to_string(),
            model: Some(model.to_string()),
            usage,
            metadata: None,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

//
// ================= OpenAI-style chat APIs =================
//

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

async fn chat_completion(
    client: &Client,
    url: &str,
    api_key: &str,
    provider_name: &str,
    model: &str,
    prompt: &str,
    params: &GenerationParams,
) -> Result<LlmResponse> {
    let request = ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        }],
        temperature: params.temperature,
        max_tokens: params.max_output_tokens,
    };

    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let error_text = response.text().await.unwrap_or_default();
        error!("{} API error response: {}", provider_name, error_text);
        return Err(MemoryError::ProviderError(format!(
            "{} API error: {}",
            provider_name, error_text
        )));
    }

    let body: ChatResponse = response.json().await?;

    let text = body
        .choices
        .first()
        .map(|c| c.message.content.clone())
        .ok_or_else(|| {
            MemoryError::ProviderError(format!("Empty response from {}", provider_name))
        })?;

    let usage = body.usage.map(|u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        response_tokens: u.completion_tokens,
        total: u.total_tokens,
    });

    Ok(LlmResponse {
        text,
        provider: provider_name.to_string(),
        model: Some(model.to_string()),
        usage,
        metadata: None,
    })
}

//
// ================= Groq =================
//

/// Groq provider (OpenAI-compatible chat completions)
pub struct GroqProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GroqProvider {
    pub const DEFAULT_MODEL: &'static str = "llama-3.1-8b-instant";

    pub fn new(api_key: String) -> Self {
        Self {
            client: build_http_client(),
            api_key,
            base_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
        }
    }

    /// Build from `GROQ_API_KEY`, if set
    pub fn from_env() -> Option<Self> {
        env::var("GROQ_API_KEY").ok().map(Self::new)
    }
}

#[async_trait::async_trait]
impl LlmProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &GenerationParams,
    ) -> Result<LlmResponse> {
        let model = model.unwrap_or(Self::DEFAULT_MODEL);
        chat_completion(
            &self.client,
            &self.base_url,
            &self.api_key,
            self.name(),
            model,
            prompt,
            params,
        )
        .await
    }
}

//
// ================= Mistral =================
//

/// Mistral provider (OpenAI-compatible chat completions)
pub struct MistralProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl MistralProvider {
    pub const DEFAULT_MODEL: &'static str = "mistral-small-latest";

    pub fn new(api_key: String) -> Self {
        Self {
            client: build_http_client(),
            api_key,
            base_url: "https://api.mistral.ai/v1/chat/completions".to_string(),
        }
    }

    /// Build from `MISTRAL_API_KEY`, if set
    pub fn from_env() -> Option<Self> {
        env::var("MISTRAL_API_KEY").ok().map(Self::new)
    }
}

#[async_trait::async_trait]
impl LlmProvider for MistralProvider {
    fn name(&self) -> &str {
        "mistral"
    }

    async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &GenerationParams,
    ) -> Result<LlmResponse> {
        let model = model.unwrap_or(Self::DEFAULT_MODEL);
        chat_completion(
            &self.client,
            &self.base_url,
            &self.api_key,
            self.name(),
            model,
            prompt,
            params,
        )
        .await
    }
}
