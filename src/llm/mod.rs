//! Multi-provider LLM client with ordered fallback
//!
//! Manages a set of named text-generation providers and tries them in a
//! configurable preference order with a per-attempt timeout. The first
//! success wins; the last failure is surfaced once every provider in the
//! order has failed.

pub mod providers;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::MemoryError;
use crate::Result;

/// Per-attempt timeout applied when the caller does not override it
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const DEFAULT_PROVIDER_ORDER: [&str; 3] = ["gemini", "groq", "mistral"];

/// Token accounting reported by a provider, when available
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub response_tokens: Option<u32>,
    pub total: Option<u32>,
}

/// A completed generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    /// Name of the provider that produced the text
    pub provider: String,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
    pub metadata: Option<serde_json::Value>,
}

/// Sampling parameters forwarded to the provider
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_output_tokens: 256,
        }
    }
}

/// Options for a single `generate` call
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Model name passed through to the provider; each provider has its own
    /// default when absent
    pub model: Option<String>,
    /// Provider to try first, ahead of the preference order
    pub provider_priority: Option<String>,
    /// Per-attempt timeout (default 10s)
    pub timeout: Option<Duration>,
    pub params: GenerationParams,
}

/// Capability interface for a text-generation backend.
///
/// Implementations are registered against a name on the [`LlmClient`];
/// dispatch happens at runtime, not compile time.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
        params: &GenerationParams,
    ) -> Result<LlmResponse>;
}

/// LLM client with provider management and sequential fallback.
///
/// Stateless across calls except for the registered provider set. Attempts
/// run one after another, never as a concurrent fan-out, so total wall time
/// is bounded by attempts x timeout.
pub struct LlmClient {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    provider_order: Vec<String>,
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            provider_order: DEFAULT_PROVIDER_ORDER
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Register a provider under a name, appending unknown names to the
    /// preference order.
    pub fn register_provider(&mut self, name: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        let name = name.into();
        if !self.provider_order.contains(&name) {
            self.provider_order.push(name.clone());
        }
        self.providers.insert(name, provider);
    }

    pub fn registered_providers(&self) -> Vec<&str> {
        self.provider_order
            .iter()
            .filter(|name| self.providers.contains_key(*name))
            .map(String::as_str)
            .collect()
    }

    /// Generate text, falling back across providers in order.
    ///
    /// Returns the first successful response. A timeout or provider error is
    /// a soft failure that moves on to the next provider; once the order is
    /// exhausted the last error is returned. Dropping the returned future
    /// cancels the in-flight attempt without continuing down the order.
    pub async fn generate(&self, prompt: &str, options: GenerateOptions) -> Result<LlmResponse> {
        let order = self.attempt_order(options.provider_priority.as_deref());
        let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let model = options.model.as_deref();

        let mut last_err: Option<MemoryError> = None;

        for name in order {
            let Some(provider) = self.providers.get(&name) else {
                continue;
            };

            match tokio::time::timeout(timeout, provider.generate(prompt, model, &options.params))
                .await
            {
                Ok(Ok(mut response)) => {
                    if response.provider.is_empty() {
                        response.provider = name;
                    }
                    return Ok(response);
                }
                Ok(Err(e)) => {
                    warn!(provider = %name, "Provider failed: {}", e);
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!(provider = %name, "Provider timed out after {:?}", timeout);
                    last_err = Some(MemoryError::ProviderTimeout(name));
                }
            }
        }

        Err(last_err.unwrap_or(MemoryError::NoProvidersConfigured))
    }

    /// Priority provider first, then the remaining registered providers in
    /// preference order. Names with no registered implementation are kept
    /// out of the result except for the explicit priority, which is skipped
    /// at call time.
    fn attempt_order(&self, priority: Option<&str>) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        if let Some(p) = priority {
            order.push(p.to_string());
        }
        for name in &self.provider_order {
            if !order.iter().any(|n| n == name) && self.providers.contains_key(name) {
                order.push(name.clone());
            }
        }
        order
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProvider {
        name: String,
        response_text: Option<String>,
        delay: Option<Duration>,
    }

    impl MockProvider {
        fn ok(name: &str, text: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                response_text: Some(text.to_string()),
                delay: None,
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                response_text: None,
                delay: None,
            })
        }

        fn slow(name: &str, text: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                response_text: Some(text.to_string()),
                delay: Some(delay),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(
            &self,
            _prompt: &str,
            model: Option<&str>,
            _params: &GenerationParams,
        ) -> Result<LlmResponse> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.response_text {
                Some(text) => Ok(LlmResponse {
                    text: text.clone(),
                    provider: self.name.clone(),
                    model: Some(model.unwrap_or("mock-model").to_string()),
                    usage: None,
                    metadata: None,
                }),
                None => Err(MemoryError::ProviderError(format!("{} boom", self.name))),
            }
        }
    }

    #[tokio::test]
    async fn test_fallback_to_next_provider() {
        let mut client = LlmClient::new();
        client.register_provider("gemini", MockProvider::failing("gemini"));
        client.register_provider("groq", MockProvider::ok("groq", "X"));

        let resp = client
            .generate("What is 2+2?", GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(resp.text, "X");
        assert_eq!(resp.provider, "groq");
    }

    #[tokio::test]
    async fn test_priority_override_skips_default_order() {
        let mut client = LlmClient::new();
        client.register_provider("gemini", MockProvider::ok("gemini", "gemini-ok"));
        client.register_provider("groq", MockProvider::ok("groq", "groq-ok"));

        let options = GenerateOptions {
            provider_priority: Some("groq".to_string()),
            ..Default::default()
        };
        let resp = client.generate("Q", options).await.unwrap();

        assert_eq!(resp.text, "groq-ok");
        assert_eq!(resp.provider, "groq");
    }

    #[tokio::test]
    async fn test_all_fail_surfaces_last_error() {
        let mut client = LlmClient::new();
        client.register_provider("gemini", MockProvider::failing("gemini"));
        client.register_provider("groq", MockProvider::failing("groq"));

        let err = client
            .generate("Q", GenerateOptions::default())
            .await
            .unwrap_err();

        // groq is attempted last in the default order
        match err {
            MemoryError::ProviderError(msg) => assert!(msg.contains("groq")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_providers_configured() {
        let client = LlmClient::new();
        let err = client
            .generate("Q", GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MemoryError::NoProvidersConfigured));
    }

    #[tokio::test]
    async fn test_unregistered_priority_is_skipped() {
        let mut client = LlmClient::new();
        client.register_provider("groq", MockProvider::ok("groq", "groq-ok"));

        let options = GenerateOptions {
            provider_priority: Some("nonexistent".to_string()),
            ..Default::default()
        };
        let resp = client.generate("Q", options).await.unwrap();

        assert_eq!(resp.provider, "groq");
    }

    #[tokio::test]
    async fn test_timeout_falls_through_to_next_provider() {
        let mut client = LlmClient::new();
        client.register_provider(
            "gemini",
            MockProvider::slow("gemini", "late", Duration::from_secs(5)),
        );
        client.register_provider("groq", MockProvider::ok("groq", "fast"));

        let options = GenerateOptions {
            timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let resp = client.generate("Q", options).await.unwrap();

        assert_eq!(resp.text, "fast");
        assert_eq!(resp.provider, "groq");
    }

    #[tokio::test]
    async fn test_registration_extends_order() {
        let mut client = LlmClient::new();
        client.register_provider("local", MockProvider::ok("local", "local-ok"));

        assert_eq!(client.registered_providers(), vec!["local"]);

        let resp = client
            .generate("Q", GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.provider, "local");
    }
}
