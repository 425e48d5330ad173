//! A thin HTTP wrapper around an OpenAI-compatible `/chat/completions`
//! endpoint (§4.1). Safe for concurrent use; backed by a pooled `reqwest`
//! client with `backoff` retry on transport errors.

use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Options for a single `chat` call; `generate`/`generate_json` build one
/// of these internally.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        GenerationOptions {
            temperature: 0.7,
            max_tokens: 2048,
        }
    }
}

pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(LlmClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }

    /// Single-message generation. Returns the assistant reply's content.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let opts = GenerationOptions {
            temperature,
            max_tokens,
        };
        let reply = self.chat(messages, opts).await?;
        Ok(reply.content)
    }

    /// Wraps `generate`, strips fenced-code wrappers, and parses the result
    /// as structured JSON. On parse failure returns `{"raw": ..., "error":
    /// "parse_failed"}` rather than raising (§4.1).
    pub async fn generate_json(&self, prompt: &str, system: Option<&str>) -> Result<Value> {
        let text = self.generate(prompt, system, 0.0, 1024).await?;
        Ok(parse_json_reply(&text))
    }

    /// Multi-turn chat for few-shot prompting.
    pub async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        options: GenerationOptions,
    ) -> Result<ChatMessage> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(self.timeout))
            .build();

        let result = retry(backoff, || {
            let request = &request;
            let url = &url;
            let api_key = &self.api_key;
            let http = &self.http;
            async move {
                let mut req = http.post(url).json(request);
                if let Some(key) = api_key {
                    req = req.bearer_auth(key);
                }

                let response = req.send().await.map_err(|e| {
                    warn!("LLM request failed, will retry: {e}");
                    backoff::Error::transient(Error::Llm(e.to_string()))
                })?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let err = Error::Llm(format!("non-2xx response {}: {}", status, body));
                    return if status.is_server_error() {
                        Err(backoff::Error::transient(err))
                    } else {
                        Err(backoff::Error::permanent(err))
                    };
                }

                let parsed: ChatResponse = response
                    .json()
                    .await
                    .map_err(|e| backoff::Error::permanent(Error::Llm(e.to_string())))?;

                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message)
                    .ok_or_else(|| {
                        backoff::Error::permanent(Error::Llm(
                            "empty choices in LLM response".to_string(),
                        ))
                    })
            }
        })
        .await;

        result
    }
}

/// Strip ```json ... ``` / ``` ... ``` fencing and parse. On any failure,
/// returns a soft-failure object rather than propagating an error, matching
/// §4.1's "neurons treat as a soft failure" contract.
pub fn parse_json_reply(text: &str) -> Value {
    let stripped = strip_code_fence(text);
    match serde_json::from_str(&stripped) {
        Ok(value) => value,
        Err(_) => serde_json::json!({ "raw": text, "error": "parse_failed" }),
    }
}

fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
        let rest = rest.trim_start_matches(['\n', '\r']);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence_json() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_code_fence_plain() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(text), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_reply_valid() {
        let v = parse_json_reply("{\"intent\": \"tool\"}");
        assert_eq!(v["intent"], "tool");
    }

    #[test]
    fn test_parse_json_reply_invalid_is_soft_failure() {
        let v = parse_json_reply("not json at all");
        assert_eq!(v["error"], "parse_failed");
        assert_eq!(v["raw"], "not json at all");
    }
}
