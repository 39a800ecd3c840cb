//! HTTP client for the reasoning service

use crate::prompt;
use async_trait::async_trait;
use sc_core::{AiServiceError, AnalyzeRequest, GenerateRequest, ReasoningClient, RewriteRequest};
use serde::Deserialize;
use tokio::time::Duration;
use tracing::{debug, warn};

/// Reasoning service configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-request timeout (seconds); kept within the 30-60s envelope
    pub timeout_secs: u64,
    /// Retries on transient failure (timeout, 429, 5xx)
    pub max_retries: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            timeout_secs: 45,
            max_retries: 1,
            temperature: 0.2,
        }
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint
pub struct HttpReasoningClient {
    config: LlmConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl HttpReasoningClient {
    pub fn new(config: LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("failed to build reqwest client");
        Self { config, http }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Send one prompt, retrying once on transient failure.
    async fn complete(&self, user_prompt: String) -> Result<String, AiServiceError> {
        let mut attempt = 0;
        loop {
            match self.send(&user_prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "transient reasoning failure, retrying");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(&self, user_prompt: &str) -> Result<String, AiServiceError> {
        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "system", "content": prompt::SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt}
            ]
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiServiceError::Timeout(self.config.timeout_secs)
                } else {
                    AiServiceError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiServiceError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                AiServiceError::MalformedResponse("response carried no message content".to_string())
            })?;

        debug!(bytes = content.len(), "reasoning response received");
        Ok(content)
    }
}

/// Map an HTTP status to the service error taxonomy.
fn classify_http_error(status: u16, body: &str) -> AiServiceError {
    match status {
        401 | 403 => AiServiceError::Auth(format!("status {}", status)),
        429 => AiServiceError::RateLimited(truncate(body, 200)),
        500..=599 => AiServiceError::Server {
            status: Some(status),
            message: truncate(body, 200),
        },
        _ => AiServiceError::Transport(format!("HTTP {}: {}", status, truncate(body, 200))),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[async_trait]
impl ReasoningClient for HttpReasoningClient {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<String, AiServiceError> {
        self.complete(prompt::analyze_prompt(request)).await
    }

    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, AiServiceError> {
        self.complete(prompt::rewrite_prompt(request)).await
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, AiServiceError> {
        self.complete(prompt::generate_prompt(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted chat endpoint: serves the queued responses in order and
    /// counts every hit.
    #[derive(Clone)]
    struct ScriptState {
        script: Arc<tokio::sync::Mutex<VecDeque<(u16, serde_json::Value)>>>,
        hits: Arc<AtomicUsize>,
    }

    async fn next_scripted(
        State(state): State<ScriptState>,
    ) -> (StatusCode, Json<serde_json::Value>) {
        state.hits.fetch_add(1, Ordering::SeqCst);
        let (status, body) = state
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or((500, json!({"error": "script exhausted"})));
        (StatusCode::from_u16(status).unwrap(), Json(body))
    }

    async fn spawn_scripted_server(
        responses: Vec<(u16, serde_json::Value)>,
    ) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = ScriptState {
            script: Arc::new(tokio::sync::Mutex::new(responses.into_iter().collect())),
            hits: hits.clone(),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new()
            .route("/chat/completions", axum::routing::post(next_scripted))
            .with_state(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (url, hits)
    }

    fn chat_body(content: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"content": content}}]})
    }

    fn client_for(url: &str) -> HttpReasoningClient {
        HttpReasoningClient::new(LlmConfig {
            api_url: url.to_string(),
            timeout_secs: 5,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn transient_failure_is_retried_exactly_once() {
        let (url, hits) = spawn_scripted_server(vec![
            (500, json!({"error": "overloaded"})),
            (200, chat_body("report")),
        ])
        .await;
        let client = client_for(&url);

        let out = client.complete("prompt".to_string()).await.unwrap();
        assert_eq!(out, "report");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_transient_failure_is_returned_without_a_third_attempt() {
        let (url, hits) = spawn_scripted_server(vec![
            (500, json!({"error": "down"})),
            (500, json!({"error": "still down"})),
            (200, chat_body("too late")),
        ])
        .await;
        let client = client_for(&url);

        let err = client.complete("prompt".to_string()).await.unwrap_err();
        assert!(matches!(err, AiServiceError::Server { status: Some(500), .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn auth_failure_is_terminal_with_no_retry() {
        let (url, hits) = spawn_scripted_server(vec![
            (401, json!({"error": "bad key"})),
            (200, chat_body("unreachable")),
        ])
        .await;
        let client = client_for(&url);

        let err = client.complete("prompt".to_string()).await.unwrap_err();
        assert!(matches!(err, AiServiceError::Auth(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classifies_http_errors() {
        assert!(matches!(classify_http_error(401, ""), AiServiceError::Auth(_)));
        assert!(matches!(
            classify_http_error(429, "slow down"),
            AiServiceError::RateLimited(_)
        ));
        assert!(matches!(
            classify_http_error(503, "overloaded"),
            AiServiceError::Server { status: Some(503), .. }
        ));
        assert!(matches!(
            classify_http_error(404, "nope"),
            AiServiceError::Transport(_)
        ));
    }

    #[test]
    fn transient_classes_match_retry_policy() {
        assert!(classify_http_error(429, "").is_transient());
        assert!(classify_http_error(500, "").is_transient());
        assert!(!classify_http_error(401, "").is_transient());
        assert!(AiServiceError::Timeout(45).is_transient());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo".repeat(100);
        let t = truncate(&s, 7);
        assert!(t.ends_with("..."));
        assert!(t.len() <= 10);
    }
}
