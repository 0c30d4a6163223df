//! OpenAI-compatible chat completions client.

use std::time::Duration;

use aidvisor_core::{GenerationError, GenerationTask, Generator};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

const ERROR_BODY_LIMIT: usize = 512;

pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn body(&self, task: &GenerationTask) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &task.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": task.user}));
        json!({
            "model": self.model,
            "messages": messages,
        })
    }
}

fn reply_text(body: &Value) -> Option<&str> {
    body.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(
        &self,
        task: &GenerationTask,
        timeout: Duration,
    ) -> Result<String, GenerationError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredentials)?;
        let url = self.endpoint();
        debug!(
            target: "aidvisor::generation",
            url = %url,
            model = %self.model,
            prompt_chars = task.user.len(),
            "sending generation request"
        );
        let map_err = |err: reqwest::Error| {
            if err.is_timeout() {
                GenerationError::Timeout(timeout)
            } else {
                GenerationError::Transport(err.to_string())
            }
        };
        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .timeout(timeout)
            .json(&self.body(task))
            .send()
            .await
            .map_err(map_err)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(map_err)?;
        if !status.is_success() {
            let body = truncate(&String::from_utf8_lossy(&bytes), ERROR_BODY_LIMIT);
            warn!(
                target: "aidvisor::generation",
                status = status.as_u16(),
                "generation service rejected request"
            );
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: Value = serde_json::from_slice(&bytes)
            .map_err(|err| GenerationError::Transport(format!("unreadable response: {err}")))?;
        match reply_text(&parsed) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(GenerationError::EmptyReply),
        }
    }
}
