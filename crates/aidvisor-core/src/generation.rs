use std::time::Duration;

use async_trait::async_trait;

/// One unit of work for the generation service: an optional system message and
/// the user prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub system: Option<String>,
    pub user: String,
}

impl GenerationTask {
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            user: prompt.into(),
        }
    }

    pub fn with_system(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            user: prompt.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("no OpenAI API key found in secrets file or OPENAI_API_KEY")]
    MissingCredentials,
    #[error("generation timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("generation service returned an empty reply")]
    EmptyReply,
    #[error("server shutting down")]
    Cancelled,
}

/// The slow, fallible, occasionally non-compliant text generator behind every
/// job. Implementations should honour `timeout` themselves where the transport
/// allows; the orchestrator enforces it again around the call.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        task: &GenerationTask,
        timeout: Duration,
    ) -> Result<String, GenerationError>;
}
