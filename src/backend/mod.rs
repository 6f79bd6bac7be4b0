// External collaborators: the completion backend and the speech backend.

mod openai;

pub use openai::{OpenAiBackend, OpenAiConfig};

use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

// Text fragments in the order the backend produced them.
pub type FragmentStream = BoxStream<'static, Result<String, UpstreamError>>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to backend failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("backend returned an empty completion")]
    EmptyCompletion,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        temperature: Option<f32>,
    ) -> Result<String, UpstreamError>;

    // Start a streamed completion. Dropping the returned stream aborts the
    // upstream request.
    async fn complete_stream(&self, prompt: &str, model: &str) -> Result<FragmentStream, UpstreamError>;
}

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn transcribe(&self, audio: Bytes) -> Result<String, UpstreamError>;

    async fn synthesize(&self, text: &str) -> Result<Bytes, UpstreamError>;
}
