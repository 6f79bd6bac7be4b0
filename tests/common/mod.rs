// In-memory backends that record every call.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use futures::stream;
use query_gateway::backend::{CompletionBackend, FragmentStream, SpeechBackend, UpstreamError};
use query_gateway::prompt::PromptLimits;
use query_gateway::server::create_router;
use query_gateway::state::AppState;
use query_gateway::{Dispatcher, Gateway, HostCapabilities, RateLimiter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "test-model";

#[derive(Default)]
pub struct MockBackend {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<(String, String, Option<f32>)>>,
    pub fragments: Vec<String>,
    pub fail: bool,
    // end the stream with an error after this many fragments
    pub fail_stream_after: Option<usize>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            fragments: vec!["Hel".to_string(), "lo".to_string(), ", world".to_string()],
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    // (prompt, model, temperature) of every completion call
    pub fn prompts(&self) -> Vec<(String, String, Option<f32>)> {
        self.prompts.lock().unwrap().clone()
    }

    fn record(&self, prompt: &str, model: &str, temperature: Option<f32>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), model.to_string(), temperature));
    }

    fn failure() -> UpstreamError {
        UpstreamError::Status {
            status: 500,
            body: "deployment gpt-internal-7 is overloaded".to_string(),
        }
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(&self, prompt: &str, model: &str, temperature: Option<f32>) -> Result<String, UpstreamError> {
        self.record(prompt, model, temperature);
        if self.fail {
            return Err(Self::failure());
        }
        Ok(format!("answer from {model}"))
    }

    async fn complete_stream(&self, prompt: &str, model: &str) -> Result<FragmentStream, UpstreamError> {
        self.record(prompt, model, None);
        if self.fail {
            return Err(Self::failure());
        }

        let items: Vec<Result<String, UpstreamError>> = match self.fail_stream_after {
            Some(n) => {
                let mut items: Vec<_> = self.fragments.iter().take(n).cloned().map(Ok).collect();
                items.push(Err(UpstreamError::Decode("connection reset".to_string())));
                // anything after the error must never reach the caller
                items.push(Ok("after-error".to_string()));
                items
            }
            None => self.fragments.iter().cloned().map(Ok).collect(),
        };
        Ok(Box::pin(stream::iter(items)))
    }
}

#[async_trait]
impl SpeechBackend for MockBackend {
    async fn transcribe(&self, audio: Bytes) -> Result<String, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Self::failure());
        }
        Ok(format!("transcribed {} bytes", audio.len()))
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Self::failure());
        }
        Ok(Bytes::from(format!("audio:{text}")))
    }
}

pub fn dispatcher(backend: &Arc<MockBackend>, limits: PromptLimits) -> Dispatcher {
    Dispatcher::new(backend.clone(), backend.clone(), limits, DEFAULT_MODEL)
}

pub fn gateway(
    backend: &Arc<MockBackend>,
    limit: usize,
    window: Duration,
    capabilities: HostCapabilities,
) -> Gateway {
    Gateway::new(
        Arc::new(RateLimiter::new(limit, window)),
        dispatcher(backend, PromptLimits::default()),
        capabilities,
    )
}

pub fn router(backend: &Arc<MockBackend>, limit: usize, capabilities: HostCapabilities) -> Router {
    create_router(Arc::new(AppState {
        gateway: Arc::new(gateway(backend, limit, Duration::from_secs(60), capabilities)),
        trust_forwarded_for: false,
    }))
}
