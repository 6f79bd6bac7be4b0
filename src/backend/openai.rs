use async_trait::async_trait;
use axum::body::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{CompletionBackend, FragmentStream, SpeechBackend, UpstreamError};

// Connection settings for an OpenAI-compatible API
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub transcription_model: String,
    pub speech_model: String,
    pub voice: String,
    pub connect_timeout: Duration,
    // applies to unary calls only, a stream may run as long as upstream keeps sending
    pub request_timeout: Duration,
}

pub struct OpenAiBackend {
    client: reqwest::Client,
    config: OpenAiConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
}

#[derive(Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChatStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(self.url(path));
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

fn stream_error(err: EventStreamError<reqwest::Error>) -> UpstreamError {
    match err {
        EventStreamError::Transport(e) => UpstreamError::Transport(e),
        other => UpstreamError::Decode(other.to_string()),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        temperature: Option<f32>,
    ) -> Result<String, UpstreamError> {
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            stream: false,
        };

        let response = self
            .post("chat/completions")
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await?;
        let body: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(UpstreamError::EmptyCompletion)
    }

    async fn complete_stream(&self, prompt: &str, model: &str) -> Result<FragmentStream, UpstreamError> {
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: None,
            stream: true,
        };

        let response = self.post("chat/completions").json(&request).send().await?;
        let mut events = Box::pin(check_status(response).await?.bytes_stream().eventsource());

        let stream = async_stream::stream! {
            let mut finished = false;

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(stream_error(e));
                        return;
                    }
                };

                if event.data == "[DONE]" {
                    return;
                }
                let parsed: ChatStreamChunk = match serde_json::from_str(&event.data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        yield Err(UpstreamError::Decode(format!("stream chunk: {e}")));
                        return;
                    }
                };
                for choice in parsed.choices {
                    if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                        yield Ok(content);
                    }
                    if choice.finish_reason.is_some() {
                        finished = true;
                    }
                }
            }

            if !finished {
                yield Err(UpstreamError::Decode("stream ended before completion".to_string()));
            } else {
                debug!("completion stream ended without [DONE]");
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl SpeechBackend for OpenAiBackend {
    async fn transcribe(&self, audio: Bytes) -> Result<String, UpstreamError> {
        let form = Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", Part::bytes(audio.to_vec()).file_name("audio.wav"));

        let response = self
            .post("audio/transcriptions")
            .timeout(self.config.request_timeout)
            .multipart(form)
            .send()
            .await?;
        let body: TranscriptionResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;

        Ok(body.text)
    }

    async fn synthesize(&self, text: &str) -> Result<Bytes, UpstreamError> {
        let request = SpeechRequest {
            model: &self.config.speech_model,
            input: text,
            voice: &self.config.voice,
        };

        let response = self
            .post("audio/speech")
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await?;
        let audio = check_status(response).await?.bytes().await?;

        if audio.is_empty() {
            return Err(UpstreamError::Decode("empty audio body".to_string()));
        }
        Ok(audio)
    }
}
