// Action dispatch.
//
// Every action the gateway exposes is a variant of `Action`, and each
// variant has a fixed `ExecutionMode`. `Dispatcher::invoke` checks that
// mode against the host's capabilities before touching the payload, so a
// streaming action on a host that cannot stream fails immediately with no
// backend work started.

use axum::body::Bytes;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{CompletionBackend, SpeechBackend, UpstreamError};
use crate::error::GatewayError;
use crate::metrics::UPSTREAM_FAILURES;
use crate::models::{ChatQueryPayload, SectionQueryPayload, SpeechPayload, TextOutput};
use crate::prompt::{PromptLimits, PromptSpec, PromptTemplate};

pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

// low temperature keeps the model quoting rather than paraphrasing
const SELECT_SECTION_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ChatQuery,
    ChatQueryStream,
    SelectRelevantSection,
    SpeechToText,
    TextToSpeech,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Unary,
    Streaming,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::ChatQuery,
        Action::ChatQueryStream,
        Action::SelectRelevantSection,
        Action::SpeechToText,
        Action::TextToSpeech,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::ChatQuery => "chatgpt",
            Action::ChatQueryStream => "chatgpt-stream",
            Action::SelectRelevantSection => "select-relevant-section",
            Action::SpeechToText => "speech-to-text",
            Action::TextToSpeech => "text-to-speech",
        }
    }

    pub fn mode(self) -> ExecutionMode {
        match self {
            Action::ChatQueryStream => ExecutionMode::Streaming,
            Action::ChatQuery | Action::SelectRelevantSection | Action::SpeechToText | Action::TextToSpeech => {
                ExecutionMode::Unary
            }
        }
    }
}

impl FromStr for Action {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.name() == s)
            .ok_or_else(|| GatewayError::UnknownAction(s.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// What the current host can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub streaming: bool,
}

impl HostCapabilities {
    // A server process that can hold a response open.
    pub const LONG_LIVED: Self = Self { streaming: true };
    // One request per process, the response must be complete on return.
    pub const PER_INVOCATION: Self = Self { streaming: false };

    pub fn supports(self, mode: ExecutionMode) -> bool {
        match mode {
            ExecutionMode::Unary => true,
            ExecutionMode::Streaming => self.streaming,
        }
    }
}

// Undecoded request body as received by a host.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(Bytes),
    Audio(Bytes),
}

// A decoded request, one variant per action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    ChatQuery(ChatQueryPayload),
    ChatQueryStream(ChatQueryPayload),
    SelectRelevantSection(SectionQueryPayload),
    SpeechToText(Bytes),
    TextToSpeech(SpeechPayload),
}

impl ActionRequest {
    pub fn decode(action: Action, payload: Payload) -> Result<Self, GatewayError> {
        match action {
            Action::ChatQuery => Ok(ActionRequest::ChatQuery(json_payload(action, payload)?)),
            Action::ChatQueryStream => Ok(ActionRequest::ChatQueryStream(json_payload(action, payload)?)),
            Action::SelectRelevantSection => Ok(ActionRequest::SelectRelevantSection(json_payload(action, payload)?)),
            Action::SpeechToText => match payload {
                Payload::Audio(audio) if audio.is_empty() => {
                    Err(GatewayError::invalid_payload("audio body is empty"))
                }
                Payload::Audio(audio) => Ok(ActionRequest::SpeechToText(audio)),
                Payload::Json(_) => Err(GatewayError::invalid_payload(
                    "speech-to-text expects an audio body",
                )),
            },
            Action::TextToSpeech => {
                let speech: SpeechPayload = json_payload(action, payload)?;
                if speech.text.trim().is_empty() {
                    return Err(GatewayError::invalid_payload("text must be non-empty"));
                }
                Ok(ActionRequest::TextToSpeech(speech))
            }
        }
    }

    pub fn action(&self) -> Action {
        match self {
            ActionRequest::ChatQuery(_) => Action::ChatQuery,
            ActionRequest::ChatQueryStream(_) => Action::ChatQueryStream,
            ActionRequest::SelectRelevantSection(_) => Action::SelectRelevantSection,
            ActionRequest::SpeechToText(_) => Action::SpeechToText,
            ActionRequest::TextToSpeech(_) => Action::TextToSpeech,
        }
    }
}

fn json_payload<T: DeserializeOwned>(action: Action, payload: Payload) -> Result<T, GatewayError> {
    match payload {
        Payload::Json(body) => serde_json::from_slice(&body).map_err(|e| GatewayError::invalid_payload(e.to_string())),
        Payload::Audio(_) => Err(GatewayError::invalid_payload(format!("{action} expects a JSON body"))),
    }
}

// Text fragments forwarded to the caller as they arrive. An `Err` item is
// always the last one.
pub type TextStream = BoxStream<'static, Result<String, GatewayError>>;

pub enum ActionResult {
    Output(TextOutput),
    Stream(TextStream),
}

impl fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionResult::Output(output) => f.debug_tuple("Output").field(output).finish(),
            ActionResult::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

pub struct Dispatcher {
    completion: Arc<dyn CompletionBackend>,
    speech: Arc<dyn SpeechBackend>,
    limits: PromptLimits,
    default_model: String,
}

impl Dispatcher {
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        speech: Arc<dyn SpeechBackend>,
        limits: PromptLimits,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            completion,
            speech,
            limits,
            default_model: default_model.into(),
        }
    }

    pub async fn invoke(
        &self,
        action: Action,
        payload: Payload,
        capabilities: HostCapabilities,
    ) -> Result<ActionResult, GatewayError> {
        if !capabilities.supports(action.mode()) {
            return Err(GatewayError::UnsupportedOperation(action.name()));
        }

        let request = ActionRequest::decode(action, payload)?;
        self.run(request).await
    }

    // exactly one backend call per request
    async fn run(&self, request: ActionRequest) -> Result<ActionResult, GatewayError> {
        let action = request.action();
        debug!(%action, "dispatching");

        match request {
            ActionRequest::ChatQuery(payload) => {
                let prompt = PromptSpec::new(PromptTemplate::Answer, &payload.context, &payload.query, self.limits).build();
                let model = payload.model.as_deref().unwrap_or(&self.default_model);
                let output = self
                    .completion
                    .complete(&prompt.text, model, payload.temperature)
                    .await
                    .map_err(|e| upstream_failure(action, e))?;
                Ok(ActionResult::Output(TextOutput { output }))
            }
            ActionRequest::ChatQueryStream(payload) => {
                let prompt = PromptSpec::new(PromptTemplate::Answer, &payload.context, &payload.query, self.limits).build();
                let model = payload.model.as_deref().unwrap_or(&self.default_model);
                let mut upstream = self
                    .completion
                    .complete_stream(&prompt.text, model)
                    .await
                    .map_err(|e| upstream_failure(action, e))?;

                let fragments = async_stream::stream! {
                    while let Some(item) = upstream.next().await {
                        match item {
                            Ok(fragment) => yield Ok(fragment),
                            Err(e) => {
                                yield Err(upstream_failure(action, e));
                                break;
                            }
                        }
                    }
                };
                Ok(ActionResult::Stream(Box::pin(fragments)))
            }
            ActionRequest::SelectRelevantSection(payload) => {
                let prompt =
                    PromptSpec::new(PromptTemplate::SelectSection, &payload.context, &payload.query, self.limits)
                        .build();
                let model = payload.model.as_deref().unwrap_or(&self.default_model);
                let output = self
                    .completion
                    .complete(&prompt.text, model, Some(SELECT_SECTION_TEMPERATURE))
                    .await
                    .map_err(|e| upstream_failure(action, e))?;
                Ok(ActionResult::Output(TextOutput { output }))
            }
            ActionRequest::SpeechToText(audio) => {
                let output = self
                    .speech
                    .transcribe(audio)
                    .await
                    .map_err(|e| upstream_failure(action, e))?;
                Ok(ActionResult::Output(TextOutput { output }))
            }
            ActionRequest::TextToSpeech(payload) => {
                let audio = self
                    .speech
                    .synthesize(&payload.text)
                    .await
                    .map_err(|e| upstream_failure(action, e))?;
                Ok(ActionResult::Output(TextOutput {
                    output: STANDARD.encode(&audio),
                }))
            }
        }
    }
}

fn upstream_failure(action: Action, err: UpstreamError) -> GatewayError {
    UPSTREAM_FAILURES.inc();
    warn!(%action, error = %err, "upstream backend call failed");
    GatewayError::UpstreamFailure(err)
}
