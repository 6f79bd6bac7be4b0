// Per-invocation host: one request from stdin, one JSON response on stdout.
//
// The process exits as soon as the response is written, so this host can
// never deliver a stream.

use axum::body::Bytes;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::dispatch::{Action, ActionResult, Payload};
use crate::error::GatewayError;
use crate::gateway::Gateway;

#[derive(Debug, Serialize)]
pub struct InvocationResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl From<GatewayError> for InvocationResponse {
    fn from(err: GatewayError) -> Self {
        Self {
            status: err.status().as_u16(),
            body: err.body(),
        }
    }
}

pub async fn invoke(gateway: &Gateway, caller: &str, action: &str, input: Bytes) -> InvocationResponse {
    let payload = if action == Action::SpeechToText.name() {
        Payload::Audio(input)
    } else {
        Payload::Json(input)
    };

    match gateway.handle(caller, action, payload).await {
        Ok(ActionResult::Output(output)) => match serde_json::to_value(&output) {
            Ok(body) => InvocationResponse { status: 200, body },
            Err(e) => InvocationResponse {
                status: 500,
                body: serde_json::json!({ "error": { "message": e.to_string(), "code": 500 } }),
            },
        },
        // a gateway built for this host never streams; refuse rather than buffer
        Ok(ActionResult::Stream(_)) => GatewayError::UnsupportedOperation(Action::ChatQueryStream.name()).into(),
        Err(e) => e.into(),
    }
}

pub async fn run(gateway: &Gateway, caller: &str, action: &str) -> anyhow::Result<InvocationResponse> {
    let mut input = Vec::new();
    tokio::io::stdin().read_to_end(&mut input).await?;

    let response = invoke(gateway, caller, action, Bytes::from(input)).await;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(&serde_json::to_vec(&response)?).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    Ok(response)
}
