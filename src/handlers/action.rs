use axum::{
    Json, RequestExt,
    body::Bytes,
    extract::{ConnectInfo, Multipart, Path, Request, State},
    http::{HeaderMap, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::dispatch::{Action, ActionResult, Payload, TextStream};
use crate::error::GatewayError;
use crate::state::AppState;

// POST /api/{action}
pub async fn action_handler(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
    mut req: Request,
) -> Response {
    let peer = req
        .extract_parts::<ConnectInfo<SocketAddr>>()
        .await
        .ok()
        .map(|ConnectInfo(addr)| addr);
    let caller = caller_key(req.headers(), peer, state.trust_forwarded_for);

    // admit before spending anything on the body
    if let Err(e) = state.gateway.admit(&caller, Instant::now()) {
        return e.into_response();
    }

    let action = match state.gateway.resolve(&action) {
        Ok(action) => action,
        Err(e) => return e.into_response(),
    };

    let payload = match read_payload(action, req).await {
        Ok(payload) => payload,
        Err(e) => return e.into_response(),
    };

    match state.gateway.dispatch(action, payload).await {
        Ok(ActionResult::Output(output)) => Json(output).into_response(),
        Ok(ActionResult::Stream(fragments)) => {
            debug!(%caller, %action, "streaming response");
            event_stream(fragments).into_response()
        }
        Err(e) => e.into_response(),
    }
}

// Caller identity for rate limiting: the peer IP, or the first
// `X-Forwarded-For` hop when that header is trusted or no peer is known.
pub fn caller_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(hop), _) if trust_forwarded_for => hop.to_string(),
        (_, Some(addr)) => addr.ip().to_string(),
        (Some(hop), None) => hop.to_string(),
        (None, None) => "unknown".to_string(),
    }
}

// speech-to-text takes raw audio or a multipart upload, everything else is JSON
async fn read_payload(action: Action, req: Request) -> Result<Payload, GatewayError> {
    if action != Action::SpeechToText {
        let body = req
            .extract::<Bytes, _>()
            .await
            .map_err(|e| GatewayError::invalid_payload(e.body_text()))?;
        return Ok(Payload::Json(body));
    }

    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    if !is_multipart {
        let body = req
            .extract::<Bytes, _>()
            .await
            .map_err(|e| GatewayError::invalid_payload(e.body_text()))?;
        return Ok(Payload::Audio(body));
    }

    let mut multipart = req
        .extract::<Multipart, _>()
        .await
        .map_err(|e| GatewayError::invalid_payload(e.body_text()))?;

    // first field carries the audio
    match multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::invalid_payload(e.body_text()))?
    {
        Some(field) => {
            let audio = field
                .bytes()
                .await
                .map_err(|e| GatewayError::invalid_payload(e.body_text()))?;
            Ok(Payload::Audio(audio))
        }
        None => Err(GatewayError::invalid_payload("multipart body has no file field")),
    }
}

fn event_stream(fragments: TextStream) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let events = fragments.map(|item| {
        Ok(match item {
            // SSE field values cannot carry carriage returns
            Ok(fragment) => Event::default().data(fragment.replace("\r\n", "\n").replace('\r', "\n")),
            Err(e) => Event::default().event("error").data(e.to_string()),
        })
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
