// Host-independent entry point: admission, action resolution, dispatch.

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::dispatch::{Action, ActionResult, Dispatcher, HostCapabilities, Payload};
use crate::error::GatewayError;
use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_LATENCY, REQUEST_TOTAL, TRACKED_CALLERS};
use crate::rate_limit::RateLimiter;

pub struct Gateway {
    limiter: Arc<RateLimiter>,
    dispatcher: Dispatcher,
    capabilities: HostCapabilities,
}

impl Gateway {
    pub fn new(limiter: Arc<RateLimiter>, dispatcher: Dispatcher, capabilities: HostCapabilities) -> Self {
        Self {
            limiter,
            dispatcher,
            capabilities,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    pub async fn handle(&self, caller: &str, action: &str, payload: Payload) -> Result<ActionResult, GatewayError> {
        self.handle_at(caller, action, payload, Instant::now()).await
    }

    // Same as `Gateway::handle` with an explicit admission time.
    pub async fn handle_at(
        &self,
        caller: &str,
        action: &str,
        payload: Payload,
        now: Instant,
    ) -> Result<ActionResult, GatewayError> {
        self.admit(caller, now)?;
        let action = self.resolve(action)?;
        self.dispatch(action, payload).await
    }

    // Rate-limit check only. Hosts that must do work to read the payload
    // call this first and `Gateway::dispatch` afterwards.
    pub fn admit(&self, caller: &str, now: Instant) -> Result<(), GatewayError> {
        REQUEST_TOTAL.inc();

        let admitted = self.limiter.admit(caller, now);
        TRACKED_CALLERS.set(self.limiter.tracked_callers() as f64);
        if !admitted {
            RATE_LIMITED_TOTAL.inc();
            info!(caller, "rate limit exceeded");
            return Err(GatewayError::RateLimitExceeded);
        }
        Ok(())
    }

    // Name and capability check, done before any payload is read so an
    // unsupported action costs nothing
    pub fn resolve(&self, action: &str) -> Result<Action, GatewayError> {
        let action: Action = action.parse()?;
        if !self.capabilities.supports(action.mode()) {
            return Err(GatewayError::UnsupportedOperation(action.name()));
        }
        Ok(action)
    }

    pub async fn dispatch(&self, action: Action, payload: Payload) -> Result<ActionResult, GatewayError> {
        let start = Instant::now();
        let result = self.dispatcher.invoke(action, payload, self.capabilities).await;

        // streams are still running at this point, only unary latency is meaningful
        if matches!(result, Ok(ActionResult::Output(_))) {
            REQUEST_LATENCY.observe(start.elapsed().as_secs_f64());
        }
        result
    }
}
