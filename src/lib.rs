// HTTP gateway for context-grounded LLM queries, transcription and speech
// synthesis, with per-caller sliding-window rate limiting.

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod invoke;
pub mod metrics;
pub mod models;
pub mod prompt;
pub mod rate_limit;
pub mod server;
pub mod state;

pub use dispatch::{Action, ActionRequest, ActionResult, Dispatcher, ExecutionMode, HostCapabilities, Payload};
pub use error::GatewayError;
pub use gateway::Gateway;
pub use rate_limit::RateLimiter;
