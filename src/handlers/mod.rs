mod action;
mod health;
mod metrics;

pub use action::{action_handler, caller_key};
pub use health::health_handler;
pub use metrics::metrics_handler;
