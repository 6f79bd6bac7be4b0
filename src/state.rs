use std::sync::Arc;

use crate::gateway::Gateway;

// app's shared state
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub trust_forwarded_for: bool, // take caller identity from X-Forwarded-For first
}
