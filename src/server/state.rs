//! Server application state shared across handlers

use crate::push::PushService;
use std::sync::Arc;

#[derive(Clone)]
pub struct ServerAppState {
    /// Push engine (identity, subscribers, delivery)
    pub push: Arc<PushService>,
}

impl ServerAppState {
    pub fn new(push: Arc<PushService>) -> Self {
        Self { push }
    }
}
