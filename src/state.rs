use std::sync::Arc;
use crate::completion::CompletionClient;
use crate::contact::ContactService;
use crate::rate_limit::SlidingWindowLimiter;
// app's shared state

pub struct AppState {
    pub completion: Option<CompletionClient>, // None when no provider key is configured
    pub contact: ContactService,
    pub limiter: Arc<SlidingWindowLimiter>, // shared with the services above
    pub trust_proxy: bool, // read client ip from forwarding headers
}

impl AppState {
    pub fn completion(&self) -> crate::error::Result<&CompletionClient> {
        self.completion.as_ref().ok_or_else(|| {
            crate::error::AppError::NotConfigured(
                "AI demo is not available right now".to_string(),
            )
        })
    }
}
