use crate::listen_store::ListenStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Access to the listen database (run history, stats).
    pub listen_store: Arc<dyn ListenStore>,

    /// What started this execution, e.g. `schedule` or `hook:OnStartup`.
    pub triggered_by: String,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, listen_store: Arc<dyn ListenStore>) -> Self {
        Self {
            cancellation_token,
            listen_store,
            triggered_by: String::new(),
        }
    }

    /// Same context for one execution, with its own cancellation token.
    pub fn for_execution(&self, cancellation_token: CancellationToken, triggered_by: &str) -> Self {
        Self {
            cancellation_token,
            listen_store: Arc::clone(&self.listen_store),
            triggered_by: triggered_by.to_string(),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
