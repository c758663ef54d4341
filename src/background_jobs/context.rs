use crate::tasks::{JobStore, TaskDispatcher};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Submits work to the task workers.
    pub dispatcher: Arc<TaskDispatcher>,

    /// Job records, for retention.
    pub job_store: Arc<dyn JobStore>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        dispatcher: Arc<TaskDispatcher>,
        job_store: Arc<dyn JobStore>,
    ) -> Self {
        Self {
            cancellation_token,
            dispatcher,
            job_store,
        }
    }

    /// Same context with a different cancellation token.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..self.clone()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
