use crate::library_store::LibraryStores;
use crate::server_store::ServerStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Child of the scheduler's shutdown token, one per run.
    pub cancellation_token: CancellationToken,

    /// Artists, rules, violations and bulk jobs.
    pub stores: LibraryStores,

    /// Job history and schedule state.
    pub server_store: Arc<dyn ServerStore>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        stores: LibraryStores,
        server_store: Arc<dyn ServerStore>,
    ) -> Self {
        Self {
            cancellation_token,
            stores,
            server_store,
        }
    }

    /// Same resources, different token.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            stores: self.stores.clone(),
            server_store: Arc::clone(&self.server_store),
        }
    }

    /// Jobs should check this between units of work and return
    /// `JobError::Cancelled` when it is set.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
