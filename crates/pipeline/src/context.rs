//! Per-request ambient state: identity, correlation id and cancellation.

use std::sync::Arc;

use domain::{Anonymous, CommitHook, CurrentUser, UnitOfWork, UnitOfWorkFactory};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;

/// Carried alongside a request through every behavior and into the handler.
#[derive(Clone)]
pub struct RequestContext {
    request_id: Uuid,
    current_user: Arc<dyn CurrentUser>,
    cancellation: CancellationToken,
    commit_hooks: Vec<Arc<dyn CommitHook>>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(Arc::new(Anonymous))
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("actor", &self.current_user.actor())
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("commit_hooks", &self.commit_hooks.len())
            .finish()
    }
}

impl RequestContext {
    pub fn new(current_user: Arc<dyn CurrentUser>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            current_user,
            cancellation: CancellationToken::new(),
            commit_hooks: Vec::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Attaches work to every unit of work begun from this context, run
    /// once its commit reaches the store.
    pub fn with_commit_hook(mut self, hook: Arc<dyn CommitHook>) -> Self {
        self.commit_hooks.push(hook);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn current_user(&self) -> &dyn CurrentUser {
        self.current_user.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Fails with [`PipelineError::Cancelled`] once cancellation was requested.
    pub fn ensure_active(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Starts a unit of work acting as this request's user.
    ///
    /// Published events carry the request id in their metadata.
    pub fn begin_unit_of_work<'a>(&self, factory: &UnitOfWorkFactory) -> UnitOfWork<'a> {
        let uow = factory
            .begin(self.current_user.clone(), self.cancellation.clone())
            .with_metadata(
                "request_id",
                serde_json::Value::from(self.request_id.to_string()),
            );
        self.commit_hooks
            .iter()
            .cloned()
            .fold(uow, |uow, hook| uow.on_commit(hook))
    }
}
