//! The seam between the scheduler and whatever transport reaches a worker.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::task::TaskDescriptor;

/// Outcome of asking a worker to run one task.
///
/// The transport owns timeouts and retries; by the time a call resolves it
/// has either definitely succeeded or the worker is considered lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Succeeded,
    Failed(String),
}

impl CallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Succeeded)
    }
}

impl<E: fmt::Display> From<Result<(), E>> for CallOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => CallOutcome::Succeeded,
            Err(e) => CallOutcome::Failed(e.to_string()),
        }
    }
}

/// Runs a task on the worker at `worker`.
#[async_trait]
pub trait RemoteCall: Send + Sync + 'static {
    async fn call(&self, worker: &str, task: &TaskDescriptor) -> CallOutcome;
}

#[async_trait]
impl<T: RemoteCall + ?Sized> RemoteCall for Arc<T> {
    async fn call(&self, worker: &str, task: &TaskDescriptor) -> CallOutcome {
        (**self).call(worker, task).await
    }
}
