//! Worker-side task handling.
//!
//! [`LocalWorkers`] runs dispatched tasks inside the coordinator process: it
//! is the [`RemoteCall`] used when workers share the coordinator's storage,
//! and what a transport's server side calls into for each incoming task.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::reduce::{execute_reduce, ReduceTask};
use crate::rpc::{CallOutcome, RemoteCall};
use crate::storage::Storage;
use crate::task::{Phase, TaskDescriptor};
use crate::ReduceFn;

/// Executes map tasks. The map side lives outside this crate; implementors
/// read `task.input_file` and must write exactly one intermediate location
/// per reduce partition, even an empty one.
pub trait MapRunner: Send + Sync + 'static {
    fn run_map(&self, task: &TaskDescriptor, storage: &dyn Storage) -> anyhow::Result<()>;
}

pub struct LocalWorkers<S> {
    storage: Arc<S>,
    reduce_fn: ReduceFn,
    mapper: Option<Arc<dyn MapRunner>>,
}

impl<S> Clone for LocalWorkers<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            reduce_fn: Arc::clone(&self.reduce_fn),
            mapper: self.mapper.clone(),
        }
    }
}

impl<S: Storage + 'static> LocalWorkers<S> {
    pub fn new(storage: Arc<S>, reduce_fn: ReduceFn) -> Self {
        Self {
            storage,
            reduce_fn,
            mapper: None,
        }
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn MapRunner>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Runs `task` to completion on the current thread.
    pub fn do_task(&self, task: &TaskDescriptor) -> anyhow::Result<()> {
        match task.phase {
            Phase::Map => {
                let Some(mapper) = &self.mapper else {
                    anyhow::bail!("no map runner configured");
                };
                mapper.run_map(task, self.storage.as_ref())
            }
            Phase::Reduce => {
                let reduce_task = ReduceTask::from_descriptor(task)?;
                let reduce_fn = &self.reduce_fn;
                execute_reduce(&reduce_task, self.storage.as_ref(), |key, values| {
                    reduce_fn(key, values)
                })?;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<S: Storage + 'static> RemoteCall for LocalWorkers<S> {
    async fn call(&self, worker: &str, task: &TaskDescriptor) -> CallOutcome {
        let this = self.clone();
        let owned = task.clone();
        let joined = tokio::task::spawn_blocking(move || this.do_task(&owned)).await;

        match joined {
            Ok(Ok(())) => {
                debug!(worker, phase = %task.phase, task = task.task_index, "task done");
                CallOutcome::Succeeded
            }
            Ok(Err(e)) => {
                let reason = format!("{e:#}");
                warn!(worker, phase = %task.phase, task = task.task_index, %reason, "task failed");
                CallOutcome::Failed(reason)
            }
            Err(e) => CallOutcome::Failed(format!("task panicked or was cancelled: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemStorage;
    use crate::KeyValue;

    fn reduce_task(index: usize, map_count: usize) -> TaskDescriptor {
        TaskDescriptor {
            job_name: "wc".into(),
            phase: Phase::Reduce,
            task_index: index,
            input_file: None,
            other_count: map_count,
        }
    }

    fn concat() -> ReduceFn {
        Arc::new(|_: &str, values: &[String]| -> anyhow::Result<String> { Ok(values.concat()) })
    }

    #[tokio::test]
    async fn reduce_task_succeeds_when_inputs_exist() {
        let storage = Arc::new(MemStorage::new());
        storage.put_records("mrtmp.wc-0-0", &[KeyValue::new("a", "x")]).unwrap();
        let workers = LocalWorkers::new(Arc::clone(&storage), concat());

        let outcome = workers.call("w0", &reduce_task(0, 1)).await;
        assert_eq!(outcome, CallOutcome::Succeeded);
        assert!(storage.contains("mrtmp.wc-res-0"));
    }

    #[tokio::test]
    async fn missing_input_is_a_failed_call() {
        let workers = LocalWorkers::new(Arc::new(MemStorage::new()), concat());
        let outcome = workers.call("w0", &reduce_task(0, 1)).await;
        match outcome {
            CallOutcome::Failed(reason) => assert!(reason.contains("mrtmp.wc-0-0"), "{reason}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn map_task_without_runner_fails() {
        let workers = LocalWorkers::new(Arc::new(MemStorage::new()), concat());
        let task = TaskDescriptor {
            phase: Phase::Map,
            input_file: Some("in.txt".into()),
            ..reduce_task(0, 1)
        };
        assert!(!workers.call("w0", &task).await.is_success());
    }
}
