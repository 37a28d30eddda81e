//! Runs every task of a phase to success on an unreliable worker pool.
//!
//! The coordinating loop pairs one pending task index with one available
//! worker and spawns a dispatch unit for the pair. A unit that succeeds marks
//! its task complete and returns the worker to the registry; a unit that
//! fails drops the worker and puts the task back in the pending queue. The
//! loop itself never waits on a remote call, so a hung worker only holds up
//! its own task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashSet;
use serde::Serialize;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::registry::{Registry, RegistryHandle};
use crate::rpc::{CallOutcome, RemoteCall};
use crate::task::{Job, Phase, TaskDescriptor};

/// What happened while a phase ran, as seen when `schedule` returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub tasks: usize,
    pub other_count: usize,
    /// Dispatches issued, including retries.
    pub attempts: usize,
    pub failures: usize,
    /// Workers dropped from the pool after a failed call, in failure order.
    pub discarded_workers: Vec<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub map: PhaseReport,
    pub reduce: PhaseReport,
}

/// State of one `schedule` call, shared with its dispatch units.
struct PhaseContext {
    total: usize,
    completed: DashSet<usize>,
    completed_count: AtomicUsize,
    attempts: AtomicUsize,
    failures: AtomicUsize,
    discarded: Mutex<Vec<String>>,
    pending: mpsc::UnboundedSender<usize>,
    done: watch::Sender<bool>,
}

impl PhaseContext {
    fn is_complete(&self) -> bool {
        self.completed_count.load(Ordering::Acquire) >= self.total
    }

    fn is_task_done(&self, index: usize) -> bool {
        self.completed.contains(&index)
    }

    /// Records a success. Only the first success of an index counts.
    fn mark_complete(&self, index: usize) -> bool {
        if !self.completed.insert(index) {
            return false;
        }
        let count = self.completed_count.fetch_add(1, Ordering::AcqRel) + 1;
        if count == self.total {
            self.done.send_replace(true);
        }
        true
    }

    fn requeue(&self, index: usize) {
        // the receiver is gone once the phase is over; nothing left to retry
        let _ = self.pending.send(index);
    }

    fn discard(&self, worker: String) {
        self.discarded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(worker);
    }

    fn report(&self, phase: Phase, other_count: usize, elapsed: Duration) -> PhaseReport {
        PhaseReport {
            phase,
            tasks: self.total,
            other_count,
            attempts: self.attempts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            discarded_workers: self
                .discarded
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            elapsed,
        }
    }
}

pub struct Scheduler<R> {
    rpc: Arc<R>,
    config: SchedulerConfig,
}

impl<R: RemoteCall> Scheduler<R> {
    pub fn new(rpc: Arc<R>, config: SchedulerConfig) -> Self {
        Self { rpc, config }
    }

    /// Runs the map phase, then the reduce phase, of `job`.
    pub async fn run_job(&self, job: &Job, registry: &mut Registry) -> Result<JobReport> {
        let map = self.run_phase(job, Phase::Map, registry).await?;
        let reduce = self.run_phase(job, Phase::Reduce, registry).await?;
        Ok(JobReport { map, reduce })
    }

    pub async fn run_phase(
        &self,
        job: &Job,
        phase: Phase,
        registry: &mut Registry,
    ) -> Result<PhaseReport> {
        self.schedule(
            &job.name,
            phase,
            job.task_count(phase),
            job.other_count(phase),
            |index| job.input_for(phase, index),
            registry,
        )
        .await
    }

    /// Dispatches tasks `0..total` of `phase` until each has succeeded once.
    ///
    /// `inputs` maps a task index to its input file (map phase). Workers are
    /// taken from `registry`; the ones that finish a task go back into it, the
    /// ones that fail do not. Dispatches still running when the last task
    /// completes are left to finish on their own and do not affect the
    /// returned report.
    ///
    /// Waits forever if no worker that can succeed ever registers.
    #[instrument(skip_all, fields(job = job_name, phase = %phase))]
    pub async fn schedule<F>(
        &self,
        job_name: &str,
        phase: Phase,
        total: usize,
        other_count: usize,
        inputs: F,
        registry: &mut Registry,
    ) -> Result<PhaseReport>
    where
        F: Fn(usize) -> Option<String>,
    {
        let started = Instant::now();
        info!(tasks = total, other = other_count, "scheduling phase");

        let (pending_tx, mut pending_rx) = mpsc::unbounded_channel();
        let (done_tx, mut done_rx) = watch::channel(false);
        let ctx = Arc::new(PhaseContext {
            total,
            completed: DashSet::new(),
            completed_count: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            discarded: Mutex::new(Vec::new()),
            pending: pending_tx,
            done: done_tx,
        });
        for index in 0..total {
            ctx.requeue(index);
        }

        let limiter = self
            .config
            .max_in_flight
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let mut units = JoinSet::new();

        loop {
            while let Some(joined) = units.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "dispatch unit aborted");
                }
            }
            if ctx.is_complete() {
                break;
            }

            let permit = match &limiter {
                Some(limiter) => tokio::select! {
                    biased;
                    _ = done_rx.changed() => break,
                    permit = limiter.clone().acquire_owned() => permit.ok(),
                },
                None => None,
            };

            let index = tokio::select! {
                biased;
                _ = done_rx.changed() => break,
                Some(index) = pending_rx.recv() => index,
            };
            if ctx.is_task_done(index) {
                continue;
            }

            let worker = tokio::select! {
                biased;
                _ = done_rx.changed() => break,
                worker = registry.next() => worker.ok_or(Error::RegistryClosed)?,
            };
            if ctx.is_task_done(index) {
                registry.release(worker);
                continue;
            }

            let task = TaskDescriptor {
                job_name: job_name.to_string(),
                phase,
                task_index: index,
                input_file: inputs(index),
                other_count,
            };
            units.spawn(dispatch(
                Arc::clone(&self.rpc),
                Arc::clone(&ctx),
                registry.handle(),
                worker,
                task,
                permit,
            ));
        }

        let in_flight = units.len();
        units.detach_all();

        let report = ctx.report(phase, other_count, started.elapsed());
        info!(
            attempts = report.attempts,
            failures = report.failures,
            in_flight,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "phase done"
        );
        Ok(report)
    }
}

/// One attempt of one task on one worker.
async fn dispatch<R: RemoteCall>(
    rpc: Arc<R>,
    ctx: Arc<PhaseContext>,
    registry: RegistryHandle,
    worker: String,
    task: TaskDescriptor,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let index = task.task_index;
    ctx.attempts.fetch_add(1, Ordering::Relaxed);
    debug!(%worker, task = index, "dispatching");

    // A panicking call must still requeue its task.
    let call = {
        let worker = worker.clone();
        tokio::spawn(async move { rpc.call(&worker, &task).await })
    };
    let outcome = call
        .await
        .unwrap_or_else(|e| CallOutcome::Failed(format!("call panicked or was cancelled: {e}")));

    match outcome {
        CallOutcome::Succeeded => {
            // back in the pool before the phase can be seen as done
            registry.register(worker.as_str());
            if ctx.mark_complete(index) {
                debug!(%worker, task = index, "task complete");
            } else {
                debug!(%worker, task = index, "task already complete, ignoring");
            }
        }
        CallOutcome::Failed(reason) => {
            ctx.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                %worker,
                task = index,
                %reason,
                "dispatch failed, dropping worker and requeueing task"
            );
            ctx.discard(worker);
            ctx.requeue(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Succeeds unless the worker name starts with "bad".
    #[derive(Default)]
    struct Picky {
        seen: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl RemoteCall for Picky {
        async fn call(&self, worker: &str, task: &TaskDescriptor) -> CallOutcome {
            self.seen
                .lock()
                .unwrap()
                .push((worker.to_string(), task.task_index));
            tokio::task::yield_now().await;
            if worker.starts_with("bad") {
                CallOutcome::Failed("refused".into())
            } else {
                CallOutcome::Succeeded
            }
        }
    }

    #[tokio::test]
    async fn zero_tasks_return_immediately() {
        let scheduler = Scheduler::new(Arc::new(Picky::default()), SchedulerConfig::default());
        let mut registry = Registry::new();
        let report = scheduler
            .schedule("wc", Phase::Map, 0, 3, |_| None, &mut registry)
            .await
            .unwrap();
        assert_eq!(report.attempts, 0);
        assert_eq!(report.tasks, 0);
    }

    #[tokio::test]
    async fn failing_worker_is_dropped_and_task_retried() {
        let rpc = Arc::new(Picky::default());
        let scheduler = Scheduler::new(Arc::clone(&rpc), SchedulerConfig::default());
        let mut registry = Registry::with_workers(["bad-0", "good-0"]);

        let report = scheduler
            .schedule("wc", Phase::Reduce, 5, 2, |_| None, &mut registry)
            .await
            .unwrap();

        assert_eq!(report.failures, 1);
        assert_eq!(report.discarded_workers, vec!["bad-0"]);
        assert_eq!(report.attempts, 6);

        let seen = rpc.seen.lock().unwrap().clone();
        let succeeded: HashSet<usize> = seen
            .iter()
            .filter(|(worker, _)| worker == "good-0")
            .map(|(_, index)| *index)
            .collect();
        assert_eq!(succeeded, (0..5).collect());
    }

    #[tokio::test]
    async fn map_tasks_carry_their_input() {
        let rpc = Arc::new(Picky::default());
        let scheduler = Scheduler::new(Arc::clone(&rpc), SchedulerConfig::default());
        let job = Job::new("wc", vec!["a.txt".into(), "b.txt".into()], 3);
        let mut registry = Registry::with_workers(["w0"]);

        let report = scheduler.run_phase(&job, Phase::Map, &mut registry).await.unwrap();
        assert_eq!(report.tasks, 2);
        assert_eq!(report.other_count, 3);
        // the worker is back in the pool once the phase is done
        assert_eq!(registry.drain_available(), vec!["w0"]);
    }

    #[test]
    fn second_success_is_not_counted() {
        let (pending, _rx) = mpsc::unbounded_channel();
        let (done, done_rx) = watch::channel(false);
        let ctx = PhaseContext {
            total: 2,
            completed: DashSet::new(),
            completed_count: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            discarded: Mutex::new(Vec::new()),
            pending,
            done,
        };
        assert!(ctx.mark_complete(1));
        assert!(!ctx.mark_complete(1));
        assert!(!ctx.is_complete());
        assert!(!*done_rx.borrow());
        assert!(ctx.mark_complete(0));
        assert!(ctx.is_complete());
        assert!(*done_rx.borrow());
    }
}
