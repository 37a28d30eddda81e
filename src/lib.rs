//! Fault-tolerant phase scheduling for a MapReduce (lite) job.
//!
//! A coordinator runs [`scheduler::Scheduler::schedule`] once per phase. Each
//! task of the phase is handed to some available worker through a
//! [`rpc::RemoteCall`]; failed tasks are requeued and the failing worker is
//! dropped from the [`registry::Registry`]. On the worker side, reduce tasks
//! are carried out by [`reduce::execute_reduce`], which merges the
//! intermediate data of every map task for one partition.

use serde::{Deserialize, Serialize};
use std::hash::Hasher;

pub mod codec;
pub mod config;
pub mod error;
pub mod reduce;
pub mod registry;
pub mod rpc;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod telemetry;
pub mod worker;

pub use error::{Error, Result};
pub use task::{Job, Phase, TaskDescriptor};

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// A reduce function takes in a key and every value emitted for that key,
/// in merge order. It returns an [`anyhow::Result`] containing a single
/// output value.
///
/// An error fails the reduce task attempt; the scheduler retries the whole
/// task on another worker.
pub type ReduceFn =
    std::sync::Arc<dyn Fn(&str, &[String]) -> anyhow::Result<String> + Send + Sync>;

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the key of this key-value pair.
    #[inline]
    pub fn key(&self) -> String {
        self.key.clone()
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> String {
        self.value
    }
}

/// Hashes an intermediate key. Compute a reduce bucket for a given key
/// by calculating `ihash(key) % n_reduce`, or use [`partition`].
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::with_key(0);
    hasher.write(key);
    (hasher.finish() & 0x7fff_ffff) as u32
}

/// The reduce partition a map task must write `key` to.
///
/// Every map runner has to agree on this, otherwise one reduce task would see
/// only part of the values for a key.
pub fn partition(key: &str, n_reduce: usize) -> usize {
    if n_reduce == 0 {
        return 0;
    }
    ihash(key.as_bytes()) as usize % n_reduce
}
