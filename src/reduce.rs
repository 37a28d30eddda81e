//! Reduce-side execution: merge the intermediate data of every map task for
//! one partition, group it by key and apply the reduce function.

use bytes::Bytes;
use itertools::Itertools;
use tracing::{debug, info, instrument};

use crate::codec::{self, Decoder};
use crate::error::{Error, Result};
use crate::storage::{self, Storage};
use crate::task::{Phase, TaskDescriptor};
use crate::KeyValue;

/// The inputs that identify one reduce task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceTask {
    pub job_name: String,
    pub reduce_index: usize,
    pub map_count: usize,
}

impl ReduceTask {
    pub fn new(job_name: impl Into<String>, reduce_index: usize, map_count: usize) -> Self {
        Self {
            job_name: job_name.into(),
            reduce_index,
            map_count,
        }
    }

    pub fn from_descriptor(task: &TaskDescriptor) -> Result<Self> {
        if task.phase != Phase::Reduce {
            return Err(Error::WrongPhase {
                index: task.task_index,
                expected: Phase::Reduce,
                actual: task.phase,
            });
        }
        Ok(Self::new(
            task.job_name.clone(),
            task.task_index,
            task.other_count,
        ))
    }

    pub fn input_location(&self, map_task: usize) -> String {
        storage::intermediate_name(&self.job_name, map_task, self.reduce_index)
    }

    pub fn output_location(&self) -> String {
        storage::output_name(&self.job_name, self.reduce_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReduceSummary {
    pub input_records: usize,
    pub output_records: usize,
}

/// Runs one reduce task against `storage`.
///
/// Reads the intermediate file of every map task for this partition, sorts
/// all records by key and calls `reduce_fn` once per distinct key with the
/// key's values in merge order: map task order first, then the order within
/// each file. The result is written to the task's output location in a single
/// write, replacing whatever was there.
///
/// Any missing or malformed input fails the whole task; nothing is written
/// in that case.
#[instrument(skip_all, fields(job = %task.job_name, reduce = task.reduce_index))]
pub fn execute_reduce<S, F>(
    task: &ReduceTask,
    storage: &S,
    mut reduce_fn: F,
) -> Result<ReduceSummary>
where
    S: Storage + ?Sized,
    F: FnMut(&str, &[String]) -> anyhow::Result<String>,
{
    let mut records: Vec<KeyValue> = Vec::new();
    for map_task in 0..task.map_count {
        let location = task.input_location(map_task);
        let reader = storage.open(&location)?;
        let before = records.len();
        for record in Decoder::new(reader, location.as_str()) {
            records.push(record?);
        }
        debug!(%location, records = records.len() - before, "read intermediate file");
    }
    let input_records = records.len();

    // Must be stable: equal keys keep their merge order.
    records.sort_by(|a, b| a.key.cmp(&b.key));

    let mut output = Vec::new();
    for (key, group) in &records.into_iter().chunk_by(KeyValue::key) {
        let values: Vec<String> = group.map(KeyValue::into_value).collect();
        let result = reduce_fn(&key, &values).map_err(|e| Error::ReduceFn {
            key: key.clone(),
            message: format!("{e:#}"),
        })?;
        output.push(KeyValue::new(key, result));
    }

    let location = task.output_location();
    storage.write(&location, Bytes::from(codec::encode_all(&output)?))?;
    info!(%location, input_records, keys = output.len(), "reduce output written");

    Ok(ReduceSummary {
        input_records,
        output_records: output.len(),
    })
}

/// Collects the outputs of all `n_reduce` partitions of a job, ordered by key.
///
/// Partitions hold disjoint keys, so the result has one record per key.
pub fn merge_outputs<S>(storage: &S, job_name: &str, n_reduce: usize) -> Result<Vec<KeyValue>>
where
    S: Storage + ?Sized,
{
    let mut records = Vec::new();
    for reduce_index in 0..n_reduce {
        let location = storage::output_name(job_name, reduce_index);
        let reader = storage.open(&location)?;
        records.extend(codec::decode_all(reader, &location)?);
    }
    records.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(records)
}
