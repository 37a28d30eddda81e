//! Phases, task descriptors and the static shape of a job.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two stages of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Map,
    Reduce,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Map => f.write_str("map"),
            Phase::Reduce => f.write_str("reduce"),
        }
    }
}

/// Everything a worker needs to run one task. This is the payload of the
/// remote call; it is never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub job_name: String,
    pub phase: Phase,
    pub task_index: usize,
    /// Input file of a map task. Always `None` for reduce tasks.
    pub input_file: Option<String>,
    /// Number of reduce partitions for a map task, number of map tasks for
    /// a reduce task.
    pub other_count: usize,
}

/// The map inputs and reduce partition count of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub name: String,
    pub map_files: Vec<String>,
    pub n_reduce: usize,
}

impl Job {
    pub fn new(name: impl Into<String>, map_files: Vec<String>, n_reduce: usize) -> Self {
        Self {
            name: name.into(),
            map_files,
            n_reduce,
        }
    }

    /// Number of tasks scheduled in `phase`.
    pub fn task_count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Map => self.map_files.len(),
            Phase::Reduce => self.n_reduce,
        }
    }

    /// Number of outputs (map) or inputs (reduce) of each task in `phase`.
    pub fn other_count(&self, phase: Phase) -> usize {
        match phase {
            Phase::Map => self.n_reduce,
            Phase::Reduce => self.map_files.len(),
        }
    }

    /// The input file handed to task `index`; only map tasks have one.
    pub fn input_for(&self, phase: Phase, index: usize) -> Option<String> {
        match phase {
            Phase::Map => self.map_files.get(index).cloned(),
            Phase::Reduce => None,
        }
    }
}
