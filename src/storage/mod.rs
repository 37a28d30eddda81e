//! Where intermediate and output records live.
//!
//! Producers and consumers never exchange file names; both sides derive
//! them from [`intermediate_name`] and [`output_name`].

use std::io::Read;

use bytes::Bytes;

use crate::error::Result;

pub mod local;
pub mod memory;

pub use local::FsStorage;
pub use memory::MemStorage;

/// Name of the data map task `map_task` produced for reduce partition
/// `reduce_task`.
pub fn intermediate_name(job_name: &str, map_task: usize, reduce_task: usize) -> String {
    format!("mrtmp.{job_name}-{map_task}-{reduce_task}")
}

/// Name of the output of reduce partition `reduce_task`.
pub fn output_name(job_name: &str, reduce_task: usize) -> String {
    format!("mrtmp.{job_name}-res-{reduce_task}")
}

/// A flat namespace of locations holding encoded records.
pub trait Storage: Send + Sync {
    /// Opens `location` for sequential reading.
    fn open(&self, location: &str) -> Result<Box<dyn Read + Send + '_>>;

    /// Replaces the whole content of `location` with `data`.
    ///
    /// Concurrent writers of the same location must leave one complete
    /// payload behind, never a mix.
    fn write(&self, location: &str, data: Bytes) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_distinct_per_partition() {
        assert_eq!(intermediate_name("wc", 1, 0), "mrtmp.wc-1-0");
        assert_eq!(output_name("wc", 0), "mrtmp.wc-res-0");
        assert_ne!(intermediate_name("wc", 1, 0), intermediate_name("wc", 0, 1));
    }
}
