use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;

use bytes::Bytes;
use glob::{glob, Pattern};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::Storage;
use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// Storage rooted at a local (or shared network) directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.root.clone())
    }

    pub fn path(&self, location: &str) -> PathBuf {
        self.root.join(location)
    }

    /// Deletes every intermediate and output file of `job_name`.
    ///
    /// Returns how many files were removed.
    pub fn remove_job_files(&self, job_name: &str) -> Result<usize> {
        let pattern = format!(
            "{}/{}",
            Pattern::escape(&self.root.to_string_lossy()),
            Pattern::escape(&format!("mrtmp.{job_name}-"))
        ) + "*";
        let paths = glob(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut removed = 0;
        for path in paths {
            match path {
                Ok(path) => {
                    fs::remove_file(&path)?;
                    trace!(path = %path.display(), "removed");
                    removed += 1;
                }
                Err(e) => warn!(error = %e, "skipping unreadable path"),
            }
        }
        debug!(job = job_name, removed, "cleaned up job files");
        Ok(removed)
    }
}

impl Storage for FsStorage {
    fn open(&self, location: &str) -> Result<Box<dyn Read + Send + '_>> {
        let file = File::open(self.path(location)).map_err(|source| Error::Open {
            location: location.to_string(),
            source,
        })?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn write(&self, location: &str, data: Bytes) -> Result<()> {
        let target = self.path(location);
        // Attempts racing on one location each fill a private temp file;
        // rename keeps exactly one of them.
        let temp = self.path(&format!(".{location}.{}.tmp", Uuid::new_v4()));
        let wrap = |source| Error::Write {
            location: location.to_string(),
            source,
        };

        let written = File::create(&temp)
            .and_then(|mut file| {
                file.write_all(&data)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp, &target));
        if let Err(source) = written {
            let _ = fs::remove_file(&temp);
            return Err(wrap(source));
        }
        trace!(location, bytes = data.len(), "wrote");
        Ok(())
    }
}
