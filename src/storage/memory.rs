use std::io::{self, Read};

use bytes::{Buf, Bytes};
use dashmap::DashMap;

use super::Storage;
use crate::codec;
use crate::error::{Error, Result};
use crate::KeyValue;

/// In-process storage, shared between the coordinator and local workers.
#[derive(Debug, Default)]
pub struct MemStorage {
    objects: DashMap<String, Bytes>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.insert(location.into(), data.into());
    }

    /// Encodes `records` and stores them at `location`.
    pub fn put_records(&self, location: impl Into<String>, records: &[KeyValue]) -> Result<()> {
        let buf = codec::encode_all(records)?;
        self.insert(location, buf);
        Ok(())
    }

    pub fn get(&self, location: &str) -> Option<Bytes> {
        self.objects.get(location).map(|data| data.value().clone())
    }

    pub fn contains(&self, location: &str) -> bool {
        self.objects.contains_key(location)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Storage for MemStorage {
    fn open(&self, location: &str) -> Result<Box<dyn Read + Send + '_>> {
        match self.get(location) {
            Some(data) => Ok(Box::new(data.reader())),
            None => Err(Error::Open {
                location: location.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such object"),
            }),
        }
    }

    fn write(&self, location: &str, data: Bytes) -> Result<()> {
        self.objects.insert(location.to_string(), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_replaces_previous_content() {
        let storage = MemStorage::new();
        storage.write("out", Bytes::from_static(b"first")).unwrap();
        storage.write("out", Bytes::from_static(b"second")).unwrap();

        let mut content = String::new();
        storage.open("out").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "second");
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn missing_location_fails_to_open() {
        let storage = MemStorage::new();
        let err = storage.open("nope").err().unwrap();
        assert!(matches!(err, Error::Open { ref location, .. } if location == "nope"));
    }
}
