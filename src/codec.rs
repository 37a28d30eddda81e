//! Record codec for intermediate and output files.
//!
//! Records are written as one JSON object per line, so a reader can decode
//! until the stream is exhausted without knowing how many records to expect.
//! Keys and values may hold any string, including empty ones and embedded
//! newlines (JSON escapes them).

use std::io::{Read, Write};

use serde_json::de::IoRead;
use serde_json::StreamDeserializer;

use crate::error::{Error, Result};
use crate::KeyValue;

/// Streams records into a writer.
pub struct Encoder<W: Write> {
    writer: W,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn encode(&mut self, kv: &KeyValue) -> Result<()> {
        serde_json::to_writer(&mut self.writer, kv).map_err(Error::Encode)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Iterator over the records of a stream.
///
/// The location name is only used to label decode errors.
pub struct Decoder<R: Read> {
    location: String,
    records: StreamDeserializer<'static, IoRead<R>, KeyValue>,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R, location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            records: serde_json::Deserializer::from_reader(reader).into_iter(),
        }
    }
}

impl<R: Read> Iterator for Decoder<R> {
    type Item = Result<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(|record| {
            record.map_err(|source| Error::Decode {
                location: self.location.clone(),
                source,
            })
        })
    }
}

/// Encodes `records` in order into a fresh buffer.
pub fn encode_all<'a>(records: impl IntoIterator<Item = &'a KeyValue>) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::new());
    for kv in records {
        encoder.encode(kv)?;
    }
    encoder.finish()
}

/// Decodes a whole stream, failing on the first malformed record.
pub fn decode_all<R: Read>(reader: R, location: &str) -> Result<Vec<KeyValue>> {
    Decoder::new(reader, location).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_stream_has_no_records() {
        let records = decode_all(&b""[..], "empty").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn keeps_empty_strings_and_newlines() {
        let records = vec![
            KeyValue::new("", ""),
            KeyValue::new("line\nbreak", "tab\tand \"quotes\""),
            KeyValue::new("a", ""),
        ];
        let buf = encode_all(&records).unwrap();
        assert_eq!(buf.iter().filter(|b| **b == b'\n').count(), 3);
        assert_eq!(decode_all(buf.as_slice(), "mem").unwrap(), records);
    }

    #[test]
    fn truncated_stream_is_a_decode_error() {
        let mut buf = encode_all(&[KeyValue::new("a", "1"), KeyValue::new("b", "2")]).unwrap();
        buf.truncate(buf.len() - 5);

        let mut decoder = Decoder::new(buf.as_slice(), "mrtmp.wc-0-0");
        assert_eq!(decoder.next().unwrap().unwrap(), KeyValue::new("a", "1"));
        let err = decoder.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Decode { ref location, .. } if location == "mrtmp.wc-0-0"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_all(&b"{\"key\":\"a\"}\n"[..], "x").is_err());
        assert!(decode_all(&b"not json"[..], "x").is_err());
    }

    proptest! {
        #[test]
        fn round_trip_preserves_sequence(
            pairs in proptest::collection::vec((".*", ".*"), 0..32)
        ) {
            let records: Vec<KeyValue> =
                pairs.into_iter().map(|(k, v)| KeyValue::new(k, v)).collect();
            let buf = encode_all(&records).unwrap();
            prop_assert_eq!(decode_all(buf.as_slice(), "prop").unwrap(), records);
        }
    }
}
