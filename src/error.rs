//! Errors raised while executing tasks and reading configuration.

use std::io;

use crate::task::Phase;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open `{location}`")]
    Open {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot write `{location}`")]
    Write {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed record in `{location}`")]
    Decode {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode record")]
    Encode(#[source] serde_json::Error),

    #[error("reduce function failed for key `{key}`: {message}")]
    ReduceFn { key: String, message: String },

    #[error("task {index} belongs to the {actual} phase, expected {expected}")]
    WrongPhase {
        index: usize,
        expected: Phase,
        actual: Phase,
    },

    #[error("worker registry closed")]
    RegistryClosed,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
