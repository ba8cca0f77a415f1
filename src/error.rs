//! Error taxonomy for the segment manager and the containers built on it.
//!
//! Mirrors the four-way split the containers agree on: a caller mistake
//! (`InvalidArgument`), arena exhaustion (`OutOfMemory`), a header that
//! fails its self-check on open (`CorruptedState`), and anything the OS
//! handed back while mapping or flushing (`Io`).

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("arena exhausted: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("corrupted segment state: {0}")]
    CorruptedState(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
