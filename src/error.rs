//! Error taxonomy for the reader.
//!
//! Each subsystem gets its own `thiserror`-derived enum, matching the
//! layering of a parser/scanner/composer split rather than one flat error.

use crate::stream::Mark;

/// Errors that can occur while resolving or coercing a [`crate::value::Value`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValueError {
    #[error("path did not resolve to a node")]
    NotFound,
    #[error("node is not of the requested type")]
    TypeMismatch,
    #[error("scalar could not be parsed as the requested type")]
    ParseFailure,
    #[error("value does not fit in the destination type")]
    Overflow,
    #[error("no extension is registered for tag {0:?}")]
    UnknownExtension(String),
    #[error("extension deserialization failed: {0}")]
    ExtensionFailed(String),
}

/// Errors produced while reading from a [`crate::stream::Stream`].
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("I/O error at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("seek target {0} is out of range")]
    InvalidSeek(u64),
    #[error("out of memory while growing capture buffer")]
    OutOfMemory,
    #[error("unexpected end of stream at offset {0}")]
    UnexpectedEof(u64),
}

/// Errors produced while running the framing state machine.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("malformed ASDF version header at {mark:?}")]
    InvalidHeader { mark: Mark },
    #[error("malformed block header at offset {offset}: {reason}")]
    InvalidBlockHeader { offset: u64, reason: &'static str },
    #[error("YAML error: {0}")]
    Yaml(String),
    #[error("unexpected end of input while {context}")]
    UnexpectedEof { context: &'static str },
}

/// Top-level error type surfaced by the public [`crate::file::File`] API.
#[derive(Debug, thiserror::Error)]
pub enum AsdfError {
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error("block index {0} does not exist")]
    NoSuchBlock(usize),
    #[error("requested tile is out of bounds")]
    OutOfBounds,
    #[error("unsupported ndarray datatype: {0}")]
    UnsupportedDatatype(String),
    #[error("no decompressor registered for compression codec {0:?}")]
    UnsupportedCompression(String),
    #[error("out of memory")]
    OutOfMemory,
    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = AsdfError> = std::result::Result<T, E>;
