use std::path::PathBuf;

use crate::{sha1sum::Sha1sum, sparse::ChunkHeader};

/// Terminal outcome of a decode session, with the output offset it stopped at
#[derive(Debug, thiserror::Error)]
pub(crate) enum DecodeError {
    #[error("read failure at output offset 0x{offset:x}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("write failure at output offset 0x{offset:x}: {source}")]
    Write {
        offset: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid chunk #{index} at output offset 0x{offset:x}: {chunk}")]
    Format {
        offset: u64,
        index: u64,
        chunk: ChunkHeader,
    },
    #[error("chunk #{index} at output offset 0x{offset:x} overflows the output offset: {chunk}")]
    CursorOverflow {
        offset: u64,
        index: u64,
        chunk: ChunkHeader,
    },
}

impl DecodeError {
    pub(crate) fn class(&self) -> &'static str {
        match self {
            DecodeError::Read { .. } => "read error",
            DecodeError::Write { .. } => "write error",
            DecodeError::Format { .. } => "invalid format",
            DecodeError::CursorOverflow { .. } => "invalid format",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("{}: {0}", .0.class())]
    DecodeError(#[from] DecodeError),
    #[error("invalid hex digest: {0}")]
    FromHexError(#[from] hex::FromHexError),
    #[error("invalid progress bar template: {0}")]
    TemplateError(#[from] indicatif::style::TemplateError),
    #[error("failed to serialize report: {0}")]
    YamlError(#[from] serde_yaml::Error),
    #[error("failed to open '{}': {source}", .path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("SHA1 mismatch: expected {expected}, calculated {calculated}")]
    Sha1Mismatch {
        expected: Sha1sum,
        calculated: Sha1sum,
    },
}

pub(crate) type Result<T> = std::result::Result<T, Error>;
