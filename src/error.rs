// Copyright (c) 2024-present, ifcore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::codec::{DecodeError, EncodeError};

/// Errors that can occur anywhere in the indexing/retrieval core.
///
/// Variants are a closed set on purpose (see §7 of the design notes):
/// callers match on the kind rather than inspecting a string.
#[derive(Debug)]
pub enum Error {
    /// Read/write/seek/open failed; carries the underlying OS error.
    Io(std::io::Error),

    /// A decoded structure violated an invariant: a control character in a
    /// term, a decreasing docno inside one posting list, a declared-size
    /// mismatch, a bad magic number, or an unsupported format version.
    Corrupt(&'static str),

    /// Out of memory or out of file descriptors.
    Resource(&'static str),

    /// API misuse, e.g. `Pyramid::add` after `finish`, or a double-free on
    /// the freemap.
    InvalidState(&'static str),

    /// The freemap could not satisfy an allocation, or a lookup (docmap,
    /// vocabulary) referenced an id that does not exist.
    NotFound(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Corrupt(msg) => write!(f, "corrupt data: {msg}"),
            Self::Resource(msg) => write!(f, "resource exhausted: {msg}"),
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        match value {
            EncodeError::Io(e) => Self::Io(e),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        match value {
            DecodeError::Io(e) => Self::Io(e),
            DecodeError::NeedMoreInput => {
                Self::Corrupt("unexpected end of buffer while decoding an integer")
            }
            DecodeError::Malformed(msg) => Self::Corrupt(msg),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
