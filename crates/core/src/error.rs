//! Error taxonomy shared by every component in this crate.

use std::fmt;
use std::path::PathBuf;

/// The closed set of ways a filex operation can fail.
#[derive(Debug)]
pub enum FilexError {
    NotFound(PathBuf),
    InvalidArgument(String),
    UnsupportedType(String),
    DecodeError(String),
    DocxParseError(String),
    PersistenceError(String),
    Conflict(String),
    TransientLoadError(String),
}

impl fmt::Display for FilexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilexError::NotFound(p) => write!(f, "not found: {}", p.display()),
            FilexError::InvalidArgument(m) => write!(f, "invalid argument: {m}"),
            FilexError::UnsupportedType(m) => write!(f, "unsupported type: {m}"),
            FilexError::DecodeError(m) => write!(f, "decode error: {m}"),
            FilexError::DocxParseError(m) => write!(f, "docx parse error: {m}"),
            FilexError::PersistenceError(m) => write!(f, "persistence error: {m}"),
            FilexError::Conflict(m) => write!(f, "conflict: {m}"),
            FilexError::TransientLoadError(m) => write!(f, "transient load error: {m}"),
        }
    }
}

impl std::error::Error for FilexError {}

impl From<std::io::Error> for FilexError {
    fn from(e: std::io::Error) -> Self {
        FilexError::PersistenceError(e.to_string())
    }
}

impl From<rusqlite::Error> for FilexError {
    fn from(e: rusqlite::Error) -> Self {
        FilexError::PersistenceError(e.to_string())
    }
}

impl From<serde_json::Error> for FilexError {
    fn from(e: serde_json::Error) -> Self {
        FilexError::PersistenceError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FilexError>;
