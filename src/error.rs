//! Error taxonomy for hint cache operations.
//!
//! Per-record parse failures (`MalformedRecord`) are non-fatal during cache
//! population: the bad entry is skipped with a warning and the rest of the
//! document is still applied. Everything else aborts the enclosing operation
//! and propagates to the caller with previously-committed state intact.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HintError>;

#[derive(Debug, Error)]
pub enum HintError {
  /// A single hint entry failed to parse its mandatory signature id.
  #[error("bad signature hint: {0}")]
  MalformedRecord(String),

  /// The cache document itself lacks a mandatory field.
  #[error("malformed hint cache: {0}")]
  MalformedCache(String),

  /// Persistent store read/write failure, including not-found on load.
  #[error("hint store: {0}")]
  Store(String),

  /// Remote call failure or malformed response envelope.
  #[error("hint api: {0}")]
  Transport(String),

  /// Configuration file missing or unreadable.
  #[error("config: {0}")]
  Config(String),
}

impl From<rusqlite::Error> for HintError {
  fn from(e: rusqlite::Error) -> Self {
    HintError::Store(e.to_string())
  }
}

impl From<reqwest::Error> for HintError {
  fn from(e: reqwest::Error) -> Self {
    HintError::Transport(e.to_string())
  }
}
