//! Versioned per-identity cache of signature hints.
//!
//! A hint is an addressing record: for one signature id, where the remote
//! authority keeps the record and where its backing content can be fetched.
//! Enumerating them in full on every use is slow, so this crate keeps a
//! local copy in a persistent store and syncs it incrementally: the cache's
//! version is sent as a low-water mark, the authority answers with anything
//! newer, and write-back only happens when something actually changed.
//!
//! The store and the remote transport sit behind traits ([`HintStore`],
//! [`RemoteApi`]); [`SqliteStore`] and [`HttpApi`] are the stock
//! implementations, and [`HintsClient`] wires them together for the common
//! flows.

mod api;
mod cache;
mod client;
mod config;
mod error;
mod hint;
mod store;

pub use api::{ApiArg, ApiResponse, HttpApi, RemoteApi};
pub use cache::HintCache;
pub use client::HintsClient;
pub use config::{Config, ServerConfig, StoreConfig};
pub use error::{HintError, Result};
pub use hint::{HintRecord, SigId, UserId, SIG_ID_LEN, SIG_ID_SUFFIX};
pub use store::{DbKey, DbKind, HintStore, MemStore, SqliteStore};
