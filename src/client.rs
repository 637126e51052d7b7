//! Client wrapper tying a store and a remote authority together.

use std::sync::Arc;

use tracing::debug;

use crate::api::{HttpApi, RemoteApi};
use crate::cache::HintCache;
use crate::config::Config;
use crate::error::Result;
use crate::hint::{HintRecord, SigId, UserId};
use crate::store::{HintStore, SqliteStore};

/// Hint cache operations with the collaborators wired in once.
///
/// This is the surface the embedding identity-resolution process uses; the
/// per-operation functions on [`HintCache`] stay available for callers that
/// manage collaborators themselves.
#[derive(Clone)]
pub struct HintsClient {
  store: Arc<dyn HintStore>,
  api: Arc<dyn RemoteApi>,
}

impl HintsClient {
  pub fn new(store: Arc<dyn HintStore>, api: Arc<dyn RemoteApi>) -> Self {
    Self { store, api }
  }

  /// Wire up the default collaborators: a SQLite store and an HTTP API.
  pub fn from_config(config: &Config) -> Result<Self> {
    let store = match &config.store.path {
      Some(path) => SqliteStore::open_at(path)?,
      None => SqliteStore::open()?,
    };
    let api = HttpApi::new(&config.server.url)?;
    Ok(Self::new(Arc::new(store), Arc::new(api)))
  }

  /// Read the persisted cache for `uid`.
  pub fn load(&self, uid: UserId) -> Result<HintCache> {
    HintCache::load(uid, self.store.as_ref())
  }

  /// Load then refresh, without persisting.
  pub async fn load_and_refresh(&self, uid: UserId) -> Result<HintCache> {
    HintCache::load_and_refresh(uid, self.store.as_ref(), self.api.as_ref()).await
  }

  /// Persist `cache` if dirty.
  pub fn store(&self, cache: &mut HintCache) -> Result<()> {
    cache.store(self.store.as_ref())
  }

  /// The full round trip: load (falling back to an empty cache for a
  /// never-cached identity), refresh, persist.
  pub async fn refresh_and_store(&self, uid: UserId) -> Result<HintCache> {
    let mut cache = match HintCache::load(uid.clone(), self.store.as_ref()) {
      Ok(cache) => cache,
      Err(e) => {
        debug!(uid = %uid, "starting fresh hint cache: {}", e);
        HintCache::empty(uid)
      }
    };
    cache.refresh(self.api.as_ref()).await?;
    cache.store(self.store.as_ref())?;
    Ok(cache)
  }

  /// Up-to-date lookup of a single signature id.
  pub async fn lookup(&self, uid: UserId, sig_id: SigId) -> Result<Option<HintRecord>> {
    let cache = self.refresh_and_store(uid).await?;
    Ok(cache.lookup(sig_id).cloned())
  }
}
