//! Versioned per-identity hint cache and its load / refresh / store protocol.
//!
//! A [`HintCache`] is loaded from the persistent store, refreshed against the
//! remote authority with its version as a low-water mark, and written back
//! only when something actually changed. Collaborators are passed explicitly
//! into each operation; nothing here holds global state.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::{ApiArg, RemoteApi};
use crate::error::{HintError, Result};
use crate::hint::{HintRecord, SigId, UserId};
use crate::store::{DbKey, HintStore};

/// Endpoint serving incremental hint updates.
const HINTS_ENDPOINT: &str = "sig/hints";

/// Per-identity collection of hint records with a version counter and a
/// dirty flag.
#[derive(Debug)]
pub struct HintCache {
  uid: UserId,
  version: u64,
  hints: HashMap<SigId, HintRecord>,
  dirty: bool,
}

impl HintCache {
  /// Fresh cache at version zero, nothing to persist yet.
  pub fn empty(uid: UserId) -> Self {
    Self {
      uid,
      version: 0,
      hints: HashMap::new(),
      dirty: false,
    }
  }

  /// Build a cache from a serialized document. `dirty` states whether the
  /// document already mirrors persisted state.
  pub fn from_document(uid: UserId, doc: Option<&Value>, dirty: bool) -> Result<Self> {
    let mut cache = Self::empty(uid);
    cache.dirty = dirty;
    cache.populate_with(doc)?;
    Ok(cache)
  }

  /// Rebuild `hints` and `version` from a cache document.
  ///
  /// An absent or null document is a no-op. A present document must carry an
  /// integer `version` and a measurable `hints` array; either failing is
  /// fatal and leaves the cache untouched. Individual entries that fail to
  /// parse are skipped with a warning, so population can partially succeed.
  /// The hint map is fully replaced, last write winning on duplicate keys.
  pub fn populate_with(&mut self, doc: Option<&Value>) -> Result<()> {
    let doc = match doc {
      Some(doc) if !doc.is_null() => doc,
      _ => return Ok(()),
    };

    let version = doc
      .get("version")
      .and_then(Value::as_u64)
      .ok_or_else(|| HintError::MalformedCache("missing integer version".into()))?;
    let entries = doc
      .get("hints")
      .and_then(Value::as_array)
      .ok_or_else(|| HintError::MalformedCache("hints is not an array".into()))?;

    self.version = version;
    self.hints = HashMap::with_capacity(entries.len());
    for entry in entries {
      match HintRecord::from_document(entry) {
        Ok(rec) => {
          self.hints.insert(rec.sig_id(), rec);
        }
        Err(e) => warn!(uid = %self.uid, "skipping bad sig hint: {}", e),
      }
    }
    Ok(())
  }

  /// Look up the hint for one signature id. Absence is a normal outcome.
  pub fn lookup(&self, sig_id: SigId) -> Option<&HintRecord> {
    self.hints.get(&sig_id)
  }

  pub fn uid(&self) -> &UserId {
    &self.uid
  }

  pub fn version(&self) -> u64 {
    self.version
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  pub fn len(&self) -> usize {
    self.hints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.hints.is_empty()
  }

  /// Serialize the full cache to its document form. Entry order is
  /// unspecified; consumers key by `sig_id`.
  pub fn to_document(&self) -> Value {
    let hints: Vec<Value> = self.hints.values().map(HintRecord::to_document).collect();
    json!({ "version": self.version, "hints": hints })
  }

  /// Read the cache for `uid` from the persistent store.
  ///
  /// Not-found surfaces as a `Store` error just like an I/O fault; callers
  /// that want a cold-start fallback construct [`HintCache::empty`]
  /// themselves (see `HintsClient::refresh_and_store`).
  pub fn load(uid: UserId, store: &dyn HintStore) -> Result<Self> {
    debug!(uid = %uid, "loading sig hints");
    let doc = store
      .get(&DbKey::sig_hints(&uid))?
      .ok_or_else(|| HintError::Store(format!("no hint cache stored for {}", uid)))?;
    let cache = Self::from_document(uid, Some(&doc), false)?;
    debug!(uid = %cache.uid, version = cache.version, "sig hints loaded");
    Ok(cache)
  }

  /// Fetch everything newer than the cache's version from the remote
  /// authority and merge it in.
  ///
  /// An empty `hints` array means the stored version was already current and
  /// nothing changes, not even the dirty flag. A non-empty response carries
  /// the full accumulated hint set for this identity, so the hint map is
  /// replaced wholesale and the cache is marked dirty, even if every record
  /// came back identical. Transport failures leave the cache untouched.
  pub async fn refresh(&mut self, api: &dyn RemoteApi) -> Result<()> {
    debug!(uid = %self.uid, low = self.version, "refreshing sig hints");

    let res = api
      .get(
        ApiArg::new(HINTS_ENDPOINT)
          .arg("uid", self.uid.as_str())
          .arg("low", self.version),
      )
      .await?;

    let n = res
      .body
      .get("hints")
      .and_then(Value::as_array)
      .map(|a| a.len())
      .ok_or_else(|| HintError::Transport("response hints is not an array".into()))?;

    if n == 0 {
      debug!(uid = %self.uid, version = self.version, "no changes; version was up to date");
      return Ok(());
    }

    self.populate_with(Some(&res.body))?;
    self.dirty = true;
    debug!(uid = %self.uid, version = self.version, hints = n, "sig hints refreshed");
    Ok(())
  }

  /// Persist the cache if it has unpersisted changes.
  ///
  /// A clean cache performs zero store calls. On a failed put the dirty flag
  /// stays set, so the call is safe to retry.
  pub fn store(&mut self, store: &dyn HintStore) -> Result<()> {
    if !self.dirty {
      debug!(uid = %self.uid, "store skipped; cache not dirty");
      return Ok(());
    }
    debug!(uid = %self.uid, version = self.version, "storing sig hints");
    store.put(&DbKey::sig_hints(&self.uid), &[], &self.to_document())?;
    self.dirty = false;
    Ok(())
  }

  /// [`HintCache::load`] followed by [`HintCache::refresh`]. A load failure
  /// aborts before any network call. Does not persist; call
  /// [`HintCache::store`] for that.
  pub async fn load_and_refresh(
    uid: UserId,
    store: &dyn HintStore,
    api: &dyn RemoteApi,
  ) -> Result<Self> {
    let mut cache = Self::load(uid, store)?;
    cache.refresh(api).await?;
    Ok(cache)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ApiResponse;
  use crate::hint::sample_sig_id;
  use crate::store::MemStore;
  use async_trait::async_trait;
  use std::sync::Mutex;

  fn uid() -> UserId {
    UserId::new("u1")
  }

  fn cache_doc(version: u64, ids: &[&str]) -> Value {
    let hints: Vec<Value> = ids
      .iter()
      .map(|id| json!({ "sig_id": id, "remote_id": "r", "api_url": "", "human_url": "" }))
      .collect();
    json!({ "version": version, "hints": hints })
  }

  /// Remote stub that replays canned responses and records the args it saw.
  struct StubApi {
    responses: Mutex<Vec<Result<ApiResponse>>>,
    seen: Mutex<Vec<ApiArg>>,
  }

  impl StubApi {
    fn replying(body: Value) -> Self {
      Self {
        responses: Mutex::new(vec![Ok(ApiResponse { status: 200, body })]),
        seen: Mutex::new(Vec::new()),
      }
    }

    fn failing() -> Self {
      Self {
        responses: Mutex::new(vec![Err(HintError::Transport("connection refused".into()))]),
        seen: Mutex::new(Vec::new()),
      }
    }
  }

  #[async_trait]
  impl RemoteApi for StubApi {
    async fn get(&self, arg: ApiArg) -> Result<ApiResponse> {
      self.seen.lock().unwrap().push(arg);
      self.responses.lock().unwrap().remove(0)
    }
  }

  #[test]
  fn test_populate_with_none_is_noop() {
    let mut cache = HintCache::empty(uid());
    cache.populate_with(None).unwrap();

    assert_eq!(cache.version(), 0);
    assert!(cache.is_empty());
    assert!(!cache.is_dirty());
  }

  #[test]
  fn test_populate_with_null_is_noop() {
    let mut cache = HintCache::empty(uid());
    cache.populate_with(Some(&Value::Null)).unwrap();

    assert_eq!(cache.version(), 0);
    assert!(cache.is_empty());
  }

  #[test]
  fn test_populate_requires_version() {
    let mut cache = HintCache::empty(uid());
    let doc = json!({ "hints": [] });

    assert!(matches!(
      cache.populate_with(Some(&doc)),
      Err(HintError::MalformedCache(_))
    ));
  }

  #[test]
  fn test_populate_requires_hints_array() {
    let mut cache = HintCache::empty(uid());
    let doc = json!({ "version": 3, "hints": "nope" });

    assert!(matches!(
      cache.populate_with(Some(&doc)),
      Err(HintError::MalformedCache(_))
    ));
    // fatal before any mutation
    assert_eq!(cache.version(), 0);
  }

  #[test]
  fn test_populate_skips_bad_entries() {
    let good = sample_sig_id(0x01);
    let doc = json!({
      "version": 4,
      "hints": [
        { "sig_id": good.as_str(), "remote_id": "r1" },
        { "sig_id": "not-a-sig-id" },
      ],
    });

    let cache = HintCache::from_document(uid(), Some(&doc), false).unwrap();
    assert_eq!(cache.version(), 4);
    assert_eq!(cache.len(), 1);
    assert!(cache.lookup(good.parse().unwrap()).is_some());
  }

  #[test]
  fn test_populate_duplicate_keys_last_write_wins() {
    let id = sample_sig_id(0x03);
    let doc = json!({
      "version": 6,
      "hints": [
        { "sig_id": id.as_str(), "remote_id": "first" },
        { "sig_id": id.as_str(), "remote_id": "second" },
      ],
    });

    let cache = HintCache::from_document(uid(), Some(&doc), false).unwrap();
    assert_eq!(cache.len(), 1);
    let rec = cache.lookup(id.parse().unwrap()).unwrap();
    assert_eq!(rec.remote_id(), "second");
  }

  #[test]
  fn test_populate_replaces_previous_records() {
    let first = sample_sig_id(0x01);
    let second = sample_sig_id(0x02);

    let mut cache =
      HintCache::from_document(uid(), Some(&cache_doc(1, &[&first])), false).unwrap();
    cache.populate_with(Some(&cache_doc(2, &[&second]))).unwrap();

    assert_eq!(cache.version(), 2);
    assert_eq!(cache.len(), 1);
    assert!(cache.lookup(first.parse().unwrap()).is_none());
    assert!(cache.lookup(second.parse().unwrap()).is_some());
  }

  #[test]
  fn test_lookup_absent_is_none() {
    let cache = HintCache::empty(uid());
    let id = sample_sig_id(0x07).parse().unwrap();
    assert!(cache.lookup(id).is_none());
  }

  #[test]
  fn test_cache_document_round_trip() {
    let doc = cache_doc(9, &[&sample_sig_id(0x01), &sample_sig_id(0x02)]);
    let cache = HintCache::from_document(uid(), Some(&doc), false).unwrap();

    let reloaded = HintCache::from_document(uid(), Some(&cache.to_document()), false).unwrap();
    assert_eq!(reloaded.version(), 9);
    assert_eq!(reloaded.len(), 2);
  }

  #[test]
  fn test_load_cold_identity_is_store_error() {
    let store = MemStore::new();
    assert!(matches!(
      HintCache::load(uid(), &store),
      Err(HintError::Store(_))
    ));
  }

  #[test]
  fn test_load_reads_persisted_document() {
    let store = MemStore::new();
    store
      .put(
        &DbKey::sig_hints(&uid()),
        &[],
        &cache_doc(5, &[&sample_sig_id(0x01)]),
      )
      .unwrap();

    let cache = HintCache::load(uid(), &store).unwrap();
    assert_eq!(cache.version(), 5);
    assert_eq!(cache.len(), 1);
    assert!(!cache.is_dirty());
  }

  #[tokio::test]
  async fn test_refresh_empty_response_is_noop() {
    let mut cache =
      HintCache::from_document(uid(), Some(&cache_doc(5, &[&sample_sig_id(0x01)])), false)
        .unwrap();
    let api = StubApi::replying(json!({ "version": 5, "hints": [] }));

    cache.refresh(&api).await.unwrap();

    assert_eq!(cache.version(), 5);
    assert_eq!(cache.len(), 1);
    assert!(!cache.is_dirty());
  }

  #[tokio::test]
  async fn test_refresh_applies_new_hints_and_dirties() {
    let old = sample_sig_id(0x01);
    let new = sample_sig_id(0x02);
    let mut cache =
      HintCache::from_document(uid(), Some(&cache_doc(5, &[&old])), false).unwrap();
    let api = StubApi::replying(cache_doc(7, &[&new]));

    cache.refresh(&api).await.unwrap();

    assert_eq!(cache.version(), 7);
    assert_eq!(cache.len(), 1);
    assert!(cache.lookup(new.parse().unwrap()).is_some());
    assert!(cache.is_dirty());
  }

  #[tokio::test]
  async fn test_refresh_sends_version_as_low_water_mark() {
    let mut cache = HintCache::from_document(uid(), Some(&cache_doc(5, &[])), false).unwrap();
    let api = StubApi::replying(json!({ "version": 5, "hints": [] }));

    cache.refresh(&api).await.unwrap();

    let seen = api.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].endpoint, "sig/hints");
    assert!(!seen[0].needs_session);
    assert!(seen[0].args.contains(&("uid".to_string(), "u1".to_string())));
    assert!(seen[0].args.contains(&("low".to_string(), "5".to_string())));
  }

  #[tokio::test]
  async fn test_refresh_transport_failure_leaves_cache_untouched() {
    let id = sample_sig_id(0x01);
    let mut cache = HintCache::from_document(uid(), Some(&cache_doc(5, &[&id])), false).unwrap();
    let api = StubApi::failing();

    assert!(matches!(
      cache.refresh(&api).await,
      Err(HintError::Transport(_))
    ));
    assert_eq!(cache.version(), 5);
    assert_eq!(cache.len(), 1);
    assert!(!cache.is_dirty());
  }

  #[tokio::test]
  async fn test_refresh_unmeasurable_hints_propagates() {
    let mut cache = HintCache::from_document(uid(), Some(&cache_doc(5, &[])), false).unwrap();
    let api = StubApi::replying(json!({ "version": 6 }));

    assert!(matches!(
      cache.refresh(&api).await,
      Err(HintError::Transport(_))
    ));
    assert_eq!(cache.version(), 5);
  }

  /// Store whose writes always fail.
  struct FailingStore;

  impl HintStore for FailingStore {
    fn get(&self, _key: &DbKey) -> Result<Option<Value>> {
      Err(HintError::Store("disk full".into()))
    }

    fn put(&self, _key: &DbKey, _index_keys: &[DbKey], _value: &Value) -> Result<()> {
      Err(HintError::Store("disk full".into()))
    }
  }

  #[test]
  fn test_store_failure_keeps_dirty_so_retry_succeeds() {
    let doc = cache_doc(3, &[&sample_sig_id(0x01)]);
    let mut cache = HintCache::from_document(uid(), Some(&doc), true).unwrap();

    assert!(matches!(
      cache.store(&FailingStore),
      Err(HintError::Store(_))
    ));
    assert!(cache.is_dirty());

    let store = MemStore::new();
    cache.store(&store).unwrap();
    assert!(!cache.is_dirty());
    assert_eq!(store.put_count(), 1);
  }

  #[test]
  fn test_store_clean_cache_writes_nothing() {
    let store = MemStore::new();
    let mut cache = HintCache::empty(uid());

    cache.store(&store).unwrap();
    assert_eq!(store.put_count(), 0);
  }

  #[test]
  fn test_store_dirty_cache_writes_once_then_skips() {
    let store = MemStore::new();
    let doc = cache_doc(3, &[&sample_sig_id(0x01)]);
    let mut cache = HintCache::from_document(uid(), Some(&doc), true).unwrap();

    cache.store(&store).unwrap();
    assert!(!cache.is_dirty());

    cache.store(&store).unwrap();
    assert_eq!(store.put_count(), 1);

    let persisted = store.get(&DbKey::sig_hints(&uid())).unwrap().unwrap();
    assert_eq!(persisted.get("version").and_then(Value::as_u64), Some(3));
  }

  #[tokio::test]
  async fn test_load_and_refresh_aborts_on_load_failure() {
    let store = MemStore::new();
    let api = StubApi::replying(json!({ "version": 1, "hints": [] }));

    assert!(matches!(
      HintCache::load_and_refresh(uid(), &store, &api).await,
      Err(HintError::Store(_))
    ));
    // refresh never attempted
    assert!(api.seen.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_load_and_refresh_does_not_persist() {
    let store = MemStore::new();
    store
      .put(&DbKey::sig_hints(&uid()), &[], &cache_doc(1, &[]))
      .unwrap();
    let api = StubApi::replying(cache_doc(2, &[&sample_sig_id(0x01)]));

    let cache = HintCache::load_and_refresh(uid(), &store, &api).await.unwrap();

    assert_eq!(cache.version(), 2);
    assert!(cache.is_dirty());
    // only the seed put above
    assert_eq!(store.put_count(), 1);
  }
}
