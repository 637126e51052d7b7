//! Leaf entities: signature ids and the addressing records that point at
//! where a signature's backing content can be fetched.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::error::{HintError, Result};

/// Length in bytes of a decoded signature id.
pub const SIG_ID_LEN: usize = 33;

/// Trailing suffix byte every valid signature id carries.
pub const SIG_ID_SUFFIX: u8 = 0x0f;

/// Canonical fixed-form identifier of one signed object.
///
/// Wire form is 66 lowercase hex characters: a 32-byte payload followed by
/// the `0x0f` suffix byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SigId([u8; SIG_ID_LEN]);

impl SigId {
  /// Parse a signature id from its hex wire form.
  pub fn from_hex(s: &str) -> Result<Self> {
    let bytes = hex::decode(s)
      .map_err(|e| HintError::MalformedRecord(format!("sig_id is not hex: {}", e)))?;
    let arr: [u8; SIG_ID_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
      HintError::MalformedRecord(format!(
        "sig_id has {} bytes, expected {}",
        b.len(),
        SIG_ID_LEN
      ))
    })?;
    if arr[SIG_ID_LEN - 1] != SIG_ID_SUFFIX {
      return Err(HintError::MalformedRecord(format!(
        "sig_id has suffix 0x{:02x}, expected 0x{:02x}",
        arr[SIG_ID_LEN - 1],
        SIG_ID_SUFFIX
      )));
    }
    Ok(Self(arr))
  }

  pub fn to_hex(&self) -> String {
    hex::encode(self.0)
  }
}

impl FromStr for SigId {
  type Err = HintError;

  fn from_str(s: &str) -> Result<Self> {
    Self::from_hex(s)
  }
}

impl fmt::Display for SigId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_hex())
  }
}

impl fmt::Debug for SigId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "SigId({})", self.to_hex())
  }
}

/// Key of the identity owning a hint cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
  pub fn new(uid: impl Into<String>) -> Self {
    Self(uid.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for UserId {
  fn from(s: &str) -> Self {
    Self::new(s)
  }
}

/// Addressing record for one signature id: where the remote authority keeps
/// the record, and where its backing content can be fetched by machines and
/// by humans. Immutable once constructed; keyed by `sig_id` only.
#[derive(Clone, Debug)]
pub struct HintRecord {
  sig_id: SigId,
  remote_id: String,
  api_url: String,
  human_url: String,
}

impl HintRecord {
  /// Build a record from a flat document.
  ///
  /// `sig_id` is mandatory and must parse; the three URL-ish fields are
  /// optional strings, treated as empty when absent or of the wrong type.
  pub fn from_document(doc: &Value) -> Result<Self> {
    let sig_id = doc
      .get("sig_id")
      .and_then(Value::as_str)
      .ok_or_else(|| HintError::MalformedRecord("missing sig_id".into()))?;
    Ok(Self {
      sig_id: SigId::from_hex(sig_id)?,
      remote_id: opt_string(doc, "remote_id"),
      api_url: opt_string(doc, "api_url"),
      human_url: opt_string(doc, "human_url"),
    })
  }

  /// Emit the flat document form. `from_document` of the result reproduces
  /// the record exactly.
  pub fn to_document(&self) -> Value {
    json!({
      "sig_id": self.sig_id.to_hex(),
      "remote_id": self.remote_id,
      "api_url": self.api_url,
      "human_url": self.human_url,
    })
  }

  pub fn sig_id(&self) -> SigId {
    self.sig_id
  }

  pub fn remote_id(&self) -> &str {
    &self.remote_id
  }

  pub fn api_url(&self) -> &str {
    &self.api_url
  }

  pub fn human_url(&self) -> &str {
    &self.human_url
  }
}

impl PartialEq for HintRecord {
  fn eq(&self, other: &Self) -> bool {
    self.sig_id == other.sig_id
  }
}

impl Eq for HintRecord {}

/// Optional-field extraction: absent or non-string values fall back to the
/// empty string, never an error.
fn opt_string(doc: &Value, key: &str) -> String {
  doc
    .get(key)
    .and_then(Value::as_str)
    .unwrap_or_default()
    .to_string()
}

/// Well-formed hex sig id for tests in this crate.
#[cfg(test)]
pub(crate) fn sample_sig_id(fill: u8) -> String {
  let mut bytes = [fill; SIG_ID_LEN];
  bytes[SIG_ID_LEN - 1] = SIG_ID_SUFFIX;
  hex::encode(bytes)
}
