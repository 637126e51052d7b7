//! Remote authority transport.
//!
//! Operations in this crate describe their calls as an [`ApiArg`] and hand it
//! to a [`RemoteApi`]; [`HttpApi`] is the reqwest-backed implementation used
//! by the embedding process, while tests substitute stubs.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::{HintError, Result};

/// One GET call against the remote authority.
#[derive(Clone, Debug)]
pub struct ApiArg {
  pub endpoint: String,
  pub needs_session: bool,
  pub args: Vec<(String, String)>,
}

impl ApiArg {
  pub fn new(endpoint: impl Into<String>) -> Self {
    Self {
      endpoint: endpoint.into(),
      needs_session: false,
      args: Vec::new(),
    }
  }

  pub fn arg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.args.push((key.into(), value.to_string()));
    self
  }

  pub fn needs_session(mut self, needs: bool) -> Self {
    self.needs_session = needs;
    self
  }
}

/// Response envelope: HTTP status plus the decoded JSON body.
#[derive(Clone, Debug)]
pub struct ApiResponse {
  pub status: u16,
  pub body: Value,
}

/// Trait for remote authority backends.
#[async_trait]
pub trait RemoteApi: Send + Sync {
  async fn get(&self, arg: ApiArg) -> Result<ApiResponse>;
}

/// HTTP implementation of [`RemoteApi`].
pub struct HttpApi {
  client: reqwest::Client,
  base: Url,
  session_token: Option<String>,
}

impl HttpApi {
  pub fn new(base_url: &str) -> Result<Self> {
    let base = Url::parse(base_url)
      .map_err(|e| HintError::Transport(format!("bad api base url {}: {}", base_url, e)))?;

    Ok(Self {
      client: reqwest::Client::new(),
      base,
      session_token: None,
    })
  }

  /// Attach a session token for endpoints that require one. The hint
  /// endpoints themselves do not.
  pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
    self.session_token = Some(token.into());
    self
  }
}

#[async_trait]
impl RemoteApi for HttpApi {
  async fn get(&self, arg: ApiArg) -> Result<ApiResponse> {
    let url = self
      .base
      .join(&arg.endpoint)
      .map_err(|e| HintError::Transport(format!("bad endpoint {}: {}", arg.endpoint, e)))?;

    let mut req = self.client.get(url).query(&arg.args);

    if arg.needs_session {
      let token = self.session_token.as_deref().ok_or_else(|| {
        HintError::Transport(format!("endpoint {} requires a session", arg.endpoint))
      })?;
      req = req.bearer_auth(token);
    }

    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
      return Err(HintError::Transport(format!(
        "{} returned {}",
        arg.endpoint, status
      )));
    }

    let body: Value = resp
      .json()
      .await
      .map_err(|e| HintError::Transport(format!("{} returned bad json: {}", arg.endpoint, e)))?;

    Ok(ApiResponse {
      status: status.as_u16(),
      body,
    })
  }
}
