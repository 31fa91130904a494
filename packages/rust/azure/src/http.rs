//! Shared request plumbing for the Azure REST clients.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use archdoc_shared::{ArchDocError, Result};

/// User-Agent string for collaborator requests.
const USER_AGENT: &str = concat!("archdoc/", env!("CARGO_PKG_VERSION"));

/// Transport-level ceiling; the pipeline applies its own per-call deadline.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Error bodies are truncated to this many characters.
const MAX_ERROR_BODY: usize = 500;

pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|e| ArchDocError::Network(format!("failed to build HTTP client: {e}")))
}

/// `endpoint` with a trailing slash so that `join` appends rather than
/// replacing the last path segment.
pub(crate) fn base_url(endpoint: &Url) -> Url {
    let mut base = endpoint.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// Resolve `path` under `endpoint` and attach `api-version`.
pub(crate) fn api_url(endpoint: &Url, path: &str, api_version: &str) -> Result<Url> {
    let mut url = base_url(endpoint)
        .join(path)
        .map_err(|e| ArchDocError::config(format!("invalid endpoint path '{path}': {e}")))?;
    url.query_pairs_mut().append_pair("api-version", api_version);
    Ok(url)
}

/// POST a JSON body with the `api-key` header and decode a JSON response.
pub(crate) async fn post_json<B, R>(client: &Client, url: Url, api_key: &str, body: &B) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = client
        .post(url.clone())
        .header("api-key", api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| ArchDocError::Network(format!("{}: {e}", url.path())))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ArchDocError::Network(format!("{}: failed to read body: {e}", url.path())))?;

    if !status.is_success() {
        return Err(ArchDocError::Network(format!(
            "{}: HTTP {status}: {}",
            url.path(),
            truncate(&text, MAX_ERROR_BODY)
        )));
    }

    debug!(path = %url.path(), bytes = text.len(), "collaborator response");
    serde_json::from_str(&text)
        .map_err(|e| ArchDocError::parse(format!("{}: malformed response: {e}", url.path())))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
