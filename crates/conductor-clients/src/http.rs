//! Shared HTTP plumbing for the REST clients.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::{ClientError, ClientResult};

const USER_AGENT: &str = concat!("conductor/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client(timeout: Duration) -> ClientResult<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Parse a base URL, rejecting anything but http(s).
pub(crate) fn parse_base(base_url: &str) -> ClientResult<Url> {
    let url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientError::InvalidUrl(format!(
            "unsupported scheme {other} in {base_url}"
        ))),
    }
}

/// Append path segments to a base URL. Each segment is percent-encoded, so a
/// project path like `group/app` stays a single segment.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> ClientResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidUrl(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turn a non-2xx response into [`ClientError::Api`].
pub(crate) async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error response".to_string());
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

pub(crate) async fn json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let response = check(response).await?;
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}
