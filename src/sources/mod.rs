//! Source clients and shared HTTP utilities for upstream biomedical APIs.

use std::borrow::Cow;
use std::sync::Arc;

use http_cache_reqwest::{
    CACacheManager, Cache, CacheMode, CacheOptions, HttpCache, HttpCacheOptions,
};
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use tracing::warn;

use crate::config::Settings;
use crate::error::ScoutError;

pub mod chembl;
pub mod clinicaltrials;
pub mod llm;
pub mod openfda;
pub mod opentargets;
pub mod pubmed;
pub(crate) mod rate_limit;

const ERROR_BODY_MAX_BYTES: usize = 2048;
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
const MIN_RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);
const MAX_RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

pub(crate) fn env_base(default: &'static str, env_var: &str) -> Cow<'static, str> {
    std::env::var(env_var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(Cow::Owned)
        .unwrap_or_else(|| Cow::Borrowed(default))
}

pub(crate) fn join_endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Builds the HTTP client shared by every source client.
///
/// - Retry: `settings.max_retries` attempts, exponential backoff bounded to [1s, 30s],
///   on timeouts, connection errors, 429 and 5xx
/// - Cache: optional disk-based HTTP cache under the settings cache directory
/// - Rate limit: per-upstream minimum request interval
pub fn build_client(settings: &Settings) -> Result<ClientWithMiddleware, ScoutError> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-stale=86400"));

    let base_client = reqwest::Client::builder()
        .timeout(settings.timeout)
        .connect_timeout(std::time::Duration::from_secs(10))
        .user_agent(concat!("indication-scout/", env!("CARGO_PKG_VERSION")))
        .default_headers(default_headers)
        .build()
        .map_err(ScoutError::HttpClientInit)?;

    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(MIN_RETRY_INTERVAL, MAX_RETRY_INTERVAL)
        .build_with_max_retries(settings.max_retries);

    let limiter = Arc::new(rate_limit::RateLimiter::from_settings(settings));
    let mut builder = ClientBuilder::new(base_client);

    if settings.http_cache {
        let cache_path = settings.cache_dir.join("http-cacache");
        std::fs::create_dir_all(&cache_path)?;
        let cache_options = HttpCacheOptions {
            cache_options: Some(CacheOptions {
                // Shared-cache semantics: do not store private/authenticated responses.
                shared: true,
                ..CacheOptions::default()
            }),
            ..HttpCacheOptions::default()
        };
        builder = builder.with(Cache(HttpCache {
            mode: CacheMode::Default,
            manager: CACacheManager { path: cache_path },
            options: cache_options,
        }));
    }

    Ok(builder
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(rate_limit::RateLimitMiddleware::new(limiter))
        .build())
}

/// Maps a failed send (after the retry middleware gave up) to a data-source error.
pub(crate) fn transport_error(api: &str, err: reqwest_middleware::Error) -> ScoutError {
    let (message, status) = match &err {
        reqwest_middleware::Error::Reqwest(inner) if inner.is_timeout() => {
            (format!("Timeout: {inner}"), None)
        }
        reqwest_middleware::Error::Reqwest(inner) if inner.is_connect() => {
            (format!("Connection error: {inner}"), None)
        }
        reqwest_middleware::Error::Reqwest(inner) => {
            (inner.to_string(), inner.status().map(|s| s.as_u16()))
        }
        other => (other.to_string(), None),
    };
    ScoutError::Api {
        api: api.to_string(),
        message,
        status,
    }
}

pub(crate) fn status_error(api: &str, status: reqwest::StatusCode, body: &[u8]) -> ScoutError {
    ScoutError::Api {
        api: api.to_string(),
        message: format!("HTTP {status}: {}", body_excerpt(body)),
        status: Some(status.as_u16()),
    }
}

pub(crate) fn body_excerpt(bytes: &[u8]) -> String {
    let full = String::from_utf8_lossy(bytes);

    let truncated: &str = if full.len() > ERROR_BODY_MAX_BYTES {
        let mut end = ERROR_BODY_MAX_BYTES;
        while end > 0 && !full.is_char_boundary(end) {
            end -= 1;
        }
        &full[..end]
    } else {
        full.as_ref()
    };

    let mut s = truncated.trim().replace(['\n', '\r', '\t'], " ");
    if full.len() > ERROR_BODY_MAX_BYTES {
        s.push_str(" …");
    }
    s
}

pub(crate) fn ensure_json_content_type(
    api: &str,
    content_type: Option<&HeaderValue>,
    body: &[u8],
) -> Result<(), ScoutError> {
    let Some(content_type) = content_type else {
        return Ok(());
    };

    let raw = match content_type.to_str() {
        Ok(v) => v.trim(),
        Err(_) => {
            warn!(
                source = api,
                "Response content-type header was not valid UTF-8; attempting JSON parse"
            );
            return Ok(());
        }
    };
    if raw.is_empty() {
        return Ok(());
    }

    let media_type = raw
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(media_type.as_str(), "text/html" | "application/xhtml+xml") {
        return Err(ScoutError::api(
            api,
            format!(
                "Unexpected HTML response (content-type: {raw}): {}",
                body_excerpt(body)
            ),
        ));
    }

    let is_json = media_type == "application/json"
        || media_type == "text/json"
        || media_type.ends_with("+json");
    if !is_json {
        warn!(
            source = api,
            content_type = raw,
            "Unexpected non-JSON content type; attempting JSON parse for compatibility"
        );
    }

    Ok(())
}

pub(crate) async fn read_limited_body(
    mut resp: reqwest::Response,
    api: &str,
) -> Result<Vec<u8>, ScoutError> {
    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = resp.chunk().await? {
        let next_len = body.len().saturating_add(chunk.len());
        if next_len > DEFAULT_MAX_BODY_BYTES {
            return Err(ScoutError::api(
                api,
                format!("Response body exceeded {DEFAULT_MAX_BODY_BYTES} bytes"),
            ));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

/// Sends `req` and returns the size-capped body of a successful response.
pub(crate) async fn send_bytes(
    api: &str,
    req: reqwest_middleware::RequestBuilder,
) -> Result<(Vec<u8>, Option<HeaderValue>), ScoutError> {
    let resp = req.send().await.map_err(|err| transport_error(api, err))?;
    let status = resp.status();
    let content_type = resp.headers().get(reqwest::header::CONTENT_TYPE).cloned();
    let bytes = read_limited_body(resp, api).await?;
    if !status.is_success() {
        return Err(status_error(api, status, &bytes));
    }
    Ok((bytes, content_type))
}

/// Sends `req` and decodes a JSON body, mapping every failure to a data-source error for `api`.
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    api: &str,
    req: reqwest_middleware::RequestBuilder,
) -> Result<T, ScoutError> {
    let (bytes, content_type) = send_bytes(api, req).await?;
    ensure_json_content_type(api, content_type.as_ref(), &bytes)?;
    serde_json::from_slice(&bytes).map_err(|source| ScoutError::ApiJson {
        api: api.to_string(),
        source,
    })
}

/// Plain middleware client for tests: no retry, no cache, no rate limit.
#[cfg(test)]
pub(crate) fn test_client() -> ClientWithMiddleware {
    ClientBuilder::new(reqwest::Client::new()).build()
}
