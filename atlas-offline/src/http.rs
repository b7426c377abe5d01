//! The HTTP-backed online file source.
//!
//! Issues one GET per request on the tokio runtime, honoring the
//! resource's revalidation hints so origins can answer with a short 304.
//! Transient failures (connection problems and 5xx answers) are retried
//! with exponential backoff before being surfaced; they are never cached
//! by the store.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::OfflineError;
use crate::resource::Resource;
use crate::response::{ErrorReason, Response};
use crate::source::{deliver, new_slot, FileSource, RequestHandle, ResponseCallback};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Online file source speaking HTTP through reqwest.
///
/// Must be created on a tokio runtime; requests are spawned onto it.
pub struct HttpFileSource {
    client: Client,
    runtime: Handle,
    access_token: Arc<RwLock<String>>,
    retry: RetryConfig,
}

impl HttpFileSource {
    pub fn new(access_token: Arc<RwLock<String>>) -> Result<Self, OfflineError> {
        Self::with_retry(access_token, RetryConfig::default())
    }

    pub fn with_retry(
        access_token: Arc<RwLock<String>>,
        retry: RetryConfig,
    ) -> Result<Self, OfflineError> {
        let client = Client::builder()
            .build()
            .map_err(|err| OfflineError::fetch(format!("Failed to create HTTP client: {}", err)))?;
        Ok(Self {
            client,
            runtime: Handle::current(),
            access_token,
            retry,
        })
    }
}

impl FileSource for HttpFileSource {
    fn request(&self, resource: Resource, callback: ResponseCallback) -> RequestHandle {
        let slot = new_slot(callback);
        let delivery = Arc::clone(&slot);
        let client = self.client.clone();
        let token = self.access_token.read().unwrap().clone();
        let retry = self.retry.clone();
        let task = self.runtime.spawn(async move {
            let response = fetch_with_retry(&client, &resource, &token, &retry).await;
            deliver(&delivery, response);
        });
        RequestHandle::new(slot, Some(task.abort_handle()))
    }
}

struct TransientError {
    reason: ErrorReason,
    message: String,
}

async fn fetch_with_retry(
    client: &Client,
    resource: &Resource,
    token: &str,
    retry: &RetryConfig,
) -> Response {
    let mut last_error = None;
    for attempt in 0..retry.max_retries {
        match fetch_once(client, resource, token).await {
            Ok(response) => return response,
            Err(error) => {
                if attempt + 1 < retry.max_retries {
                    let delay_secs = 2u64.pow(attempt) * retry.base_delay.as_secs();
                    let delay = Duration::from_secs(delay_secs.min(retry.max_delay.as_secs()));
                    debug!(
                        "Retry attempt {}/{} for {} after {:?}: {}",
                        attempt + 1,
                        retry.max_retries,
                        resource.url,
                        delay,
                        error.message
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(error);
            }
        }
    }

    let error = last_error.expect("at least one attempt");
    warn!(
        "Request for {} failed after {} attempts: {}",
        resource.url, retry.max_retries, error.message
    );
    Response::from_error(error.reason, error.message)
}

async fn fetch_once(
    client: &Client,
    resource: &Resource,
    token: &str,
) -> Result<Response, TransientError> {
    let mut request = client.get(request_url(&resource.url, token));
    if let Some(etag) = &resource.prior_etag {
        request = request.header(header::IF_NONE_MATCH, etag);
    }
    if let Some(modified) = &resource.prior_modified {
        request = request.header(header::IF_MODIFIED_SINCE, http_date(modified));
    }

    let response = request.send().await.map_err(|err| TransientError {
        reason: ErrorReason::Connection,
        message: err.to_string(),
    })?;

    let status = response.status();
    let etag = header_string(&response, header::ETAG);
    let modified = header_date(&response, header::LAST_MODIFIED);
    let expires = parse_expiration(&response);

    if status == StatusCode::NOT_MODIFIED {
        // Freshness refresh; the store keeps the existing body.
        return Ok(Response {
            data: None,
            modified: modified.or(resource.prior_modified),
            expires: expires.or(resource.prior_expires),
            etag: etag.or_else(|| resource.prior_etag.clone()),
            error: None,
        });
    }

    if status == StatusCode::NOT_FOUND {
        return Ok(Response::not_found());
    }

    if status.is_server_error() {
        return Err(TransientError {
            reason: ErrorReason::Server,
            message: format!("HTTP status {} for {}", status, resource.url),
        });
    }

    if !status.is_success() {
        return Ok(Response::from_error(
            ErrorReason::Other,
            format!("HTTP status {} for {}", status, resource.url),
        ));
    }

    let data = response.bytes().await.map_err(|err| TransientError {
        reason: ErrorReason::Connection,
        message: err.to_string(),
    })?;

    Ok(Response {
        data: Some(data),
        modified,
        expires,
        etag,
        error: None,
    })
}

fn request_url(url: &str, token: &str) -> String {
    if token.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}access_token={}", url, separator, token)
}

fn http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn header_string(response: &reqwest::Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn header_date(response: &reqwest::Response, name: header::HeaderName) -> Option<DateTime<Utc>> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        .map(|date| date.with_timezone(&Utc))
}

/// Expiration from `Cache-Control: max-age`, falling back to `Expires`.
fn parse_expiration(response: &reqwest::Response) -> Option<DateTime<Utc>> {
    if let Some(cache_control) = header_string(response, header::CACHE_CONTROL) {
        for directive in cache_control.split(',') {
            if let Some(seconds) = directive.trim().strip_prefix("max-age=") {
                if let Ok(seconds) = seconds.parse::<i64>() {
                    return Some(Utc::now() + chrono::Duration::seconds(seconds));
                }
            }
        }
    }
    header_date(response, header::EXPIRES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_request_url_appends_token() {
        assert_eq!(request_url("http://h/a", ""), "http://h/a");
        assert_eq!(request_url("http://h/a", "tok"), "http://h/a?access_token=tok");
        assert_eq!(
            request_url("http://h/a?x=1", "tok"),
            "http://h/a?x=1&access_token=tok"
        );
    }

    #[test]
    fn test_http_date_format() {
        let date = Utc.timestamp_opt(784111777, 0).single().unwrap();
        assert_eq!(http_date(&date), "Sun, 06 Nov 1994 08:49:37 GMT");
    }
}
