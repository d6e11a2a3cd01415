// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};

use crate::error::{AppError, Result};
use crate::models::GithubConfig;

/// Fallback wait when the service throttles without saying until when.
const DEFAULT_THROTTLE_SECS: i64 = 60;

/// Create a configured asynchronous HTTP client for the GitHub API.
pub fn create_async_client(config: &GithubConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(
        "x-github-api-version",
        HeaderValue::from_static("2022-11-28"),
    );
    if let Some(token) = config.token() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| AppError::config(format!("Invalid API token: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    } else {
        log::warn!(
            "{} is not set, using unauthenticated requests",
            config.token_env
        );
    }

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Turn a non-success response into the matching error.
///
/// Exhausted quotas become [`AppError::Throttled`] so the caller can wait
/// for the reported reset, missing resources become [`AppError::NotFound`].
pub async fn check_response(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(AppError::not_found(what));
    }

    if let Some(reset_at) = throttle_deadline(status, response.headers(), Utc::now()) {
        return Err(AppError::Throttled { reset_at });
    }

    let message = response.text().await.unwrap_or_default();
    Err(AppError::Api {
        status: status.as_u16(),
        message: format!("{what}: {}", message.trim()),
    })
}

/// Deadline reported by a throttling response, if it is one.
pub fn throttle_deadline(
    status: StatusCode,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
    };

    if header("x-ratelimit-remaining") == Some(0) {
        if let Some(reset) = header("x-ratelimit-reset") {
            if let Some(reset_at) = Utc.timestamp_opt(reset, 0).single() {
                return Some(reset_at);
            }
        }
    }

    if let Some(seconds) = header("retry-after") {
        return Some(now + chrono::Duration::seconds(seconds.max(0)));
    }

    // A plain 403 is a permission problem, not throttling.
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(now + chrono::Duration::seconds(DEFAULT_THROTTLE_SECS));
    }
    None
}
