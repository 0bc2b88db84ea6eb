// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP client wrapper with authentication and `ETag` handling.

use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::config::{AuthMethod, CalDavConfig};
use crate::error::CalDavError;
use crate::types::{ETag, Href};

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for `CalDAV` operations.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    config: CalDavConfig,
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is unusable or HTTP client creation
    /// fails.
    pub fn new(config: CalDavConfig) -> Result<Self, CalDavError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .build()?;
        Ok(Self { client, config })
    }

    /// Builds a request with authentication headers.
    pub fn build_request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        let mut req = self.client.request(method, url);

        match &self.config.auth {
            AuthMethod::Basic { username, password } => {
                req = req.basic_auth(username, Some(password));
            }
            AuthMethod::Bearer { token } => {
                req = req.bearer_auth(token);
            }
            AuthMethod::None => {}
        }

        req
    }

    /// Executes a request and classifies non-success statuses.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or returns an error status code.
    pub async fn execute(&self, req: RequestBuilder) -> Result<Response, CalDavError> {
        let resp = req.send().await?;
        let status = resp.status();
        tracing::debug!(status = status.as_u16(), "caldav response");

        match status {
            StatusCode::OK
            | StatusCode::CREATED
            | StatusCode::NO_CONTENT
            | StatusCode::MULTI_STATUS => Ok(resp),
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(CalDavError::NotFound(Href::from(resp.url().path())))
            }
            StatusCode::PRECONDITION_FAILED => Err(CalDavError::PreconditionFailed(Href::from(
                resp.url().path(),
            ))),
            status => {
                let mut message = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read response".to_string());
                if message.len() > MAX_ERROR_BODY {
                    let mut end = MAX_ERROR_BODY;
                    while !message.is_char_boundary(end) {
                        end -= 1;
                    }
                    message.truncate(end);
                }
                Err(CalDavError::Status {
                    code: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Adds If-Match header for conditional updates.
    pub fn if_match(req: RequestBuilder, etag: &ETag) -> RequestBuilder {
        req.header("If-Match", etag.as_str())
    }

    /// Adds `If-None-Match: *` so creation fails if the resource exists.
    pub fn if_none_match_any(req: RequestBuilder) -> RequestBuilder {
        req.header("If-None-Match", "*")
    }

    /// Extracts `ETag` from response headers, if the server sent one.
    pub fn extract_etag(resp: &Response) -> Option<ETag> {
        resp.headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(|s| ETag::new(s.to_string()))
    }

    /// Extracts the `Location` header, if any.
    pub fn extract_location(resp: &Response) -> Option<Href> {
        resp.headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .map(Href::from)
    }
}
