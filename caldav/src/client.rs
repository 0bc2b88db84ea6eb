// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CalDAV` client for calendar object writes.

use std::sync::Arc;

use reqwest::Method;

use crate::config::CalDavConfig;
use crate::error::CalDavError;
use crate::http::HttpClient;
use crate::types::{ETag, Href};

const CONTENT_TYPE_ICS: &str = "text/calendar; charset=utf-8";

/// `CalDAV` client for creating, updating and deleting calendar objects.
///
/// # Example
///
/// ```ignore
/// use calsync_caldav::{AuthMethod, CalDavClient, CalDavConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CalDavConfig {
///     base_url: "https://caldav.example.com".to_string(),
///     auth: AuthMethod::Basic {
///         username: "user".to_string(),
///         password: "pass".to_string(),
///     },
///     ..Default::default()
/// };
///
/// let client = CalDavClient::new(config)?;
/// let created = client
///     .create_resource("/dav/calendars/user/work/", "uid-1", ics)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CalDavClient {
    http: Arc<HttpClient>,
    config: CalDavConfig,
}

/// Location and version of a newly created resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    /// Where the server stored the resource.
    pub href: Href,
    /// Version token, absent when the server did not return one.
    pub etag: Option<ETag>,
}

impl CalDavClient {
    /// Creates a new `CalDAV` client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: CalDavConfig) -> Result<Self, CalDavError> {
        let http = HttpClient::new(config.clone())?;
        Ok(Self {
            http: Arc::new(http),
            config,
        })
    }

    /// Stores a new calendar object `<uid>.ics` in a collection, failing with
    /// [`CalDavError::PreconditionFailed`] if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub async fn create_resource(
        &self,
        collection: &str,
        uid: &str,
        ics: String,
    ) -> Result<CreatedResource, CalDavError> {
        let href = Href::resource_in(collection, uid);
        let url = self.full_url(&href);

        let resp = self
            .http
            .execute(HttpClient::if_none_match_any(
                self.http
                    .build_request(Method::PUT, &url)
                    .header("Content-Type", CONTENT_TYPE_ICS)
                    .body(ics),
            ))
            .await?;

        let etag = HttpClient::extract_etag(&resp);
        let href = HttpClient::extract_location(&resp).unwrap_or(href);
        Ok(CreatedResource { href, etag })
    }

    /// Replaces a calendar object if its version still matches `etag`.
    ///
    /// # Errors
    ///
    /// Returns an error if update fails or `ETag` mismatch.
    pub async fn update_resource(
        &self,
        href: &Href,
        etag: &ETag,
        ics: String,
    ) -> Result<Option<ETag>, CalDavError> {
        let url = self.full_url(href);

        let resp = self
            .http
            .execute(HttpClient::if_match(
                self.http
                    .build_request(Method::PUT, &url)
                    .header("Content-Type", CONTENT_TYPE_ICS)
                    .body(ics),
                etag,
            ))
            .await?;

        Ok(HttpClient::extract_etag(&resp))
    }

    /// Deletes a calendar object, conditionally when `etag` is known.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub async fn delete_resource(
        &self,
        href: &Href,
        etag: Option<&ETag>,
    ) -> Result<(), CalDavError> {
        let url = self.full_url(href);

        let mut req = self.http.build_request(Method::DELETE, &url);
        if let Some(etag) = etag {
            req = HttpClient::if_match(req, etag);
        }
        self.http.execute(req).await?;
        Ok(())
    }

    /// Fetches the current version token of a resource with `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server sends no `ETag`.
    pub async fn fetch_etag(&self, href: &Href) -> Result<ETag, CalDavError> {
        let url = self.full_url(href);

        let resp = self
            .http
            .execute(self.http.build_request(Method::HEAD, &url))
            .await?;

        HttpClient::extract_etag(&resp)
            .ok_or_else(|| CalDavError::InvalidResponse("Missing ETag header".to_string()))
    }

    fn full_url(&self, href: &Href) -> String {
        self.config.resolve(href)
    }
}
