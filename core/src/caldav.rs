// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! [`Transport`] backed by the `CalDAV` client.

use async_trait::async_trait;
use calsync_caldav::{CalDavClient, CalDavConfig, CalDavError, ETag, Href};

use crate::remote::{CreatedResource, RemoteError, Transport};

#[derive(Debug, Clone)]
pub struct CalDavTransport {
    client: CalDavClient,
}

impl CalDavTransport {
    pub fn new(client: CalDavClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: CalDavConfig) -> Result<Self, RemoteError> {
        Ok(Self::new(CalDavClient::new(config).map_err(remote_error)?))
    }

    /// Servers may omit the `ETag` on write; ask for it so the next
    /// conditional request has a version to match.
    async fn etag_after_write(&self, href: &Href, etag: Option<ETag>) -> Result<String, RemoteError> {
        match etag {
            Some(etag) => Ok(etag.into_string()),
            None => {
                tracing::debug!("server sent no etag, fetching it");
                let etag = self.client.fetch_etag(href).await.map_err(remote_error)?;
                Ok(etag.into_string())
            }
        }
    }
}

#[async_trait]
impl Transport for CalDavTransport {
    async fn create_event(
        &self,
        calendar_url: &str,
        uid: &str,
        payload: String,
    ) -> Result<CreatedResource, RemoteError> {
        let created = self
            .client
            .create_resource(calendar_url, uid, payload)
            .await
            .map_err(remote_error)?;
        let etag = self.etag_after_write(&created.href, created.etag).await?;
        Ok(CreatedResource {
            location: created.href.as_str().to_string(),
            etag,
        })
    }

    async fn update_event(
        &self,
        url: &str,
        payload: String,
        etag: &str,
    ) -> Result<String, RemoteError> {
        let href = Href::from(url);
        let etag = self
            .client
            .update_resource(&href, &ETag::from(etag), payload)
            .await
            .map_err(remote_error)?;
        self.etag_after_write(&href, etag).await
    }

    async fn delete_event(&self, url: &str, etag: Option<&str>) -> Result<(), RemoteError> {
        let etag = etag.map(ETag::from);
        self.client
            .delete_resource(&Href::from(url), etag.as_ref())
            .await
            .map_err(remote_error)
    }
}

fn remote_error(err: CalDavError) -> RemoteError {
    match err {
        CalDavError::PreconditionFailed(_) => RemoteError::Conflict,
        CalDavError::NotFound(_) => RemoteError::NotFound,
        err => RemoteError::Failed {
            code: err.status_code().unwrap_or(0),
            retryable: err.is_retryable(),
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn transport(server: &MockServer) -> CalDavTransport {
        CalDavTransport::from_config(CalDavConfig {
            base_url: server.uri(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn caldav_errors_map_onto_remote_errors() {
        assert_eq!(
            remote_error(CalDavError::PreconditionFailed(Href::from("/a.ics"))),
            RemoteError::Conflict
        );
        assert_eq!(
            remote_error(CalDavError::NotFound(Href::from("/a.ics"))),
            RemoteError::NotFound
        );

        let err = remote_error(CalDavError::Status {
            code: 503,
            message: "busy".to_string(),
        });
        assert!(err.is_retryable());
        assert_eq!(err.error_type(), "http_503");

        let err = remote_error(CalDavError::Network("connection refused".to_string()));
        assert!(err.is_retryable());
        assert_eq!(err.error_type(), "network");

        let err = remote_error(CalDavError::Status {
            code: 403,
            message: "forbidden".to_string(),
        });
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn create_fetches_missing_etag() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/cal/work/abc.ics"))
            .and(header("If-None-Match", "*"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/cal/work/abc.ics"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"v1\""))
            .expect(1)
            .mount(&server)
            .await;

        // Act
        let created = transport(&server)
            .await
            .create_event("/cal/work/", "abc", "BEGIN:VCALENDAR".to_string())
            .await
            .unwrap();

        // Assert
        assert_eq!(created.location, "/cal/work/abc.ics");
        assert_eq!(created.etag, "\"v1\"");
    }

    #[tokio::test]
    async fn delete_not_found_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/cal/work/gone.ics"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = transport(&server)
            .await
            .delete_event("/cal/work/gone.ics", Some("\"v1\""))
            .await
            .unwrap_err();

        assert_eq!(err, RemoteError::NotFound);
    }
}
