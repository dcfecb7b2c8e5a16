use anyhow::{Context, Result};
use axum::http::{HeaderValue, StatusCode};
use bytes::Bytes;
use reqwest::{header, Client, RequestBuilder};
use std::time::Duration;
use url::Url;

use crate::auth::TokenPair;
use crate::error::{ApiError, ErrorPayload};
use crate::models::auth::{LoginRequest, RefreshTokenRequest, SignupRequest};
use crate::models::{validate, Envelope};

/// Successful upstream answer, kept as raw bytes so it can be relayed verbatim
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Append percent-encoded path segments to a base URL
///
/// `None` when the base cannot carry a path (e.g. `mailto:`) or when a
/// segment is empty, `.` or `..`, which the URL parser would collapse.
pub fn endpoint_url(base: &Url, segments: &[&str]) -> Option<Url> {
    if segments.iter().any(|s| is_dot_or_empty(s)) {
        return None;
    }
    let mut url = base.clone();
    url.path_segments_mut().ok()?.pop_if_empty().extend(segments);
    Some(url)
}

// The URL parser drops tabs and newlines before looking at the segment
fn is_dot_or_empty(segment: &str) -> bool {
    let visible: String = segment
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect();
    matches!(visible.as_str(), "" | "." | "..")
}

/// HTTP client for the resume API
///
/// Every call is a single attempt: failures surface immediately.
pub struct UpstreamClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Upstream base URL (always ends with `/`)
    base_url: Url,
}

impl UpstreamClient {
    /// Create a new upstream client
    pub fn new(
        base_url: Url,
        max_connections: usize,
        connect_timeout: u64,
        request_timeout: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(max_connections)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an upstream URL from path segments
    ///
    /// Segments are percent-encoded individually; dot and empty segments
    /// are refused so a shareable link cannot escape its path position.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        endpoint_url(&self.base_url, segments).ok_or_else(|| {
            ApiError::Config(format!("Cannot build upstream URL from {:?}", segments))
        })
    }

    /// Execute one request and classify the outcome
    pub async fn send(&self, request: RequestBuilder) -> Result<UpstreamResponse, ApiError> {
        let request = request
            .build()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("Invalid upstream request: {}", e)))?;

        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(method = %method, url = %url, "Sending upstream request");

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                // Categorize the error for better debugging
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else if e.is_request() {
                    "request_error"
                } else if e.is_body() {
                    "body_error"
                } else {
                    "unknown"
                };

                tracing::warn!(
                    error_kind = error_kind,
                    error = %e,
                    url = %url,
                    "Upstream request error"
                );

                return Err(ApiError::Internal(anyhow::anyhow!(
                    "Upstream request failed: {} (kind: {})",
                    e,
                    error_kind
                )));
            }
        };

        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(|e| {
            ApiError::Internal(anyhow::anyhow!("Failed to read upstream body: {}", e))
        })?;

        tracing::debug!(status = %status, bytes = body.len(), "Received upstream response");

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            tracing::warn!(
                status = status.as_u16(),
                url = %url,
                response_body = %text,
                "Upstream returned error response"
            );
            return Err(ApiError::Upstream {
                status: status.as_u16(),
                payload: ErrorPayload::from_upstream(status.as_u16(), &text),
            });
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }

    /// GET /users/profile
    pub async fn get_profile(&self, access_token: &str) -> Result<UpstreamResponse, ApiError> {
        let url = self.endpoint(&["users", "profile"])?;
        self.send(self.client.get(url).bearer_auth(access_token)).await
    }

    /// GET /resumes/shared/{link}
    pub async fn get_shared_resume(
        &self,
        shareable_link: &str,
        access_token: Option<&str>,
    ) -> Result<UpstreamResponse, ApiError> {
        if is_dot_or_empty(shareable_link) {
            tracing::debug!("Rejected shareable link {:?}", shareable_link);
            return Err(ApiError::Upstream {
                status: StatusCode::NOT_FOUND.as_u16(),
                payload: ErrorPayload::new("Shared resume not found"),
            });
        }
        let url = self.endpoint(&["resumes", "shared", shareable_link])?;
        let mut request = self.client.get(url);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        self.send(request).await
    }

    /// POST /users/login
    pub async fn login(&self, body: &LoginRequest) -> Result<TokenPair, ApiError> {
        let url = self.endpoint(&["users", "login"])?;
        let response = self.send(self.client.post(url).json(body)).await?;
        Ok(validate::<Envelope<TokenPair>>(&response.body)?.result)
    }

    /// POST /users/register
    pub async fn register(&self, body: &SignupRequest) -> Result<TokenPair, ApiError> {
        let url = self.endpoint(&["users", "register"])?;
        let response = self.send(self.client.post(url).json(body)).await?;
        Ok(validate::<Envelope<TokenPair>>(&response.body)?.result)
    }

    /// POST /users/refresh-token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let url = self.endpoint(&["users", "refresh-token"])?;
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        Ok(validate::<Envelope<TokenPair>>(&response.body)?.result)
    }

    /// POST /users/logout
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["users", "logout"])?;
        let mut request = self.client.post(url).json(&RefreshTokenRequest {
            refresh_token: refresh_token.unwrap_or_default().to_string(),
        });
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        self.send(request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_base_url;
    use mockito::Matcher;
    use proptest::prelude::*;

    fn client(base: &str) -> UpstreamClient {
        UpstreamClient::new(parse_base_url(base).unwrap(), 4, 5, 5).unwrap()
    }

    #[test]
    fn test_endpoint_join() {
        let c = client("http://api.local/v1");
        assert_eq!(
            c.endpoint(&["users", "profile"]).unwrap().as_str(),
            "http://api.local/v1/users/profile"
        );

        let c = client("http://api.local");
        assert_eq!(
            c.endpoint(&["users", "login"]).unwrap().as_str(),
            "http://api.local/users/login"
        );
    }

    #[test]
    fn test_endpoint_encodes_link() {
        let c = client("http://api.local");
        let url = c.endpoint(&["resumes", "shared", "a/b?c#d"]).unwrap();
        assert_eq!(url.path(), "/resumes/shared/a%2Fb%3Fc%23d");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_endpoint_refuses_dot_segments() {
        let c = client("http://api.local/v1");
        for link in ["", ".", "..", "\t..", ".\n."] {
            assert!(matches!(
                c.endpoint(&["resumes", "shared", link]),
                Err(ApiError::Config(_))
            ));
        }
        // Dots inside a segment are ordinary characters
        assert!(c.endpoint(&["resumes", "shared", "..."]).is_ok());
        assert!(c.endpoint(&["resumes", "shared", "a..b"]).is_ok());
    }

    #[tokio::test]
    async fn test_dot_link_is_not_found_without_upstream_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let c = client(&server.url());
        let err = c.get_shared_resume("..", Some("tok")).await.unwrap_err();
        match err {
            ApiError::Upstream { status, .. } => assert_eq!(status, 404),
            other => panic!("unexpected error: {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_classifies_error_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/users/profile")
            .with_status(403)
            .with_body(r#"{"message":"Forbidden by upstream"}"#)
            .expect(1)
            .create_async()
            .await;

        let c = client(&server.url());
        let err = c.get_profile("tok").await.unwrap_err();
        match err {
            ApiError::Upstream { status, payload } => {
                assert_eq!(status, 403);
                assert_eq!(payload.message, "Forbidden by upstream");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_parses_token_pair() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/users/login")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"email": "ada@example.com"}),
            ))
            .with_status(200)
            .with_body(r#"{"message":"Login success","result":{"access_token":"a","refresh_token":"r"}}"#)
            .create_async()
            .await;

        let c = client(&server.url());
        let pair = c
            .login(&LoginRequest {
                email: "ada@example.com".to_string(),
                password: "pw".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(pair.access_token, "a");
        assert_eq!(pair.refresh_token, "r");
    }

    #[tokio::test]
    async fn test_refresh_rejects_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/users/refresh-token")
            .with_status(200)
            .with_body(r#"{"message":"ok","result":{"token":"x"}}"#)
            .create_async()
            .await;

        let c = client(&server.url());
        let err = c.refresh("r").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_internal() {
        // Nothing listens on port 9 locally
        let c = client("http://127.0.0.1:9");
        let err = c.get_profile("tok").await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    proptest! {
        #[test]
        fn prop_shared_link_stays_one_segment(
            link in "\\.{1,3}|[A-Za-z0-9_~. %?#&=+/é-]{1,40}"
        ) {
            let c = client("http://api.local/v1");
            let result = c.endpoint(&["resumes", "shared", &link]);
            if link == "." || link == ".." {
                prop_assert!(result.is_err());
                return Ok(());
            }
            let url = result.unwrap();
            let segments: Vec<_> = url.path_segments().unwrap().collect();
            prop_assert_eq!(segments.len(), 4);
            let decoded = urlencoding::decode(segments[3]).unwrap();
            prop_assert_eq!(decoded.as_ref(), link.as_str());
        }
    }
}
