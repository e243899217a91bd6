//! Bearer-authenticated client for the resource API.
//!
//! Every request to the resource API goes through [`ApiClient::request`] so
//! the `Authorization: Bearer <token>` header and the default JSON content
//! type are applied in one place.

use std::sync::Arc;

use matricula_core::{Credential, Permission, PermissionId, Role, RoleId};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::ApiError;
use crate::config::ApiConfig;

/// Default retry delay when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Client for the auth service and the resource API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    auth_base: String,
    api_base: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("auth_base", &self.inner.auth_base)
            .field("api_base", &self.inner.api_base)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for the configured services.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                http,
                auth_base: config.auth_base_url.as_str().trim_end_matches('/').to_owned(),
                api_base: config.api_base_url.as_str().trim_end_matches('/').to_owned(),
            }),
        })
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Absolute URL of an auth-service path such as `/login`.
    #[must_use]
    pub fn auth_url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.auth_base)
    }

    /// Absolute URL of a resource-API path such as `/auth/roles`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.api_base)
    }

    /// Start an authorized request to the resource API.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidCredential` if the token cannot be used as a
    /// header value.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        credential: &Credential,
    ) -> Result<RequestBuilder, ApiError> {
        self.request_with_headers(method, path, credential, &HeaderMap::new())
    }

    /// Like [`request`](Self::request), with caller-supplied headers.
    ///
    /// `overrides` may replace the default `Content-Type`; the bearer token
    /// is always the one from `credential`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidCredential` if the token cannot be used as a
    /// header value.
    pub fn request_with_headers(
        &self,
        method: Method,
        path: &str,
        credential: &Credential,
        overrides: &HeaderMap,
    ) -> Result<RequestBuilder, ApiError> {
        let headers = authorized_headers(credential, overrides)?;
        Ok(self
            .inner
            .http
            .request(method, self.api_url(path))
            .headers(headers))
    }

    /// Send an authorized request and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` on 401, `ApiError::RateLimited` on
    /// 429, `ApiError::Status` on any other non-success status,
    /// `ApiError::InvalidResponse` if the body does not decode and
    /// `ApiError::Http` on transport failures.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        credential: &Credential,
    ) -> Result<T, ApiError> {
        let response = self.request(method, path, credential)?.send().await?;
        let response = check_status(response).await?;
        decode_json(response).await
    }

    // =========================================================================
    // Roles & permissions
    // =========================================================================

    /// Fetch every role with its permission names.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    #[instrument(skip(self, credential))]
    pub async fn list_roles(&self, credential: &Credential) -> Result<Vec<Role>, ApiError> {
        self.send_json(Method::GET, "/auth/roles", credential).await
    }

    /// Fetch the permission catalog.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    #[instrument(skip(self, credential))]
    pub async fn list_permissions(
        &self,
        credential: &Credential,
    ) -> Result<Vec<Permission>, ApiError> {
        self.send_json(Method::GET, "/auth/permissions", credential)
            .await
    }

    /// Grant a permission to a role, returning the updated role.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    #[instrument(skip(self, credential))]
    pub async fn grant_permission(
        &self,
        credential: &Credential,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<Role, ApiError> {
        let path = role_permission_path(role_id, permission_id);
        self.send_json(Method::POST, &path, credential).await
    }

    /// Revoke a permission from a role, returning the updated role.
    ///
    /// # Errors
    ///
    /// See [`send_json`](Self::send_json).
    #[instrument(skip(self, credential))]
    pub async fn revoke_permission(
        &self,
        credential: &Credential,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> Result<Role, ApiError> {
        let path = role_permission_path(role_id, permission_id);
        self.send_json(Method::DELETE, &path, credential).await
    }
}

fn role_permission_path(role_id: RoleId, permission_id: PermissionId) -> String {
    format!("/auth/roles/{role_id}/permissions/{permission_id}")
}

/// Headers every resource-API request carries.
///
/// Starts from `Content-Type: application/json`, applies `overrides`, then
/// sets `Authorization: Bearer <token>` (marked sensitive).
///
/// # Errors
///
/// Returns `ApiError::InvalidCredential` if the token contains characters
/// that are not allowed in a header value.
pub fn authorized_headers(
    credential: &Credential,
    overrides: &HeaderMap,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.extend(overrides.clone());

    let mut bearer = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
        .map_err(|_| ApiError::InvalidCredential)?;
    bearer.set_sensitive(true);
    headers.insert(AUTHORIZATION, bearer);

    Ok(headers)
}

/// Decode a success body. Only a failure to read the body counts as a
/// transport error.
pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Turn a non-success response into the matching `ApiError`.
pub(crate) async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ApiError::RateLimited(retry_after));
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized(body));
    }

    Err(ApiError::Status { status, body })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_authorized_headers_defaults() {
        let headers = authorized_headers(&Credential::new("tok-123"), &HeaderMap::new()).unwrap();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok-123");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_authorized_headers_content_type_override() {
        let mut overrides = HeaderMap::new();
        overrides.insert(CONTENT_TYPE, HeaderValue::from_static("multipart/form-data"));

        let headers = authorized_headers(&Credential::new("tok"), &overrides).unwrap();

        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "multipart/form-data");
        assert_eq!(headers.get_all(CONTENT_TYPE).iter().count(), 1);
    }

    #[test]
    fn test_authorized_headers_bearer_cannot_be_overridden() {
        let mut overrides = HeaderMap::new();
        overrides.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));

        let headers = authorized_headers(&Credential::new("tok"), &overrides).unwrap();

        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
    }

    #[test]
    fn test_authorized_headers_rejects_bad_token() {
        let result = authorized_headers(&Credential::new("line\nbreak"), &HeaderMap::new());
        assert!(matches!(result, Err(ApiError::InvalidCredential)));
    }

    #[test]
    fn test_urls_join_without_double_slash() {
        let config = ApiConfig {
            auth_base_url: "http://localhost:8087/api/auth/".parse().unwrap(),
            api_base_url: "http://localhost:8086/api".parse().unwrap(),
            timeout: std::time::Duration::from_secs(5),
        };
        let client = ApiClient::new(&config).unwrap();

        assert_eq!(client.auth_url("/login"), "http://localhost:8087/api/auth/login");
        assert_eq!(client.api_url("/auth/roles"), "http://localhost:8086/api/auth/roles");
        assert_eq!(
            role_permission_path(RoleId::new(3), PermissionId::new(14)),
            "/auth/roles/3/permissions/14"
        );
    }
}
