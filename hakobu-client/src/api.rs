//! Typed client for the backend's presign and completion endpoints.
//!
//! The storage PUT itself lives in [`crate::putter`]; this client only ever
//! talks JSON to the backend API, with bearer auth from an explicit
//! [`AuthSession`].

use crate::session::AuthSession;
use hakobu_types::{
    CompleteUploadRequest, CompleteUploadResponse, MultipartCompleteRequest,
    MultipartInitRequest, MultipartInitResponse, PresignBatchRequest, PresignBatchResponse,
    PresignPartRequest, PresignPartResponse, PresignUploadRequest, ResubmitDocumentsRequest,
    UploadTarget,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("server error: {status} - {message}")]
    Server { status: u16, message: String },
}

/// A presigned target stamped with its moment of issuance. Expiry is
/// checked against the client clock before any PUT; the backend enforces
/// the real deadline.
#[derive(Clone, Debug)]
pub struct PresignedTarget {
    pub target: UploadTarget,
    pub issued_at: Instant,
}

impl PresignedTarget {
    pub fn new(target: UploadTarget) -> Self {
        Self {
            target,
            issued_at: Instant::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.issued_at.elapsed() >= Duration::from_secs(self.target.expires_in)
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: AuthSession,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: AuthSession,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(format!("request to {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(format!("failed to parse response from {path}: {e}")))
    }

    /// Requests one short-lived upload destination for the declared intent.
    pub async fn presign_upload(
        &self,
        request: &PresignUploadRequest,
    ) -> Result<PresignedTarget, ApiError> {
        let target: UploadTarget = self.post_json("/api/uploads/presign", request).await?;
        Ok(PresignedTarget::new(target))
    }

    /// Presigns several assets in one call (multi-image posts, identity
    /// document sets). Targets come back in request order.
    pub async fn presign_batch(
        &self,
        request: &PresignBatchRequest,
    ) -> Result<Vec<PresignedTarget>, ApiError> {
        let response: PresignBatchResponse = self
            .post_json("/api/uploads/presign-batch", request)
            .await?;
        Ok(response
            .targets
            .into_iter()
            .map(PresignedTarget::new)
            .collect())
    }

    /// Registers a stored object so it transitions out of the "presigned"
    /// state server-side. Only call after the PUT succeeded.
    pub async fn complete_upload(
        &self,
        storage_key: &str,
    ) -> Result<CompleteUploadResponse, ApiError> {
        self.post_json(
            "/api/uploads/complete",
            &CompleteUploadRequest {
                storage_key: storage_key.to_string(),
            },
        )
        .await
    }

    /// Completion variant for identity-document sets.
    pub async fn resubmit_documents(
        &self,
        request: &ResubmitDocumentsRequest,
    ) -> Result<CompleteUploadResponse, ApiError> {
        self.post_json("/api/identity/resubmit", request).await
    }

    pub async fn multipart_init(
        &self,
        request: &MultipartInitRequest,
    ) -> Result<MultipartInitResponse, ApiError> {
        self.post_json("/api/uploads/multipart/init", request).await
    }

    pub async fn presign_part(
        &self,
        request: &PresignPartRequest,
    ) -> Result<PresignPartResponse, ApiError> {
        self.post_json("/api/uploads/multipart/presign-part", request)
            .await
    }

    /// Consumes the ordered part list. The orchestrator sorts and verifies
    /// the list before this is ever called.
    pub async fn multipart_complete(
        &self,
        request: &MultipartCompleteRequest,
    ) -> Result<CompleteUploadResponse, ApiError> {
        self.post_json("/api/uploads/multipart/complete", request)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthSession;
    use hakobu_types::AssetKind;
    use std::collections::HashMap;

    fn target(expires_in: u64) -> PresignedTarget {
        PresignedTarget::new(UploadTarget {
            upload_url: "http://storage.test/key".to_string(),
            required_headers: HashMap::new(),
            expires_in,
            storage_key: "key".to_string(),
        })
    }

    #[test]
    fn target_with_zero_validity_is_expired_immediately() {
        assert!(target(0).is_expired());
        assert!(!target(3600).is_expired());
    }

    #[tokio::test]
    async fn presign_sends_intent_and_stamps_issuance() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/uploads/presign")
            .match_header("authorization", "Bearer tok")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "content_type": "image/png",
                "file_extension": "png",
                "asset_kind": "avatar",
            })))
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "upload_url": "http://storage.test/abc",
                    "required_headers": {"content-type": "image/png"},
                    "expires_in": 900,
                    "storage_key": "abc",
                })
                .to_string(),
            )
            .create_async()
            .await;

        let api = ApiClient::new(
            server.url(),
            AuthSession::new("tok"),
            Duration::from_secs(5),
        )
        .unwrap();

        let presigned = api
            .presign_upload(&PresignUploadRequest {
                content_type: "image/png".to_string(),
                file_extension: "png".to_string(),
                asset_kind: AssetKind::Avatar,
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(presigned.target.storage_key, "abc");
        assert!(!presigned.is_expired());
    }

    #[tokio::test]
    async fn non_2xx_surfaces_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/uploads/complete")
            .with_status(422)
            .with_body("unknown storage key")
            .create_async()
            .await;

        let api = ApiClient::new(
            server.url(),
            AuthSession::anonymous(),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = api.complete_upload("missing").await.unwrap_err();
        match err {
            ApiError::Server { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "unknown storage key");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }
}
