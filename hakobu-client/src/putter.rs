//! Raw-byte PUT against object storage.
//!
//! Holds its own bare `reqwest::Client`: the storage endpoint is a
//! different trust domain from the backend API and must never see session
//! credentials. Exactly the presigned headers go out, nothing else.

use crate::api::PresignedTarget;
use crate::error::{Result, UploadError};
use crate::progress::ProgressCallback;
use bytes::Bytes;
use futures::StreamExt;
use hakobu_types::TransferProgress;
use reqwest::header::{CONTENT_LENGTH, ETAG};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How much of a storage error body to keep in the error message.
const ERROR_BODY_LIMIT: usize = 256;

/// Payloads are sliced so the transport yields progress at a useful
/// granularity.
const PROGRESS_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug)]
pub struct PutOutcome {
    /// Set when the storage provider returns an ETag; required for
    /// multipart assembly.
    pub etag: Option<String>,
}

pub struct StoragePutter {
    client: Client,
}

impl StoragePutter {
    pub fn new(transfer_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(transfer_timeout)
            .build()
            .map_err(|e| UploadError::Transfer(format!("failed to create storage client: {e}")))?;
        Ok(Self { client })
    }

    /// One PUT for one target. An expired target is rejected up front; a
    /// failed PUT invalidates the target either way, so the caller restarts
    /// from presign rather than retrying this URL.
    ///
    /// Progress counts bytes handed to the transport, not bytes the storage
    /// provider has acknowledged, so a transfer can report 100% and still
    /// fail. The returned `Result` is the success signal, never the
    /// percentage.
    pub async fn put(
        &self,
        presigned: &PresignedTarget,
        body: Bytes,
        progress: ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<PutOutcome> {
        if presigned.is_expired() {
            return Err(UploadError::TargetExpired {
                expires_in: presigned.target.expires_in,
            });
        }

        let total = body.len() as u64;
        (*progress)(TransferProgress {
            bytes_sent: 0,
            bytes_total: total,
        });

        let chunks: Vec<Bytes> = (0..body.len())
            .step_by(PROGRESS_CHUNK_SIZE)
            .map(|start| body.slice(start..usize::min(start + PROGRESS_CHUNK_SIZE, body.len())))
            .collect();

        let counting = {
            let progress = progress.clone();
            let sent = Arc::new(AtomicU64::new(0));
            futures::stream::iter(chunks).map(move |chunk: Bytes| {
                let sent_now =
                    sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
                (*progress)(TransferProgress {
                    bytes_sent: sent_now,
                    bytes_total: total,
                });
                Ok::<Bytes, std::io::Error>(chunk)
            })
        };

        let mut request = self
            .client
            .put(&presigned.target.upload_url)
            .header(CONTENT_LENGTH, total);
        for (name, value) in &presigned.target.required_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let request = request.body(reqwest::Body::wrap_stream(counting));

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = request.send() => result.map_err(|e| {
                if e.is_timeout() {
                    UploadError::Transfer(format!("transfer timed out: {e}"))
                } else {
                    UploadError::Transfer(format!("transfer failed: {e}"))
                }
            })?,
        };

        let status = response.status();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(UploadError::Transfer(format!(
                "storage returned status {status}: {body}"
            )));
        }

        tracing::debug!(
            "put {} bytes to {} ({})",
            total,
            presigned.target.storage_key,
            status
        );

        Ok(PutOutcome { etag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::noop_progress;
    use hakobu_types::UploadTarget;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn presigned(url: String, expires_in: u64, headers: HashMap<String, String>) -> PresignedTarget {
        PresignedTarget::new(UploadTarget {
            upload_url: url,
            required_headers: headers,
            expires_in,
            storage_key: "media/abc".to_string(),
        })
    }

    fn putter() -> StoragePutter {
        StoragePutter::new(Duration::from_secs(30)).unwrap()
    }

    #[tokio::test]
    async fn put_sends_required_headers_and_captures_etag() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/store/media/abc")
            .match_header("content-type", "image/png")
            .with_status(200)
            .with_header("etag", "\"etagA\"")
            .create_async()
            .await;

        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "image/png".to_string());
        let target = presigned(format!("{}/store/media/abc", server.url()), 900, headers);

        let outcome = putter()
            .put(
                &target,
                Bytes::from_static(b"pngbytes"),
                noop_progress(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(outcome.etag.as_deref(), Some("etagA"));
    }

    #[tokio::test]
    async fn non_2xx_is_a_transfer_error_with_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/store/media/abc")
            .with_status(403)
            .with_body("<Error><Code>AccessDenied</Code></Error>")
            .create_async()
            .await;

        let target = presigned(
            format!("{}/store/media/abc", server.url()),
            900,
            HashMap::new(),
        );

        let err = putter()
            .put(
                &target,
                Bytes::from_static(b"data"),
                noop_progress(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            UploadError::Transfer(message) => {
                assert!(message.contains("403"));
                assert!(message.contains("AccessDenied"));
            }
            other => panic!("expected transfer error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_target_is_rejected_without_any_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/store/media/abc")
            .expect(0)
            .create_async()
            .await;

        let target = presigned(
            format!("{}/store/media/abc", server.url()),
            0,
            HashMap::new(),
        );

        let err = putter()
            .put(
                &target,
                Bytes::from_static(b"data"),
                noop_progress(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, UploadError::TargetExpired { .. }));
    }

    #[tokio::test]
    async fn progress_is_monotone_and_ends_at_100() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/store/media/abc")
            .with_status(200)
            .create_async()
            .await;

        let target = presigned(
            format!("{}/store/media/abc", server.url()),
            900,
            HashMap::new(),
        );

        let seen: Arc<Mutex<Vec<TransferProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let progress: ProgressCallback =
            Arc::new(move |p| seen2.lock().unwrap().push(p));

        // 200KB body so the payload spans several progress chunks
        let body = Bytes::from(vec![7u8; 200 * 1024]);
        putter()
            .put(&target, body, progress, &CancellationToken::new())
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert!(seen.len() >= 2);
        for pair in seen.windows(2) {
            assert!(pair[1].bytes_sent >= pair[0].bytes_sent);
        }
        let last = seen.last().unwrap();
        assert_eq!(last.percent(), 100);
        assert_eq!(last.bytes_sent, 200 * 1024);
    }

    #[tokio::test]
    async fn full_progress_does_not_imply_success() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/store/media/abc")
            .with_status(500)
            .create_async()
            .await;

        let target = presigned(
            format!("{}/store/media/abc", server.url()),
            900,
            HashMap::new(),
        );

        let seen: Arc<Mutex<Vec<TransferProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let progress: ProgressCallback =
            Arc::new(move |p| seen2.lock().unwrap().push(p));

        let err = putter()
            .put(
                &target,
                Bytes::from(vec![7u8; 200 * 1024]),
                progress,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        // all bytes went out before the status came back
        assert_eq!(seen.lock().unwrap().last().unwrap().percent(), 100);
        assert!(matches!(err, UploadError::Transfer(_)));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_the_put() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/store/media/abc")
            .with_status(200)
            .create_async()
            .await;

        let target = presigned(
            format!("{}/store/media/abc", server.url()),
            900,
            HashMap::new(),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = putter()
            .put(
                &target,
                Bytes::from_static(b"data"),
                noop_progress(),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Cancelled));
    }
}
