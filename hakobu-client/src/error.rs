use hakobu_types::{MultipartCompleteRequest, ResubmitDocumentsRequest};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UploadError>;

/// What to resend to recover a failed registration. The bytes are already
/// in storage; each variant names the completion endpoint to re-call and
/// carries everything that call needs.
#[derive(Clone, Debug)]
pub enum CompletionRetry {
    /// Single-asset complete; the storage key on the error is enough.
    Single,
    /// Multipart complete with the same upload id and ordered part list.
    Multipart(MultipartCompleteRequest),
    /// Document-set resubmission.
    Documents(ResubmitDocumentsRequest),
}

/// Which step of the presign → PUT → complete sequence an error belongs to.
/// Drives the orchestrator's terminal `Failed` state and the caller's
/// recovery choice (re-run from scratch vs. retry completion only).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Presign,
    Upload,
    Complete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Presign => "presign",
            Stage::Upload => "upload",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    /// Rejected before any network call.
    #[error("invalid upload: {0}")]
    Validation(String),

    #[error("presign failed: {0}")]
    Presign(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The presigned URL outlived its validity window. Request a fresh
    /// target; the stale URL must not be retried.
    #[error("upload target expired ({expires_in}s validity elapsed)")]
    TargetExpired { expires_in: u64 },

    /// Bytes are durably stored but the backend never registered them.
    /// Recover by re-calling the completion endpoint named by `retry`;
    /// do not re-upload.
    #[error("upload succeeded, registration failed for {storage_key}: {message}")]
    Completion {
        storage_key: String,
        message: String,
        retry: CompletionRetry,
    },

    /// The multipart part list is not a contiguous 1..=n sequence.
    #[error("multipart assembly error: {0}")]
    Assembly(String),

    #[error("upload cancelled")]
    Cancelled,
}

impl UploadError {
    pub fn stage(&self) -> Stage {
        match self {
            UploadError::Validation(_) | UploadError::Presign(_) => Stage::Presign,
            UploadError::Transfer(_)
            | UploadError::TargetExpired { .. }
            | UploadError::Cancelled => Stage::Upload,
            UploadError::Completion { .. } | UploadError::Assembly(_) => Stage::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_stages() {
        assert_eq!(
            UploadError::Presign("boom".into()).stage(),
            Stage::Presign
        );
        assert_eq!(
            UploadError::TargetExpired { expires_in: 60 }.stage(),
            Stage::Upload
        );
        assert_eq!(
            UploadError::Completion {
                storage_key: "k".into(),
                message: "503".into(),
                retry: CompletionRetry::Single,
            }
            .stage(),
            Stage::Complete
        );
        assert_eq!(UploadError::Cancelled.stage(), Stage::Upload);
    }

    #[test]
    fn stage_display_is_lowercase() {
        assert_eq!(Stage::Upload.to_string(), "upload");
    }
}
