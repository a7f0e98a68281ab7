use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Semantic category of uploaded content. The backend keys its allow-lists
/// and downstream processing (media conversion, review queues) off this.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Avatar,
    Cover,
    MainVideo,
    SampleVideo,
    Thumbnail,
    OgpImage,
    MessageAttachment,
    IdentityDocument,
}

impl AssetKind {
    pub fn is_video(&self) -> bool {
        matches!(self, AssetKind::MainVideo | AssetKind::SampleVideo)
    }
}

// Request types
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PresignUploadRequest {
    pub content_type: String,
    pub file_extension: String,
    pub asset_kind: AssetKind,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PresignBatchRequest {
    pub assets: Vec<PresignUploadRequest>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CompleteUploadRequest {
    pub storage_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DocumentPart {
    pub kind: String,
    pub ext: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResubmitDocumentsRequest {
    pub verification_id: Uuid,
    pub documents: Vec<DocumentPart>,
}

// Multipart upload types
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MultipartInitRequest {
    pub content_type: String,
    pub file_extension: String,
    pub asset_kind: AssetKind,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MultipartInitResponse {
    pub upload_id: String,
    pub s3_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PresignPartRequest {
    pub s3_key: String,
    pub upload_id: String,
    pub part_number: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PresignPartResponse {
    pub upload_url: String,
    #[serde(default = "default_part_expiry")]
    pub expires_in: u64,
}

fn default_part_expiry() -> u64 {
    3600
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: u32,
    pub etag: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MultipartCompleteRequest {
    pub s3_key: String,
    pub upload_id: String,
    pub parts: Vec<UploadedPart>,
}

// Response types

/// A short-lived upload destination issued by the backend. Consumed by
/// exactly one PUT; a failed transfer means requesting a fresh one, never
/// retrying the stale URL.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadTarget {
    pub upload_url: String,
    #[serde(default)]
    pub required_headers: HashMap<String, String>,
    /// Seconds of validity from issuance.
    pub expires_in: u64,
    pub storage_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PresignBatchResponse {
    pub targets: Vec<UploadTarget>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CompleteUploadResponse {
    pub asset_id: Uuid,
    pub status: String,
}

/// Bytes-on-the-wire progress for a single transfer attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_sent: u64,
    pub bytes_total: u64,
}

impl TransferProgress {
    /// Percentage rounded to the nearest integer. Reports 100 only once
    /// every byte is out, so a caller can treat 100 as "transfer finished".
    pub fn percent(&self) -> u8 {
        if self.bytes_total == 0 {
            return if self.bytes_sent > 0 { 100 } else { 0 };
        }
        if self.bytes_sent >= self.bytes_total {
            return 100;
        }
        let pct = (self.bytes_sent as f64 / self.bytes_total as f64 * 100.0).round() as u8;
        pct.min(99)
    }
}
