use crate::error::{Result, UploadError};
use crate::intent::UploadIntent;
use hakobu_types::AssetKind;

/// Per-kind size and extension constraints, checked before any network
/// call. The backend enforces its own allow-list; this only spares the
/// user a doomed transfer.
#[derive(Clone, Debug)]
pub struct UploadLimits {
    pub max_image_bytes: u64,
    pub max_video_bytes: u64,
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub document_extensions: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: 20 * 1024 * 1024,
            max_video_bytes: 2 * 1024 * 1024 * 1024,
            image_extensions: string_vec(&["jpg", "jpeg", "png", "gif", "webp"]),
            video_extensions: string_vec(&["mp4", "mov", "webm"]),
            document_extensions: string_vec(&["jpg", "jpeg", "png", "pdf"]),
        }
    }
}

fn string_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl UploadLimits {
    fn allowed_extensions(&self, kind: AssetKind) -> &[String] {
        match kind {
            AssetKind::MainVideo | AssetKind::SampleVideo => &self.video_extensions,
            AssetKind::IdentityDocument => &self.document_extensions,
            _ => &self.image_extensions,
        }
    }

    fn max_bytes(&self, kind: AssetKind) -> u64 {
        if kind.is_video() {
            self.max_video_bytes
        } else {
            self.max_image_bytes
        }
    }
}

pub fn validate_intent(intent: &UploadIntent, size: u64, limits: &UploadLimits) -> Result<()> {
    if intent.content_type.is_empty() {
        return Err(UploadError::Validation("missing content type".to_string()));
    }

    if size == 0 {
        return Err(UploadError::Validation("file is empty".to_string()));
    }

    let ext = intent.file_extension.to_lowercase();
    let allowed = limits.allowed_extensions(intent.asset_kind);
    if !allowed.iter().any(|a| *a == ext) {
        return Err(UploadError::Validation(format!(
            "extension .{} is not allowed for {:?} uploads",
            intent.file_extension, intent.asset_kind
        )));
    }

    let max = limits.max_bytes(intent.asset_kind);
    if size > max {
        return Err(UploadError::Validation(format!(
            "file is {size} bytes, limit for {:?} is {max}",
            intent.asset_kind
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::UploadIntent;
    use bytes::Bytes;

    fn image_intent(ext: &str) -> UploadIntent {
        UploadIntent::from_bytes(
            AssetKind::Avatar,
            "image/png",
            ext,
            Bytes::from_static(b"data"),
        )
    }

    #[test]
    fn accepts_allowed_image() {
        let limits = UploadLimits::default();
        assert!(validate_intent(&image_intent("png"), 1024, &limits).is_ok());
        // extension check is case-insensitive
        assert!(validate_intent(&image_intent("PNG"), 1024, &limits).is_ok());
    }

    #[test]
    fn rejects_disallowed_extension() {
        let limits = UploadLimits::default();
        let err = validate_intent(&image_intent("exe"), 1024, &limits).unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)));
    }

    #[test]
    fn rejects_oversized_file() {
        let limits = UploadLimits {
            max_image_bytes: 100,
            ..UploadLimits::default()
        };
        let err = validate_intent(&image_intent("png"), 101, &limits).unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)));
    }

    #[test]
    fn rejects_empty_file_and_missing_content_type() {
        let limits = UploadLimits::default();
        assert!(validate_intent(&image_intent("png"), 0, &limits).is_err());

        let mut intent = image_intent("png");
        intent.content_type = String::new();
        assert!(validate_intent(&intent, 10, &limits).is_err());
    }

    #[test]
    fn video_kinds_use_video_rules() {
        let limits = UploadLimits::default();
        let intent = UploadIntent::from_bytes(
            AssetKind::MainVideo,
            "video/mp4",
            "mp4",
            Bytes::from_static(b"data"),
        );
        assert!(validate_intent(&intent, 500 * 1024 * 1024, &limits).is_ok());

        let intent = UploadIntent::from_bytes(
            AssetKind::MainVideo,
            "video/mp4",
            "png",
            Bytes::from_static(b"data"),
        );
        assert!(validate_intent(&intent, 1024, &limits).is_err());
    }
}
