use bytes::Bytes;
use hakobu_types::AssetKind;
use std::path::PathBuf;
use uuid::Uuid;

/// One logical asset the caller wants stored.
#[derive(Clone, Debug)]
pub struct UploadIntent {
    pub asset_kind: AssetKind,
    pub content_type: String,
    pub file_extension: String,
    pub source: UploadSource,
}

#[derive(Clone, Debug)]
pub enum UploadSource {
    Bytes(Bytes),
    File(PathBuf),
}

impl UploadIntent {
    pub fn from_bytes(
        asset_kind: AssetKind,
        content_type: impl Into<String>,
        file_extension: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            asset_kind,
            content_type: content_type.into(),
            file_extension: file_extension.into(),
            source: UploadSource::Bytes(bytes.into()),
        }
    }

    pub fn from_file(
        asset_kind: AssetKind,
        content_type: impl Into<String>,
        file_extension: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            asset_kind,
            content_type: content_type.into(),
            file_extension: file_extension.into(),
            source: UploadSource::File(path.into()),
        }
    }
}

/// One file of an identity-document set, tagged with the document kind the
/// review backend expects ("front", "back", "selfie", ...).
#[derive(Clone, Debug)]
pub struct DocumentUpload {
    pub kind: String,
    pub intent: UploadIntent,
}

/// Final identifiers for a successfully registered asset.
#[derive(Clone, Debug)]
pub struct CompletedAsset {
    pub storage_key: String,
    pub asset_id: Uuid,
    pub status: String,
}
