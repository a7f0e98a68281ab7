//! Sequences presign → PUT → complete per asset, and fans out across
//! assets with bounded concurrency.
//!
//! The three steps for a single asset are strictly ordered and never
//! parallelized against each other. Independent assets may overlap; the
//! only shared state between them is the progress aggregator.

use crate::api::{ApiClient, PresignedTarget};
use crate::config::ClientConfig;
use crate::error::{CompletionRetry, Result, Stage, UploadError};
use crate::intent::{CompletedAsset, DocumentUpload, UploadIntent, UploadSource};
use crate::progress::{ProgressAggregator, ProgressCallback};
use crate::putter::StoragePutter;
use crate::session::AuthSession;
use crate::validate::{validate_intent, UploadLimits};
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use hakobu_types::{
    CompleteUploadResponse, DocumentPart, MultipartCompleteRequest, MultipartInitRequest,
    PresignBatchRequest, PresignPartRequest, PresignUploadRequest, ResubmitDocumentsRequest,
    TransferProgress, UploadedPart,
};
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Where a single asset currently is in the upload sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Presigning,
    Uploading,
    Completing,
    Done,
    Failed(Stage),
}

/// Observer for state transitions of one asset. Mostly useful for UIs and
/// tests; defaults to a no-op.
pub type StageObserver = Arc<dyn Fn(UploadState) + Send + Sync>;

fn noop_observer() -> StageObserver {
    Arc::new(|_| {})
}

pub struct Uploader {
    api: ApiClient,
    putter: StoragePutter,
    limits: UploadLimits,
    max_concurrent: usize,
    part_size: usize,
    cancel: CancellationToken,
}

impl Uploader {
    pub fn new(
        api: ApiClient,
        putter: StoragePutter,
        limits: UploadLimits,
        max_concurrent: usize,
        part_size: usize,
    ) -> Self {
        Self {
            api,
            putter,
            limits,
            max_concurrent: max_concurrent.max(1),
            part_size: part_size.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &ClientConfig, session: AuthSession) -> Result<Self> {
        let api = ApiClient::new(&config.api_url, session, config.request_timeout)
            .map_err(|e| UploadError::Presign(e.to_string()))?;
        let putter = StoragePutter::new(config.transfer_timeout)?;
        Ok(Self::new(
            api,
            putter,
            config.limits.clone(),
            config.max_concurrent_transfers,
            config.part_size,
        ))
    }

    /// Token the caller can hold to abort in-flight transfers. Aborted
    /// assets end in `Failed(upload)` and are never registered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs one asset through presign → PUT → complete.
    pub async fn upload_asset(
        &self,
        intent: UploadIntent,
        progress: ProgressCallback,
    ) -> Result<CompletedAsset> {
        self.upload_asset_observed(intent, progress, noop_observer())
            .await
    }

    pub async fn upload_asset_observed(
        &self,
        intent: UploadIntent,
        progress: ProgressCallback,
        observe: StageObserver,
    ) -> Result<CompletedAsset> {
        let result = self.run_single(&intent, progress, &observe).await;
        self.report(&observe, &result);
        result
    }

    async fn run_single(
        &self,
        intent: &UploadIntent,
        progress: ProgressCallback,
        observe: &StageObserver,
    ) -> Result<CompletedAsset> {
        let bytes = load_source(&intent.source).await?;
        validate_intent(intent, bytes.len() as u64, &self.limits)?;
        self.run_loaded(intent, bytes, progress, observe).await
    }

    /// Re-runs only the registration step for bytes that already landed in
    /// storage. Never re-uploads.
    pub async fn retry_completion(&self, storage_key: &str) -> Result<CompletedAsset> {
        let response =
            self.api
                .complete_upload(storage_key)
                .await
                .map_err(|e| UploadError::Completion {
                    storage_key: storage_key.to_string(),
                    message: e.to_string(),
                    retry: CompletionRetry::Single,
                })?;

        Ok(CompletedAsset {
            storage_key: storage_key.to_string(),
            asset_id: response.asset_id,
            status: response.status,
        })
    }

    /// Registration-only retry for a multipart upload whose parts are all
    /// stored. Re-sends the same upload id and part list; never re-uploads
    /// a part.
    pub async fn retry_multipart_completion(
        &self,
        request: &MultipartCompleteRequest,
    ) -> Result<CompletedAsset> {
        let response = self
            .api
            .multipart_complete(request)
            .await
            .map_err(|e| UploadError::Completion {
                storage_key: request.s3_key.clone(),
                message: e.to_string(),
                retry: CompletionRetry::Multipart(request.clone()),
            })?;

        Ok(CompletedAsset {
            storage_key: request.s3_key.clone(),
            asset_id: response.asset_id,
            status: response.status,
        })
    }

    /// Registration-only retry for a document set whose files are all
    /// stored.
    pub async fn retry_resubmission(
        &self,
        request: &ResubmitDocumentsRequest,
    ) -> Result<CompleteUploadResponse> {
        self.api
            .resubmit_documents(request)
            .await
            .map_err(|e| UploadError::Completion {
                storage_key: request.verification_id.to_string(),
                message: e.to_string(),
                retry: CompletionRetry::Documents(request.clone()),
            })
    }

    /// Uploads several independent assets with bounded concurrency. The
    /// callback sees one aggregate figure: sum(sent) / sum(total) over all
    /// assets. Results come back in input order; the first failure wins.
    pub async fn upload_batch(
        &self,
        intents: Vec<UploadIntent>,
        progress: ProgressCallback,
    ) -> Result<Vec<CompletedAsset>> {
        let mut loaded = Vec::with_capacity(intents.len());
        for intent in intents {
            let bytes = load_source(&intent.source).await?;
            validate_intent(&intent, bytes.len() as u64, &self.limits)?;
            loaded.push((intent, bytes));
        }

        let totals: Vec<u64> = loaded.iter().map(|(_, b)| b.len() as u64).collect();
        let aggregator = ProgressAggregator::new(&totals);

        let mut results: Vec<(usize, CompletedAsset)> = stream::iter(
            loaded
                .into_iter()
                .enumerate()
                .map(|(index, (intent, bytes))| {
                    let aggregator = aggregator.clone();
                    let progress = progress.clone();
                    async move {
                        let per_asset: ProgressCallback = Arc::new(move |p: TransferProgress| {
                            aggregator.record(index, p.bytes_sent);
                            (*progress)(aggregator.overall());
                        });
                        let asset = self
                            .run_loaded(&intent, bytes, per_asset, &noop_observer())
                            .await?;
                        Ok::<_, UploadError>((index, asset))
                    }
                }),
        )
        .buffer_unordered(self.max_concurrent)
        .try_collect()
        .await?;

        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, asset)| asset).collect())
    }

    /// Single-asset sequence for a payload that is already in memory and
    /// validated.
    async fn run_loaded(
        &self,
        intent: &UploadIntent,
        bytes: Bytes,
        progress: ProgressCallback,
        observe: &StageObserver,
    ) -> Result<CompletedAsset> {
        (*observe)(UploadState::Presigning);
        let target = self
            .api
            .presign_upload(&presign_request(intent))
            .await
            .map_err(|e| UploadError::Presign(e.to_string()))?;

        (*observe)(UploadState::Uploading);
        self.putter
            .put(&target, bytes, progress, &self.cancel)
            .await?;

        (*observe)(UploadState::Completing);
        let storage_key = target.target.storage_key.clone();
        let response = self
            .api
            .complete_upload(&storage_key)
            .await
            .map_err(|e| UploadError::Completion {
                storage_key: storage_key.clone(),
                message: e.to_string(),
                retry: CompletionRetry::Single,
            })?;

        tracing::info!("registered {storage_key} as {}", response.asset_id);
        Ok(CompletedAsset {
            storage_key,
            asset_id: response.asset_id,
            status: response.status,
        })
    }

    /// Multipart flow for large videos: init → per-part presign + PUT →
    /// complete with the ordered part list.
    pub async fn upload_multipart(
        &self,
        intent: UploadIntent,
        progress: ProgressCallback,
    ) -> Result<CompletedAsset> {
        self.upload_multipart_observed(intent, progress, noop_observer())
            .await
    }

    pub async fn upload_multipart_observed(
        &self,
        intent: UploadIntent,
        progress: ProgressCallback,
        observe: StageObserver,
    ) -> Result<CompletedAsset> {
        let result = self.run_multipart(&intent, progress, &observe).await;
        self.report(&observe, &result);
        result
    }

    async fn run_multipart(
        &self,
        intent: &UploadIntent,
        progress: ProgressCallback,
        observe: &StageObserver,
    ) -> Result<CompletedAsset> {
        let total = source_len(&intent.source).await?;
        validate_intent(intent, total, &self.limits)?;

        (*observe)(UploadState::Presigning);
        let init = self
            .api
            .multipart_init(&MultipartInitRequest {
                content_type: intent.content_type.clone(),
                file_extension: intent.file_extension.clone(),
                asset_kind: intent.asset_kind,
            })
            .await
            .map_err(|e| UploadError::Presign(e.to_string()))?;

        let part_size = self.part_size as u64;
        let part_count = ((total + part_size - 1) / part_size) as u32;
        tracing::debug!(
            "multipart upload {}: {} bytes in {} parts",
            init.s3_key,
            total,
            part_count
        );

        (*observe)(UploadState::Uploading);
        let part_totals: Vec<u64> = (0..part_count)
            .map(|i| part_len(total, part_size, i))
            .collect();
        let aggregator = ProgressAggregator::new(&part_totals);

        let parts: Vec<UploadedPart> = stream::iter((0..part_count).map(|index| {
            let aggregator = aggregator.clone();
            let progress = progress.clone();
            let init = &init;
            async move {
                let part_number = index + 1;
                let offset = index as u64 * part_size;
                let len = part_len(total, part_size, index) as usize;
                let chunk = read_part(&intent.source, offset, len).await?;

                let presigned = self
                    .api
                    .presign_part(&PresignPartRequest {
                        s3_key: init.s3_key.clone(),
                        upload_id: init.upload_id.clone(),
                        part_number,
                    })
                    .await
                    .map_err(|e| UploadError::Presign(e.to_string()))?;

                let target = PresignedTarget::new(hakobu_types::UploadTarget {
                    upload_url: presigned.upload_url,
                    required_headers: Default::default(),
                    expires_in: presigned.expires_in,
                    storage_key: init.s3_key.clone(),
                });

                let per_part: ProgressCallback = Arc::new(move |p: TransferProgress| {
                    aggregator.record(index as usize, p.bytes_sent);
                    (*progress)(aggregator.overall());
                });

                let outcome = self
                    .putter
                    .put(&target, chunk, per_part, &self.cancel)
                    .await?;

                let etag = outcome.etag.ok_or_else(|| {
                    UploadError::Transfer(format!(
                        "storage response for part {part_number} is missing an ETag"
                    ))
                })?;

                Ok::<_, UploadError>(UploadedPart { part_number, etag })
            }
        }))
        .buffer_unordered(self.max_concurrent)
        .try_collect()
        .await?;

        let parts = assemble_parts(parts, part_count)?;

        (*observe)(UploadState::Completing);
        let request = MultipartCompleteRequest {
            s3_key: init.s3_key.clone(),
            upload_id: init.upload_id,
            parts,
        };
        let response = self
            .api
            .multipart_complete(&request)
            .await
            .map_err(|e| UploadError::Completion {
                storage_key: request.s3_key.clone(),
                message: e.to_string(),
                retry: CompletionRetry::Multipart(request.clone()),
            })?;

        tracing::info!("assembled {part_count} parts into {}", request.s3_key);
        Ok(CompletedAsset {
            storage_key: request.s3_key,
            asset_id: response.asset_id,
            status: response.status,
        })
    }

    /// Identity-document set: batch presign, PUT each file, then one
    /// resubmit call with the `{kind, ext}` list in submission order.
    pub async fn upload_documents(
        &self,
        verification_id: Uuid,
        documents: Vec<DocumentUpload>,
        progress: ProgressCallback,
    ) -> Result<CompleteUploadResponse> {
        let mut loaded = Vec::with_capacity(documents.len());
        for doc in documents {
            let bytes = load_source(&doc.intent.source).await?;
            validate_intent(&doc.intent, bytes.len() as u64, &self.limits)?;
            loaded.push((doc, bytes));
        }

        let targets = self
            .api
            .presign_batch(&PresignBatchRequest {
                assets: loaded
                    .iter()
                    .map(|(doc, _)| presign_request(&doc.intent))
                    .collect(),
            })
            .await
            .map_err(|e| UploadError::Presign(e.to_string()))?;

        if targets.len() != loaded.len() {
            return Err(UploadError::Presign(format!(
                "requested {} targets, received {}",
                loaded.len(),
                targets.len()
            )));
        }

        let totals: Vec<u64> = loaded.iter().map(|(_, b)| b.len() as u64).collect();
        let aggregator = ProgressAggregator::new(&totals);
        let storage_keys: Vec<String> = targets
            .iter()
            .map(|t| t.target.storage_key.clone())
            .collect();

        stream::iter(loaded.iter().zip(targets.iter()).enumerate().map(
            |(index, ((_, bytes), target))| {
                let aggregator = aggregator.clone();
                let progress = progress.clone();
                async move {
                    let per_doc: ProgressCallback = Arc::new(move |p: TransferProgress| {
                        aggregator.record(index, p.bytes_sent);
                        (*progress)(aggregator.overall());
                    });
                    self.putter
                        .put(target, bytes.clone(), per_doc, &self.cancel)
                        .await?;
                    Ok::<_, UploadError>(())
                }
            },
        ))
        .buffer_unordered(self.max_concurrent)
        .try_collect::<Vec<()>>()
        .await?;

        let request = ResubmitDocumentsRequest {
            verification_id,
            documents: loaded
                .iter()
                .map(|(doc, _)| DocumentPart {
                    kind: doc.kind.clone(),
                    ext: doc.intent.file_extension.clone(),
                })
                .collect(),
        };
        self.api
            .resubmit_documents(&request)
            .await
            .map_err(|e| UploadError::Completion {
                storage_key: storage_keys.join(","),
                message: e.to_string(),
                retry: CompletionRetry::Documents(request.clone()),
            })
    }

    fn report(&self, observe: &StageObserver, result: &Result<CompletedAsset>) {
        match result {
            Ok(_) => (*observe)(UploadState::Done),
            Err(err) => {
                tracing::warn!("upload failed at {} stage: {err}", err.stage());
                (*observe)(UploadState::Failed(err.stage()));
            }
        }
    }
}

fn presign_request(intent: &UploadIntent) -> PresignUploadRequest {
    PresignUploadRequest {
        content_type: intent.content_type.clone(),
        file_extension: intent.file_extension.clone(),
        asset_kind: intent.asset_kind,
    }
}

fn part_len(total: u64, part_size: u64, index: u32) -> u64 {
    let offset = index as u64 * part_size;
    u64::min(part_size, total - offset)
}

/// Sorts parts by part number and verifies the list is exactly `1..=expected`.
/// Any gap, duplicate, or surplus is fatal; the complete call must not be
/// attempted with a defective list.
pub fn assemble_parts(mut parts: Vec<UploadedPart>, expected: u32) -> Result<Vec<UploadedPart>> {
    parts.sort_by_key(|part| part.part_number);

    if parts.len() != expected as usize {
        return Err(UploadError::Assembly(format!(
            "expected {expected} parts, have {}",
            parts.len()
        )));
    }

    for (index, part) in parts.iter().enumerate() {
        let want = index as u32 + 1;
        if part.part_number != want {
            return Err(UploadError::Assembly(format!(
                "part {want} is missing (found part {} in its place)",
                part.part_number
            )));
        }
    }

    Ok(parts)
}

async fn load_source(source: &UploadSource) -> Result<Bytes> {
    match source {
        UploadSource::Bytes(bytes) => Ok(bytes.clone()),
        UploadSource::File(path) => tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| UploadError::Validation(format!("failed to read {}: {e}", path.display()))),
    }
}

async fn source_len(source: &UploadSource) -> Result<u64> {
    match source {
        UploadSource::Bytes(bytes) => Ok(bytes.len() as u64),
        UploadSource::File(path) => tokio::fs::metadata(path).await.map(|m| m.len()).map_err(|e| {
            UploadError::Validation(format!("failed to read metadata for {}: {e}", path.display()))
        }),
    }
}

/// Reads one part's bytes. File sources get their own handle per part, so
/// concurrent part reads never share a seek position.
async fn read_part(source: &UploadSource, offset: u64, len: usize) -> Result<Bytes> {
    match source {
        UploadSource::Bytes(bytes) => {
            let start = offset as usize;
            Ok(bytes.slice(start..start + len))
        }
        UploadSource::File(path) => {
            let mut file = tokio::fs::File::open(path).await.map_err(|e| {
                UploadError::Transfer(format!("failed to open {}: {e}", path.display()))
            })?;
            file.seek(SeekFrom::Start(offset)).await.map_err(|e| {
                UploadError::Transfer(format!("failed to seek to offset {offset}: {e}"))
            })?;
            let mut buffer = vec![0u8; len];
            file.read_exact(&mut buffer).await.map_err(|e| {
                UploadError::Transfer(format!("failed to read part at offset {offset}: {e}"))
            })?;
            Ok(Bytes::from(buffer))
        }
    }
}
