//! Client engine for direct-to-storage uploads.
//!
//! The backend issues short-lived presigned targets; bytes then go straight
//! to object storage over a bare HTTP client, and a completion call
//! registers the stored object so the backend can pick it up for review and
//! conversion. [`Uploader`] sequences those three steps per asset and
//! aggregates progress across concurrent assets.

// Re-export shared types from hakobu-types
pub use hakobu_types::*;

pub mod api;
pub mod config;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod progress;
pub mod putter;
pub mod session;
pub mod validate;

pub use api::{ApiClient, ApiError, PresignedTarget};
pub use config::{ClientConfig, ConfigError};
pub use error::{CompletionRetry, Result, Stage, UploadError};
pub use intent::{CompletedAsset, DocumentUpload, UploadIntent, UploadSource};
pub use orchestrator::{assemble_parts, StageObserver, UploadState, Uploader};
pub use progress::{noop_progress, ProgressAggregator, ProgressCallback};
pub use putter::{PutOutcome, StoragePutter};
pub use session::{AgeGate, AuthSession, ExpiringFlag, KeyValueStore, MemoryStore};
pub use validate::UploadLimits;
