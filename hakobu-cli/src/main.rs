use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hakobu_client::{
    AuthSession, ClientConfig, CompletionRetry, DocumentUpload, ProgressCallback, UploadError,
    UploadIntent, Uploader,
};
use hakobu_types::{AssetKind, TransferProgress};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs as async_fs;
use uuid::Uuid;

// Videos above this size go through the multipart flow
const MULTIPART_THRESHOLD: u64 = 32 * 1024 * 1024; // 32MB

#[derive(Parser)]
#[command(name = "hakobu")]
#[command(about = "Upload assets straight to object storage via presigned URLs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend API URL
    #[arg(long, default_value = "http://localhost:3000")]
    server: String,

    /// Bearer token (falls back to the HAKOBU_TOKEN environment variable)
    #[arg(long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a single file
    Upload {
        /// File to upload
        file: PathBuf,

        /// Asset kind (avatar, cover, main_video, sample_video, thumbnail,
        /// ogp_image, message_attachment, identity_document)
        #[arg(long, default_value = "message_attachment", value_parser = parse_asset_kind)]
        kind: AssetKind,

        /// Output format (json or plain)
        #[arg(long, default_value = "plain")]
        output: OutputFormat,
    },

    /// Upload an identity-document set and resubmit it for review
    Resubmit {
        /// Verification to attach the documents to
        #[arg(long)]
        verification_id: Uuid,

        /// Document files as kind=path pairs (e.g. front=./front.jpg)
        #[arg(required = true)]
        documents: Vec<String>,
    },
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Json,
    Plain,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "plain" => Ok(OutputFormat::Plain),
            _ => Err(format!("Invalid output format: {}", s)),
        }
    }
}

fn parse_asset_kind(s: &str) -> std::result::Result<AssetKind, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("Unknown asset kind: {}", s))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let token = cli
        .token
        .clone()
        .or_else(|| std::env::var("HAKOBU_TOKEN").ok());
    let session = match token {
        Some(token) => AuthSession::new(token),
        None => AuthSession::anonymous(),
    };

    let mut config = ClientConfig::from_env().context("Failed to load configuration")?;
    config.api_url = cli.server.clone();

    let uploader =
        Uploader::from_config(&config, session).context("Failed to create uploader")?;

    match cli.command {
        Commands::Upload { file, kind, output } => {
            upload_file(&uploader, &file, kind, output).await?;
        }
        Commands::Resubmit {
            verification_id,
            documents,
        } => {
            resubmit_documents(&uploader, verification_id, documents).await?;
        }
    }

    Ok(())
}

async fn upload_file(
    uploader: &Uploader,
    file_path: &Path,
    kind: AssetKind,
    output: OutputFormat,
) -> Result<()> {
    let metadata = async_fs::metadata(file_path)
        .await
        .with_context(|| format!("Failed to read file metadata: {}", file_path.display()))?;

    let file_size = metadata.len();
    let filename = file_path
        .file_name()
        .context("Invalid filename")?
        .to_string_lossy()
        .to_string();
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .context("File has no extension")?
        .to_string();
    let content_type = mime_guess::from_path(file_path)
        .first_or_octet_stream()
        .to_string();

    println!(
        "📁 Uploading {} ({}) as {:?}",
        filename,
        format_file_size(file_size),
        kind
    );

    let intent = UploadIntent::from_file(kind, content_type, extension, file_path);

    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({percent}%)")
            .expect("Failed to set progress bar template")
            .progress_chars("#>-"),
    );

    let pb_progress = pb.clone();
    let progress: ProgressCallback = Arc::new(move |p: TransferProgress| {
        pb_progress.set_position(p.bytes_sent);
    });

    let result = if kind.is_video() && file_size > MULTIPART_THRESHOLD {
        println!("🧩 Using multipart upload");
        uploader.upload_multipart(intent, progress).await
    } else {
        uploader.upload_asset(intent, progress).await
    };

    let asset = match result {
        Ok(asset) => asset,
        Err(UploadError::Completion {
            storage_key,
            message,
            retry,
        }) => {
            pb.abandon();
            eprintln!("⚠️  Bytes are stored but registration failed: {}", message);
            eprintln!("   Retrying completion for {}...", storage_key);
            let retried = match &retry {
                CompletionRetry::Multipart(request) => {
                    uploader.retry_multipart_completion(request).await
                }
                _ => uploader.retry_completion(&storage_key).await,
            };
            retried.context("Completion retry failed; the bytes are stored, try again later")?
        }
        Err(err) => {
            pb.abandon();
            return Err(anyhow::anyhow!(
                "Upload failed at {} stage: {}",
                err.stage(),
                err
            ));
        }
    };

    pb.finish();

    match output {
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "storage_key": asset.storage_key,
                "asset_id": asset.asset_id,
                "status": asset.status,
            });
            println!("{}", serde_json::to_string_pretty(&json_output)?);
        }
        OutputFormat::Plain => {
            println!("✅ Upload complete!");
            println!("🔑 Storage key: {}", asset.storage_key);
            println!("🆔 Asset id: {} ({})", asset.asset_id, asset.status);
        }
    }

    Ok(())
}

async fn resubmit_documents(
    uploader: &Uploader,
    verification_id: Uuid,
    raw_documents: Vec<String>,
) -> Result<()> {
    let mut documents = Vec::with_capacity(raw_documents.len());
    for raw in &raw_documents {
        let (doc_kind, path) = raw
            .split_once('=')
            .with_context(|| format!("Expected kind=path, got: {}", raw))?;
        let path = PathBuf::from(path);
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .with_context(|| format!("File has no extension: {}", path.display()))?
            .to_string();
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();

        documents.push(DocumentUpload {
            kind: doc_kind.to_string(),
            intent: UploadIntent::from_file(
                AssetKind::IdentityDocument,
                content_type,
                extension,
                path,
            ),
        });
    }

    println!(
        "🪪 Submitting {} document(s) for verification {}",
        documents.len(),
        verification_id
    );

    let response = match uploader
        .upload_documents(verification_id, documents, hakobu_client::noop_progress())
        .await
    {
        Ok(response) => response,
        Err(UploadError::Completion {
            message,
            retry: CompletionRetry::Documents(request),
            ..
        }) => {
            eprintln!("⚠️  Documents are stored but resubmission failed: {}", message);
            eprintln!("   Retrying resubmission...");
            uploader
                .retry_resubmission(&request)
                .await
                .context("Resubmission retry failed; the documents are stored, try again later")?
        }
        Err(err) => {
            return Err(anyhow::anyhow!(
                "Resubmission failed at {} stage: {}",
                err.stage(),
                err
            ))
        }
    };

    println!("✅ Documents submitted ({})", response.status);
    Ok(())
}

fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_asset_kinds() {
        assert_eq!(parse_asset_kind("main_video").unwrap(), AssetKind::MainVideo);
        assert!(parse_asset_kind("trojan").is_err());
    }

    #[test]
    fn formats_file_sizes() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }
}
