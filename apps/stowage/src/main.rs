//! Stowage CLI - multipart uploads and folder sync for S3-compatible storage.
//!
//! # Usage
//!
//! ```text
//! stowage upload ./video.mp4 --bucket media --key videos/video.mp4
//! stowage compose --source-bucket chunks --prefix job-42/ --bucket media --key merged.bin
//! stowage download-dir --bucket media --prefix uploads/2024/06/01 ./restore
//! stowage delete --bucket media chunks/1 chunks/2
//! ```
//!
//! Connection settings come from the `STOWAGE_*` environment variables
//! (see `StoreConfig::from_env`) and can be overridden with global flags.
//!
//! # Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0` | Success |
//! | `1` | Failure; storage holds nothing left over |
//! | `3` | Failure; orphaned multipart parts may remain |

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use stowage_aws::{AwsStorageClient, Presigner};
use stowage_core::cors::default_cors_rules;
use stowage_core::provider::StorageProvider;
use stowage_core::{ObjectStore, RequestBody, StoreConfig, StoreError};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI version.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code when cleanup of a failed upload could not be confirmed.
const EXIT_CLEANUP_UNCONFIRMED: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "stowage", version, about = "Multipart uploads for S3-compatible storage")]
struct Cli {
    /// Endpoint URL (overrides STOWAGE_ENDPOINT).
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Signing region (overrides STOWAGE_REGION).
    #[arg(long, global = true)]
    region: Option<String>,

    /// Storage provider used to derive the endpoint from the region.
    #[arg(long, global = true)]
    provider: Option<StorageProvider>,

    /// Address every bucket path-style.
    #[arg(long, global = true)]
    path_style: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload one file with multipart.
    Upload {
        /// Local file.
        file: PathBuf,
        /// Bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
        /// Object key; defaults to a generated name under the base directory.
        #[arg(short, long)]
        key: Option<String>,
        /// Part size in bytes.
        #[arg(long)]
        part_size: Option<u64>,
        /// Use a single PUT below the multipart threshold.
        #[arg(long)]
        auto: bool,
    },
    /// Upload pre-chunked files as consecutive parts of one object.
    UploadBodies {
        /// Chunk files, in part order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
        /// Object key.
        #[arg(short, long)]
        key: String,
    },
    /// Merge existing objects server-side, ordered by their numeric names.
    Compose {
        /// Bucket holding the source objects; defaults to the target bucket.
        #[arg(long)]
        source_bucket: Option<String>,
        /// Compose every object under this prefix.
        #[arg(long, conflicts_with = "keys")]
        prefix: Option<String>,
        /// Source keys (last path segment is the part number).
        #[arg(long, num_args = 1.., required_unless_present = "prefix")]
        keys: Vec<String>,
        /// Target bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
        /// Target key.
        #[arg(short, long)]
        key: String,
    },
    /// Upload a folder, keeping its layout under a generated prefix.
    UploadDir {
        /// Local folder.
        dir: PathBuf,
        /// Bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
    },
    /// Download every object under a prefix.
    DownloadDir {
        /// Local destination folder.
        dest: PathBuf,
        /// Bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
        /// Key prefix.
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Download one object.
    Download {
        /// Object key.
        key: String,
        /// Local destination file; defaults to the key's last segment.
        dest: Option<PathBuf>,
        /// Bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
    },
    /// Delete objects.
    Delete {
        /// Object keys.
        #[arg(required = true)]
        keys: Vec<String>,
        /// Bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
    },
    /// List buckets owned by the configured credentials.
    Buckets,
    /// Print a presigned URL.
    Presign {
        /// Operation the URL grants.
        #[arg(value_enum)]
        method: PresignMethod,
        /// Object key.
        key: String,
        /// Bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
        /// Lifetime in seconds; defaults to STOWAGE_TOKEN_TIME.
        #[arg(long)]
        ttl: Option<u64>,
        /// Content type the uploader must send (PUT only).
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Show or replace bucket CORS rules.
    Cors {
        /// Bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
        /// XML or JSON document with the new rules.
        #[arg(long, conflicts_with_all = ["default", "clear"])]
        file: Option<PathBuf>,
        /// Apply the permissive default rules.
        #[arg(long, conflicts_with = "clear")]
        default: bool,
        /// Remove every rule.
        #[arg(long)]
        clear: bool,
    },
    /// Abort a multipart upload and verify no parts remain.
    Abort {
        /// Object key of the upload.
        key: String,
        /// Upload ID.
        upload_id: String,
        /// Bucket; defaults to STOWAGE_BUCKET.
        #[arg(short, long)]
        bucket: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PresignMethod {
    Get,
    Put,
}

impl Cli {
    /// Apply global flags on top of the environment configuration.
    fn apply(&self, config: &mut StoreConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint.clone_from(endpoint);
        }
        if let Some(region) = &self.region {
            config.region.clone_from(region);
        }
        if self.provider.is_some() {
            config.provider = self.provider;
        }
        if self.path_style {
            config.force_path_style = true;
        }
    }
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Resolve an explicit bucket or the configured default.
fn bucket_or_default(store: &ObjectStore, bucket: Option<&str>) -> Result<String, StoreError> {
    match bucket {
        Some(bucket) => Ok(bucket.to_owned()),
        None => store.default_bucket(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Pre-chunked bodies with lengths taken from the file system.
async fn file_bodies(files: &[PathBuf]) -> Result<Vec<RequestBody>> {
    let mut bodies = Vec::with_capacity(files.len());
    for file in files {
        let len = tokio::fs::metadata(file)
            .await
            .with_context(|| format!("cannot read {}", file.display()))?
            .len();
        bodies.push(RequestBody::from_file_range(file.clone(), 0, len));
    }
    Ok(bodies)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))
}

/// Cancellation signal flipped by the first Ctrl-C.
fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, aborting in-flight upload");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Map a failure to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<StoreError>() {
        Some(store_err) if !store_err.cleanup_confirmed() => EXIT_CLEANUP_UNCONFIRMED,
        _ => 1,
    }
}

async fn run(cli: Cli, config: StoreConfig) -> Result<ExitCode> {
    let client = AwsStorageClient::from_config(&config).await;
    let store = ObjectStore::new(Arc::new(client.clone()), config.clone())
        .with_cancel(cancel_on_ctrl_c());

    if config.auto_config_cors && !config.default_bucket.is_empty() {
        let bucket = store.default_bucket()?;
        if let Err(e) = store.configure_cors(&bucket, &default_cors_rules()).await {
            warn!(bucket = %bucket, error = %e, "automatic CORS configuration failed");
        }
    }

    match cli.command {
        Command::Upload {
            file,
            bucket,
            key,
            part_size,
            auto,
        } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            let key = match key {
                Some(key) => key,
                None => store.object_name(&file_name(&file)?),
            };
            if auto {
                let outcome = store.put_file(&bucket, &key, &file).await?;
                info!(key = %outcome.key(), multipart = outcome.is_multipart(), "upload finished");
                println!("{}", outcome.key());
            } else {
                let part_size = part_size.unwrap_or(config.part_size);
                let done = store
                    .upload_file_with_part_size(&bucket, &key, &file, part_size)
                    .await?;
                print_json(&done)?;
            }
        }
        Command::UploadBodies { files, bucket, key } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            let bodies = file_bodies(&files).await?;
            let done = store.upload_bodies(&bucket, &key, bodies).await?;
            print_json(&done)?;
        }
        Command::Compose {
            source_bucket,
            prefix,
            keys,
            bucket,
            key,
        } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            let source_bucket = source_bucket.unwrap_or_else(|| bucket.clone());
            let done = if keys.is_empty() {
                store
                    .compose_prefix(&source_bucket, prefix.as_deref(), &bucket, &key)
                    .await?
            } else {
                store
                    .compose_objects(&source_bucket, keys, &bucket, &key)
                    .await?
            };
            print_json(&done)?;
        }
        Command::UploadDir { dir, bucket } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            let uploaded = store.upload_folder(&bucket, &dir).await?;
            for outcome in &uploaded {
                println!("{}", outcome.key());
            }
            info!(bucket = %bucket, files = uploaded.len(), "folder uploaded");
        }
        Command::DownloadDir {
            dest,
            bucket,
            prefix,
        } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            let written = store
                .download_folder(&bucket, prefix.as_deref(), &dest)
                .await?;
            for path in &written {
                println!("{}", path.display());
            }
        }
        Command::Download { key, dest, bucket } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            let dest = match dest {
                Some(dest) => dest,
                None => PathBuf::from(key.rsplit('/').next().unwrap_or(&key)),
            };
            store.download_file(&bucket, &key, &dest).await?;
            println!("{}", dest.display());
        }
        Command::Delete { keys, bucket } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            let result = store.delete_objects(&bucket, keys).await?;
            print_json(&result)?;
            if !result.is_complete() {
                bail!("{} objects were not deleted", result.errors.len());
            }
        }
        Command::Buckets => {
            print_json(&store.list_buckets().await?)?;
        }
        Command::Presign {
            method,
            key,
            bucket,
            ttl,
            content_type,
        } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            let presigner = Presigner::new(client, config.token_ttl());
            let ttl = ttl.map(Duration::from_secs);
            let url = match method {
                PresignMethod::Get => presigner.presign_get(&bucket, &key, ttl).await?,
                PresignMethod::Put => {
                    presigner
                        .presign_put(&bucket, &key, content_type.as_deref(), ttl)
                        .await?
                }
            };
            print_json(&url)?;
        }
        Command::Cors {
            bucket,
            file,
            default,
            clear,
        } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            if clear {
                store.delete_bucket_cors(&bucket).await?;
            } else if default {
                store.configure_cors(&bucket, &default_cors_rules()).await?;
            } else if let Some(file) = file {
                let document = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("cannot read {}", file.display()))?;
                store.configure_cors_document(&bucket, &document).await?;
            }
            print_json(&store.bucket_cors(&bucket).await?)?;
        }
        Command::Abort {
            key,
            upload_id,
            bucket,
        } => {
            let bucket = bucket_or_default(&store, bucket.as_deref())?;
            let outcome = store
                .abort_multipart_upload(&bucket, &key, &upload_id)
                .await?;
            if !outcome.is_clean() {
                warn!(
                    bucket = %bucket,
                    key = %key,
                    upload_id = %upload_id,
                    ?outcome,
                    "cleanup unconfirmed"
                );
                return Ok(ExitCode::from(EXIT_CLEANUP_UNCONFIRMED));
            }
            info!(attempts = outcome.attempts(), "upload aborted");
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut config = StoreConfig::from_env();
    cli.apply(&mut config);

    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }
    info!(version = VERSION, region = %config.region, "starting stowage");

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use stowage_core::{FailureCause, UploadError};
    use stowage_model::UploadSession;

    use super::*;

    #[test]
    fn test_should_parse_upload_command() {
        let cli = Cli::try_parse_from([
            "stowage",
            "upload",
            "clip.mp4",
            "--bucket",
            "media",
            "--part-size",
            "8388608",
            "--path-style",
        ])
        .expect("valid args");

        assert!(cli.path_style);
        let Command::Upload {
            file,
            bucket,
            part_size,
            auto,
            ..
        } = cli.command
        else {
            panic!("expected upload");
        };
        assert_eq!(file, PathBuf::from("clip.mp4"));
        assert_eq!(bucket.as_deref(), Some("media"));
        assert_eq!(part_size, Some(8 * 1024 * 1024));
        assert!(!auto);
    }

    #[test]
    fn test_should_require_keys_or_prefix_for_compose() {
        assert!(Cli::try_parse_from(["stowage", "compose", "--key", "out"]).is_err());
        assert!(
            Cli::try_parse_from(["stowage", "compose", "--key", "out", "--prefix", "p/"]).is_ok()
        );
        assert!(
            Cli::try_parse_from(["stowage", "compose", "--key", "out", "--keys", "p/1", "p/2"])
                .is_ok()
        );
    }

    #[test]
    fn test_should_parse_delete_and_cors_clear() {
        let cli = Cli::try_parse_from(["stowage", "delete", "-b", "media", "a", "b/c"])
            .expect("valid args");
        let Command::Delete { keys, bucket } = cli.command else {
            panic!("expected delete");
        };
        assert_eq!(keys, ["a", "b/c"]);
        assert_eq!(bucket.as_deref(), Some("media"));

        assert!(Cli::try_parse_from(["stowage", "delete"]).is_err());
        assert!(Cli::try_parse_from(["stowage", "cors", "--clear"]).is_ok());
        assert!(Cli::try_parse_from(["stowage", "cors", "--clear", "--default"]).is_err());
    }

    #[test]
    fn test_should_apply_global_overrides() {
        let cli = Cli::try_parse_from([
            "stowage",
            "--provider",
            "aliyun",
            "--region",
            "oss-cn-hangzhou",
            "abort",
            "k",
            "upload-1",
        ])
        .expect("valid args");
        let mut config = StoreConfig::default();
        cli.apply(&mut config);

        assert_eq!(config.provider, Some(StorageProvider::AliyunOss));
        assert_eq!(
            config.resolved_endpoint().as_deref(),
            Some("https://oss-cn-hangzhou.aliyuncs.com")
        );
        assert!(!config.force_path_style);
    }

    #[test]
    fn test_should_map_unconfirmed_cleanup_to_exit_code() {
        let session = UploadSession::new("media", "k", "upload-1");
        let unclean: anyhow::Error = StoreError::from(UploadError::AbortIncomplete {
            session: session.clone(),
            cause: FailureCause::Cancelled,
            remaining_parts: Some(2),
            abort_error: None,
        })
        .into();
        let clean: anyhow::Error = StoreError::from(UploadError::Aborted {
            session,
            cause: FailureCause::Cancelled,
            attempts: 1,
        })
        .into();

        assert_eq!(exit_code_for(&unclean), EXIT_CLEANUP_UNCONFIRMED);
        assert_eq!(exit_code_for(&clean), 1);
        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), 1);
    }
}
