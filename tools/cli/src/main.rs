//! Dropmedia CLI - Command line interface for media storage.
//!
//! This tool uploads, downloads and inspects media objects in a configured
//! remote store. Uploads are streamed in chunks.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use bytes::Bytes;
use futures::stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use dropmedia_common::{Error, MediaPath};
use dropmedia_storage::{create_default_registry, ByteStream, MediaProvider, ReadParams};

const DEFAULT_PROVIDER: &str = "dropbox";

/// Bytes sent per upload request (a multiple of Dropbox's 4 MiB block size).
const CHUNK_SIZE: usize = 4 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "dropmedia")]
#[command(about = "Dropmedia - Chunked media uploads to remote stores")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (default: <config dir>/dropmedia/config.json).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Access token overriding the one in the configuration file.
    #[arg(long, env = "DROPMEDIA_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file.
    Put {
        /// Local file to upload.
        file: PathBuf,

        /// Destination path in the store.
        path: String,
    },

    /// Download an object.
    Get {
        /// Path in the store.
        path: String,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read this revision instead of the latest.
        #[arg(short, long)]
        revision: Option<String>,
    },

    /// Show object metadata.
    Stat {
        /// Path in the store.
        path: String,
    },

    /// Check whether an object exists.
    Exists {
        /// Path in the store.
        path: String,
    },

    /// Delete an object.
    Delete {
        /// Path in the store.
        path: String,
    },
}

/// Contents of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CliConfig {
    /// Registered provider name.
    #[serde(default = "default_provider")]
    provider: String,
    /// Provider-specific settings.
    #[serde(default = "empty_settings")]
    settings: Value,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn empty_settings() -> Value {
    Value::Object(Default::default())
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            settings: empty_settings(),
        }
    }
}

impl CliConfig {
    /// Replace the access token in the provider settings.
    fn with_access_token(mut self, token: &str) -> Result<Self> {
        let settings = self
            .settings
            .as_object_mut()
            .context("Provider settings must be a JSON object")?;
        settings.insert("access_token".to_string(), Value::String(token.to_string()));
        Ok(self)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dropmedia").join("config.json"))
}

/// Load the configuration.
///
/// An explicitly given file must exist; a missing default file yields the
/// default configuration.
async fn load_config(explicit: Option<&Path>, access_token: Option<&str>) -> Result<CliConfig> {
    let config = match explicit {
        Some(path) => read_config(path).await?,
        None => match default_config_path() {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => {
                read_config(&path).await?
            }
            _ => CliConfig::default(),
        },
    };

    match access_token {
        Some(token) => config.with_access_token(token),
        None => Ok(config),
    }
}

async fn read_config(path: &Path) -> Result<CliConfig> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid config file {}", path.display()))
}

fn open_provider(config: CliConfig) -> Result<Arc<dyn MediaProvider>> {
    let registry = create_default_registry();
    registry
        .resolve(&config.provider, config.settings)
        .with_context(|| format!("Failed to set up provider '{}'", config.provider))
}

fn parse_path(path: &str) -> Result<MediaPath> {
    MediaPath::parse(path).with_context(|| format!("Invalid media path '{}'", path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref(), cli.access_token.as_deref()).await?;
    let provider = open_provider(config)?;

    match cli.command {
        Commands::Put { file, path } => cmd_put(provider.as_ref(), &file, &path).await,

        Commands::Get {
            path,
            output,
            revision,
        } => cmd_get(provider.as_ref(), &path, output.as_deref(), revision).await,

        Commands::Stat { path } => cmd_stat(provider.as_ref(), &path).await,

        Commands::Exists { path } => cmd_exists(provider.as_ref(), &path).await,

        Commands::Delete { path } => cmd_delete(provider.as_ref(), &path).await,
    }
}

/// Stream a local file into the store.
async fn cmd_put(provider: &dyn MediaProvider, file: &Path, dest: &str) -> Result<()> {
    info!("Uploading {} to {}", file.display(), dest);

    let dest_path = parse_path(dest)?;
    let source = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let stats = provider
        .set_stream(&dest_path, file_chunks(source, CHUNK_SIZE))
        .await
        .context("Upload failed")?;

    println!("Uploaded: {}", stats.path);
    if let Some(size) = stats.size {
        println!("  Size: {} bytes", size);
    }
    if let Some(revision) = &stats.revision {
        println!("  Revision: {}", revision);
    }

    Ok(())
}

/// Read a file as a stream of `chunk_size` chunks; only the last may be shorter.
fn file_chunks(file: tokio::fs::File, chunk_size: usize) -> ByteStream {
    Box::pin(stream::try_unfold(file, move |mut file| async move {
        let mut chunk = Vec::with_capacity(chunk_size);
        (&mut file)
            .take(chunk_size as u64)
            .read_to_end(&mut chunk)
            .await
            .map_err(Error::from)?;

        let next = if chunk.is_empty() {
            None
        } else {
            Some((Bytes::from(chunk), file))
        };
        Ok::<_, Error>(next)
    }))
}

/// Download an object to a file or stdout.
async fn cmd_get(
    provider: &dyn MediaProvider,
    source: &str,
    output: Option<&Path>,
    revision: Option<String>,
) -> Result<()> {
    let source_path = parse_path(source)?;
    let params = ReadParams { revision };

    let content = provider
        .get(&source_path, &params)
        .await
        .with_context(|| format!("Failed to read {}", source))?;

    match output {
        Some(dest) => {
            tokio::fs::write(dest, &content)
                .await
                .context("Failed to write output file")?;
            info!("Wrote {} bytes to {}", content.len(), dest.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&content).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

/// Print object metadata.
async fn cmd_stat(provider: &dyn MediaProvider, path: &str) -> Result<()> {
    let media_path = parse_path(path)?;
    let stats = provider
        .stat(&media_path)
        .await
        .with_context(|| format!("Failed to stat {}", path))?;

    println!("Object Information:");
    println!("  Path: {}", stats.path);
    println!("  ID: {}", stats.id);
    println!("  Type: {}", if stats.is_directory { "directory" } else { "file" });
    if let Some(size) = stats.size {
        println!("  Size: {} bytes", size);
    }
    if let Some(revision) = &stats.revision {
        println!("  Revision: {}", revision);
    }
    println!("  Modified: {}", stats.modified);

    Ok(())
}

/// Report whether an object exists; exits with status 1 when it does not.
async fn cmd_exists(provider: &dyn MediaProvider, path: &str) -> Result<()> {
    let media_path = parse_path(path)?;
    let exists = provider
        .exists(&media_path)
        .await
        .with_context(|| format!("Failed to check {}", path))?;

    println!("{}", exists);
    if !exists {
        std::process::exit(1);
    }
    Ok(())
}

/// Delete an object.
async fn cmd_delete(provider: &dyn MediaProvider, path: &str) -> Result<()> {
    info!("Deleting: {}", path);

    let media_path = parse_path(path)?;
    provider
        .delete(&media_path)
        .await
        .with_context(|| format!("Failed to delete {}", path))?;

    println!("Deleted: {}", path);

    Ok(())
}
