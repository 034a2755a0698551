//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

/// Default broadcast buffer per connection before a slow reader starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid --token {0:?}, expected TOKEN=AUTHOR_ID:DISPLAY NAME")]
    InvalidToken(String),
    #[error("Failed to read token file {path}: {source}")]
    TokenFileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse token file {path}: {source}")]
    TokenFileFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Token file {path} has an entry with an empty token or authorId")]
    EmptyIdentity { path: PathBuf },
    #[error("No credentials configured; pass --token or --tokens")]
    NoCredentials,
}

/// StrokeSync relay server.
#[derive(Debug, Clone, Parser)]
#[command(name = "strokesync-server", version, about)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "STROKESYNC_BIND", default_value = "0.0.0.0:3030")]
    pub bind: SocketAddr,

    /// Drawing repository file. Defaults to the platform data directory.
    #[arg(long, env = "STROKESYNC_DATA")]
    pub data: Option<PathBuf>,

    /// Keep drawings in memory only.
    #[arg(long, env = "STROKESYNC_MEMORY", conflicts_with = "data")]
    pub memory: bool,

    /// JSON file mapping bearer tokens to authors.
    #[arg(long = "tokens", env = "STROKESYNC_TOKENS")]
    pub tokens_file: Option<PathBuf>,

    /// Inline credential, `TOKEN=AUTHOR_ID:DISPLAY NAME`. Repeatable.
    #[arg(long = "token", value_name = "TOKEN=AUTHOR_ID:DISPLAY NAME")]
    pub tokens: Vec<String>,

    /// Broadcast buffer size.
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}
