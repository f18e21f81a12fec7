//! Runtime configuration parsed from command-line flags with environment
//! variable fallbacks.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Backend service for a block-based note-taking app.
#[derive(Clone, Debug, Parser)]
#[command(name = "notehub", version)]
pub struct Config {
    /// Address to bind the HTTP listener on.
    #[arg(long, env = "NOTEHUB_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Directory where document records are persisted.
    #[arg(long, env = "NOTEHUB_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Shared secret for HS256 bearer tokens.
    #[arg(long, env = "NOTEHUB_JWT_SECRET", default_value = "insecure-dev-secret")]
    pub jwt_secret: String,

    /// JWKS endpoint of a hosted identity provider. When set, RS256 tokens
    /// are verified against it instead of the shared secret.
    #[arg(long, env = "NOTEHUB_JWKS_URL")]
    pub jwks_url: Option<String>,

    /// Also remove descendants when a document is deleted from the trash.
    /// Off by default: orphaned subtrees keep their records.
    #[arg(long, env = "NOTEHUB_CASCADE_ON_DELETE")]
    pub cascade_on_delete: bool,
}
