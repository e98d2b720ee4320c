//! Command-line argument parsing

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use trisend_common::{
    DEFAULT_HTTP_PORT, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_PUBLIC_URL, DEFAULT_SSH_PORT,
    DEFAULT_TRANSFER_TIMEOUT_SECS,
};

use crate::constants::DEFAULT_MAX_CONNECTIONS_PER_IP;

/// Get default database path help text for current platform
fn default_database_help() -> String {
    #[cfg(target_os = "linux")]
    return "Database file path (default: ~/.local/share/trisendd/trisend.db)".to_string();

    #[cfg(target_os = "macos")]
    return "Database file path (default: ~/Library/Application Support/trisendd/trisend.db)"
        .to_string();

    #[cfg(target_os = "windows")]
    return "Database file path (default: %APPDATA%\\trisendd\\trisend.db)".to_string();

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    return "Database file path (overrides platform default)".to_string();
}

/// Get default host key path help text for current platform
fn default_host_key_help() -> String {
    #[cfg(target_os = "linux")]
    return "SSH host key, generated if missing (default: ~/.local/share/trisendd/host_ed25519)"
        .to_string();

    #[cfg(target_os = "macos")]
    return "SSH host key, generated if missing \
            (default: ~/Library/Application Support/trisendd/host_ed25519)"
        .to_string();

    #[cfg(target_os = "windows")]
    return "SSH host key, generated if missing (default: %APPDATA%\\trisendd\\host_ed25519)"
        .to_string();

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    return "SSH host key, generated if missing (overrides platform default)".to_string();
}

/// trisend: pipe files over SSH, download them over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// IP address to bind both listeners to (IPv4 or IPv6)
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port for HTTP downloads
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Port for SSH and SFTP uploads
    #[arg(short = 'p', long, default_value_t = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,

    /// Base URL printed in download links
    #[arg(short = 'u', long, default_value = DEFAULT_PUBLIC_URL)]
    pub public_url: String,

    /// SSH host key path (overrides platform default)
    #[arg(short = 'k', long, help = default_host_key_help())]
    pub host_key: Option<PathBuf>,

    /// Database file path (overrides platform default)
    #[arg(short, long, help = default_database_help())]
    pub database: Option<PathBuf>,

    /// Upload size ceiling in bytes; reaching it fails the transfer
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub max_upload_bytes: u64,

    /// Seconds an upload waits for a downloader
    #[arg(long, default_value_t = DEFAULT_TRANSFER_TIMEOUT_SECS,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub transfer_timeout_secs: u64,

    /// Concurrent SSH connections allowed per IP address (0 = unlimited)
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS_PER_IP)]
    pub max_connections_per_ip: usize,

    /// File whose contents are shown to SSH clients before authentication
    #[arg(long)]
    pub banner: Option<PathBuf>,

    /// Enable debug logging (connections, pairing, per-transfer details)
    #[arg(long, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Maintenance commands run instead of the daemon
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Manage the SSH keys allowed to upload
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum KeysAction {
    /// Register a public key for an account
    Add {
        /// Account name shown to downloaders
        username: String,
        /// Public key file in authorized_keys format (e.g. ~/.ssh/id_ed25519.pub)
        public_key: PathBuf,
        /// Avatar URL shown on the landing page
        #[arg(long, default_value = "")]
        avatar: String,
    },
    /// Unregister a public key
    Remove {
        /// Public key file in authorized_keys format
        public_key: PathBuf,
    },
    /// List registered keys
    List,
}
