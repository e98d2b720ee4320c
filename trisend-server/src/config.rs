//! Daemon configuration resolved from the command line

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::args::Args;
use crate::transfers::TransferSettings;

/// Default SSH port, omitted from the usage shown to senders
const STANDARD_SSH_PORT: u16 = 22;

/// Everything the daemon needs once arguments are parsed
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub http_port: u16,
    pub ssh_port: u16,
    /// `None` means the platform default
    pub host_key: Option<PathBuf>,
    /// `None` means the platform default
    pub database: Option<PathBuf>,
    pub banner: Option<PathBuf>,
    pub max_connections_per_ip: usize,
    pub debug: bool,
    pub transfer: TransferSettings,
}

impl Args {
    /// Resolve parsed arguments into the daemon configuration
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            http_port: self.http_port,
            ssh_port: self.ssh_port,
            host_key: self.host_key,
            database: self.database,
            banner: self.banner,
            max_connections_per_ip: self.max_connections_per_ip,
            debug: self.debug,
            transfer: TransferSettings {
                public_url: self.public_url.trim_end_matches('/').to_string(),
                max_upload_bytes: self.max_upload_bytes,
                timeout: Duration::from_secs(self.transfer_timeout_secs),
            },
        }
    }
}

impl ServerConfig {
    pub fn ssh_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.ssh_port)
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.http_port)
    }

    /// What a sender types after `ssh`, e.g. `-p 2222 send.example.com`
    ///
    /// The host is taken from the public URL, since that is the name
    /// senders already know the service by.
    pub fn ssh_target(&self) -> String {
        let host = public_host(&self.transfer.public_url);
        if self.ssh_port == STANDARD_SSH_PORT {
            host.to_string()
        } else {
            format!("-p {} {}", self.ssh_port, host)
        }
    }
}

/// Host part of a URL, without scheme, port or path
fn public_host(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

    // Bracketed IPv6 literal keeps its brackets but loses the port
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        };
    }
    authority.split(':').next().unwrap_or(authority)
}
