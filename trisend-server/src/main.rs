//! trisend daemon

use std::fs;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use russh_keys::key::KeyPair;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use trisend_server::args::{Args, Command, KeysAction};
use trisend_server::config::ServerConfig;
use trisend_server::connection_tracker::ConnectionTracker;
use trisend_server::constants::*;
use trisend_server::db::{self, Database};
use trisend_server::http;
use trisend_server::identity::{self, IdentityLookup};
use trisend_server::logging;
use trisend_server::ssh::{self, ConnectionParams};
use trisend_server::transfers::{TransferContext, TransferRegistry};

#[tokio::main]
async fn main() {
    let mut args = Args::parse();
    let command = args.command.take();
    let config = args.into_config();

    logging::init(config.debug);

    // Key management runs against the database and exits
    if let Some(Command::Keys { action }) = command {
        let database = setup_db(config.database.clone()).await;
        if let Err(e) = run_keys_command(&database, action).await {
            eprintln!("{}{}", ERR_GENERIC, e);
            std::process::exit(1);
        }
        return;
    }

    // Print banner first
    println!("{}{}", MSG_BANNER, env!("CARGO_PKG_VERSION"));

    let database = setup_db(config.database.clone()).await;
    let host_key = setup_host_key(config.host_key.clone());
    let banner = setup_banner(config.banner.as_deref());

    let (ssh_listener, http_listener) = setup_network(&config).await;
    println!("{}{}", MSG_PUBLIC_URL, config.transfer.public_url);

    // Shared state: one registry for both listeners
    let registry = Arc::new(TransferRegistry::new());
    let ctx = TransferContext::new(registry.clone(), config.transfer.clone());
    let identities: Arc<dyn IdentityLookup> = Arc::new(database.identities.clone());
    let ssh_config = Arc::new(ssh::server_config(host_key, banner));
    let app = http::router(ctx.clone(), &config.ssh_target());

    // Setup connection tracking for DoS protection
    let connection_tracker = ConnectionTracker::new(config.max_connections_per_ip);

    // Setup graceful shutdown handling
    let shutdown_signal = setup_shutdown_signal();

    tokio::select! {
        _ = shutdown_signal => {
            println!("{}", MSG_SHUTDOWN_RECEIVED);
        }
        // SSH accept loop
        _ = async {
            loop {
                match ssh_listener.accept().await {
                    Ok((socket, peer_addr)) => {
                        // Check connection limit before accepting
                        let Some(connection_guard) = connection_tracker.try_acquire(peer_addr.ip()) else {
                            debug!(peer = %peer_addr, "{}{}", ERR_CONNECTION_LIMIT, peer_addr.ip());
                            // Just drop the socket - client will see connection reset
                            continue;
                        };

                        let params = ConnectionParams {
                            peer_addr,
                            config: ssh_config.clone(),
                            ctx: ctx.clone(),
                            identities: identities.clone(),
                        };

                        tokio::spawn(async move {
                            // Hold guard until connection ends to track active connections
                            let _guard = connection_guard;

                            debug!(peer = %peer_addr, "ssh connection opened");
                            if let Err(e) = ssh::handle_connection(socket, params).await {
                                log_connection_error(&e, peer_addr);
                            }
                            debug!(peer = %peer_addr, "ssh connection closed");
                        });
                    }
                    Err(e) => {
                        eprintln!("{}{}", ERR_ACCEPT, e);
                    }
                }
            }
        } => {}
        // HTTP downloads
        result = axum::serve(http_listener, app).into_future() => {
            if let Err(e) = result {
                eprintln!("{}{}", ERR_HTTP_SERVER, e);
                std::process::exit(1);
            }
        }
        // Registry sweep: drops entries whose producer never cleaned up
        _ = async {
            let mut interval =
                tokio::time::interval(Duration::from_secs(REGISTRY_SWEEP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                let purged = registry.purge_expired();
                if purged > 0 {
                    debug!(purged, active = registry.active_count(), "swept expired transfers");
                }
            }
        } => {}
    }
}

async fn setup_db(database_path: Option<PathBuf>) -> Database {
    // Determine database path (use provided path or platform default)
    let db_path = database_path.unwrap_or_else(|| match db::default_database_path() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{}{}", ERR_GENERIC, e);
            std::process::exit(1);
        }
    });

    // Initialize database connection pool and run migrations
    let pool = match db::init_db(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("{}{}", ERR_DATABASE_INIT, e);
            std::process::exit(1);
        }
    };
    println!("{}{}", MSG_DATABASE, db_path.display());

    // Set secure permissions on database file (0o600) - Unix only
    #[cfg(unix)]
    if let Err(e) = set_secure_permissions(&db_path) {
        eprintln!("{}{}", ERR_GENERIC, e);
        std::process::exit(1);
    }

    Database::new(pool)
}

fn setup_host_key(host_key_path: Option<PathBuf>) -> KeyPair {
    let path = host_key_path.unwrap_or_else(|| match db::default_data_dir() {
        Ok(dir) => dir.join(HOST_KEY_FILENAME),
        Err(e) => {
            eprintln!("{}{}", ERR_GENERIC, e);
            std::process::exit(1);
        }
    });

    let key = match load_or_generate_host_key(&path) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("{}{}", ERR_HOST_KEY, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = display_host_key_fingerprint(&key) {
        eprintln!("{}{}", ERR_HOST_KEY, e);
        std::process::exit(1);
    }
    key
}

/// Load the existing host key or generate a new Ed25519 key
fn load_or_generate_host_key(path: &Path) -> Result<KeyPair, String> {
    if path.exists() {
        let key = russh_keys::load_secret_key(path, None).map_err(|e| e.to_string())?;
        println!("{}{}", MSG_HOST_KEY, path.display());
        return Ok(key);
    }

    let key = KeyPair::generate_ed25519()
        .ok_or_else(|| "Ed25519 key generation failed".to_string())?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let file = fs::File::create(path).map_err(|e| e.to_string())?;
    russh_keys::encode_pkcs8_pem(&key, file).map_err(|e| e.to_string())?;

    // Private key: owner read/write only
    #[cfg(unix)]
    set_secure_permissions(path)?;

    println!("{}{}", MSG_HOST_KEY_GENERATED, path.display());
    Ok(key)
}

fn display_host_key_fingerprint(key: &KeyPair) -> Result<(), String> {
    let public = key.clone_public_key().map_err(|e| e.to_string())?;
    println!("{}{}", MSG_HOST_KEY_FINGERPRINT, identity::fingerprint(&public));
    Ok(())
}

fn setup_banner(path: Option<&Path>) -> Option<String> {
    let path = path?;
    match fs::read_to_string(path) {
        Ok(banner) => Some(banner),
        Err(e) => {
            eprintln!("{}{}: {}", ERR_BANNER, path.display(), e);
            std::process::exit(1);
        }
    }
}

async fn setup_network(config: &ServerConfig) -> (TcpListener, TcpListener) {
    let ssh_listener = bind(config.ssh_addr()).await;
    println!("{}{}", MSG_SSH_LISTENING, config.ssh_addr());

    let http_listener = bind(config.http_addr()).await;
    println!("{}{}", MSG_HTTP_LISTENING, config.http_addr());

    (ssh_listener, http_listener)
}

async fn bind(addr: SocketAddr) -> TcpListener {
    match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("{}{}: {}", ERR_BIND_FAILED, addr, e);
            std::process::exit(1);
        }
    }
}

#[cfg(unix)]
fn set_secure_permissions(path: &Path) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|e| format!("{}{}", ERR_READ_METADATA, e))?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(0o600);
    fs::set_permissions(path, permissions).map_err(|e| format!("{}{}", ERR_SET_PERMISSIONS, e))?;
    Ok(())
}

fn log_connection_error(error: &russh::Error, peer_addr: SocketAddr) {
    match error {
        // Clients hanging up mid-handshake (scanners, aborted uploads)
        russh::Error::Disconnect | russh::Error::IO(_) => {
            debug!(error = %error, "{}{}", ERR_CONNECTION, peer_addr);
        }
        _ => warn!(error = %error, "{}{}", ERR_CONNECTION, peer_addr),
    }
}

// ========================================================================
// Key Management
// ========================================================================

async fn run_keys_command(database: &Database, action: KeysAction) -> Result<(), String> {
    match action {
        KeysAction::Add {
            username,
            public_key,
            avatar,
        } => {
            let username = username.trim();
            if username.is_empty() {
                return Err(ERR_EMPTY_USERNAME.to_string());
            }
            let fingerprint = read_key_fingerprint(&public_key)?;
            let record = database
                .identities
                .add_identity(&fingerprint, username, avatar.trim())
                .await
                .map_err(|e| e.to_string())?;
            info!(user = %record.username, fingerprint = %record.fingerprint, "key added");
            println!("{}{} (SHA256:{})", MSG_KEY_ADDED, record.username, record.fingerprint);
        }
        KeysAction::Remove { public_key } => {
            let fingerprint = read_key_fingerprint(&public_key)?;
            let removed = database
                .identities
                .remove_key(&fingerprint)
                .await
                .map_err(|e| e.to_string())?;
            if removed {
                println!("{}SHA256:{}", MSG_KEY_REMOVED, fingerprint);
            } else {
                return Err(format!("{}SHA256:{}", MSG_KEY_NOT_FOUND, fingerprint));
            }
        }
        KeysAction::List => {
            let records = database
                .identities
                .list_identities()
                .await
                .map_err(|e| e.to_string())?;
            if records.is_empty() {
                println!("{}", MSG_NO_KEYS);
            }
            for record in records {
                if record.avatar.is_empty() {
                    println!("{}\tSHA256:{}", record.username, record.fingerprint);
                } else {
                    println!(
                        "{}\tSHA256:{}\t{}",
                        record.username, record.fingerprint, record.avatar
                    );
                }
            }
        }
    }
    Ok(())
}

/// Fingerprint of the first key in an `authorized_keys`-style file
fn read_key_fingerprint(path: &Path) -> Result<String, String> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("{}{}: {}", ERR_READ_PUBLIC_KEY, path.display(), e))?;

    let line = contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .ok_or_else(|| format!("{}{}: empty file", ERR_READ_PUBLIC_KEY, path.display()))?;

    let key = identity::parse_authorized_key(line)?;
    Ok(identity::fingerprint(&key))
}

async fn setup_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate()).expect(ERR_SIGNAL_SIGTERM);
        let mut sigint = signal(SignalKind::interrupt()).expect(ERR_SIGNAL_SIGINT);

        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect(ERR_SIGNAL_CTRLC);
    }
}
