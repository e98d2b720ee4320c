//! User-facing messages and fixed values for the trisend daemon

// ========================================================================
// Startup Messages
// ========================================================================

pub const MSG_BANNER: &str = "trisendd v";
pub const MSG_DATABASE: &str = "Database: ";
pub const MSG_HOST_KEY: &str = "Host key: ";
pub const MSG_HOST_KEY_GENERATED: &str = "Generated new host key: ";
pub const MSG_HOST_KEY_FINGERPRINT: &str = "Host key fingerprint: SHA256:";
pub const MSG_SSH_LISTENING: &str = "SSH listening on ";
pub const MSG_HTTP_LISTENING: &str = "HTTP listening on ";
pub const MSG_PUBLIC_URL: &str = "Public URL: ";
pub const MSG_SHUTDOWN_RECEIVED: &str = "\nShutdown signal received, exiting...";

// ========================================================================
// Key Management Messages
// ========================================================================

pub const MSG_KEY_ADDED: &str = "Added key for ";
pub const MSG_KEY_REMOVED: &str = "Removed key ";
pub const MSG_KEY_NOT_FOUND: &str = "No account uses key ";
pub const MSG_NO_KEYS: &str = "No keys registered";

// ========================================================================
// Session Messages (written to the SSH channel)
// ========================================================================

/// Prefix of the download link printed to the uploader
pub const MSG_LINK: &str = "LINK: ";

/// Printed after the link for exec uploads
pub const MSG_WAITING: &str = "Waiting for a downloader, link expires in ";

/// Printed once the archive has been delivered
pub const MSG_DELIVERED: &str = "Delivered ";

// ========================================================================
// Session Errors (written to the SSH channel's stderr)
// ========================================================================

pub const ERR_NO_ACCOUNT: &str = "No account found for this SSH key. Create an account first.";
pub const ERR_USAGE: &str = "usage: ssh <host> <filename> < <filepath>";
pub const ERR_LIMIT_REACHED: &str = "Limit reached: ";
pub const ERR_EXPIRED: &str = "Transfer expired: nobody downloaded the file in time";
pub const ERR_TRANSPORT: &str = "Transfer failed: ";
pub const ERR_UNSUPPORTED: &str = "Operation not supported";
pub const ERR_CONSUMER_GONE: &str = "Transfer failed: the downloader disconnected";
pub const ERR_SHELL_UNSUPPORTED: &str =
    "Interactive shells are not supported. usage: ssh <host> <filename> < <filepath>";

// ========================================================================
// Daemon Errors (printed to the terminal)
// ========================================================================

pub const ERR_GENERIC: &str = "Error: ";
pub const ERR_DATABASE_INIT: &str = "Failed to initialize database: ";
pub const ERR_HOST_KEY: &str = "Failed to load host key: ";
pub const ERR_BANNER: &str = "Failed to read banner file: ";
pub const ERR_BIND_FAILED: &str = "Failed to bind to ";
pub const ERR_CONNECTION_LIMIT: &str = "Connection limit reached for ";
pub const ERR_ACCEPT: &str = "Failed to accept connection: ";
pub const ERR_CONNECTION: &str = "Connection error from ";
pub const ERR_HTTP_SERVER: &str = "HTTP server error: ";
pub const ERR_READ_METADATA: &str = "Failed to read file metadata: ";
pub const ERR_SET_PERMISSIONS: &str = "Failed to set file permissions: ";
pub const ERR_EMPTY_USERNAME: &str = "Username must not be empty";
pub const ERR_READ_PUBLIC_KEY: &str = "Failed to read public key: ";
pub const ERR_PARSE_PUBLIC_KEY: &str = "Failed to parse public key: ";
pub const ERR_SIGNAL_SIGTERM: &str = "Failed to setup SIGTERM handler";
pub const ERR_SIGNAL_SIGINT: &str = "Failed to setup SIGINT handler";
pub const ERR_SIGNAL_CTRLC: &str = "Failed to listen for Ctrl+C";

// ========================================================================
// Fixed Values
// ========================================================================

/// Host key filename inside the data directory
pub const HOST_KEY_FILENAME: &str = "host_ed25519";

/// Database filename inside the data directory
pub const DATABASE_FILENAME: &str = "trisend.db";

/// Data directory name under the platform data dir
pub const DATA_DIR_NAME: &str = "trisendd";

/// Name of the only SSH subsystem served
pub const SFTP_SUBSYSTEM: &str = "sftp";

/// How often the registry is swept for expired entries
pub const REGISTRY_SWEEP_INTERVAL_SECS: u64 = 30;

/// Default cap on concurrent SSH connections from one address
pub const DEFAULT_MAX_CONNECTIONS_PER_IP: usize = 10;

/// Bytes per megabyte, for limit messages
pub const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;
