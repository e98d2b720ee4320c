//! SSH listener side: server configuration and connection handling
//!
//! Every connection authenticates with a public key and then runs either an
//! exec upload (`ssh host name < file`) or the SFTP subsystem. The transfer
//! logic itself lives in [`crate::transfers`]; this module only moves bytes
//! and exit statuses between russh and it.

mod channel;
mod session;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::MethodSet;
use russh::server::Config;
use russh_keys::key::KeyPair;
use tokio::net::TcpStream;

pub use channel::{ChannelOutput, ChannelReader, StdinForward};
pub use session::SshSession;

use crate::identity::IdentityLookup;
use crate::transfers::TransferContext;

/// Delay before answering a rejected authentication attempt
const AUTH_REJECTION_DELAY: Duration = Duration::from_secs(1);

/// Parameters for handling one SSH connection
pub struct ConnectionParams {
    pub peer_addr: SocketAddr,
    pub config: Arc<Config>,
    pub ctx: TransferContext,
    pub identities: Arc<dyn IdentityLookup>,
}

/// Build the russh server configuration
///
/// `banner` is shown to clients before authentication.
pub fn server_config(host_key: KeyPair, banner: Option<String>) -> Config {
    Config {
        methods: MethodSet::PUBLICKEY,
        auth_rejection_time: AUTH_REJECTION_DELAY,
        // The banner lives for the whole process
        auth_banner: banner.map(|banner| &*Box::leak(banner.into_boxed_str())),
        keys: vec![host_key],
        ..Default::default()
    }
}

/// Run the SSH protocol on an accepted socket until the client disconnects
pub async fn handle_connection(
    socket: TcpStream,
    params: ConnectionParams,
) -> Result<(), russh::Error> {
    let ConnectionParams {
        peer_addr,
        config,
        ctx,
        identities,
    } = params;

    let _ = socket.set_nodelay(true);
    let handler = SshSession::new(peer_addr, ctx, identities);
    let session = russh::server::run_stream(config, socket, handler).await?;
    session.await
}
