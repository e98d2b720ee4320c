//! Per-connection SSH handler

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId};
use russh_keys::key::PublicKey;
use tracing::{debug, info};

use super::channel::{ChannelOutput, StdinForward};
use crate::constants::{ERR_SHELL_UNSUPPORTED, SFTP_SUBSYSTEM};
use crate::identity::{Identity, IdentityLookup, fingerprint};
use crate::transfers::{
    EXIT_FAILURE, SessionOutput, TransferContext, report_failure, run_exec, sftp_session,
};

/// State of one SSH connection
///
/// Any public key is accepted so that a sender without an account gets a
/// readable error on the channel instead of a bare authentication failure.
pub struct SshSession {
    peer_addr: SocketAddr,
    ctx: TransferContext,
    identities: Arc<dyn IdentityLookup>,
    identity: Option<Identity>,
    /// Channels opened but not yet bound to an exec or subsystem request
    channels: HashMap<ChannelId, Channel<Msg>>,
    /// Stdin forwarders of running exec uploads
    stdin: HashMap<ChannelId, StdinForward>,
}

impl SshSession {
    pub fn new(
        peer_addr: SocketAddr,
        ctx: TransferContext,
        identities: Arc<dyn IdentityLookup>,
    ) -> Self {
        Self {
            peer_addr,
            ctx,
            identities,
            identity: None,
            channels: HashMap::new(),
            stdin: HashMap::new(),
        }
    }
}

#[async_trait]
impl Handler for SshSession {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let fingerprint = fingerprint(public_key);
        self.identity = self.identities.lookup_by_fingerprint(&fingerprint).await;

        match &self.identity {
            Some(identity) => {
                info!(peer = %self.peer_addr, user = %identity.username, "authenticated")
            }
            None => {
                debug!(peer = %self.peer_addr, ssh_user = user, %fingerprint, "key has no account")
            }
        }
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        // Stdin arrives through `data`; the channel's own queue would only
        // buffer a second copy
        self.channels.remove(&channel);

        let command = String::from_utf8_lossy(data).into_owned();
        debug!(peer = %self.peer_addr, %command, "exec request");

        let (forward, reader) = StdinForward::new(self.ctx.settings.max_upload_bytes);
        self.stdin.insert(channel, forward);
        session.channel_success(channel);

        let ctx = self.ctx.clone();
        let identity = self.identity.clone();
        let output = ChannelOutput::new(session.handle(), channel);
        tokio::spawn(async move {
            let status = run_exec(&ctx, identity.as_ref(), &command, reader, &output).await;
            output.finish(status).await;
        });
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name != SFTP_SUBSYSTEM {
            debug!(peer = %self.peer_addr, subsystem = name, "unsupported subsystem");
            session.channel_failure(channel_id);
            return Ok(());
        }
        let Some(channel) = self.channels.remove(&channel_id) else {
            session.channel_failure(channel_id);
            return Ok(());
        };
        session.channel_success(channel_id);

        let output = Arc::new(ChannelOutput::new(session.handle(), channel_id));
        match sftp_session(self.ctx.clone(), self.identity.clone(), output.clone()) {
            Ok((handler, finisher)) => {
                debug!(peer = %self.peer_addr, "sftp session");
                russh_sftp::server::run(channel.into_stream(), handler).await;
                tokio::spawn(async move {
                    let status = finisher.finish().await;
                    output.finish(status).await;
                });
            }
            Err(e) => {
                tokio::spawn(async move {
                    let status = report_failure(output.as_ref(), &e).await;
                    output.finish(status).await;
                });
            }
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        session.channel_success(channel);

        let output = ChannelOutput::new(session.handle(), channel);
        tokio::spawn(async move {
            output.stderr(&format!("{}\r\n", ERR_SHELL_UNSUPPORTED)).await;
            output.finish(EXIT_FAILURE).await;
        });
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(forward) = self.stdin.get_mut(&channel) {
            forward.push(data);
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(mut forward) = self.stdin.remove(&channel) {
            forward.close();
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        self.stdin.remove(&channel);
        Ok(())
    }
}
