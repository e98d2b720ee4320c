//! Single-command upload: `ssh <host> <filename> < <filepath>`
//!
//! The command names the file, stdin carries its contents, stdout gets the
//! download link and stderr gets everything else.

use std::io;

use tokio::io::AsyncRead;
use tracing::{debug, info};
use trisend_common::TransferMetadata;
use trisend_common::time::format_remaining;
use trisend_common::validators::{DisplayFilename, parse_display_filename};

use super::archive::{single_entry_archive, stream_archive};
use super::error::TransferError;
use super::handoff::{Handoff, ResponseSink};
use super::output::SessionOutput;
use super::registry::RegistrationGuard;
use super::staging::StagingFile;
use super::{EXIT_SUCCESS, TransferContext, await_handoff, report_failure};
use crate::constants::{MSG_DELIVERED, MSG_LINK, MSG_WAITING};
use crate::identity::Identity;

/// Run one exec upload to completion and return its exit status
///
/// `identity` is `None` when the key that authenticated the connection
/// belongs to no account.
pub async fn run_exec<R, O>(
    ctx: &TransferContext,
    identity: Option<&Identity>,
    command: &str,
    input: R,
    output: &O,
) -> u32
where
    R: AsyncRead + Unpin + Send,
    O: SessionOutput + ?Sized,
{
    match exec_upload(ctx, identity, command, input, output).await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => report_failure(output, &e).await,
    }
}

async fn exec_upload<R, O>(
    ctx: &TransferContext,
    identity: Option<&Identity>,
    command: &str,
    input: R,
    output: &O,
) -> Result<(), TransferError>
where
    R: AsyncRead + Unpin + Send,
    O: SessionOutput + ?Sized,
{
    let identity = identity.ok_or(TransferError::Authorization)?;
    let filename = parse_display_filename(command).map_err(|_| TransferError::Usage)?;
    let staging = StagingFile::new().await?;

    let expires_at = ctx.expires_at();
    let (id, handoff_rx) = ctx.registry.register_new(TransferMetadata {
        owner_display_name: identity.username.clone(),
        owner_avatar: identity.avatar.clone(),
        display_filename: filename.stem.clone(),
        expires_at,
    });
    let _registration = RegistrationGuard::new(ctx.registry.clone(), id.clone());
    info!(transfer_id = %id, user = %identity.username, file = %filename.name, "exec upload waiting");

    output
        .stdout(&format!("{}{}\n", MSG_LINK, ctx.landing_url(&id)))
        .await;
    output
        .stderr(&format!(
            "{}{}\n",
            MSG_WAITING,
            format_remaining(ctx.settings.timeout)
        ))
        .await;

    let Handoff { mut sink, signal } = await_handoff(handoff_rx, expires_at).await?;
    debug!(transfer_id = %id, "downloader attached");

    match deliver(ctx, staging, input, &filename, &mut sink).await {
        Ok(sent) => {
            signal.complete();
            info!(transfer_id = %id, bytes = sent, "exec upload delivered");
            output
                .stderr(&format!("{}{}\n", MSG_DELIVERED, filename.name))
                .await;
            Ok(())
        }
        Err(e) => {
            signal.fail(e.to_failure());
            Err(e)
        }
    }
}

/// Stage stdin, archive it and stream the archive into the sink
///
/// Nothing reaches the sink until staging has finished under the ceiling.
async fn deliver<R>(
    ctx: &TransferContext,
    mut staging: StagingFile,
    input: R,
    filename: &DisplayFilename,
    sink: &mut ResponseSink,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin + Send,
{
    tokio::select! {
        result = staging.fill_from(input, ctx.settings.max_upload_bytes) => {
            result?;
        }
        _ = sink.closed() => return Err(TransferError::ConsumerGone),
    }

    let staged = staging.into_std().await?;
    let entry_name = filename.name.clone();
    let archive = tokio::task::spawn_blocking(move || single_entry_archive(&entry_name, staged))
        .await
        .map_err(io::Error::other)??;

    stream_archive(archive, &filename.stem, sink).await
}
