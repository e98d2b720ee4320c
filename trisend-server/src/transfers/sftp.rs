//! Multi-file upload over the SFTP subsystem
//!
//! The session stays idle until the first file is opened for writing. That
//! open registers the transfer, prints the link and blocks until a
//! downloader attaches (or the transfer expires). From then on every closed
//! file and every created directory becomes an entry of one zip archive,
//! which is streamed to the downloader once the client ends the session.
//!
//! The protocol loop and the code that delivers the archive run on
//! different tasks. [`SftpHandler`] is moved into the loop; [`SftpFinisher`]
//! waits for the loop to end (or for the handler to abort it) and then
//! reports how the session went.

use std::collections::{HashMap, HashSet};
use std::io;
use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use russh_sftp::protocol::{
    Attrs, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use russh_sftp::server::Handler;
use tokio::sync::{Mutex, Notify, oneshot};
use tracing::{debug, info, warn};
use trisend_common::time::format_remaining;
use trisend_common::validators::{EntryPathError, base_name, file_stem, sanitize_entry_path};
use trisend_common::{TransferId, TransferMetadata};

use super::archive::{ArchiveWriter, stream_archive};
use super::error::TransferError;
use super::handoff::{Handoff, OutcomeSignal, ResponseSink};
use super::output::SessionOutput;
use super::registry::RegistrationGuard;
use super::staging::StagingFile;
use super::{EXIT_SUCCESS, TransferContext, await_handoff, report_failure};
use crate::constants::{MSG_DELIVERED, MSG_LINK, MSG_WAITING};
use crate::identity::Identity;

/// Permission bits reported for directories
const DIRECTORY_MODE: u32 = 0o040755;

/// Permission bits reported for files being uploaded
const FILE_MODE: u32 = 0o100644;

// ========================================================================
// Session State
// ========================================================================

/// Where the SFTP session is in its lifecycle
enum Phase {
    /// No file opened for writing yet
    Idle,
    /// Registered, waiting for a downloader
    Waiting,
    /// A downloader is attached and files are being collected
    Paired(Box<Pairing>),
    /// Nobody downloaded in time
    Expired,
    /// Upload aborted; the downloader (if any) was already told
    Failed(TransferError),
    /// Outcome already taken by the finisher
    Finished,
}

/// Everything an attached transfer needs until the archive is delivered
struct Pairing {
    id: TransferId,
    display_filename: String,
    sink: ResponseSink,
    signal: OutcomeSignal,
    /// `None` only while an entry is being appended on a blocking thread
    archive: Option<ArchiveWriter>,
    /// Bytes written across every file of the session
    total: u64,
    _registration: RegistrationGuard,
}

/// State shared by the protocol handler and the finisher
struct SftpUpload {
    phase: Phase,
    /// First directory the client created; names the download
    first_directory: Option<String>,
    /// Directories created so far, as archive entry paths
    directories: HashSet<String>,
}

impl SftpUpload {
    /// Move to `Failed`, failing the attached downloader if there is one
    fn fail(&mut self, error: TransferError) {
        if let Phase::Paired(pairing) = mem::replace(&mut self.phase, Phase::Finished) {
            pairing.signal.fail(error.to_failure());
        }
        self.phase = Phase::Failed(error);
    }

    fn pairing_mut(&mut self) -> Option<&mut Pairing> {
        match &mut self.phase {
            Phase::Paired(pairing) => Some(pairing),
            _ => None,
        }
    }
}

/// A file opened for writing
struct OpenFile {
    entry_name: String,
    staging: StagingFile,
}

// ========================================================================
// Session Setup
// ========================================================================

/// Build the protocol handler and its finisher for one SFTP session
///
/// Fails with `Authorization` when the connecting key has no account; the
/// caller reports that and closes the channel without starting the loop.
pub fn sftp_session<O>(
    ctx: TransferContext,
    identity: Option<Identity>,
    output: Arc<O>,
) -> Result<(SftpHandler<O>, SftpFinisher<O>), TransferError>
where
    O: SessionOutput + 'static,
{
    let identity = identity.ok_or(TransferError::Authorization)?;

    let upload = Arc::new(Mutex::new(SftpUpload {
        phase: Phase::Idle,
        first_directory: None,
        directories: HashSet::new(),
    }));
    let abort = Arc::new(Notify::new());
    let (loop_alive, loop_ended) = oneshot::channel();

    let handler = SftpHandler {
        ctx,
        identity,
        output: output.clone(),
        upload: upload.clone(),
        open_files: HashMap::new(),
        next_handle: 0,
        abort: abort.clone(),
        _loop_alive: loop_alive,
    };
    let finisher = SftpFinisher {
        upload,
        output,
        abort,
        loop_ended,
    };
    Ok((handler, finisher))
}

// ========================================================================
// Protocol Handler
// ========================================================================

/// SFTP request handler accepting uploads only
pub struct SftpHandler<O: SessionOutput + 'static> {
    ctx: TransferContext,
    identity: Identity,
    output: Arc<O>,
    upload: Arc<Mutex<SftpUpload>>,
    open_files: HashMap<String, OpenFile>,
    next_handle: u64,
    abort: Arc<Notify>,
    /// Dropped together with the handler when the protocol loop ends
    _loop_alive: oneshot::Sender<()>,
}

impl<O: SessionOutput + 'static> SftpHandler<O> {
    /// Fail the upload and wake the finisher
    fn abort_with(&self, upload: &mut SftpUpload, error: TransferError) -> StatusCode {
        debug!(kind = %error.kind(), "sftp upload aborted: {}", error);
        upload.fail(error);
        self.abort.notify_one();
        StatusCode::Failure
    }

    /// Register and wait for a downloader, once per session
    ///
    /// Runs with the state lock held, so only the first write can register
    /// and later opens see the outcome.
    async fn ensure_paired(
        &self,
        upload: &mut SftpUpload,
        first_entry: &str,
    ) -> Result<(), StatusCode> {
        match upload.phase {
            Phase::Paired(_) => return Ok(()),
            Phase::Idle => {}
            _ => return Err(StatusCode::Failure),
        }

        let display_filename = match &upload.first_directory {
            Some(directory) => base_name(directory).to_string(),
            None => {
                let name = base_name(first_entry);
                match file_stem(name) {
                    "" => name.to_string(),
                    stem => stem.to_string(),
                }
            }
        };

        let expires_at = self.ctx.expires_at();
        let (id, handoff_rx) = self.ctx.registry.register_new(TransferMetadata {
            owner_display_name: self.identity.username.clone(),
            owner_avatar: self.identity.avatar.clone(),
            display_filename: display_filename.clone(),
            expires_at,
        });
        let registration = RegistrationGuard::new(self.ctx.registry.clone(), id.clone());
        upload.phase = Phase::Waiting;
        info!(transfer_id = %id, user = %self.identity.username, file = %display_filename, "sftp upload waiting");

        self.output
            .stderr(&format!(
                "{}{}\n{}{}\n",
                MSG_LINK,
                self.ctx.landing_url(&id),
                MSG_WAITING,
                format_remaining(self.ctx.settings.timeout)
            ))
            .await;

        let Handoff { sink, signal } = match await_handoff(handoff_rx, expires_at).await {
            Ok(handoff) => handoff,
            Err(TransferError::RendezvousTimeout) => {
                debug!(transfer_id = %id, "sftp upload expired");
                upload.phase = Phase::Expired;
                self.abort.notify_one();
                return Err(StatusCode::Failure);
            }
            Err(e) => return Err(self.abort_with(upload, e)),
        };
        debug!(transfer_id = %id, "downloader attached");

        let mut directories: Vec<String> = upload.directories.iter().cloned().collect();
        directories.sort();
        let archive = tokio::task::spawn_blocking(move || {
            let mut archive = ArchiveWriter::new()?;
            for directory in &directories {
                archive.add_directory(directory)?;
            }
            Ok::<_, io::Error>(archive)
        })
        .await
        .map_err(io::Error::other)
        .and_then(std::convert::identity);

        let archive = match archive {
            Ok(archive) => archive,
            Err(e) => {
                let error = TransferError::from(e);
                signal.fail(error.to_failure());
                return Err(self.abort_with(upload, error));
            }
        };

        upload.phase = Phase::Paired(Box::new(Pairing {
            id,
            display_filename,
            sink,
            signal,
            archive: Some(archive),
            total: 0,
            _registration: registration,
        }));
        Ok(())
    }

    /// Append a closed file to the archive
    async fn append_entry(
        &self,
        upload: &mut SftpUpload,
        file: OpenFile,
    ) -> Result<(), TransferError> {
        let pairing = upload.pairing_mut().ok_or(TransferError::Unsupported)?;
        let mut archive = pairing
            .archive
            .take()
            .ok_or_else(|| io::Error::other("archive unavailable"))?;
        let mut staged = file.staging.into_std().await?;
        let entry_name = file.entry_name;

        let (archive, result) = tokio::task::spawn_blocking(move || {
            let result = archive.add_file(&entry_name, &mut staged);
            (archive, result)
        })
        .await
        .map_err(io::Error::other)?;

        pairing.archive = Some(archive);
        result?;
        Ok(())
    }

    fn status_ok(id: u32) -> Status {
        Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "Ok".to_string(),
            language_tag: "en-US".to_string(),
        }
    }

    fn directory_attrs() -> FileAttributes {
        FileAttributes {
            permissions: Some(DIRECTORY_MODE),
            ..FileAttributes::default()
        }
    }
}

#[async_trait]
impl<O: SessionOutput + 'static> Handler for SftpHandler<O> {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        debug!(version, user = %self.identity.username, "sftp session started");
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        if !pflags.contains(OpenFlags::WRITE) {
            return Err(StatusCode::OpUnsupported);
        }
        let entry_name = sanitize_entry_path(&filename).map_err(|_| StatusCode::Failure)?;

        let upload = self.upload.clone();
        let mut state = upload.lock().await;
        self.ensure_paired(&mut state, &entry_name).await?;

        let staging = match StagingFile::new().await {
            Ok(staging) => staging,
            Err(e) => return Err(self.abort_with(&mut state, e)),
        };

        self.next_handle += 1;
        let handle = self.next_handle.to_string();
        self.open_files.insert(
            handle.clone(),
            OpenFile {
                entry_name,
                staging,
            },
        );
        Ok(Handle { id, handle })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        if !self.open_files.contains_key(&handle) {
            return Err(StatusCode::Failure);
        }

        let upload = self.upload.clone();
        let mut state = upload.lock().await;
        let ceiling = self.ctx.settings.max_upload_bytes;

        let Some(pairing) = state.pairing_mut() else {
            return Err(StatusCode::Failure);
        };
        let total = pairing.total + data.len() as u64;
        if total >= ceiling {
            return Err(self.abort_with(
                &mut state,
                TransferError::CapacityExceeded { limit: ceiling },
            ));
        }
        if pairing.sink.is_closed() {
            return Err(self.abort_with(&mut state, TransferError::ConsumerGone));
        }

        let Some(file) = self.open_files.get_mut(&handle) else {
            return Err(StatusCode::Failure);
        };
        if let Err(e) = file.staging.write_at(offset, &data).await {
            return Err(self.abort_with(&mut state, e));
        }

        // Only bytes actually staged count toward the ceiling
        if let Some(pairing) = state.pairing_mut() {
            pairing.total = total;
        }
        Ok(Self::status_ok(id))
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        let Some(file) = self.open_files.remove(&handle) else {
            return Err(StatusCode::Failure);
        };

        let upload = self.upload.clone();
        let mut state = upload.lock().await;
        let entry_name = file.entry_name.clone();
        let len = file.staging.len();
        if let Err(e) = self.append_entry(&mut state, file).await {
            return Err(self.abort_with(&mut state, e));
        }

        if let Some(pairing) = state.pairing_mut() {
            debug!(transfer_id = %pairing.id, entry = %entry_name, bytes = len, "archived file");
        }
        Ok(Self::status_ok(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let directory = sanitize_entry_path(&path).map_err(|_| StatusCode::Failure)?;

        let upload = self.upload.clone();
        let mut state = upload.lock().await;
        if !state.directories.insert(directory.clone()) {
            return Ok(Self::status_ok(id));
        }
        if state.first_directory.is_none() {
            state.first_directory = Some(directory.clone());
        }

        // Directories created before pairing are added when the archive starts
        let Some(pairing) = state.pairing_mut() else {
            return Ok(Self::status_ok(id));
        };
        let Some(mut archive) = pairing.archive.take() else {
            return Err(StatusCode::Failure);
        };
        let joined = tokio::task::spawn_blocking(move || {
            let result = archive.add_directory(&directory);
            (archive, result)
        })
        .await;

        match joined {
            Ok((archive, result)) => {
                pairing.archive = Some(archive);
                match result {
                    Ok(()) => Ok(Self::status_ok(id)),
                    Err(e) => Err(self.abort_with(&mut state, e.into())),
                }
            }
            Err(e) => Err(self.abort_with(&mut state, io::Error::other(e).into())),
        }
    }

    async fn setstat(
        &mut self,
        id: u32,
        _path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        Ok(Self::status_ok(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        _handle: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        Ok(Self::status_ok(id))
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let resolved = match sanitize_entry_path(&path) {
            Ok(relative) => format!("/{relative}"),
            Err(EntryPathError::Empty) => "/".to_string(),
            Err(_) => return Err(StatusCode::NoSuchFile),
        };
        Ok(Name {
            id,
            files: vec![File {
                filename: resolved.clone(),
                longname: resolved,
                attrs: FileAttributes::default(),
            }],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let exists = match sanitize_entry_path(&path) {
            Err(EntryPathError::Empty) => true,
            Ok(directory) => self.upload.lock().await.directories.contains(&directory),
            Err(_) => false,
        };
        if !exists {
            return Err(StatusCode::NoSuchFile);
        }
        Ok(Attrs {
            id,
            attrs: Self::directory_attrs(),
        })
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        self.stat(id, path).await
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let file = self.open_files.get(&handle).ok_or(StatusCode::NoSuchFile)?;
        Ok(Attrs {
            id,
            attrs: FileAttributes {
                size: Some(file.staging.len()),
                permissions: Some(FILE_MODE),
                ..FileAttributes::default()
            },
        })
    }
}

impl<O: SessionOutput + 'static> Drop for SftpHandler<O> {
    fn drop(&mut self) {
        if self.open_files.is_empty() {
            return;
        }
        // Loop ended with files still open: the client went away mid-upload
        if let Ok(mut state) = self.upload.try_lock() {
            if matches!(state.phase, Phase::Paired(_)) {
                warn!(open_files = self.open_files.len(), "sftp session ended mid-upload");
                state.fail(io::Error::other("upload interrupted").into());
            }
        }
    }
}

// ========================================================================
// Finisher
// ========================================================================

/// Reports the outcome of an SFTP session once its protocol loop is over
pub struct SftpFinisher<O: SessionOutput + 'static> {
    upload: Arc<Mutex<SftpUpload>>,
    output: Arc<O>,
    abort: Arc<Notify>,
    loop_ended: oneshot::Receiver<()>,
}

impl<O: SessionOutput + 'static> SftpFinisher<O> {
    /// Wait for the session to end, deliver the archive, return the exit status
    pub async fn finish(self) -> u32 {
        let Self {
            upload,
            output,
            abort,
            loop_ended,
        } = self;

        tokio::select! {
            _ = loop_ended => {}
            _ = abort.notified() => {}
        }

        let phase = mem::replace(&mut upload.lock().await.phase, Phase::Finished);
        match phase {
            Phase::Idle | Phase::Finished => {
                debug!("sftp session ended without uploads");
                EXIT_SUCCESS
            }
            Phase::Waiting | Phase::Expired => {
                report_failure(output.as_ref(), &TransferError::RendezvousTimeout).await
            }
            Phase::Failed(e) => report_failure(output.as_ref(), &e).await,
            Phase::Paired(pairing) => deliver(*pairing, output.as_ref()).await,
        }
    }
}

/// Finish the archive and stream it to the attached downloader
async fn deliver<O: SessionOutput + ?Sized>(pairing: Pairing, output: &O) -> u32 {
    let Pairing {
        id,
        display_filename,
        mut sink,
        signal,
        archive,
        total,
        _registration,
    } = pairing;

    let result: Result<u64, TransferError> = async {
        let archive = archive.ok_or_else(|| io::Error::other("archive unavailable"))?;
        let file = tokio::task::spawn_blocking(move || archive.finish())
            .await
            .map_err(io::Error::other)??;
        stream_archive(file, &display_filename, &mut sink).await
    }
    .await;

    match result {
        Ok(sent) => {
            signal.complete();
            info!(transfer_id = %id, bytes = total, archive_bytes = sent, "sftp upload delivered");
            output
                .stderr(&format!("{}{}\n", MSG_DELIVERED, display_filename))
                .await;
            EXIT_SUCCESS
        }
        Err(e) => {
            signal.fail(e.to_failure());
            report_failure(output, &e).await
        }
    }
}
