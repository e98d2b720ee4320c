//! Staging of uploaded bytes
//!
//! Raw upload bytes land in an anonymous temp file before they are archived,
//! so nothing is sent to the downloader until the size ceiling check passes.
//! The file has no name on disk and disappears when the handle is dropped.

use std::io::SeekFrom;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use super::error::TransferError;

/// Ephemeral on-disk buffer for one upload
pub struct StagingFile {
    file: File,
    len: u64,
}

impl StagingFile {
    /// Allocate a new anonymous staging file
    pub async fn new() -> Result<Self, TransferError> {
        let file = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(std::io::Error::other)??;
        Ok(Self {
            file: File::from_std(file),
            len: 0,
        })
    }

    /// Number of bytes staged so far
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether nothing has been staged
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `reader` to the end of the staging file until EOF
    ///
    /// Reading stops at `ceiling` bytes. Reaching the ceiling counts as
    /// overflow, so the largest accepted upload is `ceiling - 1` bytes.
    pub async fn fill_from<R>(&mut self, reader: R, ceiling: u64) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let mut limited = reader.take(ceiling.saturating_sub(self.len));
        let copied = tokio::io::copy(&mut limited, &mut self.file).await?;
        self.len += copied;

        if self.len >= ceiling {
            return Err(TransferError::CapacityExceeded { limit: ceiling });
        }
        Ok(copied)
    }

    /// Write `data` at `offset`, as an SFTP write does
    ///
    /// Size limits are the caller's concern here since SFTP enforces one
    /// ceiling across every file of the session.
    pub async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), TransferError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;
        self.len = self.len.max(offset + data.len() as u64);
        Ok(())
    }

    /// Flush and rewind, handing back a blocking file for archiving
    pub async fn into_std(mut self) -> Result<std::fs::File, TransferError> {
        self.file.flush().await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(self.file.into_std().await)
    }
}
