//! Zip packaging of staged uploads
//!
//! A zip writer needs to seek back over entry headers, so archives are built
//! in an anonymous temp file and streamed to the downloader once finished.
//! All `ArchiveWriter` methods block and are meant for `spawn_blocking`.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::error::TransferError;
use super::handoff::{ResponseSink, STREAM_CHUNK_SIZE};

/// Content type of every served archive
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// Disposition used when the display filename cannot appear in a header
const FALLBACK_DISPOSITION: &str = "attachment; filename=\"download.zip\"";

/// Zip archive under construction in a temp file
pub struct ArchiveWriter {
    zip: ZipWriter<File>,
    entries: usize,
}

impl ArchiveWriter {
    /// Start a new empty archive
    pub fn new() -> io::Result<Self> {
        let file = tempfile::tempfile()?;
        Ok(Self {
            zip: ZipWriter::new(file),
            entries: 0,
        })
    }

    fn options() -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
    }

    /// Add a directory entry (`name` without trailing slash)
    pub fn add_directory(&mut self, name: &str) -> io::Result<()> {
        self.zip
            .add_directory(name, Self::options())
            .map_err(io::Error::other)?;
        self.entries += 1;
        Ok(())
    }

    /// Add a file entry with the contents of `source`
    pub fn add_file<R: Read>(&mut self, name: &str, source: &mut R) -> io::Result<u64> {
        self.zip
            .start_file(name, Self::options())
            .map_err(io::Error::other)?;
        let written = io::copy(source, &mut self.zip)?;
        self.entries += 1;
        Ok(written)
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// Write the central directory and return the archive, rewound
    pub fn finish(self) -> io::Result<File> {
        let mut file = self.zip.finish().map_err(io::Error::other)?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }
}

/// Build an archive holding one entry named `entry_name` from `staged`
pub fn single_entry_archive(entry_name: &str, mut staged: File) -> io::Result<File> {
    let mut archive = ArchiveWriter::new()?;
    archive.add_file(entry_name, &mut staged)?;
    archive.finish()
}

/// Response headers announcing `<display_filename>.zip` of `length` bytes
pub fn archive_headers(display_filename: &str, length: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(ARCHIVE_CONTENT_TYPE));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(CONTENT_DISPOSITION, content_disposition(display_filename));
    headers
}

/// `attachment; filename="<name>.zip"`, with quoting characters replaced
fn content_disposition(display_filename: &str) -> HeaderValue {
    let name: String = display_filename
        .chars()
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    let value = format!("attachment; filename=\"{name}.zip\"");

    HeaderValue::from_bytes(value.as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_DISPOSITION))
}

/// Write the archive head and stream the whole archive into `sink`
///
/// Returns the number of body bytes sent. If the read side fails midway the
/// body is aborted so the downloader never mistakes a truncated archive for
/// a complete one.
pub async fn stream_archive(
    archive: File,
    display_filename: &str,
    sink: &mut ResponseSink,
) -> Result<u64, TransferError> {
    let length = archive.metadata()?.len();
    sink.send_head(archive_headers(display_filename, length))?;

    let mut file = tokio::fs::File::from_std(archive);
    let mut sent = 0u64;
    loop {
        let mut buf = BytesMut::with_capacity(STREAM_CHUNK_SIZE);
        let read = match file.read_buf(&mut buf).await {
            Ok(read) => read,
            Err(e) => {
                sink.abort(&e.to_string()).await;
                return Err(e.into());
            }
        };
        if read == 0 {
            break;
        }
        sent += read as u64;
        sink.send_chunk(buf.freeze()).await?;
    }
    Ok(sent)
}

impl std::fmt::Debug for ArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWriter")
            .field("entries", &self.entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfers::handoff::Handoff;
    use std::io::{Cursor, Write};
    use zip::ZipArchive;

    fn staged(contents: &[u8]) -> File {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(contents).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file
    }

    fn read_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            entries.push((entry.name().to_string(), data));
        }
        entries
    }

    #[test]
    fn test_single_entry_archive() {
        let mut archive = single_entry_archive("report.pdf", staged(b"0123456789")).unwrap();
        let mut bytes = Vec::new();
        archive.read_to_end(&mut bytes).unwrap();

        let entries = read_entries(&bytes);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "report.pdf");
        assert_eq!(entries[0].1, b"0123456789");
    }

    #[test]
    fn test_multi_entry_archive() {
        let mut writer = ArchiveWriter::new().unwrap();
        writer.add_directory("photos").unwrap();
        writer
            .add_file("photos/a.jpg", &mut Cursor::new(b"aaa".to_vec()))
            .unwrap();
        writer
            .add_file("photos/b.jpg", &mut Cursor::new(b"bb".to_vec()))
            .unwrap();
        assert_eq!(writer.entry_count(), 3);

        let mut bytes = Vec::new();
        writer.finish().unwrap().read_to_end(&mut bytes).unwrap();

        let entries = read_entries(&bytes);
        let files: Vec<_> = entries.iter().filter(|(_, data)| !data.is_empty()).collect();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, "photos/a.jpg");
        assert_eq!(files[0].1, b"aaa");
        assert_eq!(files[1].0, "photos/b.jpg");
    }

    #[test]
    fn test_empty_entry() {
        let mut archive = single_entry_archive("empty.txt", staged(b"")).unwrap();
        let mut bytes = Vec::new();
        archive.read_to_end(&mut bytes).unwrap();

        let entries = read_entries(&bytes);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].1.is_empty());
    }

    #[test]
    fn test_archive_headers() {
        let headers = archive_headers("report", 42);
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/zip");
        assert_eq!(headers.get(CONTENT_LENGTH).unwrap(), "42");
        assert_eq!(
            headers.get(CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"report.zip\""
        );
    }

    #[test]
    fn test_content_disposition_escapes_quotes() {
        let headers = archive_headers("we\"ird\\name", 1);
        assert_eq!(
            headers.get(CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"we_ird_name.zip\""
        );
    }

    #[tokio::test]
    async fn test_stream_archive_delivers_bytes() {
        let contents: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let archive = staged(&contents);

        let (mut handoff, mut consumer) = Handoff::pair();
        let reader = tokio::spawn(async move {
            let head = consumer.head_rx.await.unwrap();
            let mut body = Vec::new();
            while let Some(chunk) = consumer.body_rx.recv().await {
                body.extend_from_slice(&chunk.unwrap());
            }
            (head, body)
        });

        let sent = stream_archive(archive, "data", &mut handoff.sink)
            .await
            .unwrap();
        drop(handoff);

        let (head, body) = reader.await.unwrap();
        assert_eq!(sent, contents.len() as u64);
        assert_eq!(body, contents);
        assert_eq!(
            head.get(CONTENT_LENGTH).unwrap(),
            contents.len().to_string().as_str()
        );
    }

    #[tokio::test]
    async fn test_stream_archive_consumer_gone() {
        let archive = staged(b"abc");
        let (mut handoff, consumer) = Handoff::pair();
        drop(consumer);

        let result = stream_archive(archive, "data", &mut handoff.sink).await;
        assert!(matches!(result, Err(TransferError::ConsumerGone)));
    }
}
