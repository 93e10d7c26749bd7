//! The catalog of files offered for download.
//!
//! Built once at startup and immutable afterwards; request handlers share it
//! behind an `Arc` and never need a lock.

use std::io;
use std::path::PathBuf;

use async_stream::try_stream;
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::ShareError;
use crate::file::SizedSource;
use crate::range::ByteRange;
use crate::stream::CHUNK_SIZE;

/// One shared file as exposed to fetchers.
///
/// `id` is the file's position in the share list; the listing endpoint hands
/// these ids out and the download path looks them back up.
#[derive(Debug, Clone, Serialize)]
pub struct SharedFile {
    pub id: usize,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(skip)]
    pub path: PathBuf,
}

/// Ordered, indexable collection of shared files.
#[derive(Debug, Default)]
pub struct FileCatalog {
    files: Vec<SharedFile>,
}

impl FileCatalog {
    /// Stats every path in the share list and records name, size, and media
    /// type. A missing or non-regular file fails startup, naming the path.
    pub async fn build(paths: &[PathBuf]) -> Result<Self, ShareError> {
        let mut files = Vec::with_capacity(paths.len());
        for (id, path) in paths.iter().enumerate() {
            let meta = tokio::fs::metadata(path).await.map_err(|e| {
                ShareError::Config(format!("cannot share {}: {e}", path.display()))
            })?;
            if !meta.is_file() {
                return Err(ShareError::Config(format!(
                    "{} is not a regular file",
                    path.display()
                )));
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_owned)
                .ok_or_else(|| {
                    ShareError::Config(format!("{} has no usable file name", path.display()))
                })?;
            let media_type = mime_guess::from_path(path)
                .first_or_octet_stream()
                .essence_str()
                .to_owned();
            files.push(SharedFile {
                id,
                name,
                size: meta.len(),
                media_type,
                path: path.clone(),
            });
        }
        Ok(FileCatalog { files })
    }

    /// Shared files in listing order.
    pub fn list(&self) -> &[SharedFile] {
        &self.files
    }

    pub fn get(&self, id: usize) -> Option<&SharedFile> {
        self.files.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Opens the file for one request, snapshotting its size.
    pub async fn open(&self, file: &SharedFile) -> io::Result<SizedSource> {
        SizedSource::open(&file.path).await
    }

    /// Chunked reader over one inclusive span of a shared file.
    ///
    /// Ends early if the file is shorter than the span claims.
    pub fn read_bytes(
        &self,
        file: &SharedFile,
        span: ByteRange,
    ) -> impl Stream<Item = io::Result<Bytes>> {
        let path = file.path.clone();
        try_stream! {
            let mut file = File::open(path).await?;
            file.seek(io::SeekFrom::Start(span.start)).await?;
            let mut remaining = span.len();
            while remaining > 0 {
                let want = remaining.min(CHUNK_SIZE as u64) as usize;
                let mut buf = BytesMut::zeroed(want);
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                buf.truncate(n);
                remaining -= n as u64;
                yield buf.freeze();
            }
        }
    }
}
