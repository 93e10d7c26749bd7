//! Byte sources with a size fixed at open time.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::fs::File;
use tokio::io::{AsyncRead, ReadBuf};

use crate::{AsyncSeekStart, ByteSource};

/// A reader paired with the byte size it had when it was opened.
///
/// Range math is done against this snapshot, so a response stays internally
/// consistent even if the underlying file changes between requests.
#[pin_project]
pub struct SizedSource<R = File> {
    size: u64,
    #[pin]
    inner: R,
}

impl SizedSource<File> {
    /// Opens `path` and snapshots its current length.
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let inner = File::open(path).await?;
        let size = inner.metadata().await?.len();
        Ok(SizedSource { size, inner })
    }
}

impl<R: AsyncRead + AsyncSeekStart> SizedSource<R> {
    /// Wraps a reader whose size is known externally.
    pub fn with_size(inner: R, size: u64) -> Self {
        SizedSource { size, inner }
    }
}

impl<R: AsyncRead + AsyncSeekStart> AsyncRead for SizedSource<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl<R: AsyncRead + AsyncSeekStart> AsyncSeekStart for SizedSource<R> {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        self.project().inner.start_seek(position)
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_complete(cx)
    }
}

impl<R: AsyncRead + AsyncSeekStart> ByteSource for SizedSource<R> {
    fn byte_size(&self) -> u64 {
        self.size
    }
}
