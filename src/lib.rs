//! # flyfile
//!
//! Shares a fixed set of local files over HTTP, with RFC 7233 byte range
//! support: single partial responses, `multipart/byteranges` bodies, and
//! `416` handling.
//!
//! The engine is three pure stages wired together by the request router:
//! [`parse_range_header`] turns the raw `Range` header into normalized
//! [`ByteRange`]s, [`resolve_ranges`] filters and coalesces them into a
//! [`RangeOutcome`], and [`FileResponse`] renders the outcome as a streaming
//! HTTP response. The stages have no shared state; each request runs them
//! from scratch.
//!
//! ```
//! use flyfile::{parse_range_header, resolve_ranges, RangeOutcome};
//!
//! let parsed = parse_range_header("bytes=0-99,200-249", 1000);
//! match resolve_ranges(parsed, 1000) {
//!     RangeOutcome::Partial { parts, multipart } => {
//!         assert_eq!(parts.len(), 2);
//!         assert!(multipart);
//!     }
//!     other => panic!("unexpected outcome: {other:?}"),
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod range;
pub mod response;
pub mod router;

mod file;
mod stream;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncSeek};

pub use catalog::{FileCatalog, SharedFile};
pub use config::ShareConfig;
pub use error::ShareError;
pub use file::SizedSource;
pub use range::{parse_range_header, resolve_ranges, ByteRange, RangeOutcome, RangeParse};
pub use response::{extract_boundary, FileResponse, RangeNotSatisfiable};
pub use stream::{MultipartStream, RangedStream};

/// [`AsyncSeek`] narrowed to seeking from the start of the source.
///
/// Range bodies only ever seek to absolute offsets, so this is the seam the
/// streams are generic over. Automatically implemented for any [`AsyncSeek`].
pub trait AsyncSeekStart {
    /// Same semantics as [`AsyncSeek::start_seek`] with a
    /// `SeekFrom::Start` position.
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()>;

    /// Same semantics as [`AsyncSeek::poll_complete`], discarding the
    /// resulting stream position.
    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>;
}

impl<T: AsyncSeek> AsyncSeekStart for T {
    fn start_seek(self: Pin<&mut Self>, position: u64) -> io::Result<()> {
        AsyncSeek::start_seek(self, io::SeekFrom::Start(position))
    }

    fn poll_complete(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncSeek::poll_complete(self, cx).map_ok(|_| ())
    }
}

/// An async readable, seekable source with a fixed, known byte size.
pub trait ByteSource: AsyncRead + AsyncSeekStart {
    /// Total size of the source in bytes.
    ///
    /// Must not change while a response is being served from the source.
    fn byte_size(&self) -> u64;
}
