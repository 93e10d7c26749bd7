//! Streaming response bodies.
//!
//! Both streams are poll-driven state machines over a [`ByteSource`]: they
//! seek, then hand out `Bytes` chunks of at most [`CHUNK_SIZE`] as the
//! transport asks for them. Nothing is buffered beyond one chunk, so large
//! files never sit in memory whole.

use std::cmp;
use std::io;
use std::mem;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;
use tokio::io::ReadBuf;

use crate::range::ByteRange;
use crate::ByteSource;

pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// Body for a 200 or single-range 206: one contiguous span of the source.
///
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
#[pin_project]
pub struct RangedStream<S> {
    state: SpanState,
    length: u64,
    #[pin]
    source: S,
}

enum SpanState {
    Seek { offset: u64 },
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
}

impl<S: ByteSource> RangedStream<S> {
    /// Streams the inclusive span `[span.start, span.end]`.
    pub(crate) fn new(source: S, span: ByteRange) -> Self {
        RangedStream {
            state: SpanState::Seek { offset: span.start },
            length: span.len(),
            source,
        }
    }

    /// Streams the entire source.
    pub(crate) fn full(source: S) -> Self {
        let length = source.byte_size();
        RangedStream {
            state: SpanState::Seek { offset: 0 },
            length,
            source,
        }
    }
}

impl<S: ByteSource + Send + 'static> IntoResponse for RangedStream<S> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<S: ByteSource> Body for RangedStream<S> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.length)
    }

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<io::Result<Frame<Bytes>>>> {
        self.poll_next(cx)
            .map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<S: ByteSource> Stream for RangedStream<S> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        loop {
            match this.state {
                SpanState::Seek { offset } => {
                    let offset = *offset;
                    match this.source.as_mut().start_seek(offset) {
                        Err(e) => return Poll::Ready(Some(Err(e))),
                        Ok(()) => {
                            *this.state = SpanState::Seeking {
                                remaining: *this.length,
                            };
                        }
                    }
                }

                SpanState::Seeking { remaining } => {
                    let remaining = *remaining;
                    match ready!(this.source.as_mut().poll_complete(cx)) {
                        Err(e) => return Poll::Ready(Some(Err(e))),
                        Ok(()) => {
                            *this.state = SpanState::Reading {
                                buffer: BytesMut::with_capacity(CHUNK_SIZE),
                                remaining,
                            };
                        }
                    }
                }

                SpanState::Reading { buffer, remaining } => {
                    return match poll_chunk(this.source.as_mut(), cx, buffer, remaining) {
                        Poll::Pending => Poll::Pending,
                        Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
                        Poll::Ready(Ok(Some(chunk))) => Poll::Ready(Some(Ok(chunk))),
                        // source ran dry (at the span end, or early if the
                        // file shrank underneath us)
                        Poll::Ready(Ok(None)) => Poll::Ready(None),
                    };
                }
            }
        }
    }
}

/// Body for a multi-range 206: each part framed with a boundary line and
/// part headers, terminated by the closing boundary.
///
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
#[pin_project]
pub struct MultipartStream<S> {
    state: PartState,
    parts: Vec<ByteRange>,
    next_part: usize,
    total_size: u64,
    boundary: String,
    media_type: String,
    #[pin]
    source: S,
}

enum PartState {
    Preamble,
    Seeking { remaining: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
    Epilogue,
    Done,
}

impl<S: ByteSource> MultipartStream<S> {
    pub(crate) fn new(
        source: S,
        parts: Vec<ByteRange>,
        total_size: u64,
        boundary: String,
        media_type: String,
    ) -> Self {
        MultipartStream {
            state: PartState::Preamble,
            parts,
            next_part: 0,
            total_size,
            boundary,
            media_type,
            source,
        }
    }
}

impl<S: ByteSource + Send + 'static> IntoResponse for MultipartStream<S> {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl<S: ByteSource> Body for MultipartStream<S> {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        // exact length would require pre-rendering every frame
        SizeHint::default()
    }

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<io::Result<Frame<Bytes>>>> {
        self.poll_next(cx)
            .map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl<S: ByteSource> Stream for MultipartStream<S> {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let mut this = self.project();

        loop {
            match this.state {
                PartState::Preamble => {
                    let Some(part) = this.parts.get(*this.next_part).copied() else {
                        *this.state = PartState::Epilogue;
                        continue;
                    };
                    // Every part, including the first, opens with CRLF; the
                    // closing boundary below relies on that symmetry.
                    let preamble = format!(
                        "\r\n--{}\r\nContent-type: {}\r\nContent-range: bytes {}-{}/{}\r\n\r\n",
                        this.boundary, this.media_type, part.start, part.end, this.total_size,
                    );
                    match this.source.as_mut().start_seek(part.start) {
                        Err(e) => return Poll::Ready(Some(Err(e))),
                        Ok(()) => {
                            *this.state = PartState::Seeking {
                                remaining: part.len(),
                            };
                        }
                    }
                    return Poll::Ready(Some(Ok(Bytes::from(preamble))));
                }

                PartState::Seeking { remaining } => {
                    let remaining = *remaining;
                    match ready!(this.source.as_mut().poll_complete(cx)) {
                        Err(e) => return Poll::Ready(Some(Err(e))),
                        Ok(()) => {
                            *this.state = PartState::Reading {
                                buffer: BytesMut::with_capacity(CHUNK_SIZE),
                                remaining,
                            };
                        }
                    }
                }

                PartState::Reading { buffer, remaining } => {
                    match poll_chunk(this.source.as_mut(), cx, buffer, remaining) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => return Poll::Ready(Some(Err(e))),
                        Poll::Ready(Ok(Some(chunk))) => return Poll::Ready(Some(Ok(chunk))),
                        Poll::Ready(Ok(None)) => {
                            *this.next_part += 1;
                            *this.state = PartState::Preamble;
                        }
                    }
                }

                PartState::Epilogue => {
                    let closing = format!("\r\n--{}--\r\n", this.boundary);
                    *this.state = PartState::Done;
                    return Poll::Ready(Some(Ok(Bytes::from(closing))));
                }

                PartState::Done => return Poll::Ready(None),
            }
        }
    }
}

/// Reads the next chunk of a span, up to `remaining` bytes.
///
/// `Ok(None)` means the span is complete (or the source hit EOF early).
fn poll_chunk<S: ByteSource>(
    mut source: Pin<&mut S>,
    cx: &mut Context<'_>,
    buffer: &mut BytesMut,
    remaining: &mut u64,
) -> Poll<io::Result<Option<Bytes>>> {
    if *remaining == 0 {
        return Poll::Ready(Ok(None));
    }

    let spare = buffer.spare_capacity_mut();
    let want = cmp::min(spare.len() as u64, *remaining) as usize;
    let mut read_buf = ReadBuf::uninit(&mut spare[..want]);

    match source.as_mut().poll_read(cx, &mut read_buf) {
        Poll::Pending => Poll::Pending,
        Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
        Poll::Ready(Ok(())) => {
            let n = read_buf.filled().len();
            if n == 0 {
                return Poll::Ready(Ok(None));
            }
            // SAFETY: poll_read initialized `n` bytes of the spare capacity
            // we handed it, directly after the current length.
            unsafe { buffer.set_len(buffer.len() + n) };
            // n <= want <= remaining, so this cannot underflow
            *remaining -= n as u64;
            let chunk = mem::replace(buffer, BytesMut::with_capacity(CHUNK_SIZE));
            Poll::Ready(Ok(Some(chunk.freeze())))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use futures::{pin_mut, Stream, StreamExt};
    use http_body::Body;

    use super::{MultipartStream, RangedStream};
    use crate::range::ByteRange;
    use crate::SizedSource;

    const DATA: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    fn source() -> SizedSource<Cursor<Vec<u8>>> {
        SizedSource::with_size(Cursor::new(DATA.to_vec()), DATA.len() as u64)
    }

    async fn collect(stream: impl Stream<Item = std::io::Result<bytes::Bytes>>) -> String {
        let mut out = String::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await.transpose().unwrap() {
            out.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn full_stream_yields_entire_source() {
        let stream = RangedStream::full(source());
        assert_eq!(62, Body::size_hint(&stream).exact().unwrap());
        assert_eq!(std::str::from_utf8(DATA).unwrap(), collect(stream).await);
    }

    #[tokio::test]
    async fn span_stream_yields_inclusive_span() {
        let stream = RangedStream::new(source(), ByteRange::new(10, 19));
        assert_eq!(10, Body::size_hint(&stream).exact().unwrap());
        assert_eq!("ABCDEFGHIJ", collect(stream).await);
    }

    #[tokio::test]
    async fn single_byte_span() {
        let stream = RangedStream::new(source(), ByteRange::new(0, 0));
        assert_eq!("0", collect(stream).await);
    }

    #[tokio::test]
    async fn multipart_framing_is_exact() {
        let parts = vec![ByteRange::new(0, 0), ByteRange::new(61, 61)];
        let stream = MultipartStream::new(
            source(),
            parts,
            62,
            "B".to_string(),
            "text/plain".to_string(),
        );
        let expected = "\r\n--B\r\n\
                        Content-type: text/plain\r\n\
                        Content-range: bytes 0-0/62\r\n\
                        \r\n\
                        0\
                        \r\n--B\r\n\
                        Content-type: text/plain\r\n\
                        Content-range: bytes 61-61/62\r\n\
                        \r\n\
                        z\
                        \r\n--B--\r\n";
        assert_eq!(expected, collect(stream).await);
    }

    #[tokio::test]
    async fn multipart_with_no_parts_is_just_the_closing_boundary() {
        let stream = MultipartStream::new(
            source(),
            Vec::new(),
            62,
            "B".to_string(),
            "text/plain".to_string(),
        );
        assert_eq!("\r\n--B--\r\n", collect(stream).await);
    }
}
