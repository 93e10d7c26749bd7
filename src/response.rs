//! Response construction for catalog downloads.
//!
//! [`FileResponse::new`] maps a resolved [`RangeOutcome`] onto status,
//! headers, and a streaming body. The unsatisfiable case is the error arm:
//! [`RangeNotSatisfiable`] renders the 416 with its mandatory
//! `Content-Range: bytes */<size>` header.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange};
use axum_extra::TypedHeader;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::catalog::SharedFile;
use crate::range::{ByteRange, RangeOutcome};
use crate::stream::{MultipartStream, RangedStream};
use crate::ByteSource;

/// RFC 5987 value-chars with a deliberate exception list: alphanumerics and
/// `- _ . ! ~` pass through, `'`, `(`, `)`, `*` are escaped, and `|`,
/// backtick, `^` stay literal for readability on the wire. Clients in the
/// field are tested against this exact set; don't "correct" it.
const FILENAME_VALUE_CHARS: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'|')
    .remove(b'`')
    .remove(b'^');

/// A ranged download response. Implements [`IntoResponse`].
pub enum FileResponse<S> {
    /// 200 with the entire resource.
    Full {
        size: u64,
        media_type: String,
        filename: String,
        stream: RangedStream<S>,
    },
    /// 206 with one contiguous span.
    Single {
        span: ByteRange,
        size: u64,
        media_type: String,
        stream: RangedStream<S>,
    },
    /// 206 with a `multipart/byteranges` body.
    Multipart {
        boundary: String,
        stream: MultipartStream<S>,
    },
}

impl<S: ByteSource + Send + 'static> FileResponse<S> {
    /// Renders `outcome` over `source`, consuming it for the body stream.
    ///
    /// The size used everywhere is the source's snapshot, taken when the
    /// file was opened for this request.
    pub fn new(
        outcome: RangeOutcome,
        file: &SharedFile,
        source: S,
    ) -> Result<Self, RangeNotSatisfiable> {
        let size = source.byte_size();
        match outcome {
            RangeOutcome::Full => Ok(FileResponse::Full {
                size,
                media_type: file.media_type.clone(),
                filename: file.name.clone(),
                stream: RangedStream::full(source),
            }),
            RangeOutcome::Unsatisfiable => Err(RangeNotSatisfiable(size)),
            RangeOutcome::Partial { parts, multipart } => {
                if let (false, [span]) = (multipart, parts.as_slice()) {
                    let span = *span;
                    return Ok(FileResponse::Single {
                        span,
                        size,
                        media_type: file.media_type.clone(),
                        stream: RangedStream::new(source, span),
                    });
                }
                let boundary = make_boundary();
                let stream = MultipartStream::new(
                    source,
                    parts,
                    size,
                    boundary.clone(),
                    file.media_type.clone(),
                );
                Ok(FileResponse::Multipart { boundary, stream })
            }
        }
    }
}

impl<S: ByteSource + Send + 'static> IntoResponse for FileResponse<S> {
    fn into_response(self) -> Response {
        match self {
            FileResponse::Full {
                size,
                media_type,
                filename,
                stream,
            } => {
                let disposition = format!(
                    "inline; filename*=UTF-8''{}",
                    encode_disposition_filename(&filename)
                );
                (
                    StatusCode::OK,
                    TypedHeader(AcceptRanges::bytes()),
                    TypedHeader(ContentLength(size)),
                    [
                        (header::CONTENT_TYPE, header_value(&media_type)),
                        (header::CONTENT_DISPOSITION, header_value(&disposition)),
                    ],
                    stream,
                )
                    .into_response()
            }

            FileResponse::Single {
                span,
                size,
                media_type,
                stream,
            } => {
                let content_range = ContentRange::bytes(span.start..span.end + 1, size)
                    .expect("span is within the resource");
                (
                    StatusCode::PARTIAL_CONTENT,
                    TypedHeader(AcceptRanges::bytes()),
                    TypedHeader(content_range),
                    [(header::CONTENT_TYPE, header_value(&media_type))],
                    stream,
                )
                    .into_response()
            }

            FileResponse::Multipart { boundary, stream } => {
                let content_type = format!("multipart/byteranges; boundary={boundary}");
                (
                    StatusCode::PARTIAL_CONTENT,
                    TypedHeader(AcceptRanges::bytes()),
                    [(header::CONTENT_TYPE, header_value(&content_type))],
                    stream,
                )
                    .into_response()
            }
        }
    }
}

/// The requested ranges miss the resource entirely. Implements
/// [`IntoResponse`] as the RFC-mandated 416.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeNotSatisfiable(pub u64);

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        (
            StatusCode::RANGE_NOT_SATISFIABLE,
            TypedHeader(ContentRange::unsatisfied_bytes(self.0)),
            "416 Range Not Satisfiable",
        )
            .into_response()
    }
}

/// Percent-encodes a filename for `Content-Disposition: ...filename*=`.
pub fn encode_disposition_filename(name: &str) -> String {
    utf8_percent_encode(name, FILENAME_VALUE_CHARS).to_string()
}

/// Pulls the boundary parameter out of a `multipart/byteranges` media type.
pub fn extract_boundary(content_type: &str) -> Option<&str> {
    content_type
        .split_once("boundary=")
        .map(|(_, b)| b.trim_matches('"'))
}

/// Per-response boundary marker. Uniqueness comes from the clock; two
/// responses in the same nanosecond would collide, which is fine for a
/// single-user share.
fn make_boundary() -> String {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("flyfile-{stamp:x}")
}

fn header_value(text: &str) -> HeaderValue {
    HeaderValue::from_str(text).expect("header values built here are ASCII")
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;

    use axum::response::IntoResponse;
    use futures::StreamExt;

    use super::*;
    use crate::range::{parse_range_header, resolve_ranges};
    use crate::SizedSource;

    const DATA: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    fn fixture() -> SharedFile {
        SharedFile {
            id: 0,
            name: "fixture.txt".to_string(),
            size: DATA.len() as u64,
            media_type: "text/plain".to_string(),
            path: PathBuf::from("test/fixture.txt"),
        }
    }

    fn source() -> SizedSource<Cursor<Vec<u8>>> {
        SizedSource::with_size(Cursor::new(DATA.to_vec()), DATA.len() as u64)
    }

    fn respond(header: Option<&str>) -> Result<FileResponse<SizedSource<Cursor<Vec<u8>>>>, RangeNotSatisfiable> {
        let size = DATA.len() as u64;
        let parsed = match header {
            Some(h) => parse_range_header(h, size),
            None => crate::RangeParse::Ignored,
        };
        FileResponse::new(resolve_ranges(parsed, size), &fixture(), source())
    }

    async fn body_string(response: Response) -> String {
        let mut stream = response.into_body().into_data_stream();
        let mut out = String::new();
        while let Some(chunk) = stream.next().await.transpose().unwrap() {
            out.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        out
    }

    #[test]
    fn filename_encoding_exception_list() {
        // ' ( ) * escape; | ^ ` stay literal
        assert_eq!(
            "a%27b%28c%29d%2Ae|f^g`h.txt",
            encode_disposition_filename("a'b(c)d*e|f^g`h.txt")
        );
        assert_eq!("plain-name_1.txt", encode_disposition_filename("plain-name_1.txt"));
        assert_eq!("with%20space", encode_disposition_filename("with space"));
        assert_eq!("caf%C3%A9.bin", encode_disposition_filename("café.bin"));
        assert_eq!("bang!~ok", encode_disposition_filename("bang!~ok"));
    }

    #[test]
    fn boundary_has_stable_prefix() {
        assert!(make_boundary().starts_with("flyfile-"));
    }

    #[test]
    fn extract_boundary_from_media_type() {
        assert_eq!(
            Some("xyz"),
            extract_boundary("multipart/byteranges; boundary=xyz")
        );
        assert_eq!(None, extract_boundary("text/plain"));
    }

    #[tokio::test]
    async fn full_response_headers_and_body() {
        let response = respond(None).unwrap().into_response();
        assert_eq!(StatusCode::OK, response.status());

        let head = response.headers();
        assert_eq!("bytes", head.get(header::ACCEPT_RANGES).unwrap());
        assert_eq!("62", head.get(header::CONTENT_LENGTH).unwrap());
        assert_eq!("text/plain", head.get(header::CONTENT_TYPE).unwrap());
        assert_eq!(
            "inline; filename*=UTF-8''fixture.txt",
            head.get(header::CONTENT_DISPOSITION).unwrap()
        );

        // round trip: the body carries exactly `size` bytes
        assert_eq!(std::str::from_utf8(DATA).unwrap(), body_string(response).await);
    }

    #[tokio::test]
    async fn ignored_header_is_a_full_response() {
        let response = respond(Some("chunks=0-4")).unwrap().into_response();
        assert_eq!(StatusCode::OK, response.status());
    }

    #[tokio::test]
    async fn single_range_response() {
        let response = respond(Some("bytes=0-0")).unwrap().into_response();
        assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
        assert_eq!(
            "bytes 0-0/62",
            response.headers().get(header::CONTENT_RANGE).unwrap()
        );
        assert_eq!("0", body_string(response).await);
    }

    #[tokio::test]
    async fn suffix_range_response() {
        let response = respond(Some("bytes=-10")).unwrap().into_response();
        assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
        assert_eq!(
            "bytes 52-61/62",
            response.headers().get(header::CONTENT_RANGE).unwrap()
        );
        assert_eq!("qrstuvwxyz", body_string(response).await);
    }

    #[tokio::test]
    async fn multipart_response_content_type_and_parts() {
        let response = respond(Some("bytes=0-0,-1")).unwrap().into_response();
        assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("multipart/byteranges; boundary="));
        let boundary = extract_boundary(&content_type).unwrap().to_string();

        let body = body_string(response).await;
        assert!(body.starts_with(&format!("\r\n--{boundary}\r\n")));
        assert!(body.ends_with(&format!("\r\n--{boundary}--\r\n")));
        assert!(body.contains("Content-range: bytes 0-0/62"));
        assert!(body.contains("Content-range: bytes 61-61/62"));
    }

    #[tokio::test]
    async fn multipart_even_when_one_part_survives() {
        // two ranges requested, coalesced to one part: still multipart
        let response = respond(Some("bytes=0-4,5-9")).unwrap().into_response();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.starts_with("multipart/byteranges"));
    }

    #[tokio::test]
    async fn unsatisfiable_renders_416() {
        let err = respond(Some("bytes=500-200")).err().unwrap();
        assert_eq!(RangeNotSatisfiable(62), err);

        let response = err.into_response();
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());
        assert_eq!(
            "bytes */62",
            response.headers().get(header::CONTENT_RANGE).unwrap()
        );
        assert_eq!("416 Range Not Satisfiable", body_string(response).await);
    }
}
