//! Turns a resolved asset and a `Range` header into a streamed response.
//!
//! The file is opened per request, read-only, and lives inside the body
//! stream. hyper only polls the stream when the socket can take more, so
//! reads follow the client's pace and memory stays at one chunk. Dropping
//! the body (completion, error or client hang-up) closes the file.

use crate::error::StreamError;
use crate::locator::ResolvedAsset;
use crate::range::{ByteRange, RangeOutcome, parse_range};
use crate::token_bucket::TokenBucket;
use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode, header};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io::{Error as IoError, ErrorKind, SeekFrom};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

/// Read size for streamed transfers
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Build the 200/206 response for `asset`, or a 416 error.
pub async fn deliver(
    resource_id: &str,
    asset: &ResolvedAsset,
    range_header: Option<&HeaderValue>,
    bucket: TokenBucket,
) -> Result<Response<Body>, StreamError> {
    let size = asset.size;

    let window = match parse_range(range_header, size) {
        RangeOutcome::Full => None,
        RangeOutcome::Partial(range) => Some(range),
        RangeOutcome::Unsatisfiable => {
            debug!(resource_id, ?range_header, size, "Unsatisfiable range");
            return Err(StreamError::RangeNotSatisfiable { size });
        }
    };

    let (start, len) = window.map_or((0, size), |range| (range.start, range.len()));
    let transfer = Transfer {
        resource_id: resource_id.to_string(),
        start,
        expected: len,
        sent: 0,
    };
    let stream = open_window(asset, start, len, bucket, transfer).await?;

    let mut res = Response::new(Body::from_stream(stream));
    let headers = res.headers_mut();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&asset.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, max-age=0"),
    );

    match window {
        Some(range) => {
            debug!(resource_id, start = range.start, end = range.end, size, "Serving partial content");
            *res.status_mut() = StatusCode::PARTIAL_CONTENT;
            res.headers_mut()
                .insert(header::CONTENT_RANGE, content_range(&range, size)?);
        }
        None => {
            debug!(resource_id, size, "Serving full content");
            *res.status_mut() = StatusCode::OK;
        }
    }

    Ok(res)
}

fn content_range(range: &ByteRange, size: u64) -> Result<HeaderValue, StreamError> {
    HeaderValue::try_from(range.content_range(size))
        .map_err(|error| StreamError::Internal(error.into()))
}

async fn open_window(
    asset: &ResolvedAsset,
    start: u64,
    len: u64,
    bucket: TokenBucket,
    mut transfer: Transfer,
) -> Result<impl Stream<Item = Result<Bytes, IoError>> + Send + 'static, StreamError> {
    let mut fh = match tokio::fs::File::open(&asset.path).await {
        Ok(fh) => fh,
        Err(error) if matches!(error.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
            debug!(path = ?asset.path, %error, "Asset could not be opened");
            return Err(StreamError::FileNotFound);
        }
        Err(error) => return Err(error.into()),
    };

    if start > 0 {
        fh.seek(SeekFrom::Start(start)).await?;
    }

    let stream = ReaderStream::with_capacity(fh.take(len), CHUNK_SIZE)
        .then(move |res| {
            let bucket = bucket.clone();
            async move {
                let chunk = res?;
                bucket.consume(chunk.len()).await;
                Ok::<Bytes, IoError>(chunk)
            }
        })
        .map(move |res| {
            match &res {
                Ok(chunk) => transfer.sent += chunk.len() as u64,
                Err(error) => error!(
                    resource_id = %transfer.resource_id,
                    start = transfer.start,
                    expected = transfer.expected,
                    sent = transfer.sent,
                    %error,
                    "Stream aborted by read error"
                ),
            }
            res
        });

    Ok(stream)
}

/// Tracks progress of one body; logs when it is dropped before finishing.
struct Transfer {
    resource_id: String,
    start: u64,
    expected: u64,
    sent: u64,
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if self.sent < self.expected {
            debug!(
                resource_id = %self.resource_id,
                start = self.start,
                expected = self.expected,
                sent = self.sent,
                "Stream closed before completion"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::path::PathBuf;

    struct Fixture {
        dir: PathBuf,
        asset: ResolvedAsset,
        data: Vec<u8>,
    }

    impl Fixture {
        fn new(size: usize) -> Self {
            let dir = std::env::temp_dir().join(format!("stream-gate-delivery-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("song.mp3");
            let data = (0..size).map(|i| (i % 251) as u8).collect::<Vec<_>>();
            std::fs::write(&path, &data).unwrap();

            Self {
                asset: ResolvedAsset {
                    path,
                    size: size as u64,
                    content_type: "audio/mpeg".to_string(),
                },
                dir,
                data,
            }
        }

        async fn get(&self, range: Option<&str>) -> Result<Response<Body>, StreamError> {
            let header = range.map(|r| HeaderValue::from_str(r).unwrap());
            deliver("song1", &self.asset, header.as_ref(), TokenBucket::unlimited()).await
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.dir).ok();
        }
    }

    fn header_str<'a>(res: &'a Response<Body>, name: header::HeaderName) -> &'a str {
        res.headers().get(name).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn test_full_body_without_range() {
        for size in [1usize, 100, CHUNK_SIZE + 17, 3 * CHUNK_SIZE] {
            let fixture = Fixture::new(size);
            let res = fixture.get(None).await.unwrap();

            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(header_str(&res, header::ACCEPT_RANGES), "bytes");
            assert_eq!(header_str(&res, header::CONTENT_TYPE), "audio/mpeg");
            assert_eq!(header_str(&res, header::CONTENT_LENGTH), size.to_string());
            assert!(res.headers().get(header::CONTENT_RANGE).is_none());

            let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
            assert_eq!(&body[..], &fixture.data[..]);
        }
    }

    #[tokio::test]
    async fn test_partial_window() {
        let fixture = Fixture::new(1000);
        let res = fixture.get(Some("bytes=0-99")).await.unwrap();

        assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(header_str(&res, header::CONTENT_RANGE), "bytes 0-99/1000");
        assert_eq!(header_str(&res, header::CONTENT_LENGTH), "100");
        assert_eq!(header_str(&res, header::ACCEPT_RANGES), "bytes");

        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &fixture.data[0..100]);
    }

    #[tokio::test]
    async fn test_partial_window_across_chunks() {
        let size = 2 * CHUNK_SIZE + 500;
        let fixture = Fixture::new(size);
        let start = CHUNK_SIZE - 3;
        let res = fixture.get(Some(&format!("bytes={start}-"))).await.unwrap();

        assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            header_str(&res, header::CONTENT_RANGE),
            format!("bytes {start}-{}/{size}", size - 1)
        );

        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &fixture.data[start..]);
    }

    #[tokio::test]
    async fn test_clamped_end() {
        let fixture = Fixture::new(300);
        let res = fixture.get(Some("bytes=250-9999")).await.unwrap();

        assert_eq!(header_str(&res, header::CONTENT_RANGE), "bytes 250-299/300");
        assert_eq!(header_str(&res, header::CONTENT_LENGTH), "50");
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &fixture.data[250..]);
    }

    #[tokio::test]
    async fn test_unsatisfiable() {
        let fixture = Fixture::new(100);

        for range in ["bytes=100-150", "bytes=abc-def", "bytes=0-1,5-6"] {
            let error = fixture.get(Some(range)).await.unwrap_err();
            assert!(matches!(error, StreamError::RangeNotSatisfiable { size: 100 }));
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let fixture = Fixture::new(10);
        std::fs::remove_file(&fixture.asset.path).unwrap();

        let error = fixture.get(None).await.unwrap_err();
        assert!(matches!(error, StreamError::FileNotFound));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let fixture = Fixture::new(0);

        let res = fixture.get(None).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(header_str(&res, header::CONTENT_LENGTH), "0");
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());

        let error = fixture.get(Some("bytes=0-")).await.unwrap_err();
        assert!(matches!(error, StreamError::RangeNotSatisfiable { size: 0 }));
    }
}
