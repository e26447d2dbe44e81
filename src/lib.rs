//! # http-range-chunk
//!
//! HTTP `Range` header parsing and chunked response delivery channels for
//! [`axum`][1]-style servers.
//!
//! The two pieces are independent and composed by request handling code:
//!
//! - [`parse_ranges`] turns the raw value of a `Range` header into an
//!   ordered list of [`ByteRangeSpec`]s, or a single [`RangeParseError`]
//!   that poisons the whole set. No resource-size validation happens here;
//!   the responder clamps ranges to the resource it serves.
//! - [`chunk_channel`] connects a request handler to the connection actor
//!   that owns the live socket. The handler streams body fragments through a
//!   [`ChunkHandle`], fire-and-forget or synchronously with a bounded wait,
//!   and closes the channel when the body is complete. [`ChunkStream`]
//!   adapts the consumer end into an axum response body.
//!
//! ```
//! use axum::http::Version;
//! use bytes::Bytes;
//! use futures::{pin_mut, StreamExt};
//!
//! use http_range_chunk::{chunk_channel, parse_ranges, ByteRangeSpec, ChunkStream};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // decide which byte ranges of a resource to serve
//! let ranges = parse_ranges("0-499,-500").unwrap();
//! assert_eq!(ByteRangeSpec::Exact { first: 0, last: 499 }, ranges[0]);
//! assert_eq!(ByteRangeSpec::SuffixLength { length: 500 }, ranges[1]);
//!
//! // stream a response body to the connection
//! let (handle, rx) = chunk_channel(Version::HTTP_11).unwrap();
//!
//! let connection = tokio::spawn(async move {
//!     let stream = ChunkStream::new(rx);
//!     pin_mut!(stream);
//!     let mut body = Vec::new();
//!     while let Some(chunk) = stream.next().await.transpose().unwrap() {
//!         body.extend_from_slice(&chunk);
//!     }
//!     body
//! });
//!
//! handle.send_sync(Bytes::from_static(b"Hello ")).await.unwrap();
//! handle.send_async(Bytes::from_static(b"world"));
//! handle.close().await.unwrap();
//!
//! assert_eq!(b"Hello world".as_slice(), connection.await.unwrap());
//! # }
//! ```
//!
//! [1]: https://docs.rs/axum

mod chunk;
mod range;
mod stream;

pub use chunk::{
    chunk_channel, ChunkHandle, ChunkMessage, ChunkReceiver, Liveness, NotSupported, ReplyHandle,
    SendError, DEFAULT_SEND_TIMEOUT,
};
pub use range::{
    parse_ranges, ranges_from_header, ranges_from_headers, ByteRangeSpec, RangeParseError,
};
pub use stream::ChunkStream;
