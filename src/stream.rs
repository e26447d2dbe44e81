use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::pin_project;

use crate::chunk::{ChunkMessage, ChunkReceiver};

/// Response body fed by a chunk channel. Implements [`Stream`], [`Body`],
/// and [`IntoResponse`].
///
/// This is the consumer side of the channel packaged for axum: the stream
/// acknowledges `Data` messages as it accepts them into the body, ends
/// cleanly on `Close`, and surfaces [`io::ErrorKind::UnexpectedEof`] if
/// every producer handle is dropped without a close, so the connection is
/// torn down rather than terminated as a complete body.
#[pin_project]
pub struct ChunkStream {
    rx: ChunkReceiver,
    state: StreamState,
}

#[derive(Debug)]
enum StreamState {
    Streaming,
    Done,
}

impl ChunkStream {
    pub fn new(rx: ChunkReceiver) -> Self {
        ChunkStream {
            rx,
            state: StreamState::Streaming,
        }
    }
}

impl Stream for ChunkStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let this = self.project();

        if let StreamState::Done = this.state {
            return Poll::Ready(None);
        }

        loop {
            match ready!(this.rx.poll_recv(cx)) {
                Some(ChunkMessage::Data(data, reply)) => {
                    if let Some(reply) = reply {
                        reply.ok();
                    }
                    // zero-length fragments carry nothing and are not
                    // emitted as frames
                    if data.is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(Ok(data)));
                }
                Some(ChunkMessage::Close(reply)) => {
                    if let Some(reply) = reply {
                        reply.ok();
                    }
                    // the stream is over: shut the mailbox so later sends
                    // fail the liveness fast path, and drop anything that
                    // interleaved behind the close so its sender sees
                    // `Closed` now instead of waiting out its timeout
                    this.rx.close();
                    while let Poll::Ready(Some(_)) = this.rx.poll_recv(cx) {}
                    *this.state = StreamState::Done;
                    return Poll::Ready(None);
                }
                None => {
                    *this.state = StreamState::Done;
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "chunk channel dropped before close",
                    ))));
                }
            }
        }
    }
}

impl Body for ChunkStream {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        // length is unknown until the producer closes
        SizeHint::default()
    }

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<io::Result<Frame<Bytes>>>> {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl IntoResponse for ChunkStream {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}
