//! Line-delimited JSON responses.

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use std::convert::Infallible;
use std::future::Future;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;
use vantage_pipeline::{FrameSink, StreamFrame};

/// Content type of streaming responses.
pub const NDJSON: &str = "application/x-ndjson";

/// Stream frames to the client as they arrive. The response ends when every
/// sender is dropped.
pub fn frames_response(frames: UnboundedReceiver<StreamFrame>) -> Response {
    let lines = UnboundedReceiverStream::new(frames).filter_map(|frame| async move {
        match frame.to_line() {
            Ok(line) => Some(Ok::<_, Infallible>(line)),
            Err(e) => {
                tracing::error!("dropping unserializable frame: {}", e);
                None
            }
        }
    });

    (
        [(CONTENT_TYPE, NDJSON), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(lines),
    )
        .into_response()
}

/// Run `work` in the background, streaming whatever it writes to the sink.
///
/// The work keeps running if the client goes away; its frames are dropped.
pub fn spawn_stream<F, Fut>(work: F) -> Response
where
    F: FnOnce(FrameSink) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (sink, frames) = FrameSink::channel();
    tokio::spawn(work(sink));
    frames_response(frames)
}
