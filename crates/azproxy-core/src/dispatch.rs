use std::io;
use std::time::Duration;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;
use http::HeaderName;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::headers::{Headers, header_get, header_remove, strip_hop_by_hop};
use crate::upstream_client::{UpstreamBody, UpstreamResponse};

/// Azure ends its event streams without the blank line OpenAI clients wait for.
const EVENT_STREAM_TERMINATOR: &[u8] = b"\n";
const RELAY_BUFFER_CHUNKS: usize = 16;

/// True when the media type (parameters ignored) is `text/event-stream`.
pub fn is_event_stream(headers: &Headers) -> bool {
    header_get(headers, "content-type")
        .and_then(|value| value.split(';').next())
        .map(|media_type| media_type.trim().eq_ignore_ascii_case("text/event-stream"))
        .unwrap_or(false)
}

/// Streams an upstream response back to the client.
///
/// Status, headers and body bytes are relayed as received. Event streams get one
/// trailing newline after the upstream body completes. A spawned task pumps the
/// body so that a disconnecting client drops the receiver, which stops the task
/// and releases the upstream connection.
pub fn relay(response: UpstreamResponse, idle_timeout: Duration, trace_id: String) -> Response {
    let UpstreamResponse {
        status,
        mut headers,
        body,
    } = response;

    let append_terminator = is_event_stream(&headers);
    strip_hop_by_hop(&mut headers);
    if append_terminator {
        header_remove(&mut headers, "content-length");
    }

    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(RELAY_BUFFER_CHUNKS);
    tokio::spawn(pump(body, tx, idle_timeout, append_terminator, trace_id));

    let mut resp = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *resp.status_mut() = status;
    for (name, value) in headers {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            resp.headers_mut().append(name, value);
        }
    }
    resp
}

async fn pump(
    mut body: UpstreamBody,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    idle_timeout: Duration,
    append_terminator: bool,
    trace_id: String,
) {
    loop {
        let item = match tokio::time::timeout(idle_timeout, body.next()).await {
            Ok(item) => item,
            Err(_) => {
                warn!(
                    trace_id = %trace_id,
                    idle_ms = idle_timeout.as_millis(),
                    "upstream stream stalled"
                );
                let _ = tx
                    .send(Err(io::Error::new(io::ErrorKind::TimedOut, "upstream stream stalled")))
                    .await;
                return;
            }
        };
        let Some(item) = item else {
            break;
        };
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(trace_id = %trace_id, error = %err, "upstream stream failed");
                let _ = tx.send(Err(io::Error::other(err.to_string()))).await;
                return;
            }
        };
        if tx.send(Ok(chunk)).await.is_err() {
            debug!(trace_id = %trace_id, "downstream closed before upstream finished");
            return;
        }
    }

    if append_terminator
        && let Err(err) = tx.send(Ok(Bytes::from_static(EVENT_STREAM_TERMINATOR))).await
    {
        warn!(trace_id = %trace_id, error = %err, "rewrite azure response error");
    }
}
