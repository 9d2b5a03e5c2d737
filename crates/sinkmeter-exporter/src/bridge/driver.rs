//! Event delivery: feed reader -> channel -> bridge.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use sinkmeter_core::error::{Result, SinkMeterError};
use sinkmeter_core::protocol::decode_line;
use sinkmeter_core::BlockEvent;

use super::MetricsBridge;

/// Longest accepted feed line in bytes, newline excluded.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Dispatch every received event until all senders are dropped.
/// Returns the number of events dispatched.
pub async fn run(bridge: Arc<MetricsBridge>, mut rx: mpsc::Receiver<BlockEvent>) -> u64 {
    let mut dispatched = 0u64;
    while let Some(event) = rx.recv().await {
        bridge.dispatch(&event);
        dispatched += 1;
    }
    tracing::info!(events = dispatched, "event feed closed");
    dispatched
}

/// Decode NDJSON lines from `reader` and forward them to `tx`.
///
/// Malformed lines are counted on `substreams_sink_error` and skipped. Stops
/// at end of input or when the receiver is gone. Returns the number of events
/// forwarded.
pub async fn feed_lines<R>(
    reader: R,
    tx: mpsc::Sender<BlockEvent>,
    bridge: &MetricsBridge,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    feed_lines_with_limit(reader, tx, bridge, MAX_LINE_BYTES).await
}

/// [`feed_lines`] with an explicit line length cap. Longer lines are counted
/// as errors and skipped without being buffered past the cap.
pub async fn feed_lines_with_limit<R>(
    mut reader: R,
    tx: mpsc::Sender<BlockEvent>,
    bridge: &MetricsBridge,
    max_line_bytes: usize,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut forwarded = 0u64;

    while let Some(len) = read_capped_line(&mut reader, &mut buf, max_line_bytes).await? {
        let decoded = if len > max_line_bytes {
            Err(SinkMeterError::BadRequest(format!(
                "line of {len} bytes exceeds limit of {max_line_bytes}"
            )))
        } else {
            std::str::from_utf8(&buf)
                .map_err(|e| SinkMeterError::BadRequest(format!("invalid utf-8: {e}")))
                .and_then(decode_line)
        };

        match decoded {
            Ok(Some(event)) => {
                if tx.send(event).await.is_err() {
                    tracing::warn!("event consumer gone, stopping feed");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    code = e.code().as_str(),
                    error = %e,
                    "dropping malformed feed line"
                );
                bridge.record_error(&e.to_string());
            }
        }
    }

    Ok(forwarded)
}

/// Read one `\n`-terminated line into `buf`, keeping at most `max` bytes.
/// Returns the full line length (newline excluded), or `None` at end of input.
async fn read_capped_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> io::Result<Option<usize>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut seen = 0usize;
    let mut started = false;

    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            return Ok(started.then_some(seen));
        }
        started = true;

        let (line, used, done) = match chunk.iter().position(|&b| b == b'\n') {
            Some(i) => (&chunk[..i], i + 1, true),
            None => (chunk, chunk.len(), false),
        };
        let room = max.saturating_sub(buf.len());
        buf.extend_from_slice(&line[..line.len().min(room)]);
        seen += line.len();
        reader.consume(used);

        if done {
            return Ok(Some(seen));
        }
    }
}
