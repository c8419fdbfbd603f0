//! Incremental decoding of the newline-delimited watch body.
//!
//! The API server writes one JSON frame per line and flushes whenever a
//! change happens, so chunk boundaries fall anywhere: mid-frame, between
//! frames, or several frames at once. [`LineDecoder`] reassembles lines;
//! [`decode_watch_stream`] turns a byte stream into notifications.

use std::collections::VecDeque;

use futures::{Stream, StreamExt as _, stream};
use lairwatch_types::WatchNotification;

use crate::error::KubeError;

/// Splits a byte stream into complete, non-blank lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Feed a chunk; returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.buf);
                if !line.iter().all(u8::is_ascii_whitespace) {
                    lines.push(line);
                }
            } else {
                self.buf.push(byte);
            }
        }
        lines
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let line = std::mem::take(&mut self.buf);
        (!line.iter().all(u8::is_ascii_whitespace)).then_some(line)
    }
}

/// Parse one watch frame.
pub fn parse_frame(line: &[u8]) -> Result<WatchNotification, KubeError> {
    Ok(serde_json::from_slice(line)?)
}

struct DecodeState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: LineDecoder,
    ready: VecDeque<Vec<u8>>,
    done: bool,
}

/// Turn a chunked response body into a stream of watch notifications.
///
/// A frame that fails to parse yields an `Err` item and decoding carries on
/// with the next line. A body error yields one `Err` item and ends the
/// stream.
pub fn decode_watch_stream<S, B, E>(body: S) -> impl Stream<Item = Result<WatchNotification, KubeError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<KubeError>,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: LineDecoder::default(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((parse_frame(&line), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.ready.extend(state.decoder.push(chunk.as_ref())),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.done = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
}
