//! Line framing for streamed HTTP bodies.
//!
//! Providers stream newline-delimited payloads (NDJSON for Ollama, SSE for
//! Gemini), but the network hands them over in arbitrary byte chunks. A line
//! may be split across chunks, and a chunk may carry several lines.

use futures::{Stream, StreamExt};
use ragchat_core::{AppError, AppResult};

struct LineState<S> {
    input: S,
    buffer: Vec<u8>,
    finished: bool,
}

/// Re-frame a byte stream into complete, non-blank lines.
///
/// Trailing `\r` is stripped. A final line without a terminating newline is
/// still emitted once the input ends. After the input yields an error, that
/// error is forwarded and the stream ends.
pub fn split_lines<S, B>(input: S) -> impl Stream<Item = AppResult<String>> + Send
where
    S: Stream<Item = AppResult<B>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
{
    let state = LineState {
        input,
        buffer: Vec::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                match decode_line(&raw[..raw.len() - 1]) {
                    Ok(Some(line)) => return Some((Ok(line), state)),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), state)),
                }
            }

            if state.finished {
                if state.buffer.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut state.buffer);
                return match decode_line(&rest) {
                    Ok(Some(line)) => Some((Ok(line), state)),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), state)),
                };
            }

            match state.input.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(e), state));
                }
                None => state.finished = true,
            }
        }
    })
}

fn decode_line(raw: &[u8]) -> AppResult<Option<String>> {
    let line = std::str::from_utf8(raw)
        .map_err(|e| AppError::Generation(format!("Malformed stream line: {}", e)))?;
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(line.to_string()))
    }
}
