//! Decoder for the Messages API's server-sent event stream.
//!
//! Only `text_delta` content is surfaced; every other event is skipped until
//! `message_stop` or an `error` event ends the stream.

use std::collections::VecDeque;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use super::LlmError;

/// One complete `event:`/`data:` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Accumulates raw bytes and yields frames as their terminating blank line arrives.
/// Frames may span network chunks, including mid-codepoint splits.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some((end, sep_len)) = find_frame_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + sep_len).take(end).collect();
            let text = String::from_utf8_lossy(&raw);
            if let Some(frame) = parse_frame(&text) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_frame(text: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }

    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data.join("\n"),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Event interpretation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Signal {
    Text(String),
    Stop,
    Skip,
}

fn interpret(frame: &SseFrame) -> Result<Signal, LlmError> {
    if frame.data.is_empty() {
        return Ok(Signal::Skip);
    }
    let event: StreamEvent = serde_json::from_str(&frame.data)?;
    match event.event_type.as_str() {
        "content_block_delta" => match event.delta {
            Some(StreamDelta {
                delta_type: Some(t),
                text: Some(text),
            }) if t == "text_delta" => Ok(Signal::Text(text)),
            _ => Ok(Signal::Skip),
        },
        "message_stop" => Ok(Signal::Stop),
        "error" => Err(LlmError::Stream(
            event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "stream error".to_string()),
        )),
        _ => Ok(Signal::Skip),
    }
}

struct DeltaState {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, LlmError>>,
    finished: bool,
}

/// Turns a raw SSE byte stream into a stream of text chunks. The first error
/// is yielded and then the stream ends.
pub fn text_deltas(
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
) -> BoxStream<'static, Result<String, LlmError>> {
    let state = DeltaState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    for frame in st.decoder.push(&chunk) {
                        match interpret(&frame) {
                            Ok(Signal::Text(text)) => st.pending.push_back(Ok(text)),
                            Ok(Signal::Skip) => {}
                            Ok(Signal::Stop) => {
                                st.finished = true;
                                break;
                            }
                            Err(e) => {
                                st.pending.push_back(Err(e));
                                st.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(LlmError::Http(e)));
                    st.finished = true;
                }
                None => st.finished = true,
            }
        }
    })
    .boxed()
}
