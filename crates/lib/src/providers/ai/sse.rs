//! Minimal server-sent-events reader for streamed provider responses.
//!
//! Only `data:` fields are surfaced; every provider we talk to sends one JSON
//! document per `data:` line.

use crate::errors::RagError;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

type ByteStream<B> = Pin<Box<dyn Stream<Item = Result<B, reqwest::Error>> + Send>>;

struct ReaderState<B> {
    body: ByteStream<B>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

impl<B> ReaderState<B> {
    fn drain_lines(&mut self, flush: bool) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&line[..line.len() - 1]);
        }
        if flush && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.push_line(&line);
        }
    }

    fn push_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            self.pending.push_back(data.to_string());
        }
    }
}

/// Turns a raw response body into the sequence of its SSE `data:` payloads.
pub(crate) fn data_events<S, B>(body: S) -> BoxStream<'static, Result<String, RagError>>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = ReaderState {
        body: Box::pin(body),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.pending.pop_front() {
                return Some((Ok(data), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines(false);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(RagError::ProviderStream(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    state.drain_lines(true);
                }
            }
        }
    })
    .boxed()
}
