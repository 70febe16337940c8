//! State machine for translating OpenAI streaming chunks into Anthropic SSE events.
//!
//! The [`StreamTranslator`] consumes OpenAI SSE lines (or already-parsed
//! `ChatCompletionChunk`s) one at a time, tracks which content block is open,
//! and emits the corresponding Anthropic stream events. [`translate_stream`]
//! wraps it into a byte-stream to byte-stream adapter.
//!
//! At most one content block is open at a time. Block indices are handed out
//! in open order starting at 0, and every opened block is closed exactly once,
//! either when the next block opens or when the stream ends.

use std::collections::HashMap;

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};

use super::anthropic_types::{
    Delta, MessageDeltaBody, MessagesResponse, ResponseContentBlock, StopReason, StreamEvent,
    Usage, generate_message_id,
};
use super::openai_types::{ChatCompletionChunk, ChunkDelta, ChunkToolCall};
use super::response::empty_input;
use super::sse::{classify_line, encode_event, LineBuffer, SseLine};
use crate::error::{RelayError, Result};

/// Usage reported in `message_start`. The upstream does not report token
/// counts mid-stream, so these are fixed placeholders.
pub const MESSAGE_START_USAGE: Usage = Usage {
    input_tokens: 1,
    output_tokens: 1,
};

/// Usage reported in the final `message_delta`; placeholders as above.
pub const MESSAGE_DELTA_USAGE: Usage = Usage {
    input_tokens: 100,
    output_tokens: 150,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum OpenBlock {
    Text { index: usize },
    ToolUse { index: usize, id: String },
}

impl OpenBlock {
    fn index(&self) -> usize {
        match self {
            OpenBlock::Text { index } | OpenBlock::ToolUse { index, .. } => *index,
        }
    }
}

#[derive(Debug, Default)]
struct StreamState {
    next_index: usize,
    open: Option<OpenBlock>,
    /// Raw argument text per tool-call id, as received.
    tool_arguments: HashMap<String, String>,
}

impl StreamState {
    fn active_tool_id(&self) -> Option<&str> {
        match &self.open {
            Some(OpenBlock::ToolUse { id, .. }) => Some(id),
            _ => None,
        }
    }

    fn in_tool_mode(&self) -> bool {
        matches!(self.open, Some(OpenBlock::ToolUse { .. }))
    }

    fn allocate_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    fn close(&mut self) -> Option<StreamEvent> {
        self.open
            .take()
            .map(|block| StreamEvent::ContentBlockStop {
                index: block.index(),
            })
    }
}

/// Counters describing one translated stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub lines_seen: u64,
    /// `data:` lines whose payload was not a valid chunk.
    pub lines_dropped: u64,
    pub events_emitted: u64,
    pub blocks_opened: u64,
}

/// State machine that translates OpenAI streaming chunks into Anthropic SSE events.
///
/// Usage:
///   let mut translator = StreamTranslator::new("claude-sonnet-4-20250514");
///   let mut events = translator.start();
///   for line in upstream_lines {
///       events.extend(translator.process_line(&line));
///   }
///   events.extend(translator.finish());
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    msg_id: String,
    started: bool,
    finished: bool,
    state: StreamState,
    stats: StreamStats,
}

impl StreamTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            msg_id: generate_message_id(),
            started: false,
            finished: false,
            state: StreamState::default(),
            stats: StreamStats::default(),
        }
    }

    pub fn message_id(&self) -> &str {
        &self.msg_id
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Accumulated raw argument text for a tool call seen on this stream.
    pub fn tool_arguments(&self, call_id: &str) -> Option<&str> {
        self.state.tool_arguments.get(call_id).map(String::as_str)
    }

    /// Emit the `message_start` preamble. Only the first call produces an event.
    pub fn start(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.ensure_started(&mut events);
        self.tally(events)
    }

    /// Process one complete upstream SSE line.
    ///
    /// Non-`data:` lines and the `[DONE]` sentinel produce nothing. A `data:`
    /// payload that does not parse as a chunk is dropped.
    pub fn process_line(&mut self, line: &str) -> Vec<StreamEvent> {
        self.stats.lines_seen += 1;

        match classify_line(line) {
            SseLine::Data(payload) => match serde_json::from_str::<ChatCompletionChunk>(payload) {
                Ok(chunk) => self.process_chunk(&chunk),
                Err(e) => {
                    self.stats.lines_dropped += 1;
                    tracing::debug!(error = %e, "Skipping unparseable chunk");
                    Vec::new()
                }
            },
            SseLine::Done | SseLine::Ignored => Vec::new(),
        }
    }

    /// Process a parsed chunk. Only the first choice's delta is considered.
    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Vec<StreamEvent> {
        match chunk.choices.first().and_then(|c| c.delta.as_ref()) {
            Some(delta) => self.process_delta(delta),
            None => Vec::new(),
        }
    }

    pub fn process_delta(&mut self, delta: &ChunkDelta) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.ensure_started(&mut events);

        if let Some(fragments) = delta.tool_call_fragments() {
            for fragment in fragments {
                self.apply_tool_fragment(fragment, &mut events);
            }
        } else if let Some(text) = delta.text() {
            self.apply_text(text, &mut events);
        }

        self.tally(events)
    }

    /// Close the stream: close any open block, then emit `message_delta` and
    /// `message_stop`. Later calls return nothing.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut events = Vec::new();
        self.ensure_started(&mut events);

        let stop_reason = if self.state.in_tool_mode() {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };

        events.extend(self.state.close());
        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage: MESSAGE_DELTA_USAGE,
        });
        events.push(StreamEvent::MessageStop);
        self.finished = true;

        self.tally(events)
    }

    fn apply_tool_fragment(&mut self, fragment: &ChunkToolCall, events: &mut Vec<StreamEvent>) {
        if let Some(id) = fragment.call_id() {
            if self.state.active_tool_id() != Some(id) {
                events.extend(self.state.close());

                let index = self.state.allocate_index();
                self.state.open = Some(OpenBlock::ToolUse {
                    index,
                    id: id.to_string(),
                });
                self.state.tool_arguments.insert(id.to_string(), String::new());
                self.stats.blocks_opened += 1;

                events.push(StreamEvent::ContentBlockStart {
                    index,
                    content_block: ResponseContentBlock::ToolUse {
                        id: id.to_string(),
                        name: fragment.name().unwrap_or_default().to_string(),
                        input: empty_input(),
                    },
                });
            }
        }

        if let Some(arguments) = fragment.arguments() {
            if let Some(OpenBlock::ToolUse { index, id }) = &self.state.open {
                self.state
                    .tool_arguments
                    .entry(id.clone())
                    .or_default()
                    .push_str(arguments);

                events.push(StreamEvent::ContentBlockDelta {
                    index: *index,
                    delta: Delta::InputJsonDelta {
                        partial_json: arguments.to_string(),
                    },
                });
            }
        }
    }

    fn apply_text(&mut self, text: &str, events: &mut Vec<StreamEvent>) {
        if self.state.in_tool_mode() {
            events.extend(self.state.close());
        }

        let index = match self.state.open {
            Some(OpenBlock::Text { index }) => index,
            _ => {
                let index = self.state.allocate_index();
                self.state.open = Some(OpenBlock::Text { index });
                self.stats.blocks_opened += 1;
                events.push(StreamEvent::ContentBlockStart {
                    index,
                    content_block: ResponseContentBlock::Text {
                        text: String::new(),
                    },
                });
                index
            }
        };

        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: Delta::TextDelta {
                text: text.to_string(),
            },
        });
    }

    fn ensure_started(&mut self, events: &mut Vec<StreamEvent>) {
        if self.started {
            return;
        }
        self.started = true;

        let mut message = MessagesResponse::new(self.msg_id.clone(), &self.model, Vec::new());
        message.usage = Some(MESSAGE_START_USAGE);
        events.push(StreamEvent::MessageStart { message });
    }

    fn tally(&mut self, events: Vec<StreamEvent>) -> Vec<StreamEvent> {
        self.stats.events_emitted += events.len() as u64;
        events
    }
}

/// Translate an OpenAI SSE byte stream into an Anthropic SSE byte stream.
///
/// `message_start` is yielded before the inbound stream is first polled. An
/// inbound read error is yielded as the final item and ends the stream without
/// the closing events. Dropping the returned stream drops `byte_stream`.
pub fn translate_stream<S, E>(
    byte_stream: S,
    model: String,
    max_line_bytes: usize,
) -> impl Stream<Item = Result<Bytes>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut translator = StreamTranslator::new(&model);
        let mut lines = LineBuffer::with_max_line_bytes(max_line_bytes);

        for event in translator.start() {
            yield encode_event(&event);
        }

        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, message_id = translator.message_id(), "Upstream byte stream failed");
                    yield Err(RelayError::upstream(format!("Upstream stream read failed: {e}")));
                    return;
                }
            };

            for line in lines.push(&chunk) {
                for event in translator.process_line(&line) {
                    yield encode_event(&event);
                }
            }
        }

        if let Some(line) = lines.finish() {
            for event in translator.process_line(&line) {
                yield encode_event(&event);
            }
        }

        for event in translator.finish() {
            yield encode_event(&event);
        }

        let stats = translator.stats();
        tracing::info!(
            message_id = translator.message_id(),
            lines = stats.lines_seen,
            dropped = stats.lines_dropped,
            oversized = lines.dropped_lines(),
            blocks = stats.blocks_opened,
            events = stats.events_emitted,
            "Stream completed"
        );
    }
}
