//! Stream normalizer — provider events in, canonical text deltas out.
//!
//! Adapters only say what one event means ([`Frame`]); the rules below are
//! applied here, once, for every provider:
//!
//! 1. Deltas that are blank after trimming are never emitted on their own;
//!    their whitespace is prepended to the next delta with text. Text is
//!    emitted verbatim.
//! 2. A completion signal ends the stream; nothing after it is emitted.
//! 3. Malformed events are skipped, but too many in a row fail the stream.
//! 4. The `[DONE]` sentinel ends the stream for every provider.

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use inkgate_core::ProviderCallError;

use crate::http::embedded_error;
use crate::sse::{EventStream, SseEvent};
use crate::traits::TextStream;

/// Meaning of one provider event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A text delta.
    Text(String),
    /// A final text delta; the stream is complete after it.
    Last(String),
    /// Completion with no text.
    Done,
    /// A well-formed event without text (keep-alive, usage, metadata).
    Skip,
}

/// Why an event could not be turned into a [`Frame`].
#[derive(Debug)]
pub enum FrameError {
    /// Not parseable, or not the expected shape. Skipped, counted.
    Malformed(String),
    /// The provider reported an error in-band. Ends the stream.
    Provider(ProviderCallError),
}

impl From<serde_json::Error> for FrameError {
    fn from(e: serde_json::Error) -> Self {
        FrameError::Malformed(e.to_string())
    }
}

/// Parse an event's data as JSON, turning in-band error payloads into
/// [`FrameError::Provider`].
pub(crate) fn parse_event(provider: &str, event: &SseEvent) -> Result<Value, FrameError> {
    let value: Value = serde_json::from_str(&event.data)?;
    if let Some((code, message)) = embedded_error(&value) {
        return Err(FrameError::Provider(ProviderCallError::from_payload(
            provider, code, message,
        )));
    }
    Ok(value)
}

/// Apply the normalization rules to a decoded event stream.
///
/// `interpret` maps one event to a [`Frame`]; `max_malformed` is the number
/// of consecutive malformed events tolerated.
pub fn normalize<F>(
    provider: &'static str,
    events: EventStream,
    max_malformed: u32,
    interpret: F,
) -> TextStream
where
    F: FnMut(&SseEvent) -> Result<Frame, FrameError> + Send + 'static,
{
    Box::pin(normalized(provider, events, max_malformed, interpret))
}

fn normalized<F>(
    provider: &'static str,
    mut events: EventStream,
    max_malformed: u32,
    mut interpret: F,
) -> impl Stream<Item = Result<String, ProviderCallError>> + Send + 'static
where
    F: FnMut(&SseEvent) -> Result<Frame, FrameError> + Send + 'static,
{
    try_stream! {
        let mut malformed = 0u32;
        let mut emitted = 0usize;
        // Whitespace-only deltas, carried into the next chunk with text.
        let mut pending = String::new();

        while let Some(event) = events.next().await {
            let event = event?;

            if event.data.trim() == "[DONE]" {
                debug!(provider, "Stream sentinel received");
                break;
            }

            match interpret(&event) {
                Ok(Frame::Text(text)) => {
                    malformed = 0;
                    if text.trim().is_empty() {
                        pending.push_str(&text);
                    } else {
                        emitted += 1;
                        yield std::mem::take(&mut pending) + &text;
                    }
                }
                Ok(Frame::Last(text)) => {
                    if !text.trim().is_empty() {
                        emitted += 1;
                        yield std::mem::take(&mut pending) + &text;
                    }
                    debug!(provider, "Stream completion signalled");
                    break;
                }
                Ok(Frame::Done) => {
                    debug!(provider, "Stream completion signalled");
                    break;
                }
                Ok(Frame::Skip) => malformed = 0,
                Err(FrameError::Provider(err)) => {
                    warn!(provider, kind = %err.kind, "Provider reported an error mid-stream");
                    Err::<(), _>(err)?;
                }
                Err(FrameError::Malformed(reason)) => {
                    malformed += 1;
                    warn!(provider, reason = %reason, consecutive = malformed, "Skipping malformed stream event");
                    if malformed > max_malformed {
                        Err::<(), _>(ProviderCallError::invalid_response(
                            provider,
                            format!("{malformed} consecutive malformed stream events"),
                        ))?;
                    }
                }
            }
        }

        debug!(provider, chunks = emitted, "Stream finished");
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
