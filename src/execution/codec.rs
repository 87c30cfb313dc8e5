//! Line framing for agent output streams.
//!
//! Wraps [`LinesCodec`] with a maximum line length so an agent that never
//! emits a newline cannot make the worker allocate without bound.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Maximum accepted line length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON decoder for agent stdout.
///
/// Each `\n`-terminated UTF-8 line is one payload. A line longer than
/// [`MAX_LINE_BYTES`] is logged and discarded inside the codec; decoding
/// resumes at the next newline, so the surrounding `FramedRead` never sees
/// a framing error and keeps the stream open.
#[derive(Debug)]
pub struct AgentStreamCodec(LinesCodec);

impl AgentStreamCodec {
    /// Codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max))
    }
}

impl Default for AgentStreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AgentStreamCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode(src) {
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(
                        max = self.0.max_length(),
                        "agent output line exceeds maximum length, discarding"
                    );
                }
                other => return other.map_err(map_codec_error),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode_eof(src) {
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(
                        max = self.0.max_length(),
                        "trailing agent output line exceeds maximum length, discarding"
                    );
                }
                other => return other.map_err(map_codec_error),
            }
        }
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Execution("line too long: exceeded maximum line length".into())
        }
    }
}
