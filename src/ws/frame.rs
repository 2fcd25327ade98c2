//! Frame decoder: newline-delimited JSON envelopes.
//!
//! A transport chunk carries one or more `{ "type", "data" }` objects
//! separated by `\n`. Each segment is parsed on its own, so a malformed
//! segment is dropped without affecting its neighbours. Segments are never
//! buffered across chunks.

use crate::domain::Envelope;
use crate::error::TelemetryError;

/// Result of decoding one chunk.
#[derive(Debug, Default)]
pub struct DecodedChunk {
    /// Well-formed envelopes, in segment order.
    pub envelopes: Vec<Envelope>,
    /// Segments that failed to decode, with their index in the chunk.
    pub rejected: Vec<(usize, TelemetryError)>,
}

/// Splits `chunk` on newlines and decodes every non-empty segment.
///
/// Empty and whitespace-only segments are skipped silently; a trailing `\r`
/// is tolerated. A segment that fails to decode is logged at `warn` and
/// recorded in [`DecodedChunk::rejected`].
#[must_use]
pub fn decode_chunk(chunk: &str) -> DecodedChunk {
    let mut decoded = DecodedChunk::default();
    for (index, segment) in chunk.split('\n').enumerate() {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match Envelope::parse(segment) {
            Ok(envelope) => decoded.envelopes.push(envelope),
            Err(err) => {
                tracing::warn!(
                    segment = index,
                    code = err.error_code(),
                    error = %err,
                    "dropping malformed frame"
                );
                decoded.rejected.push((index, err));
            }
        }
    }
    decoded
}
