use thiserror::Error;

use crate::pixel::EncodingId;

/// Errors raised by the byte window and byte sink.
///
/// Once a [`ByteWindow`](crate::io::ByteWindow) reports one of these, the
/// first failure is retained and the stream stays failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Operation not permitted in the current stream state
    #[error("Illegal stream state: {0}")]
    IllegalState(&'static str),

    /// Requested rewind exceeds the retained history
    #[error("Putback failed: requested {requested} bytes, only {retained} retained")]
    PutbackFailed { requested: usize, retained: usize },

    /// Backing storage could not be allocated
    #[error("Allocation failure: {0} bytes")]
    AllocationFailure(usize),
}

/// Errors from the codec registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No factory is registered for this encoding
    #[error("No codec registered for {0}")]
    NotFound(EncodingId),
}

/// Errors reported by codec plugins.
///
/// These are propagated verbatim through the orchestrator; callers may retry
/// with different policy options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Frame geometry or pixel data is incompatible with the codec
    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    /// The codec cannot perform the color model conversion required
    #[error("Unsupported color conversion: {0}")]
    ColorConversionUnsupported(String),

    /// Input ended before the frame was complete
    #[error("Truncated input: {0}")]
    Truncated(String),

    /// Failure inside the codec implementation
    #[error("Codec internal failure: {0}")]
    Internal(String),
}

/// Errors surfaced by [`Transcoder`](crate::transcode::Transcoder).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscodeError {
    /// A required decode or encode step has no registered codec
    #[error("No codec available for {0}")]
    NoCodecAvailable(EncodingId),

    /// The representation cache is in an impossible state
    #[error("Cache inconsistency: {0}")]
    CacheInconsistency(String),

    /// Decoder kept suspending after the input was exhausted
    #[error("Decoder for {encoding} suspended after end of input (frame {frame})")]
    StalledDecoder { encoding: EncodingId, frame: usize },

    /// Stream bookkeeping error
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Codec reported error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl From<RegistryError> for TranscodeError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => TranscodeError::NoCodecAvailable(id),
        }
    }
}
