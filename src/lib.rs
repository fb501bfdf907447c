//! # dcm-transcoder
//!
//! Streaming transcoding of DICOM pixel data between transfer syntaxes.
//!
//! Pixel data parsed out of a DICOM container is wrapped in an
//! [`ImagePayload`], which remembers every encoding materialized for it. The
//! [`Transcoder`] turns a request for an encoding into codec work: it reuses
//! cached representations, routes compressed to compressed conversions
//! through the native form, and only caches complete results.
//!
//! ## Features
//!
//! - **Bounded streaming**: decoders pull compressed bytes through a
//!   [`ByteWindow`] with a fixed backup ring for putback, and may suspend
//!   when input runs dry
//! - **Pluggable codecs**: factories are registered per encoding in a shared,
//!   reference-counted [`CodecRegistry`]
//! - **Built-in codecs**: RLE Lossless, JPEG Baseline and JPEG 2000 (decode)
//! - **Lossy tracking**: payloads report which lossy steps they went through
//!
//! ## Architecture
//!
//! - [`io`] - byte window and byte sink
//! - [`codec`] - codec traits, registry, built-in codecs and detection
//! - [`pixel`] - encodings, frame geometry, representations and payloads
//! - [`transcode`] - the transcoding orchestrator
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use dcm_transcoder::{
//!     register_builtin_codecs, CodecPolicy, CodecRegistry, EncodingId, EncodingParameters,
//!     FrameGeometry, ImagePayload, Transcoder,
//! };
//!
//! let registry = Arc::new(CodecRegistry::new());
//! let _tokens = register_builtin_codecs(&registry, CodecPolicy::default());
//! let transcoder = Transcoder::new(registry);
//!
//! let geometry = FrameGeometry::monochrome(2, 2, 8);
//! let mut payload = ImagePayload::from_native_buffer(geometry, Bytes::from_static(&[1, 1, 1, 2])).unwrap();
//!
//! let params = EncodingParameters::new();
//! let rle = transcoder.transcode(&mut payload, &EncodingId::RLE_LOSSLESS, &params).unwrap();
//! assert_eq!(rle.frame_count(), 1);
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod io;
pub mod pixel;
pub mod transcode;

// Re-export commonly used types
pub use codec::{
    detect_encoding, register_builtin_codecs, CodecCapability, CodecPolicy, CodecRegistry,
    ColorConversion, DecodeStatus, Decoder, DecoderFactory, EncodedFrame, Encoder, EncoderFactory,
    RegistrationToken,
};
pub use config::{Cli, Command, Config};
pub use error::{CodecError, RegistryError, StreamError, TranscodeError};
pub use io::{ByteSink, ByteWindow};
pub use pixel::{
    ColorModel, EncodingId, EncodingParameters, FrameGeometry, ImagePayload,
    PlanarConfiguration, Representation, RepresentationCache,
};
pub use transcode::{TranscodeOptions, Transcoder};
