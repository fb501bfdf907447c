//! Codec plugin contract and built-in codecs.
//!
//! A codec plugin contributes a [`DecoderFactory`] and/or an
//! [`EncoderFactory`] for one [`EncodingId`] through the [`CodecRegistry`].
//! Factories create short-lived [`Decoder`] / [`Encoder`] instances, one per
//! frame.
//!
//! # Decoding
//!
//! Decoders pull compressed bytes from a [`ByteWindow`] and write native
//! samples into a caller-owned output buffer sized for one frame. When the
//! window runs dry a decoder keeps its progress internally and returns
//! [`DecodeStatus::Suspend`]; the caller attaches more input and calls again
//! with the same output buffer.
//!
//! ```text
//!   attach(chunk 0) ──► decode() ── Suspend ──► detach, attach(chunk 1) ──► decode() ── Normal
//! ```
//!
//! # Built-in codecs
//!
//! - [`rle`]: RLE Lossless decoder and encoder
//! - [`jpeg`]: JPEG Baseline decoder and encoder
//! - [`jpeg2000`]: JPEG 2000 decoder (whole-frame, never suspends)

pub mod detect;
pub mod jpeg;
pub mod jpeg2000;
mod registry;
pub mod rle;

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::error::CodecError;
use crate::io::ByteWindow;
use crate::pixel::{ColorModel, EncodingId, EncodingParameters, FrameGeometry};

pub use detect::detect_encoding;
pub use registry::{CodecCapability, CodecRegistry, RegistrationToken, ResolvedCodec};

// =============================================================================
// Policy
// =============================================================================

/// Whether decoders may change the color model of decoded frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, clap::ValueEnum)]
pub enum ColorConversion {
    /// Convert to RGB when the codec library requires it (YCbCr → RGB)
    #[default]
    Always,
    /// Fail with `ColorConversionUnsupported` instead of converting
    Never,
}

/// Options supplied with a codec registration and handed to its factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct CodecPolicy {
    pub color_conversion: ColorConversion,
    /// Swap byte order of multi-byte samples after RLE decompression.
    ///
    /// Works around encoders that emit least significant byte segments
    /// first.
    pub reverse_byte_order: bool,
}

// =============================================================================
// Decoder / Encoder
// =============================================================================

/// Outcome of one [`Decoder::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// The frame is complete
    Normal,
    /// More input is needed; call again with the same output buffer
    Suspend,
}

/// Per-frame decoder instance.
///
/// Not reentrant: one instance decodes exactly one frame.
pub trait Decoder: Send {
    /// Decode as much as the window allows into `output`.
    ///
    /// `output` must be at least one native frame long and must be the same
    /// buffer on every call for the frame.
    fn decode(
        &mut self,
        input: &mut ByteWindow,
        output: &mut [u8],
        is_signed: bool,
    ) -> Result<DecodeStatus, CodecError>;

    /// Color model of the decoded samples.
    ///
    /// Only meaningful after `decode` returned [`DecodeStatus::Normal`].
    fn color_model(&self) -> ColorModel;

    /// Whether this decoder can make progress on partial input.
    ///
    /// Decoders returning `false` are handed the whole frame at once.
    fn supports_suspend(&self) -> bool {
        true
    }
}

/// Result of encoding one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub data: Bytes,
    /// Color model of the encoded data
    pub color_model: ColorModel,
    pub lossy: bool,
}

/// Per-frame encoder instance.
pub trait Encoder: Send {
    /// Encode one native frame in a single call.
    fn encode(
        &mut self,
        geometry: &FrameGeometry,
        color_model: ColorModel,
        frame: &[u8],
    ) -> Result<EncodedFrame, CodecError>;
}

/// Creates decoders for one encoding.
pub trait DecoderFactory: Send + Sync {
    /// Short name used in logs and capability listings.
    fn name(&self) -> &str;

    /// `geometry.color_model` is the color model of the encoded source.
    fn create(
        &self,
        geometry: &FrameGeometry,
        params: &EncodingParameters,
        policy: &CodecPolicy,
    ) -> Result<Box<dyn Decoder>, CodecError>;
}

/// Creates encoders for one encoding.
pub trait EncoderFactory: Send + Sync {
    fn name(&self) -> &str;

    fn create(
        &self,
        geometry: &FrameGeometry,
        params: &EncodingParameters,
        policy: &CodecPolicy,
    ) -> Result<Box<dyn Encoder>, CodecError>;
}

// =============================================================================
// Built-in Registration
// =============================================================================

/// Register every built-in codec with `registry`.
///
/// Returns one token per registration; hand them back to
/// [`CodecRegistry::unregister`] on teardown.
pub fn register_builtin_codecs(
    registry: &CodecRegistry,
    policy: CodecPolicy,
) -> Vec<RegistrationToken> {
    let jpeg2000_decoder: Arc<dyn DecoderFactory> = Arc::new(jpeg2000::Jpeg2000DecoderFactory);
    vec![
        registry.register(
            EncodingId::RLE_LOSSLESS,
            Some(Arc::new(rle::RleDecoderFactory)),
            Some(Arc::new(rle::RleEncoderFactory)),
            policy,
        ),
        registry.register(
            EncodingId::JPEG_BASELINE,
            Some(Arc::new(jpeg::JpegBaselineDecoderFactory)),
            Some(Arc::new(jpeg::JpegBaselineEncoderFactory)),
            policy,
        ),
        registry.register(
            EncodingId::JPEG2000_LOSSLESS,
            Some(jpeg2000_decoder.clone()),
            None,
            policy,
        ),
        registry.register(EncodingId::JPEG2000, Some(jpeg2000_decoder), None, policy),
    ]
}

/// Write `value` as sample `sample` of pixel `pixel` into a native frame.
#[inline]
pub(crate) fn put_sample(
    geometry: &FrameGeometry,
    frame: &mut [u8],
    pixel: usize,
    sample: usize,
    value: i32,
) {
    let offset = geometry.sample_offset(pixel, sample);
    let bytes = value.to_le_bytes();
    let bps = geometry.bytes_per_sample();
    frame[offset..offset + bps].copy_from_slice(&bytes[..bps]);
}

/// Convert a native frame into interleaved sample order.
pub(crate) fn to_interleaved(geometry: &FrameGeometry, frame: &[u8]) -> Vec<u8> {
    let bps = geometry.bytes_per_sample();
    let spp = geometry.samples_per_pixel as usize;
    let mut out = Vec::with_capacity(geometry.frame_len());
    for pixel in 0..geometry.pixels_per_frame() {
        for sample in 0..spp {
            let offset = geometry.sample_offset(pixel, sample);
            out.extend_from_slice(&frame[offset..offset + bps]);
        }
    }
    out
}
