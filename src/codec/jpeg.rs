//! JPEG Baseline (Process 1) codec.
//!
//! Both directions go through the `image` crate, which works on complete
//! in-memory streams. The decoder therefore collects compressed input,
//! suspending until the end of the stream, and then decodes the frame in one
//! pass. An EOI marker is not a reliable end: APP segments may embed whole
//! JPEG thumbnails.
//!
//! # Color model
//!
//! Color JPEG data is stored as YCbCr and the `image` decoder always converts
//! it to RGB. The decoder reports [`ColorModel::Rgb`] for color frames; with
//! [`ColorConversion::Never`] a YBR source fails with
//! [`CodecError::ColorConversionUnsupported`] instead.
//!
//! # Design Decisions
//!
//! - **8-bit only**: Process 1 carries 8-bit samples; other depths are a
//!   format mismatch.
//! - **Quality control**: the encoder reads the `quality` parameter (1-100),
//!   so each quality is a distinct cached representation.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, ImageReader};
use tracing::debug;

use crate::error::CodecError;
use crate::io::ByteWindow;
use crate::pixel::{ColorModel, EncodingParameters, FrameGeometry};

use super::{
    put_sample, to_interleaved, CodecPolicy, ColorConversion, DecodeStatus, Decoder,
    DecoderFactory, EncodedFrame, Encoder, EncoderFactory,
};

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Size of the collection buffer grown per read.
const READ_CHUNK: usize = 16 * 1024;

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

fn check_baseline_geometry(geometry: &FrameGeometry, is_signed: bool) -> Result<(), CodecError> {
    geometry.validate()?;
    if geometry.bits_allocated != 8 {
        return Err(CodecError::FormatMismatch(format!(
            "JPEG baseline needs 8-bit samples, got {}",
            geometry.bits_allocated
        )));
    }
    if !matches!(geometry.samples_per_pixel, 1 | 3) {
        return Err(CodecError::FormatMismatch(format!(
            "JPEG baseline supports 1 or 3 components, got {}",
            geometry.samples_per_pixel
        )));
    }
    if is_signed && geometry.samples_per_pixel == 3 {
        return Err(CodecError::FormatMismatch(
            "signedness conflict: color JPEG data cannot be signed".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Decoder
// =============================================================================

/// Creates [`JpegBaselineDecoder`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegBaselineDecoderFactory;

impl DecoderFactory for JpegBaselineDecoderFactory {
    fn name(&self) -> &str {
        "jpeg-baseline"
    }

    fn create(
        &self,
        geometry: &FrameGeometry,
        _params: &EncodingParameters,
        policy: &CodecPolicy,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        Ok(Box::new(JpegBaselineDecoder::new(
            geometry.clone(),
            policy.color_conversion,
        )))
    }
}

/// Collecting JPEG Baseline decoder.
#[derive(Debug)]
pub struct JpegBaselineDecoder {
    geometry: FrameGeometry,
    color_conversion: ColorConversion,
    compressed: Vec<u8>,
    color_model: ColorModel,
}

impl JpegBaselineDecoder {
    pub fn new(geometry: FrameGeometry, color_conversion: ColorConversion) -> Self {
        let color_model = geometry.color_model;
        Self {
            geometry,
            color_conversion,
            compressed: Vec::new(),
            color_model,
        }
    }

    fn drain(&mut self, input: &mut ByteWindow) {
        loop {
            let start = self.compressed.len();
            self.compressed.resize(start + READ_CHUNK, 0);
            let n = input.read(&mut self.compressed[start..]);
            self.compressed.truncate(start + n);
            if n == 0 {
                break;
            }
        }
    }

    fn decode_collected(&mut self, output: &mut [u8]) -> Result<(), CodecError> {
        // Header check before paying for the full decode
        let (width, height) = dimensions(&self.compressed)?;
        if width != self.geometry.columns as u32 || height != self.geometry.rows as u32 {
            return Err(CodecError::FormatMismatch(format!(
                "JPEG frame is {}x{}, expected {}x{}",
                width, height, self.geometry.columns, self.geometry.rows
            )));
        }

        let img = image::load_from_memory_with_format(&self.compressed, ImageFormat::Jpeg)
            .map_err(|e| CodecError::Internal(e.to_string()))?;

        let channels = img.color().channel_count() as u16;
        if channels != self.geometry.samples_per_pixel {
            return Err(CodecError::FormatMismatch(format!(
                "JPEG frame has {} components, expected {}",
                channels, self.geometry.samples_per_pixel
            )));
        }

        let samples = if channels == 1 {
            img.to_luma8().into_raw()
        } else {
            if self.geometry.color_model.is_ybr() && self.color_conversion == ColorConversion::Never
            {
                return Err(CodecError::ColorConversionUnsupported(format!(
                    "{} data would be converted to RGB",
                    self.geometry.color_model.as_str()
                )));
            }
            self.color_model = ColorModel::Rgb;
            img.to_rgb8().into_raw()
        };

        let spp = channels as usize;
        for (i, value) in samples.iter().enumerate() {
            put_sample(&self.geometry, output, i / spp, i % spp, *value as i32);
        }
        Ok(())
    }
}

impl Decoder for JpegBaselineDecoder {
    fn decode(
        &mut self,
        input: &mut ByteWindow,
        output: &mut [u8],
        is_signed: bool,
    ) -> Result<DecodeStatus, CodecError> {
        check_baseline_geometry(&self.geometry, is_signed)?;
        if output.len() < self.geometry.frame_len() {
            return Err(CodecError::FormatMismatch(format!(
                "output buffer holds {} bytes, frame needs {}",
                output.len(),
                self.geometry.frame_len()
            )));
        }

        self.drain(input);
        if !input.is_eos() {
            return Ok(DecodeStatus::Suspend);
        }
        if self.compressed.is_empty() {
            return Err(CodecError::Truncated("empty JPEG frame".to_string()));
        }

        debug!(bytes = self.compressed.len(), "Decoding JPEG baseline frame");
        self.decode_collected(output)?;
        Ok(DecodeStatus::Normal)
    }

    fn color_model(&self) -> ColorModel {
        self.color_model
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Creates [`JpegBaselineEncoder`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegBaselineEncoderFactory;

impl EncoderFactory for JpegBaselineEncoderFactory {
    fn name(&self) -> &str {
        "jpeg-baseline"
    }

    fn create(
        &self,
        _geometry: &FrameGeometry,
        params: &EncodingParameters,
        _policy: &CodecPolicy,
    ) -> Result<Box<dyn Encoder>, CodecError> {
        let quality = params
            .get_u8(EncodingParameters::QUALITY)
            .map(clamp_quality)
            .unwrap_or(DEFAULT_JPEG_QUALITY);
        Ok(Box::new(JpegBaselineEncoder::new(quality)))
    }
}

/// JPEG Baseline encoder at a fixed quality.
#[derive(Debug, Clone)]
pub struct JpegBaselineEncoder {
    quality: u8,
}

impl JpegBaselineEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: clamp_quality(quality),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Encoder for JpegBaselineEncoder {
    fn encode(
        &mut self,
        geometry: &FrameGeometry,
        color_model: ColorModel,
        frame: &[u8],
    ) -> Result<EncodedFrame, CodecError> {
        check_baseline_geometry(geometry, geometry.signed)?;
        if frame.len() < geometry.frame_len() {
            return Err(CodecError::Truncated(format!(
                "frame has {} bytes, expected {}",
                frame.len(),
                geometry.frame_len()
            )));
        }

        let (color_type, encoded_model) = match geometry.samples_per_pixel {
            1 => (ExtendedColorType::L8, color_model),
            _ if color_model == ColorModel::Rgb => (ExtendedColorType::Rgb8, ColorModel::YbrFull422),
            _ => {
                return Err(CodecError::ColorConversionUnsupported(format!(
                    "JPEG baseline encoder expects RGB input, got {}",
                    color_model.as_str()
                )))
            }
        };

        let samples = to_interleaved(geometry, &frame[..geometry.frame_len()]);
        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.quality);
        encoder
            .encode(
                &samples,
                geometry.columns as u32,
                geometry.rows as u32,
                color_type,
            )
            .map_err(|e| CodecError::Internal(e.to_string()))?;

        Ok(EncodedFrame {
            data: Bytes::from(output),
            color_model: encoded_model,
            lossy: true,
        })
    }
}

/// Get image dimensions without fully decoding.
pub fn dimensions(source: &[u8]) -> Result<(u32, u32), CodecError> {
    let reader = ImageReader::with_format(Cursor::new(source), ImageFormat::Jpeg);
    reader
        .into_dimensions()
        .map_err(|e| CodecError::Internal(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
