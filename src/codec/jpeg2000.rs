//! JPEG 2000 decoder (lossless and lossy).
//!
//! Backed by OpenJPEG through the `jpeg2k` crate, which only decodes complete
//! codestreams held in memory. The decoder advertises that it cannot make
//! progress on partial input, so the transcoder hands it the whole frame in
//! one window.
//!
//! Encoding JPEG 2000 is not provided.

use tracing::debug;

use crate::error::CodecError;
use crate::io::ByteWindow;
use crate::pixel::{ColorModel, EncodingParameters, FrameGeometry};

use super::{put_sample, CodecPolicy, DecodeStatus, Decoder, DecoderFactory};

/// Creates [`Jpeg2000Decoder`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jpeg2000DecoderFactory;

impl DecoderFactory for Jpeg2000DecoderFactory {
    fn name(&self) -> &str {
        "jpeg2000"
    }

    fn create(
        &self,
        geometry: &FrameGeometry,
        _params: &EncodingParameters,
        _policy: &CodecPolicy,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        geometry.validate()?;
        Ok(Box::new(Jpeg2000Decoder::new(geometry.clone())))
    }
}

/// Color model of decoded samples for a given source model.
///
/// The inverse component transform is part of JPEG 2000 decoding, so
/// YBR_ICT and YBR_RCT data always comes out as RGB.
pub fn decoded_color_model(source: ColorModel) -> ColorModel {
    match source {
        ColorModel::YbrIct | ColorModel::YbrRct => ColorModel::Rgb,
        other => other,
    }
}

/// Whole-frame JPEG 2000 decoder.
#[derive(Debug)]
pub struct Jpeg2000Decoder {
    geometry: FrameGeometry,
    compressed: Vec<u8>,
    color_model: ColorModel,
}

impl Jpeg2000Decoder {
    pub fn new(geometry: FrameGeometry) -> Self {
        let color_model = geometry.color_model;
        Self {
            geometry,
            compressed: Vec::new(),
            color_model,
        }
    }

    fn decode_collected(&mut self, output: &mut [u8], is_signed: bool) -> Result<(), CodecError> {
        let image = jpeg2k::Image::from_bytes(&self.compressed)
            .map_err(|e| CodecError::Internal(e.to_string()))?;

        let components = image.components();
        if components.len() != self.geometry.samples_per_pixel as usize {
            return Err(CodecError::FormatMismatch(format!(
                "JPEG 2000 frame has {} components, expected {}",
                components.len(),
                self.geometry.samples_per_pixel
            )));
        }

        for (sample, component) in components.iter().enumerate() {
            if component.width() != self.geometry.columns as u32
                || component.height() != self.geometry.rows as u32
            {
                return Err(CodecError::FormatMismatch(format!(
                    "JPEG 2000 component {} is {}x{}, expected {}x{}",
                    sample,
                    component.width(),
                    component.height(),
                    self.geometry.columns,
                    self.geometry.rows
                )));
            }
            if component.is_signed() != is_signed {
                return Err(CodecError::FormatMismatch(format!(
                    "signedness conflict in component {}",
                    sample
                )));
            }
            if component.precision() > self.geometry.bits_stored as u32 {
                return Err(CodecError::FormatMismatch(format!(
                    "component precision {} exceeds {} stored bits",
                    component.precision(),
                    self.geometry.bits_stored
                )));
            }

            for (pixel, value) in component.data().iter().enumerate() {
                put_sample(&self.geometry, output, pixel, sample, *value);
            }
        }

        self.color_model = decoded_color_model(self.geometry.color_model);
        Ok(())
    }
}

impl Decoder for Jpeg2000Decoder {
    fn decode(
        &mut self,
        input: &mut ByteWindow,
        output: &mut [u8],
        is_signed: bool,
    ) -> Result<DecodeStatus, CodecError> {
        if output.len() < self.geometry.frame_len() {
            return Err(CodecError::FormatMismatch(format!(
                "output buffer holds {} bytes, frame needs {}",
                output.len(),
                self.geometry.frame_len()
            )));
        }

        let available = input.available();
        let start = self.compressed.len();
        self.compressed.resize(start + available, 0);
        let n = input.read(&mut self.compressed[start..]);
        self.compressed.truncate(start + n);

        if !input.is_eos() {
            return Ok(DecodeStatus::Suspend);
        }
        if self.compressed.is_empty() {
            return Err(CodecError::Truncated("empty JPEG 2000 frame".to_string()));
        }

        debug!(bytes = self.compressed.len(), "Decoding JPEG 2000 frame");
        self.decode_collected(output, is_signed)?;
        Ok(DecodeStatus::Normal)
    }

    fn color_model(&self) -> ColorModel {
        self.color_model
    }

    fn supports_suspend(&self) -> bool {
        false
    }
}
