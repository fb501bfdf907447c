//! Frame geometry and pixel semantics.
//!
//! These values come from the container layer (Rows, Columns, Samples per
//! Pixel, Bits Allocated, Pixel Representation, Planar Configuration,
//! Photometric Interpretation) and are read-only inputs to codecs.

use serde::Serialize;

use crate::error::CodecError;

/// Photometric interpretation of the pixel samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColorModel {
    Monochrome1,
    Monochrome2,
    PaletteColor,
    Rgb,
    YbrFull,
    YbrFull422,
    YbrPartial420,
    YbrIct,
    YbrRct,
}

impl ColorModel {
    /// DICOM defined term.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ColorModel::Monochrome1 => "MONOCHROME1",
            ColorModel::Monochrome2 => "MONOCHROME2",
            ColorModel::PaletteColor => "PALETTE COLOR",
            ColorModel::Rgb => "RGB",
            ColorModel::YbrFull => "YBR_FULL",
            ColorModel::YbrFull422 => "YBR_FULL_422",
            ColorModel::YbrPartial420 => "YBR_PARTIAL_420",
            ColorModel::YbrIct => "YBR_ICT",
            ColorModel::YbrRct => "YBR_RCT",
        }
    }

    /// Parse a DICOM defined term, ignoring trailing padding.
    pub fn from_dicom(value: &str) -> Option<Self> {
        Some(match value.trim_end_matches(['\0', ' ']) {
            "MONOCHROME1" => ColorModel::Monochrome1,
            "MONOCHROME2" => ColorModel::Monochrome2,
            "PALETTE COLOR" => ColorModel::PaletteColor,
            "RGB" => ColorModel::Rgb,
            "YBR_FULL" => ColorModel::YbrFull,
            "YBR_FULL_422" => ColorModel::YbrFull422,
            "YBR_PARTIAL_420" => ColorModel::YbrPartial420,
            "YBR_ICT" => ColorModel::YbrIct,
            "YBR_RCT" => ColorModel::YbrRct,
            _ => return None,
        })
    }

    /// Number of samples per pixel implied by this model.
    pub const fn samples_per_pixel(&self) -> u16 {
        match self {
            ColorModel::Monochrome1 | ColorModel::Monochrome2 | ColorModel::PaletteColor => 1,
            _ => 3,
        }
    }

    pub const fn is_ybr(&self) -> bool {
        matches!(
            self,
            ColorModel::YbrFull
                | ColorModel::YbrFull422
                | ColorModel::YbrPartial420
                | ColorModel::YbrIct
                | ColorModel::YbrRct
        )
    }
}

/// Layout of multi-sample pixels in native frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum PlanarConfiguration {
    /// R1G1B1 R2G2B2 ...
    #[default]
    Interleaved,
    /// R1R2... G1G2... B1B2...
    Planar,
}

/// Geometry shared by all frames of one image payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FrameGeometry {
    pub rows: u16,
    pub columns: u16,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    /// Pixel Representation 1
    pub signed: bool,
    pub planar_configuration: PlanarConfiguration,
    pub number_of_frames: u32,
    /// Nominal photometric interpretation of the seed data
    pub color_model: ColorModel,
}

impl FrameGeometry {
    /// Single-frame monochrome geometry with `bits_stored == bits_allocated`.
    pub fn monochrome(rows: u16, columns: u16, bits_allocated: u16) -> Self {
        Self {
            rows,
            columns,
            samples_per_pixel: 1,
            bits_allocated,
            bits_stored: bits_allocated,
            signed: false,
            planar_configuration: PlanarConfiguration::Interleaved,
            number_of_frames: 1,
            color_model: ColorModel::Monochrome2,
        }
    }

    /// Single-frame 8-bit RGB geometry.
    pub fn rgb(rows: u16, columns: u16) -> Self {
        Self {
            samples_per_pixel: 3,
            color_model: ColorModel::Rgb,
            ..Self::monochrome(rows, columns, 8)
        }
    }

    pub fn with_frames(mut self, number_of_frames: u32) -> Self {
        self.number_of_frames = number_of_frames;
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    pub fn with_planar_configuration(mut self, planar: PlanarConfiguration) -> Self {
        self.planar_configuration = planar;
        self
    }

    /// Bytes used to hold one sample.
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_allocated as usize).div_ceil(8)
    }

    #[inline]
    pub fn pixels_per_frame(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    /// Length of one native frame in bytes (unpadded).
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.pixels_per_frame() * self.samples_per_pixel as usize * self.bytes_per_sample()
    }

    /// Byte offset of sample `sample` of pixel `pixel` in a native frame.
    #[inline]
    pub fn sample_offset(&self, pixel: usize, sample: usize) -> usize {
        let bps = self.bytes_per_sample();
        match self.planar_configuration {
            PlanarConfiguration::Interleaved => {
                (pixel * self.samples_per_pixel as usize + sample) * bps
            }
            PlanarConfiguration::Planar => (sample * self.pixels_per_frame() + pixel) * bps,
        }
    }

    /// Check the geometry is usable by byte-oriented codecs.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.rows == 0 || self.columns == 0 {
            return Err(CodecError::FormatMismatch(format!(
                "empty frame: {}x{}",
                self.columns, self.rows
            )));
        }
        if self.samples_per_pixel == 0 {
            return Err(CodecError::FormatMismatch(
                "samples per pixel must be at least 1".to_string(),
            ));
        }
        if self.bits_allocated == 0 || self.bits_allocated % 8 != 0 || self.bits_allocated > 32 {
            return Err(CodecError::FormatMismatch(format!(
                "unsupported bits allocated: {}",
                self.bits_allocated
            )));
        }
        if self.bits_stored == 0 || self.bits_stored > self.bits_allocated {
            return Err(CodecError::FormatMismatch(format!(
                "bits stored {} exceeds bits allocated {}",
                self.bits_stored, self.bits_allocated
            )));
        }
        Ok(())
    }
}
