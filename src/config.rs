//! Configuration management for the transcoder CLI.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `DCMX_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use dcm_transcoder::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Transcode(config) = cli.command {
//!     let options = config.pipeline.transcode_options();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `DCMX_BACKUP_CAPACITY` - Backup ring capacity per decode window (default: 1024)
//! - `DCMX_INPUT_CHUNK` - Compressed bytes handed to a decoder per step (default: 65536)
//! - `DCMX_DETECT` - Detect the real encoding of compressed input (default: false)
//! - `DCMX_COLOR_CONVERSION` - `always` or `never` (default: always)
//! - `DCMX_REVERSE_BYTE_ORDER` - Swap RLE byte planes of multi-byte samples (default: false)
//! - `DCMX_TARGET` - Default target encoding for `transcode` (default: RLE Lossless)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::codec::{CodecPolicy, ColorConversion};
use crate::io::DEFAULT_BACKUP_CAPACITY;
use crate::pixel::{ColorModel, EncodingId, EncodingParameters, FrameGeometry, PlanarConfiguration};
use crate::transcode::{TranscodeOptions, DEFAULT_INPUT_CHUNK_SIZE};

// =============================================================================
// Default Values
// =============================================================================

/// Largest accepted backup ring (16 MiB).
pub const MAX_BACKUP_CAPACITY: usize = 16 * 1024 * 1024;

/// Default target encoding alias.
pub const DEFAULT_TARGET: &str = "rle";

// =============================================================================
// CLI Structure
// =============================================================================

/// dcm-transcoder - Streaming DICOM pixel data transcoding.
#[derive(Parser, Debug)]
#[command(name = "dcm-transcoder")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Transcode one raw pixel data file into another encoding
    Transcode(TranscodeConfig),

    /// List the built-in codecs as JSON
    Codecs(CodecsConfig),

    /// Report the encoding detected from a file's leading bytes
    Detect(DetectConfig),
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Settings shared by every command that runs codecs.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Backup ring capacity of each decode window, in bytes.
    #[arg(long, default_value_t = DEFAULT_BACKUP_CAPACITY, env = "DCMX_BACKUP_CAPACITY")]
    pub backup_capacity: usize,

    /// Compressed bytes attached per decode step.
    #[arg(long, default_value_t = DEFAULT_INPUT_CHUNK_SIZE, env = "DCMX_INPUT_CHUNK")]
    pub input_chunk: usize,

    /// Detect the real encoding of compressed input from its leading bytes.
    #[arg(long, default_value_t = false, env = "DCMX_DETECT")]
    pub detect: bool,

    /// Whether decoders may convert YBR color data to RGB.
    #[arg(long, value_enum, default_value_t = ColorConversion::Always, env = "DCMX_COLOR_CONVERSION")]
    pub color_conversion: ColorConversion,

    /// Swap byte planes of multi-byte samples after RLE decompression.
    #[arg(long, default_value_t = false, env = "DCMX_REVERSE_BYTE_ORDER")]
    pub reverse_byte_order: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_capacity: DEFAULT_BACKUP_CAPACITY,
            input_chunk: DEFAULT_INPUT_CHUNK_SIZE,
            detect: false,
            color_conversion: ColorConversion::Always,
            reverse_byte_order: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.backup_capacity > MAX_BACKUP_CAPACITY {
            return Err(format!(
                "backup_capacity must be at most {} bytes",
                MAX_BACKUP_CAPACITY
            ));
        }
        if self.input_chunk == 0 {
            return Err("input_chunk must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn transcode_options(&self) -> TranscodeOptions {
        TranscodeOptions {
            backup_capacity: self.backup_capacity,
            input_chunk_size: self.input_chunk,
            detect_encoding: self.detect,
        }
    }

    pub fn codec_policy(&self) -> CodecPolicy {
        CodecPolicy {
            color_conversion: self.color_conversion,
            reverse_byte_order: self.reverse_byte_order,
        }
    }
}

// =============================================================================
// Transcode Command
// =============================================================================

/// Arguments of the `transcode` command.
///
/// The input file holds either all native frames back to back, or a single
/// compressed frame when `--source` names a compressed encoding.
#[derive(Args, Debug, Clone)]
pub struct TranscodeConfig {
    /// Input pixel data file.
    pub input: PathBuf,

    /// Output file receiving the encoded frames back to back.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Encoding of the input (UID or alias).
    #[arg(long, default_value = "native")]
    pub source: String,

    /// Target encoding (UID or alias: native, rle, jpeg-baseline, ...).
    #[arg(short, long, default_value = DEFAULT_TARGET, env = "DCMX_TARGET")]
    pub target: String,

    /// Quality for lossy targets (1-100).
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// Rows per frame.
    #[arg(long)]
    pub rows: u16,

    /// Columns per frame.
    #[arg(long)]
    pub columns: u16,

    /// Samples per pixel.
    #[arg(long, default_value_t = 1)]
    pub samples_per_pixel: u16,

    /// Bits allocated per sample.
    #[arg(long, default_value_t = 8)]
    pub bits_allocated: u16,

    /// Bits stored per sample (defaults to bits allocated).
    #[arg(long)]
    pub bits_stored: Option<u16>,

    /// Samples are signed.
    #[arg(long, default_value_t = false)]
    pub signed: bool,

    /// Samples are stored color-by-plane.
    #[arg(long, default_value_t = false)]
    pub planar: bool,

    /// Number of frames in the input.
    #[arg(long, default_value_t = 1)]
    pub frames: u32,

    /// Photometric interpretation of the input.
    #[arg(long, default_value = "MONOCHROME2")]
    pub photometric: String,

    #[command(flatten)]
    pub pipeline: Config,
}

impl TranscodeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.pipeline.validate()?;

        if let Some(quality) = self.quality {
            if quality == 0 || quality > 100 {
                return Err("quality must be between 1 and 100".to_string());
            }
        }
        if self.frames == 0 {
            return Err("frames must be greater than 0".to_string());
        }
        if !self.source_encoding().is_native() && self.frames != 1 {
            return Err("compressed input must hold exactly one frame".to_string());
        }

        let geometry = self.geometry()?;
        geometry.validate().map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Frame geometry described by the arguments.
    pub fn geometry(&self) -> Result<FrameGeometry, String> {
        let color_model = ColorModel::from_dicom(&self.photometric)
            .ok_or_else(|| format!("unknown photometric interpretation: {}", self.photometric))?;
        if color_model.samples_per_pixel() != self.samples_per_pixel {
            return Err(format!(
                "{} needs {} samples per pixel, got {}",
                color_model.as_str(),
                color_model.samples_per_pixel(),
                self.samples_per_pixel
            ));
        }

        let planar_configuration = if self.planar {
            PlanarConfiguration::Planar
        } else {
            PlanarConfiguration::Interleaved
        };
        Ok(FrameGeometry {
            rows: self.rows,
            columns: self.columns,
            samples_per_pixel: self.samples_per_pixel,
            bits_allocated: self.bits_allocated,
            bits_stored: self.bits_stored.unwrap_or(self.bits_allocated),
            signed: self.signed,
            planar_configuration,
            number_of_frames: self.frames,
            color_model,
        })
    }

    pub fn source_encoding(&self) -> EncodingId {
        parse_encoding(&self.source)
    }

    pub fn target_encoding(&self) -> EncodingId {
        parse_encoding(&self.target)
    }

    /// Encoding parameters for the target.
    pub fn target_params(&self) -> EncodingParameters {
        match self.quality {
            Some(quality) => EncodingParameters::new().with(EncodingParameters::QUALITY, quality),
            None => EncodingParameters::new(),
        }
    }
}

// =============================================================================
// Codecs / Detect Commands
// =============================================================================

/// Arguments of the `codecs` command.
#[derive(Args, Debug, Clone)]
pub struct CodecsConfig {
    #[command(flatten)]
    pub pipeline: Config,
}

/// Arguments of the `detect` command.
#[derive(Args, Debug, Clone)]
pub struct DetectConfig {
    /// File holding one compressed frame.
    pub input: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Resolve an encoding alias or UID.
///
/// Aliases are case-insensitive; anything else is taken as a UID.
pub fn parse_encoding(value: &str) -> EncodingId {
    match value.to_ascii_lowercase().as_str() {
        "native" | "explicit-le" => EncodingId::NATIVE,
        "implicit-le" => EncodingId::IMPLICIT_VR_LITTLE_ENDIAN,
        "rle" => EncodingId::RLE_LOSSLESS,
        "jpeg-baseline" | "jpeg" => EncodingId::JPEG_BASELINE,
        "jpeg-extended" => EncodingId::JPEG_EXTENDED,
        "jpeg-lossless" => EncodingId::JPEG_LOSSLESS_SV1,
        "jpeg-ls" => EncodingId::JPEG_LS_LOSSLESS,
        "jpeg2000-lossless" | "j2k-lossless" => EncodingId::JPEG2000_LOSSLESS,
        "jpeg2000" | "j2k" => EncodingId::JPEG2000,
        _ => EncodingId::new(value),
    }
}

// =============================================================================
// Tests
// =============================================================================
