//! Test utilities for integration tests.
//!
//! This module provides mock codecs that count the work they do, and helpers
//! for building payloads with predictable pixel data.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use dcm_transcoder::codec::{
    CodecPolicy, DecodeStatus, Decoder, DecoderFactory, EncodedFrame, Encoder, EncoderFactory,
};
use dcm_transcoder::error::CodecError;
use dcm_transcoder::io::ByteWindow;
use dcm_transcoder::pixel::{
    ColorModel, EncodingId, EncodingParameters, FrameGeometry, ImagePayload, PlanarConfiguration,
};

/// Private encoding handled by the copy codec.
pub const COPY: EncodingId = EncodingId::from_static("1.2.826.0.1.3680043.10.1");

// =============================================================================
// Work Counters
// =============================================================================

/// Shared counters updated by the mock codecs.
#[derive(Debug, Default)]
pub struct Counters {
    pub decoders_created: AtomicUsize,
    pub encoders_created: AtomicUsize,
    pub decode_calls: AtomicUsize,
    pub suspends: AtomicUsize,
    pub bytes_consumed: AtomicUsize,
    pub bytes_written: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn decoders(&self) -> usize {
        Self::get(&self.decoders_created)
    }

    pub fn encoders(&self) -> usize {
        Self::get(&self.encoders_created)
    }

    /// Total number of codec instances created.
    pub fn codec_work(&self) -> usize {
        self.decoders() + self.encoders()
    }
}

// =============================================================================
// Copy Codec
// =============================================================================

/// Lossless codec whose encoded form is the native frame itself.
///
/// The decoder copies whatever the window offers and suspends until the
/// frame is full, so tests can observe every step of the decode loop.
#[derive(Debug, Clone, Default)]
pub struct CopyCodec {
    pub counters: Arc<Counters>,
}

impl CopyCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

struct CopyDecoder {
    frame_len: usize,
    written: usize,
    color_model: ColorModel,
    counters: Arc<Counters>,
}

impl Decoder for CopyDecoder {
    fn decode(
        &mut self,
        input: &mut ByteWindow,
        output: &mut [u8],
        _is_signed: bool,
    ) -> Result<DecodeStatus, CodecError> {
        self.counters.decode_calls.fetch_add(1, Ordering::SeqCst);

        let n = input.read(&mut output[self.written..self.frame_len]);
        self.written += n;
        self.counters.bytes_consumed.fetch_add(n, Ordering::SeqCst);
        self.counters.bytes_written.fetch_add(n, Ordering::SeqCst);

        if self.written == self.frame_len {
            Ok(DecodeStatus::Normal)
        } else if input.is_eos() {
            Err(CodecError::Truncated(format!(
                "copy frame ended after {} of {} bytes",
                self.written, self.frame_len
            )))
        } else {
            self.counters.suspends.fetch_add(1, Ordering::SeqCst);
            Ok(DecodeStatus::Suspend)
        }
    }

    fn color_model(&self) -> ColorModel {
        self.color_model
    }
}

struct CopyEncoder;

impl Encoder for CopyEncoder {
    fn encode(
        &mut self,
        _geometry: &FrameGeometry,
        color_model: ColorModel,
        frame: &[u8],
    ) -> Result<EncodedFrame, CodecError> {
        Ok(EncodedFrame {
            data: Bytes::copy_from_slice(frame),
            color_model,
            lossy: false,
        })
    }
}

impl DecoderFactory for CopyCodec {
    fn name(&self) -> &str {
        "copy"
    }

    fn create(
        &self,
        geometry: &FrameGeometry,
        _params: &EncodingParameters,
        _policy: &CodecPolicy,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        self.counters.decoders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CopyDecoder {
            frame_len: geometry.frame_len(),
            written: 0,
            color_model: geometry.color_model,
            counters: self.counters.clone(),
        }))
    }
}

impl EncoderFactory for CopyCodec {
    fn name(&self) -> &str {
        "copy"
    }

    fn create(
        &self,
        _geometry: &FrameGeometry,
        _params: &EncodingParameters,
        _policy: &CodecPolicy,
    ) -> Result<Box<dyn Encoder>, CodecError> {
        self.counters.encoders_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CopyEncoder))
    }
}

// =============================================================================
// Failing Encoder
// =============================================================================

/// Encoder factory whose encoders fail on the n-th frame (0-based).
#[derive(Debug)]
pub struct FailingEncoderFactory {
    fail_at: usize,
    created: AtomicUsize,
}

impl FailingEncoderFactory {
    pub fn new(fail_at: usize) -> Self {
        Self {
            fail_at,
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

struct FailingEncoder {
    fail: bool,
}

impl Encoder for FailingEncoder {
    fn encode(
        &mut self,
        _geometry: &FrameGeometry,
        color_model: ColorModel,
        frame: &[u8],
    ) -> Result<EncodedFrame, CodecError> {
        if self.fail {
            return Err(CodecError::Internal("encoder gave up".to_string()));
        }
        Ok(EncodedFrame {
            data: Bytes::copy_from_slice(frame),
            color_model,
            lossy: false,
        })
    }
}

impl EncoderFactory for FailingEncoderFactory {
    fn name(&self) -> &str {
        "failing"
    }

    fn create(
        &self,
        _geometry: &FrameGeometry,
        _params: &EncodingParameters,
        _policy: &CodecPolicy,
    ) -> Result<Box<dyn Encoder>, CodecError> {
        let index = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FailingEncoder {
            fail: index == self.fail_at,
        }))
    }
}

// =============================================================================
// Payload Builders
// =============================================================================

/// Deterministic native frames for `geometry`, distinct per frame.
pub fn gradient_frames(geometry: &FrameGeometry) -> Vec<Bytes> {
    (0..geometry.number_of_frames as usize)
        .map(|frame| {
            let data: Vec<u8> = (0..geometry.frame_len())
                .map(|i| ((i * 7 + frame * 31) % 251) as u8)
                .collect();
            Bytes::from(data)
        })
        .collect()
}

/// Native frames with long runs, compressible by RLE.
pub fn banded_frames(geometry: &FrameGeometry) -> Vec<Bytes> {
    (0..geometry.number_of_frames as usize)
        .map(|frame| {
            let data: Vec<u8> = (0..geometry.frame_len())
                .map(|i| ((i / 16 + frame) % 4) as u8 * 60)
                .collect();
            Bytes::from(data)
        })
        .collect()
}

pub fn native_payload(geometry: FrameGeometry) -> ImagePayload {
    let frames = gradient_frames(&geometry);
    ImagePayload::from_native_frames(geometry, frames).expect("valid native payload")
}

/// Multi-frame 8-bit monochrome geometry.
pub fn mono8(rows: u16, columns: u16, frames: u32) -> FrameGeometry {
    FrameGeometry::monochrome(rows, columns, 8).with_frames(frames)
}

/// Planar RGB geometry.
pub fn planar_rgb(rows: u16, columns: u16) -> FrameGeometry {
    FrameGeometry::rgb(rows, columns).with_planar_configuration(PlanarConfiguration::Planar)
}

/// Smooth RGB frame that survives lossy compression well.
pub fn smooth_rgb_frame(geometry: &FrameGeometry) -> Bytes {
    let mut data = vec![0u8; geometry.frame_len()];
    for pixel in 0..geometry.pixels_per_frame() {
        let x = pixel % geometry.columns as usize;
        let y = pixel / geometry.columns as usize;
        let values = [(x * 8) as u8, (y * 8) as u8, 128];
        for (sample, value) in values.iter().enumerate() {
            data[geometry.sample_offset(pixel, sample)] = *value;
        }
    }
    Bytes::from(data)
}
