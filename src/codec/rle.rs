//! RLE Lossless codec.
//!
//! A frame is a 64-byte header followed by up to 15 PackBits segments. The
//! header holds the segment count and the byte offset of each segment from
//! the start of the frame. Every segment carries one byte plane: the most
//! significant bytes of sample 0 first, then the next byte of sample 0, and
//! so on for every sample.
//!
//! ```text
//! +-------+----------+-----+-----------+-----------+-----+
//! | count | offset 0 | ... | offset 14 | segment 0 | ... |
//! +-------+----------+-----+-----------+-----------+-----+
//!   u32 LE   u32 LE          u32 LE      PackBits
//! ```
//!
//! The decoder is a resumable state machine: it consumes whatever the window
//! offers, keeps its position across [`DecodeStatus::Suspend`], and never
//! needs more than one control byte of lookahead.

use bytes::Bytes;
use tracing::trace;

use crate::error::CodecError;
use crate::io::{read_u32_le, ByteWindow};
use crate::pixel::{ColorModel, EncodingParameters, FrameGeometry};

use super::{
    CodecPolicy, DecodeStatus, Decoder, DecoderFactory, EncodedFrame, Encoder, EncoderFactory,
};

/// Size of the RLE header in bytes.
pub const RLE_HEADER_LEN: usize = 64;

/// Maximum number of segments the header can describe.
pub const MAX_SEGMENTS: usize = 15;

/// Longest literal or replicate run of one PackBits packet.
const MAX_RUN: usize = 128;

// =============================================================================
// Decoder
// =============================================================================

/// Creates [`RleDecoder`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RleDecoderFactory;

impl DecoderFactory for RleDecoderFactory {
    fn name(&self) -> &str {
        "rle"
    }

    fn create(
        &self,
        geometry: &FrameGeometry,
        _params: &EncodingParameters,
        policy: &CodecPolicy,
    ) -> Result<Box<dyn Decoder>, CodecError> {
        geometry.validate()?;
        let segments = segment_count(geometry)?;
        Ok(Box::new(RleDecoder::new(
            geometry.clone(),
            segments,
            policy.reverse_byte_order,
        )))
    }
}

fn segment_count(geometry: &FrameGeometry) -> Result<usize, CodecError> {
    let segments = geometry.samples_per_pixel as usize * geometry.bytes_per_sample();
    if segments > MAX_SEGMENTS {
        return Err(CodecError::FormatMismatch(format!(
            "RLE supports at most {} segments, geometry needs {}",
            MAX_SEGMENTS, segments
        )));
    }
    Ok(segments)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Segments,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run {
    /// Next byte is a control byte
    Control,
    /// Literal bytes still to copy
    Literal(usize),
    /// Replicate run whose value byte has not been read yet
    Replicate(usize),
}

/// Resumable RLE Lossless decoder for one frame.
#[derive(Debug)]
pub struct RleDecoder {
    geometry: FrameGeometry,
    segments: usize,
    reverse_byte_order: bool,
    stage: Stage,
    header: Vec<u8>,
    offsets: Vec<usize>,
    /// Bytes consumed since the start of the frame
    consumed: usize,
    segment: usize,
    /// Bytes produced for the current segment
    written: usize,
    /// The current segment's offset has not been reached yet
    at_segment_start: bool,
    run: Run,
}

impl RleDecoder {
    pub fn new(geometry: FrameGeometry, segments: usize, reverse_byte_order: bool) -> Self {
        Self {
            geometry,
            segments,
            reverse_byte_order,
            stage: Stage::Header,
            header: Vec::with_capacity(RLE_HEADER_LEN),
            offsets: Vec::new(),
            consumed: 0,
            segment: 0,
            written: 0,
            at_segment_start: true,
            run: Run::Control,
        }
    }

    fn parse_header(&mut self) -> Result<(), CodecError> {
        let count = read_u32_le(&self.header) as usize;
        if count != self.segments {
            return Err(CodecError::FormatMismatch(format!(
                "RLE header declares {} segments, geometry needs {}",
                count, self.segments
            )));
        }
        let offsets: Vec<usize> = (0..count)
            .map(|i| read_u32_le(&self.header[4 + 4 * i..]) as usize)
            .collect();
        if offsets.first() != Some(&RLE_HEADER_LEN) {
            return Err(CodecError::FormatMismatch(
                "first RLE segment must start right after the header".to_string(),
            ));
        }
        if offsets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CodecError::FormatMismatch(
                "RLE segment offsets are not increasing".to_string(),
            ));
        }
        trace!(segments = count, "Parsed RLE header");
        self.offsets = offsets;
        Ok(())
    }

    /// Destination byte of the current segment's plane for `pixel`.
    fn destination(&self, pixel: usize) -> usize {
        let bps = self.geometry.bytes_per_sample();
        let sample = self.segment / bps;
        let significance = self.segment % bps;
        let byte = if self.reverse_byte_order {
            significance
        } else {
            bps - 1 - significance
        };
        self.geometry.sample_offset(pixel, sample) + byte
    }

    fn emit(&mut self, output: &mut [u8], value: u8, count: usize) {
        for _ in 0..count {
            let dst = self.destination(self.written);
            output[dst] = value;
            self.written += 1;
        }
    }

    /// Called when the window has nothing more to offer.
    fn starved(&self, input: &ByteWindow) -> Result<DecodeStatus, CodecError> {
        if input.is_eos() {
            Err(CodecError::Truncated(format!(
                "RLE frame ended in segment {} after {} bytes",
                self.segment, self.consumed
            )))
        } else {
            Ok(DecodeStatus::Suspend)
        }
    }

    fn run_segments(
        &mut self,
        input: &mut ByteWindow,
        output: &mut [u8],
    ) -> Result<DecodeStatus, CodecError> {
        let plane_len = self.geometry.pixels_per_frame();
        let mut literal = [0u8; MAX_RUN];

        loop {
            if self.written == plane_len {
                self.segment += 1;
                self.written = 0;
                self.at_segment_start = true;
                self.run = Run::Control;
                if self.segment == self.segments {
                    self.stage = Stage::Done;
                    return Ok(DecodeStatus::Normal);
                }
            }

            // Leftover packet bytes of the previous segment are skipped
            if self.at_segment_start {
                let start = self.offsets[self.segment];
                if self.consumed > start {
                    return Err(CodecError::FormatMismatch(format!(
                        "RLE segment {} overlaps its predecessor",
                        self.segment
                    )));
                }
                self.consumed += input.skip(start - self.consumed);
                if self.consumed < start {
                    return self.starved(input);
                }
                self.at_segment_start = false;
            }

            match self.run {
                Run::Control => {
                    if let Some(&next) = self.offsets.get(self.segment + 1) {
                        if self.consumed >= next {
                            return Err(CodecError::Truncated(format!(
                                "RLE segment {} ended after {} of {} bytes",
                                self.segment, self.written, plane_len
                            )));
                        }
                    }
                    let Some(control) = input.read_u8() else {
                        return self.starved(input);
                    };
                    self.consumed += 1;
                    self.run = match control as i8 {
                        n @ 0..=127 => Run::Literal(n as usize + 1),
                        -128 => Run::Control,
                        n => Run::Replicate((1 - n as isize) as usize),
                    };
                }
                Run::Literal(remaining) => {
                    let want = remaining.min(plane_len - self.written);
                    if want == 0 {
                        // Segment is full; drop the rest of the packet
                        self.run = Run::Control;
                        continue;
                    }
                    let n = input.read(&mut literal[..want]);
                    if n == 0 {
                        return self.starved(input);
                    }
                    self.consumed += n;
                    for &value in &literal[..n] {
                        self.emit(output, value, 1);
                    }
                    self.run = if remaining == n {
                        Run::Control
                    } else {
                        Run::Literal(remaining - n)
                    };
                }
                Run::Replicate(count) => {
                    let Some(value) = input.read_u8() else {
                        return self.starved(input);
                    };
                    self.consumed += 1;
                    let count = count.min(plane_len - self.written);
                    self.emit(output, value, count);
                    self.run = Run::Control;
                }
            }
        }
    }
}

impl Decoder for RleDecoder {
    fn decode(
        &mut self,
        input: &mut ByteWindow,
        output: &mut [u8],
        _is_signed: bool,
    ) -> Result<DecodeStatus, CodecError> {
        if output.len() < self.geometry.frame_len() {
            return Err(CodecError::FormatMismatch(format!(
                "output buffer holds {} bytes, frame needs {}",
                output.len(),
                self.geometry.frame_len()
            )));
        }

        if self.stage == Stage::Header {
            let mut chunk = [0u8; RLE_HEADER_LEN];
            let missing = RLE_HEADER_LEN - self.header.len();
            let n = input.read(&mut chunk[..missing]);
            self.header.extend_from_slice(&chunk[..n]);
            self.consumed += n;
            if self.header.len() < RLE_HEADER_LEN {
                return self.starved(input);
            }
            self.parse_header()?;
            self.stage = Stage::Segments;
        }

        match self.stage {
            Stage::Done => Ok(DecodeStatus::Normal),
            _ => self.run_segments(input, output),
        }
    }

    fn color_model(&self) -> ColorModel {
        self.geometry.color_model
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Creates [`RleEncoder`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct RleEncoderFactory;

impl EncoderFactory for RleEncoderFactory {
    fn name(&self) -> &str {
        "rle"
    }

    fn create(
        &self,
        geometry: &FrameGeometry,
        _params: &EncodingParameters,
        _policy: &CodecPolicy,
    ) -> Result<Box<dyn Encoder>, CodecError> {
        geometry.validate()?;
        segment_count(geometry)?;
        Ok(Box::new(RleEncoder))
    }
}

/// RLE Lossless encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct RleEncoder;

impl Encoder for RleEncoder {
    fn encode(
        &mut self,
        geometry: &FrameGeometry,
        color_model: ColorModel,
        frame: &[u8],
    ) -> Result<EncodedFrame, CodecError> {
        geometry.validate()?;
        let segments = segment_count(geometry)?;
        if frame.len() < geometry.frame_len() {
            return Err(CodecError::Truncated(format!(
                "frame has {} bytes, expected {}",
                frame.len(),
                geometry.frame_len()
            )));
        }

        let bps = geometry.bytes_per_sample();
        let columns = geometry.columns as usize;
        let mut header = vec![0u8; RLE_HEADER_LEN];
        header[..4].copy_from_slice(&(segments as u32).to_le_bytes());
        let mut body = Vec::new();
        let mut plane = vec![0u8; geometry.pixels_per_frame()];

        for segment in 0..segments {
            let sample = segment / bps;
            let byte = bps - 1 - segment % bps;
            for (pixel, value) in plane.iter_mut().enumerate() {
                *value = frame[geometry.sample_offset(pixel, sample) + byte];
            }

            let offset = (RLE_HEADER_LEN + body.len()) as u32;
            header[4 + 4 * segment..8 + 4 * segment].copy_from_slice(&offset.to_le_bytes());
            for row in plane.chunks(columns) {
                pack_bits(row, &mut body);
            }
            if body.len() % 2 == 1 {
                body.push(0);
            }
        }

        header.extend_from_slice(&body);
        Ok(EncodedFrame {
            data: Bytes::from(header),
            color_model,
            lossy: false,
        })
    }
}

/// PackBits-encode one row. Runs of three or more equal bytes become
/// replicate packets; everything else is emitted as literals.
fn pack_bits(row: &[u8], out: &mut Vec<u8>) {
    let mut literal_start = 0;
    let mut i = 0;
    while i < row.len() {
        let mut run = 1;
        while i + run < row.len() && row[i + run] == row[i] && run < MAX_RUN {
            run += 1;
        }
        if run >= 3 {
            push_literals(&row[literal_start..i], out);
            out.push((1 - run as i16) as i8 as u8);
            out.push(row[i]);
            literal_start = i + run;
        }
        i += run;
    }
    push_literals(&row[literal_start..], out);
}

fn push_literals(data: &[u8], out: &mut Vec<u8>) {
    for chunk in data.chunks(MAX_RUN) {
        out.push((chunk.len() - 1) as u8);
        out.extend_from_slice(chunk);
    }
}

// =============================================================================
// Tests
// =============================================================================
