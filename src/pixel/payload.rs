use bytes::Bytes;

use crate::error::CodecError;
use crate::io::ByteSink;

use super::encoding::{EncodingId, EncodingParameters};
use super::geometry::FrameGeometry;
use super::representation::{Representation, RepresentationCache};

/// Pixel data of one image together with every encoding materialized so far.
///
/// The payload is created from the representation parsed out of the
/// container (the seed) and grows as the [`Transcoder`] adds encodings.
/// Nothing is ever removed until the payload itself is dropped.
///
/// [`Transcoder`]: crate::transcode::Transcoder
#[derive(Debug, Clone)]
pub struct ImagePayload {
    geometry: FrameGeometry,
    cache: RepresentationCache,
}

impl ImagePayload {
    /// Create a payload seeded with an already encoded representation.
    pub fn new(geometry: FrameGeometry, seed: Representation) -> Result<Self, CodecError> {
        if seed.frame_count() != geometry.number_of_frames as usize {
            return Err(CodecError::FormatMismatch(format!(
                "expected {} frames, seed has {}",
                geometry.number_of_frames,
                seed.frame_count()
            )));
        }
        if seed.is_native() {
            check_native_frames(&geometry, seed.frames())?;
        }
        let mut cache = RepresentationCache::new();
        cache.put(seed);
        Ok(Self { geometry, cache })
    }

    /// Create a payload from native frames.
    pub fn from_native_frames(
        geometry: FrameGeometry,
        frames: Vec<Bytes>,
    ) -> Result<Self, CodecError> {
        let color_model = geometry.color_model;
        let seed = Representation::new(
            &EncodingId::NATIVE,
            &EncodingParameters::new(),
            frames,
            color_model,
        );
        Self::new(geometry, seed)
    }

    /// Create a payload from one contiguous native buffer holding all frames.
    pub fn from_native_buffer(geometry: FrameGeometry, data: Bytes) -> Result<Self, CodecError> {
        let frame_len = geometry.frame_len();
        let needed = frame_len * geometry.number_of_frames as usize;
        if data.len() < needed {
            return Err(CodecError::Truncated(format!(
                "native pixel data has {} bytes, {} frames need {}",
                data.len(),
                geometry.number_of_frames,
                needed
            )));
        }
        let frames = (0..geometry.number_of_frames as usize)
            .map(|i| data.slice(i * frame_len..(i + 1) * frame_len))
            .collect();
        Self::from_native_frames(geometry, frames)
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    pub fn cache(&self) -> &RepresentationCache {
        &self.cache
    }

    pub(crate) fn cache_mut(&mut self) -> &mut RepresentationCache {
        &mut self.cache
    }

    /// Cached representation for an encoding, if any.
    pub fn representation(
        &self,
        encoding: &EncodingId,
        params: &EncodingParameters,
    ) -> Option<&Representation> {
        self.cache.get(encoding, params)
    }

    /// Encoded per-frame segments of a cached representation.
    pub fn encoded_frames(
        &self,
        encoding: &EncodingId,
        params: &EncodingParameters,
    ) -> Option<&[Bytes]> {
        self.representation(encoding, params).map(Representation::frames)
    }

    /// Stream part of one cached frame into a bounded sink.
    ///
    /// Copies bytes of `frame` starting at `offset` until the sink is full or
    /// the frame is exhausted, and returns how many were written. Returns
    /// `None` if the representation or frame is not cached.
    pub fn write_frame(
        &self,
        encoding: &EncodingId,
        params: &EncodingParameters,
        frame: usize,
        offset: usize,
        sink: &mut ByteSink<'_>,
    ) -> Option<usize> {
        let segment = self.representation(encoding, params)?.frame(frame)?;
        let start = offset.min(segment.len());
        Some(sink.write(&segment[start..]))
    }

    /// Lossy encodings present in the cache.
    ///
    /// A non-empty result means derived objects need new instance UIDs.
    pub fn lossy_history(&self) -> Vec<EncodingId> {
        self.cache
            .iter()
            .filter(|r| r.is_lossy())
            .map(|r| r.encoding().clone())
            .collect()
    }
}

/// Check native frames are large enough for the geometry.
pub(crate) fn check_native_frames(
    geometry: &FrameGeometry,
    frames: &[Bytes],
) -> Result<(), CodecError> {
    let frame_len = geometry.frame_len();
    for (index, frame) in frames.iter().enumerate() {
        if frame.len() < frame_len {
            return Err(CodecError::Truncated(format!(
                "native frame {} has {} bytes, expected {}",
                index,
                frame.len(),
                frame_len
            )));
        }
    }
    Ok(())
}
