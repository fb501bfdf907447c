//! Representation cache for encoded pixel data.
//!
//! Each image payload keeps every encoded form it has materialized so far,
//! keyed by `(EncodingId, EncodingParameters)`. Entries are never evicted:
//! this is a correctness cache that lives as long as the payload.
//!
//! # Padding
//!
//! DICOM requires encoded values to have even length. Frames with odd length
//! are padded with a single zero byte when a [`Representation`] is built, so
//! every cached segment satisfies the rule.

use bytes::{Bytes, BytesMut};

use super::encoding::{EncodingId, EncodingParameters};
use super::geometry::ColorModel;

// =============================================================================
// Cache Key
// =============================================================================

/// Key identifying a representation within one payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepresentationKey {
    pub encoding: EncodingId,
    pub params: EncodingParameters,
}

impl RepresentationKey {
    /// Create a key; native transfer syntaxes are normalized and carry no
    /// parameters.
    pub fn new(encoding: &EncodingId, params: &EncodingParameters) -> Self {
        let encoding = encoding.canonical();
        let params = if encoding.is_native() {
            EncodingParameters::new()
        } else {
            params.clone()
        };
        Self { encoding, params }
    }

    pub fn is_native(&self) -> bool {
        self.encoding.is_native()
    }
}

// =============================================================================
// Representation
// =============================================================================

/// One encoded form of an image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    key: RepresentationKey,
    frames: Vec<Bytes>,
    color_model: ColorModel,
    lossy: bool,
}

impl Representation {
    /// Build a representation from per-frame segments, padding odd segments.
    pub fn new(
        encoding: &EncodingId,
        params: &EncodingParameters,
        frames: Vec<Bytes>,
        color_model: ColorModel,
    ) -> Self {
        Self {
            key: RepresentationKey::new(encoding, params),
            frames: frames.into_iter().map(pad_even).collect(),
            color_model,
            lossy: encoding.is_lossy(),
        }
    }

    /// Mark the representation as the product of a lossy step.
    pub fn with_lossy(mut self, lossy: bool) -> Self {
        self.lossy = self.lossy || lossy;
        self
    }

    pub fn key(&self) -> &RepresentationKey {
        &self.key
    }

    pub fn encoding(&self) -> &EncodingId {
        &self.key.encoding
    }

    pub fn params(&self) -> &EncodingParameters {
        &self.key.params
    }

    pub fn is_native(&self) -> bool {
        self.key.is_native()
    }

    /// Photometric interpretation of the data in this encoding.
    pub fn color_model(&self) -> ColorModel {
        self.color_model
    }

    /// Whether this data (or any step that produced it) was lossy.
    pub fn is_lossy(&self) -> bool {
        self.lossy
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Bytes> {
        self.frames.get(index)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total encoded size over all frames.
    pub fn encoded_len(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }
}

/// Pad a segment to even length with a trailing zero byte.
pub fn pad_even(segment: Bytes) -> Bytes {
    if segment.len() % 2 == 0 {
        return segment;
    }
    let mut padded = BytesMut::with_capacity(segment.len() + 1);
    padded.extend_from_slice(&segment);
    padded.extend_from_slice(&[0]);
    padded.freeze()
}

// =============================================================================
// Representation Cache
// =============================================================================

/// Per-payload store of materialized representations.
///
/// Holds at most one entry per [`RepresentationKey`]. Insertion order is kept
/// so source selection is deterministic.
#[derive(Debug, Clone, Default)]
pub struct RepresentationCache {
    entries: Vec<Representation>,
}

impl RepresentationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact-match lookup.
    pub fn get(&self, encoding: &EncodingId, params: &EncodingParameters) -> Option<&Representation> {
        let key = RepresentationKey::new(encoding, params);
        self.entries.iter().find(|r| r.key == key)
    }

    /// Check for an entry without handing it out.
    pub fn has(&self, encoding: &EncodingId, params: &EncodingParameters) -> bool {
        self.get(encoding, params).is_some()
    }

    /// Insert or replace the entry with the same key.
    ///
    /// Returns the replaced representation, if any.
    pub fn put(&mut self, representation: Representation) -> Option<Representation> {
        match self
            .entries
            .iter_mut()
            .find(|r| r.key == representation.key)
        {
            Some(slot) => Some(std::mem::replace(slot, representation)),
            None => {
                self.entries.push(representation);
                None
            }
        }
    }

    /// The native representation, if one is cached.
    pub fn native(&self) -> Option<&Representation> {
        self.entries.iter().find(|r| r.is_native())
    }

    /// Compressed representations in insertion order.
    pub fn compressed(&self) -> impl Iterator<Item = &Representation> {
        self.entries.iter().filter(|r| !r.is_native())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Representation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
