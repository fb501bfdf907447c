//! Pixel payload data model.
//!
//! - [`EncodingId`] / [`EncodingParameters`]: which transfer syntax, tuned how
//! - [`FrameGeometry`]: rows, columns, samples and bit depth shared by frames
//! - [`Representation`] / [`RepresentationCache`]: encoded forms kept per payload
//! - [`ImagePayload`]: geometry plus its cache, the unit the transcoder works on

mod encoding;
mod geometry;
mod payload;
mod representation;

pub use encoding::{EncodingId, EncodingParameters};
pub use geometry::{ColorModel, FrameGeometry, PlanarConfiguration};
pub use payload::ImagePayload;
pub(crate) use payload::check_native_frames;
pub use representation::{pad_even, Representation, RepresentationCache, RepresentationKey};
