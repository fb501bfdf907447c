//! Transcoding orchestration.
//!
//! The [`Transcoder`] turns a request for an encoding into codec work on an
//! [`ImagePayload`](crate::pixel::ImagePayload): it checks the payload's
//! representation cache, picks a source, resolves codecs from the shared
//! [`CodecRegistry`](crate::codec::CodecRegistry) and stores the result.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Transcoder                          │
//! │  ensure_representation()                                    │
//! │  1. Cache lookup         3. Decode to native (if needed)    │
//! │  2. Pick source          4. Encode to target (if needed)    │
//! │                          5. Cache complete result           │
//! │           │                    │                    │       │
//! │           ▼                    ▼                    ▼       │
//! │  ┌─────────────────┐  ┌────────────────┐  ┌─────────────┐   │
//! │  │ Representation  │  │ CodecRegistry  │  │ ByteWindow  │   │
//! │  │ Cache           │  │ (Arc, shared)  │  │ (per frame) │   │
//! │  └─────────────────┘  └────────────────┘  └─────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Compressed to compressed conversions always pass through the native
//! representation, which is cached along the way.

mod service;

pub use service::{TranscodeOptions, Transcoder, DEFAULT_INPUT_CHUNK_SIZE};
