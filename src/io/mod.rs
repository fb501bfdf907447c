//! Bounded stream plumbing between the representation cache and codecs.
//!
//! - [`ByteWindow`] is the pull side: spans of encoded data are attached one
//!   at a time and read by decoders, with a backup ring that allows
//!   [`putback`](ByteWindow::putback) across span boundaries.
//! - [`ByteSink`] is the push side: a fixed buffer filled by writers and
//!   drained with [`extract`](ByteSink::extract).

mod byte_sink;
mod byte_window;
mod endian;

pub use byte_sink::ByteSink;
pub use byte_window::{ByteWindow, DEFAULT_BACKUP_CAPACITY};
pub use endian::{read_u16_be, read_u32_le};
