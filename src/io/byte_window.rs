use bytes::Bytes;

use crate::error::StreamError;

/// Default backup ring capacity in bytes.
pub const DEFAULT_BACKUP_CAPACITY: usize = 1024;

/// Pull-side stream over a sequence of externally supplied spans.
///
/// The caller attaches one span at a time. Reads drain the backup ring first
/// and then the attached span. When a span is detached, its trailing bytes
/// are copied into a fixed-capacity backup ring so a later [`putback`] can
/// rewind across the span boundary.
///
/// The ring is a right-aligned linear buffer of capacity `K`:
///
/// ```text
///  0        backup_start      backup_index          K
///  |  free   |   history       |   unread            |
/// ```
///
/// Failures are sticky: the first error is kept in [`last_error`] and every
/// later read returns 0 bytes.
///
/// [`putback`]: ByteWindow::putback
/// [`last_error`]: ByteWindow::last_error
#[derive(Debug)]
pub struct ByteWindow {
    backup: Box<[u8]>,
    backup_start: usize,
    backup_index: usize,
    span: Option<Bytes>,
    span_index: usize,
    ended: bool,
    error: Option<StreamError>,
}

impl ByteWindow {
    /// Create a window with the default backup capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BACKUP_CAPACITY)
    }

    /// Create a window whose backup ring holds `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            backup: vec![0u8; capacity].into_boxed_slice(),
            backup_start: capacity,
            backup_index: capacity,
            span: None,
            span_index: 0,
            ended: false,
            error: None,
        }
    }

    /// Like [`with_capacity`](Self::with_capacity) but reports allocation
    /// failure instead of aborting.
    pub fn try_with_capacity(capacity: usize) -> Result<Self, StreamError> {
        let mut backup = Vec::new();
        backup
            .try_reserve_exact(capacity)
            .map_err(|_| StreamError::AllocationFailure(capacity))?;
        backup.resize(capacity, 0);
        Ok(Self {
            backup: backup.into_boxed_slice(),
            ..Self::with_capacity(0)
        }
        .reset_cursors())
    }

    fn reset_cursors(mut self) -> Self {
        self.backup_start = self.backup.len();
        self.backup_index = self.backup.len();
        self
    }

    /// Backup ring capacity.
    pub fn capacity(&self) -> usize {
        self.backup.len()
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn good(&self) -> bool {
        self.error.is_none()
    }

    /// First failure recorded by this stream.
    pub fn last_error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        if self.error.is_none() {
            self.error = Some(err.clone());
        }
        err
    }

    /// Whether [`mark_ended`](Self::mark_ended) was called.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// True once the stream was marked ended and every byte was consumed.
    pub fn is_eos(&self) -> bool {
        self.ended && self.available() == 0
    }

    pub fn has_span(&self) -> bool {
        self.span.is_some()
    }

    #[inline]
    fn unread_in_backup(&self) -> usize {
        self.backup.len() - self.backup_index
    }

    #[inline]
    fn unread_in_span(&self) -> usize {
        self.span
            .as_ref()
            .map_or(0, |span| span.len() - self.span_index)
    }

    /// Bytes a subsequent read could return before the next attach.
    pub fn available(&self) -> usize {
        if !self.good() {
            return 0;
        }
        self.unread_in_backup() + self.unread_in_span()
    }

    /// Bytes that [`putback`](Self::putback) could currently rewind.
    pub fn retained(&self) -> usize {
        self.span_index + (self.backup_index - self.backup_start)
    }

    // =========================================================================
    // Producer
    // =========================================================================

    /// Install a new unread span.
    pub fn attach(&mut self, span: Bytes) -> Result<(), StreamError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.span.is_some() {
            return Err(self.fail(StreamError::IllegalState("a span is already attached")));
        }
        if self.ended {
            return Err(self.fail(StreamError::IllegalState("stream was marked ended")));
        }
        self.span = Some(span);
        self.span_index = 0;
        Ok(())
    }

    /// Release the current span, keeping its tail in the backup ring.
    ///
    /// Returns `Ok(None)` when no span is attached. Fails if the unread part
    /// of the span does not fit in the free part of the ring.
    pub fn detach(&mut self) -> Result<Option<Bytes>, StreamError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let Some(span) = self.span.as_ref() else {
            return Ok(None);
        };

        let capacity = self.backup.len();
        let unread_span = span.len() - self.span_index;
        let unread_backup = self.unread_in_backup();
        if unread_span > self.backup_index {
            return Err(self.fail(StreamError::IllegalState(
                "unread span bytes exceed free backup capacity",
            )));
        }

        // Shift surviving history left, then append the span's tail.
        let keep = span.len().min(capacity);
        let survivors = (capacity - self.backup_start).min(capacity - keep);
        self.backup
            .copy_within(capacity - survivors..capacity, capacity - keep - survivors);
        self.backup[capacity - keep..].copy_from_slice(&span[span.len() - keep..]);
        self.backup_start = capacity - keep - survivors;
        self.backup_index = capacity - (unread_backup + unread_span);

        self.span_index = 0;
        Ok(self.span.take())
    }

    /// Forbid further attaches.
    pub fn mark_ended(&mut self) {
        self.ended = true;
    }

    /// Copy up to `dst.len()` bytes, ring first. Returns bytes moved.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        if !self.good() {
            return 0;
        }
        let mut moved = 0;

        let from_backup = self.unread_in_backup().min(dst.len());
        if from_backup > 0 {
            dst[..from_backup]
                .copy_from_slice(&self.backup[self.backup_index..self.backup_index + from_backup]);
            self.backup_index += from_backup;
            moved += from_backup;
        }

        if let Some(span) = self.span.as_ref() {
            let from_span = (span.len() - self.span_index).min(dst.len() - moved);
            if from_span > 0 {
                dst[moved..moved + from_span]
                    .copy_from_slice(&span[self.span_index..self.span_index + from_span]);
                self.span_index += from_span;
                moved += from_span;
            }
        }

        moved
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        (self.read(&mut byte) == 1).then_some(byte[0])
    }

    /// Advance past up to `n` bytes. Returns bytes skipped.
    pub fn skip(&mut self, n: usize) -> usize {
        if !self.good() {
            return 0;
        }
        let from_backup = self.unread_in_backup().min(n);
        self.backup_index += from_backup;

        let from_span = self.unread_in_span().min(n - from_backup);
        self.span_index += from_span;

        from_backup + from_span
    }

    /// Rewind the read cursor by `n` bytes.
    ///
    /// Rewinds within the attached span first, then into ring history. A
    /// request larger than the retained history fails and leaves the stream
    /// permanently failed without moving the cursor.
    pub fn putback(&mut self, n: usize) -> Result<(), StreamError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let retained = self.retained();
        if n > retained {
            return Err(self.fail(StreamError::PutbackFailed {
                requested: n,
                retained,
            }));
        }

        let from_span = self.span_index.min(n);
        self.span_index -= from_span;
        self.backup_index -= n - from_span;
        Ok(())
    }
}

impl Default for ByteWindow {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
