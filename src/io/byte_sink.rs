/// Push-side stream writing into a fixed external buffer.
///
/// Writes copy as much as fits and report how many bytes were taken.
/// [`extract`](ByteSink::extract) hands out a view of the filled prefix and
/// empties the sink, so one buffer can be reused to drain an arbitrarily long
/// source in bounded chunks.
#[derive(Debug)]
pub struct ByteSink<'a> {
    buf: &'a mut [u8],
    filled: usize,
}

impl<'a> ByteSink<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, filled: 0 }
    }

    /// Copy from `src` until the buffer is full. Returns bytes copied.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(self.remaining());
        self.buf[self.filled..self.filled + n].copy_from_slice(&src[..n]);
        self.filled += n;
        n
    }

    /// No-op kept for call chaining.
    pub fn flush(&mut self) -> &mut Self {
        self
    }

    /// Bytes written and not yet extracted.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.filled
    }

    /// View of the bytes written so far; resets the fill level.
    pub fn extract(&mut self) -> &[u8] {
        let n = std::mem::take(&mut self.filled);
        &self.buf[..n]
    }
}
