//! Receive window: a fixed-capacity byte region plus a fill cursor.
//!
//! The region is either owned by the window or borrowed from whoever set
//! the connection up. Bytes `[0, offset)` are filled; reads land in the
//! free tail `[offset, capacity)`, so nothing is ever written past
//! `capacity`.

/// Backing storage for a [`BufferWindow`].
enum Region<'a> {
    Owned(Box<[u8]>),
    Borrowed(&'a mut [u8]),
}

impl Region<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Region::Owned(buf) => &buf[..],
            Region::Borrowed(buf) => &buf[..],
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Region::Owned(buf) => &mut buf[..],
            Region::Borrowed(buf) => &mut buf[..],
        }
    }
}

/// Cursor over a receive buffer.
///
/// Mutated only by the receive engine and the accumulator of a single
/// descriptor.
pub struct BufferWindow<'a> {
    region: Region<'a>,
    offset: usize,
}

impl BufferWindow<'static> {
    /// Allocate an owned, zeroed window.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            region: Region::Owned(vec![0u8; capacity].into_boxed_slice()),
            offset: 0,
        }
    }
}

impl<'a> BufferWindow<'a> {
    /// Wrap a caller-owned buffer. The whole slice is the capacity.
    pub fn borrowed(buf: &'a mut [u8]) -> Self {
        Self {
            region: Region::Borrowed(buf),
            offset: 0,
        }
    }

    /// Total size of the region.
    pub fn capacity(&self) -> usize {
        self.region.as_slice().len()
    }

    /// Number of filled bytes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Free bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Filled bytes.
    pub fn filled(&self) -> &[u8] {
        &self.region.as_slice()[..self.offset]
    }

    /// Free tail where the next read lands.
    pub fn free_mut(&mut self) -> &mut [u8] {
        let offset = self.offset;
        &mut self.region.as_mut_slice()[offset..]
    }

    /// Mark `n` more bytes as filled.
    ///
    /// # Panics
    /// Panics if `n` exceeds [`Self::remaining`].
    pub fn advance(&mut self, n: usize) {
        assert!(
            n <= self.remaining(),
            "advance past window capacity: {n} > {}",
            self.remaining()
        );
        self.offset += n;
    }

    /// Drop the first `n` filled bytes, moving the rest to the start.
    ///
    /// # Panics
    /// Panics if `n` exceeds [`Self::offset`].
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.offset, "consume past cursor: {n} > {}", self.offset);
        if n == 0 {
            return;
        }
        let offset = self.offset;
        if n < offset {
            self.region.as_mut_slice().copy_within(n..offset, 0);
        }
        self.offset = offset - n;
    }

    /// Forget all filled bytes.
    pub fn clear(&mut self) {
        self.offset = 0;
    }
}

impl std::fmt::Debug for BufferWindow<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferWindow")
            .field("offset", &self.offset)
            .field("capacity", &self.capacity())
            .field("owned", &matches!(self.region, Region::Owned(_)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_fill_and_consume() {
        let mut window = BufferWindow::with_capacity(16);
        assert_eq!(window.capacity(), 16);
        assert!(window.is_empty());

        window.free_mut()[..5].copy_from_slice(b"hello");
        window.advance(5);
        assert_eq!(window.filled(), b"hello");
        assert_eq!(window.remaining(), 11);

        window.free_mut()[..6].copy_from_slice(b" world");
        window.advance(6);
        assert_eq!(window.filled(), b"hello world");

        // Residual moves to the front
        window.consume(6);
        assert_eq!(window.filled(), b"world");
        assert_eq!(window.remaining(), 11);

        window.consume(5);
        assert!(window.is_empty());
    }

    #[test]
    fn test_borrowed_window_writes_through() {
        let mut storage = [0u8; 8];
        {
            let mut window = BufferWindow::borrowed(&mut storage);
            window.free_mut()[..3].copy_from_slice(b"abc");
            window.advance(3);
            assert_eq!(window.free_mut().len(), 5);
        }
        assert_eq!(&storage[..3], b"abc");
    }

    #[test]
    #[should_panic(expected = "advance past window capacity")]
    fn test_advance_past_capacity_panics() {
        let mut window = BufferWindow::with_capacity(4);
        window.advance(5);
    }

    #[test]
    fn test_clear() {
        let mut window = BufferWindow::with_capacity(4);
        window.advance(4);
        assert_eq!(window.remaining(), 0);
        assert!(window.free_mut().is_empty());
        window.clear();
        assert_eq!(window.remaining(), 4);
    }
}
