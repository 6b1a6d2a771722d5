//! Fixed-capacity connection ring buffer.
//!
//! One per socket direction. Socket reads land in the buffer through a
//! contiguous spare slice (no intermediate copy); the framing loop peeks at
//! the head, waits for a complete packet and consumes exactly its size.
//! Overflow is fatal for the connection: the codec cannot re-synchronize
//! mid-stream, so a writer outpacing its reader has already lost.

/// Fixed-capacity circular byte buffer.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<u8>,
    read_at: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a buffer with the given capacity in bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { buf: vec![0; capacity], read_at: 0, len: 0 }
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that can still be written.
    #[must_use]
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    fn write_at(&self) -> usize {
        (self.read_at + self.len) % self.capacity()
    }

    /// Copy bytes in. Returns how many were accepted; short writes mean the
    /// buffer is full and the connection should be closed with
    /// `ReceiveOverflow`.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let to_write = data.len().min(self.free());
        if to_write == 0 {
            return 0;
        }

        let at = self.write_at();
        let first = to_write.min(self.capacity() - at);
        self.buf[at..at + first].copy_from_slice(&data[..first]);

        let second = to_write - first;
        if second > 0 {
            self.buf[..second].copy_from_slice(&data[first..to_write]);
        }

        self.len += to_write;
        to_write
    }

    /// Copy bytes out and consume them. Returns how many were produced.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek(out);
        self.skip(n);
        n
    }

    /// Copy bytes out without consuming. Returns how many were produced.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let to_read = out.len().min(self.len);
        if to_read == 0 {
            return 0;
        }

        let first = to_read.min(self.capacity() - self.read_at);
        out[..first].copy_from_slice(&self.buf[self.read_at..self.read_at + first]);

        let second = to_read - first;
        if second > 0 {
            out[first..to_read].copy_from_slice(&self.buf[..second]);
        }

        to_read
    }

    /// Discard up to `n` buffered bytes. Returns how many were discarded.
    pub fn skip(&mut self, n: usize) -> usize {
        let to_skip = n.min(self.len);
        self.read_at = (self.read_at + to_skip) % self.capacity();
        self.len -= to_skip;
        to_skip
    }

    /// Contiguous spare slice for zero-copy socket reads.
    ///
    /// Returns an empty slice when full. After writing into it, call
    /// [`Self::commit`] with the byte count actually filled.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        if self.free() == 0 {
            return &mut [];
        }

        let at = self.write_at();
        let end = if at >= self.read_at || self.len == 0 { self.capacity() } else { self.read_at };
        let end = end.min(at + self.free());
        &mut self.buf[at..end]
    }

    /// Mark `n` bytes of the spare slice as written.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the free space; that would mean the caller
    /// wrote past the slice returned by [`Self::spare_mut`].
    pub fn commit(&mut self, n: usize) {
        assert!(n <= self.free(), "commit past spare capacity");
        self.len += n;
    }

    /// Contiguous readable slice for zero-copy socket writes.
    ///
    /// May be shorter than [`Self::len`] when the data wraps; call again
    /// after [`Self::skip`] to reach the wrapped remainder.
    #[must_use]
    pub fn readable(&self) -> &[u8] {
        let first = self.len.min(self.capacity() - self.read_at);
        &self.buf[self.read_at..self.read_at + first]
    }

    /// Drop all buffered data.
    pub fn clear(&mut self) {
        self.read_at = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut ring = RingBuffer::new(16);
        assert_eq!(ring.write(b"hello"), 5);
        assert_eq!(ring.len(), 5);

        let mut out = [0u8; 5];
        assert_eq!(ring.read(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert!(ring.is_empty());
    }

    #[test]
    fn wrapping_write_and_read() {
        let mut ring = RingBuffer::new(8);
        assert_eq!(ring.write(b"abcdef"), 6);

        let mut out = [0u8; 4];
        ring.read(&mut out);
        assert_eq!(&out, b"abcd");

        // Now read_at = 4, writing 5 bytes wraps.
        assert_eq!(ring.write(b"ghijk"), 5);
        assert_eq!(ring.len(), 7);

        let mut out = [0u8; 7];
        assert_eq!(ring.read(&mut out), 7);
        assert_eq!(&out, b"efghijk");
    }

    #[test]
    fn overflow_accepts_partial_write() {
        let mut ring = RingBuffer::new(4);
        assert_eq!(ring.write(b"abcdef"), 4);
        assert_eq!(ring.write(b"x"), 0);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abc");

        let mut out = [0u8; 3];
        assert_eq!(ring.peek(&mut out), 3);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.peek(&mut out), 3);
        assert_eq!(&out, b"abc");
    }

    #[test]
    fn skip_discards() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abcdef");
        assert_eq!(ring.skip(4), 4);

        let mut out = [0u8; 2];
        ring.read(&mut out);
        assert_eq!(&out, b"ef");
        assert_eq!(ring.skip(10), 0);
    }

    #[test]
    fn spare_commit_is_equivalent_to_write() {
        let mut ring = RingBuffer::new(8);

        let spare = ring.spare_mut();
        spare[..3].copy_from_slice(b"abc");
        ring.commit(3);

        let mut out = [0u8; 3];
        ring.read(&mut out);
        assert_eq!(&out, b"abc");

        // Wrapped spare: write_at is now 3, read_at 3.
        let spare = ring.spare_mut();
        assert_eq!(spare.len(), 5); // up to the end of the backing storage
    }

    #[test]
    fn readable_exposes_contiguous_head() {
        let mut ring = RingBuffer::new(8);
        ring.write(b"abcdefgh");
        ring.skip(6);
        ring.write(b"ij");

        assert_eq!(ring.readable(), b"gh");
        ring.skip(2);
        assert_eq!(ring.readable(), b"ij");
    }

    proptest! {
        /// Data comes out exactly as it went in, under arbitrary
        /// interleavings of bounded writes and reads.
        #[test]
        fn fifo_order_is_preserved(
            ops in prop::collection::vec((any::<bool>(), 1usize..32), 1..64),
        ) {
            let mut ring = RingBuffer::new(64);
            let mut model: std::collections::VecDeque<u8> = std::collections::VecDeque::new();
            let mut next_byte = 0u8;

            for (is_write, amount) in ops {
                if is_write {
                    let data: Vec<u8> = (0..amount)
                        .map(|_| {
                            let b = next_byte;
                            next_byte = next_byte.wrapping_add(1);
                            b
                        })
                        .collect();
                    let accepted = ring.write(&data);
                    model.extend(&data[..accepted]);
                    // Bytes past `accepted` were never buffered; rewind the
                    // generator so the model stays aligned.
                    next_byte = next_byte.wrapping_sub((amount - accepted) as u8);
                } else {
                    let mut out = vec![0u8; amount];
                    let got = ring.read(&mut out);
                    for byte in &out[..got] {
                        prop_assert_eq!(Some(*byte), model.pop_front());
                    }
                }
                prop_assert_eq!(ring.len(), model.len());
            }
        }
    }
}
