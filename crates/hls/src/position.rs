//! Read/write cursor accounting for a small ring of stream slots.

/// Cursor set coordinating one writer (the demuxer filling a slot per
/// segment) and one reader (the consumer draining access units) over
/// `buffer_count` slots.
///
/// Two write cursors are kept deliberately: `write_to` is the slot the
/// writer is (or will be) filling, and `write_done` marks the last slot
/// it finished. `write_done != Some(write_to)` means the current slot is
/// reserved but still being written, which keeps [`has_write_space`]
/// honest while a segment is mid-demux — do not collapse the pair.
///
/// [`has_write_space`]: StreamPosition::has_write_space
#[derive(Debug, Clone, Copy)]
pub struct StreamPosition {
    buffer_count: usize,
    /// Slot the reader is draining.
    read_from: usize,
    /// Access-unit cursor within the read slot.
    pub(crate) read_au: usize,
    /// Slot the writer fills next.
    write_to: usize,
    /// Last slot the writer finalized, if any.
    write_done: Option<usize>,
}

impl StreamPosition {
    pub fn new(buffer_count: usize) -> Self {
        Self {
            buffer_count,
            read_from: 0,
            read_au: 0,
            write_to: 0,
            write_done: None,
        }
    }

    pub fn reset(&mut self, buffer_count: usize) {
        *self = Self::new(buffer_count);
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    pub fn read_from(&self) -> usize {
        self.read_from
    }

    pub fn write_to(&self) -> usize {
        self.write_to
    }

    /// Whether the writer may start (or continue) filling a slot.
    pub fn has_write_space(&self) -> bool {
        (self.write_to + 1) % self.buffer_count != self.read_from
            || self.write_done != Some(self.write_to)
    }

    /// Whether the reader has a finished or in-progress slot to drain.
    pub fn has_read_space(&self) -> bool {
        self.read_from != self.write_to
    }

    /// Mark the current write slot finished and move to the next if the
    /// reader has freed it. Returns false when the writer is now parked
    /// behind the reader.
    pub fn advance_write(&mut self) -> bool {
        self.write_done = Some(self.write_to);
        let next = (self.write_to + 1) % self.buffer_count;
        if next == self.read_from {
            return false;
        }
        self.write_to = next;
        true
    }

    /// Move the reader off its current slot. If the writer was parked
    /// waiting for that slot, it is unparked onto it.
    pub fn advance_read(&mut self) -> bool {
        if self.read_from == self.write_to {
            return false;
        }
        if self.write_done == Some(self.write_to)
            && (self.write_to + 1) % self.buffer_count == self.read_from
        {
            self.write_to = self.read_from;
        }
        self.read_from = (self.read_from + 1) % self.buffer_count;
        true
    }
}
