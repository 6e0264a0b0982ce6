use crate::nal::NalUnitType;

/// Incremental access-unit boundary scanner over an Annex B byte stream.
///
/// The scanner walks a growing buffer looking for `00 00 01` start codes and
/// groups the NAL units between them into access units, approximating the
/// boundary rules of ITU-T H.264 Figure 7-1: a frame's non-VCL units (SEI,
/// parameter sets, delimiters) precede its VCL units, so either a non-VCL
/// unit or a slice with `first_mb_in_slice == 0` seen after VCL data closes
/// the current access unit.
///
/// State survives across calls, so feeding the stream in arbitrarily small
/// increments produces the same boundaries as one large scan. Bytes that
/// cannot be classified are consumed one position at a time without error.
#[derive(Debug, Default, Clone)]
pub struct AuScanner {
    /// Next byte offset to inspect.
    head: usize,
    /// Offset of the first byte of the accumulating access unit.
    au_start: Option<usize>,
    /// Set while expecting the VCL portion of the current access unit.
    vcl_check: bool,
}

impl AuScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all scan state (for buffer reuse).
    pub fn reset(&mut self) {
        self.head = 0;
        self.au_start = None;
        self.vcl_check = false;
    }

    /// Current scan offset within the stream.
    pub fn position(&self) -> usize {
        self.head
    }

    /// Scan `data` from the last stopping point, emitting each completed
    /// access unit as `(offset, len)` into `data`.
    ///
    /// `data` must contain everything fed so far: callers append to one
    /// buffer and re-pass its full contents. The scanner stops four bytes
    /// short of the end so a start code straddling the next append is not
    /// missed.
    pub fn scan<F>(&mut self, data: &[u8], mut emit: F)
    where
        F: FnMut(usize, usize),
    {
        while self.head + 4 < data.len() {
            let h = self.head;

            if data[h] != 0 {
                // No start code can begin on a nonzero byte; jump to the
                // next zero within the scannable window.
                self.head = match memchr::memchr(0, &data[h..data.len() - 4]) {
                    Some(off) => h + off,
                    None => data.len() - 4,
                };
                continue;
            }

            if data[h + 1] != 0 || data[h + 2] != 0x01 {
                self.head += 1;
                continue;
            }

            // Start code found; classify the NAL unit behind it. Types
            // outside the framing range come back None and are ignored.
            let mut finish = false;

            if let Some(nal_type) = NalUnitType::from_header(data[h + 3]) {
                if self.vcl_check {
                    if nal_type.is_vcl() {
                        // Entered the VCL portion of the current unit.
                        self.vcl_check = false;
                    }
                } else if !nal_type.is_vcl() {
                    self.vcl_check = true;
                    if self.au_start.is_none() {
                        self.au_start = Some(h);
                    } else {
                        finish = true;
                    }
                } else if data[h + 4] & 0x80 != 0 {
                    // First slice of a picture: first_mb_in_slice is ue(v)
                    // coded, so a leading 1 bit means macroblock zero.
                    if self.au_start.is_none() {
                        self.au_start = Some(h);
                    } else {
                        finish = true;
                    }
                }
            }

            if finish && let Some(start) = self.au_start.take() {
                emit(start, h - start);
                self.vcl_check = false;
            }

            self.head += 4;
        }
    }
}
