use crate::buffer::Buffer;
use h264::AuScanner;
use std::io::{self, Write};

/// Elementary stream types this demuxer handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// AAC audio (ISO/IEC 13818-7)
    Aac = 0x0F,
    /// H.264 video (AVC)
    H264 = 0x1B,
}

impl StreamType {
    /// Map a PMT stream_type byte to a supported type.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0F => Some(StreamType::Aac),
            0x1B => Some(StreamType::H264),
            _ => None,
        }
    }

    pub fn is_video(self) -> bool {
        self == StreamType::H264
    }

    pub fn is_audio(self) -> bool {
        self == StreamType::Aac
    }
}

/// Access-unit records are reserved in batches of this many entries.
/// Enough for ~10 seconds of 29.97 fps video per batch.
const UNIT_BATCH: usize = 384;

/// One framed access unit within an elementary stream's payload buffer.
///
/// `offset`/`size` locate the unit's bytes inside the payload; resolve
/// them with [`ElementaryStream::unit_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessUnit {
    pub offset: usize,
    pub size: usize,
    /// Presentation timestamp, 33-bit 90 kHz clock.
    pub pts: u64,
    /// Decode timestamp, 33-bit 90 kHz clock.
    pub dts: u64,
}

/// A demultiplexed elementary stream: the raw payload bytes plus, for
/// H.264 streams, the access units framed out of them.
///
/// PES payload is appended incrementally as the demuxer walks the
/// transport stream; H.264 framing runs after every append so each emitted
/// unit inherits the PTS/DTS most recently seen on the enclosing PES
/// packet. The payload buffer has a fixed capacity: an append that does
/// not fit is rejected with the shortfall so the owner can arrange a
/// larger buffer.
#[derive(Debug)]
pub struct ElementaryStream {
    stream_type: StreamType,
    program_id: u16,
    index: u8,
    stream_id: u8,
    pts: u64,
    dts: u64,
    payload: Buffer,
    scanner: AuScanner,
    units: Vec<AccessUnit>,
}

impl ElementaryStream {
    pub fn new(payload: Buffer, stream_type: StreamType, program_id: u16, index: u8) -> Self {
        Self {
            stream_type,
            program_id,
            index,
            stream_id: 0,
            pts: 0,
            dts: 0,
            payload,
            scanner: AuScanner::new(),
            units: Vec::new(),
        }
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn program_id(&self) -> u16 {
        self.program_id
    }

    /// Stream index assigned by the sink at creation.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// PES stream id, recorded from the last packet start.
    pub fn stream_id(&self) -> u8 {
        self.stream_id
    }

    pub fn set_stream_id(&mut self, stream_id: u8) {
        self.stream_id = stream_id;
    }

    pub fn pts(&self) -> u64 {
        self.pts
    }

    pub fn dts(&self) -> u64 {
        self.dts
    }

    /// Record a PTS-only timestamp (DTS follows PTS).
    pub fn update_pts(&mut self, pts: u64) {
        self.pts = pts;
        self.dts = pts;
    }

    pub fn update_pts_dts(&mut self, pts: u64, dts: u64) {
        self.pts = pts;
        self.dts = dts;
    }

    /// Move `len` bytes from `source` into the payload and run framing.
    ///
    /// Returns 0 on success. If the payload buffer cannot take `len` more
    /// bytes, nothing is consumed and the missing byte count is returned.
    pub fn append_payload(&mut self, source: &mut Buffer, len: usize) -> usize {
        if len > self.payload.available() {
            return len - self.payload.available();
        }
        if len == 0 {
            return 0;
        }

        let pulled = self.payload.pull_from(source, len);
        debug_assert_eq!(pulled, len);

        if self.stream_type == StreamType::H264 {
            let Self {
                scanner,
                payload,
                units,
                pts,
                dts,
                ..
            } = self;
            let (pts, dts) = (*pts, *dts);
            scanner.scan(payload.written(), |offset, size| {
                push_unit(
                    units,
                    AccessUnit {
                        offset,
                        size,
                        pts,
                        dts,
                    },
                );
            });
        }
        0
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn unit(&self, index: usize) -> Option<&AccessUnit> {
        self.units.get(index)
    }

    /// The payload bytes of a framed access unit.
    pub fn unit_bytes(&self, unit: &AccessUnit) -> &[u8] {
        &self.payload.written()[unit.offset..unit.offset + unit.size]
    }

    pub fn payload(&self) -> &Buffer {
        &self.payload
    }

    /// Dump the raw payload (for debugging or stream extraction).
    pub fn write_payload<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.payload.written())
    }

    /// Tear down the stream, returning its payload buffer for reuse.
    pub fn into_buffer(self) -> Buffer {
        self.payload
    }
}

fn push_unit(units: &mut Vec<AccessUnit>, unit: AccessUnit) {
    if units.len() == units.capacity() {
        units.reserve_exact(UNIT_BATCH);
    }
    units.push(unit);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nal(header: u8, body: &[u8]) -> Vec<u8> {
        let mut v = vec![0x00, 0x00, 0x01, header];
        v.extend_from_slice(body);
        v
    }

    fn frame() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(nal(0x09, &[0xF0])); // delimiter
        data.extend(nal(0x67, &[0x42, 0x00, 0x1E])); // SPS
        data.extend(nal(0x65, &[0x88, 0x84, 0x00, 0x33])); // IDR slice, mb 0
        data
    }

    #[test]
    fn test_units_inherit_current_timestamps() {
        let mut es = ElementaryStream::new(Buffer::new(1024), StreamType::H264, 1, 1);

        es.update_pts_dts(9000, 6000);
        let mut src = Buffer::from_slice(&frame());
        let len = src.size();
        assert_eq!(es.append_payload(&mut src, len), 0);
        assert_eq!(es.unit_count(), 0); // first unit still open

        es.update_pts_dts(12_000, 9000);
        let mut src = Buffer::from_slice(&frame());
        let len = src.size();
        assert_eq!(es.append_payload(&mut src, len), 0);

        // The second frame's delimiter closed the first unit; the
        // timestamps are the ones current at emission.
        assert_eq!(es.unit_count(), 1);
        let unit = *es.unit(0).unwrap();
        assert_eq!(unit.pts, 12_000);
        assert_eq!(unit.dts, 9000);
        assert_eq!(unit.offset, 0);
        assert!(unit.offset + unit.size <= es.payload().written().len());
    }

    #[test]
    fn test_unit_bytes_resolve_within_payload() {
        let mut es = ElementaryStream::new(Buffer::new(1024), StreamType::H264, 1, 1);
        for _ in 0..3 {
            let mut src = Buffer::from_slice(&frame());
            let len = src.size();
            es.append_payload(&mut src, len);
        }
        assert_eq!(es.unit_count(), 2);
        let total: usize = (0..es.unit_count()).map(|i| es.unit(i).unwrap().size).sum();
        assert!(total <= es.payload().written().len());

        let unit = *es.unit(0).unwrap();
        let bytes = es.unit_bytes(&unit);
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x01, 0x09]);
    }

    #[test]
    fn test_append_reports_shortfall_without_consuming() {
        let mut es = ElementaryStream::new(Buffer::new(8), StreamType::H264, 1, 1);
        let mut src = Buffer::from_slice(&[0u8; 20]);
        assert_eq!(es.append_payload(&mut src, 20), 12);
        // Nothing was pulled from the source.
        assert_eq!(src.size(), 20);
        assert_eq!(es.payload().size(), 0);
    }

    #[test]
    fn test_aac_streams_capture_payload_without_framing() {
        let mut es = ElementaryStream::new(Buffer::new(256), StreamType::Aac, 1, 0x80);
        let mut src = Buffer::from_slice(&frame());
        let len = src.size();
        assert_eq!(es.append_payload(&mut src, len), 0);
        assert_eq!(es.unit_count(), 0);
        assert_eq!(es.payload().written().len(), len);
    }

    #[test]
    fn test_update_pts_mirrors_into_dts() {
        let mut es = ElementaryStream::new(Buffer::new(16), StreamType::H264, 1, 1);
        es.update_pts(0x1_FFFF_FFFF);
        assert_eq!(es.pts(), 0x1_FFFF_FFFF);
        assert_eq!(es.dts(), 0x1_FFFF_FFFF);
    }

    #[test]
    fn test_write_payload_dumps_bytes() {
        let mut es = ElementaryStream::new(Buffer::new(64), StreamType::Aac, 1, 0x80);
        let mut src = Buffer::from_slice(&[1, 2, 3]);
        es.append_payload(&mut src, 3);
        let mut out = Vec::new();
        es.write_payload(&mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }
}
