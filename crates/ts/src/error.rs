use thiserror::Error;

/// Errors produced while demultiplexing a transport stream.
#[derive(Debug, Error)]
pub enum TsError {
    /// First byte of a packet was not 0x47.
    #[error("invalid sync byte 0x{0:02x}")]
    InvalidSyncByte(u8),

    /// Malformed packet contents (bad reserved bits, bad start codes, ...).
    #[error("invalid packet: {0}")]
    InvalidPacket(&'static str),

    /// The source ended in the middle of a 188-byte packet.
    #[error("truncated packet: got {actual} of 188 bytes")]
    TruncatedPacket { actual: usize },

    /// PSI table id this demuxer does not handle; the section is skipped.
    #[error("unsupported PSI table 0x{0:02x}")]
    UnsupportedTable(u8),

    /// PSI section with current_next_indicator clear; the section is skipped.
    #[error("PSI section is not current")]
    SectionNotCurrent,

    /// A feature within the stream this demuxer does not handle.
    #[error("unsupported stream feature: {0}")]
    Unsupported(&'static str),

    /// An elementary stream ran out of buffer space and the sink declined
    /// to provide a replacement.
    #[error("elementary stream overflow (program {program_id}, index {index}): {needed} bytes needed")]
    StreamOverflow {
        program_id: u16,
        index: u8,
        needed: usize,
    },

    /// Error reported by the byte source.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Demuxer state that should be unreachable on any input.
    #[error("internal demuxer error: {0}")]
    Internal(&'static str),
}
