//! Streaming MPEG-2 Transport Stream demultiplexer.
//!
//! This crate reassembles PSI tables (PAT/PMT) and PES packets from
//! 188-byte TS packets, routes payload bytes into per-stream
//! [`ElementaryStream`] containers, and frames H.264 payloads into access
//! units as the bytes arrive. Storage policy lives behind the
//! [`StreamSink`] trait, so a host decides where stream buffers come from
//! (see the `hls` crate for a double-buffered implementation).
//!
//! Supported stream types: H.264 video (0x1B) and AAC audio (0x0F; payload
//! captured, not framed). PSI CRC32 trailers are skipped, not validated.
//!
//! ```
//! use ts::{Buffer, Demuxer, ElementaryStream, StreamSink, StreamType};
//!
//! struct Sink(Vec<ElementaryStream>);
//!
//! impl StreamSink for Sink {
//!     fn create_stream(&mut self, ty: StreamType, prog: u16) -> Option<&mut ElementaryStream> {
//!         let index = self.0.len() as u8 + 1;
//!         self.0.push(ElementaryStream::new(Buffer::new(1 << 20), ty, prog, index));
//!         self.0.last_mut()
//!     }
//!     fn get_stream(&mut self, _prog: u16, index: u8) -> Option<&mut ElementaryStream> {
//!         self.0.iter_mut().find(|s| s.index() == index)
//!     }
//!     fn finalize_stream(&mut self, _prog: u16, _index: u8) {}
//!     fn overflow_stream(&mut self, _p: u16, _i: u8, _n: usize) -> Option<&mut ElementaryStream> {
//!         None
//!     }
//! }
//!
//! let mut demuxer = Demuxer::new();
//! let mut sink = Sink(Vec::new());
//! let mut segment = Buffer::from_slice(&[]); // transport stream bytes
//! demuxer.read_buffer(&mut segment, &mut sink).unwrap();
//! ```

pub mod buffer;
pub mod demuxer;
pub mod error;
pub mod packet;
pub mod pes;
pub mod psi;
pub mod stream;

pub use buffer::Buffer;
pub use demuxer::{DemuxStats, Demuxer, StreamSink};
pub use error::TsError;
pub use packet::{PACKET_SIZE, PID_NULL, PID_PAT, PacketHeader, SYNC_BYTE};
pub use stream::{AccessUnit, ElementaryStream, StreamType};

/// Result type for TS demultiplexing operations.
pub type Result<T> = std::result::Result<T, TsError>;
