//! HTTP Live Streaming ingest: playlist parsing and the segment pipeline.
//!
//! The crate has two halves:
//!
//! - [`playlist`] — line-oriented parsers for master and media M3U8
//!   playlists (the RFC 8216 tag subset this library consumes).
//! - [`pipeline`] — [`HlsPipeline`], the poll-driven state machine that
//!   fetches the master playlist, its media playlists and their transport
//!   stream segments through a host-supplied [`FetchIo`], demultiplexes
//!   each segment, and hands framed access units to the consumer.
//!
//! No I/O happens in this crate; all resource access goes through the
//! [`FetchIo`] trait and the host drives progress by calling
//! [`HlsPipeline::update`] — typically once per frame or event-loop tick.

pub mod error;
pub mod io;
pub mod pipeline;
pub mod playlist;
pub mod position;

pub use error::{PipelineError, PlaylistError};
pub use io::{FetchIo, FetchPoll, RequestId, ResourceId};
pub use pipeline::{EncodedUnit, HlsPipeline, PipelineConfig, PipelineState, PulledUnits};
pub use playlist::{
    MasterPlaylist, MasterPlaylistParser, MediaPlaylist, MediaPlaylistParser, PlaylistInfo,
    Rendition, Segment,
};
pub use position::StreamPosition;
