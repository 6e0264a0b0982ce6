//! The poll-driven HLS ingest pipeline.
//!
//! `HlsPipeline` walks `master playlist → media playlists → segments`,
//! feeding each downloaded segment through the TS demuxer into per-type
//! elementary-stream slots. The host drives it by calling [`update`] —
//! one state transition at most per call, with all waiting expressed as
//! "stay in the current state and return" — and drains framed access
//! units through [`pull_access_units`].
//!
//! Per stream type (video/audio) the pipeline keeps a small ring of
//! stream slots (two by default): the demuxer fills the slot at the ring's
//! write cursor while the consumer drains the one at its read cursor.
//! Segment downloads stop while both slots are occupied and resume once
//! the reader frees one.
//!
//! [`update`]: HlsPipeline::update
//! [`pull_access_units`]: HlsPipeline::pull_access_units

use crate::error::PipelineError;
use crate::io::{FetchIo, FetchPoll, RequestId, ResourceId};
use crate::playlist::{MasterPlaylist, MasterPlaylistParser, MediaPlaylistParser, Rendition};
use crate::position::StreamPosition;
use tracing::{debug, error, info, trace, warn};
use ts::{Buffer, DemuxStats, Demuxer, ElementaryStream, StreamSink, StreamType};
use url::Url;

/// Sizing for the pipeline's stream buffers.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Total bytes backing the video slot ring.
    pub video_buffer_size: usize,
    /// Total bytes backing the audio slot ring.
    pub audio_buffer_size: usize,
    /// Slots per ring; at least 2 (double buffering).
    pub buffer_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video_buffer_size: 4 << 20,
            audio_buffer_size: 1 << 20,
            buffer_count: 2,
        }
    }
}

impl PipelineConfig {
    pub fn with_video_buffer_size(mut self, bytes: usize) -> Self {
        self.video_buffer_size = bytes;
        self
    }

    pub fn with_audio_buffer_size(mut self, bytes: usize) -> Self {
        self.audio_buffer_size = bytes;
        self
    }

    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }
}

/// Pipeline states. The three `*Error` states are terminal sinks; see
/// [`HlsPipeline::last_error`] for what put the pipeline there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    OpenRootList,
    ReadRootList,
    OpenMediaList,
    ReadMediaList,
    DownloadSegment,
    OpenSegment,
    ReadSegment,
    /// Upstream open/read failed, or a playlist was empty or malformed.
    NoStreamError,
    /// The demuxer reported a non-recoverable error.
    InStreamError,
    /// A state that should be unreachable was reached.
    InternalError,
}

impl PipelineState {
    /// Whether the pipeline has stopped for good.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::NoStreamError
                | PipelineState::InStreamError
                | PipelineState::InternalError
        )
    }
}

/// One access unit handed to the consumer. `data` borrows the stream
/// slot's payload buffer; copy it out before the next `update()` if it
/// must outlive the pipeline's progress.
#[derive(Debug)]
pub struct EncodedUnit<'a> {
    pub data: &'a [u8],
    /// Presentation timestamp, 33-bit 90 kHz clock.
    pub pts: u64,
    /// Decode timestamp, 33-bit 90 kHz clock.
    pub dts: u64,
}

/// Per-type output of one [`HlsPipeline::pull_access_units`] call.
#[derive(Debug, Default)]
pub struct PulledUnits<'a> {
    pub video: Option<EncodedUnit<'a>>,
    pub audio: Option<EncodedUnit<'a>>,
}

/// Cycling stream-index allocator over an inclusive range.
#[derive(Debug, Clone, Copy)]
struct IndexRange {
    first: u8,
    last: u8,
    /// Next index to hand out; zero means "not started".
    next: u8,
}

impl IndexRange {
    fn new(first: u8, last: u8) -> Self {
        Self {
            first,
            last,
            next: 0,
        }
    }

    fn reset(&mut self) {
        self.next = 0;
    }

    fn allocate(&mut self) -> u8 {
        if self.next < self.first || self.next > self.last {
            self.next = self.first;
        }
        let index = self.next;
        self.next = if index == self.last {
            self.first
        } else {
            index + 1
        };
        index
    }
}

/// The slot ring for one stream type.
#[derive(Debug)]
struct StreamSet {
    slots: Vec<Option<ElementaryStream>>,
    pos: StreamPosition,
    indices: IndexRange,
    slot_size: usize,
}

impl StreamSet {
    fn new(master_size: usize, buffer_count: usize, first_index: u8, last_index: u8) -> Self {
        Self {
            slots: (0..buffer_count).map(|_| None).collect(),
            pos: StreamPosition::new(buffer_count),
            indices: IndexRange::new(first_index, last_index),
            slot_size: master_size / buffer_count,
        }
    }

    fn reset(&mut self) {
        self.pos.reset(self.slots.len());
        self.indices.reset();
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Build a stream over the current write slot, recycling the slot's
    /// buffer if one is already there.
    fn create(&mut self, stream_type: StreamType, program_id: u16) -> &mut ElementaryStream {
        let slot = self.pos.write_to();
        let buffer = match self.slots[slot].take() {
            Some(old) => {
                let mut buffer = old.into_buffer();
                buffer.reset();
                buffer
            }
            None => Buffer::new(self.slot_size),
        };
        let index = self.indices.allocate();
        self.slots[slot].insert(ElementaryStream::new(buffer, stream_type, program_id, index))
    }

    fn get(&mut self, index: u8) -> Option<&mut ElementaryStream> {
        self.slots.iter_mut().flatten().find(|s| s.index() == index)
    }

    /// Drain the next access unit from the read slot, advancing the ring
    /// once the slot is exhausted.
    fn pull_unit(&mut self) -> Option<EncodedUnit<'_>> {
        if !self.pos.has_read_space() {
            return None;
        }
        let slot = self.pos.read_from();
        let unit_count = self.slots[slot].as_ref().map_or(0, |s| s.unit_count());
        let au_index = self.pos.read_au;
        let take = au_index < unit_count;
        if take {
            self.pos.read_au += 1;
        }
        if self.pos.read_au >= unit_count && self.pos.advance_read() {
            self.pos.read_au = 0;
        }
        if !take {
            return None;
        }
        let stream = self.slots[slot].as_ref()?;
        let unit = *stream.unit(au_index)?;
        Some(EncodedUnit {
            data: stream.unit_bytes(&unit),
            pts: unit.pts,
            dts: unit.dts,
        })
    }
}

/// The pipeline's [`StreamSink`]: video and audio slot rings with
/// range-partitioned stream indices (video `0x01..=0x7F`, audio
/// `0x80..=0xFF`).
#[derive(Debug)]
struct StreamBank {
    video: StreamSet,
    audio: StreamSet,
}

impl StreamBank {
    fn new(config: &PipelineConfig) -> Self {
        let count = config.buffer_count.max(2);
        Self {
            video: StreamSet::new(config.video_buffer_size, count, 0x01, 0x7F),
            audio: StreamSet::new(config.audio_buffer_size, count, 0x80, 0xFF),
        }
    }

    fn reset(&mut self) {
        self.video.reset();
        self.audio.reset();
    }

    fn has_ring_space(&self) -> bool {
        self.video.pos.has_write_space() && self.audio.pos.has_write_space()
    }

    fn set_for_index(&mut self, index: u8) -> Option<&mut StreamSet> {
        if (0x01..0x80).contains(&index) {
            Some(&mut self.video)
        } else if index >= 0x80 {
            Some(&mut self.audio)
        } else {
            None
        }
    }
}

impl StreamSink for StreamBank {
    fn create_stream(
        &mut self,
        stream_type: StreamType,
        program_id: u16,
    ) -> Option<&mut ElementaryStream> {
        let set = if stream_type.is_video() {
            &mut self.video
        } else {
            &mut self.audio
        };
        Some(set.create(stream_type, program_id))
    }

    fn get_stream(&mut self, program_id: u16, index: u8) -> Option<&mut ElementaryStream> {
        let set = self.set_for_index(index)?;
        set.get(index).filter(|s| s.program_id() == program_id)
    }

    fn finalize_stream(&mut self, program_id: u16, index: u8) {
        let Some(set) = self.set_for_index(index) else {
            return;
        };
        if set.get(index).is_some() {
            let parked = !set.pos.advance_write();
            trace!(program = program_id, index, parked, "stream finalized");
        }
    }

    fn overflow_stream(
        &mut self,
        program_id: u16,
        index: u8,
        needed: usize,
    ) -> Option<&mut ElementaryStream> {
        // No fallback storage: an overflowing slot fails the segment.
        debug!(
            program = program_id,
            index, needed, "stream slot overflow; declining"
        );
        None
    }
}

/// The HLS ingest state machine. See the module docs for the data flow.
#[derive(Debug)]
pub struct HlsPipeline<I: FetchIo> {
    io: I,
    state: PipelineState,
    last_error: Option<PipelineError>,
    request: RequestId,
    resource: Option<ResourceId>,
    current_url: String,
    input: Buffer,
    master: MasterPlaylist,
    /// Rendition whose media playlist is being fetched.
    to_parse: usize,
    /// Rendition selected for playback (the first; no ABR).
    to_play: usize,
    root_url: Url,
    segment_index: usize,
    demuxer: Demuxer,
    streams: StreamBank,
}

impl<I: FetchIo> HlsPipeline<I> {
    /// Start ingesting the presentation at `url`. The master playlist
    /// open request is issued immediately; progress happens in
    /// [`update`](Self::update).
    pub fn new(mut io: I, url: &str, config: PipelineConfig) -> Result<Self, PipelineError> {
        let root_url = Url::parse(url)?;
        let request = io.open(url);
        info!(url, "opening master playlist");
        Ok(Self {
            io,
            state: PipelineState::OpenRootList,
            last_error: None,
            request,
            resource: None,
            current_url: url.to_string(),
            input: Buffer::default(),
            master: MasterPlaylist::new(),
            to_parse: 0,
            to_play: 0,
            root_url,
            segment_index: 0,
            demuxer: Demuxer::new(),
            streams: StreamBank::new(&config),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Detail behind a terminal error state, if any.
    pub fn last_error(&self) -> Option<&PipelineError> {
        self.last_error.as_ref()
    }

    pub fn master(&self) -> &MasterPlaylist {
        &self.master
    }

    /// The rendition selected for playback, once media playlists are in.
    pub fn selected_rendition(&self) -> Option<&Rendition> {
        self.master.rendition(self.to_play)
    }

    /// Index of the next segment to download.
    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    /// Demuxer packet counters for the segment most recently fed.
    pub fn demux_stats(&self) -> DemuxStats {
        self.demuxer.stats()
    }

    /// Advance the pipeline by at most one state transition.
    pub fn update(&mut self) {
        match self.state {
            PipelineState::OpenRootList
            | PipelineState::OpenMediaList
            | PipelineState::OpenSegment => self.update_open(),
            PipelineState::ReadRootList => self.update_read_root(),
            PipelineState::ReadMediaList => self.update_read_media(),
            PipelineState::DownloadSegment => self.update_download(),
            PipelineState::ReadSegment => self.update_read_segment(),
            PipelineState::NoStreamError
            | PipelineState::InStreamError
            | PipelineState::InternalError => {}
        }
    }

    /// Drain the next video and audio access units, if any are ready.
    pub fn pull_access_units(&mut self) -> PulledUnits<'_> {
        let StreamBank { video, audio } = &mut self.streams;
        PulledUnits {
            video: video.pull_unit(),
            audio: audio.pull_unit(),
        }
    }

    /// Common handler for the three `Open*` states: wait for the open
    /// request, then size the resource and issue its read.
    fn update_open(&mut self) {
        match self.io.poll(self.request) {
            FetchPoll::Complete(resource) => {
                self.resource = Some(resource);
                let size = self.io.size(resource);
                if size == 0 {
                    self.close_resource();
                    self.fail_no_stream(PipelineError::Fetch {
                        url: self.current_url.clone(),
                        reason: "resource is empty",
                    });
                    return;
                }
                self.input = Buffer::new(size as usize);
                self.request = self.io.read(resource, size);
                self.state = match self.state {
                    PipelineState::OpenRootList => PipelineState::ReadRootList,
                    PipelineState::OpenMediaList => PipelineState::ReadMediaList,
                    PipelineState::OpenSegment => PipelineState::ReadSegment,
                    _ => {
                        self.fail(
                            PipelineState::InternalError,
                            PipelineError::Internal("open completion outside an open state"),
                        );
                        return;
                    }
                };
            }
            FetchPoll::Pending => {}
            FetchPoll::Error | FetchPoll::Invalid => {
                self.fail_no_stream(PipelineError::Fetch {
                    url: self.current_url.clone(),
                    reason: "open failed",
                });
            }
        }
    }

    fn update_read_root(&mut self) {
        match self.io.poll_read(self.request, &mut self.input) {
            FetchPoll::Complete(_) => {
                self.close_resource();
                let text = String::from_utf8_lossy(self.input.written()).into_owned();
                let mut parser = MasterPlaylistParser::new();
                for line in text.lines() {
                    if let Err(err) = parser.feed_line(&mut self.master, line) {
                        self.fail(PipelineState::NoStreamError, err.into());
                        return;
                    }
                }
                info!(renditions = self.master.len(), "master playlist parsed");
                if self.master.is_empty() {
                    self.fail(PipelineState::NoStreamError, PipelineError::NoRenditions);
                    return;
                }
                self.to_parse = 0;
                self.open_media_list();
            }
            FetchPoll::Pending => {}
            FetchPoll::Error | FetchPoll::Invalid => {
                self.fail(
                    PipelineState::NoStreamError,
                    PipelineError::Fetch {
                        url: self.current_url.clone(),
                        reason: "master playlist read failed",
                    },
                );
            }
        }
    }

    fn update_read_media(&mut self) {
        match self.io.poll_read(self.request, &mut self.input) {
            FetchPoll::Complete(_) => {
                self.close_resource();
                let text = String::from_utf8_lossy(self.input.written()).into_owned();
                let mut parser = MediaPlaylistParser::new();
                let mut parse_err = None;
                {
                    let Some(rendition) = self.master.rendition_mut(self.to_parse) else {
                        self.fail(
                            PipelineState::InternalError,
                            PipelineError::Internal("media playlist for a missing rendition"),
                        );
                        return;
                    };
                    for line in text.lines() {
                        if let Err(err) = parser.feed_line(&mut rendition.playlist, line) {
                            rendition.info.available = false;
                            parse_err = Some(err);
                            break;
                        }
                    }
                    if parse_err.is_none() {
                        rendition.info.available = true;
                        debug!(
                            rendition = self.to_parse,
                            segments = rendition.playlist.segment_count(),
                            "media playlist parsed"
                        );
                    }
                }
                if let Some(err) = parse_err {
                    self.fail(PipelineState::NoStreamError, err.into());
                    return;
                }

                self.to_parse += 1;
                if self.to_parse < self.master.len() {
                    self.open_media_list();
                } else {
                    // All renditions fetched; play the first one.
                    self.to_play = 0;
                    self.reset_streams();
                    self.state = PipelineState::DownloadSegment;
                }
            }
            FetchPoll::Pending => {}
            FetchPoll::Error | FetchPoll::Invalid => {
                if let Some(rendition) = self.master.rendition_mut(self.to_parse) {
                    rendition.info.available = false;
                }
                self.fail(
                    PipelineState::NoStreamError,
                    PipelineError::Fetch {
                        url: self.current_url.clone(),
                        reason: "media playlist read failed",
                    },
                );
            }
        }
    }

    fn update_download(&mut self) {
        let Some(rendition) = self.master.rendition(self.to_play) else {
            self.fail(
                PipelineState::InternalError,
                PipelineError::Internal("selected rendition disappeared"),
            );
            return;
        };
        let Some(segment) = rendition.playlist.segment(self.segment_index) else {
            return; // presentation drained; nothing left to download
        };
        if !self.streams.has_ring_space() {
            trace!("stream rings full; waiting for the reader");
            return;
        }
        let uri = segment.uri.clone();
        match self.root_url.join(&uri) {
            Ok(resolved) => {
                self.current_url = resolved.into();
                debug!(segment = self.segment_index, url = %self.current_url, "opening segment");
                self.request = self.io.open(&self.current_url);
                self.state = PipelineState::OpenSegment;
            }
            Err(err) => self.fail(PipelineState::NoStreamError, err.into()),
        }
    }

    fn update_read_segment(&mut self) {
        match self.io.poll_read(self.request, &mut self.input) {
            FetchPoll::Complete(bytes) => {
                self.close_resource();
                trace!(
                    bytes,
                    segment = self.segment_index,
                    "segment downloaded; demuxing"
                );
                match self.demuxer.read_buffer(&mut self.input, &mut self.streams) {
                    Ok(()) => {
                        self.segment_index += 1;
                        self.state = PipelineState::DownloadSegment;
                    }
                    Err(err) => self.fail(PipelineState::InStreamError, err.into()),
                }
            }
            FetchPoll::Pending => {}
            FetchPoll::Error | FetchPoll::Invalid => {
                // A lost segment read is retried from the download state.
                warn!(segment = self.segment_index, "segment read failed; retrying");
                self.close_resource();
                self.state = PipelineState::DownloadSegment;
            }
        }
    }

    fn open_media_list(&mut self) {
        let Some(rendition) = self.master.rendition(self.to_parse) else {
            self.fail(
                PipelineState::InternalError,
                PipelineError::Internal("media playlist for a missing rendition"),
            );
            return;
        };
        let uri = rendition.playlist.uri.clone();
        match self.root_url.join(&uri) {
            Ok(resolved) => {
                self.current_url = resolved.into();
                debug!(rendition = self.to_parse, url = %self.current_url, "opening media playlist");
                self.request = self.io.open(&self.current_url);
                self.state = PipelineState::OpenMediaList;
            }
            Err(err) => {
                if let Some(rendition) = self.master.rendition_mut(self.to_parse) {
                    rendition.info.available = false;
                }
                self.fail(PipelineState::NoStreamError, err.into());
            }
        }
    }

    fn reset_streams(&mut self) {
        self.streams.reset();
        self.demuxer.reset();
        self.segment_index = 0;
    }

    fn fail_no_stream(&mut self, err: PipelineError) {
        if self.state == PipelineState::OpenMediaList
            && let Some(rendition) = self.master.rendition_mut(self.to_parse)
        {
            rendition.info.available = false;
        }
        self.fail(PipelineState::NoStreamError, err);
    }

    fn fail(&mut self, state: PipelineState, err: PipelineError) {
        error!(error = %err, ?state, "pipeline failure");
        self.state = state;
        self.last_error = Some(err);
    }

    fn close_resource(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.io.close(resource);
        }
    }
}

impl<I: FetchIo> Drop for HlsPipeline<I> {
    fn drop(&mut self) {
        self.close_resource();
    }
}
