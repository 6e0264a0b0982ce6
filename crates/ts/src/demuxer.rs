//! Streaming transport-stream demultiplexer.
//!
//! The demuxer consumes 188-byte packets one at a time, reassembling PSI
//! sections and PES packets per PID. It owns no elementary-stream storage:
//! a [`StreamSink`] supplied by the caller creates and looks up
//! [`ElementaryStream`]s, decoupling demuxing from buffering policy.

use crate::buffer::Buffer;
use crate::packet::{PACKET_SIZE, PID_NULL, PID_PAT, PacketHeader};
use crate::pes::{self, PesStart};
use crate::psi::{self, SectionHeader, TABLE_ID_PAT, TABLE_ID_PMT};
use crate::stream::{ElementaryStream, StreamType};
use crate::{Result, TsError};
use std::io::Read;
use tracing::{debug, trace, warn};

/// Storage policy hooks the demuxer drives as it discovers and fills
/// elementary streams.
pub trait StreamSink {
    /// A PMT entry referenced a supported stream type for the first time.
    /// Returns the stream to demux into, or `None` to refuse it.
    fn create_stream(
        &mut self,
        stream_type: StreamType,
        program_id: u16,
    ) -> Option<&mut ElementaryStream>;

    /// Look up a previously created stream by program and index.
    fn get_stream(&mut self, program_id: u16, index: u8) -> Option<&mut ElementaryStream>;

    /// The input ended; the stream at (program, index) is complete.
    fn finalize_stream(&mut self, program_id: u16, index: u8);

    /// The stream's payload buffer is `needed` bytes short. Return a
    /// stream with more room to resume into, or `None` to give up.
    fn overflow_stream(
        &mut self,
        program_id: u16,
        index: u8,
        needed: usize,
    ) -> Option<&mut ElementaryStream>;
}

#[derive(Debug)]
enum PidKind {
    /// Seen on the wire but not yet classified.
    Null,
    Psi {
        program_id: u16,
        table_id: u8,
        has_syntax: bool,
    },
    Pes {
        program_id: u16,
        header_flags: u16,
        index: u8,
    },
}

/// Per-PID reassembly node. For PSI PIDs the buffer accumulates the
/// current section; for PES PIDs it accumulates the optional header.
#[derive(Debug)]
struct PidBuffer {
    pid: u16,
    kind: PidKind,
    reassembly: Buffer,
}

/// Packet counters for observability.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemuxStats {
    /// Packets with a valid sync byte.
    pub packets: u64,
    /// Packets dropped for a transport error indicator.
    pub skipped: u64,
}

/// Streaming MPEG-2 TS demultiplexer.
#[derive(Debug, Default)]
pub struct Demuxer {
    /// PID nodes, kept sorted by ascending PID.
    pids: Vec<PidBuffer>,
    /// Scratch buffer holding the packet currently being parsed.
    packet: Buffer,
    stats: DemuxStats,
}

impl Demuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all per-PID state and counters.
    pub fn reset(&mut self) {
        self.pids.clear();
        self.stats = DemuxStats::default();
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// Demux every packet remaining in `input`. The demuxer restarts
    /// (PAT/PMT rediscovery) at the head of each call, as every HLS
    /// segment carries its own tables.
    pub fn read_buffer<S: StreamSink>(&mut self, input: &mut Buffer, sink: &mut S) -> Result<()> {
        self.read_loop(|packet| Ok(packet.pull_from(input, PACKET_SIZE)), sink)
    }

    /// Demux packets from an [`io::Read`] source until end of input.
    pub fn read_io<R: Read, S: StreamSink>(&mut self, reader: &mut R, sink: &mut S) -> Result<()> {
        self.read_loop(|packet| packet.push_from_reader(reader, PACKET_SIZE), sink)
    }

    fn read_loop<F, S>(&mut self, mut fill: F, sink: &mut S) -> Result<()>
    where
        F: FnMut(&mut Buffer) -> std::io::Result<usize>,
        S: StreamSink,
    {
        if self.packet.capacity() < PACKET_SIZE {
            self.packet = Buffer::new(PACKET_SIZE);
        }
        self.reset();

        loop {
            self.packet.reset();
            let cnt = fill(&mut self.packet)?;
            if cnt == 0 {
                break;
            }
            if cnt < PACKET_SIZE {
                return Err(TsError::TruncatedPacket { actual: cnt });
            }
            self.parse_packet(sink)?;
        }

        self.finalize_streams(sink);
        Ok(())
    }

    fn finalize_streams<S: StreamSink>(&mut self, sink: &mut S) {
        for node in &self.pids {
            if let PidKind::Pes {
                program_id, index, ..
            } = node.kind
            {
                sink.finalize_stream(program_id, index);
            }
        }
    }

    fn parse_packet<S: StreamSink>(&mut self, sink: &mut S) -> Result<()> {
        let header = PacketHeader::parse(&mut self.packet)?;
        self.stats.packets += 1;

        if header.transport_error {
            self.stats.skipped += 1;
            trace!(pid = header.pid, "dropping packet with transport error");
            return Ok(());
        }
        if header.pid == PID_NULL || !header.has_payload {
            return Ok(());
        }
        if header.has_adaptation {
            let len = self.packet.pull_byte() as usize;
            self.packet.skip(len);
            if self.packet.overflow() {
                return Err(TsError::InvalidPacket("adaptation field exceeds packet"));
            }
        }

        let idx = self.find_or_create(header.pid);
        if header.pid == PID_PAT || matches!(self.pids[idx].kind, PidKind::Psi { .. }) {
            self.parse_psi(idx, header.payload_unit_start, sink)
        } else if matches!(self.pids[idx].kind, PidKind::Pes { .. }) {
            self.parse_pes(idx, header.payload_unit_start, sink)
        } else {
            // A PID no table has referenced yet; drop its payload.
            Ok(())
        }
    }

    /// Locate the node for `pid`, inserting one in PID order if missing.
    fn find_or_create(&mut self, pid: u16) -> usize {
        match self.pids.binary_search_by_key(&pid, |node| node.pid) {
            Ok(idx) => idx,
            Err(idx) => {
                self.pids.insert(
                    idx,
                    PidBuffer {
                        pid,
                        kind: PidKind::Null,
                        reassembly: Buffer::default(),
                    },
                );
                idx
            }
        }
    }

    fn parse_psi<S: StreamSink>(&mut self, idx: usize, start: bool, sink: &mut S) -> Result<()> {
        if start {
            // Pointer field offsets the table data within this packet.
            let pointer = self.packet.pull_byte() as usize;
            self.packet.skip(pointer);
            if self.packet.overflow() {
                return Err(TsError::InvalidPacket("psi pointer field exceeds packet"));
            }

            let header = SectionHeader::parse(&mut self.packet)?;
            let node = &mut self.pids[idx];
            let program_id = match node.kind {
                PidKind::Psi { program_id, .. } => program_id,
                _ => 0,
            };
            node.kind = PidKind::Psi {
                program_id,
                table_id: header.table_id,
                has_syntax: header.has_syntax,
            };
            node.reassembly = Buffer::new(header.section_length);
        } else if self.pids[idx].reassembly.available() == 0 {
            // Continuation with no open section (either never started or
            // already completed).
            return Err(TsError::InvalidPacket("psi continuation without open section"));
        }

        let node = &mut self.pids[idx];
        let want = self.packet.size().min(node.reassembly.available());
        let pulled = node.reassembly.pull_from(&mut self.packet, want);
        if pulled != want {
            return Err(TsError::Internal("psi reassembly short pull"));
        }
        if node.reassembly.available() > 0 {
            return Ok(()); // section continues in the next packet
        }

        match self.process_section(idx, sink) {
            Ok(()) => Ok(()),
            // A single bad section is skipped; the stream goes on.
            Err(TsError::UnsupportedTable(table_id)) => {
                warn!(table_id, "skipping unsupported PSI table");
                Ok(())
            }
            Err(TsError::SectionNotCurrent) => {
                debug!("skipping PSI section that is not current");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn process_section<S: StreamSink>(&mut self, idx: usize, sink: &mut S) -> Result<()> {
        let (table_id, has_syntax) = match self.pids[idx].kind {
            PidKind::Psi {
                table_id,
                has_syntax,
                ..
            } => (table_id, has_syntax),
            _ => return Err(TsError::Internal("section completed on a non-PSI pid")),
        };
        if !has_syntax {
            return Err(TsError::UnsupportedTable(table_id));
        }

        // Take the section out of the node: processing a PMT inserts new
        // PID nodes, which would invalidate a borrow into the list.
        let mut section = std::mem::take(&mut self.pids[idx].reassembly);

        let program_id = psi::parse_syntax_prelude(&mut section)?;
        match table_id {
            TABLE_ID_PAT => {
                let entries = section.size().saturating_sub(4) / 4;
                for _ in 0..entries {
                    let entry = psi::parse_pat_entry(&mut section)?;
                    debug!(
                        program = entry.program_number,
                        pmt_pid = entry.pmt_pid,
                        "PAT program"
                    );
                    let pmt = self.find_or_create(entry.pmt_pid);
                    self.pids[pmt].kind = PidKind::Psi {
                        program_id: entry.program_number,
                        table_id: 0,
                        has_syntax: false,
                    };
                }
            }
            TABLE_ID_PMT => self.process_pmt(&mut section, program_id, sink)?,
            other => return Err(TsError::UnsupportedTable(other)),
        }

        section.skip(4); // trailing CRC32, not validated
        Ok(())
    }

    fn process_pmt<S: StreamSink>(
        &mut self,
        section: &mut Buffer,
        program_id: u16,
        sink: &mut S,
    ) -> Result<()> {
        let pcr_pid = psi::parse_pmt_prelude(section)?;
        trace!(program = program_id, pcr_pid, "PMT prelude");

        // Stream entries run until the 4-byte CRC trailer.
        while section.size() > 4 {
            let entry = psi::parse_pmt_stream(section)?;
            let Some(stream_type) = StreamType::from_u8(entry.stream_type) else {
                trace!(
                    stream_type = entry.stream_type,
                    pid = entry.pid,
                    "ignoring unsupported stream type"
                );
                continue;
            };

            let node_idx = self.find_or_create(entry.pid);
            if matches!(self.pids[node_idx].kind, PidKind::Null) {
                self.pids[node_idx].kind = PidKind::Pes {
                    program_id,
                    header_flags: 0,
                    index: 0,
                };
            }
            let index = match self.pids[node_idx].kind {
                PidKind::Pes { index, .. } => index,
                _ => 0,
            };

            let assigned = match sink.get_stream(program_id, index) {
                Some(stream) => stream.index(),
                None => match sink.create_stream(stream_type, program_id) {
                    Some(stream) => {
                        debug!(
                            program = program_id,
                            pid = entry.pid,
                            index = stream.index(),
                            ?stream_type,
                            "registered elementary stream"
                        );
                        stream.index()
                    }
                    None => return Err(TsError::Internal("stream sink refused to create a stream")),
                },
            };
            if let PidKind::Pes { index, .. } = &mut self.pids[node_idx].kind {
                *index = assigned;
            }
        }

        if section.size() == 4 {
            Ok(())
        } else {
            Err(TsError::InvalidPacket("pmt stream loop misaligned"))
        }
    }

    fn parse_pes<S: StreamSink>(&mut self, idx: usize, start: bool, sink: &mut S) -> Result<()> {
        let (program_id, mut header_flags, index) = match self.pids[idx].kind {
            PidKind::Pes {
                program_id,
                header_flags,
                index,
            } => (program_id, header_flags, index),
            _ => return Err(TsError::Internal("pes payload on a non-PES pid")),
        };

        if sink.get_stream(program_id, index).is_none() {
            // The PMT has not registered this stream yet; drop the payload.
            return Ok(());
        }

        if start {
            let pes = match PesStart::parse(&mut self.packet) {
                Ok(pes) => pes,
                Err(TsError::Unsupported(what)) => {
                    warn!(pid = self.pids[idx].pid, what, "skipping unsupported PES packet");
                    self.pids[idx].reassembly = Buffer::default();
                    if let PidKind::Pes { header_flags, .. } = &mut self.pids[idx].kind {
                        *header_flags = 0;
                    }
                    return Ok(());
                }
                Err(err) => return Err(err),
            };

            if let Some(stream) = sink.get_stream(program_id, index) {
                stream.set_stream_id(pes.stream_id);
            }
            header_flags = pes.header_flags;
            if let PidKind::Pes { header_flags, .. } = &mut self.pids[idx].kind {
                *header_flags = pes.header_flags;
            }
            self.pids[idx].reassembly = Buffer::new(pes.header_len as usize);
        }

        // Fill the optional-header buffer; once complete, lift PTS/DTS.
        let mut timestamps = None;
        let node = &mut self.pids[idx];
        if node.reassembly.available() > 0 {
            let want = node.reassembly.available().min(self.packet.size());
            node.reassembly.pull_from(&mut self.packet, want);
            if node.reassembly.available() > 0 {
                return Ok(()); // header continues in the next packet
            }
            match header_flags & pes::PTS_DTS_MASK {
                pes::FLAG_PTS => {
                    let pts = pes::pull_timestamp(&mut node.reassembly);
                    timestamps = Some((pts, pts));
                }
                pes::FLAG_PTS_DTS => {
                    let pts = pes::pull_timestamp(&mut node.reassembly);
                    let dts = pes::pull_timestamp(&mut node.reassembly);
                    timestamps = Some((pts, dts));
                }
                _ => {}
            }
        }

        let len = self.packet.size();
        let Some(stream) = sink.get_stream(program_id, index) else {
            return Ok(());
        };
        if let Some((pts, dts)) = timestamps {
            stream.update_pts_dts(pts, dts);
        }

        let needed = stream.append_payload(&mut self.packet, len);
        if needed > 0 {
            debug!(
                program = program_id,
                index, needed, "elementary stream overflow"
            );
            let Some(stream) = sink.overflow_stream(program_id, index, needed) else {
                return Err(TsError::StreamOverflow {
                    program_id,
                    index,
                    needed,
                });
            };
            if stream.append_payload(&mut self.packet, len) > 0 {
                return Err(TsError::StreamOverflow {
                    program_id,
                    index,
                    needed,
                });
            }
        }
        Ok(())
    }
}
