use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use ts::{Buffer, Demuxer, ElementaryStream, StreamSink, StreamType};

struct BenchSink {
    streams: Vec<ElementaryStream>,
}

impl StreamSink for BenchSink {
    fn create_stream(
        &mut self,
        stream_type: StreamType,
        program_id: u16,
    ) -> Option<&mut ElementaryStream> {
        let index = if stream_type.is_video() { 1 } else { 0x80 };
        self.streams.push(ElementaryStream::new(
            Buffer::new(4 << 20),
            stream_type,
            program_id,
            index,
        ));
        self.streams.last_mut()
    }

    fn get_stream(&mut self, program_id: u16, index: u8) -> Option<&mut ElementaryStream> {
        self.streams
            .iter_mut()
            .find(|s| s.program_id() == program_id && s.index() == index)
    }

    fn finalize_stream(&mut self, _program_id: u16, _index: u8) {}

    fn overflow_stream(
        &mut self,
        _program_id: u16,
        _index: u8,
        _needed: usize,
    ) -> Option<&mut ElementaryStream> {
        None
    }
}

fn ts_packet(pid: u16, pusi: bool, cc: u8, payload: &[u8]) -> [u8; 188] {
    let mut pkt = [0xFFu8; 188];
    pkt[0] = 0x47;
    pkt[1] = ((pid >> 8) as u8 & 0x1F) | if pusi { 0x40 } else { 0x00 };
    pkt[2] = pid as u8;
    let stuffing = 184 - payload.len();
    if stuffing == 0 {
        pkt[3] = 0x10 | cc;
        pkt[4..].copy_from_slice(payload);
    } else {
        pkt[3] = 0x30 | cc;
        pkt[4] = (stuffing - 1) as u8;
        if stuffing > 1 {
            pkt[5] = 0x00;
        }
        pkt[4 + stuffing..].copy_from_slice(payload);
    }
    pkt
}

fn psi_payload(table_id: u8, id_extension: u16, body: &[u8]) -> Vec<u8> {
    let section_length = 5 + body.len() + 4;
    let mut v = vec![0x00, table_id];
    v.push(0xB0 | ((section_length >> 8) as u8 & 0x0F));
    v.push(section_length as u8);
    v.extend_from_slice(&id_extension.to_be_bytes());
    v.extend_from_slice(&[0xC1, 0x00, 0x00]);
    v.extend_from_slice(body);
    v.extend_from_slice(&[0, 0, 0, 0]);
    v
}

/// A synthetic segment: PAT, PMT, then a run of video PES packets
/// carrying parameter sets and slices.
fn build_segment(pes_packets: usize) -> Vec<u8> {
    let mut pat_body = Vec::new();
    pat_body.extend_from_slice(&1u16.to_be_bytes());
    pat_body.extend_from_slice(&(0xE000u16 | 0x1000).to_be_bytes());

    let mut pmt_body = Vec::new();
    pmt_body.extend_from_slice(&(0xE000u16 | 0x100).to_be_bytes());
    pmt_body.extend_from_slice(&0xF000u16.to_be_bytes());
    pmt_body.push(0x1B);
    pmt_body.extend_from_slice(&(0xE000u16 | 0x100).to_be_bytes());
    pmt_body.extend_from_slice(&0xF000u16.to_be_bytes());

    let mut out = Vec::new();
    out.extend_from_slice(&ts_packet(0, true, 0, &psi_payload(0x00, 1, &pat_body)));
    out.extend_from_slice(&ts_packet(0x1000, true, 0, &psi_payload(0x02, 1, &pmt_body)));

    let mut frame = vec![
        0x00, 0x00, 0x01, 0x09, 0xF0, // AUD
        0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, // SPS
        0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, 0x33, // IDR
    ];
    frame.resize(160, 0xA5); // slice data filler

    let mut pes = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0x80, 0x05];
    pes.extend_from_slice(&[0x21, 0x00, 0x03, 0x00, 0x01]); // PTS
    pes.extend_from_slice(&frame);

    for i in 0..pes_packets {
        out.extend_from_slice(&ts_packet(0x100, true, (i % 16) as u8, &pes));
    }
    out
}

fn benchmark_demuxer(c: &mut Criterion) {
    let mut group = c.benchmark_group("Demuxer");

    let segment = build_segment(1000);
    group.throughput(criterion::Throughput::Bytes(segment.len() as u64));

    group.bench_function("read_buffer (1000 PES packets)", |b| {
        b.iter(|| {
            let mut demuxer = Demuxer::new();
            let mut sink = BenchSink {
                streams: Vec::new(),
            };
            let mut input = Buffer::from_slice(black_box(&segment));
            demuxer.read_buffer(&mut input, &mut sink).unwrap();
            black_box(sink.streams.len())
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_demuxer);
criterion_main!(benches);
