//! # ICY Metadata Demultiplexer
//!
//! Shoutcast/Icecast servers interleave a metadata frame after every
//! `icy-metaint` payload bytes:
//!
//! ```text
//! [ interval payload bytes ][ L ][ L × 16 bytes of text ][ interval payload bytes ][ L ] ...
//! ```
//!
//! `L` is a single length byte (0 for a heartbeat frame). The text is a list of
//! `Key='Value';` entries padded with NUL bytes.
//!
//! [`IcyDemuxer`] strips frames out of an arbitrarily chunked byte stream. It
//! keeps its cursor between calls, so a frame (or just its length byte) may
//! straddle any number of chunk boundaries. Payload is returned as borrowed
//! slices of the input chunk; nothing of the chunk is retained after
//! [`process`](IcyDemuxer::process) returns except metadata text, which is
//! copied into a bounded buffer.

use crate::config::ICY_METADATA_BOUND;
use crate::error::PlaybackError;
use crate::metadata::{MetaKey, MetaValue};
use bytes::BytesMut;
use tracing::{debug, info, trace, warn};

/// Where the demultiplexer is within the current interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemuxPhase {
    /// Accumulating payload bytes.
    Payload,
    /// The interval is complete and the next byte is the frame length byte.
    PendingLength,
    /// Accumulating metadata text; `remaining` bytes of the frame are still due.
    Metadata { remaining: usize },
}

/// One call's worth of demultiplexed output.
#[derive(Debug, Default)]
pub struct Demuxed<'a> {
    /// Payload segments in stream order, borrowed from the input chunk.
    pub payload: Vec<&'a [u8]>,
    /// Metadata frames completed during this call.
    pub records: Vec<MetadataRecord>,
    /// Frames whose declared size exceeded the accumulation bound.
    pub violations: Vec<PlaybackError>,
}

impl Demuxed<'_> {
    /// Total payload bytes across all segments.
    pub fn payload_len(&self) -> usize {
        self.payload.iter().map(|segment| segment.len()).sum()
    }
}

/// Stateful splitter of payload and ICY metadata frames.
#[derive(Debug)]
pub struct IcyDemuxer {
    interval: Option<usize>,
    payload_counter: usize,
    phase: DemuxPhase,
    buffer: BytesMut,
    capacity: usize,
}

impl Default for IcyDemuxer {
    fn default() -> Self {
        Self::new(ICY_METADATA_BOUND)
    }
}

impl IcyDemuxer {
    /// Create a demultiplexer with no metadata interval, buffering at most
    /// `capacity` bytes of text per frame.
    pub fn new(capacity: usize) -> Self {
        Self {
            interval: None,
            payload_counter: 0,
            phase: DemuxPhase::Payload,
            buffer: BytesMut::with_capacity(capacity.min(ICY_METADATA_BOUND)),
            capacity,
        }
    }

    /// Set the metadata interval. Zero or negative disables demultiplexing.
    ///
    /// The cursor restarts at the beginning of an interval.
    pub fn set_interval(&mut self, interval: i64) {
        self.interval = usize::try_from(interval).ok().filter(|&n| n > 0);
        self.payload_counter = 0;
        self.phase = DemuxPhase::Payload;
        self.buffer.clear();
        match self.interval {
            Some(interval) => info!(interval, "ICY metadata enabled"),
            None => info!("ICY metadata disabled"),
        }
    }

    pub fn interval(&self) -> Option<usize> {
        self.interval
    }

    /// Payload bytes seen since the last metadata frame.
    pub fn payload_counter(&self) -> usize {
        self.payload_counter
    }

    pub fn phase(&self) -> DemuxPhase {
        self.phase
    }

    /// Bytes of metadata text accumulated for the frame in progress.
    pub fn pending_text_len(&self) -> usize {
        self.buffer.len()
    }

    /// Split `chunk` into payload segments and completed metadata records.
    pub fn process<'a>(&mut self, chunk: &'a [u8]) -> Demuxed<'a> {
        let mut out = Demuxed::default();
        let mut rest = chunk;

        while !rest.is_empty() {
            let Some(interval) = self.interval else {
                out.payload.push(rest);
                break;
            };

            match self.phase {
                DemuxPhase::Payload => {
                    let take = (interval - self.payload_counter).min(rest.len());
                    out.payload.push(&rest[..take]);
                    rest = &rest[take..];
                    self.payload_counter += take;
                    if self.payload_counter == interval {
                        self.payload_counter = 0;
                        self.phase = DemuxPhase::PendingLength;
                    }
                }
                DemuxPhase::PendingLength => {
                    let declared = usize::from(rest[0]) * 16;
                    rest = &rest[1..];
                    self.begin_frame(declared, &mut out);
                }
                DemuxPhase::Metadata { remaining } => {
                    let take = remaining.min(rest.len());
                    self.accumulate(&rest[..take]);
                    rest = &rest[take..];
                    if take == remaining {
                        self.finish_frame(&mut out);
                    } else {
                        self.phase = DemuxPhase::Metadata {
                            remaining: remaining - take,
                        };
                    }
                }
            }
        }

        out
    }

    fn begin_frame(&mut self, declared: usize, out: &mut Demuxed<'_>) {
        trace!(declared, "Metadata frame started");
        self.buffer.clear();

        if declared > self.capacity {
            warn!(
                declared,
                capacity = self.capacity,
                "Metadata frame exceeds buffer bound, discarding overflow"
            );
            out.violations.push(PlaybackError::ProtocolViolation {
                declared,
                capacity: self.capacity,
            });
        }

        if declared == 0 {
            self.finish_frame(out);
        } else {
            self.phase = DemuxPhase::Metadata {
                remaining: declared,
            };
        }
    }

    fn accumulate(&mut self, bytes: &[u8]) {
        let room = self.capacity.saturating_sub(self.buffer.len());
        self.buffer
            .extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    fn finish_frame(&mut self, out: &mut Demuxed<'_>) {
        let record = MetadataRecord::parse(&self.buffer);
        debug!(fields = record.fields().len(), "Metadata frame complete");
        self.buffer.clear();
        self.phase = DemuxPhase::Payload;
        out.records.push(record);
    }
}

// ============================================================================
// Metadata Records
// ============================================================================

/// Fields decoded from one metadata frame, in frame order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    fields: Vec<(String, String)>,
}

impl MetadataRecord {
    /// Parse frame text.
    ///
    /// Text ends at the first NUL. Entries are separated by `;`, names from
    /// values by the first `=`. One leading and one trailing character (the
    /// quotes) are stripped from each value. Entries without `=` are skipped.
    pub fn parse(raw: &[u8]) -> Self {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let text = String::from_utf8_lossy(&raw[..end]);

        let fields = text
            .split(';')
            .filter_map(|entry| entry.split_once('='))
            .map(|(name, value)| (name.to_string(), unquote(value).to_string()))
            .collect();

        Self { fields }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the first field called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields with a metadata sink counterpart, ready for
    /// [`MetadataSink::apply`](crate::metadata::MetadataSink::apply).
    pub fn sink_entries(&self) -> Vec<(MetaKey, MetaValue)> {
        self.fields
            .iter()
            .filter_map(|(name, value)| {
                sink_key(name).map(|key| (key, MetaValue::Text(value.clone())))
            })
            .collect()
    }
}

fn sink_key(name: &str) -> Option<MetaKey> {
    match name {
        "StreamTitle" => Some(MetaKey::SubTitle),
        _ => None,
    }
}

fn unquote(value: &str) -> &str {
    let mut chars = value.chars();
    match (chars.next(), chars.next_back()) {
        (Some(_), Some(_)) => chars.as_str(),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a stream with a frame after every `interval` payload bytes.
    /// Frames are taken from `texts` in turn; an empty text is a heartbeat.
    fn build_stream(interval: usize, payload: &[u8], texts: &[&str]) -> Vec<u8> {
        let mut stream = Vec::new();
        for (i, block) in payload.chunks(interval).enumerate() {
            stream.extend_from_slice(block);
            if block.len() == interval {
                let text = texts[i % texts.len()].as_bytes();
                let blocks = text.len().div_ceil(16);
                stream.push(blocks as u8);
                stream.extend_from_slice(text);
                stream.resize(stream.len() + blocks * 16 - text.len(), 0);
            }
        }
        stream
    }

    fn run(demuxer: &mut IcyDemuxer, chunks: &[&[u8]]) -> (Vec<u8>, Vec<MetadataRecord>) {
        let mut payload = Vec::new();
        let mut records = Vec::new();
        for chunk in chunks {
            let out = demuxer.process(chunk);
            for segment in out.payload {
                payload.extend_from_slice(segment);
            }
            records.extend(out.records);
        }
        (payload, records)
    }

    fn demuxer(interval: i64) -> IcyDemuxer {
        let mut demuxer = IcyDemuxer::default();
        demuxer.set_interval(interval);
        demuxer
    }

    #[test]
    fn test_single_frame_in_one_chunk() {
        let mut stream = b"AAAAAAAAAA".to_vec();
        stream.push(1);
        stream.extend_from_slice(b"StreamTitle='X';");
        stream.extend_from_slice(b"BBBBBBB");

        let (payload, records) = run(&mut demuxer(10), &[&stream]);
        assert_eq!(payload, b"AAAAAAAAAABBBBBBB");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("StreamTitle"), Some("X"));
        assert_eq!(
            records[0].sink_entries(),
            vec![(MetaKey::SubTitle, MetaValue::Text("X".into()))]
        );
    }

    #[test]
    fn test_disabled_interval_passes_everything() {
        let stream = [1u8, 2, 3, 0, 5];
        let mut demuxer = demuxer(0);
        let out = demuxer.process(&stream);
        assert_eq!(out.payload, vec![&stream[..]]);
        assert!(out.records.is_empty());

        demuxer.set_interval(-1);
        assert_eq!(demuxer.interval(), None);
    }

    #[test]
    fn test_every_single_split_matches_whole() {
        let payload: Vec<u8> = (0..70u8).collect();
        let stream = build_stream(16, &payload, &["StreamTitle='One';", "", "StreamTitle='Two';StreamUrl='u';"]);
        let (whole_payload, whole_records) = run(&mut demuxer(16), &[&stream]);
        assert_eq!(whole_payload, payload);
        assert_eq!(whole_records.len(), 4);

        for split in 0..=stream.len() {
            let (a, b) = stream.split_at(split);
            let (got_payload, got_records) = run(&mut demuxer(16), &[a, b]);
            assert_eq!(got_payload, whole_payload, "split at {split}");
            assert_eq!(got_records, whole_records, "split at {split}");
        }
    }

    #[test]
    fn test_every_double_split_matches_whole() {
        let payload: Vec<u8> = (0..30u8).collect();
        let stream = build_stream(8, &payload, &["StreamTitle='Ab';", ""]);
        let (whole_payload, whole_records) = run(&mut demuxer(8), &[&stream]);

        for first in 0..=stream.len() {
            for second in first..=stream.len() {
                let chunks = [&stream[..first], &stream[first..second], &stream[second..]];
                let (got_payload, got_records) = run(&mut demuxer(8), &chunks);
                assert_eq!(got_payload, whole_payload, "splits at {first}/{second}");
                assert_eq!(got_records, whole_records, "splits at {first}/{second}");
            }
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let payload: Vec<u8> = (0..200u8).collect();
        let stream = build_stream(32, &payload, &["StreamTitle='Artist - Song';"]);
        let chunks: Vec<&[u8]> = stream.chunks(1).collect();
        let (got_payload, records) = run(&mut demuxer(32), &chunks);
        assert_eq!(got_payload, payload);
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.get("StreamTitle") == Some("Artist - Song")));
    }

    #[test]
    fn test_chunk_ending_at_length_byte_is_pending() {
        let mut demuxer = demuxer(4);
        let out = demuxer.process(b"abcd");
        assert_eq!(out.payload_len(), 4);
        assert_eq!(demuxer.phase(), DemuxPhase::PendingLength);
        assert_eq!(demuxer.payload_counter(), 0);

        let out = demuxer.process(&[1]);
        assert_eq!(out.payload_len(), 0);
        assert_eq!(demuxer.phase(), DemuxPhase::Metadata { remaining: 16 });

        let out = demuxer.process(b"StreamTitle='Q';ef");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].get("StreamTitle"), Some("Q"));
        assert_eq!(out.payload, vec![&b"ef"[..]]);
        assert_eq!(demuxer.payload_counter(), 2);
    }

    #[test]
    fn test_heartbeat_frame_yields_empty_record() {
        let mut demuxer = demuxer(3);
        let out = demuxer.process(&[1, 2, 3, 0, 4, 5]);
        assert_eq!(out.payload_len(), 5);
        assert_eq!(out.records, vec![MetadataRecord::default()]);
        assert!(out.records[0].sink_entries().is_empty());
    }

    #[test]
    fn test_oversized_frame_is_clamped() {
        let mut demuxer = IcyDemuxer::new(8);
        demuxer.set_interval(2);

        let mut stream = vec![b'x', b'y', 2];
        stream.extend_from_slice(b"StreamTitle='Long title here';\0\0");
        stream.extend_from_slice(b"zz");

        let out = demuxer.process(&stream);
        assert_eq!(out.violations.len(), 1);
        assert!(matches!(
            out.violations[0],
            PlaybackError::ProtocolViolation {
                declared: 32,
                capacity: 8
            }
        ));
        // Payload after the frame is still aligned.
        let payload: Vec<u8> = out.payload.concat();
        assert_eq!(payload, b"xyzz");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].get("StreamTitle"), None);
    }

    #[test]
    fn test_parse_stops_at_nul_and_skips_bare_entries() {
        let record = MetadataRecord::parse(b"StreamTitle='A=B';junk;StreamUrl='';\0garbage=1");
        assert_eq!(
            record.fields(),
            &[
                ("StreamTitle".to_string(), "A=B".to_string()),
                ("StreamUrl".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_unquote_edges() {
        assert_eq!(unquote("'X'"), "X");
        assert_eq!(unquote("X"), "X");
        assert_eq!(unquote(""), "");
        assert_eq!(unquote("'é'"), "é");
    }

    #[test]
    fn test_set_interval_resets_cursor() {
        let mut demuxer = demuxer(4);
        demuxer.process(b"abcd\x01Stream");
        assert!(matches!(demuxer.phase(), DemuxPhase::Metadata { .. }));
        assert_eq!(demuxer.pending_text_len(), 6);

        demuxer.set_interval(4);
        assert_eq!(demuxer.phase(), DemuxPhase::Payload);
        assert_eq!(demuxer.pending_text_len(), 0);
    }
}
