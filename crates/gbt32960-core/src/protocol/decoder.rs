//! Streaming frame decoder.
//!
//! TCP is a *stream* protocol: one `read()` may return half a frame, several
//! frames, or frames mixed with line noise.  [`StreamDecoder`] accumulates
//! bytes with [`feed`](StreamDecoder::feed) and extracts every complete,
//! checksum-valid packet with [`drain`](StreamDecoder::drain).
//!
//! # Resynchronization
//!
//! | Condition                          | Action                                        |
//! |------------------------------------|-----------------------------------------------|
//! | bytes before a `##` marker         | drop them, report `GarbageSkipped`            |
//! | no `##` anywhere                   | flush the buffer, report `NoStartMarker`      |
//! | `data_length` above the limit      | drop one declared frame, report `OversizedPayload` |
//! | unit-length field disagrees        | drop the frame, report `LengthMismatch`       |
//! | checksum wrong                     | drop the frame, report `ChecksumMismatch`     |
//! | frame incomplete                   | keep everything, wait for more bytes          |
//!
//! Consumed bytes are tracked with a cursor and compacted once per `feed`, so
//! draining N frames does not shift the buffer N times.

use serde::{Deserialize, Serialize};

use crate::protocol::codec::{declared_data_length, decode_frame_with_limit, ProtocolError};
use crate::protocol::observer::{DecodeObserver, TracingObserver};
use crate::protocol::packet::{
    frame_length, Packet, MAX_DATA_LENGTH, MIN_FRAME_LENGTH, START_MARKER,
};

/// What to do with the buffer when it contains no start marker at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncPolicy {
    /// Flush everything except a trailing `0x23`, which may be the first half
    /// of a marker split across two reads.
    #[default]
    RetainPartialMarker,
    /// Flush the whole buffer.  A marker split across two reads is lost.
    FlushAll,
}

/// Tunables for [`StreamDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Largest accepted `data_length`; larger frames are skipped.
    pub max_data_length: usize,
    /// Behaviour when no start marker is found.
    pub resync: ResyncPolicy,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_data_length: MAX_DATA_LENGTH,
            resync: ResyncPolicy::default(),
        }
    }
}

/// Running counters kept by a [`StreamDecoder`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub packets_decoded: u64,
    pub checksum_failures: u64,
    pub length_mismatches: u64,
    pub oversized_frames: u64,
    /// Every byte dropped without producing a packet.
    pub bytes_discarded: u64,
}

/// Reassembles packets from an arbitrarily chunked byte stream.
///
/// The decoder is single-owner: `feed` and `drain` take `&mut self`, so the
/// type system rules out concurrent use without external synchronization.
///
/// # Examples
///
/// ```rust
/// use gbt32960_core::{AckFlag, EncryptMode, Packet, StreamDecoder, Vin};
///
/// let packet = Packet::new(0x07, AckFlag::NotAck, Vin::default(), EncryptMode::None, vec![]).unwrap();
/// let bytes = packet.to_protocol_bytes().unwrap();
///
/// let mut decoder = StreamDecoder::new();
/// decoder.feed(&bytes[..10]);
/// assert!(decoder.drain().is_empty());
/// decoder.feed(&bytes[10..]);
/// assert_eq!(decoder.drain(), vec![packet]);
/// ```
pub struct StreamDecoder<O: DecodeObserver = TracingObserver> {
    buffer: Vec<u8>,
    /// Index of the first unconsumed byte in `buffer`.
    cursor: usize,
    config: DecoderConfig,
    stats: DecoderStats,
    observer: O,
}

impl StreamDecoder<TracingObserver> {
    /// Creates a decoder with default settings that logs anomalies via `tracing`.
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    /// Creates a decoder with custom settings that logs anomalies via `tracing`.
    pub fn with_config(config: DecoderConfig) -> Self {
        Self::with_observer(config, TracingObserver)
    }
}

impl Default for StreamDecoder<TracingObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: DecodeObserver> StreamDecoder<O> {
    /// Creates a decoder that reports anomalies to `observer`.
    pub fn with_observer(config: DecoderConfig, observer: O) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            cursor: 0,
            config,
            stats: DecoderStats::default(),
            observer,
        }
    }

    /// Appends received bytes.  No parsing happens here.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
        self.buffer.extend_from_slice(bytes);
    }

    /// Extracts every complete, valid packet currently buffered.
    ///
    /// Invalid regions are discarded and reported to the observer; an
    /// incomplete trailing frame is kept for the next call.  Calling `drain`
    /// again without new bytes returns an empty vector.
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();

        while self.pending().len() >= MIN_FRAME_LENGTH {
            let Some(offset) = find_start_marker(self.pending()) else {
                self.flush_without_marker();
                break;
            };

            if offset > 0 {
                self.discard(offset);
                self.report(ProtocolError::GarbageSkipped { discarded: offset });
                continue;
            }

            let available = self.pending().len();
            let frame_len = frame_length(declared_data_length(self.pending()));

            match decode_frame_with_limit(self.pending(), self.config.max_data_length) {
                Ok((packet, consumed)) => {
                    self.cursor += consumed;
                    self.stats.packets_decoded += 1;
                    packets.push(packet);
                }
                Err(ProtocolError::InsufficientData { .. }) => break,
                Err(anomaly @ ProtocolError::OversizedPayload { .. }) => {
                    // The declared frame may extend past what has arrived;
                    // only the bytes actually present can be dropped.
                    self.stats.oversized_frames += 1;
                    self.discard(frame_len.min(available));
                    self.report(anomaly);
                }
                Err(anomaly @ ProtocolError::ChecksumMismatch { .. }) => {
                    self.stats.checksum_failures += 1;
                    self.discard(frame_len);
                    self.report(anomaly);
                }
                Err(anomaly @ ProtocolError::LengthMismatch { .. }) => {
                    self.stats.length_mismatches += 1;
                    self.discard(frame_len);
                    self.report(anomaly);
                }
                Err(anomaly) => {
                    // Unreachable with a marker at offset 0; step past it so
                    // the loop still makes progress.
                    self.discard(START_MARKER.len());
                    self.report(anomaly);
                }
            }
        }

        if self.cursor == self.buffer.len() {
            self.buffer.clear();
            self.cursor = 0;
        }
        packets
    }

    /// Feeds `chunk` and drains in one call.
    pub fn decode_stream(&mut self, chunk: &[u8]) -> Vec<Packet> {
        self.feed(chunk);
        self.drain()
    }

    /// Number of bytes received but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Drops all buffered bytes.  Counters are kept.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Consumes the decoder and returns its observer.
    pub fn into_observer(self) -> O {
        self.observer
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn pending(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }

    fn discard(&mut self, count: usize) {
        self.cursor += count;
        self.stats.bytes_discarded += count as u64;
    }

    fn report(&mut self, anomaly: ProtocolError) {
        self.observer.on_anomaly(&anomaly);
    }

    fn flush_without_marker(&mut self) {
        let pending = self.pending();
        let keep = match self.config.resync {
            ResyncPolicy::RetainPartialMarker if pending.last() == Some(&START_MARKER[0]) => 1,
            _ => 0,
        };
        let discarded = pending.len() - keep;
        self.discard(discarded);
        self.report(ProtocolError::NoStartMarker { discarded });
    }
}

/// Offset of the first `##` in `bytes`, if any.
fn find_start_marker(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(START_MARKER.len())
        .position(|window| window == START_MARKER)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::xor_checksum;
    use crate::protocol::observer::MockDecodeObserver;
    use crate::protocol::packet::{command, AckFlag, EncryptMode, Vin, DATA_UNIT_FIXED_SIZE};

    fn packet(cmd: u8, data: &[u8]) -> Packet {
        Packet::new(
            cmd,
            AckFlag::NotAck,
            Vin::new("LSVAA21E7JN000001").unwrap(),
            EncryptMode::None,
            data.to_vec(),
        )
        .unwrap()
    }

    fn frame(p: &Packet) -> Vec<u8> {
        p.to_protocol_bytes().unwrap()
    }

    /// Builds a correctly checksummed frame with an arbitrary payload size,
    /// bypassing the 400-byte limit enforced by `Packet::new`.
    fn raw_frame(data_len: usize) -> Vec<u8> {
        let mut bytes = START_MARKER.to_vec();
        bytes.extend_from_slice(&((DATA_UNIT_FIXED_SIZE + data_len) as u16).to_be_bytes());
        bytes.push(command::REALTIME_REPORT);
        bytes.push(0xFE);
        bytes.extend_from_slice(&[b'0'; 17]);
        bytes.push(0x01);
        bytes.extend_from_slice(&(data_len as u16).to_be_bytes());
        bytes.extend(std::iter::repeat(0x55).take(data_len));
        let checksum = xor_checksum(&bytes[4..]);
        bytes.push(checksum);
        bytes
    }

    fn quiet_observer() -> MockDecodeObserver {
        let mut observer = MockDecodeObserver::new();
        observer.expect_on_anomaly().never();
        observer
    }

    // ── Happy path ────────────────────────────────────────────────────────────

    #[test]
    fn test_single_frame_decodes() {
        let p = packet(command::VEHICLE_LOGIN, &[0x01, 0x02, 0x03]);
        let mut decoder = StreamDecoder::with_observer(DecoderConfig::default(), quiet_observer());

        let packets = decoder.decode_stream(&frame(&p));

        assert_eq!(packets, vec![p]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_two_frames_in_one_feed_decode_in_order() {
        // Arrange: simulates TCP coalescing two sends into one recv
        let first = packet(command::VEHICLE_LOGIN, &[0x01]);
        let second = packet(command::HEARTBEAT, &[]);
        let mut bytes = frame(&first);
        bytes.extend_from_slice(&frame(&second));
        let mut decoder = StreamDecoder::with_observer(DecoderConfig::default(), quiet_observer());

        // Act
        let packets = decoder.decode_stream(&bytes);

        // Assert
        assert_eq!(packets, vec![first, second]);
    }

    #[test]
    fn test_byte_by_byte_feed_yields_packet_only_when_complete() {
        let p = packet(command::REALTIME_REPORT, &[0xAA; 12]);
        let bytes = frame(&p);
        let mut decoder = StreamDecoder::with_observer(DecoderConfig::default(), quiet_observer());

        for (i, byte) in bytes.iter().enumerate() {
            let packets = decoder.decode_stream(std::slice::from_ref(byte));
            if i + 1 < bytes.len() {
                assert!(packets.is_empty(), "packet emitted early at byte {i}");
            } else {
                assert_eq!(packets, vec![p.clone()]);
            }
        }
    }

    #[test]
    fn test_feed_many_times_before_drain() {
        let first = packet(command::VEHICLE_LOGIN, &[0x10]);
        let second = packet(command::VEHICLE_LOGOUT, &[0x20, 0x21]);
        let mut decoder = StreamDecoder::new();

        decoder.feed(&frame(&first));
        decoder.feed(&frame(&second)[..5]);
        decoder.feed(&frame(&second)[5..]);

        assert_eq!(decoder.drain(), vec![first, second]);
    }

    #[test]
    fn test_drain_is_idempotent_without_new_bytes() {
        let p = packet(command::HEARTBEAT, &[]);
        let mut decoder = StreamDecoder::new();
        decoder.feed(&frame(&p)[..20]);

        assert!(decoder.drain().is_empty());
        assert!(decoder.drain().is_empty());
        assert_eq!(decoder.buffered_len(), 20);
    }

    #[test]
    fn test_partial_tail_survives_across_drains() {
        // Arrange: one complete frame followed by half of the next
        let first = packet(command::VEHICLE_LOGIN, &[0x01]);
        let second = packet(command::REALTIME_REPORT, &[0x02; 30]);
        let second_bytes = frame(&second);
        let mut bytes = frame(&first);
        bytes.extend_from_slice(&second_bytes[..29]);
        let mut decoder = StreamDecoder::new();

        // Act
        let early = decoder.decode_stream(&bytes);
        let late = decoder.decode_stream(&second_bytes[29..]);

        // Assert
        assert_eq!(early, vec![first]);
        assert_eq!(late, vec![second]);
    }

    // ── Garbage and resync ────────────────────────────────────────────────────

    #[test]
    fn test_garbage_before_marker_is_skipped_and_reported() {
        // Arrange
        let p = packet(command::VEHICLE_LOGIN, &[0x01, 0x02]);
        let mut bytes = vec![0x00, 0xFF, 0x10, 0x23, 0x41];
        bytes.extend_from_slice(&frame(&p));
        let mut observer = MockDecodeObserver::new();
        observer
            .expect_on_anomaly()
            .withf(|a| *a == ProtocolError::GarbageSkipped { discarded: 5 })
            .times(1)
            .return_const(());
        let mut decoder = StreamDecoder::with_observer(DecoderConfig::default(), observer);

        // Act
        let packets = decoder.decode_stream(&bytes);

        // Assert
        assert_eq!(packets, vec![p]);
        assert_eq!(decoder.stats().bytes_discarded, 5);
    }

    #[test]
    fn test_no_marker_flushes_whole_buffer() {
        let mut observer = MockDecodeObserver::new();
        observer
            .expect_on_anomaly()
            .withf(|a| *a == ProtocolError::NoStartMarker { discarded: 40 })
            .times(1)
            .return_const(());
        let mut decoder = StreamDecoder::with_observer(DecoderConfig::default(), observer);

        let packets = decoder.decode_stream(&[0x11; 40]);

        assert!(packets.is_empty());
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_short_garbage_is_kept_until_minimum_length() {
        let mut decoder = StreamDecoder::with_observer(DecoderConfig::default(), quiet_observer());
        assert!(decoder.decode_stream(&[0x11; 10]).is_empty());
        assert_eq!(decoder.buffered_len(), 10);
    }

    #[test]
    fn test_split_marker_survives_with_retain_policy() {
        // Arrange: garbage ending in the first marker byte, then the rest
        let p = packet(command::HEARTBEAT, &[]);
        let bytes = frame(&p);
        let mut first_chunk = vec![0x11; 30];
        first_chunk.push(bytes[0]);
        let mut decoder = StreamDecoder::new();

        // Act
        let early = decoder.decode_stream(&first_chunk);
        let late = decoder.decode_stream(&bytes[1..]);

        // Assert
        assert!(early.is_empty());
        assert_eq!(late, vec![p]);
    }

    #[test]
    fn test_split_marker_is_lost_with_flush_all_policy() {
        let p = packet(command::HEARTBEAT, &[]);
        let bytes = frame(&p);
        let mut first_chunk = vec![0x11; 30];
        first_chunk.push(bytes[0]);
        let config = DecoderConfig {
            resync: ResyncPolicy::FlushAll,
            ..DecoderConfig::default()
        };
        let mut decoder = StreamDecoder::with_config(config);

        decoder.decode_stream(&first_chunk);
        let late = decoder.decode_stream(&bytes[1..]);

        assert!(late.is_empty());
    }

    // ── Corrupt frames ────────────────────────────────────────────────────────

    #[test]
    fn test_checksum_failure_drops_frame_and_continues() {
        // Arrange
        let bad = packet(command::REALTIME_REPORT, &[0x01, 0x02, 0x03]);
        let good = packet(command::HEARTBEAT, &[]);
        let mut bytes = frame(&bad);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        bytes.extend_from_slice(&frame(&good));
        let mut observer = MockDecodeObserver::new();
        observer
            .expect_on_anomaly()
            .withf(|a| matches!(a, ProtocolError::ChecksumMismatch { .. }))
            .times(1)
            .return_const(());
        let mut decoder = StreamDecoder::with_observer(DecoderConfig::default(), observer);

        // Act
        let packets = decoder.decode_stream(&bytes);

        // Assert
        assert_eq!(packets, vec![good]);
        assert_eq!(decoder.stats().checksum_failures, 1);
        assert_eq!(decoder.stats().packets_decoded, 1);
    }

    #[test]
    fn test_oversized_frame_is_skipped_and_next_frame_decodes() {
        // Arrange: a fully transmitted 500-byte frame followed by a valid one
        let good = packet(command::VEHICLE_LOGIN, &[0x09]);
        let mut bytes = raw_frame(500);
        let oversized_len = bytes.len();
        bytes.extend_from_slice(&frame(&good));
        let mut observer = MockDecodeObserver::new();
        observer
            .expect_on_anomaly()
            .withf(|a| *a == ProtocolError::OversizedPayload { declared: 500, max: 400 })
            .times(1)
            .return_const(());
        let mut decoder = StreamDecoder::with_observer(DecoderConfig::default(), observer);

        // Act
        let packets = decoder.decode_stream(&bytes);

        // Assert
        assert_eq!(packets, vec![good]);
        assert_eq!(decoder.stats().oversized_frames, 1);
        assert_eq!(decoder.stats().bytes_discarded, oversized_len as u64);
    }

    #[test]
    fn test_oversized_header_without_body_discards_only_present_bytes() {
        let mut bytes = raw_frame(0);
        bytes[24..26].copy_from_slice(&500u16.to_be_bytes());
        let mut decoder = StreamDecoder::new();

        let packets = decoder.decode_stream(&bytes);

        assert!(packets.is_empty());
        assert_eq!(decoder.buffered_len(), 0);
        assert_eq!(decoder.stats().bytes_discarded, bytes.len() as u64);
    }

    #[test]
    fn test_custom_payload_limit_skips_large_frames() {
        let config = DecoderConfig {
            max_data_length: 8,
            ..DecoderConfig::default()
        };
        let mut decoder = StreamDecoder::with_config(config);
        let small = packet(command::HEARTBEAT, &[0x01; 8]);
        let mut bytes = frame(&packet(command::REALTIME_REPORT, &[0x01; 9]));
        bytes.extend_from_slice(&frame(&small));

        assert_eq!(decoder.decode_stream(&bytes), vec![small]);
    }

    #[test]
    fn test_unit_length_disagreement_drops_frame() {
        let good = packet(command::HEARTBEAT, &[]);
        let mut bytes = frame(&packet(command::REALTIME_REPORT, &[0x01]));
        bytes[3] = bytes[3].wrapping_add(1);
        bytes.extend_from_slice(&frame(&good));
        let mut observer = MockDecodeObserver::new();
        observer
            .expect_on_anomaly()
            .withf(|a| matches!(a, ProtocolError::LengthMismatch { .. }))
            .times(1)
            .return_const(());
        let mut decoder = StreamDecoder::with_observer(DecoderConfig::default(), observer);

        let packets = decoder.decode_stream(&bytes);

        assert_eq!(packets, vec![good]);
        assert_eq!(decoder.stats().length_mismatches, 1);
    }

    // ── Housekeeping ──────────────────────────────────────────────────────────

    #[test]
    fn test_clear_drops_buffered_bytes() {
        let mut decoder = StreamDecoder::new();
        decoder.feed(&[0x23, 0x23, 0x00]);
        decoder.clear();
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_into_observer_returns_observer() {
        let decoder = StreamDecoder::with_observer(DecoderConfig::default(), quiet_observer());
        let _observer: MockDecodeObserver = decoder.into_observer();
    }
}
