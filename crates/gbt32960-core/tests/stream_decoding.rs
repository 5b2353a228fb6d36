//! Integration tests for the streaming decoder.
//!
//! The central property: for a stream without ambiguous marker bytes, the
//! packets produced do not depend on how the stream is cut into chunks.

use gbt32960_core::{
    protocol::packet::command, AckFlag, DecoderConfig, EncryptMode, Packet, StreamDecoder, Vin,
};

fn packet(cmd: u8, data: &[u8]) -> Packet {
    Packet::new(
        cmd,
        AckFlag::NotAck,
        Vin::new("LGXCE4CB0N0000042").expect("valid VIN"),
        EncryptMode::None,
        data.to_vec(),
    )
    .expect("payload within limit")
}

/// Garbage, a good frame, a corrupted frame, another good frame, trailing noise.
fn mixed_stream() -> (Vec<u8>, Vec<Packet>) {
    let login = packet(command::VEHICLE_LOGIN, &[0x01, 0x02, 0x03, 0x04]);
    let corrupt = packet(command::REALTIME_REPORT, &[0x10; 20]);
    let heartbeat = packet(command::HEARTBEAT, &[]);

    let mut stream = vec![0x7E; 40];
    stream.extend_from_slice(&login.to_protocol_bytes().unwrap());
    let mut bad = corrupt.to_protocol_bytes().unwrap();
    bad[30] ^= 0xFF;
    stream.extend_from_slice(&bad);
    stream.extend_from_slice(&heartbeat.to_protocol_bytes().unwrap());
    stream.extend_from_slice(&[0x00, 0x01]);

    (stream, vec![login, heartbeat])
}

fn decode_in_chunks(stream: &[u8], chunk_size: usize) -> Vec<Packet> {
    let mut decoder = StreamDecoder::new();
    stream
        .chunks(chunk_size)
        .flat_map(|chunk| decoder.decode_stream(chunk))
        .collect()
}

#[test]
fn test_whole_stream_yields_only_valid_packets() {
    let (stream, expected) = mixed_stream();
    let mut decoder = StreamDecoder::new();

    let packets = decoder.decode_stream(&stream);

    assert_eq!(packets, expected);
    let stats = decoder.stats();
    assert_eq!(stats.packets_decoded, 2);
    assert_eq!(stats.checksum_failures, 1);
}

#[test]
fn test_every_two_way_split_yields_same_packets() {
    let (stream, expected) = mixed_stream();

    for split in 0..=stream.len() {
        // Arrange
        let mut decoder = StreamDecoder::new();

        // Act
        let mut packets = decoder.decode_stream(&stream[..split]);
        packets.extend(decoder.decode_stream(&stream[split..]));

        // Assert
        assert_eq!(packets, expected, "split at {split}");
    }
}

#[test]
fn test_fixed_chunk_sizes_yield_same_packets() {
    let (stream, expected) = mixed_stream();
    for chunk_size in [1, 2, 3, 7, 26, 27, 64, 4096] {
        assert_eq!(
            decode_in_chunks(&stream, chunk_size),
            expected,
            "chunk size {chunk_size}"
        );
    }
}

#[test]
fn test_garbage_between_frames_is_skipped() {
    let first = packet(command::PLATFORM_LOGIN, &[0xAB; 8]);
    let second = packet(command::PLATFORM_LOGOUT, &[0xCD; 2]);
    let mut stream = first.to_protocol_bytes().unwrap();
    stream.extend_from_slice(b"noise between frames");
    stream.extend_from_slice(&second.to_protocol_bytes().unwrap());

    let mut decoder = StreamDecoder::new();

    assert_eq!(decoder.decode_stream(&stream), vec![first, second]);
    assert_eq!(decoder.stats().bytes_discarded, 20);
}

#[test]
fn test_oversized_frame_with_full_body_is_skipped() {
    // Arrange: a 500-byte frame that only a lenient decoder accepts
    let lenient = DecoderConfig {
        max_data_length: 1024,
        ..DecoderConfig::default()
    };
    let big_payload = vec![0x42; 500];
    let mut big = Packet::new(
        command::REALTIME_REPORT,
        AckFlag::NotAck,
        Vin::default(),
        EncryptMode::None,
        vec![],
    )
    .unwrap();
    big.data_length = big_payload.len() as u16;
    big.data = big_payload;
    big.verify = big.calc_verify();
    let big_frame = big_frame_bytes(&big);
    let next = packet(command::HEARTBEAT, &[]);
    let mut stream = big_frame.clone();
    stream.extend_from_slice(&next.to_protocol_bytes().unwrap());

    // Act
    let strict_packets = StreamDecoder::new().decode_stream(&stream);
    let lenient_packets = StreamDecoder::with_config(lenient).decode_stream(&stream);

    // Assert
    assert_eq!(strict_packets, vec![next.clone()]);
    assert_eq!(lenient_packets, vec![big, next]);
}

/// Hand-assembles a frame for a payload larger than `encode_packet` allows.
fn big_frame_bytes(packet: &Packet) -> Vec<u8> {
    let mut bytes = vec![0x23, 0x23];
    let unit_len = 22 + packet.data.len();
    bytes.extend_from_slice(&(unit_len as u16).to_be_bytes());
    bytes.push(packet.command_flag);
    bytes.push(packet.ack_flag.into());
    bytes.extend_from_slice(packet.vin.as_bytes());
    bytes.push(packet.encrypt_mode.into());
    bytes.extend_from_slice(&packet.data_length.to_be_bytes());
    bytes.extend_from_slice(&packet.data);
    bytes.push(packet.verify);
    bytes
}

#[test]
fn test_declared_length_mismatch_drops_frame() {
    // Arrange: unit-length field says one byte more than the payload implies
    let good = packet(command::HEARTBEAT, &[]);
    let mut bad = packet(command::VEHICLE_LOGIN, &[0x01, 0x02]).to_protocol_bytes().unwrap();
    bad[3] += 1;
    let mut stream = bad;
    stream.extend_from_slice(&good.to_protocol_bytes().unwrap());
    let mut decoder = StreamDecoder::new();

    // Act
    let packets = decoder.decode_stream(&stream);

    // Assert
    assert_eq!(packets, vec![good]);
    assert_eq!(decoder.stats().length_mismatches, 1);
}

/// A four-byte-payload frame whose `data_length` field (bytes 24..26) is
/// rewritten to `declared`, followed by a good heartbeat.
fn tampered_payload_length_stream(declared: u8) -> (Vec<u8>, Packet) {
    let mut bad = packet(command::VEHICLE_LOGIN, &[0x01, 0x02, 0x03, 0x04])
        .to_protocol_bytes()
        .unwrap();
    assert_eq!(bad[25], 4);
    bad[25] = declared;
    let good = packet(command::HEARTBEAT, &[]);
    let mut stream = bad;
    stream.extend_from_slice(&good.to_protocol_bytes().unwrap());
    (stream, good)
}

#[test]
fn test_payload_length_field_smaller_than_payload_is_rejected() {
    // Arrange
    let (stream, good) = tampered_payload_length_stream(2);
    let mut decoder = StreamDecoder::new();

    // Act
    let packets = decoder.decode_stream(&stream);

    // Assert: the tampered frame is dropped and the next frame still decodes
    assert_eq!(packets, vec![good]);
    assert_eq!(decoder.stats().length_mismatches, 1);
    assert_eq!(decoder.stats().packets_decoded, 1);
}

#[test]
fn test_payload_length_field_larger_than_payload_waits_for_more_bytes() {
    // Arrange
    let (stream, _good) = tampered_payload_length_stream(100);
    let mut decoder = StreamDecoder::new();

    // Act
    let packets = decoder.decode_stream(&stream);

    // Assert: nothing is read and every byte stays buffered
    assert!(packets.is_empty());
    assert_eq!(decoder.buffered_len(), stream.len());
    assert_eq!(decoder.stats().length_mismatches, 0);
}
