//! Frame codec for GB/T 32960.3 packets.
//!
//! Wire format:
//! ```text
//! [0x23 0x23][unit_len:2][cmd:1][ack:1][vin:17][encrypt:1][data_len:2][data:N][xor:1]
//! ```
//! Header size: 26 bytes.  All multi-byte integers are big-endian.  The XOR
//! checksum covers bytes `[4 .. 26 + N)`.

use thiserror::Error;

use crate::protocol::checksum::xor_checksum;
use crate::protocol::packet::{
    frame_length, AckFlag, EncryptMode, Packet, Vin, CHECKSUM_SIZE, DATA_UNIT_FIXED_SIZE,
    DATA_UNIT_OFFSET, HEADER_SIZE, MAX_DATA_LENGTH, MIN_FRAME_LENGTH, START_MARKER, VIN_LENGTH,
};

/// Errors and stream anomalies produced while encoding or decoding frames.
///
/// The streaming decoder never returns these; it reports them to its
/// [`crate::DecodeObserver`] and keeps going.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes are available than the frame needs.  Not a failure for a
    /// stream: more bytes may still arrive.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The slice handed to [`decode_frame`] does not start with `##`.
    #[error("frame does not start with the ## marker (found {found:02X?})")]
    BadStartMarker { found: [u8; 2] },

    /// No start marker exists anywhere in the buffered bytes; they were flushed.
    #[error("no start marker in buffered data; discarded {discarded} bytes")]
    NoStartMarker { discarded: usize },

    /// Bytes in front of a start marker were skipped.
    #[error("skipped {discarded} bytes of garbage before start marker")]
    GarbageSkipped { discarded: usize },

    /// The declared payload length exceeds the protocol maximum.
    #[error("payload length {declared} exceeds maximum {max}")]
    OversizedPayload { declared: usize, max: usize },

    /// The received checksum does not match the data unit.
    #[error("checksum mismatch: computed 0x{computed:02X}, received 0x{received:02X}")]
    ChecksumMismatch { computed: u8, received: u8 },

    /// Two length values that must agree do not.
    ///
    /// On encode: `data_length` versus `data.len()`.  On decode: the
    /// data-unit length field versus `22 + data_length`.
    #[error("length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// A VIN string longer than 17 bytes was supplied.
    #[error("VIN is {0} bytes long; at most 17 are allowed")]
    VinTooLong(usize),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Packet`] into a complete wire frame.
///
/// The stored `verify` byte is written as-is; it is not recomputed.
///
/// # Errors
///
/// Returns [`ProtocolError::LengthMismatch`] when `data_length` disagrees
/// with `data.len()`, and [`ProtocolError::OversizedPayload`] when the payload
/// exceeds [`MAX_DATA_LENGTH`].  Both are caller precondition violations.
///
/// # Examples
///
/// ```rust
/// use gbt32960_core::{decode_frame, encode_packet, AckFlag, EncryptMode, Packet, Vin};
///
/// let packet = Packet::new(0x07, AckFlag::NotAck, Vin::default(), EncryptMode::None, vec![]).unwrap();
/// let bytes = encode_packet(&packet).unwrap();
/// let (decoded, consumed) = decode_frame(&bytes).unwrap();
/// assert_eq!(decoded, packet);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let declared = packet.data_length as usize;
    if declared != packet.data.len() {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: packet.data.len(),
        });
    }
    if declared > MAX_DATA_LENGTH {
        return Err(ProtocolError::OversizedPayload {
            declared,
            max: MAX_DATA_LENGTH,
        });
    }

    let unit_len = packet.data_unit_length();
    let mut buf = Vec::with_capacity(frame_length(declared));

    // Header: marker (2) + data unit length (2)
    buf.extend_from_slice(&START_MARKER);
    buf.extend_from_slice(&(unit_len as u16).to_be_bytes());

    packet.write_data_unit(&mut buf);
    buf.push(packet.verify);
    Ok(buf)
}

/// Decodes one frame from the beginning of `bytes` with the standard
/// 400-byte payload limit.
///
/// Returns the packet and the number of bytes the frame occupied.
///
/// # Errors
///
/// See [`decode_frame_with_limit`].
pub fn decode_frame(bytes: &[u8]) -> Result<(Packet, usize), ProtocolError> {
    decode_frame_with_limit(bytes, MAX_DATA_LENGTH)
}

/// Decodes one frame from the beginning of `bytes`.
///
/// Checks are applied in wire order: start marker, payload limit, frame
/// completeness, length-field agreement, checksum.
///
/// # Errors
///
/// - [`ProtocolError::InsufficientData`] if the frame is not complete yet.
/// - [`ProtocolError::BadStartMarker`] if `bytes` does not begin with `##`.
/// - [`ProtocolError::OversizedPayload`] if `data_length > max_data_length`.
/// - [`ProtocolError::LengthMismatch`] if the data-unit length field is not
///   `22 + data_length`.
/// - [`ProtocolError::ChecksumMismatch`] if the trailing XOR byte is wrong.
pub fn decode_frame_with_limit(
    bytes: &[u8],
    max_data_length: usize,
) -> Result<(Packet, usize), ProtocolError> {
    if bytes.len() < MIN_FRAME_LENGTH {
        return Err(ProtocolError::InsufficientData {
            needed: MIN_FRAME_LENGTH,
            available: bytes.len(),
        });
    }

    if bytes[..2] != START_MARKER {
        return Err(ProtocolError::BadStartMarker {
            found: [bytes[0], bytes[1]],
        });
    }

    let data_length = declared_data_length(bytes);
    if data_length > max_data_length {
        return Err(ProtocolError::OversizedPayload {
            declared: data_length,
            max: max_data_length,
        });
    }

    let total = frame_length(data_length);
    if bytes.len() < total {
        return Err(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let unit_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    if unit_len != DATA_UNIT_FIXED_SIZE + data_length {
        return Err(ProtocolError::LengthMismatch {
            declared: unit_len,
            actual: DATA_UNIT_FIXED_SIZE + data_length,
        });
    }

    let received = bytes[total - CHECKSUM_SIZE];
    let computed = xor_checksum(&bytes[DATA_UNIT_OFFSET..total - CHECKSUM_SIZE]);
    if computed != received {
        return Err(ProtocolError::ChecksumMismatch { computed, received });
    }

    let mut vin = [0u8; VIN_LENGTH];
    vin.copy_from_slice(&bytes[6..6 + VIN_LENGTH]);

    let packet = Packet {
        command_flag: bytes[4],
        ack_flag: AckFlag::from(bytes[5]),
        vin: Vin::from_bytes(vin),
        encrypt_mode: EncryptMode::from(bytes[23]),
        data_length: data_length as u16,
        data: bytes[HEADER_SIZE..HEADER_SIZE + data_length].to_vec(),
        verify: received,
    };
    Ok((packet, total))
}

/// Reads the payload length field (bytes 24..26) of a frame header.
///
/// The caller guarantees `header.len() >= HEADER_SIZE`.
pub(crate) fn declared_data_length(header: &[u8]) -> usize {
    u16::from_be_bytes([header[HEADER_SIZE - 2], header[HEADER_SIZE - 1]]) as usize
}

// ── Tests ─────────────────────────────────────────────────────────────────────
