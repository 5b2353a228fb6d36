//! The GB/T 32960.3 packet model.
//!
//! A [`Packet`] is the in-memory form of one protocol message.  Frames on the
//! wire follow this layout (all multi-byte integers are big-endian):
//!
//! ```text
//! [##:2][unit_len:2][cmd:1][ack:1][vin:17][encrypt:1][data_len:2][data:N][xor:1]
//! ```
//!
//! `unit_len` counts everything from `cmd` through the last payload byte, so it
//! always equals `22 + data_len`.  The trailing XOR byte covers the same range.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::{bcd_timestamp, Clock};
use crate::protocol::checksum::xor_checksum;
use crate::protocol::codec::{encode_packet, ProtocolError};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Two-byte start marker (`##`) opening every frame.
pub const START_MARKER: [u8; 2] = [0x23, 0x23];

/// Width of the VIN field in bytes.
pub const VIN_LENGTH: usize = 17;

/// Byte used to right-pad a VIN shorter than [`VIN_LENGTH`].
pub const VIN_PAD: u8 = b'0';

/// Offset of the data unit (the command flag) from the frame start.
pub const DATA_UNIT_OFFSET: usize = 4;

/// Size of the fixed part of the data unit: cmd + ack + VIN + encrypt + data_len.
pub const DATA_UNIT_FIXED_SIZE: usize = 1 + 1 + VIN_LENGTH + 1 + 2;

/// Bytes preceding the payload: marker + unit length + fixed data unit.
pub const HEADER_SIZE: usize = DATA_UNIT_OFFSET + DATA_UNIT_FIXED_SIZE;

/// Size of the trailing checksum.
pub const CHECKSUM_SIZE: usize = 1;

/// Shortest possible frame: a header with an empty payload plus the checksum.
pub const MIN_FRAME_LENGTH: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Largest payload a frame may carry.
pub const MAX_DATA_LENGTH: usize = 400;

/// Returns the full wire length of a frame carrying `data_length` payload bytes.
pub const fn frame_length(data_length: usize) -> usize {
    HEADER_SIZE + data_length + CHECKSUM_SIZE
}

/// Standard GB/T 32960.3 command identifiers carried in [`Packet::command_flag`].
///
/// The core treats the command flag as opaque; these names exist for callers
/// and log output.
pub mod command {
    pub const VEHICLE_LOGIN: u8 = 0x01;
    pub const REALTIME_REPORT: u8 = 0x02;
    pub const REISSUE_REPORT: u8 = 0x03;
    pub const VEHICLE_LOGOUT: u8 = 0x04;
    pub const PLATFORM_LOGIN: u8 = 0x05;
    pub const PLATFORM_LOGOUT: u8 = 0x06;
    pub const HEARTBEAT: u8 = 0x07;
    pub const TIME_CALIBRATION: u8 = 0x08;
}

// ── Ack flag ──────────────────────────────────────────────────────────────────

/// Response code carried in the ack byte.
///
/// Values outside the recognized set are legal and preserved as
/// [`AckFlag::Unknown`] so they survive a decode/encode cycle unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckFlag {
    Success,
    Fail,
    /// The packet is a command and still expects a response.
    NotAck,
    Unknown(u8),
}

impl From<u8> for AckFlag {
    fn from(value: u8) -> Self {
        match value {
            0x01 => AckFlag::Success,
            0x02 => AckFlag::Fail,
            0xFE => AckFlag::NotAck,
            other => AckFlag::Unknown(other),
        }
    }
}

impl From<AckFlag> for u8 {
    fn from(flag: AckFlag) -> Self {
        match flag {
            AckFlag::Success => 0x01,
            AckFlag::Fail => 0x02,
            AckFlag::NotAck => 0xFE,
            AckFlag::Unknown(raw) => raw,
        }
    }
}

// ── Encrypt mode ──────────────────────────────────────────────────────────────

/// Payload encryption mode byte.
///
/// Only [`EncryptMode::None`] is processed; the other modes are carried
/// through without any transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptMode {
    None,
    Rsa,
    Aes,
    Error,
    Invalid,
    Unknown(u8),
}

impl From<u8> for EncryptMode {
    fn from(value: u8) -> Self {
        match value {
            0x01 => EncryptMode::None,
            0x02 => EncryptMode::Rsa,
            0x03 => EncryptMode::Aes,
            0xFE => EncryptMode::Error,
            0xFF => EncryptMode::Invalid,
            other => EncryptMode::Unknown(other),
        }
    }
}

impl From<EncryptMode> for u8 {
    fn from(mode: EncryptMode) -> Self {
        match mode {
            EncryptMode::None => 0x01,
            EncryptMode::Rsa => 0x02,
            EncryptMode::Aes => 0x03,
            EncryptMode::Error => 0xFE,
            EncryptMode::Invalid => 0xFF,
            EncryptMode::Unknown(raw) => raw,
        }
    }
}

// ── VIN ───────────────────────────────────────────────────────────────────────

/// Fixed-width 17-byte vehicle identification number.
///
/// The raw bytes are stored as received, so a decoded VIN re-encodes to the
/// identical bytes even if it is not valid UTF-8.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vin([u8; VIN_LENGTH]);

impl Vin {
    /// Builds a VIN from a string, right-padding with `'0'` up to 17 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::VinTooLong`] if `vin` is longer than 17 bytes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use gbt32960_core::Vin;
    ///
    /// let vin = Vin::new("LSVAA21E7").unwrap();
    /// assert_eq!(vin.to_string(), "LSVAA21E700000000");
    /// ```
    pub fn new(vin: &str) -> Result<Self, ProtocolError> {
        let bytes = vin.as_bytes();
        if bytes.len() > VIN_LENGTH {
            return Err(ProtocolError::VinTooLong(bytes.len()));
        }
        let mut buf = [VIN_PAD; VIN_LENGTH];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Wraps 17 raw bytes without any validation.
    pub const fn from_bytes(bytes: [u8; VIN_LENGTH]) -> Self {
        Self(bytes)
    }

    /// The 17 raw bytes, exactly as they appear on the wire.
    pub fn as_bytes(&self) -> &[u8; VIN_LENGTH] {
        &self.0
    }

    /// Lossy text view with trailing NUL bytes removed.
    ///
    /// Encoding pads with `'0'`, not NUL, so this view of a short VIN still
    /// shows the padding.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0)
            .trim_end_matches('\0')
            .to_string()
    }
}

impl Default for Vin {
    fn default() -> Self {
        Self([VIN_PAD; VIN_LENGTH])
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vin({:?})", self.to_string_lossy())
    }
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// One GB/T 32960.3 protocol message.
///
/// `data_length` is stored separately from `data` because it is a wire field in
/// its own right: the checksum covers it, and encoding refuses a packet where
/// the two disagree.  Build packets with [`Packet::new`] or
/// [`Packet::make_response`] to get a consistent length and checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Message type identifier; see [`command`] for the standard values.
    pub command_flag: u8,
    /// Response code.
    pub ack_flag: AckFlag,
    /// Vehicle identification number.
    pub vin: Vin,
    /// Payload encryption mode.
    pub encrypt_mode: EncryptMode,
    /// Declared payload length; must equal `data.len()`.
    pub data_length: u16,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
    /// XOR checksum over the data unit.
    pub verify: u8,
}

impl Packet {
    /// Creates a packet with `data_length` and `verify` computed from the fields.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::OversizedPayload`] if `data` is longer than
    /// [`MAX_DATA_LENGTH`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use gbt32960_core::{AckFlag, EncryptMode, Packet, Vin};
    ///
    /// let vin = Vin::new("LSVAA21E7JN000001").unwrap();
    /// let packet = Packet::new(0x01, AckFlag::Success, vin, EncryptMode::None, vec![1, 2, 3]).unwrap();
    /// assert_eq!(packet.data_length, 3);
    /// assert!(packet.is_verified());
    /// ```
    pub fn new(
        command_flag: u8,
        ack_flag: AckFlag,
        vin: Vin,
        encrypt_mode: EncryptMode,
        data: Vec<u8>,
    ) -> Result<Self, ProtocolError> {
        if data.len() > MAX_DATA_LENGTH {
            return Err(ProtocolError::OversizedPayload {
                declared: data.len(),
                max: MAX_DATA_LENGTH,
            });
        }
        let mut packet = Self {
            command_flag,
            ack_flag,
            vin,
            encrypt_mode,
            data_length: data.len() as u16,
            data,
            verify: 0,
        };
        packet.verify = packet.calc_verify();
        Ok(packet)
    }

    /// Length of the data unit as written into the frame's length field.
    pub fn data_unit_length(&self) -> usize {
        DATA_UNIT_FIXED_SIZE + self.data_length as usize
    }

    /// Appends the data unit (cmd through payload) to `buf`.
    pub(crate) fn write_data_unit(&self, buf: &mut Vec<u8>) {
        buf.push(self.command_flag);
        buf.push(self.ack_flag.into());
        buf.extend_from_slice(self.vin.as_bytes());
        buf.push(self.encrypt_mode.into());
        buf.extend_from_slice(&self.data_length.to_be_bytes());
        buf.extend_from_slice(&self.data);
    }

    /// Recomputes the XOR checksum from the current field values.
    pub fn calc_verify(&self) -> u8 {
        let mut unit = Vec::with_capacity(DATA_UNIT_FIXED_SIZE + self.data.len());
        self.write_data_unit(&mut unit);
        xor_checksum(&unit)
    }

    /// Returns `true` when `verify` matches the fields.
    pub fn is_verified(&self) -> bool {
        self.verify == self.calc_verify()
    }

    /// Serializes the packet into a complete wire frame.
    ///
    /// # Errors
    ///
    /// See [`encode_packet`].
    pub fn to_protocol_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_packet(self)
    }

    /// Builds the acknowledgement for this packet.
    ///
    /// The response keeps the command flag and VIN, carries `ack_flag`, and
    /// replaces the payload with the 6-byte BCD timestamp read from `clock`.
    /// Encryption is reset to [`EncryptMode::None`] and the length and
    /// checksum are recomputed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use chrono::NaiveDate;
    /// use gbt32960_core::{AckFlag, EncryptMode, FixedClock, Packet, Vin};
    ///
    /// let command = Packet::new(0x07, AckFlag::NotAck, Vin::default(), EncryptMode::None, vec![]).unwrap();
    /// let at = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap().and_hms_opt(9, 26, 53).unwrap();
    /// let response = command.make_response(AckFlag::Success, &FixedClock(at));
    /// assert_eq!(response.data, vec![0x25, 0x03, 0x14, 0x09, 0x26, 0x53]);
    /// ```
    pub fn make_response(&self, ack_flag: AckFlag, clock: &dyn Clock) -> Self {
        let data = bcd_timestamp(&clock.now()).to_vec();
        let mut response = Self {
            command_flag: self.command_flag,
            ack_flag,
            vin: self.vin,
            encrypt_mode: EncryptMode::None,
            data_length: data.len() as u16,
            data,
            verify: 0,
        };
        response.verify = response.calc_verify();
        response
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commandFlag={:02x}, ackFlag={:02x}, VIN={}, encryptMode={:02x}, dataLength={}, data=[",
            self.command_flag,
            u8::from(self.ack_flag),
            self.vin,
            u8::from(self.encrypt_mode),
            self.data_length,
        )?;
        for (i, byte) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        write!(f, "], verify={:02x}", self.verify)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
