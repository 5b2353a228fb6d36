//! # gbt32960-core
//!
//! Protocol engine for the GB/T 32960.3 vehicle telematics wire protocol.
//!
//! This crate contains the packet model, the XOR checksum, the frame codec,
//! and the streaming decoder that reassembles frames out of an arbitrarily
//! chunked byte stream.  It has zero dependencies on sockets, threads, or
//! OS APIs; the transport lives in `gbt32960-client`.
//!
//! # Architecture overview (for beginners)
//!
//! GB/T 32960.3 is the Chinese national standard for remote monitoring of
//! electric vehicles.  An in-vehicle terminal keeps a TCP connection open to a
//! platform and the two sides exchange small framed messages over it.
//!
//! - **`protocol`** – How bytes travel over the network.  A [`Packet`] is
//!   serialized into a `##`-prefixed, length-framed, XOR-checksummed frame and
//!   decoded back by [`StreamDecoder`], which copes with partial reads,
//!   coalesced reads, and corrupt bytes in the stream.
//!
//! - **`clock`** – The time source used when building acknowledgement packets.
//!   It is injected rather than read from the wall clock so that response
//!   construction stays deterministic under test.
//!
//! The payload of a packet (speed, state of charge, alarms, ...) is treated as
//! an opaque byte sequence.  Encryption modes are carried as a field value
//! only; no cryptographic transform is applied.

pub mod clock;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `gbt32960_core::Packet` instead of `gbt32960_core::protocol::packet::Packet`.
pub use clock::{bcd_timestamp, Clock, FixedClock, SystemClock};
pub use protocol::codec::{decode_frame, encode_packet, ProtocolError};
pub use protocol::decoder::{DecoderConfig, DecoderStats, ResyncPolicy, StreamDecoder};
pub use protocol::observer::{DecodeObserver, TracingObserver};
pub use protocol::packet::{AckFlag, EncryptMode, Packet, Vin};
