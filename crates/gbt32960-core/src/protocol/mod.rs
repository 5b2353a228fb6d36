//! Protocol module containing the packet model, checksum, codec, and stream decoder.

pub mod checksum;
pub mod codec;
pub mod decoder;
pub mod observer;
pub mod packet;

pub use checksum::xor_checksum;
pub use codec::{decode_frame, encode_packet, ProtocolError};
pub use decoder::StreamDecoder;
pub use packet::*;
