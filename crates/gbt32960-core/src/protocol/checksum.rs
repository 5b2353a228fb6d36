//! XOR checksum shared by the encode and decode paths.
//!
//! # What is an XOR checksum? (for beginners)
//!
//! Every frame ends with a single byte computed by XOR-ing together every byte
//! of the data unit (command flag through the last payload byte).  The
//! receiver repeats the computation and drops the frame if the result differs
//! from the byte it received.
//!
//! XOR is order-independent and self-inverse, so folding the serialized data
//! unit in one pass gives exactly the same value as folding the individual
//! fields one after another.  That is why a single function serves both the
//! field-wise check on a [`crate::Packet`] and the raw-bytes check in the
//! decoder.

/// Folds `bytes` with XOR into a single checksum byte.
///
/// An empty slice yields `0x00`.
///
/// # Examples
///
/// ```rust
/// use gbt32960_core::protocol::xor_checksum;
///
/// assert_eq!(xor_checksum(&[0x01, 0x02, 0x03]), 0x00);
/// assert_eq!(xor_checksum(&[0xF0, 0x0F]), 0xFF);
/// ```
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, byte| acc ^ byte)
}
