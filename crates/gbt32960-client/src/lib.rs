//! gbt32960-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does gbt32960-client do? (for beginners)
//!
//! The *terminal* is the in-vehicle side of a GB/T 32960.3 link.  It keeps a
//! TCP connection open to the monitoring *platform* and exchanges framed
//! packets with it.
//!
//! The terminal application:
//!
//! 1. Loads its configuration (platform address, VIN, decoder settings).
//! 2. Connects to the platform over TCP.
//! 3. Feeds every received byte into a `StreamDecoder`, which reassembles
//!    complete packets no matter how TCP splits or merges them.
//! 4. Logs each packet and, for commands that expect an answer, replies with
//!    a `Success` acknowledgement stamped with the local time.
//! 5. Exits when the platform closes the connection or the user presses
//!    Ctrl-C.  There is no automatic reconnect.

/// Application layer: use cases for the terminal.
pub mod application;

/// Infrastructure layer: network session and configuration storage.
pub mod infrastructure;
