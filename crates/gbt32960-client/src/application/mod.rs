//! Application layer use cases for the terminal.
//!
//! - **`respond`** – Answers platform commands that are waiting for an
//!   acknowledgement.  The packet sender and the clock are injected at
//!   construction time, so the use case has no direct dependency on sockets or
//!   the wall clock.

pub mod respond;
