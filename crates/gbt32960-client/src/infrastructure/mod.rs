//! Infrastructure layer for the terminal.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `gbt32960_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`network`** – The session adapter: owns the platform connection, runs the
//!   reader task with its stream decoder, and writes outbound frames.
//!
//! - **`storage`** – TOML configuration file loading and saving.

pub mod network;
pub mod storage;
