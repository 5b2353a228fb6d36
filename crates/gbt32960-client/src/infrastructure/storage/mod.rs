//! Persistent storage for the terminal.

pub mod config;
