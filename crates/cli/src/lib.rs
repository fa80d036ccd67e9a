//! Support code for the `mojifix` binary.

pub mod config;
pub mod prompt;
