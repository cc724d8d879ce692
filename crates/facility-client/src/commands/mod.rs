//! Subcommand implementations.

pub mod bench;
pub mod config;
pub mod ops;
