//! Subcommand implementations

pub mod config;
pub mod engine;
pub mod keys;
pub mod worker;
