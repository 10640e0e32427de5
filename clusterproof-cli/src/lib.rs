//! clusterproof CLI library.
//!
//! Argument parsing, command handlers and output rendering, exposed so the
//! integration tests can drive them without spawning the binary.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
