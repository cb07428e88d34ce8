//! Side-effecting helpers: configuration, subprocess capture, the
//! autonomous command source, and transcript sinks.

pub mod config;
pub mod process;
pub mod source;
pub mod transcript;
