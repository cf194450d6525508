//! Logging setup shared by mim binaries.
mod logger;
pub use logger::*;
