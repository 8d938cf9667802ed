//! Error types for the rewind engine.
//!
//! Reads that find nothing return `Option::None` or an empty `Vec` rather
//! than an error; the variants here cover write failures and environment
//! problems that survive the fallback chain.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewindError {
    #[error("No usable database location, last candidate: {0}")]
    NoUsableLocation(PathBuf),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
