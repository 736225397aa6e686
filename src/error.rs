//! # Error Types
//!
//! This module defines the error type for the fallible edges of the engine.
//!
//! The per-frame path (`Stage::frame`, `PhysicsNode::step`, the scheduler and
//! the chain coordinator) never returns an error: degenerate numbers are
//! replaced with safe defaults and broken collaborators are logged and skipped.
//! Errors only surface where outside data enters the engine.
//!
//! ## Error Types
//! - `ConfigError` - Invalid YAML configuration or an out-of-range key
//! - `SnapshotError` - A node snapshot that cannot be decoded
//! - `UnknownNode` - A command addressed to a node id that does not exist
//! - `DuplicateNode` - Adding a node under an id already in use
//! - `ChainError` - A link that would close a loop or join a node to itself
//! - `Io` - Reading or writing configuration and snapshot files
//!
//! ## Usage
//! ```rust
//! use bouncer::{ToyConfig, BouncerError};
//!
//! match ToyConfig::from_yaml("bpm: 900") {
//!     Ok(config) => println!("bpm = {}", config.bpm),
//!     Err(BouncerError::ConfigError(message)) => eprintln!("bad config: {}", message),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BouncerError {
    /// Invalid configuration.
    ///
    /// Occurs when the YAML cannot be parsed or a key is outside its allowed range.
    ///
    /// # Example
    /// ```
    /// # use bouncer::BouncerError;
    /// let err = BouncerError::ConfigError("bpm must be between 30 and 300".to_string());
    /// assert_eq!(err.to_string(), "Invalid config: bpm must be between 30 and 300");
    /// ```
    #[error("Invalid config: {0}")]
    ConfigError(String),

    /// Snapshot decoding error.
    ///
    /// # Example
    /// ```
    /// # use bouncer::BouncerError;
    /// let err = BouncerError::SnapshotError("missing field `handle`".to_string());
    /// assert_eq!(err.to_string(), "Invalid snapshot: missing field `handle`");
    /// ```
    #[error("Invalid snapshot: {0}")]
    SnapshotError(String),

    /// A node id that the stage does not know about.
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    /// Rejected chain link.
    ///
    /// # Example
    /// ```
    /// # use bouncer::BouncerError;
    /// let err = BouncerError::ChainError("a is already in the chain of c".to_string());
    /// assert_eq!(err.to_string(), "Invalid chain link: a is already in the chain of c");
    /// ```
    #[error("Invalid chain link: {0}")]
    ChainError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
