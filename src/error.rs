//! Error types
//!
//! Fatal run errors abort the whole run with exit status 1.
//! Per-item and per-channel failures have their own types
//! and never escalate on their own.

use std::io;
use thiserror::Error;

/// Errors that terminate the run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to query terminal for screen size with error: {0}")]
    ScreenSize(#[source] io::Error),

    #[error(
        "Terminal does not support reporting screen sizes in pixels, use a terminal such as kitty, WezTerm, Konsole, etc. that does."
    )]
    NoPixelSize,

    #[error(
        "This terminal emulator does not support the graphics protocol, use a terminal emulator such as kitty that does support it"
    )]
    GraphicsUnsupported,

    #[error("Timed out waiting for a response from the terminal")]
    Timeout,

    #[error("Aborted by user")]
    Aborted,

    #[error("The --place option can only be used with a single image, not {0}")]
    PlaceWithMultipleItems(usize),

    #[error("No images specified")]
    NoInputs,

    #[error("Failed to write to the terminal: {0}")]
    Io(#[from] io::Error),
}

/// Shared memory failures
#[derive(Debug, Error)]
pub enum ShmError {
    /// POSIX shared memory is unavailable on this platform
    #[error("shared memory is not supported on this platform")]
    NotSupported,

    #[error("{op} failed for {name}: {source}")]
    Io {
        op: &'static str,
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Failure to prepare a single input
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("failed to read {0}: {1}")]
    Read(String, #[source] io::Error),

    #[error("{0}")]
    Decode(#[from] image::ImageError),

    #[error("image has zero width or height")]
    Empty,

    #[error("{0}")]
    Other(String),
}

/// Failure to transmit a prepared image
#[derive(Debug, Error)]
pub enum TransmitError {
    #[error("no supported transfer channel")]
    NoChannel,

    #[error("failed to create transfer artifact: {0}")]
    Artifact(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Invalid command line or config values
#[derive(Debug, Error, PartialEq)]
pub enum OptionsError {
    #[error("Invalid --place specification: {0}")]
    Place(String),

    #[error("Invalid value for --z-index with error: {0}")]
    ZIndex(String),

    #[error("Invalid value for --background: {0}")]
    Background(String),

    #[error("Invalid value for --mirror: {0}")]
    Mirror(String),

    #[error("Invalid value for --transfer-mode: {0}")]
    TransferMode(String),

    #[error("Invalid value for --detection-timeout: {0}")]
    Timeout(String),
}
