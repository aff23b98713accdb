//! Image pipeline
//!
//! Turns input items into payloads ready for transmission.
//!
//! ```text
//! CLI args ─→ inputs::expand ─→ [InputItem] ─→ WorkerPool ─→ [ImageResult]
//!                                               (Preparer)
//! ```

pub mod inputs;
pub mod prepare;
pub mod workers;

use std::fmt;
use std::path::PathBuf;

use crate::error::PrepareError;

/// Cell rectangle an image is placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
}

/// Where an input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// File on disk
    Path(PathBuf),
    /// Bytes read up front (piped stdin)
    Bytes { name: String, data: Vec<u8> },
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Path(path) => write!(f, "{}", path.display()),
            InputSource::Bytes { name, .. } => f.write_str(name),
        }
    }
}

/// One image to display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputItem {
    pub source: InputSource,
    /// Explicit placement (only allowed for single-item runs)
    pub placement: Option<Placement>,
}

impl InputItem {
    pub fn new(source: InputSource) -> Self {
        Self {
            source,
            placement: None,
        }
    }
}

/// Pixel layout of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Ready-to-send pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
    pub placement: Option<Placement>,
}

/// Outcome of preparing one input
#[derive(Debug)]
pub struct ImageResult {
    /// Display name of the source
    pub source: String,
    pub outcome: Result<ImagePayload, PrepareError>,
}

/// Converts an input into a payload. Called from worker threads.
pub trait Preparer: Send + Sync {
    fn prepare(&self, item: &InputItem) -> Result<ImagePayload, PrepareError>;
}
