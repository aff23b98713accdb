//! Terminal side of the client
//!
//! - `kitty`: graphics command encoding and reply parsing
//! - `parser`: bytes from the tty -> screen events
//! - `tty`: the controlling terminal (raw mode, size, reader thread)

pub mod kitty;
pub mod parser;
pub mod tty;

use std::io;

pub use parser::{InputParser, Key, ScreenEvent};
pub use tty::Tty;

/// Terminal dimensions as reported by TIOCGWINSZ
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenSize {
    pub cols: u16,
    pub rows: u16,
    pub width_px: u16,
    pub height_px: u16,
}

impl ScreenSize {
    /// Pixel size is required to lay out images
    pub fn has_pixels(&self) -> bool {
        self.width_px != 0 && self.height_px != 0
    }
}

/// Everything the controller needs from the terminal
pub trait TerminalPort {
    /// Query the current screen size
    fn screen_size(&mut self) -> io::Result<ScreenSize>;

    /// Queue bytes for the terminal
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush queued bytes
    fn flush(&mut self) -> io::Result<()>;

    /// Emit a user facing diagnostic message
    fn report(&mut self, message: &str);
}

/// Format a diagnostic for the live display.
///
/// Returns to column 0 and clears the line first so progress output
/// on the current line is overwritten, then writes each line.
pub fn format_inline_report(message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 16);
    out.extend_from_slice(b"\r\x1b[K");
    for line in message.lines() {
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_report() {
        assert_eq!(format_inline_report("memory"), b"\r\x1b[Kmemory\r\n".to_vec());
        assert_eq!(
            format_inline_report("a\nb"),
            b"\r\x1b[Ka\r\nb\r\n".to_vec()
        );
    }

    #[test]
    fn test_has_pixels() {
        let mut sz = ScreenSize {
            cols: 80,
            rows: 24,
            width_px: 800,
            height_px: 0,
        };
        assert!(!sz.has_pixels());
        sz.height_px = 480;
        assert!(sz.has_pixels());
    }
}
