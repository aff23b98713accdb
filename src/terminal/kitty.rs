//! Kitty graphics protocol (client side)
//!
//! Encodes graphics commands sent to the terminal and parses
//! the replies it sends back.
//!
//! https://sw.kovidgoyal.net/kitty/graphics-protocol/

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::trace;
use std::fmt::Write as _;

/// Kitty command action
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum KittyAction {
    /// Transmit and display (a=T, default)
    #[default]
    TransmitAndDisplay,
    /// Delete (a=d)
    Delete,
    /// Query (a=q)
    Query,
}

impl KittyAction {
    fn key(self) -> char {
        match self {
            KittyAction::TransmitAndDisplay => 'T',
            KittyAction::Delete => 'd',
            KittyAction::Query => 'q',
        }
    }
}

/// Image format
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum KittyFormat {
    /// RGB (f=24)
    Rgb,
    /// RGBA (f=32)
    #[default]
    Rgba,
}

impl KittyFormat {
    fn code(self) -> u32 {
        match self {
            KittyFormat::Rgb => 24,
            KittyFormat::Rgba => 32,
        }
    }
}

/// Transmission medium
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum KittyTransmission {
    /// Direct (t=d)
    #[default]
    Direct,
    /// Shared memory (t=s)
    SharedMemory,
    /// Temporary file (t=t), deleted by the terminal after reading
    TempFile,
}

impl KittyTransmission {
    fn key(self) -> char {
        match self {
            KittyTransmission::Direct => 'd',
            KittyTransmission::SharedMemory => 's',
            KittyTransmission::TempFile => 't',
        }
    }
}

/// Kitty command parameters
#[derive(Debug, Clone, Default)]
pub struct GraphicsCommand {
    /// Action (a)
    pub action: KittyAction,
    /// Format (f)
    pub format: KittyFormat,
    /// Transmission medium (t)
    pub transmission: KittyTransmission,
    /// Image ID (i), 0 = not sent
    pub id: u32,
    /// Data width in pixels (s)
    pub width: u32,
    /// Data height in pixels (v)
    pub height: u32,
    /// Size of the data to read from a file or shared memory (S)
    pub data_size: Option<usize>,
    /// Compression (o): z=zlib
    pub compression: Option<char>,
    /// Quiet mode (q): 1=no response on success, 2=no response
    pub quiet: u8,
    /// Cell width of the placement (c)
    pub cols: u32,
    /// Cell height of the placement (r)
    pub rows: u32,
    /// Z index (z)
    pub z_index: i32,
    /// Cursor movement policy (C): 1 = do not move the cursor
    pub no_cursor_move: bool,
    /// Delete target (d): A=all visible placements and their data
    pub delete_target: Option<char>,
}

impl GraphicsCommand {
    /// Capability probe for one transmission medium (one RGB pixel)
    pub fn query(transmission: KittyTransmission, id: u32, data_size: usize) -> Self {
        Self {
            action: KittyAction::Query,
            format: KittyFormat::Rgb,
            transmission,
            id,
            width: 1,
            height: 1,
            data_size: Some(data_size),
            ..Self::default()
        }
    }

    /// Delete all visible placements and free their image data
    pub fn clear_visible() -> Self {
        Self {
            action: KittyAction::Delete,
            delete_target: Some('A'),
            ..Self::default()
        }
    }

    /// Serialize the key=value list
    fn keys(&self) -> String {
        let mut s = String::with_capacity(64);
        let _ = write!(s, "a={}", self.action.key());
        if let Some(target) = self.delete_target {
            let _ = write!(s, ",d={}", target);
        }
        if self.action == KittyAction::Delete {
            return s;
        }
        let _ = write!(
            s,
            ",f={},t={}",
            self.format.code(),
            self.transmission.key()
        );
        if self.id != 0 {
            let _ = write!(s, ",i={}", self.id);
        }
        if self.width != 0 {
            let _ = write!(s, ",s={}", self.width);
        }
        if self.height != 0 {
            let _ = write!(s, ",v={}", self.height);
        }
        if let Some(size) = self.data_size {
            let _ = write!(s, ",S={}", size);
        }
        if let Some(c) = self.compression {
            let _ = write!(s, ",o={}", c);
        }
        if self.quiet != 0 {
            let _ = write!(s, ",q={}", self.quiet);
        }
        if self.cols != 0 {
            let _ = write!(s, ",c={}", self.cols);
        }
        if self.rows != 0 {
            let _ = write!(s, ",r={}", self.rows);
        }
        if self.z_index != 0 {
            let _ = write!(s, ",z={}", self.z_index);
        }
        if self.no_cursor_move {
            s.push_str(",C=1");
        }
        s
    }

    /// Encode as a single APC sequence with a base64 payload
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() * 4 / 3 + 80);
        out.extend_from_slice(b"\x1b_G");
        out.extend_from_slice(self.keys().as_bytes());
        if !payload.is_empty() {
            out.push(b';');
            out.extend_from_slice(BASE64.encode(payload).as_bytes());
        }
        out.extend_from_slice(b"\x1b\\");
        out
    }

    /// Encode as a chain of APC sequences, `chunk_size` base64 bytes each
    pub fn encode_chunked(&self, payload: &[u8], chunk_size: usize) -> Vec<u8> {
        let encoded = BASE64.encode(payload);
        if encoded.len() <= chunk_size {
            return self.encode(payload);
        }

        let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(chunk_size).collect();
        let last = chunks.len() - 1;
        let mut out = Vec::with_capacity(encoded.len() + chunks.len() * 16 + 80);
        for (i, chunk) in chunks.iter().enumerate() {
            let more = if i == last { 0 } else { 1 };
            out.extend_from_slice(b"\x1b_G");
            if i == 0 {
                out.extend_from_slice(self.keys().as_bytes());
                out.extend_from_slice(format!(",m={}", more).as_bytes());
            } else {
                out.extend_from_slice(format!("m={}", more).as_bytes());
            }
            out.push(b';');
            out.extend_from_slice(chunk);
            out.extend_from_slice(b"\x1b\\");
        }
        trace!("Kitty: encoded {} chunks", chunks.len());
        out
    }
}

/// Reply sent by the terminal: ESC _ G i=<id>[,...];<message> ESC \
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsReply {
    /// Image ID the reply refers to (0 if absent)
    pub image_id: u32,
    /// Status message ("OK" or an error such as "ENOENT:...")
    pub message: String,
}

impl GraphicsReply {
    /// Parse APC content after the leading 'G'
    pub fn parse(data: &[u8]) -> Option<Self> {
        let data_str = std::str::from_utf8(data).ok()?;

        // Separate parameters and message by ';'
        let (params_str, message) = match data_str.find(';') {
            Some(pos) => (&data_str[..pos], &data_str[pos + 1..]),
            None => (data_str, ""),
        };

        let mut image_id = 0;
        for part in params_str.split(',') {
            if let Some((key, value)) = part.split_once('=') {
                if key == "i" {
                    image_id = value.parse().ok()?;
                }
            }
        }

        Some(Self {
            image_id,
            message: message.to_string(),
        })
    }

    /// Success check (exact match, no trimming or case folding)
    pub fn is_ok(&self) -> bool {
        self.message == "OK"
    }
}
