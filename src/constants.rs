//! Global constants for pixcat
//!
//! Consolidates timing, protocol and naming constants
//! to eliminate magic numbers throughout the codebase.

// ============================================================================
// Timing Constants
// ============================================================================

/// Default time to wait for the terminal to answer capability probes (seconds)
pub const DEFAULT_DETECTION_TIMEOUT_SECS: f64 = 10.0;

/// Event loop tick in milliseconds (signal polling granularity)
pub const LOOP_TICK_MS: u64 = 50;

/// Poll timeout of the tty reader thread in milliseconds
pub const READER_POLL_MS: i32 = 100;

// ============================================================================
// Graphics Protocol Constants
// ============================================================================

/// Maximum base64 bytes per APC chunk for direct transmission
pub const CHUNK_SIZE: usize = 4096;

/// Sentinel probe data (one RGB pixel)
pub const PROBE_DATA: [u8; 3] = [1, 2, 3];

/// Inline sentinel payload for the direct probe
pub const DIRECT_PROBE_PAYLOAD: &[u8] = b"123";

/// Z-index origin used by the "--" prefix (draw below text with background)
pub const FAR_BACKGROUND_Z_ORIGIN: i32 = -1_073_741_824;

/// Maximum APC buffer size for replies read from the terminal
pub const MAX_APC_BUFFER_SIZE: usize = 64 * 1024;

/// Primary Device Attributes query, used as a negotiation barrier
pub const IDENTITY_QUERY: &[u8] = b"\x1b[c";

// ============================================================================
// Artifact Naming
// ============================================================================

/// Temp file prefix (terminals only delete temp files whose name contains this)
pub const TEMP_FILE_PREFIX: &str = "tty-graphics-protocol-";

/// Shared memory segment name prefix
pub const SHM_PREFIX: &str = "/pixcat-";

/// Preferred RAM-backed directory for temp files
pub const RAM_DIR: &str = "/dev/shm";
