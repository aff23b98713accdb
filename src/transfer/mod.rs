//! Transfer channels and their verdicts
//!
//! A channel is one way of getting pixel data to the terminal.
//! Verdicts start out `Unknown` and are settled exactly once per run.

pub mod dispatch;
pub mod shm;
pub mod temp;

use log::{debug, warn};
use std::fmt;

use crate::terminal::kitty::KittyTransmission;

/// Transfer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferChannel {
    /// Payload inline in the escape sequence
    Direct,
    /// Payload in a temp file the terminal reads and deletes
    TempFile,
    /// Payload in a POSIX shared memory segment
    SharedMemory,
}

impl TransferChannel {
    /// Dispatch preference, best first
    pub const PREFERENCE: [TransferChannel; 3] = [
        TransferChannel::SharedMemory,
        TransferChannel::TempFile,
        TransferChannel::Direct,
    ];

    /// Protocol transmission medium for this channel
    pub fn transmission(self) -> KittyTransmission {
        match self {
            TransferChannel::Direct => KittyTransmission::Direct,
            TransferChannel::TempFile => KittyTransmission::TempFile,
            TransferChannel::SharedMemory => KittyTransmission::SharedMemory,
        }
    }

    /// Name printed by detect-only runs
    pub fn mode_name(self) -> &'static str {
        match self {
            TransferChannel::Direct => "stream",
            TransferChannel::TempFile => "file",
            TransferChannel::SharedMemory => "memory",
        }
    }
}

impl fmt::Display for TransferChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode_name())
    }
}

/// Resolved status of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferVerdict {
    #[default]
    Unknown,
    Unsupported,
    Supported,
}

/// Per-channel verdicts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdicts {
    direct: TransferVerdict,
    temp_file: TransferVerdict,
    shared_memory: TransferVerdict,
}

impl Verdicts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verdicts for a forced transfer mode: only `channel` is usable
    pub fn forced(channel: TransferChannel) -> Self {
        let mut verdicts = Self::new();
        for c in TransferChannel::PREFERENCE {
            let v = if c == channel {
                TransferVerdict::Supported
            } else {
                TransferVerdict::Unsupported
            };
            verdicts.settle(c, v);
        }
        verdicts
    }

    pub fn get(&self, channel: TransferChannel) -> TransferVerdict {
        match channel {
            TransferChannel::Direct => self.direct,
            TransferChannel::TempFile => self.temp_file,
            TransferChannel::SharedMemory => self.shared_memory,
        }
    }

    pub fn is_supported(&self, channel: TransferChannel) -> bool {
        self.get(channel) == TransferVerdict::Supported
    }

    /// Settle a channel. Returns false (and changes nothing) if the
    /// channel was already settled or `verdict` is `Unknown`.
    pub fn settle(&mut self, channel: TransferChannel, verdict: TransferVerdict) -> bool {
        if verdict == TransferVerdict::Unknown {
            return false;
        }
        let slot = match channel {
            TransferChannel::Direct => &mut self.direct,
            TransferChannel::TempFile => &mut self.temp_file,
            TransferChannel::SharedMemory => &mut self.shared_memory,
        };
        if *slot != TransferVerdict::Unknown {
            warn!(
                "Ignoring second verdict {:?} for {} (already {:?})",
                verdict, channel, *slot
            );
            return false;
        }
        debug!("Transfer channel {}: {:?}", channel, verdict);
        *slot = verdict;
        true
    }

    /// Supported channels in preference order
    pub fn supported(&self) -> impl Iterator<Item = TransferChannel> + '_ {
        TransferChannel::PREFERENCE
            .into_iter()
            .filter(move |c| self.is_supported(*c))
    }

    /// Best supported channel
    pub fn best(&self) -> Option<TransferChannel> {
        self.supported().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_once() {
        let mut v = Verdicts::new();
        assert_eq!(v.get(TransferChannel::TempFile), TransferVerdict::Unknown);
        assert!(v.settle(TransferChannel::TempFile, TransferVerdict::Supported));
        assert!(!v.settle(TransferChannel::TempFile, TransferVerdict::Unsupported));
        assert_eq!(v.get(TransferChannel::TempFile), TransferVerdict::Supported);
        assert!(!v.settle(TransferChannel::Direct, TransferVerdict::Unknown));
    }

    #[test]
    fn test_preference_order() {
        let mut v = Verdicts::new();
        assert_eq!(v.best(), None);
        v.settle(TransferChannel::Direct, TransferVerdict::Supported);
        assert_eq!(v.best(), Some(TransferChannel::Direct));
        v.settle(TransferChannel::TempFile, TransferVerdict::Supported);
        assert_eq!(v.best(), Some(TransferChannel::TempFile));
        v.settle(TransferChannel::SharedMemory, TransferVerdict::Supported);
        assert_eq!(v.best(), Some(TransferChannel::SharedMemory));
        assert_eq!(v.supported().count(), 3);
    }

    #[test]
    fn test_forced() {
        let v = Verdicts::forced(TransferChannel::TempFile);
        assert_eq!(v.best(), Some(TransferChannel::TempFile));
        assert!(!v.is_supported(TransferChannel::Direct));
        assert!(!v.is_supported(TransferChannel::SharedMemory));
    }
}
