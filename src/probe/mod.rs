//! Capability negotiation
//!
//! One graphics query is sent per transfer channel, each carrying the
//! sentinel bytes through that channel, followed by a DA1 identity query.
//! The terminal answers in order, so the identity reply means every probe
//! reply that is coming has arrived.
//!
//! ```text
//! begin ─→ a=q,t=d ─→ a=q,t=t ─→ a=q,t=s ─→ ESC [ c
//!            │          │          │          │
//!         on_reply   on_reply   on_reply   on_identity_reply ─→ settled
//! ```

pub mod artifacts;

use log::{debug, info, trace};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::constants::{DIRECT_PROBE_PAYLOAD, IDENTITY_QUERY, PROBE_DATA};
use crate::error::{RunError, ShmError};
use crate::terminal::kitty::{GraphicsCommand, GraphicsReply};
use crate::terminal::{ScreenSize, TerminalPort};
use crate::transfer::{TransferChannel, TransferVerdict, Verdicts};
use artifacts::ArtifactStore;

/// Image id allocator shared by probes and real transmissions
#[derive(Debug)]
pub struct IdAllocator {
    next: u32,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id, never 0
    pub fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        id
    }
}

/// What a correlation id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyTarget {
    Probe(TransferChannel),
}

/// Negotiation state for one run
#[derive(Debug)]
pub struct Negotiation {
    in_flight: bool,
    verdicts: Verdicts,
    pending: HashMap<u32, ReplyTarget>,
    screen: ScreenSize,
    deadline: Option<Instant>,
}

impl Negotiation {
    /// Settled state for a forced transfer mode, nothing is sent
    pub fn forced(channel: TransferChannel, screen: ScreenSize) -> Self {
        Self {
            in_flight: false,
            verdicts: Verdicts::forced(channel),
            pending: HashMap::new(),
            screen,
            deadline: None,
        }
    }

    /// Send the probes and the identity query, arming the deadline
    pub fn begin<P: TerminalPort + ?Sized>(
        port: &mut P,
        store: &mut ArtifactStore,
        ids: &mut IdAllocator,
        screen: ScreenSize,
        timeout: Duration,
        now: Instant,
    ) -> Result<Self, RunError> {
        if !screen.has_pixels() {
            return Err(RunError::NoPixelSize);
        }

        let mut neg = Self {
            in_flight: true,
            verdicts: Verdicts::new(),
            pending: HashMap::new(),
            screen,
            deadline: None,
        };

        // Direct: sentinel inline
        let id = ids.next_id();
        neg.send_probe(port, TransferChannel::Direct, id, DIRECT_PROBE_PAYLOAD)?;

        // Temp file: payload is the path
        match store.create_temp_file(&PROBE_DATA) {
            Ok(path) => {
                let path = path.to_string_lossy().into_owned();
                let id = ids.next_id();
                neg.send_probe(port, TransferChannel::TempFile, id, path.as_bytes())?;
            }
            Err(e) => {
                neg.verdicts
                    .settle(TransferChannel::TempFile, TransferVerdict::Unsupported);
                port.report(&format!(
                    "Failed to create temporary file for data transfer, file based transfer is disabled. Error: {}",
                    e
                ));
            }
        }

        // Shared memory: payload is the segment name
        match store.create_shm(&PROBE_DATA) {
            Ok(name) => {
                let name = name.to_string();
                let id = ids.next_id();
                neg.send_probe(port, TransferChannel::SharedMemory, id, name.as_bytes())?;
            }
            Err(e) => {
                neg.verdicts
                    .settle(TransferChannel::SharedMemory, TransferVerdict::Unsupported);
                if !matches!(e, ShmError::NotSupported) {
                    port.report(&format!(
                        "Failed to create SHM for data transfer, memory based transfer is disabled. Error: {}",
                        e
                    ));
                }
            }
        }

        port.write(IDENTITY_QUERY)?;
        port.flush()?;
        neg.deadline = Some(now + timeout);
        info!(
            "Negotiating transfer channels ({} probes, timeout {:?})",
            neg.pending.len(),
            timeout
        );
        Ok(neg)
    }

    fn send_probe<P: TerminalPort + ?Sized>(
        &mut self,
        port: &mut P,
        channel: TransferChannel,
        id: u32,
        payload: &[u8],
    ) -> Result<(), RunError> {
        let cmd = GraphicsCommand::query(channel.transmission(), id, PROBE_DATA.len());
        port.write(&cmd.encode(payload))?;
        self.pending.insert(id, ReplyTarget::Probe(channel));
        trace!("Probe {} sent for {}", id, channel);
        Ok(())
    }

    /// Record a graphics reply. Returns true if it settled a channel.
    pub fn on_reply(&mut self, reply: &GraphicsReply) -> bool {
        if !self.in_flight {
            trace!("Ignoring graphics reply {} outside negotiation", reply.image_id);
            return false;
        }
        match self.pending.remove(&reply.image_id) {
            Some(ReplyTarget::Probe(channel)) => {
                let verdict = if reply.is_ok() {
                    TransferVerdict::Supported
                } else {
                    debug!("{} probe failed: {}", channel, reply.message);
                    TransferVerdict::Unsupported
                };
                self.verdicts.settle(channel, verdict)
            }
            None => {
                debug!("Ignoring reply for unknown id {}", reply.image_id);
                false
            }
        }
    }

    /// Identity reply ends negotiation. Returns Ok(false) if not negotiating.
    pub fn on_identity_reply(&mut self) -> Result<bool, RunError> {
        if !self.in_flight {
            trace!("Ignoring identity reply outside negotiation");
            return Ok(false);
        }
        self.in_flight = false;
        self.deadline = None;
        self.pending.clear();
        if !self.verdicts.is_supported(TransferChannel::Direct) {
            return Err(RunError::GraphicsUnsupported);
        }
        info!(
            "Negotiation done on {}x{} px screen, best channel: {:?}",
            self.screen.width_px,
            self.screen.height_px,
            self.verdicts.best()
        );
        Ok(true)
    }

    /// Deadline expiry. Fatal only while still negotiating.
    pub fn on_timeout(&mut self) -> Result<(), RunError> {
        if self.in_flight {
            self.in_flight = false;
            self.deadline = None;
            return Err(RunError::Timeout);
        }
        Ok(())
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Verdicts usable for transmission, `None` while negotiating
    pub fn settled_verdicts(&self) -> Option<&Verdicts> {
        if self.in_flight {
            None
        } else {
            Some(&self.verdicts)
        }
    }

    /// Verdicts as they stand, for cleanup decisions
    pub fn verdicts(&self) -> &Verdicts {
        &self.verdicts
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
