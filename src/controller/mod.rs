//! Run controller
//!
//! Owns terminal output and all negotiation state for one run. Every
//! input to the run arrives as a `LoopEvent` and goes through
//! `Controller::handle`, which is the only place state changes.
//!
//! ```text
//! Initializing ──┬─→ Negotiating ──→ Steady ──→ Draining ──→ Terminated
//!                └──────(forced)────────↑
//! ```

pub mod event_loop;


use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{RunError, TransmitError};
use crate::pipeline::workers::{self, WakeFn, WorkerPool};
use crate::pipeline::{ImageResult, InputItem, Placement, Preparer};
use crate::probe::artifacts::{ArtifactBackend, ArtifactStore};
use crate::probe::{IdAllocator, Negotiation};
use crate::terminal::kitty::GraphicsCommand;
use crate::terminal::{Key, ScreenEvent, ScreenSize, TerminalPort};
use crate::transfer::dispatch::{DisplaySettings, Dispatcher};
use crate::transfer::{TransferChannel, Verdicts};

/// Life cycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initializing,
    Negotiating,
    Steady,
    Draining,
    Terminated,
}

/// Everything that can wake the controller
#[derive(Debug)]
pub enum LoopEvent {
    Screen(ScreenEvent),
    /// Negotiation deadline passed
    TimerFired,
    WorkerResultReady,
    UserInterrupt,
    Signalled(i32),
}

/// How transfer channels are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    #[default]
    Detect,
    /// Negotiate, print the best channel and exit
    DetectOnly,
    Stream,
    File,
    Memory,
}

impl TransferMode {
    /// Channel used without negotiating
    pub fn forced_channel(self) -> Option<TransferChannel> {
        match self {
            TransferMode::Stream => Some(TransferChannel::Direct),
            TransferMode::File => Some(TransferChannel::TempFile),
            TransferMode::Memory => Some(TransferChannel::SharedMemory),
            TransferMode::Detect | TransferMode::DetectOnly => None,
        }
    }
}

/// Remaining work and the error flag
#[derive(Debug, Default)]
pub struct RunCounters {
    remaining: usize,
    errors: bool,
}

impl RunCounters {
    pub fn new(remaining: usize) -> Self {
        Self {
            remaining,
            errors: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Count one consumed result. Returns false if nothing was left.
    pub fn consume(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(n) => {
                self.remaining = n;
                true
            }
            None => {
                error!("Result received with no items outstanding, ignoring");
                false
            }
        }
    }

    pub fn flag_error(&mut self) {
        self.errors = true;
    }

    pub fn has_errors(&self) -> bool {
        self.errors
    }
}

/// Run parameters resolved from the command line and config
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub mode: TransferMode,
    pub detection_timeout: Duration,
    pub clear: bool,
    pub z_index: i32,
    pub placement: Option<Placement>,
    /// Worker cap, 0 = one per core
    pub max_workers: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            mode: TransferMode::Detect,
            detection_timeout: Duration::from_secs_f64(
                crate::constants::DEFAULT_DETECTION_TIMEOUT_SECS,
            ),
            clear: false,
            z_index: 0,
            placement: None,
            max_workers: 0,
        }
    }
}

/// Builds the preparer once the screen size is known
pub type PreparerFactory = Box<dyn FnOnce(ScreenSize) -> Arc<dyn Preparer>>;

pub struct Controller<P: TerminalPort> {
    port: P,
    settings: RunSettings,
    state: State,
    items: Vec<InputItem>,
    make_preparer: Option<PreparerFactory>,
    store: ArtifactStore,
    ids: IdAllocator,
    negotiation: Option<Negotiation>,
    counters: RunCounters,
    pool: Option<WorkerPool>,
    results_tx: Sender<ImageResult>,
    results_rx: Receiver<ImageResult>,
    wake: WakeFn,
    dispatcher: Dispatcher,
    failed: bool,
    signal: Option<i32>,
}

impl<P: TerminalPort> Controller<P> {
    pub fn new(
        port: P,
        settings: RunSettings,
        items: Vec<InputItem>,
        make_preparer: PreparerFactory,
        artifacts: Box<dyn ArtifactBackend>,
        wake: WakeFn,
    ) -> Self {
        let (results_tx, results_rx) = unbounded();
        let dispatcher = Dispatcher::new(DisplaySettings {
            z_index: settings.z_index,
        });
        Self {
            port,
            settings,
            state: State::Initializing,
            items,
            make_preparer: Some(make_preparer),
            store: ArtifactStore::new(artifacts),
            ids: IdAllocator::new(),
            negotiation: None,
            counters: RunCounters::default(),
            pool: None,
            results_tx,
            results_rx,
            wake,
            dispatcher,
            failed: false,
            signal: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    #[cfg(test)]
    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    #[cfg(test)]
    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Signal that ended the run, if any
    pub fn signal(&self) -> Option<i32> {
        self.signal
    }

    /// Negotiation deadline while probes are outstanding
    pub fn deadline(&self) -> Option<Instant> {
        self.negotiation.as_ref().and_then(|n| n.deadline())
    }

    /// No more events are needed
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Draining | State::Terminated)
    }

    fn is_in_flight(&self) -> bool {
        self.negotiation
            .as_ref()
            .map(|n| n.is_in_flight())
            .unwrap_or(false)
    }

    /// Capture the screen, start workers and begin negotiation
    pub fn start(&mut self, now: Instant) -> Result<(), RunError> {
        let res = self.try_start(now);
        self.check(res)
    }

    fn try_start(&mut self, now: Instant) -> Result<(), RunError> {
        if self.state != State::Initializing {
            return Ok(());
        }
        let detect_only = self.settings.mode == TransferMode::DetectOnly;

        if let Some(place) = self.settings.placement {
            if self.items.len() > 1 {
                return Err(RunError::PlaceWithMultipleItems(self.items.len()));
            }
            for item in &mut self.items {
                item.placement = Some(place);
            }
        }
        if self.items.is_empty() && !detect_only {
            return Err(RunError::NoInputs);
        }

        let screen = self.port.screen_size().map_err(RunError::ScreenSize)?;
        if !screen.has_pixels() {
            return Err(RunError::NoPixelSize);
        }
        debug!(
            "Screen: {}x{} cells, {}x{} px",
            screen.cols, screen.rows, screen.width_px, screen.height_px
        );

        if self.settings.clear {
            self.port.write(&GraphicsCommand::clear_visible().encode(&[]))?;
        }

        if !detect_only {
            let items = std::mem::take(&mut self.items);
            self.counters = RunCounters::new(items.len());
            if let Some(make) = self.make_preparer.take() {
                let size = workers::pool_size(
                    items.len(),
                    workers::parallelism(self.settings.max_workers),
                );
                let pool = WorkerPool::spawn(
                    items,
                    size,
                    make(screen),
                    self.results_tx.clone(),
                    Arc::clone(&self.wake),
                )?;
                self.pool = Some(pool);
            }
        }

        match self.settings.mode.forced_channel() {
            Some(channel) => {
                info!("Transfer mode forced to {}", channel);
                self.negotiation = Some(Negotiation::forced(channel, screen));
                self.state = State::Steady;
                self.port.flush()?;
                self.drain()?;
            }
            None => {
                let neg = Negotiation::begin(
                    &mut self.port,
                    &mut self.store,
                    &mut self.ids,
                    screen,
                    self.settings.detection_timeout,
                    now,
                )?;
                self.negotiation = Some(neg);
                self.state = State::Negotiating;
            }
        }
        Ok(())
    }

    /// Apply one event
    pub fn handle(&mut self, event: LoopEvent) -> Result<(), RunError> {
        if self.state == State::Terminated {
            return Ok(());
        }
        let res = self.dispatch(event);
        self.check(res)
    }

    fn check(&mut self, res: Result<(), RunError>) -> Result<(), RunError> {
        if res.is_err() {
            self.failed = true;
            self.state = State::Terminated;
        }
        res
    }

    fn dispatch(&mut self, event: LoopEvent) -> Result<(), RunError> {
        match event {
            LoopEvent::Screen(ScreenEvent::IdentityReply(params)) => {
                debug!("Identity reply: {:?}", params);
                let finished = match self.negotiation.as_mut() {
                    Some(neg) => neg.on_identity_reply()?,
                    None => false,
                };
                if finished {
                    self.on_negotiated()?;
                }
            }
            LoopEvent::Screen(ScreenEvent::Graphics(reply)) => {
                if let Some(neg) = self.negotiation.as_mut() {
                    neg.on_reply(&reply);
                }
            }
            LoopEvent::Screen(ScreenEvent::Key(Key::Interrupt)) | LoopEvent::UserInterrupt => {
                if self.is_in_flight() {
                    self.port.report(
                        "Waiting for response from terminal, aborting now could lead to corruption",
                    );
                    self.port.flush()?;
                } else {
                    return Err(RunError::Aborted);
                }
            }
            LoopEvent::Screen(ScreenEvent::Key(Key::Suspend)) => {
                debug!("Ignoring suspend key");
            }
            LoopEvent::TimerFired => {
                if let Some(neg) = self.negotiation.as_mut() {
                    neg.on_timeout()?;
                }
            }
            LoopEvent::WorkerResultReady => self.drain()?,
            LoopEvent::Signalled(sig) => {
                warn!("Terminating on signal {}", sig);
                self.signal = Some(sig);
                self.failed = true;
                self.state = State::Terminated;
            }
        }
        Ok(())
    }

    fn on_negotiated(&mut self) -> Result<(), RunError> {
        if self.settings.mode == TransferMode::DetectOnly {
            let best = self
                .negotiation
                .as_ref()
                .and_then(|n| n.settled_verdicts())
                .and_then(Verdicts::best)
                .unwrap_or(TransferChannel::Direct);
            self.port.report(best.mode_name());
            self.port.flush()?;
            self.state = State::Terminated;
            return Ok(());
        }
        self.state = State::Steady;
        self.drain()
    }

    /// Consume every result that is ready, without blocking
    fn drain(&mut self) -> Result<(), RunError> {
        if self.state != State::Steady {
            return Ok(());
        }
        let Some(verdicts) = self
            .negotiation
            .as_ref()
            .and_then(|n| n.settled_verdicts())
            .cloned()
        else {
            return Ok(());
        };

        while let Ok(result) = self.results_rx.try_recv() {
            if !self.counters.consume() {
                continue;
            }
            let ImageResult { source, outcome } = result;
            let payload = match outcome {
                Ok(payload) => payload,
                Err(e) => {
                    self.port
                        .report(&format!("Failed to process {}: {}", source, e));
                    self.counters.flag_error();
                    continue;
                }
            };

            let id = self.ids.next_id();
            match self.dispatcher.transmit(
                &mut self.port,
                self.store.backend(),
                &payload,
                &verdicts,
                id,
            ) {
                Ok(channel) => debug!("{} shown as image {} via {}", source, id, channel),
                Err(TransmitError::Io(e)) => return Err(RunError::Io(e)),
                Err(e) => {
                    self.port
                        .report(&format!("Failed to process {}: {}", source, e));
                    self.counters.flag_error();
                }
            }
        }
        self.port.flush()?;

        if self.counters.remaining() == 0 {
            info!("All images processed");
            self.state = State::Draining;
        }
        Ok(())
    }

    /// Stop workers and clean up. Returns the exit status.
    pub fn finish(&mut self) -> i32 {
        if let Some(pool) = self.pool.take() {
            pool.stop();
        }
        let verdicts = self
            .negotiation
            .as_ref()
            .map(|n| n.verdicts().clone())
            .unwrap_or_default();
        self.store.finalize(&verdicts);
        let _ = self.port.flush();
        self.state = State::Terminated;

        if self.failed || self.counters.has_errors() {
            1
        } else {
            0
        }
    }
}
