//! Main loop
//!
//! Waits on the event channel with a deadline bounded by the negotiation
//! timer and a short tick, so process signals are noticed promptly.

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, trace};
use std::time::{Duration, Instant};

use super::{Controller, LoopEvent};
use crate::constants::LOOP_TICK_MS;
use crate::error::RunError;
use crate::terminal::TerminalPort;

/// How a run ended
#[derive(Debug)]
pub struct RunOutcome {
    pub exit_code: i32,
    /// Fatal error, to be printed once the terminal is restored
    pub error: Option<RunError>,
    /// Terminating signal, to be re-raised
    pub signal: Option<i32>,
}

/// Drive `controller` until the run is over
pub fn run<P, S>(controller: &mut Controller<P>, events: &Receiver<LoopEvent>, poll_signal: S) -> RunOutcome
where
    P: TerminalPort,
    S: Fn() -> Option<i32>,
{
    let tick = Duration::from_millis(LOOP_TICK_MS);
    let mut error = controller.start(Instant::now()).err();

    while error.is_none() && !controller.is_done() {
        if let Some(sig) = poll_signal() {
            let _ = controller.handle(LoopEvent::Signalled(sig));
            break;
        }

        let now = Instant::now();
        let wake_at = match controller.deadline() {
            Some(deadline) => deadline.min(now + tick),
            None => now + tick,
        };

        let result = match events.recv_deadline(wake_at) {
            Ok(event) => {
                trace!("Event: {:?}", event);
                controller.handle(event)
            }
            Err(RecvTimeoutError::Timeout) => on_tick(controller),
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Event channel closed");
                std::thread::sleep(wake_at.saturating_duration_since(Instant::now()));
                on_tick(controller)
            }
        };
        if let Err(e) = result {
            error = Some(e);
        }
    }

    let signal = controller.signal();
    let exit_code = controller.finish();
    RunOutcome {
        exit_code,
        error,
        signal,
    }
}

/// Periodic work: fire the timer once it is due and pick up stray results
fn on_tick<P: TerminalPort>(controller: &mut Controller<P>) -> Result<(), RunError> {
    if let Some(deadline) = controller.deadline() {
        if Instant::now() >= deadline {
            controller.handle(LoopEvent::TimerFired)?;
        }
    }
    controller.handle(LoopEvent::WorkerResultReady)
}
