//! pixcat - display images in the terminal with the kitty graphics protocol
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                  Event Loop                    │
//! ├────────────────────────────────────────────────┤
//! │  tty reader ─┐                  ┌─ WorkerPool  │
//! │              ↓                  ↓              │
//! │           LoopEvent ──→ Controller             │
//! │                          │  (Negotiation)      │
//! │                          ↓                     │
//! │                   Dispatcher ──→ /dev/tty      │
//! └────────────────────────────────────────────────┘
//! ```

mod cli;
mod config;
mod constants;
mod controller;
mod error;
mod pipeline;
mod probe;
mod signals;
mod terminal;
mod transfer;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use log::{debug, info};
use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Write};
use std::os::fd::AsRawFd;
use std::sync::Arc;

use crate::cli::{Args, Options};
use crate::config::Config;
use crate::controller::{event_loop, Controller, LoopEvent, PreparerFactory};
use crate::pipeline::inputs;
use crate::pipeline::prepare::{ImagePreparer, PrepareSettings};
use crate::pipeline::workers::WakeFn;
use crate::pipeline::Preparer;
use crate::probe::artifacts::SystemArtifacts;
use crate::terminal::{tty, Key, ScreenEvent, ScreenSize, Tty};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    signals::setup_panic_hook();

    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:#}", e);
            1
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref());
    let opts = Options::resolve(args, &config)?;

    if opts.print_window_size {
        return print_window_size();
    }

    let stdin = io::stdin();
    let piped = if stdin.is_terminal() {
        None
    } else {
        Some(stdin.lock())
    };
    let items = inputs::expand(&opts.paths, piped)?;
    info!("{} input(s)", items.len());

    let Options {
        run: settings,
        prepare,
        hold,
        ..
    } = opts;
    let placed = settings.placement.is_some();

    let mut tty = Tty::open()?;
    tty.enter_raw_mode()?;
    signals::setup_signal_handlers();

    let (event_tx, event_rx) = unbounded::<LoopEvent>();

    let reader_tx = event_tx.clone();
    let reader = tty.spawn_reader(move |event| {
        let event = match event {
            ScreenEvent::Key(Key::Interrupt) => LoopEvent::UserInterrupt,
            other => LoopEvent::Screen(other),
        };
        reader_tx.send(event).is_ok()
    })?;

    let wake: WakeFn = Arc::new(move || {
        let _ = event_tx.send(LoopEvent::WorkerResultReady);
    });

    let make_preparer: PreparerFactory = Box::new(move |screen: ScreenSize| {
        let settings = PrepareSettings {
            max_width_px: u32::from(screen.width_px),
            ..prepare
        };
        Arc::new(ImagePreparer::new(settings)) as Arc<dyn Preparer>
    });

    let mut controller = Controller::new(
        tty,
        settings,
        items,
        make_preparer,
        Box::new(SystemArtifacts),
        wake,
    );
    let outcome = event_loop::run(&mut controller, &event_rx, signals::death_signal);
    debug!("Run finished with exit code {}", outcome.exit_code);

    reader.stop();
    let mut tty = controller.into_port();
    tty.restore_mode();

    if let Some(e) = &outcome.error {
        eprintln!("{}", e);
    }

    if let Some(sig) = outcome.signal {
        drop(tty);
        println!("Killed by signal: {}", signals::signal_name(sig));
        let _ = io::stdout().flush();
        signals::kill_with(sig);
        return Ok(1);
    }

    if hold && outcome.exit_code == 0 {
        let mut out = io::stdout();
        out.write_all(if placed { b"\r\n" } else { b"\r" })?;
        out.flush()?;
        tty.wait_for_enter()?;
    }

    Ok(outcome.exit_code)
}

/// Print the window size in pixels as WIDTHxHEIGHT
fn print_window_size() -> Result<i32> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/tty")
        .context("Failed to open controlling terminal with error")?;
    let size = tty::window_size(file.as_raw_fd())
        .context("Failed to query terminal using TIOCGWINSZ with error")?;
    print!("{}x{}", size.width_px, size.height_px);
    io::stdout().flush()?;
    Ok(0)
}
