//! Process signals and panic recovery
//!
//! SIGTERM, SIGINT and SIGHUP are recorded by an async-signal-safe handler
//! and picked up by the event loop. A panic hook puts the terminal back
//! into its original mode, since `panic = "abort"` skips destructors.

use nix::sys::signal::Signal;
use nix::sys::termios::Termios;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

/// Last terminating signal received, 0 = none
static DEATH_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Terminal to restore if we panic while in raw mode
static PANIC_RECOVERY: Mutex<Option<(i32, libc::termios)>> = Mutex::new(None);

/// Install handlers for SIGTERM, SIGINT and SIGHUP (call once at startup)
pub fn setup_signal_handlers() {
    unsafe {
        for sig in [libc::SIGTERM, libc::SIGINT, libc::SIGHUP] {
            libc::signal(sig, death_signal_handler as *const () as libc::sighandler_t);
        }
    }
}

extern "C" fn death_signal_handler(signo: libc::c_int) {
    DEATH_SIGNAL.store(signo, Ordering::Relaxed);
}

/// Terminating signal received so far, if any
pub fn death_signal() -> Option<i32> {
    match DEATH_SIGNAL.load(Ordering::Relaxed) {
        0 => None,
        sig => Some(sig),
    }
}

/// Human readable signal name (SIGTERM, ...)
pub fn signal_name(sig: i32) -> String {
    Signal::try_from(sig)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {}", sig))
}

/// Die from `sig` with the default disposition so the parent sees it
pub fn kill_with(sig: i32) {
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

/// Remember the original termios of `fd` for the panic hook
pub fn set_panic_recovery(fd: i32, orig: &Termios) {
    if let Ok(mut slot) = PANIC_RECOVERY.lock() {
        *slot = Some((fd, libc::termios::from(orig.clone())));
    }
}

pub fn clear_panic_recovery() {
    if let Ok(mut slot) = PANIC_RECOVERY.lock() {
        *slot = None;
    }
}

/// Install a panic hook that restores the terminal before reporting
pub fn setup_panic_hook() {
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Ok(slot) = PANIC_RECOVERY.try_lock() {
            if let Some((fd, termios)) = *slot {
                unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
            }
        }
        eprintln!("[pixcat] PANIC: {}", info);
        prev(info);
    }));
}
