//! Controlling terminal
//!
//! Opens /dev/tty, switches it to raw mode and restores it on drop.
//! Input is read on a dedicated thread and parsed into screen events.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, trace};
use nix::sys::termios::{self, Termios};
use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Read, Write};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::{format_inline_report, InputParser, ScreenEvent, ScreenSize, TerminalPort};
use crate::constants::READER_POLL_MS;
use crate::signals;

/// Controlling terminal handle
pub struct Tty {
    file: File,
    /// Original termios settings (for restoration), set while in raw mode
    orig_termios: Option<Termios>,
    /// Queued output
    out_buf: Vec<u8>,
    /// Diagnostics go inline when stderr is the terminal
    stderr_is_tty: bool,
}

/// Query TIOCGWINSZ on a file descriptor
pub fn window_size(fd: RawFd) -> io::Result<ScreenSize> {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws as *mut libc::winsize) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ScreenSize {
        cols: ws.ws_col,
        rows: ws.ws_row,
        width_px: ws.ws_xpixel,
        height_px: ws.ws_ypixel,
    })
}

impl Tty {
    /// Open the controlling terminal
    pub fn open() -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/tty")
            .context("Failed to open controlling terminal")?;
        Ok(Self {
            file,
            orig_termios: None,
            out_buf: Vec::with_capacity(8192),
            stderr_is_tty: io::stderr().is_terminal(),
        })
    }

    /// Switch to raw mode (no echo, no signal keys, byte-at-a-time input)
    pub fn enter_raw_mode(&mut self) -> Result<()> {
        if self.orig_termios.is_some() {
            return Ok(());
        }
        let orig =
            termios::tcgetattr(self.file.as_fd()).map_err(|e| anyhow!("tcgetattr failed: {}", e))?;
        let mut raw = orig.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(self.file.as_fd(), termios::SetArg::TCSANOW, &raw)
            .map_err(|e| anyhow!("tcsetattr failed: {}", e))?;
        signals::set_panic_recovery(self.file.as_raw_fd(), &orig);
        self.orig_termios = Some(orig);
        info!("Terminal in raw mode");
        Ok(())
    }

    /// Restore the settings saved by `enter_raw_mode`
    pub fn restore_mode(&mut self) {
        if let Some(orig) = self.orig_termios.take() {
            let _ = self.flush();
            let _ = termios::tcsetattr(self.file.as_fd(), termios::SetArg::TCSADRAIN, &orig);
            signals::clear_panic_recovery();
            info!("Terminal settings restored");
        }
    }

    /// Start the reader thread.
    ///
    /// `sink` receives each parsed event and returns false to stop reading.
    pub fn spawn_reader<F>(&self, mut sink: F) -> Result<TtyReader>
    where
        F: FnMut(ScreenEvent) -> bool + Send + 'static,
    {
        let mut file = self.file.try_clone().context("Failed to clone tty handle")?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("tty-reader".to_string())
            .spawn(move || {
                let mut parser = InputParser::new();
                let mut buf = [0u8; 4096];
                let fd = file.as_raw_fd();

                while !stop_flag.load(Ordering::Relaxed) {
                    let mut pfd = libc::pollfd {
                        fd,
                        events: libc::POLLIN,
                        revents: 0,
                    };
                    let ret = unsafe { libc::poll(&mut pfd, 1, READER_POLL_MS) };
                    if ret < 0 {
                        let err = io::Error::last_os_error();
                        if err.kind() == io::ErrorKind::Interrupted {
                            continue;
                        }
                        debug!("tty poll failed: {}", err);
                        break;
                    }
                    if ret == 0 {
                        continue;
                    }

                    let n = match file.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            debug!("tty read failed: {}", e);
                            break;
                        }
                    };
                    trace!("tty read: {} bytes", n);

                    for event in parser.feed(&buf[..n]) {
                        if !sink(event) {
                            return;
                        }
                    }
                }
            })
            .context("Failed to spawn tty reader thread")?;

        Ok(TtyReader {
            stop,
            handle: Some(handle),
        })
    }

    /// Block until Enter (or Ctrl+C) is pressed
    pub fn wait_for_enter(&mut self) -> Result<()> {
        self.enter_raw_mode()?;
        let mut byte = [0u8; 1];
        loop {
            match self.file.read(&mut byte) {
                Ok(0) => break,
                Ok(_) if matches!(byte[0], b'\r' | b'\n' | 0x03) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.restore_mode();
        Ok(())
    }
}

impl TerminalPort for Tty {
    fn screen_size(&mut self) -> io::Result<ScreenSize> {
        window_size(self.file.as_raw_fd())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.out_buf.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.out_buf.is_empty() {
            self.file.write_all(&self.out_buf)?;
            self.out_buf.clear();
        }
        self.file.flush()
    }

    fn report(&mut self, message: &str) {
        if self.stderr_is_tty {
            self.out_buf.extend_from_slice(&format_inline_report(message));
            let _ = self.flush();
        } else {
            let _ = self.flush();
            eprintln!("{}", message);
        }
    }
}

impl Drop for Tty {
    fn drop(&mut self) {
        self.restore_mode();
    }
}

/// Running reader thread
pub struct TtyReader {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TtyReader {
    /// Stop reading and wait for the thread (bounded by the poll timeout)
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
