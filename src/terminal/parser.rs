//! Terminal input parser
//!
//! Splits bytes read from the tty into screen events.
//! APC sequences (graphics replies) are collected by a small state
//! machine in front of vte, everything else goes through vte's
//! `Perform` trait.

use log::trace;
use vte::{Params, Perform};

use super::kitty::GraphicsReply;
use crate::constants::MAX_APC_BUFFER_SIZE;

/// Key presses the controller cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Ctrl+C
    Interrupt,
    /// Ctrl+Z
    Suspend,
}

/// Parsed input from the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenEvent {
    /// Primary device attributes reply: CSI ? Ps ; ... c
    IdentityReply(Vec<u16>),
    /// Graphics protocol reply: ESC _ G ... ST
    Graphics(GraphicsReply),
    /// Key press
    Key(Key),
}

/// APC parse state
enum ApcState {
    /// Normal state
    Normal,
    /// ESC detected
    Escape,
    /// ESC _ detected, collecting APC data
    InApc,
    /// Waiting for APC termination (ESC detected)
    ApcEscape,
}

/// Incremental parser, keeps state across reads
pub struct InputParser {
    vt_parser: vte::Parser,
    apc_state: ApcState,
    apc_buffer: Vec<u8>,
}

impl Default for InputParser {
    fn default() -> Self {
        Self::new()
    }
}

impl InputParser {
    pub fn new() -> Self {
        Self {
            vt_parser: vte::Parser::new(),
            apc_state: ApcState::Normal,
            apc_buffer: Vec::new(),
        }
    }

    /// Feed bytes, returning the events completed by them
    pub fn feed(&mut self, data: &[u8]) -> Vec<ScreenEvent> {
        let mut events = Vec::new();

        for &byte in data {
            match self.apc_state {
                ApcState::Normal => {
                    if byte == 0x1B {
                        self.apc_state = ApcState::Escape;
                    } else {
                        self.advance_vte(byte, &mut events);
                    }
                }
                ApcState::Escape => {
                    if byte == b'_' {
                        self.apc_state = ApcState::InApc;
                        self.apc_buffer.clear();
                    } else {
                        self.apc_state = ApcState::Normal;
                        self.advance_vte(0x1B, &mut events);
                        self.advance_vte(byte, &mut events);
                    }
                }
                ApcState::InApc => {
                    if byte == 0x1B {
                        self.apc_state = ApcState::ApcEscape;
                    } else if byte == 0x9C {
                        self.finish_apc(&mut events);
                        self.apc_state = ApcState::Normal;
                    } else if self.apc_buffer.len() < MAX_APC_BUFFER_SIZE {
                        self.apc_buffer.push(byte);
                    }
                }
                ApcState::ApcEscape => {
                    if byte == b'\\' {
                        self.finish_apc(&mut events);
                        self.apc_state = ApcState::Normal;
                    } else {
                        self.apc_buffer.push(0x1B);
                        if byte == 0x1B {
                            self.apc_state = ApcState::ApcEscape;
                        } else {
                            self.apc_buffer.push(byte);
                            self.apc_state = ApcState::InApc;
                        }
                    }
                }
            }
        }

        events
    }

    fn advance_vte(&mut self, byte: u8, events: &mut Vec<ScreenEvent>) {
        let mut performer = Collector { events };
        self.vt_parser.advance(&mut performer, byte);
    }

    fn finish_apc(&mut self, events: &mut Vec<ScreenEvent>) {
        // Graphics replies: ESC _ G ... ST
        if self.apc_buffer.first() != Some(&b'G') {
            trace!("Ignoring non-graphics APC ({} bytes)", self.apc_buffer.len());
            return;
        }
        match GraphicsReply::parse(&self.apc_buffer[1..]) {
            Some(reply) => events.push(ScreenEvent::Graphics(reply)),
            None => trace!("Malformed graphics reply"),
        }
    }
}

/// vte::Perform implementation collecting events
struct Collector<'a> {
    events: &'a mut Vec<ScreenEvent>,
}

impl Perform for Collector<'_> {
    /// Handle C0 control character (raw mode delivers ^C and ^Z here)
    fn execute(&mut self, byte: u8) {
        match byte {
            0x03 => self.events.push(ScreenEvent::Key(Key::Interrupt)),
            0x1A => self.events.push(ScreenEvent::Key(Key::Suspend)),
            _ => trace!("Unhandled control character: 0x{:02x}", byte),
        }
    }

    /// Handle CSI sequence
    fn csi_dispatch(&mut self, params: &Params, intermediates: &[u8], _ignore: bool, action: char) {
        let flat: Vec<u16> = params
            .iter()
            .map(|p| p.first().copied().unwrap_or(0))
            .collect();

        match (action, intermediates) {
            ('c', [b'?']) if !flat.is_empty() => {
                self.events.push(ScreenEvent::IdentityReply(flat));
            }
            // Progressive keyboard enhancement: CSI code ; modifiers u
            ('u', []) => {
                let ctrl = flat.get(1).map(|m| m.saturating_sub(1) & 0b100 != 0);
                match (flat.first(), ctrl) {
                    (Some(99), Some(true)) => self.events.push(ScreenEvent::Key(Key::Interrupt)),
                    (Some(122), Some(true)) => self.events.push(ScreenEvent::Key(Key::Suspend)),
                    _ => {}
                }
            }
            _ => {
                trace!("Unhandled CSI: {:?} {:?} {}", flat, intermediates, action);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_reply() {
        let mut parser = InputParser::new();
        let events = parser.feed(b"\x1b[?62;22c");
        assert_eq!(events, vec![ScreenEvent::IdentityReply(vec![62, 22])]);
    }

    #[test]
    fn test_graphics_reply_split_across_reads() {
        let mut parser = InputParser::new();
        assert!(parser.feed(b"\x1b_Gi=1;").is_empty());
        assert!(parser.feed(b"OK\x1b").is_empty());
        let events = parser.feed(b"\\");
        assert_eq!(
            events,
            vec![ScreenEvent::Graphics(GraphicsReply {
                image_id: 1,
                message: "OK".to_string()
            })]
        );
    }

    #[test]
    fn test_replies_then_identity() {
        let mut parser = InputParser::new();
        let events =
            parser.feed(b"\x1b_Gi=1;OK\x1b\\\x1b_Gi=2;EBADF:bad\x1b\\\x1b[?1;2;4c");
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], ScreenEvent::Graphics(r) if r.image_id == 2 && !r.is_ok()));
        assert!(matches!(&events[2], ScreenEvent::IdentityReply(_)));
    }

    #[test]
    fn test_control_keys() {
        let mut parser = InputParser::new();
        let events = parser.feed(b"a\x03\x1a");
        assert_eq!(
            events,
            vec![
                ScreenEvent::Key(Key::Interrupt),
                ScreenEvent::Key(Key::Suspend)
            ]
        );
    }

    #[test]
    fn test_csi_u_interrupt() {
        let mut parser = InputParser::new();
        assert_eq!(
            parser.feed(b"\x1b[99;5u"),
            vec![ScreenEvent::Key(Key::Interrupt)]
        );
        assert!(parser.feed(b"\x1b[99u").is_empty());
    }

    #[test]
    fn test_non_graphics_apc_ignored() {
        let mut parser = InputParser::new();
        assert!(parser.feed(b"\x1b_Xhello\x1b\\").is_empty());
    }
}
