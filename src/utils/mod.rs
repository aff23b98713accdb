//! Utility functions shared across pixcat
//!
//! Common helpers that don't fit in specialized modules.

pub mod color;

pub use color::{flatten_pixel, parse_color_spec};
