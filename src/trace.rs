//! `TRACE` overlay (ambient debug aid): echoes each line number the
//! executor steps onto, the way `processor::Debugger` annotates every
//! instruction it single-steps, narrowed from a full interactive debugger
//! down to the one feature `TRACE ON`/`TRACE OFF` ask for.
//!
//! Grounded on `processor::Debugger`'s use of `termion::color` for its
//! terminal UI — the same crate, used here for one colour instead of a
//! full redrawn screen.

use std::io::{self, Write};
use termion::color;

pub struct TraceOverlay {
    enabled: bool,
}

impl TraceOverlay {
    pub fn new() -> Self {
        TraceOverlay { enabled: false }
    }

    pub fn set_enabled(&mut self, on: bool) {
        self.enabled = on;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Called whenever the executor moves onto a new program line; a no-op
    /// unless `TRACE ON` is active.
    pub fn line(&self, line_no: u16) {
        if !self.enabled {
            return;
        }
        let mut out = io::stderr();
        let _ = write!(out, "{}[{}]{} ", color::Fg(color::Yellow), line_no, color::Fg(color::Reset));
        let _ = out.flush();
    }
}

impl Default for TraceOverlay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disabled() {
        let t = TraceOverlay::new();
        assert!(!t.is_enabled());
    }

    #[test]
    fn set_enabled_round_trips() {
        let mut t = TraceOverlay::new();
        t.set_enabled(true);
        assert!(t.is_enabled());
        t.set_enabled(false);
        assert!(!t.is_enabled());
    }
}
