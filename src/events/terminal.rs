use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};

use super::EventSource;

/// Key presses read from the controlling terminal.
///
/// Releases, repeats and non-key events come back as `None` so the caller
/// still gets a chance to redraw and run its timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalEvents;

impl TerminalEvents {
    pub fn new() -> Self {
        Self
    }
}

impl EventSource for TerminalEvents {
    type Event = KeyEvent;

    fn next_event(&mut self, timeout: Duration) -> Result<Option<KeyEvent>> {
        if !event::poll(timeout).context("polling for terminal events")? {
            return Ok(None);
        }
        match event::read().context("reading terminal event")? {
            Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key)),
            _ => Ok(None),
        }
    }
}
