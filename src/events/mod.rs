use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::surface::RowId;

mod terminal;

pub use terminal::TerminalEvents;

/// Keys with a name; configurable bindings refer to these.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum NamedKey {
    Enter,
    Backspace,
    Delete,
    Tab,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Named(NamedKey),
    Char(char),
}

impl From<NamedKey> for Key {
    fn from(key: NamedKey) -> Self {
        Key::Named(key)
    }
}

/// A discrete input delivered to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    KeyDown { row: RowId, key: Key },
    DeleteClicked { row: RowId },
    CheckboxToggled { row: RowId },
    FocusIn { row: RowId },
    FocusOut { row: RowId },
    PageUnload,
}

impl UiEvent {
    pub fn row(&self) -> Option<RowId> {
        match self {
            UiEvent::KeyDown { row, .. }
            | UiEvent::DeleteClicked { row }
            | UiEvent::CheckboxToggled { row }
            | UiEvent::FocusIn { row }
            | UiEvent::FocusOut { row } => Some(*row),
            UiEvent::PageUnload => None,
        }
    }
}

/// Whether the event's default behaviour should still run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// The editor consumed the event; suppress the default behaviour.
    Handled,
    /// The editor ignored the event; the caller applies the default.
    Default,
}

impl Propagation {
    pub fn is_handled(self) -> bool {
        matches!(self, Propagation::Handled)
    }
}

/// Anything that can feed inputs to an editor loop.
pub trait EventSource {
    type Event;

    /// Waits up to `timeout` for the next event. `None` means nothing arrived.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<Self::Event>>;

    /// Whether the source will never produce another event.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Replays a fixed queue of events, never waiting.
#[derive(Debug, Clone)]
pub struct ScriptedEvents<E = UiEvent> {
    queue: VecDeque<E>,
}

impl<E> ScriptedEvents<E> {
    pub fn new(events: impl IntoIterator<Item = E>) -> Self {
        Self {
            queue: events.into_iter().collect(),
        }
    }

    pub fn push(&mut self, event: E) {
        self.queue.push_back(event);
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl<E> Default for ScriptedEvents<E> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

impl<E> EventSource for ScriptedEvents<E> {
    type Event = E;

    fn next_event(&mut self, _timeout: Duration) -> Result<Option<E>> {
        Ok(self.queue.pop_front())
    }

    fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }
}
