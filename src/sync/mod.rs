use std::sync::Arc;

use parking_lot::Mutex;
use strum::Display;

use crate::model::Note;

mod transport;
mod worker;

pub use transport::{HttpTransport, NoteTransport, TransportError};
pub use worker::{SaveEvent, SaveQueue, SaveStatus, SaveWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SaveTrigger {
    /// Focus left the whole editor.
    Blur,
    /// The session is being torn down; delivered best-effort.
    Unload,
    Manual,
}

impl SaveTrigger {
    pub fn is_beacon(self) -> bool {
        matches!(self, SaveTrigger::Unload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    pub note: Note,
    pub csrf_token: Option<String>,
    pub trigger: SaveTrigger,
}

/// Receives snapshots to persist. Implementations must not block the caller.
pub trait NoteSink {
    fn submit(&self, request: SaveRequest);
}

impl<S: NoteSink + ?Sized> NoteSink for Arc<S> {
    fn submit(&self, request: SaveRequest) {
        (**self).submit(request)
    }
}

/// Keeps every submitted request in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    requests: Arc<Mutex<Vec<SaveRequest>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<SaveRequest> {
        self.requests.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }

    pub fn last(&self) -> Option<SaveRequest> {
        self.requests.lock().last().cloned()
    }
}

impl NoteSink for MemorySink {
    fn submit(&self, request: SaveRequest) {
        self.requests.lock().push(request);
    }
}
