use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{NoteSink, NoteTransport, SaveRequest, SaveTrigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    Idle {
        last_saved_at: Option<OffsetDateTime>,
    },
    InFlight {
        trigger: SaveTrigger,
    },
    Error {
        message: String,
        occurred_at: OffsetDateTime,
    },
}

impl Default for SaveStatus {
    fn default() -> Self {
        SaveStatus::Idle {
            last_saved_at: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SaveEvent {
    Saved {
        trigger: SaveTrigger,
        items: usize,
        timestamp: OffsetDateTime,
    },
    Failed {
        trigger: SaveTrigger,
        message: String,
    },
}

enum Job {
    Save(SaveRequest),
    Shutdown,
}

/// Cloneable handle that enqueues saves for the worker thread.
#[derive(Debug, Clone)]
pub struct SaveQueue {
    jobs: Sender<Job>,
}

impl NoteSink for SaveQueue {
    fn submit(&self, request: SaveRequest) {
        let trigger = request.trigger;
        if self.jobs.send(Job::Save(request)).is_err() {
            tracing::warn!(%trigger, "save worker is gone, dropping note snapshot");
        }
    }
}

/// Background thread that performs saves in submission order.
///
/// Failed deliveries are logged and reported once; nothing is retried.
#[derive(Debug)]
pub struct SaveWorker {
    queue: SaveQueue,
    events: Receiver<SaveEvent>,
    status: Arc<Mutex<SaveStatus>>,
    handle: Option<JoinHandle<()>>,
}

impl SaveWorker {
    pub fn spawn<T: NoteTransport>(transport: T) -> Result<Self> {
        let (job_tx, job_rx) = unbounded::<Job>();
        let (event_tx, event_rx) = unbounded::<SaveEvent>();
        let status = Arc::new(Mutex::new(SaveStatus::default()));
        let worker_status = Arc::clone(&status);
        let handle = thread::Builder::new()
            .name("notepad-save".into())
            .spawn(move || run(transport, job_rx, event_tx, worker_status))
            .context("spawning save worker thread")?;
        Ok(Self {
            queue: SaveQueue { jobs: job_tx },
            events: event_rx,
            status,
            handle: Some(handle),
        })
    }

    pub fn queue(&self) -> SaveQueue {
        self.queue.clone()
    }

    pub fn status(&self) -> SaveStatus {
        self.status.lock().clone()
    }

    /// Drains outcomes reported since the last call.
    pub fn drain_events(&self) -> Vec<SaveEvent> {
        self.events.try_iter().collect()
    }

    /// Lets the worker finish everything already queued, then joins it.
    pub fn shutdown(mut self) -> Result<Vec<SaveEvent>> {
        self.stop()?;
        Ok(self.drain_events())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        // Already-queued jobs, including an unload beacon, run before this.
        let _ = self.queue.jobs.send(Job::Shutdown);
        handle
            .join()
            .map_err(|_| anyhow!("save worker thread panicked"))
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::error!(?err, "failed to stop save worker");
        }
    }
}

fn run<T: NoteTransport>(
    transport: T,
    jobs: Receiver<Job>,
    events: Sender<SaveEvent>,
    status: Arc<Mutex<SaveStatus>>,
) {
    for job in jobs.iter() {
        let request = match job {
            Job::Save(request) => request,
            Job::Shutdown => break,
        };
        let trigger = request.trigger;
        *status.lock() = SaveStatus::InFlight { trigger };
        let outcome = match transport.deliver(&request) {
            Ok(()) => {
                let timestamp = OffsetDateTime::now_utc();
                *status.lock() = SaveStatus::Idle {
                    last_saved_at: Some(timestamp),
                };
                SaveEvent::Saved {
                    trigger,
                    items: request.note.len(),
                    timestamp,
                }
            }
            Err(err) => {
                tracing::warn!(%trigger, error = %err, "saving note failed");
                let message = err.to_string();
                *status.lock() = SaveStatus::Error {
                    message: message.clone(),
                    occurred_at: OffsetDateTime::now_utc(),
                };
                SaveEvent::Failed { trigger, message }
            }
        };
        // The front end may already be gone during teardown.
        let _ = events.send(outcome);
    }
    tracing::debug!("save worker stopped");
}
