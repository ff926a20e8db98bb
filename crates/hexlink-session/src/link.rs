//! Shared link state between the sender and listener workers.
//!
//! Each successful open bumps a generation counter. The listener tags every
//! loss report with the generation it was reading, so a report that races
//! with a close or reconnect is recognised as stale and ignored.
//!
//! Requests enter the sender inbox through an intake gate. Once the sender
//! closes it during teardown, nothing else can be queued, so every request
//! that was accepted is still in the inbox for the final drain.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};

use hexlink_transport::LinkStream;
use serde::Serialize;

/// Connection state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug)]
struct Shared {
    state: LinkState,
    generation: u64,
    reader: Option<LinkStream>,
    shutdown: bool,
}

/// Mutex and condition variable guarding [`LinkState`] and the reader handoff.
#[derive(Debug)]
pub struct LinkControl {
    shared: Mutex<Shared>,
    changed: Condvar,
    intake: RwLock<bool>,
}

impl Default for LinkControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkControl {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Shared {
                state: LinkState::Disconnected,
                generation: 0,
                reader: None,
                shutdown: false,
            }),
            changed: Condvar::new(),
            intake: RwLock::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LinkState {
        self.lock().state
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn begin_connect(&self) {
        self.lock().state = LinkState::Connecting;
    }

    pub fn abort_connect(&self) {
        let mut shared = self.lock();
        if shared.state == LinkState::Connecting {
            shared.state = LinkState::Disconnected;
        }
    }

    /// Publish a freshly opened link and hand its reader half to the listener.
    pub fn install(&self, reader: LinkStream) -> u64 {
        let mut shared = self.lock();
        shared.generation += 1;
        shared.state = LinkState::Connected;
        shared.reader = Some(reader);
        self.changed.notify_all();
        shared.generation
    }

    /// Deliberate close. Invalidates the current generation.
    pub fn close(&self) {
        let mut shared = self.lock();
        shared.generation += 1;
        shared.state = LinkState::Disconnected;
        shared.reader = None;
        self.changed.notify_all();
    }

    /// Record that `generation` died on its own. Returns `false` for stale reports.
    pub fn mark_lost(&self, generation: u64) -> bool {
        let mut shared = self.lock();
        if shared.generation != generation || shared.state != LinkState::Connected {
            return false;
        }
        shared.state = LinkState::Disconnected;
        shared.reader = None;
        self.changed.notify_all();
        true
    }

    /// Whether a reader of `generation` should keep reading.
    pub fn is_current(&self, generation: u64) -> bool {
        let shared = self.lock();
        !shared.shutdown && shared.generation == generation && shared.state == LinkState::Connected
    }

    /// Block until a reader is published or shutdown is requested.
    pub fn wait_for_reader(&self) -> Option<(u64, LinkStream)> {
        let mut shared = self.lock();
        loop {
            if shared.shutdown {
                return None;
            }
            if let Some(reader) = shared.reader.take() {
                return Some((shared.generation, reader));
            }
            shared = self
                .changed
                .wait(shared)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn request_shutdown(&self) {
        let mut shared = self.lock();
        shared.shutdown = true;
        shared.reader = None;
        self.changed.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Run `enqueue` unless the intake is closed. The gate stays held while
    /// `enqueue` blocks on a full inbox.
    pub fn admit<T>(&self, enqueue: impl FnOnce() -> T) -> Option<T> {
        let open = self.intake.read().unwrap_or_else(PoisonError::into_inner);
        if *open {
            Some(enqueue())
        } else {
            None
        }
    }

    /// Close the intake if no request is being admitted right now.
    pub fn try_close_intake(&self) -> bool {
        let mut open = match self.intake.try_write() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        *open = false;
        true
    }
}
