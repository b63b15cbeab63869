//! Control-lost event broadcast.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 16;

/// Handle returned by [`ControlLostNotifier::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event delivered to async subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlLost;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Thread-safe registry of control-lost listeners.
///
/// Listeners run on whichever thread calls [`emit`](Self::emit), outside the
/// registry lock, so they may connect or disconnect listeners themselves.
pub struct ControlLostNotifier {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    emitted: AtomicU64,
    sender: broadcast::Sender<ControlLost>,
}

impl ControlLostNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            emitted: AtomicU64::new(0),
            sender,
        }
    }

    /// Register a listener invoked on every emission.
    pub fn connect<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        debug!(listener = id.0, "control-lost listener connected");
        id
    }

    /// Remove a listener. Returns `false` when the id is unknown.
    pub fn disconnect(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Receiver for async consumers. Events emitted before subscribing are
    /// not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ControlLost> {
        self.sender.subscribe()
    }

    /// Number of emissions so far.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Fire the event. With no listeners and no subscribers this does nothing.
    pub fn emit(&self) {
        let snapshot: Vec<Listener> = self
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        self.emitted.fetch_add(1, Ordering::Relaxed);
        info!(listeners = snapshot.len(), "control lost");
        for listener in snapshot {
            listener();
        }
        // No receivers is not an error.
        let _ = self.sender.send(ControlLost);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ControlLostNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ControlLostNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlLostNotifier")
            .field("listeners", &self.listener_count())
            .field("emitted", &self.emitted())
            .finish()
    }
}
