//! Acquisition streams: a worker thread pulling frames from a
//! [`FrameSource`] and handing them to a callback.
//!
//! A stream is `Running` as soon as it is returned. Closing it, explicitly or
//! by dropping it, stops the worker and waits for it, so the callback is never
//! invoked once [`Stream::close`] has returned.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::Frame;
use crate::stats::{StreamStats, StreamStatsAccumulator};

/// Callback receiving frames on the stream worker thread. Whatever the
/// closure captures plays the role of the caller's context.
pub type FrameCallback = Box<dyn FnMut(&Frame) + Send + 'static>;

const FAILURE_BACKOFF: Duration = Duration::from_millis(10);

/// Errors raised while creating or running a stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The device already runs a stream.
    #[error("device already has an open stream")]
    Busy,
    /// The worker did not report ready in time.
    #[error("stream did not become ready within {0:?}")]
    StartTimeout(Duration),
    /// The frame source cannot produce frames anymore.
    #[error("frame source disconnected")]
    Disconnected,
    /// A single acquisition attempt failed.
    #[error("frame source: {0}")]
    Source(String),
    /// The worker thread could not be created.
    #[error("failed to spawn stream worker: {0}")]
    Spawn(String),
}

/// Producer of frames driven by the stream worker.
pub trait FrameSource: Send + 'static {
    /// Prepare acquisition. Runs on the worker before the stream is reported
    /// ready.
    fn start(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    /// Wait for the next frame. `Ok(None)` means nothing arrived yet;
    /// implementations should return promptly once `stop` is signalled.
    /// [`StreamError::Disconnected`] ends the stream, other errors are counted
    /// and acquisition continues.
    fn next_frame(&mut self, stop: &StopSignal) -> Result<Option<Frame>, StreamError>;

    /// Release acquisition resources. Runs on the worker before it exits.
    fn stop(&mut self) {}
}

/// Stop flag the worker can sleep on.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stop(&self) {
        *self.lock() = true;
        self.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.lock()
    }

    /// Sleep for at most `timeout`. Returns `true` when stop was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Stream lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Created,
    Running,
    Closed,
}

/// Stream tunables.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Upper bound on the start handshake.
    pub start_timeout: Duration,
    /// Name given to the worker thread.
    pub thread_name: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(2),
            thread_name: "camdev-stream".to_string(),
        }
    }
}

#[derive(Debug)]
struct Shared {
    stop: StopSignal,
    stats: StreamStatsAccumulator,
    state: Mutex<StreamState>,
}

impl Shared {
    fn set_state(&self, state: StreamState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn state(&self) -> StreamState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Running acquisition channel.
#[derive(Debug)]
pub struct Stream {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Stream {
    /// Spawn the worker and wait for `source` to start.
    pub fn start<S: FrameSource>(
        source: S,
        callback: FrameCallback,
        config: &StreamConfig,
    ) -> Result<Stream, StreamError> {
        let shared = Arc::new(Shared {
            stop: StopSignal::new(),
            stats: StreamStatsAccumulator::new(),
            state: Mutex::new(StreamState::Created),
        });
        let (ready_tx, ready_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel();

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run_worker(source, callback, worker_shared, ready_tx, go_rx))
            .map_err(|err| StreamError::Spawn(err.to_string()))?;

        match ready_rx.recv_timeout(config.start_timeout) {
            Ok(Ok(())) => {
                shared.set_state(StreamState::Running);
                // A failed send means the worker already exited; close() copes.
                let _ = go_tx.send(());
                info!(thread = %config.thread_name, "stream started");
                Ok(Stream {
                    shared,
                    worker: Some(worker),
                })
            }
            Ok(Err(err)) => {
                shared.set_state(StreamState::Closed);
                let _ = worker.join();
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => {
                // The source may still be blocked in start(); leave the worker
                // detached, it exits as soon as start() returns.
                shared.stop.stop();
                shared.set_state(StreamState::Closed);
                warn!(timeout = ?config.start_timeout, "stream start timed out");
                Err(StreamError::StartTimeout(config.start_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                shared.set_state(StreamState::Closed);
                let _ = worker.join();
                Err(StreamError::Source(
                    "stream worker exited before reporting ready".to_string(),
                ))
            }
        }
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    /// Whether the worker has exited, e.g. after its source disconnected.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, JoinHandle::is_finished)
    }

    pub fn stats(&self) -> StreamStats {
        self.shared.stats.snapshot()
    }

    /// Stop the worker and wait until it is gone. Idempotent.
    ///
    /// When called from within the callback the worker cannot be joined; it
    /// exits right after the callback returns.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.stop.stop();
        if worker.thread().id() == thread::current().id() {
            debug!("stream closed from its own callback");
        } else if worker.join().is_err() {
            warn!("stream worker panicked");
        }
        self.shared.set_state(StreamState::Closed);
        let stats = self.shared.stats.snapshot();
        info!(
            frames = stats.frames,
            failures = stats.failures,
            "stream closed"
        );
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker<S: FrameSource>(
    mut source: S,
    mut callback: FrameCallback,
    shared: Arc<Shared>,
    ready: mpsc::Sender<Result<(), StreamError>>,
    go: mpsc::Receiver<()>,
) {
    if let Err(err) = source.start() {
        warn!(error = %err, "frame source failed to start");
        let _ = ready.send(Err(err));
        return;
    }
    // Both sends and receives fail once the creator gave up on the handshake.
    if ready.send(Ok(())).is_err() || go.recv().is_err() {
        source.stop();
        return;
    }
    drop(ready);

    while !shared.stop.is_stopped() {
        match source.next_frame(&shared.stop) {
            Ok(Some(frame)) => {
                if shared.stop.is_stopped() {
                    break;
                }
                shared.stats.record_frame(frame.len());
                callback(&frame);
            }
            Ok(None) => {}
            Err(StreamError::Disconnected) => {
                info!("frame source disconnected, stream ends");
                break;
            }
            Err(err) => {
                shared.stats.record_failure();
                warn!(error = %err, "frame acquisition failed");
                shared.stop.wait(FAILURE_BACKOFF);
            }
        }
    }
    source.stop();
    shared.set_state(StreamState::Closed);
    debug!("stream worker exited");
}
