//! Streaming statistics.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const EWMA_ALPHA: f64 = 0.2;

/// Immutable view of stream statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamStats {
    /// Frames handed to the callback.
    pub frames: u64,
    /// Payload bytes handed to the callback.
    pub bytes: u64,
    /// Acquisition attempts that failed.
    pub failures: u64,
    pub last_frame_dt: Duration,
    pub avg_fps: f64,
    pub elapsed: Duration,
}

impl Default for StreamStats {
    fn default() -> Self {
        StreamStats {
            frames: 0,
            bytes: 0,
            failures: 0,
            last_frame_dt: Duration::ZERO,
            avg_fps: 0.0,
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
struct StatsState {
    frames: u64,
    bytes: u64,
    failures: u64,
    last_frame_dt: Duration,
    avg_fps: f64,
    last_frame_instant: Option<Instant>,
    start: Instant,
}

/// Shared accumulator updated by the stream worker.
#[derive(Debug, Clone)]
pub struct StreamStatsAccumulator {
    state: Arc<Mutex<StatsState>>,
}

impl StreamStatsAccumulator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StatsState {
                frames: 0,
                bytes: 0,
                failures: 0,
                last_frame_dt: Duration::ZERO,
                avg_fps: 0.0,
                last_frame_instant: None,
                start: Instant::now(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update metrics for a delivered frame.
    pub fn record_frame(&self, bytes: usize) {
        let now = Instant::now();
        let mut state = self.lock();
        state.frames += 1;
        state.bytes += bytes as u64;

        if let Some(prev) = state.last_frame_instant.replace(now) {
            let dt = now.saturating_duration_since(prev);
            if dt > Duration::ZERO {
                state.last_frame_dt = dt;
                let fps = 1.0 / dt.as_secs_f64();
                state.avg_fps = if state.avg_fps == 0.0 {
                    fps
                } else {
                    state.avg_fps + EWMA_ALPHA * (fps - state.avg_fps)
                };
            }
        }
    }

    /// Record a failed acquisition attempt.
    pub fn record_failure(&self) {
        self.lock().failures += 1;
    }

    pub fn snapshot(&self) -> StreamStats {
        let state = self.lock();
        StreamStats {
            frames: state.frames,
            bytes: state.bytes,
            failures: state.failures,
            last_frame_dt: state.last_frame_dt,
            avg_fps: state.avg_fps,
            elapsed: state.start.elapsed(),
        }
    }
}

impl Default for StreamStatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn counts_frames_and_failures() {
        let stats = StreamStatsAccumulator::new();
        stats.record_frame(100);
        thread::sleep(Duration::from_millis(5));
        stats.record_frame(50);
        stats.record_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.bytes, 150);
        assert_eq!(snapshot.failures, 1);
        assert!(snapshot.last_frame_dt >= Duration::from_millis(5));
        assert!(snapshot.avg_fps > 0.0);
    }

    #[test]
    fn clones_share_state() {
        let stats = StreamStatsAccumulator::new();
        let worker = stats.clone();
        worker.record_frame(8);
        assert_eq!(stats.snapshot().frames, 1);
        assert_eq!(StreamStats::default().frames, 0);
    }
}
