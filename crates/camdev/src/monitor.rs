//! Background watch over the control-privilege register.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::device::Device;

/// Control channel privilege register.
pub const CCP_REGISTER: u32 = 0x0A00;
/// Bits of [`CCP_REGISTER`] set while the host holds control.
pub const CCP_CONTROL_MASK: u32 = 0x0000_0003;

/// Monitor tunables.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between two register polls.
    pub interval: Duration,
    /// Consecutive failed reads treated as a lost connection.
    pub max_failures: u32,
    pub register: u32,
    pub mask: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_failures: 3,
            register: CCP_REGISTER,
            mask: CCP_CONTROL_MASK,
        }
    }
}

/// Task polling a device and firing its control-lost notifier once when the
/// privilege is gone or the device stops answering.
#[derive(Debug)]
pub struct ControlMonitor {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ControlMonitor {
    /// Start monitoring on the current tokio runtime. Dropping the monitor
    /// also ends the task.
    pub fn spawn<D>(device: Arc<D>, config: MonitorConfig) -> Self
    where
        D: Device + ?Sized + 'static,
    {
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(watch(device, config, stop_rx));
        Self { stop, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop polling and wait for the task to end.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(error = %err, "control monitor task failed");
        }
    }
}

async fn watch<D>(device: Arc<D>, config: MonitorConfig, mut stop: oneshot::Receiver<()>)
where
    D: Device + ?Sized + 'static,
{
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0u32;
    info!(register = config.register, interval = ?config.interval, "control monitor started");

    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!("control monitor stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        let polled = Arc::clone(&device);
        let register = config.register;
        let read = tokio::task::spawn_blocking(move || polled.read_register(register)).await;
        let outcome = match read {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };

        match outcome {
            Ok(value) if value & config.mask != 0 => failures = 0,
            Ok(value) => {
                warn!(value, "control privilege revoked");
                device.control_lost().emit();
                return;
            }
            Err(err) => {
                failures += 1;
                warn!(error = %err, failures, "control register poll failed");
                if failures >= config.max_failures {
                    device.control_lost().emit();
                    return;
                }
            }
        }
    }
}
