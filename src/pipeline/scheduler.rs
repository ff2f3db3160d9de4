//! Fixed-rate scheduler driving `Pipeline::tick` on a dedicated thread.
//!
//! One worker runs every tick, so ticks never overlap. The control side
//! shares the pipeline through a mutex: a single mutation goes through
//! [`Scheduler::with_pipeline`], a sequence of them goes between `stop()` and
//! `start()`. `stop()` joins the worker, so once it returns no tick is in
//! flight.
//!
//! Each iteration: tick, then wait for the rest of the period. The wait
//! blocks on the stop channel (so a stop request wakes it immediately) and
//! spins for the last `spin_threshold`. A tick that overruns its period is
//! counted and followed immediately by the next one; lost time is never
//! caught up.

use crate::config::SchedulerConfig;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::{Pipeline, TickReport};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Capacity of the event channel. Events are dropped when it is full.
const EVENT_CAPACITY: usize = 256;

/// Scheduler counters since construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    /// Ticks whose processing took longer than the target period.
    pub overruns: u64,
    /// Ticks that reported at least one node failure.
    pub failed_ticks: u64,
    /// Processing time of the most recent tick.
    pub last_tick: Duration,
    /// Mean time between consecutive tick starts.
    pub mean_interval: Duration,
}

/// Notifications from the worker to the host.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A tick finished with node failures.
    TickFailed(TickReport),
    /// Periodic statistics.
    Stats(SchedulerStats),
    /// The worker exited.
    Stopped,
}

/// State shared between the handle and the worker.
struct Shared {
    pipeline: Arc<Mutex<Pipeline>>,
    stats: Mutex<SchedulerStats>,
    running: AtomicBool,
    events: Sender<SchedulerEvent>,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    config: SchedulerConfig,
    event_rx: Receiver<SchedulerEvent>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, config: SchedulerConfig) -> PipelineResult<Self> {
        Self::with_shared(Arc::new(Mutex::new(pipeline)), config)
    }

    /// Drive a pipeline that is already shared with other owners.
    pub fn with_shared(
        pipeline: Arc<Mutex<Pipeline>>,
        config: SchedulerConfig,
    ) -> PipelineResult<Self> {
        config
            .validate()
            .map_err(|e| PipelineError::Scheduler(e.to_string()))?;
        let (events, event_rx) = bounded(EVENT_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                pipeline,
                stats: Mutex::new(SchedulerStats::default()),
                running: AtomicBool::new(false),
                events,
            }),
            config,
            event_rx,
            stop_tx: None,
            worker: None,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Shared handle to the pipeline.
    pub fn pipeline(&self) -> Arc<Mutex<Pipeline>> {
        Arc::clone(&self.shared.pipeline)
    }

    /// Receiver for worker events.
    pub fn events(&self) -> Receiver<SchedulerEvent> {
        self.event_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Start the worker. Returns `Ok(false)` if it is already running.
    pub fn start(&mut self) -> PipelineResult<bool> {
        if self.is_running() {
            return Ok(false);
        }
        // The worker may have exited on its own; reap it before restarting.
        self.join_worker()?;

        let (stop_tx, stop_rx) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        shared.running.store(true, Ordering::SeqCst);

        let worker = std::thread::Builder::new()
            .name("neurochain-scheduler".to_string())
            .spawn(move || run(&shared, &config, &stop_rx))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::SeqCst);
                PipelineError::Scheduler(format!("failed to spawn worker: {e}"))
            })?;

        self.stop_tx = Some(stop_tx);
        self.worker = Some(worker);
        tracing::info!("Scheduler started at {} Hz", self.config.tick_rate_hz);
        Ok(true)
    }

    /// Stop the worker and wait for it to exit, including any in-flight tick.
    /// Returns `Ok(false)` if it was not running.
    pub fn stop(&mut self) -> PipelineResult<bool> {
        if self.worker.is_none() {
            return Ok(false);
        }
        let was_running = self.shared.running.swap(false, Ordering::SeqCst);
        if let Some(stop_tx) = self.stop_tx.take() {
            // The worker may already be gone; either way it will not tick again.
            let _ = stop_tx.try_send(());
        }
        self.join_worker()?;
        tracing::info!("Scheduler stopped");
        Ok(was_running)
    }

    fn join_worker(&mut self) -> PipelineResult<()> {
        self.stop_tx = None;
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| PipelineError::Scheduler("worker thread panicked".to_string())),
            None => Ok(()),
        }
    }

    /// Run `f` with exclusive access to the pipeline, between two ticks.
    pub fn with_pipeline<R>(&self, f: impl FnOnce(&mut Pipeline) -> R) -> PipelineResult<R> {
        let mut pipeline = lock(&self.shared.pipeline)?;
        Ok(f(&mut pipeline))
    }

    pub fn stats(&self) -> PipelineResult<SchedulerStats> {
        Ok(lock(&self.shared.stats)?.clone())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Scheduler did not stop cleanly: {}", e);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> PipelineResult<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| PipelineError::Scheduler("lock poisoned".to_string()))
}

/// Worker loop.
fn run(shared: &Shared, config: &SchedulerConfig, stop_rx: &Receiver<()>) {
    let period = config.period();
    let spin = config.spin_threshold();
    let stats_interval = config.stats_interval();

    let mut last_start: Option<Instant> = None;
    let mut interval_total = Duration::ZERO;
    let mut intervals: u32 = 0;
    let mut last_stats = Instant::now();

    tracing::debug!("Scheduler worker running, period {:?}", period);

    while shared.running.load(Ordering::SeqCst) {
        let tick_start = Instant::now();
        if let Some(prev) = last_start {
            interval_total += tick_start.duration_since(prev);
            intervals = intervals.saturating_add(1);
        }
        last_start = Some(tick_start);

        let report = match lock(&shared.pipeline) {
            Ok(mut pipeline) => pipeline.tick(),
            Err(e) => {
                tracing::error!("Scheduler worker exiting: {}", e);
                break;
            }
        };
        let elapsed = tick_start.elapsed();
        let overrun = elapsed >= period;

        let snapshot = match lock(&shared.stats) {
            Ok(mut stats) => {
                stats.ticks += 1;
                stats.last_tick = elapsed;
                if overrun {
                    stats.overruns += 1;
                }
                if !report.is_ok() {
                    stats.failed_ticks += 1;
                }
                if intervals > 0 {
                    stats.mean_interval = interval_total / intervals;
                }
                stats.clone()
            }
            Err(e) => {
                tracing::error!("Scheduler worker exiting: {}", e);
                break;
            }
        };

        if !report.is_ok() {
            let _ = shared.events.try_send(SchedulerEvent::TickFailed(report));
        }
        if last_stats.elapsed() >= stats_interval {
            let _ = shared.events.try_send(SchedulerEvent::Stats(snapshot));
            last_stats = Instant::now();
        }

        if overrun {
            tracing::warn!(
                "Tick took {:?}, exceeding the {:?} period",
                elapsed,
                period
            );
            match stop_rx.try_recv() {
                Err(TryRecvError::Empty) => continue,
                _ => break,
            }
        }

        // Sleep on the stop channel, then spin out the remainder.
        let deadline = tick_start + period;
        let coarse = deadline
            .saturating_duration_since(Instant::now())
            .saturating_sub(spin);
        if !coarse.is_zero() {
            match stop_rx.recv_timeout(coarse) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
        }
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    let _ = shared.events.try_send(SchedulerEvent::Stopped);
    tracing::debug!("Scheduler worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::nodes::SyntheticSource;

    fn pipeline() -> Pipeline {
        let mut pipeline = Pipeline::new();
        pipeline
            .set_source(SyntheticSource::new("test", 2, 100.0, 10))
            .unwrap();
        pipeline.initialize_all().unwrap();
        pipeline
    }

    #[test]
    fn test_zero_rate_rejected() {
        let config = SchedulerConfig::default().with_tick_rate(0);
        assert!(matches!(
            Scheduler::new(pipeline(), config),
            Err(PipelineError::Scheduler(_))
        ));
    }

    #[test]
    fn test_start_stop() {
        let mut scheduler =
            Scheduler::new(pipeline(), SchedulerConfig::default().with_tick_rate(200)).unwrap();
        assert!(!scheduler.stop().unwrap());
        assert!(scheduler.start().unwrap());
        assert!(!scheduler.start().unwrap());
        assert!(scheduler.is_running());

        std::thread::sleep(Duration::from_millis(50));
        assert!(scheduler.stop().unwrap());
        assert!(!scheduler.is_running());

        let ticks = scheduler.stats().unwrap().ticks;
        assert!(ticks > 0);
        let pipeline_ticks = scheduler.with_pipeline(|p| p.tick_count()).unwrap();
        assert_eq!(pipeline_ticks, ticks);
    }

    #[test]
    fn test_stop_emits_event() {
        let mut scheduler =
            Scheduler::new(pipeline(), SchedulerConfig::default().with_tick_rate(100)).unwrap();
        let events = scheduler.events();
        scheduler.start().unwrap();
        scheduler.stop().unwrap();
        let stopped = events
            .try_iter()
            .any(|e| matches!(e, SchedulerEvent::Stopped));
        assert!(stopped);
    }

    #[test]
    fn test_restart() {
        let mut scheduler =
            Scheduler::new(pipeline(), SchedulerConfig::default().with_tick_rate(500)).unwrap();
        scheduler.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        scheduler.stop().unwrap();
        let first = scheduler.stats().unwrap().ticks;

        assert!(scheduler.start().unwrap());
        std::thread::sleep(Duration::from_millis(20));
        scheduler.stop().unwrap();
        assert!(scheduler.stats().unwrap().ticks > first);
    }
}
