//! Fixed-cadence polling engine.
//!
//! One blocking loop polls every sampler in fixed order, appends the
//! assembled record to the run's [`SampleLog`], and fans the record out to
//! broadcast subscribers. The loop is meant to run on the blocking pool
//! (`tokio::task::spawn_blocking`); cancellation arrives through a shared
//! atomic flag checked once per tick boundary, so a tick either completes
//! and is durably logged or never starts.
//!
//! Fault contract: `Communication` and `Protocol` errors are isolated at
//! the sampler boundary (channel marked degraded, fallback values
//! substituted, tick continues). Everything else, including any log write
//! failure, crashes the run; rows flushed before the crash survive.

use crate::core::{ChannelHealth, EngineState, MonitorEvent, MonitorEventReceiver, SampleRecord};
use crate::error::Result;
use crate::monitor::samplers::ChannelSampler;
use crate::storage::SampleLog;
use chrono::Utc;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Outcome of a completed (or stopped) run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub samples: u64,
    pub log_path: PathBuf,
}

pub struct MonitorEngine {
    samplers: Vec<Box<dyn ChannelSampler>>,
    tick: Duration,
    max_samples: Option<u64>,
    stop: Arc<AtomicBool>,
    events: broadcast::Sender<MonitorEvent>,
    health: Vec<ChannelHealth>,
    state: EngineState,
}

impl MonitorEngine {
    pub fn new(samplers: Vec<Box<dyn ChannelSampler>>, tick: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let health = vec![ChannelHealth::Healthy; samplers.len()];
        Self {
            samplers,
            tick,
            max_samples: None,
            stop: Arc::new(AtomicBool::new(false)),
            events,
            health,
            state: EngineState::Idle,
        }
    }

    /// Bounds the run to `max` samples; unbounded by default.
    pub fn with_max_samples(mut self, max: u64) -> Self {
        self.max_samples = Some(max);
        self
    }

    /// Shared cancel flag; setting it stops the run at the next tick
    /// boundary.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Subscribes to run events. Delivery is best-effort; a lagging
    /// receiver drops events, never the run.
    pub fn subscribe(&self) -> MonitorEventReceiver {
        self.events.subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Metric column order for this engine's sampler set.
    pub fn columns(&self) -> Vec<String> {
        self.samplers.iter().flat_map(|s| s.columns()).collect()
    }

    /// Runs the polling loop until the stop flag is set or the sample
    /// bound is reached. Consumes one log file at `log_path`.
    pub fn run(&mut self, log_path: impl AsRef<Path>) -> Result<RunSummary> {
        let columns = self.columns();
        let mut log = SampleLog::create(&log_path, &columns)?;
        self.state = EngineState::Running;
        info!(
            "run started: {} channels, {} columns, tick {:?}, log {}",
            self.samplers.len(),
            columns.len(),
            self.tick,
            log.path().display()
        );
        let _ = self.events.send(MonitorEvent::RunStarted {
            columns: columns.clone(),
        });

        let mut index: u64 = 0;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                self.state = EngineState::Stopping;
                break;
            }
            if self.max_samples.is_some_and(|max| index >= max) {
                break;
            }
            let tick_started = Instant::now();

            let mut fields = Vec::with_capacity(columns.len());
            for slot in 0..self.samplers.len() {
                match self.samplers[slot].sample() {
                    Ok(values) => {
                        fields.extend(values);
                        self.transition(slot, ChannelHealth::Healthy);
                    }
                    Err(e) if e.is_channel_isolated() => {
                        warn!(
                            "channel '{}' failed on sample {}: {}",
                            self.samplers[slot].name(),
                            index,
                            e
                        );
                        fields.extend(self.samplers[slot].fallback());
                        self.transition(slot, ChannelHealth::Degraded(e.to_string()));
                    }
                    Err(e) => {
                        self.state = EngineState::Crashed;
                        return Err(e);
                    }
                }
            }

            let record = SampleRecord {
                index,
                timestamp: Utc::now(),
                fields,
            };
            if let Err(e) = log.append(&record) {
                self.state = EngineState::Crashed;
                return Err(e);
            }
            debug!("sample {} appended", index);
            let _ = self.events.send(MonitorEvent::Sample(record));
            index += 1;

            std::thread::sleep(self.tick.saturating_sub(tick_started.elapsed()));
        }

        self.state = EngineState::Idle;
        info!("run finished after {} samples", index);
        let _ = self.events.send(MonitorEvent::RunFinished { samples: index });
        Ok(RunSummary {
            samples: index,
            log_path: log.path().to_path_buf(),
        })
    }

    /// Records a health transition and broadcasts it, edge-triggered.
    fn transition(&mut self, slot: usize, health: ChannelHealth) {
        if self.health[slot] == health {
            return;
        }
        if matches!(
            (&self.health[slot], &health),
            (ChannelHealth::Degraded(_), ChannelHealth::Healthy)
        ) {
            info!("channel '{}' recovered", self.samplers[slot].name());
        }
        self.health[slot] = health.clone();
        let _ = self.events.send(MonitorEvent::ChannelStatus {
            channel: self.samplers[slot].name(),
            health,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaqError;

    /// Scripted sampler: fails with the given error kind on a fixed set of
    /// sample indices, succeeds otherwise.
    struct ScriptedSampler {
        name: String,
        columns: Vec<String>,
        calls: u64,
        fail_on: Vec<u64>,
        isolated: bool,
    }

    impl ScriptedSampler {
        fn healthy(name: &str, columns: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
                calls: 0,
                fail_on: Vec::new(),
                isolated: true,
            }
        }

        fn failing_on(mut self, ticks: &[u64]) -> Self {
            self.fail_on = ticks.to_vec();
            self
        }

        fn fatal(mut self) -> Self {
            self.isolated = false;
            self
        }
    }

    impl ChannelSampler for ScriptedSampler {
        fn name(&self) -> String {
            self.name.clone()
        }

        fn columns(&self) -> Vec<String> {
            self.columns.clone()
        }

        fn sample(&mut self) -> Result<Vec<Option<f64>>> {
            let tick = self.calls;
            self.calls += 1;
            if self.fail_on.contains(&tick) {
                return Err(if self.isolated {
                    DaqError::Communication(self.name.clone())
                } else {
                    DaqError::InvalidCommand(self.name.clone())
                });
            }
            Ok(self.columns.iter().map(|_| Some(tick as f64)).collect())
        }
    }

    fn tick() -> Duration {
        Duration::from_millis(1)
    }

    fn log_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("run.csv")
    }

    #[test]
    fn test_indices_are_monotonic_and_gapless() {
        let dir = tempfile::tempdir().unwrap();
        let samplers: Vec<Box<dyn ChannelSampler>> =
            vec![Box::new(ScriptedSampler::healthy("a", &["a"]))];
        let mut engine = MonitorEngine::new(samplers, tick()).with_max_samples(5);
        let mut events = engine.subscribe();

        let summary = engine.run(log_path(&dir)).unwrap();
        assert_eq!(summary.samples, 5);
        assert_eq!(engine.state(), EngineState::Idle);

        let mut expected = 0u64;
        while let Ok(event) = events.try_recv() {
            if let MonitorEvent::Sample(record) = event {
                assert_eq!(record.index, expected);
                expected += 1;
            }
        }
        assert_eq!(expected, 5);
    }

    #[test]
    fn test_isolated_failure_degrades_channel_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let samplers: Vec<Box<dyn ChannelSampler>> = vec![
            Box::new(ScriptedSampler::healthy("a", &["a"])),
            Box::new(ScriptedSampler::healthy("b", &["b"]).failing_on(&[1, 2])),
        ];
        let mut engine = MonitorEngine::new(samplers, tick()).with_max_samples(4);
        let mut events = engine.subscribe();

        let summary = engine.run(log_path(&dir)).unwrap();
        assert_eq!(summary.samples, 4);

        let mut records = Vec::new();
        let mut transitions = Vec::new();
        while let Ok(event) = events.try_recv() {
            match event {
                MonitorEvent::Sample(r) => records.push(r),
                MonitorEvent::ChannelStatus { channel, health } => {
                    transitions.push((channel, health))
                }
                _ => {}
            }
        }
        // Failed ticks carry the fallback sentinel in channel b only.
        assert_eq!(records[0].fields, vec![Some(0.0), Some(0.0)]);
        assert_eq!(records[1].fields, vec![Some(1.0), None]);
        assert_eq!(records[2].fields, vec![Some(2.0), None]);
        assert_eq!(records[3].fields, vec![Some(3.0), Some(3.0)]);
        // Health is edge-triggered: degraded once, recovered once.
        assert_eq!(transitions.len(), 2);
        assert!(matches!(transitions[0].1, ChannelHealth::Degraded(_)));
        assert_eq!(transitions[1].1, ChannelHealth::Healthy);
    }

    #[test]
    fn test_non_isolated_failure_crashes_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let samplers: Vec<Box<dyn ChannelSampler>> = vec![Box::new(
            ScriptedSampler::healthy("a", &["a"]).failing_on(&[2]).fatal(),
        )];
        let mut engine = MonitorEngine::new(samplers, tick()).with_max_samples(10);

        let err = engine.run(log_path(&dir)).unwrap_err();
        assert!(matches!(err, DaqError::InvalidCommand(_)));
        assert_eq!(engine.state(), EngineState::Crashed);

        // The two rows appended before the crash survive.
        let contents = std::fs::read_to_string(log_path(&dir)).unwrap();
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn test_stop_flag_checked_at_tick_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let samplers: Vec<Box<dyn ChannelSampler>> =
            vec![Box::new(ScriptedSampler::healthy("a", &["a"]))];
        let mut engine = MonitorEngine::new(samplers, Duration::from_millis(20));
        let stop = engine.stop_flag();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stop.store(true, Ordering::SeqCst);
        });
        let summary = engine.run(log_path(&dir)).unwrap();
        handle.join().unwrap();

        assert!(summary.samples >= 1);
        assert_eq!(engine.state(), EngineState::Idle);
        // Every appended sample is complete: header + exactly `samples` rows.
        let contents = std::fs::read_to_string(log_path(&dir)).unwrap();
        assert_eq!(contents.lines().count() as u64, summary.samples + 1);
    }

    #[test]
    fn test_existing_log_aborts_before_polling() {
        let dir = tempfile::tempdir().unwrap();
        let path = log_path(&dir);
        std::fs::write(&path, "old run\n").unwrap();
        let samplers: Vec<Box<dyn ChannelSampler>> =
            vec![Box::new(ScriptedSampler::healthy("a", &["a"]))];
        let mut engine = MonitorEngine::new(samplers, tick()).with_max_samples(1);

        assert!(matches!(
            engine.run(&path).unwrap_err(),
            DaqError::LogExists(_)
        ));
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old run\n");
    }
}
