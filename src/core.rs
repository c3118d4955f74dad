//! Core data types shared across the acquisition system.
//!
//! Everything here is plain data owned by the monitor engine and handed to
//! subscribers by value: there is no inheritance from any UI layer, and the
//! GUI/test-harness side of the world only ever sees clones delivered over
//! a broadcast channel.
//!
//! # Data Flow
//!
//! ```text
//! MonitorEngine --[MonitorEvent]--> broadcast::channel ---> GUI/log panel/tests
//!                \--[SampleRecord]--> SampleLog (owned, serialized, flushed)
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;

/// One assembled polling tick.
///
/// `fields` holds one entry per metric column, in the fixed column order
/// announced by [`MonitorEvent::RunStarted`]. `None` is the explicit missing
/// sentinel used for disabled channels and for failed channels without a
/// substitute value; it serializes as an empty token so the column count is
/// constant across all rows.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleRecord {
    /// Monotonic sample index, starting at 0, +1 per tick, no gaps.
    pub index: u64,
    /// Wall-clock timestamp taken when the tick's polling completed.
    pub timestamp: DateTime<Utc>,
    /// One value per metric column; `None` means missing.
    pub fields: Vec<Option<f64>>,
}

/// Per-channel health, re-evaluated every tick. Not persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelHealth {
    Healthy,
    /// The last read failed; carries the error text for diagnostics.
    Degraded(String),
}

/// Engine lifecycle state.
///
/// `Idle -> Running -> (Stopping | Crashed) -> Idle`; `Crashed` is reached
/// only through errors outside the per-channel isolation contract (e.g. a
/// log write failure). Data flushed before the crash is preserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
    Crashed,
}

/// One-way notifications emitted by the engine.
///
/// Delivery is best-effort: a lagging or absent subscriber never blocks or
/// fails the polling loop.
#[derive(Clone, Debug)]
pub enum MonitorEvent {
    /// A run has started; announces the metric column order for the run.
    RunStarted { columns: Vec<String> },
    /// A tick completed and its record was durably appended.
    Sample(SampleRecord),
    /// A channel changed health.
    ChannelStatus {
        channel: String,
        health: ChannelHealth,
    },
    /// The run ended normally (stop signal or max sample count).
    RunFinished { samples: u64 },
}

/// Subscriber end of the engine's event stream.
pub type MonitorEventReceiver = broadcast::Receiver<MonitorEvent>;

/// Retry discipline for one instrument round-trip.
///
/// A failed frame exchange is retried up to `attempts` times with `delay`
/// between attempts before the operation is classified as a failure for
/// that tick. The bound and delay are part of the device contract, not
/// incidental; tests shorten the delay but keep the bound.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Contractual retry bound.
    pub const DEFAULT_ATTEMPTS: u32 = 20;
    /// Contractual inter-attempt delay.
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: Self::DEFAULT_ATTEMPTS,
            delay: Self::DEFAULT_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_contract() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 20);
        assert_eq!(policy.delay, Duration::from_millis(100));
    }

    #[test]
    fn test_sample_record_missing_sentinel() {
        let record = SampleRecord {
            index: 0,
            timestamp: Utc::now(),
            fields: vec![Some(23.5), None, Some(1010.0)],
        };
        assert_eq!(record.fields.len(), 3);
        assert!(record.fields[1].is_none());
    }
}
