//! Per-document operation profile.
//!
//! Every public [`Document`](super::Document) operation that touches the tree
//! is timed and counted under a static operation name. The profile belongs
//! to the document and is logged once at teardown.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Call count and cumulative time for one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpStats {
    pub count: u64,
    pub total: Duration,
}

impl OpStats {
    /// Average time per call, or zero when never called.
    #[must_use]
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total / u32::try_from(self.count).unwrap_or(u32::MAX)
    }
}

/// Operation name to [`OpStats`].
#[derive(Debug, Clone, Default)]
pub struct OpProfile {
    ops: HashMap<&'static str, OpStats>,
}

impl OpProfile {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one call of `op` that took `elapsed`.
    pub fn record(&mut self, op: &'static str, elapsed: Duration) {
        let stats = self.ops.entry(op).or_default();
        stats.count += 1;
        stats.total += elapsed;
    }

    /// Runs `f` and records it under `op`.
    pub fn time<T>(&mut self, op: &'static str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.record(op, started.elapsed());
        out
    }

    #[must_use]
    pub fn get(&self, op: &str) -> Option<OpStats> {
        self.ops.get(op).copied()
    }

    /// All recorded operations, sorted by name.
    #[must_use]
    pub fn entries(&self) -> Vec<(&'static str, OpStats)> {
        let mut entries: Vec<_> = self.ops.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        entries
    }

    /// Sum of all call counts.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.ops.values().map(|s| s.count).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl fmt::Display for OpProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, stats) in self.entries() {
            writeln!(
                f,
                "{name:<20} {:>8} calls {:>12} us",
                stats.count,
                stats.total.as_micros()
            )?;
        }
        Ok(())
    }
}
