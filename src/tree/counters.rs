//! Allocation accounting for the native layer.
//!
//! Every node slot, evaluation context and result object the native layer
//! hands out is counted here when created and again when freed. A document
//! that tore down cleanly leaves a balanced snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared allocation counters for one tree and the query objects bound to it.
///
/// Held behind an `Arc` so a test can keep observing the counts after the
/// owning document has been torn down.
#[derive(Debug, Default)]
pub struct AllocCounters {
    nodes_allocated: AtomicU64,
    nodes_freed: AtomicU64,
    double_frees: AtomicU64,
    dangling_swept: AtomicU64,
    contexts_created: AtomicU64,
    contexts_freed: AtomicU64,
    results_created: AtomicU64,
    results_freed: AtomicU64,
}

impl AllocCounters {
    pub(crate) fn node_allocated(&self) {
        self.nodes_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn nodes_freed(&self, count: usize) {
        self.nodes_freed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn double_free_attempted(&self) {
        self.double_frees.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dangling_swept(&self, count: usize) {
        self.dangling_swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn context_created(&self) {
        self.contexts_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn context_freed(&self) {
        self.contexts_freed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn result_created(&self) {
        self.results_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn result_freed(&self) {
        self.results_freed.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            nodes_allocated: self.nodes_allocated.load(Ordering::Relaxed),
            nodes_freed: self.nodes_freed.load(Ordering::Relaxed),
            double_frees: self.double_frees.load(Ordering::Relaxed),
            dangling_swept: self.dangling_swept.load(Ordering::Relaxed),
            contexts_created: self.contexts_created.load(Ordering::Relaxed),
            contexts_freed: self.contexts_freed.load(Ordering::Relaxed),
            results_created: self.results_created.load(Ordering::Relaxed),
            results_freed: self.results_freed.load(Ordering::Relaxed),
        }
    }
}

/// A copy of [`AllocCounters`] at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    /// Node slots handed out.
    pub nodes_allocated: u64,
    /// Node slots freed, including swept dangling nodes.
    pub nodes_freed: u64,
    /// Frees refused because the slot was already freed.
    pub double_frees: u64,
    /// Unreachable, untracked nodes reclaimed by the final sweep.
    pub dangling_swept: u64,
    /// Evaluation contexts created.
    pub contexts_created: u64,
    /// Evaluation contexts freed.
    pub contexts_freed: u64,
    /// Query result objects created.
    pub results_created: u64,
    /// Query result objects freed.
    pub results_freed: u64,
}

impl CounterSnapshot {
    /// Node slots allocated but not yet freed.
    #[must_use]
    pub fn live_nodes(&self) -> u64 {
        self.nodes_allocated.saturating_sub(self.nodes_freed)
    }

    /// Result objects created but not yet freed.
    #[must_use]
    pub fn live_results(&self) -> u64 {
        self.results_created.saturating_sub(self.results_freed)
    }

    /// True when every allocation was matched by exactly one free and no
    /// double free was attempted.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.nodes_allocated == self.nodes_freed
            && self.contexts_created == self.contexts_freed
            && self.results_created == self.results_freed
            && self.double_frees == 0
    }
}
