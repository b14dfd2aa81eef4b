//! Lazy association load tracking.
//!
//! Loading N records and then touching an association on each issues N+1
//! queries. The session records every lazy association load here and warns
//! once a single association of a single class has been loaded `threshold`
//! times.
//!
//! ```ignore
//! for client in &mut clients {
//!     session.belongs_to(client, "firm")?.get(false)?; // one query each
//! }
//! // warn: lazy load pattern detected, parent=Client association=firm
//! ```

use std::collections::HashMap;

/// Tracing target for lazy load warnings.
pub const LAZY_LOAD_TARGET: &str = "sqlrecord::n1";

/// Where a lazy load was triggered.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// The owning class name
    pub parent_type: String,
    /// The association name
    pub association: String,
    /// Source file where the load was triggered
    pub file: &'static str,
    /// Line number in the source file
    pub line: u32,
    /// When the load occurred
    pub timestamp: std::time::Instant,
}

/// Statistics about lazy loads.
#[derive(Debug, Clone, Default)]
pub struct LazyLoadStats {
    /// Total number of lazy loads recorded
    pub total_loads: usize,
    /// Number of distinct associations loaded
    pub associations_loaded: usize,
    /// Number of associations that reached the threshold
    pub potential_n1: usize,
}

/// Tracks lazy association loads.
#[derive(Debug)]
pub struct LazyLoadTracker {
    counts: HashMap<(String, String), usize>,
    threshold: usize,
    call_sites: Vec<CallSite>,
}

impl Default for LazyLoadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LazyLoadTracker {
    /// Create a tracker with the default threshold (3).
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            call_sites: Vec::new(),
        }
    }

    /// Set the threshold; zero disables tracking.
    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Current threshold.
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether tracking is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.threshold > 0
    }

    /// Record a lazy load of `association` on a `parent_type` record.
    #[track_caller]
    pub fn record_load(&mut self, parent_type: &str, association: &str) {
        if !self.is_enabled() {
            return;
        }

        let count = self
            .counts
            .entry((parent_type.to_string(), association.to_string()))
            .or_insert(0);
        *count += 1;
        let count = *count;

        let caller = std::panic::Location::caller();
        self.call_sites.push(CallSite {
            parent_type: parent_type.to_string(),
            association: association.to_string(),
            file: caller.file(),
            line: caller.line(),
            timestamp: std::time::Instant::now(),
        });

        if count == self.threshold {
            self.emit_warning(parent_type, association, count);
        }
    }

    fn emit_warning(&self, parent_type: &str, association: &str, count: usize) {
        tracing::warn!(
            target: LAZY_LOAD_TARGET,
            parent = parent_type,
            association = association,
            queries = count,
            threshold = self.threshold,
            "lazy load pattern detected; load the association once with a join or finder_sql"
        );

        for (i, site) in self
            .call_sites
            .iter()
            .filter(|s| s.parent_type == parent_type && s.association == association)
            .take(5)
            .enumerate()
        {
            tracing::debug!(
                target: LAZY_LOAD_TARGET,
                index = i,
                file = site.file,
                line = site.line,
                "  [{}] {}:{}",
                i,
                site.file,
                site.line
            );
        }
    }

    /// Reset all counts and call sites.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.call_sites.clear();
    }

    /// Loads recorded for one association.
    #[must_use]
    pub fn count_for(&self, parent_type: &str, association: &str) -> usize {
        self.counts
            .get(&(parent_type.to_string(), association.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Aggregate statistics.
    #[must_use]
    pub fn stats(&self) -> LazyLoadStats {
        LazyLoadStats {
            total_loads: self.counts.values().sum(),
            associations_loaded: self.counts.len(),
            potential_n1: self
                .counts
                .values()
                .filter(|c| **c >= self.threshold)
                .count(),
        }
    }

    /// All call sites (for debugging).
    #[must_use]
    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }
}
