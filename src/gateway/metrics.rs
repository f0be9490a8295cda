//! Gateway metrics collection.
//!
//! Aggregate counters only; nothing here identifies a user, a
//! destination, or distinguishes a tunnel client from a probe beyond
//! the counts themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Gateway metrics collector.
pub struct GatewayMetrics {
    /// Gateway start time
    start_time: Instant,
    /// Total connections accepted
    total_connections: AtomicU64,
    /// Current active connections
    active_connections: AtomicU64,
    /// Handshakes that validated and started a relay
    relays_established: AtomicU64,
    /// Relays that ran to completion
    relays_completed: AtomicU64,
    /// First messages that failed validation (socket stays in decoy mode)
    decoy_fallbacks: AtomicU64,
    /// Relay attempts that failed to reach the upstream
    upstream_failures: AtomicU64,
}

impl GatewayMetrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            relays_established: AtomicU64::new(0),
            relays_completed: AtomicU64::new(0),
            decoy_fallbacks: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
        }
    }

    /// Increment total and active connections.
    pub fn increment_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connections.
    pub fn decrement_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a validated handshake.
    pub fn increment_relays_established(&self) {
        self.relays_established.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a relay that ran to completion.
    pub fn increment_relays_completed(&self) {
        self.relays_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a first message that failed validation.
    pub fn increment_decoy_fallbacks(&self) {
        self.decoy_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unreachable upstream.
    pub fn increment_upstream_failures(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get total connections.
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Get active connections.
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get validated handshakes.
    pub fn relays_established(&self) -> u64 {
        self.relays_established.load(Ordering::Relaxed)
    }

    /// Get completed relays.
    pub fn relays_completed(&self) -> u64 {
        self.relays_completed.load(Ordering::Relaxed)
    }

    /// Get decoy fallbacks.
    pub fn decoy_fallbacks(&self) -> u64 {
        self.decoy_fallbacks.load(Ordering::Relaxed)
    }

    /// Get upstream failures.
    pub fn upstream_failures(&self) -> u64 {
        self.upstream_failures.load(Ordering::Relaxed)
    }

    /// Format metrics as a simple text report.
    pub fn format_report(&self) -> String {
        format!(
            r#"Pulsefeed Gateway Metrics
=========================
Uptime: {} seconds

Connections:
  Total:  {}
  Active: {}

Handshakes:
  Relays Established: {}
  Relays Completed:   {}
  Decoy Fallbacks:    {}

Errors:
  Upstream Failures: {}
"#,
            self.uptime_secs(),
            self.total_connections(),
            self.active_connections(),
            self.relays_established(),
            self.relays_completed(),
            self.decoy_fallbacks(),
            self.upstream_failures(),
        )
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
