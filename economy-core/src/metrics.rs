//! Metrics collection for observability
//!
//! Prometheus metrics in a registry owned by each engine, so several engines
//! can live in one process.
//!
//! # Metrics
//!
//! - `economy_accounts_created_total` - Accounts created
//! - `economy_energy_spent_total` - Energy points consumed
//! - `economy_tap_batches_total{outcome}` - Tap batches by outcome
//! - `economy_cycles_completed_total` - Tap cycles completed
//! - `economy_rewards_credited_total{source}` - Reward credits by source
//! - `economy_withdrawals_total{status}` - Withdrawals created and resolved
//! - `economy_rejected_operations_total{kind}` - Failed operations by error kind
//! - `economy_mutation_duration_seconds` - Latency of committed operations
//! - `economy_accounts_estimate` - Estimated account count

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Accounts created
    pub accounts_created: IntCounter,

    /// Energy points consumed
    pub energy_spent: IntCounter,

    /// Tap batches by outcome (applied, duplicate, cooldown)
    pub tap_batches: IntCounterVec,

    /// Tap cycles completed
    pub cycles_completed: IntCounter,

    /// Reward credits by source (task, daily, referral, game)
    pub rewards_credited: IntCounterVec,

    /// Withdrawals by status (pending on creation, then approved or rejected)
    pub withdrawals: IntCounterVec,

    /// Failed operations by error kind
    pub rejected_operations: IntCounterVec,

    /// Operation latency
    pub mutation_duration: Histogram,

    /// Estimated account count
    pub accounts_estimate: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("accounts_created", &self.accounts_created.get())
            .field("cycles_completed", &self.cycles_completed.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let accounts_created = IntCounter::new(
            "economy_accounts_created_total",
            "Accounts created",
        )?;
        registry.register(Box::new(accounts_created.clone()))?;

        let energy_spent = IntCounter::new(
            "economy_energy_spent_total",
            "Energy points consumed",
        )?;
        registry.register(Box::new(energy_spent.clone()))?;

        let tap_batches = IntCounterVec::new(
            Opts::new("economy_tap_batches_total", "Tap batches by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(tap_batches.clone()))?;

        let cycles_completed = IntCounter::new(
            "economy_cycles_completed_total",
            "Tap cycles completed",
        )?;
        registry.register(Box::new(cycles_completed.clone()))?;

        let rewards_credited = IntCounterVec::new(
            Opts::new("economy_rewards_credited_total", "Reward credits by source"),
            &["source"],
        )?;
        registry.register(Box::new(rewards_credited.clone()))?;

        let withdrawals = IntCounterVec::new(
            Opts::new("economy_withdrawals_total", "Withdrawals by status"),
            &["status"],
        )?;
        registry.register(Box::new(withdrawals.clone()))?;

        let rejected_operations = IntCounterVec::new(
            Opts::new(
                "economy_rejected_operations_total",
                "Failed operations by error kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(rejected_operations.clone()))?;

        let mutation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "economy_mutation_duration_seconds",
                "Latency of committed operations",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(mutation_duration.clone()))?;

        let accounts_estimate = IntGauge::new(
            "economy_accounts_estimate",
            "Estimated account count",
        )?;
        registry.register(Box::new(accounts_estimate.clone()))?;

        Ok(Self {
            accounts_created,
            energy_spent,
            tap_batches,
            cycles_completed,
            rewards_credited,
            withdrawals,
            rejected_operations,
            mutation_duration,
            accounts_estimate,
            registry,
        })
    }

    /// Record a tap batch outcome
    pub fn record_tap_batch(&self, outcome: &str) {
        self.tap_batches.with_label_values(&[outcome]).inc();
    }

    /// Record a reward credit
    pub fn record_reward(&self, source: &str) {
        self.rewards_credited.with_label_values(&[source]).inc();
    }

    /// Record a withdrawal transition
    pub fn record_withdrawal(&self, status: &str) {
        self.withdrawals.with_label_values(&[status]).inc();
    }

    /// Record a failed operation
    pub fn record_rejection(&self, kind: &str) {
        self.rejected_operations.with_label_values(&[kind]).inc();
    }

    /// Record operation latency
    pub fn record_duration(&self, duration_seconds: f64) {
        self.mutation_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Metrics in Prometheus text format
    pub fn render(&self) -> crate::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = vec![];
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| crate::Error::Other(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Other(e.to_string()))
    }
}
