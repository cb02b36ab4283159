//! # Inbound Throttling Metrics
//!
//! Prometheus metrics registered under a caller-chosen namespace in a
//! caller-owned registry, so two throttlers (or a test and a node) never
//! share counters by accident.
//!
//! ## Metrics Exported
//!
//! - `<ns>_inbound_weighted_bytes_reserved` - Bytes held from the weighted pool
//! - `<ns>_inbound_at_large_bytes_reserved` - Bytes held from the at-large pool
//! - `<ns>_inbound_weighted_remaining_bytes` - Free bytes in the weighted pool
//! - `<ns>_inbound_at_large_remaining_bytes` - Free bytes in the at-large pool
//! - `<ns>_inbound_weighted_grants_total` - Grants served by the weighted pool
//! - `<ns>_inbound_at_large_grants_total` - Grants served by the at-large pool
//! - `<ns>_inbound_byte_waiters` - Requests queued for bytes
//! - `<ns>_inbound_buffer_waiters` - Requests queued for a concurrency slot
//! - `<ns>_inbound_msgs_in_flight` - Messages admitted and not yet released
//! - `<ns>_inbound_acquire_latency_seconds` - Time spent inside `acquire`

use prometheus::core::Collector;
use prometheus::{exponential_buckets, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};

use crate::domain::{ByteAllocator, BytePool, ThrottleError};

/// Handles to the throttler's registered metrics.
///
/// Cloning is cheap; clones update the same underlying series.
#[derive(Clone, Debug)]
pub struct ThrottlerMetrics {
    pub weighted_bytes_reserved: IntGauge,
    pub at_large_bytes_reserved: IntGauge,
    pub weighted_remaining_bytes: IntGauge,
    pub at_large_remaining_bytes: IntGauge,
    pub weighted_grants: IntCounter,
    pub at_large_grants: IntCounter,
    pub byte_waiters: IntGauge,
    pub buffer_waiters: IntGauge,
    pub msgs_in_flight: IntGauge,
    pub acquire_latency: Histogram,
}

impl ThrottlerMetrics {
    /// Create and register all metrics.
    ///
    /// Fails if any name is already registered in `registry`, e.g. when the
    /// same namespace is used twice.
    pub fn register(namespace: &str, registry: &Registry) -> Result<Self, ThrottleError> {
        let gauge = |name: &str, help: &str| {
            IntGauge::with_opts(Opts::new(name, help).namespace(namespace))
        };
        let counter = |name: &str, help: &str| {
            IntCounter::with_opts(Opts::new(name, help).namespace(namespace))
        };

        let metrics = Self {
            weighted_bytes_reserved: gauge(
                "inbound_weighted_bytes_reserved",
                "Bytes of inbound messages held from the weighted pool",
            )?,
            at_large_bytes_reserved: gauge(
                "inbound_at_large_bytes_reserved",
                "Bytes of inbound messages held from the at-large pool",
            )?,
            weighted_remaining_bytes: gauge(
                "inbound_weighted_remaining_bytes",
                "Free bytes in the weighted pool",
            )?,
            at_large_remaining_bytes: gauge(
                "inbound_at_large_remaining_bytes",
                "Free bytes in the at-large pool",
            )?,
            weighted_grants: counter(
                "inbound_weighted_grants_total",
                "Inbound messages admitted from the weighted pool",
            )?,
            at_large_grants: counter(
                "inbound_at_large_grants_total",
                "Inbound messages admitted from the at-large pool",
            )?,
            byte_waiters: gauge(
                "inbound_byte_waiters",
                "Inbound messages waiting for byte capacity",
            )?,
            buffer_waiters: gauge(
                "inbound_buffer_waiters",
                "Inbound messages waiting for a per-peer processing slot",
            )?,
            msgs_in_flight: gauge(
                "inbound_msgs_in_flight",
                "Inbound messages admitted and not yet released",
            )?,
            acquire_latency: Histogram::with_opts(
                HistogramOpts::new(
                    "inbound_acquire_latency_seconds",
                    "Time spent waiting to admit an inbound message",
                )
                .namespace(namespace)
                .buckets(exponential_buckets(0.0001, 2.0, 16)?),
            )?,
        };

        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(metrics.weighted_bytes_reserved.clone()),
            Box::new(metrics.at_large_bytes_reserved.clone()),
            Box::new(metrics.weighted_remaining_bytes.clone()),
            Box::new(metrics.at_large_remaining_bytes.clone()),
            Box::new(metrics.weighted_grants.clone()),
            Box::new(metrics.at_large_grants.clone()),
            Box::new(metrics.byte_waiters.clone()),
            Box::new(metrics.buffer_waiters.clone()),
            Box::new(metrics.msgs_in_flight.clone()),
            Box::new(metrics.acquire_latency.clone()),
        ];
        for collector in collectors {
            registry.register(collector)?;
        }

        Ok(metrics)
    }

    /// Count a grant from `pool`.
    pub fn record_grant(&self, pool: BytePool) {
        match pool {
            BytePool::Weighted => self.weighted_grants.inc(),
            BytePool::AtLarge => self.at_large_grants.inc(),
        }
    }

    /// Publish the allocator's pool levels and the byte queue depth.
    pub fn publish_pools(&self, allocator: &ByteAllocator, byte_waiters: usize) {
        self.weighted_bytes_reserved
            .set(gauge_value(allocator.reserved(BytePool::Weighted)));
        self.at_large_bytes_reserved
            .set(gauge_value(allocator.reserved(BytePool::AtLarge)));
        self.weighted_remaining_bytes
            .set(gauge_value(allocator.weighted_remaining()));
        self.at_large_remaining_bytes
            .set(gauge_value(allocator.at_large_remaining()));
        self.byte_waiters.set(gauge_value(byte_waiters as u64));
    }
}

fn gauge_value(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
