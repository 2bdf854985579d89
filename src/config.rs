//! `DeliveryConfig` (§6): the builder collecting the inbox/delivery knobs a
//! host application tunes — shard count, page size, idempotence window,
//! catch-up turbulence period, sharding strategy, work registry, and
//! delivery monitor.

use std::sync::Arc;

use chrono::Duration;

use crate::inbox::{uniform_hash, DeliveryMonitor, InMemoryWorkRegistry, NoopMonitor, ShardedWorkRegistry, ShardingStrategy};

/// Builder for the knobs named in §6. Defaults match the ones listed there:
/// one shard, an in-memory work registry, no monitor, and `uniform_hash`
/// sharding.
pub struct DeliveryConfig {
    pub shard_count: u32,
    pub page_size: usize,
    pub idempotence_window: Duration,
    pub turbulence_period: Duration,
    pub strategy: Arc<dyn ShardingStrategy>,
    pub work_registry: Arc<dyn ShardedWorkRegistry>,
    pub monitor: Arc<dyn DeliveryMonitor>,
}

impl DeliveryConfig {
    pub fn new() -> Self {
        Self {
            shard_count: 1,
            page_size: 100,
            idempotence_window: Duration::hours(1),
            turbulence_period: Duration::seconds(10),
            strategy: uniform_hash(),
            work_registry: Arc::new(InMemoryWorkRegistry::new()),
            monitor: Arc::new(NoopMonitor),
        }
    }

    pub fn shard_count(mut self, n: u32) -> Self {
        assert!(n >= 1, "shard_count must be at least 1");
        self.shard_count = n;
        self
    }

    pub fn page_size(mut self, n: usize) -> Self {
        self.page_size = n;
        self
    }

    pub fn idempotence_window(mut self, window: Duration) -> Self {
        self.idempotence_window = window;
        self
    }

    pub fn turbulence_period(mut self, period: Duration) -> Self {
        self.turbulence_period = period;
        self
    }

    pub fn strategy(mut self, strategy: Arc<dyn ShardingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn work_registry(mut self, registry: Arc<dyn ShardedWorkRegistry>) -> Self {
        self.work_registry = registry;
        self
    }

    pub fn monitor(mut self, monitor: Arc<dyn DeliveryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self::new()
    }
}
