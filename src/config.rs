use crate::due_aggregation_service::AggregationConfig;
use crate::interval_table::IntervalTable;
use crate::spaced_repetition::{DEFAULT_SCOPE, ReviewScheduler};
use std::time::Duration;

/// Tunables of the scheduling engine
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub intervals: IntervalTable,
    /// Scope used when a request names none
    pub default_scope: String,
    pub aggregation: AggregationConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            intervals: IntervalTable::default(),
            default_scope: DEFAULT_SCOPE.to_string(),
            aggregation: AggregationConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    pub fn scheduler(&self) -> ReviewScheduler {
        ReviewScheduler::new(self.intervals.clone())
    }

    /// `scope` if given, otherwise the configured default
    pub fn scope_or_default<'a>(&'a self, scope: Option<&'a str>) -> &'a str {
        scope.unwrap_or(&self.default_scope)
    }
}

#[derive(Debug, Default)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn intervals(mut self, intervals: IntervalTable) -> Self {
        self.config.intervals = intervals;
        self
    }

    pub fn default_scope(mut self, scope: &str) -> Self {
        self.config.default_scope = scope.to_string();
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.config.aggregation.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.aggregation.fetch_timeout = timeout;
        self
    }

    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}
