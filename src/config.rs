//! Engine configuration.

use std::collections::HashMap;

use crate::error::{codes, Result, WorkflowError};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of the lifecycle event broadcast channel.
    pub event_channel_capacity: usize,
    /// Upper bound of concurrently active scheduler timers.
    pub max_parallel_schedulers: usize,
    /// Default block size of paging admin jobs.
    pub adminp_block_size: usize,
    /// Interval in seconds between admin job runs.
    pub adminp_interval_seconds: u64,
    pub custom_settings: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 1000,
            max_parallel_schedulers: 100,
            adminp_block_size: 500,
            adminp_interval_seconds: 60,
            custom_settings: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration with environment overrides
    /// (`DOCFLOW_EVENT_CAPACITY`, `DOCFLOW_MAX_SCHEDULERS`,
    /// `DOCFLOW_ADMINP_BLOCK_SIZE`, `DOCFLOW_ADMINP_INTERVAL`).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(capacity) = std::env::var("DOCFLOW_EVENT_CAPACITY") {
            config.event_channel_capacity = parse(&capacity, "event_channel_capacity")?;
        }
        if let Ok(max) = std::env::var("DOCFLOW_MAX_SCHEDULERS") {
            config.max_parallel_schedulers = parse(&max, "max_parallel_schedulers")?;
        }
        if let Ok(block) = std::env::var("DOCFLOW_ADMINP_BLOCK_SIZE") {
            config.adminp_block_size = parse(&block, "adminp_block_size")?;
        }
        if let Ok(interval) = std::env::var("DOCFLOW_ADMINP_INTERVAL") {
            config.adminp_interval_seconds = parse(&interval, "adminp_interval_seconds")?;
        }
        Ok(config)
    }

    /// Short bounds for test setups.
    pub fn for_testing() -> Self {
        Self {
            event_channel_capacity: 64,
            max_parallel_schedulers: 5,
            adminp_block_size: 10,
            adminp_interval_seconds: 1,
            custom_settings: HashMap::new(),
        }
    }
}

fn parse<T: std::str::FromStr>(value: &str, field: &str) -> Result<T> {
    value.parse().map_err(|_| {
        WorkflowError::processing(
            "EngineConfig",
            codes::INVALID_ITEM_VALUE,
            format!("invalid {field}: '{value}'"),
        )
    })
}
