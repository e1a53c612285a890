//! Scheduler implementation registry.
//!
//! Scheduler configurations reference their implementation by name (the
//! `_scheduler_class` item). Hosts register implementations at startup;
//! the timer service resolves them here on every firing. A registration
//! table replaces any runtime reflection — an unknown name is a
//! deterministic `IMPLEMENTATION_NOT_FOUND` condition.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::scheduler::SchedulerJob;

#[derive(Default)]
pub struct SchedulerRegistry {
    jobs: RwLock<HashMap<String, Arc<dyn SchedulerJob>>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an implementation under a stable name. Re-registering a
    /// name replaces the previous implementation.
    pub async fn register(&self, name: impl Into<String>, job: Arc<dyn SchedulerJob>) {
        let name = name.into();
        info!(scheduler = %name, "scheduler implementation registered");
        self.jobs.write().await.insert(name, job);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn SchedulerJob>> {
        self.jobs.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ItemCollection;
    use crate::error::SchedulerError;
    use async_trait::async_trait;

    struct DemoJob;

    #[async_trait]
    impl SchedulerJob for DemoJob {
        async fn run(&self, config: ItemCollection) -> Result<ItemCollection, SchedulerError> {
            Ok(config)
        }
    }

    #[tokio::test]
    async fn register_and_resolve() {
        let registry = SchedulerRegistry::new();
        registry.register("demo", Arc::new(DemoJob)).await;

        assert!(registry.get("demo").await.is_some());
        assert!(registry.get("unknown").await.is_none());
        assert_eq!(registry.names().await, vec!["demo".to_string()]);
    }
}
