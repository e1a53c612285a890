//! Scheduler end-to-end: start, tick, persisted outcome.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use docflow_core::constants;
use docflow_core::error::SchedulerError;
use docflow_core::registry::SchedulerRegistry;
use docflow_core::{
    DocumentStore, EngineConfig, InMemoryDocumentStore, ItemCollection, SchedulerJob,
    SchedulerService,
};

/// Records every configuration it was invoked with.
struct DemoScheduler {
    invocations: Arc<Mutex<Vec<ItemCollection>>>,
}

#[async_trait]
impl SchedulerJob for DemoScheduler {
    async fn run(&self, mut config: ItemCollection) -> Result<ItemCollection, SchedulerError> {
        self.invocations.lock().await.push(config.clone());
        let count = config.item_integer("demo.counter") + 1;
        config.set_item_value("demo.counter", count);
        Ok(config)
    }
}

#[tokio::test]
async fn firing_invokes_the_implementation_with_the_persisted_config() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let registry = Arc::new(SchedulerRegistry::new());
    let invocations = Arc::new(Mutex::new(Vec::new()));
    registry
        .register(
            "demo",
            Arc::new(DemoScheduler {
                invocations: invocations.clone(),
            }),
        )
        .await;
    let service = SchedulerService::new(store.clone(), registry, EngineConfig::for_testing());

    let mut configuration = ItemCollection::new();
    configuration.set_item_value("name", "demo-ticker");
    configuration.set_item_value(constants::ITEM_SCHEDULER_CLASS, "demo");
    configuration.set_item_value(
        constants::ITEM_SCHEDULER_DEFINITION,
        "second=*; minute=*; hour=*",
    );
    configuration.set_item_value(constants::ITEM_SCHEDULER_ENABLED, true);
    let configuration = service.save_configuration(configuration).await.unwrap();
    let id = configuration.unique_id();

    // after start(X), findTimer(X) is non-null
    let configuration = service.start(configuration).await.unwrap();
    assert!(service.find_timer(&id).await.is_some());
    assert!(configuration.item_boolean(constants::ITEM_SCHEDULER_ENABLED));

    // wait past one tick of the every-second schedule
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    {
        let seen = invocations.lock().await;
        assert!(!seen.is_empty(), "the implementation never ran");
        // the implementation received the persisted configuration
        assert_eq!(seen[0].unique_id(), id);
        assert_eq!(seen[0].item_string("name"), "demo-ticker");
    }

    // the returned configuration was saved in a fresh transaction with a
    // Finished log line and the implementation's own mutation
    let stored = store.load(&id).await.unwrap().unwrap();
    assert!(stored.item_integer("demo.counter") >= 1);
    assert!(stored
        .item_string_list(constants::ITEM_SCHEDULER_LOG)
        .iter()
        .any(|line| line.starts_with("Finished:")));

    // stop removes the timer
    let stopped = service.stop(stored).await.unwrap();
    assert!(service.find_timer(&id).await.is_none());
    assert!(!stopped.item_boolean(constants::ITEM_SCHEDULER_ENABLED));
    assert!(!stopped.has_item(constants::ITEM_NEXT_TIMEOUT));
}
