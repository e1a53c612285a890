//! End-to-end scenarios against in-memory collaborators.

mod common;

use std::sync::Arc;

use common::{
    context_with_model, Journal, JournalEntry, JournalPlugin, ACL_MODEL, GATEWAY_MODEL,
    SIMPLE_MODEL, SPLIT_MODEL,
};
use docflow_core::constants;
use docflow_core::error::codes;
use docflow_core::{
    DocumentStore, InMemoryDocumentStore, ItemCollection, WorkflowError, WorkflowKernel,
};

fn journal() -> Journal {
    Arc::new(tokio::sync::Mutex::new(Vec::new()))
}

#[tokio::test]
async fn simple_transition() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let ctx = context_with_model("anna", SIMPLE_MODEL, store).await;
    let mut kernel = WorkflowKernel::new(ctx);

    let mut workitem = ItemCollection::new().model("1.0.0").task(100).event(10);
    kernel.process(&mut workitem).await.unwrap();

    assert_eq!(workitem.task_id(), 200);
    assert_eq!(workitem.item_integer(constants::LASTEVENTID), 10);
    assert_eq!(workitem.item_integer_list(constants::EVENTLOG), vec![10]);
    assert_eq!(workitem.item_string(constants::WORKFLOWSTATUS), "Accepted");
    assert_eq!(workitem.item_string(constants::WORKFLOWGROUP), "Ticket");
    assert!(!workitem.unique_id().is_empty());
    assert!(workitem.item_date(constants::LASTEVENTDATE).is_some());
    // the caller is recorded as participant
    assert_eq!(
        workitem.item_string_list(constants::PARTICIPANTS),
        vec!["anna"]
    );
}

#[tokio::test]
async fn conditional_gateway_routes_by_expression() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let ctx = context_with_model("anna", GATEWAY_MODEL, store).await;
    let mut kernel = WorkflowKernel::new(ctx);

    // matching condition → task 200
    let mut workitem = ItemCollection::new().model("1.0.0").task(100).event(10);
    workitem.set_item_value("a", 1);
    workitem.set_item_value("b", "DE");
    kernel.process(&mut workitem).await.unwrap();
    assert_eq!(workitem.task_id(), 200);
    assert_eq!(workitem.item_integer(constants::LASTEVENTID), 10);

    // non-matching condition → else branch, task 900
    let mut workitem = ItemCollection::new().model("1.0.0").task(100).event(10);
    workitem.set_item_value("a", 1);
    workitem.set_item_value("b", "I");
    kernel.process(&mut workitem).await.unwrap();
    assert_eq!(workitem.task_id(), 900);
    assert_eq!(workitem.item_integer(constants::LASTEVENTID), 10);
}

#[tokio::test]
async fn plugin_failure_rolls_back_the_chain() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let ctx = context_with_model("anna", SIMPLE_MODEL, store.clone()).await;
    let mut kernel = WorkflowKernel::new(ctx);

    let journal = journal();
    kernel
        .register_plugin(Box::new(JournalPlugin::setting("P1", journal.clone(), "x", 1)))
        .unwrap();
    kernel
        .register_plugin(Box::new(JournalPlugin::failing("P2", journal.clone())))
        .unwrap();
    kernel
        .register_plugin(Box::new(JournalPlugin::observing("P3", journal.clone())))
        .unwrap();

    // the caller persisted the workitem before processing
    let mut workitem = ItemCollection::new().model("1.0.0").task(100).event(10);
    workitem.set_item_value("x", 0);
    let stored = store.save(workitem).await.unwrap();

    let mut processed = stored.clone();
    let err = kernel.process(&mut processed).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Plugin(_)));

    // the kernel persisted nothing: the stored workitem still has x == 0
    let reloaded = store.load(&stored.unique_id()).await.unwrap().unwrap();
    assert_eq!(reloaded.item_integer("x"), 0);

    let entries = journal.lock().await;
    // P3 never ran
    assert!(!entries.contains(&JournalEntry::Run("P3".to_string())));
    // every plugin that ran was closed with rollback, in reverse order
    assert_eq!(
        *entries,
        vec![
            JournalEntry::Run("P1".to_string()),
            JournalEntry::Run("P2".to_string()),
            JournalEntry::Close("P2".to_string(), true),
            JournalEntry::Close("P1".to_string(), true),
        ]
    );
}

#[tokio::test]
async fn plugin_chain_runs_once_between_lifecycle_events() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let ctx = context_with_model("anna", SIMPLE_MODEL, store).await;
    let mut receiver = ctx.publisher().subscribe();
    let mut kernel = WorkflowKernel::new(ctx);

    let journal = journal();
    kernel
        .register_plugin(Box::new(JournalPlugin::observing("P1", journal.clone())))
        .unwrap();

    let mut workitem = ItemCollection::new().model("1.0.0").task(100).event(10);
    kernel.process(&mut workitem).await.unwrap();

    // BEFORE_PROCESS carries the pre-transition state, AFTER_PROCESS the
    // committed one
    let before = receiver.recv().await.unwrap();
    assert_eq!(before.name, constants::BEFORE_PROCESS);
    assert_eq!(before.workitem.task_id(), 100);
    let after = receiver.recv().await.unwrap();
    assert_eq!(after.name, constants::AFTER_PROCESS);
    assert_eq!(after.workitem.task_id(), 200);

    let entries = journal.lock().await;
    assert_eq!(
        *entries,
        vec![
            JournalEntry::Run("P1".to_string()),
            JournalEntry::Close("P1".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn split_gateway_forks_a_sibling() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let ctx = context_with_model("anna", SPLIT_MODEL, store).await;
    let mut receiver = ctx.publisher().subscribe();
    let mut kernel = WorkflowKernel::new(ctx);

    let mut workitem = ItemCollection::new().model("1.0.0").task(100).event(10);
    workitem.set_item_value("subject", "contract 4711");
    kernel.process(&mut workitem).await.unwrap();

    // main workitem follows the primary edge
    assert_eq!(workitem.task_id(), 210);

    let siblings = kernel.split_workitems();
    assert_eq!(siblings.len(), 1);
    let sibling = &siblings[0];
    assert_eq!(sibling.task_id(), 220);
    assert_ne!(sibling.unique_id(), workitem.unique_id());
    assert!(!sibling.unique_id().is_empty());
    // the sibling inherits the state at the fork point
    assert_eq!(sibling.item_string("subject"), "contract 4711");

    // AFTER_PROCESS fired for the main workitem and the sibling
    let mut after_ids = Vec::new();
    let first = receiver.recv().await.unwrap();
    assert_eq!(first.name, constants::BEFORE_PROCESS);
    for _ in 0..2 {
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name, constants::AFTER_PROCESS);
        after_ids.push(event.workitem.unique_id());
    }
    assert!(after_ids.contains(&workitem.unique_id()));
    assert!(after_ids.contains(&sibling.unique_id()));
}

#[tokio::test]
async fn acl_recompute_replaces_write_access() {
    let store = Arc::new(InMemoryDocumentStore::new());
    // the caller must hold write access to process at all
    let ctx = context_with_model("kevin", ACL_MODEL, store).await;
    let mut kernel = WorkflowKernel::new(ctx);

    let mut workitem = ItemCollection::new().model("1.0.0").task(100).event(10);
    workitem.set_item_value_list(constants::WRITEACCESS, ["kevin", "julian"]);
    kernel.process(&mut workitem).await.unwrap();

    assert_eq!(workitem.task_id(), 300);
    // replacement, not merge
    assert_eq!(
        workitem.item_string_list(constants::WRITEACCESS),
        vec!["joe", "sam"]
    );
}

#[tokio::test]
async fn write_access_is_enforced() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let ctx = context_with_model("mallory", SIMPLE_MODEL, store).await;
    let mut kernel = WorkflowKernel::new(ctx);

    let mut workitem = ItemCollection::new().model("1.0.0").task(100).event(10);
    workitem.set_item_value_list(constants::WRITEACCESS, ["kevin"]);

    let err = kernel.process(&mut workitem).await.unwrap_err();
    assert!(matches!(err, WorkflowError::AccessDenied { .. }));
    assert_eq!(err.code(), codes::NOT_AUTHORIZED);
    // nothing committed
    assert_eq!(workitem.task_id(), 100);
}

#[tokio::test]
async fn undefined_event_fails_before_plugins() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let ctx = context_with_model("anna", SIMPLE_MODEL, store).await;
    let mut kernel = WorkflowKernel::new(ctx);

    let journal = journal();
    kernel
        .register_plugin(Box::new(JournalPlugin::observing("P1", journal.clone())))
        .unwrap();

    let mut workitem = ItemCollection::new().model("1.0.0").task(100).event(99);
    let err = kernel.process(&mut workitem).await.unwrap_err();
    assert_eq!(err.code(), codes::UNDEFINED_MODEL_ENTRY);
    assert!(journal.lock().await.is_empty());
}
