//! # AdminP jobs
//!
//! Long-running administrative jobs (index rebuilds, migrations) described
//! by documents of type `adminp`. A job document carries the handler name
//! (`job`), its cursor state and its counters; the service re-runs the
//! handler on a fixed interval until the handler marks the job completed.
//! Each run persists the returned job document, so progress survives
//! restarts and a job can resume from its cursor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::constants;
use crate::document::ItemCollection;
use crate::error::{codes, Result, WorkflowError};
use crate::storage::DocumentStore;

pub const ITEM_JOB: &str = "job";
pub const ITEM_COMPLETED: &str = "iscompleted";
pub const JOB_REBUILD_INDEX: &str = "REBUILD_INDEX";

/// One administrative job implementation. `run` processes a bounded slice
/// of work and returns the updated job document; setting
/// [`ITEM_COMPLETED`] ends the job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: ItemCollection) -> Result<ItemCollection>;
}

/// Full-text index collaborator fed by the rebuild job.
#[async_trait]
pub trait IndexWriter: Send + Sync {
    async fn update_document(&self, document: &ItemCollection) -> Result<()>;
}

/// Runs registered job handlers on an interval until completion.
pub struct AdminPService {
    store: Arc<dyn DocumentStore>,
    config: EngineConfig,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    jobs: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl AdminPService {
    pub fn new(store: Arc<dyn DocumentStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            handlers: RwLock::new(HashMap::new()),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.write().await.insert(name.into(), handler);
    }

    /// Persists a job document and schedules its interval runner. The job
    /// starts on the next interval tick.
    pub async fn create_job(&self, mut job: ItemCollection) -> Result<ItemCollection> {
        let handler_name = job.item_string(ITEM_JOB);
        let handler = self
            .handlers
            .read()
            .await
            .get(&handler_name)
            .cloned()
            .ok_or_else(|| {
                WorkflowError::processing(
                    "AdminPService",
                    codes::IMPLEMENTATION_NOT_FOUND,
                    format!("no job handler '{handler_name}' registered"),
                )
            })?;

        job.set_item_value("type", constants::DOCUMENT_TYPE_ADMINP);
        job.set_item_value(ITEM_COMPLETED, false);
        let job = self.store.save(job).await?;
        let id = job.unique_id();
        info!(id = %id, job = %handler_name, "adminp job created");

        let store = self.store.clone();
        let jobs = self.jobs.clone();
        let interval = std::time::Duration::from_secs(self.config.adminp_interval_seconds);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match run_once(store.as_ref(), handler.as_ref(), &task_id).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => {
                        error!(id = %task_id, error = %e, "adminp job failed, runner stops");
                        break;
                    }
                }
            }
            jobs.lock().await.remove(&task_id);
        });
        self.jobs.lock().await.insert(id, handle);
        Ok(job)
    }

    pub async fn is_running(&self, id: &str) -> bool {
        self.jobs.lock().await.contains_key(id)
    }

    /// Cancels a running job without touching its document.
    pub async fn cancel_job(&self, id: &str) {
        if let Some(handle) = self.jobs.lock().await.remove(id) {
            handle.abort();
            info!(id = %id, "adminp job cancelled");
        }
    }
}

/// Executes one job iteration; returns true when the job completed or
/// vanished.
async fn run_once(
    store: &dyn DocumentStore,
    handler: &dyn JobHandler,
    id: &str,
) -> Result<bool> {
    let Some(job) = store.load(id).await? else {
        warn!(id = %id, "adminp job document vanished");
        return Ok(true);
    };
    if job.item_boolean(ITEM_COMPLETED) {
        return Ok(true);
    }
    let mut updated = handler.run(job).await?;
    updated.set_item_value("datlastrun", Utc::now());
    let updated = store.save(updated).await?;
    Ok(updated.item_boolean(ITEM_COMPLETED))
}

/// Rebuilds the full-text index in blocks.
///
/// The job document carries the cursor (`numindex`), the block size
/// (`numblocksize`, defaulting to the engine configuration) and the
/// counters `numprocessed` / `numerrors`. An optional `typelist` item
/// restricts the rebuild to a comma-separated set of document types. The
/// job self-terminates when a block returns fewer rows than requested.
/// Per-document index errors are logged and skipped — the job's success
/// metric is progress.
pub struct RebuildIndexJob {
    store: Arc<dyn DocumentStore>,
    index_writer: Arc<dyn IndexWriter>,
    default_block_size: usize,
}

impl RebuildIndexJob {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index_writer: Arc<dyn IndexWriter>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            index_writer,
            default_block_size: config.adminp_block_size,
        }
    }

    fn build_query(job: &ItemCollection) -> String {
        let type_list = job.item_string("typelist");
        type_list
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| format!(r#"type:"{t}""#))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

#[async_trait]
impl JobHandler for RebuildIndexJob {
    async fn run(&self, mut job: ItemCollection) -> Result<ItemCollection> {
        let mut block_size = job.item_integer("numblocksize") as usize;
        if block_size == 0 {
            block_size = self.default_block_size;
            job.set_item_value("numblocksize", block_size as i64);
        }
        let index = job.item_integer("numindex").max(0) as usize;

        let query = Self::build_query(&job);
        let block = self
            .store
            .find(&query, block_size, index / block_size)
            .await?;

        let mut errors = job.item_integer("numerrors");
        let mut processed = job.item_integer("numprocessed");
        for document in &block {
            match self.index_writer.update_document(document).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    errors += 1;
                    warn!(
                        id = %document.unique_id(),
                        error = %e,
                        "document skipped during index rebuild"
                    );
                }
            }
        }
        job.set_item_value("numprocessed", processed);
        job.set_item_value("numerrors", errors);
        job.set_item_value("numindex", (index + block_size) as i64);

        info!(
            block = block.len(),
            processed, errors, "index rebuild block done"
        );
        if block.len() < block_size {
            job.set_item_value(ITEM_COMPLETED, true);
        }
        Ok(job)
    }
}
