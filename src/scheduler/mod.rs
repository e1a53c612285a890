//! # Scheduler Service
//!
//! Fires user-supplied [`SchedulerJob`] implementations on a calendar
//! schedule, with at most one live timer per configuration id.
//!
//! A scheduler definition is a document of type `scheduler` carrying:
//!
//! - `_scheduler_definition` — the calendar expression (see [`calendar`]),
//! - `_scheduler_class` — the implementation name resolved through the
//!   [`SchedulerRegistry`](crate::registry::SchedulerRegistry),
//! - `_scheduler_enabled` — the enabled flag,
//! - `_scheduler_log` / `_scheduler_status` / `_scheduler_error` — status
//!   bookkeeping maintained by this service.
//!
//! Every firing loads the configuration fresh from the store, dispatches
//! to the implementation, and saves the returned configuration in a new
//! transaction so partial progress survives. A [`SchedulerError`] from the
//! implementation stops the timer deterministically; so does any other
//! failure — a broken job must not re-fire unattended. Firings for the
//! same id are serialized by the timer task; different ids fire in
//! parallel.

pub mod calendar;

pub use calendar::CalendarExpression;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::constants;
use crate::document::ItemCollection;
use crate::error::{codes, Result, SchedulerError};
use crate::registry::SchedulerRegistry;
use crate::storage::DocumentStore;

const CONTEXT: &str = "SchedulerService";

/// A scheduler implementation. `run` receives the configuration document
/// and returns the (possibly updated) configuration; returning an error
/// stops the timer.
#[async_trait]
pub trait SchedulerJob: Send + Sync {
    async fn run(&self, config: ItemCollection) -> std::result::Result<ItemCollection, SchedulerError>;
}

/// Snapshot of a live timer.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerInfo {
    pub id: String,
    pub next_timeout: Option<DateTime<Utc>>,
}

struct TimerHandle {
    token: u64,
    handle: JoinHandle<()>,
    next_timeout: Arc<StdMutex<Option<DateTime<Utc>>>>,
}

/// Outcome of one timer firing; the timer disposition is a function of
/// the variant instead of a nest of catch blocks.
enum TimeoutDisposition {
    /// Run succeeded, keep firing.
    Ok(ItemCollection),
    /// Fatal for this timer: stop after saving the configuration.
    Stop(ItemCollection),
    /// The configuration is gone; stop without saving.
    Vanished,
}

pub struct SchedulerService {
    store: Arc<dyn DocumentStore>,
    registry: Arc<SchedulerRegistry>,
    config: EngineConfig,
    timers: Arc<Mutex<HashMap<String, TimerHandle>>>,
    token_counter: AtomicU64,
}

impl SchedulerService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: Arc<SchedulerRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
            timers: Arc::new(Mutex::new(HashMap::new())),
            token_counter: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<SchedulerRegistry> {
        &self.registry
    }

    /// Starts a timer for the configuration. An existing timer with the
    /// same id is cancelled first. The updated configuration is returned
    /// but not saved.
    pub async fn start(&self, mut configuration: ItemCollection) -> Result<ItemCollection> {
        let id = configuration.unique_id();
        if id.is_empty() {
            return Err(SchedulerError::new(
                CONTEXT,
                codes::INVALID_WORKITEM,
                "scheduler configuration has no $uniqueid, save it first",
            )
            .into());
        }
        self.cancel(&id).await;

        let definition = configuration
            .item_string_list(constants::ITEM_SCHEDULER_DEFINITION)
            .join("\n");
        let expression = CalendarExpression::parse(&definition)?;
        let first = expression.next_timeout(Utc::now()).ok_or_else(|| {
            SchedulerError::new(
                CONTEXT,
                codes::INVALID_CALENDAR_EXPRESSION,
                format!("schedule of '{id}' never fires"),
            )
        })?;

        let next_timeout = Arc::new(StdMutex::new(Some(first)));
        let token = self.token_counter.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(timer_task(
            id.clone(),
            token,
            expression,
            self.store.clone(),
            self.registry.clone(),
            self.timers.clone(),
            next_timeout.clone(),
        ));
        self.timers.lock().await.insert(
            id.clone(),
            TimerHandle {
                token,
                handle,
                next_timeout,
            },
        );
        info!(id = %id, next = %first, "scheduler started");

        configuration.set_item_value(constants::ITEM_SCHEDULER_ENABLED, true);
        configuration.set_item_value(
            constants::ITEM_SCHEDULER_STATUS,
            format!("started at {}", Utc::now().format("%Y-%m-%d %H:%M:%S")),
        );
        configuration.set_item_value(constants::ITEM_SCHEDULER_ERROR, "");
        configuration.replace_item_value(constants::ITEM_SCHEDULER_LOG, Vec::new());
        self.update_timer_details(&mut configuration).await;
        Ok(configuration)
    }

    /// Cancels the timer of a configuration and updates its status items.
    /// The configuration is returned but not saved.
    pub async fn stop(&self, mut configuration: ItemCollection) -> Result<ItemCollection> {
        let id = configuration.unique_id();
        let had_timer = self.cancel(&id).await;
        if had_timer {
            info!(id = %id, "scheduler stopped");
        }
        apply_stop_bookkeeping(&mut configuration);
        Ok(configuration)
    }

    /// Returns the live timer for a configuration id, if any.
    pub async fn find_timer(&self, id: &str) -> Option<TimerInfo> {
        let timers = self.timers.lock().await;
        timers.get(id).map(|t| TimerInfo {
            id: id.to_string(),
            next_timeout: *t.next_timeout.lock().expect("timer mutex"),
        })
    }

    /// Refreshes the `nexttimeout` / `timeremaining` display items.
    pub async fn update_timer_details(&self, configuration: &mut ItemCollection) {
        match self.find_timer(&configuration.unique_id()).await {
            Some(TimerInfo {
                next_timeout: Some(next),
                ..
            }) => {
                configuration.set_item_value(constants::ITEM_NEXT_TIMEOUT, next);
                let remaining = (next - Utc::now()).num_milliseconds().max(0);
                configuration.set_item_value(constants::ITEM_TIME_REMAINING, remaining);
            }
            _ => {
                configuration.remove_item(constants::ITEM_NEXT_TIMEOUT);
                configuration.remove_item(constants::ITEM_TIME_REMAINING);
            }
        }
    }

    /// Starts every enabled scheduler without a live timer, up to the
    /// configured parallel limit. Individual start failures are logged
    /// and skipped. Returns the number of started timers.
    pub async fn start_all_schedulers(&self) -> Result<usize> {
        let configurations = self
            .store
            .documents_by_type(constants::DOCUMENT_TYPE_SCHEDULER)
            .await?;
        if configurations.len() > self.config.max_parallel_schedulers {
            error!(
                count = configurations.len(),
                limit = self.config.max_parallel_schedulers,
                "more scheduler configurations than the parallel limit, only the first ones start"
            );
        }
        let mut started = 0;
        for configuration in configurations {
            if self.timers.lock().await.len() >= self.config.max_parallel_schedulers {
                break;
            }
            let id = configuration.unique_id();
            if !configuration.item_boolean(constants::ITEM_SCHEDULER_ENABLED) {
                info!(id = %id, "scheduler not enabled");
                continue;
            }
            if self.find_timer(&id).await.is_some() {
                info!(id = %id, "scheduler already running");
                continue;
            }
            match self.start(configuration).await {
                Ok(_) => started += 1,
                Err(e) => error!(id = %id, error = %e, "scheduler start failed"),
            }
        }
        Ok(started)
    }

    /// Cancels all timers; used on shutdown.
    pub async fn stop_all_schedulers(&self) {
        let mut timers = self.timers.lock().await;
        for (id, timer) in timers.drain() {
            info!(id = %id, "scheduler cancelled on shutdown");
            timer.handle.abort();
        }
    }

    /// Loads a scheduler configuration by its `name` item (the deprecated
    /// `txtname` alias is honored). Timer details are refreshed.
    pub async fn load_configuration(&self, name: &str) -> Result<Option<ItemCollection>> {
        let query = format!(
            r#"(type:"{}" AND (name:"{name}" OR txtname:"{name}"))"#,
            constants::DOCUMENT_TYPE_SCHEDULER
        );
        let mut hits = self.store.find(&query, 1, 0).await?;
        match hits.pop() {
            Some(mut configuration) => {
                self.update_timer_details(&mut configuration).await;
                Ok(Some(configuration))
            }
            None => Ok(None),
        }
    }

    /// Persists a scheduler configuration, forcing the reserved items
    /// (`type`, manager-only access lists).
    pub async fn save_configuration(
        &self,
        mut configuration: ItemCollection,
    ) -> Result<ItemCollection> {
        if configuration.item_string("name").is_empty() {
            return Err(SchedulerError::new(
                CONTEXT,
                codes::INVALID_WORKITEM,
                "scheduler configuration must carry the item 'name'",
            )
            .into());
        }
        configuration.set_item_value("type", constants::DOCUMENT_TYPE_SCHEDULER);
        configuration.set_item_value_list(
            constants::WRITEACCESS,
            [crate::context::MANAGER_ACCESS],
        );
        configuration.set_item_value_list(
            constants::READACCESS,
            [crate::context::MANAGER_ACCESS],
        );
        self.update_timer_details(&mut configuration).await;
        self.store.save(configuration).await
    }

    /// Removes a timer; returns whether one existed.
    async fn cancel(&self, id: &str) -> bool {
        if let Some(timer) = self.timers.lock().await.remove(id) {
            timer.handle.abort();
            true
        } else {
            false
        }
    }
}

/// The timer loop of one configuration id.
async fn timer_task(
    id: String,
    token: u64,
    expression: CalendarExpression,
    store: Arc<dyn DocumentStore>,
    registry: Arc<SchedulerRegistry>,
    timers: Arc<Mutex<HashMap<String, TimerHandle>>>,
    next_timeout: Arc<StdMutex<Option<DateTime<Utc>>>>,
) {
    loop {
        let Some(next) = expression.next_timeout(Utc::now()) else {
            info!(id = %id, "schedule exhausted, timer ends");
            break;
        };
        *next_timeout.lock().expect("timer mutex") = Some(next);
        let delay = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(delay).await;

        match on_timeout(&id, store.as_ref(), registry.as_ref()).await {
            TimeoutDisposition::Ok(configuration) => {
                save_in_new_transaction(store.as_ref(), configuration).await;
            }
            TimeoutDisposition::Stop(mut configuration) => {
                apply_stop_bookkeeping(&mut configuration);
                save_in_new_transaction(store.as_ref(), configuration).await;
                break;
            }
            TimeoutDisposition::Vanished => break,
        }
    }
    // self-cleanup, unless a newer timer took over the id
    let mut timers = timers.lock().await;
    if timers.get(&id).map(|t| t.token) == Some(token) {
        timers.remove(&id);
    }
}

/// Processes one timeout event: load the configuration, resolve the
/// implementation, run it, fold the outcome into the configuration.
async fn on_timeout(
    id: &str,
    store: &dyn DocumentStore,
    registry: &SchedulerRegistry,
) -> TimeoutDisposition {
    let configuration = match store.load(id).await {
        Ok(Some(configuration)) => configuration,
        Ok(None) => {
            error!(id = %id, "scheduler configuration vanished, timer will be stopped");
            return TimeoutDisposition::Vanished;
        }
        Err(e) => {
            error!(id = %id, error = %e, "scheduler configuration not loadable");
            return TimeoutDisposition::Vanished;
        }
    };

    let class_name = configuration.item_string(constants::ITEM_SCHEDULER_CLASS);
    let Some(job) = registry.get(&class_name).await else {
        warn!(id = %id, class = %class_name, "scheduler implementation not found, timer will be stopped");
        let mut configuration = configuration;
        configuration.set_item_value(
            constants::ITEM_SCHEDULER_ERROR,
            format!("implementation '{class_name}' not found"),
        );
        return TimeoutDisposition::Stop(configuration);
    };

    info!(id = %id, class = %class_name, "scheduler run starting");
    let started = std::time::Instant::now();
    let mut before = configuration.clone();
    let mut input = configuration;
    input.replace_item_value(
        constants::ITEM_SCHEDULER_LOG,
        vec![crate::document::ItemValue::Text(format!(
            "Started: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        ))],
    );

    match job.run(input).await {
        Ok(mut updated) => {
            info!(id = %id, elapsed_ms = started.elapsed().as_millis() as u64, "scheduler run finished");
            updated.append_item_value(
                constants::ITEM_SCHEDULER_LOG,
                format!("Finished: {}", Utc::now().format("%Y-%m-%d %H:%M:%S")),
            );
            updated.set_item_value(constants::ITEM_SCHEDULER_ERROR, "");
            if updated.item_boolean(constants::ITEM_SCHEDULER_ENABLED) {
                TimeoutDisposition::Ok(updated)
            } else {
                info!(id = %id, "scheduler disabled itself, timer will be stopped");
                TimeoutDisposition::Stop(updated)
            }
        }
        Err(e) => {
            error!(id = %id, error = %e, "scheduler run failed, timer will be stopped");
            before.append_item_value(
                constants::ITEM_SCHEDULER_LOG,
                format!("Error: {}", e.message),
            );
            before.set_item_value(constants::ITEM_SCHEDULER_ERROR, e.message);
            TimeoutDisposition::Stop(before)
        }
    }
}

fn apply_stop_bookkeeping(configuration: &mut ItemCollection) {
    configuration.remove_item(constants::ITEM_NEXT_TIMEOUT);
    configuration.remove_item(constants::ITEM_TIME_REMAINING);
    configuration.set_item_value(constants::ITEM_SCHEDULER_ENABLED, false);
    configuration.set_item_value(
        constants::ITEM_SCHEDULER_STATUS,
        format!("stopped at {}", Utc::now().format("%Y-%m-%d %H:%M:%S")),
    );
    configuration.append_item_value(
        constants::ITEM_SCHEDULER_LOG,
        format!("Stopped: {}", Utc::now().format("%Y-%m-%d %H:%M:%S")),
    );
}

/// Each firing persists its state independently so partial progress
/// survives a later failure.
async fn save_in_new_transaction(store: &dyn DocumentStore, configuration: ItemCollection) {
    if let Err(e) = store.save(configuration).await {
        error!(error = %e, "saving scheduler configuration failed");
    }
}
