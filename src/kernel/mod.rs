//! # Workflow Kernel
//!
//! The state-transition interpreter. One [`WorkflowKernel::process`] call
//! executes exactly one process step on a workitem:
//!
//! 1. validate model version, event and caller write access,
//! 2. publish `BEFORE_PROCESS`,
//! 3. run the plugin chain in registration order,
//! 4. resolve the event's successor through any conditional or split
//!    gateways (the rule engine evaluates edge conditions; split branches
//!    fork sibling workitems from the post-plugin state),
//! 5. commit the transition (`$taskid`, status/group items, event log),
//!    recompute ACL items, and loop back to 3 while follow-up events are
//!    queued — a per-call visited set turns cycles into
//!    `CYCLIC_FOLLOW_UP` errors,
//! 6. publish `AFTER_PROCESS` for the main workitem and every sibling,
//! 7. close all plugins in reverse order.
//!
//! A failing plugin aborts the step: every plugin that ran is closed with
//! `rollback == true` and the error surfaces to the caller — the kernel
//! persists nothing, so a caller that saves only after a clean return
//! keeps the stored workitem untouched. Close-phase errors are logged,
//! never propagated.

pub mod plugin;

pub use plugin::Plugin;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::access;
use crate::constants;
use crate::context::WorkflowContext;
use crate::document::ItemCollection;
use crate::error::{codes, Result, WorkflowError};
use crate::model::{BpmnModel, GatewayKind, NodeRef};
use crate::rules::RuleEngine;

const CONTEXT: &str = "WorkflowKernel";

/// Result of walking an event's outgoing path up to the next task.
pub(crate) struct SuccessorWalk {
    pub next_task: i64,
    /// Task ids reached by the non-primary branches of split gateways.
    pub splits: Vec<i64>,
}

pub struct WorkflowKernel {
    ctx: Arc<WorkflowContext>,
    plugins: Vec<Box<dyn Plugin>>,
    split_workitems: Vec<ItemCollection>,
}

impl WorkflowKernel {
    pub fn new(ctx: Arc<WorkflowContext>) -> Self {
        Self {
            ctx,
            plugins: Vec::new(),
            split_workitems: Vec::new(),
        }
    }

    pub fn context(&self) -> &Arc<WorkflowContext> {
        &self.ctx
    }

    /// Registers a plugin at the end of the chain and initializes it.
    pub fn register_plugin(&mut self, mut plugin: Box<dyn Plugin>) -> Result<()> {
        plugin.init(&self.ctx)?;
        debug!(plugin = plugin.name(), "plugin registered");
        self.plugins.push(plugin);
        Ok(())
    }

    /// Sibling workitems produced at split gateways by the most recent
    /// `process` call. Each sibling carries a fresh `$uniqueid` and the
    /// task id of its branch.
    pub fn split_workitems(&self) -> &[ItemCollection] {
        &self.split_workitems
    }

    /// Resolves the task id the workitem would transition to, walking any
    /// gateways, without running plugins or mutating the workitem.
    pub async fn eval(&self, workitem: &ItemCollection) -> Result<i64> {
        let model = self.ctx.model_manager().get_model_by_workitem(workitem).await?;
        let event = model.event(workitem.task_id(), workitem.event_id())?;
        let walk = walk_successor(&model, self.ctx.rule_engine(), workitem, event)?;
        Ok(walk.next_task)
    }

    /// Executes one process step. See the module documentation for the
    /// full algorithm.
    #[instrument(skip(self, workitem), fields(uniqueid = %workitem.unique_id(), task = workitem.task_id(), event = workitem.event_id()))]
    pub async fn process(&mut self, workitem: &mut ItemCollection) -> Result<()> {
        self.split_workitems.clear();
        let model = self.ctx.model_manager().get_model_by_workitem(workitem).await?;
        self.validate(workitem, &model)?;

        if workitem.unique_id().is_empty() {
            workitem.set_item_value(constants::UNIQUEID, Uuid::now_v7().to_string());
        }
        if workitem.item_date(constants::CREATED).is_none() {
            workitem.set_item_value(constants::CREATED, Utc::now());
            workitem.set_item_value(constants::CREATOR, self.ctx.caller_name());
        }

        self.ctx
            .publisher()
            .publish(constants::BEFORE_PROCESS, workitem);

        let mut visited: HashSet<(i64, i64)> = HashSet::new();
        let mut ran: Vec<usize> = Vec::new();

        let mut event_id = workitem.event_id();
        if event_id <= 0 {
            event_id = dequeue_activity(workitem).ok_or_else(|| {
                WorkflowError::processing(
                    CONTEXT,
                    codes::UNDEFINED_WORKITEM,
                    "workitem has no $eventid and no queued follow-up events",
                )
            })?;
        }

        loop {
            let task_id = workitem.task_id();
            if !visited.insert((task_id, event_id)) {
                let err = WorkflowError::model(
                    CONTEXT,
                    codes::CYCLIC_FOLLOW_UP,
                    format!("cyclic follow-up at event {task_id}.{event_id}"),
                );
                self.close_chain(&ran, true).await;
                return Err(err);
            }
            workitem.set_event_id(event_id);

            let event = match model.event(task_id, event_id) {
                Ok(event) => event.clone(),
                Err(err) => {
                    self.close_chain(&ran, true).await;
                    return Err(err);
                }
            };
            debug!(task = task_id, event = event_id, "processing event");

            // plugin chain, registration order
            for index in 0..self.plugins.len() {
                if !ran.contains(&index) {
                    ran.push(index);
                }
                if let Err(plugin_err) = self.plugins[index].run(workitem, &event).await {
                    warn!(
                        plugin = self.plugins[index].name(),
                        error = %plugin_err,
                        "plugin failed, rolling back step"
                    );
                    self.close_chain(&ran, true).await;
                    return Err(plugin_err.into());
                }
            }

            // gateway resolution
            let walk = match walk_successor(&model, self.ctx.rule_engine(), workitem, &event) {
                Ok(walk) => walk,
                Err(err) => {
                    self.close_chain(&ran, true).await;
                    return Err(err);
                }
            };

            // fork split siblings from the post-plugin state
            for split_task in &walk.splits {
                let mut sibling = workitem.clone();
                sibling.set_item_value(constants::UNIQUEID, Uuid::now_v7().to_string());
                sibling.remove_item(constants::ACTIVITYIDLIST);
                if let Err(err) = self.commit(&mut sibling, &model, &event, *split_task, event_id) {
                    self.close_chain(&ran, true).await;
                    return Err(err);
                }
                info!(
                    sibling = %sibling.unique_id(),
                    task = *split_task,
                    "split workitem forked"
                );
                self.split_workitems.push(sibling);
            }

            // commit the main transition
            if let Err(err) = self.commit(workitem, &model, &event, walk.next_task, event_id) {
                self.close_chain(&ran, true).await;
                return Err(err);
            }

            // follow-up chain
            if event.item_boolean("keyfollowup") || event.item_string("keyfollowup") == "1" {
                let next_event = event.item_integer("numnextactivityid");
                if next_event > 0 {
                    workitem.append_item_value(constants::ACTIVITYIDLIST, next_event);
                }
            }
            match dequeue_activity(workitem) {
                Some(next) => event_id = next,
                None => break,
            }
        }

        self.ctx
            .publisher()
            .publish(constants::AFTER_PROCESS, workitem);
        for sibling in &self.split_workitems {
            self.ctx.publisher().publish(constants::AFTER_PROCESS, sibling);
        }

        self.close_chain(&ran, false).await;
        Ok(())
    }

    /// Commits a transition onto a workitem: target task, status items,
    /// event history and ACL recomputation.
    fn commit(
        &self,
        workitem: &mut ItemCollection,
        model: &BpmnModel,
        event: &ItemCollection,
        next_task: i64,
        event_id: i64,
    ) -> Result<()> {
        let task = model.task(next_task)?.clone();

        let previous_task = workitem.task_id();
        workitem.set_item_value(constants::LASTTASK, previous_task);
        workitem.set_task_id(next_task);
        workitem.set_item_value(
            constants::WORKFLOWSTATUS,
            task.item_string("txtworkflowstatus"),
        );
        workitem.set_item_value(
            constants::WORKFLOWGROUP,
            task.item_string("txtworkflowgroup"),
        );
        workitem.set_item_value(constants::LASTEVENTDATE, Utc::now());
        workitem.set_item_value(constants::LASTEVENTID, event_id);
        workitem.append_item_value(constants::EVENTLOG, event_id);
        workitem.set_item_value(constants::MODIFIED, Utc::now());
        workitem.set_event_id(0);

        access::update_participants(workitem, &self.ctx);
        access::update_acl(workitem, event, Some(&task), &self.ctx)?;
        Ok(())
    }

    fn validate(&self, workitem: &ItemCollection, model: &BpmnModel) -> Result<()> {
        if workitem.task_id() <= 0 {
            return Err(WorkflowError::processing(
                CONTEXT,
                codes::UNDEFINED_WORKITEM,
                "workitem has no $taskid",
            ));
        }
        model.task(workitem.task_id())?;

        let event_id = workitem.event_id();
        if event_id > 0 {
            model.event(workitem.task_id(), event_id)?;
        } else if workitem.item_value(constants::ACTIVITYIDLIST).is_empty() {
            return Err(WorkflowError::processing(
                CONTEXT,
                codes::UNDEFINED_WORKITEM,
                "workitem has no $eventid and no queued follow-up events",
            ));
        }

        self.check_write_access(workitem)
    }

    /// The caller needs write access: an empty `$writeaccess` list grants
    /// everyone, otherwise the caller name or one of their roles must be
    /// listed, or the caller holds the manager role.
    fn check_write_access(&self, workitem: &ItemCollection) -> Result<()> {
        let write_access = workitem.item_string_list(constants::WRITEACCESS);
        if write_access.is_empty() || self.ctx.is_manager() {
            return Ok(());
        }
        let caller = self.ctx.caller_name();
        let allowed = write_access
            .iter()
            .any(|entry| entry == caller || self.ctx.has_role(entry));
        if allowed {
            Ok(())
        } else {
            Err(WorkflowError::access_denied(
                CONTEXT,
                codes::NOT_AUTHORIZED,
                format!("caller '{caller}' has no write access"),
            ))
        }
    }

    /// Closes every plugin that ran, in reverse order. Errors are logged
    /// only; a failing close must not mask the step result.
    async fn close_chain(&mut self, ran: &[usize], rollback: bool) {
        for index in ran.iter().rev() {
            if let Err(close_err) = self.plugins[*index].close(rollback).await {
                error!(
                    plugin = self.plugins[*index].name(),
                    rollback,
                    error = %close_err,
                    "plugin close failed"
                );
            }
        }
    }
}

/// Removes and returns the first queued follow-up event id.
fn dequeue_activity(workitem: &mut ItemCollection) -> Option<i64> {
    let queue = workitem.item_integer_list(constants::ACTIVITYIDLIST);
    let (next, rest) = queue.split_first()?;
    let next = *next;
    workitem.set_item_value_list(constants::ACTIVITYIDLIST, rest.to_vec());
    if next > 0 {
        Some(next)
    } else {
        dequeue_activity(workitem)
    }
}

/// Walks from an event's successor through gateways and pass-through
/// events until a task is reached. Split branches are resolved to their
/// target task ids and collected in [`SuccessorWalk::splits`].
pub(crate) fn walk_successor(
    model: &BpmnModel,
    rules: &RuleEngine,
    workitem: &ItemCollection,
    event: &ItemCollection,
) -> Result<SuccessorWalk> {
    let mut splits = Vec::new();
    let mut visited = HashSet::new();
    let start = model.successor_of(event)?;
    let next_task = resolve_node(model, rules, workitem, event, start, &mut splits, &mut visited)?;
    Ok(SuccessorWalk { next_task, splits })
}

fn resolve_node(
    model: &BpmnModel,
    rules: &RuleEngine,
    workitem: &ItemCollection,
    event: &ItemCollection,
    start: NodeRef,
    splits: &mut Vec<i64>,
    visited: &mut HashSet<String>,
) -> Result<i64> {
    let mut node = start;
    loop {
        match node {
            NodeRef::Task(task_id) => return Ok(task_id),

            // events on the path are pass-through for successor resolution
            NodeRef::Event { task_id, event_id } => {
                if !visited.insert(format!("event:{task_id}.{event_id}")) {
                    return Err(cyclic(&format!("event {task_id}.{event_id}")));
                }
                let chained = model.event(task_id, event_id)?;
                node = model.successor_of(chained)?;
            }

            NodeRef::Gateway(gateway_id) => {
                if !visited.insert(format!("gateway:{gateway_id}")) {
                    return Err(cyclic(&format!("gateway '{gateway_id}'")));
                }
                let gateway = model.gateway(&gateway_id)?;
                match gateway.kind {
                    GatewayKind::Conditional => {
                        let mut chosen = None;
                        for edge in &gateway.outgoing {
                            if let Some(condition) = &edge.condition {
                                if rules.evaluate_boolean_expression(
                                    condition,
                                    workitem,
                                    Some(event),
                                )? {
                                    chosen = Some(edge);
                                    break;
                                }
                            }
                        }
                        let chosen = match chosen {
                            Some(edge) => edge,
                            None => gateway
                                .outgoing
                                .iter()
                                .find(|e| e.condition.is_none())
                                .ok_or_else(|| {
                                    WorkflowError::model(
                                        CONTEXT,
                                        codes::INVALID_MODEL_ENTRY,
                                        format!("gateway '{gateway_id}' has no else edge"),
                                    )
                                })?,
                        };
                        node = chosen.target.clone();
                    }

                    GatewayKind::Split => {
                        let primary_index = gateway
                            .outgoing
                            .iter()
                            .position(|e| e.primary)
                            .unwrap_or(0);
                        for (index, edge) in gateway.outgoing.iter().enumerate() {
                            if index == primary_index {
                                continue;
                            }
                            let active = match &edge.condition {
                                Some(condition) => rules.evaluate_boolean_expression(
                                    condition,
                                    workitem,
                                    Some(event),
                                )?,
                                None => true,
                            };
                            if active {
                                let split_task = resolve_node(
                                    model,
                                    rules,
                                    workitem,
                                    event,
                                    edge.target.clone(),
                                    splits,
                                    visited,
                                )?;
                                splits.push(split_task);
                            }
                        }
                        node = gateway.outgoing[primary_index].target.clone();
                    }
                }
            }
        }
    }
}

fn cyclic(at: &str) -> WorkflowError {
    WorkflowError::model(
        CONTEXT,
        codes::CYCLIC_FOLLOW_UP,
        format!("cyclic follow-up at {at}"),
    )
}
