//! Ownership control.
//!
//! Recomputes the `$owner` item from the `namownershipnames` /
//! `keyownershipfields` annotations of the triggering event or the next
//! task. The rules mirror the ACL recomputation: without `keyupdateacl`
//! nothing changes, the event's annotations win over the task's, the
//! resulting list replaces the previous owner list. The deprecated
//! `namowner` item is mirrored automatically by the document layer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::constants;
use crate::context::WorkflowContext;
use crate::document::ItemCollection;
use crate::error::{codes, PluginError};
use crate::kernel::Plugin;
use crate::plugins::util::{merge_field_list, merge_value_list, unique_list};

pub struct OwnerPlugin {
    ctx: Option<Arc<WorkflowContext>>,
}

impl OwnerPlugin {
    pub fn new() -> Self {
        Self { ctx: None }
    }

    fn context(&self) -> Result<&Arc<WorkflowContext>, PluginError> {
        self.ctx.as_ref().ok_or_else(|| {
            PluginError::new("OwnerPlugin", codes::INVALID_WORKITEM, "plugin not initialized")
        })
    }
}

impl Default for OwnerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for OwnerPlugin {
    fn name(&self) -> &str {
        "owner"
    }

    fn init(&mut self, ctx: &Arc<WorkflowContext>) -> Result<(), PluginError> {
        self.ctx = Some(ctx.clone());
        Ok(())
    }

    async fn run(
        &mut self,
        workitem: &mut ItemCollection,
        event: &ItemCollection,
    ) -> Result<(), PluginError> {
        let ctx = self.context()?.clone();

        // the next task can carry owner annotations of its own
        let next_task = ctx.eval_next_task(workitem).await.ok();

        let event_updates = event.item_boolean("keyupdateacl");
        let task_updates = next_task
            .as_ref()
            .map(|t| t.item_boolean("keyupdateacl"))
            .unwrap_or(false);
        if !event_updates && !task_updates {
            return Ok(());
        }

        // annotations are never merged across event and task
        let source = if event_updates {
            event
        } else {
            next_task.as_ref().expect("task_updates implies next_task")
        };

        let mut owners: Vec<String> = Vec::new();
        let snapshot = workitem.clone();
        merge_value_list(
            &mut owners,
            &source.item_string_list("namownershipnames"),
            &snapshot,
            &ctx,
        );
        merge_field_list(
            &snapshot,
            &mut owners,
            &source.item_string_list("keyownershipfields"),
        );
        let owners = unique_list(owners);

        workitem.set_item_value_list(constants::OWNER, owners);
        Ok(())
    }
}
