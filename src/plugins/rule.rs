//! Business rule execution.
//!
//! Runs the `txtbusinessrule` script attached to the triggering event and
//! merges the script's `result` bag onto the workitem. Two merged items
//! are interpreted as controls and consumed here:
//!
//! - `isvalid == false` aborts the step with the optional `errormessage`,
//! - `followup > 0` enqueues a follow-up event id.

use std::sync::Arc;

use async_trait::async_trait;

use crate::constants;
use crate::context::WorkflowContext;
use crate::document::ItemCollection;
use crate::error::{codes, PluginError};
use crate::kernel::Plugin;

pub struct RulePlugin {
    ctx: Option<Arc<WorkflowContext>>,
}

impl RulePlugin {
    pub fn new() -> Self {
        Self { ctx: None }
    }
}

impl Default for RulePlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for RulePlugin {
    fn name(&self) -> &str {
        "rule"
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
        let script = event.item_string("txtbusinessrule");
        if script.trim().is_empty() {
            return Ok(());
        }
        let ctx = self.ctx.as_ref().ok_or_else(|| {
            PluginError::new("RulePlugin", codes::INVALID_WORKITEM, "plugin not initialized")
        })?;

        ctx.rule_engine()
            .evaluate_business_rule(&script, workitem, Some(event))?;

        // control items produced by the script
        if workitem.has_item("isvalid") && !workitem.item_boolean("isvalid") {
            let message = {
                let m = workitem.item_string("errormessage");
                if m.is_empty() {
                    "business rule rejected the workitem".to_string()
                } else {
                    m
                }
            };
            workitem.remove_item("isvalid");
            workitem.remove_item("errormessage");
            return Err(PluginError::new("RulePlugin", codes::INVALID_WORKITEM, message));
        }
        workitem.remove_item("isvalid");

        let followup = workitem.item_integer("followup");
        if followup > 0 {
            workitem.append_item_value(constants::ACTIVITYIDLIST, followup);
        }
        workitem.remove_item("followup");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelManager;
    use crate::storage::InMemoryDocumentStore;

    fn ctx() -> Arc<WorkflowContext> {
        Arc::new(WorkflowContext::new(
            "anna",
            Arc::new(ModelManager::new()),
            Arc::new(InMemoryDocumentStore::new()),
        ))
    }

    fn event_with_rule(script: &str) -> ItemCollection {
        let mut event = ItemCollection::new();
        event.set_item_value("txtbusinessrule", script);
        event
    }

    #[tokio::test]
    async fn merges_result_items() {
        let mut plugin = RulePlugin::new();
        plugin.init(&ctx()).unwrap();

        let mut workitem = ItemCollection::new();
        workitem.set_item_value("amount", 120.0);
        let event = event_with_rule(
            r#"let result = #{}; result.approved = workitem.getItemValueDouble("amount") > 100.0;"#,
        );

        plugin.run(&mut workitem, &event).await.unwrap();
        assert!(workitem.item_boolean("approved"));
    }

    #[tokio::test]
    async fn invalid_result_aborts_with_message() {
        let mut plugin = RulePlugin::new();
        plugin.init(&ctx()).unwrap();

        let mut workitem = ItemCollection::new();
        let event = event_with_rule(
            r#"let result = #{}; result.isvalid = false; result.errormessage = "budget exceeded";"#,
        );

        let err = plugin.run(&mut workitem, &event).await.unwrap_err();
        assert_eq!(err.message, "budget exceeded");
        assert!(!workitem.has_item("isvalid"));
    }

    #[tokio::test]
    async fn followup_is_enqueued() {
        let mut plugin = RulePlugin::new();
        plugin.init(&ctx()).unwrap();

        let mut workitem = ItemCollection::new();
        let event = event_with_rule(r#"let result = #{}; result.followup = 20;"#);

        plugin.run(&mut workitem, &event).await.unwrap();
        assert_eq!(
            workitem.item_integer_list(constants::ACTIVITYIDLIST),
            vec![20]
        );
        assert!(!workitem.has_item("followup"));
    }

    #[tokio::test]
    async fn missing_script_is_a_no_op() {
        let mut plugin = RulePlugin::new();
        plugin.init(&ctx()).unwrap();
        let mut workitem = ItemCollection::new();
        plugin.run(&mut workitem, &ItemCollection::new()).await.unwrap();
        assert!(workitem.is_empty());
    }

    #[tokio::test]
    async fn script_errors_surface_as_rule_error() {
        let mut plugin = RulePlugin::new();
        plugin.init(&ctx()).unwrap();
        let mut workitem = ItemCollection::new();
        let event = event_with_rule("let x = ;");
        let err = plugin.run(&mut workitem, &event).await.unwrap_err();
        assert!(err.is_rule_error());
    }
}
