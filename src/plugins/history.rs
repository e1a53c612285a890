//! Workflow history log.
//!
//! Appends one entry per processed event to the `txtworkflowhistory` item.
//! The entry text comes from the event's `rtfresultlog` annotation (run
//! through text substitution) or falls back to the event name. The log is
//! bounded: `numworkflowhistorylength` on the event caps the number of
//! retained entries, oldest first out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::context::WorkflowContext;
use crate::document::{ItemCollection, ItemValue};
use crate::error::PluginError;
use crate::kernel::Plugin;

pub const ITEM_HISTORY: &str = "txtworkflowhistory";

pub struct HistoryPlugin {
    ctx: Option<Arc<WorkflowContext>>,
}

impl HistoryPlugin {
    pub fn new() -> Self {
        Self { ctx: None }
    }
}

impl Default for HistoryPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for HistoryPlugin {
    fn name(&self) -> &str {
        "history"
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
        let template = {
            let result_log = event.item_string("rtfresultlog");
            if result_log.is_empty() {
                event.item_string("name")
            } else {
                result_log
            }
        };
        if template.is_empty() {
            return Ok(());
        }

        let text = match &self.ctx {
            Some(ctx) => ctx.adapt_text(&template, workitem),
            None => template,
        };
        let entry = format!("{} : {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), text);

        let mut history: Vec<ItemValue> = workitem.item_value(ITEM_HISTORY).to_vec();
        history.push(ItemValue::Text(entry));

        let max_length = event.item_integer("numworkflowhistorylength");
        if max_length > 0 && history.len() > max_length as usize {
            let overflow = history.len() - max_length as usize;
            history.drain(..overflow);
        }
        workitem.replace_item_value(ITEM_HISTORY, history);
        Ok(())
    }
}
