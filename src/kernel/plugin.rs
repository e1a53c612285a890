//! Plugin contract.
//!
//! A plugin is a stateful side-effect unit invoked on every process step.
//! The kernel drives the lifecycle: `init` once at registration, `run` per
//! processed event in registration order, `close` once per step in reverse
//! order. `close(true)` signals a rollback — a plugin must discard any
//! deferred side effects (outgoing mail, queued notifications) instead of
//! committing them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::WorkflowContext;
use crate::document::ItemCollection;
use crate::error::PluginError;

#[async_trait]
pub trait Plugin: Send {
    /// Stable plugin name; BPMN events may reference plugins by this name.
    fn name(&self) -> &str;

    /// Called once when the plugin is registered with a kernel.
    fn init(&mut self, _ctx: &Arc<WorkflowContext>) -> Result<(), PluginError> {
        Ok(())
    }

    /// Executes the plugin for one event. The workitem may be mutated in
    /// place; an error aborts the step and rolls back the chain.
    async fn run(
        &mut self,
        workitem: &mut ItemCollection,
        event: &ItemCollection,
    ) -> Result<(), PluginError>;

    /// Called once per step after processing finished, in reverse
    /// registration order. With `rollback == false` deferred side effects
    /// must be committed, with `rollback == true` discarded. Errors raised
    /// here are logged by the kernel, never propagated.
    async fn close(&mut self, _rollback: bool) -> Result<(), PluginError> {
        Ok(())
    }
}
