//! Workflow context handle.
//!
//! Bundles the process-wide collaborators (model manager, document store,
//! rule engine, lifecycle publisher) together with the caller identity of
//! the current request. The context is passed explicitly to the kernel and
//! to every plugin — there is no ambient singleton; hosts create one
//! context per security principal and share the inner services through
//! `Arc`s.

use std::sync::Arc;

use crate::document::ItemCollection;
use crate::error::Result;
use crate::events::LifecycleEventPublisher;
use crate::model::ModelManager;
use crate::rules::RuleEngine;
use crate::storage::DocumentStore;
use crate::text;

/// Role granting unrestricted document access.
pub const MANAGER_ACCESS: &str = "ACCESSLEVEL.MANAGERACCESS";

pub struct WorkflowContext {
    caller: String,
    roles: Vec<String>,
    model_manager: Arc<ModelManager>,
    document_store: Arc<dyn DocumentStore>,
    rule_engine: Arc<RuleEngine>,
    publisher: LifecycleEventPublisher,
}

impl WorkflowContext {
    pub fn new(
        caller: impl Into<String>,
        model_manager: Arc<ModelManager>,
        document_store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            caller: caller.into(),
            roles: Vec::new(),
            model_manager,
            document_store,
            rule_engine: Arc::new(RuleEngine::new()),
            publisher: LifecycleEventPublisher::default(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Applies engine-level settings (event channel capacity).
    pub fn with_engine_config(mut self, config: &crate::config::EngineConfig) -> Self {
        self.publisher = LifecycleEventPublisher::new(config.event_channel_capacity);
        self
    }

    pub fn with_publisher(mut self, publisher: LifecycleEventPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// The authenticated caller of the current request.
    pub fn caller_name(&self) -> &str {
        &self.caller
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_manager(&self) -> bool {
        self.has_role(MANAGER_ACCESS)
    }

    pub fn model_manager(&self) -> &Arc<ModelManager> {
        &self.model_manager
    }

    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.document_store
    }

    pub fn rule_engine(&self) -> &Arc<RuleEngine> {
        &self.rule_engine
    }

    pub fn publisher(&self) -> &LifecycleEventPublisher {
        &self.publisher
    }

    /// Runs the text substitution pipeline against a workitem.
    pub fn adapt_text(&self, template: &str, workitem: &ItemCollection) -> String {
        text::adapt_text(template, workitem)
    }

    /// List-expanding text substitution, used for ACL entries.
    pub fn adapt_text_list(&self, template: &str, workitem: &ItemCollection) -> Vec<String> {
        text::adapt_text_list(template, workitem)
    }

    /// Resolves the task entity the workitem will rest in after its current
    /// event completed, walking any gateways on the way. Plugins use this
    /// to read annotations of the *next* task before the kernel commits
    /// the transition.
    pub async fn eval_next_task(&self, workitem: &ItemCollection) -> Result<ItemCollection> {
        let model = self.model_manager.get_model_by_workitem(workitem).await?;
        let event = model.event(workitem.task_id(), workitem.event_id())?;
        let walk = crate::kernel::walk_successor(&model, &self.rule_engine, workitem, event)?;
        Ok(model.task(walk.next_task)?.clone())
    }
}
