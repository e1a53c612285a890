//! Shared fixtures for the end-to-end scenario tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use docflow_core::error::{codes, PluginError};
use docflow_core::model::parse_model;
use docflow_core::{
    InMemoryDocumentStore, ItemCollection, ModelManager, Plugin, WorkflowContext,
};

/// Task 100, event 10 → task 200.
pub const SIMPLE_MODEL: &str = r#"
<definitions>
  <process name="Ticket">
    <extensionElements>
      <item name="txtworkflowmodelversion"><value>1.0.0</value></item>
    </extensionElements>
    <task id="t100" name="Open" numprocessid="100"/>
    <task id="t200" name="Accepted" numprocessid="200"/>
    <intermediateCatchEvent id="e1" name="accept"
        numprocessid="100" numactivityid="10" numnextprocessid="200"/>
  </process>
</definitions>"#;

/// Task 100, event 10 → conditional gateway:
/// `a==1 && b=="DE"` → task 200, else → task 900.
pub const GATEWAY_MODEL: &str = r#"
<definitions>
  <process name="Approval">
    <extensionElements>
      <item name="txtworkflowmodelversion"><value>1.0.0</value></item>
    </extensionElements>
    <task id="t100" name="New" numprocessid="100"/>
    <task id="t200" name="Approved" numprocessid="200"/>
    <task id="t900" name="Rejected" numprocessid="900"/>
    <intermediateCatchEvent id="e1" name="submit"
        numprocessid="100" numactivityid="10"/>
    <exclusiveGateway id="g1"/>
    <sequenceFlow sourceRef="e1" targetRef="g1"/>
    <sequenceFlow sourceRef="g1" targetRef="t200">
      <conditionExpression>a==1 &amp;&amp; b=="DE"</conditionExpression>
    </sequenceFlow>
    <sequenceFlow sourceRef="g1" targetRef="t900"/>
  </process>
</definitions>"#;

/// Task 100, event 10 → split gateway with two always-true branches;
/// primary → task 210, sibling → task 220.
pub const SPLIT_MODEL: &str = r#"
<definitions>
  <process name="Contract">
    <extensionElements>
      <item name="txtworkflowmodelversion"><value>1.0.0</value></item>
    </extensionElements>
    <task id="t100" name="Draft" numprocessid="100"/>
    <task id="t210" name="Main" numprocessid="210"/>
    <task id="t220" name="Archive" numprocessid="220"/>
    <intermediateCatchEvent id="e1" name="finalize"
        numprocessid="100" numactivityid="10"/>
    <inclusiveGateway id="split1"/>
    <sequenceFlow sourceRef="e1" targetRef="split1"/>
    <sequenceFlow sourceRef="split1" targetRef="t210" primary="true">
      <conditionExpression>1==1</conditionExpression>
    </sequenceFlow>
    <sequenceFlow sourceRef="split1" targetRef="t220">
      <conditionExpression>1==1</conditionExpression>
    </sequenceFlow>
  </process>
</definitions>"#;

/// Task 100, event 10 → task 300; task 300 replaces the write access list.
pub const ACL_MODEL: &str = r#"
<definitions>
  <process name="Ticket">
    <extensionElements>
      <item name="txtworkflowmodelversion"><value>1.0.0</value></item>
    </extensionElements>
    <task id="t100" name="Open" numprocessid="100"/>
    <task id="t300" name="Assigned" numprocessid="300">
      <extensionElements>
        <item name="keyupdateacl"><value>true</value></item>
        <item name="namaddwriteaccess"><value>joe</value><value>sam</value></item>
      </extensionElements>
    </task>
    <intermediateCatchEvent id="e1" name="assign"
        numprocessid="100" numactivityid="10" numnextprocessid="300"/>
  </process>
</definitions>"#;

/// Builds a context over an in-memory store with the given model loaded.
pub async fn context_with_model(
    caller: &str,
    model_xml: &str,
    store: Arc<InMemoryDocumentStore>,
) -> Arc<WorkflowContext> {
    let model_manager = Arc::new(ModelManager::new());
    model_manager
        .add_model(parse_model(model_xml.as_bytes()).expect("model parses"))
        .await
        .expect("model registers");
    Arc::new(WorkflowContext::new(caller, model_manager, store))
}

/// Records every plugin lifecycle call into a shared journal.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Run(String),
    Close(String, bool),
}

pub type Journal = Arc<Mutex<Vec<JournalEntry>>>;

pub struct JournalPlugin {
    name: String,
    journal: Journal,
    /// item set on every run, e.g. ("x", 1)
    sets: Option<(String, i64)>,
    fails: bool,
}

impl JournalPlugin {
    pub fn observing(name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            journal,
            sets: None,
            fails: false,
        }
    }

    pub fn setting(name: &str, journal: Journal, item: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            journal,
            sets: Some((item.to_string(), value)),
            fails: false,
        }
    }

    pub fn failing(name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            journal,
            sets: None,
            fails: true,
        }
    }
}

#[async_trait]
impl Plugin for JournalPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &mut self,
        workitem: &mut ItemCollection,
        _event: &ItemCollection,
    ) -> Result<(), PluginError> {
        self.journal
            .lock()
            .await
            .push(JournalEntry::Run(self.name.clone()));
        if let Some((item, value)) = &self.sets {
            workitem.set_item_value(item, *value);
        }
        if self.fails {
            return Err(PluginError::new(
                self.name.clone(),
                codes::INVALID_WORKITEM,
                "plugin failure requested by test",
            ));
        }
        Ok(())
    }

    async fn close(&mut self, rollback: bool) -> Result<(), PluginError> {
        self.journal
            .lock()
            .await
            .push(JournalEntry::Close(self.name.clone(), rollback));
        Ok(())
    }
}
