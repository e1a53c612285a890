//! # BPMN Model
//!
//! The in-memory form of one parsed BPMN model version: Tasks indexed by
//! numeric id, Events indexed by `(task id, event id)`, gateways with their
//! outgoing edges, and the definition profile. Task and Event entities are
//! plain [`ItemCollection`]s so plugins and the kernel can read model
//! annotations (`keyupdateacl`, mail items, rule scripts, …) with the same
//! accessors they use on workitems.
//!
//! A model is immutable once handed to the
//! [`ModelManager`](manager::ModelManager).

pub mod manager;
pub mod parser;

pub use manager::ModelManager;
pub use parser::parse_model;

use std::collections::{BTreeMap, HashMap};

use crate::constants;
use crate::document::ItemCollection;
use crate::error::{codes, Result, WorkflowError};

/// Reference to a node inside the model graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    Task(i64),
    Event { task_id: i64, event_id: i64 },
    Gateway(String),
}

/// Gateway flavors supported by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    /// Exclusive routing: the first outgoing edge whose condition holds is
    /// taken; the condition-less *else* edge is mandatory.
    Conditional,
    /// Inclusive split: every outgoing edge whose condition holds spawns a
    /// sibling workitem; the main workitem follows the primary edge.
    Split,
}

/// One outgoing edge of a gateway, in model-declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEdge {
    /// Boolean script; `None` marks the else/default edge.
    pub condition: Option<String>,
    /// Marks the main path of a split gateway.
    pub primary: bool,
    pub target: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gateway {
    pub id: String,
    pub kind: GatewayKind,
    pub outgoing: Vec<GatewayEdge>,
}

/// A parsed, validated BPMN model version.
#[derive(Debug, Clone, Default)]
pub struct BpmnModel {
    definition: ItemCollection,
    tasks: BTreeMap<i64, ItemCollection>,
    events: HashMap<i64, Vec<ItemCollection>>,
    gateways: HashMap<String, Gateway>,
    groups: Vec<String>,
}

impl BpmnModel {
    pub fn new(definition: ItemCollection) -> Self {
        Self {
            definition,
            ..Default::default()
        }
    }

    /// The model version string from the definition profile.
    pub fn version(&self) -> String {
        self.definition.item_string(constants::MODELVERSION)
    }

    pub fn definition(&self) -> &ItemCollection {
        &self.definition
    }

    /// Workflow groups collected from all tasks.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Adds a task entity. The entity must carry `numprocessid`; a second
    /// task with the same id is a model error.
    pub fn add_task(&mut self, task: ItemCollection) -> Result<()> {
        let task_id = task.item_integer("numprocessid");
        if task_id <= 0 {
            return Err(WorkflowError::model(
                "BpmnModel",
                codes::INVALID_MODEL_ENTRY,
                "task without numprocessid",
            ));
        }
        if self.tasks.contains_key(&task_id) {
            return Err(WorkflowError::model(
                "BpmnModel",
                codes::INVALID_MODEL_ENTRY,
                format!("duplicate task id {task_id}"),
            ));
        }
        let group = task.item_string("txtworkflowgroup");
        if !group.is_empty() && !self.groups.contains(&group) {
            self.groups.push(group);
        }
        self.tasks.insert(task_id, task);
        Ok(())
    }

    /// Adds an event entity keyed by `(numprocessid, numactivityid)`.
    /// Duplicate event ids within a task are a model validation error.
    pub fn add_event(&mut self, event: ItemCollection) -> Result<()> {
        let task_id = event.item_integer("numprocessid");
        let event_id = event.item_integer("numactivityid");
        if task_id <= 0 || event_id <= 0 {
            return Err(WorkflowError::model(
                "BpmnModel",
                codes::INVALID_MODEL_ENTRY,
                format!("event {task_id}.{event_id} without valid ids"),
            ));
        }
        if !self.tasks.contains_key(&task_id) {
            return Err(WorkflowError::model(
                "BpmnModel",
                codes::INVALID_MODEL_ENTRY,
                format!("event {task_id}.{event_id} references undefined task {task_id}"),
            ));
        }
        let events = self.events.entry(task_id).or_default();
        if events
            .iter()
            .any(|e| e.item_integer("numactivityid") == event_id)
        {
            return Err(WorkflowError::model(
                "BpmnModel",
                codes::INVALID_MODEL_ENTRY,
                format!("duplicate event id {event_id} on task {task_id}"),
            ));
        }
        events.push(event);
        Ok(())
    }

    pub fn add_gateway(&mut self, gateway: Gateway) {
        self.gateways.insert(gateway.id.clone(), gateway);
    }

    /// Resolves a task by id; `UNDEFINED_MODEL_ENTRY` when absent.
    pub fn task(&self, task_id: i64) -> Result<&ItemCollection> {
        self.tasks.get(&task_id).ok_or_else(|| {
            WorkflowError::model(
                "BpmnModel",
                codes::UNDEFINED_MODEL_ENTRY,
                format!("undefined task {task_id}"),
            )
        })
    }

    /// Resolves an event by `(task id, event id)`.
    pub fn event(&self, task_id: i64, event_id: i64) -> Result<&ItemCollection> {
        self.find_all_events_by_task(task_id)
            .iter()
            .find(|e| e.item_integer("numactivityid") == event_id)
            .ok_or_else(|| {
                WorkflowError::model(
                    "BpmnModel",
                    codes::UNDEFINED_MODEL_ENTRY,
                    format!("undefined event {task_id}.{event_id}"),
                )
            })
    }

    pub fn gateway(&self, id: &str) -> Result<&Gateway> {
        self.gateways.get(id).ok_or_else(|| {
            WorkflowError::model(
                "BpmnModel",
                codes::UNDEFINED_MODEL_ENTRY,
                format!("undefined gateway '{id}'"),
            )
        })
    }

    pub fn find_all_tasks(&self) -> Vec<&ItemCollection> {
        self.tasks.values().collect()
    }

    pub fn find_all_events_by_task(&self, task_id: i64) -> &[ItemCollection] {
        self.events
            .get(&task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Tasks whose `txtworkflowgroup` equals the given group.
    pub fn find_tasks_by_group(&self, group: &str) -> Vec<&ItemCollection> {
        if group.is_empty() {
            return Vec::new();
        }
        self.tasks
            .values()
            .filter(|t| t.item_string("txtworkflowgroup") == group)
            .collect()
    }

    /// The literal payload of the BPMN DataObject named `name` attached to
    /// the given task or event entity.
    pub fn data_object(element: &ItemCollection, name: &str) -> Option<String> {
        match element.item_value("dataobjects").first() {
            Some(crate::document::ItemValue::Map(map)) => map
                .get(&name.to_lowercase())
                .and_then(|values| values.first())
                .map(|v| v.to_text()),
            _ => None,
        }
    }

    /// The successor node of an event: an explicit gateway when the event's
    /// outgoing flow points at one, otherwise the task in
    /// `numnextprocessid`.
    pub fn successor_of(&self, event: &ItemCollection) -> Result<NodeRef> {
        let gateway_id = event.item_string("_gateway");
        if !gateway_id.is_empty() {
            return Ok(NodeRef::Gateway(gateway_id));
        }
        let next_task = event.item_integer("numnextprocessid");
        if next_task > 0 {
            return Ok(NodeRef::Task(next_task));
        }
        Err(WorkflowError::model(
            "BpmnModel",
            codes::INVALID_MODEL_ENTRY,
            format!(
                "event {}.{} has no outgoing path",
                event.item_integer("numprocessid"),
                event.item_integer("numactivityid")
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_entity(id: i64, group: &str) -> ItemCollection {
        let mut task = ItemCollection::new();
        task.set_item_value("numprocessid", id);
        task.set_item_value("txtworkflowgroup", group);
        task
    }

    fn event_entity(task_id: i64, event_id: i64, next: i64) -> ItemCollection {
        let mut event = ItemCollection::new();
        event.set_item_value("numprocessid", task_id);
        event.set_item_value("numactivityid", event_id);
        event.set_item_value("numnextprocessid", next);
        event
    }

    #[test]
    fn task_and_event_lookup() {
        let mut model = BpmnModel::default();
        model.add_task(task_entity(100, "Ticket")).unwrap();
        model.add_event(event_entity(100, 10, 200)).unwrap();

        assert!(model.task(100).is_ok());
        assert!(model.event(100, 10).is_ok());
        let missing = model.event(100, 99).unwrap_err();
        assert_eq!(missing.code(), codes::UNDEFINED_MODEL_ENTRY);
    }

    #[test]
    fn duplicate_event_id_is_a_model_error() {
        let mut model = BpmnModel::default();
        model.add_task(task_entity(100, "Ticket")).unwrap();
        model.add_event(event_entity(100, 10, 200)).unwrap();

        let err = model.add_event(event_entity(100, 10, 300)).unwrap_err();
        assert_eq!(err.code(), codes::INVALID_MODEL_ENTRY);
    }

    #[test]
    fn event_for_unknown_task_is_rejected() {
        let mut model = BpmnModel::default();
        let err = model.add_event(event_entity(7, 10, 200)).unwrap_err();
        assert_eq!(err.code(), codes::INVALID_MODEL_ENTRY);
    }

    #[test]
    fn groups_are_collected_from_tasks() {
        let mut model = BpmnModel::default();
        model.add_task(task_entity(100, "Ticket")).unwrap();
        model.add_task(task_entity(200, "Ticket")).unwrap();
        model.add_task(task_entity(300, "Invoice")).unwrap();

        assert_eq!(model.groups(), &["Ticket".to_string(), "Invoice".to_string()]);
        assert_eq!(model.find_tasks_by_group("Ticket").len(), 2);
    }

    #[test]
    fn successor_prefers_gateway_over_next_task() {
        let mut model = BpmnModel::default();
        model.add_task(task_entity(100, "Ticket")).unwrap();

        let mut event = event_entity(100, 10, 200);
        assert_eq!(model.successor_of(&event).unwrap(), NodeRef::Task(200));

        event.set_item_value("_gateway", "gw1");
        assert_eq!(
            model.successor_of(&event).unwrap(),
            NodeRef::Gateway("gw1".to_string())
        );
    }
}
