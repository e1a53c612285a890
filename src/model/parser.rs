//! BPMN 2.0 XML parser.
//!
//! Consumes BPMN XML with the engine's extension attributes and emits a
//! validated [`BpmnModel`]. The accepted dialect:
//!
//! - `<task>` elements carry `numprocessid` plus optional extension items
//!   and embedded `<dataObject>` children,
//! - `<intermediateCatchEvent>` elements carry `numprocessid` (source
//!   task), `numactivityid` (event id) and `numnextprocessid` (successor
//!   task),
//! - `<exclusiveGateway>` / `<inclusiveGateway>` route through
//!   `<sequenceFlow>` elements whose `<conditionExpression>` children carry
//!   boolean scripts; a flow without condition is the else edge, a flow
//!   with `primary="true"` marks the main path of a split,
//! - model-wide settings (`txtworkflowmodelversion`, defaults) live in the
//!   process' `<extensionElements>` as `<item name="…"><value>…</value></item>`
//!   bags.
//!
//! Validation failures surface as `INVALID_MODEL_ENTRY` naming the
//! offending element id.

use std::collections::HashMap;

use serde::Deserialize;

use super::{BpmnModel, Gateway, GatewayEdge, GatewayKind, NodeRef};
use crate::constants;
use crate::document::{ItemCollection, ItemValue};
use crate::error::{codes, Result, WorkflowError};

#[derive(Debug, Deserialize)]
struct XmlDefinitions {
    process: XmlProcess,
}

#[derive(Debug, Deserialize)]
struct XmlProcess {
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "extensionElements")]
    extensions: Option<XmlExtensions>,
    #[serde(rename = "task", default)]
    tasks: Vec<XmlTask>,
    #[serde(rename = "intermediateCatchEvent", default)]
    events: Vec<XmlEvent>,
    #[serde(rename = "exclusiveGateway", default)]
    exclusive_gateways: Vec<XmlGateway>,
    #[serde(rename = "inclusiveGateway", default)]
    inclusive_gateways: Vec<XmlGateway>,
    #[serde(rename = "sequenceFlow", default)]
    flows: Vec<XmlFlow>,
}

#[derive(Debug, Deserialize, Default)]
struct XmlExtensions {
    #[serde(rename = "item", default)]
    items: Vec<XmlItem>,
}

#[derive(Debug, Deserialize)]
struct XmlItem {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "value", default)]
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct XmlTask {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@numprocessid")]
    numprocessid: i64,
    #[serde(rename = "extensionElements")]
    extensions: Option<XmlExtensions>,
    #[serde(rename = "dataObject", default)]
    data_objects: Vec<XmlDataObject>,
}

#[derive(Debug, Deserialize)]
struct XmlDataObject {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$text")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlEvent {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@numprocessid")]
    numprocessid: i64,
    #[serde(rename = "@numactivityid")]
    numactivityid: i64,
    #[serde(rename = "@numnextprocessid")]
    numnextprocessid: Option<i64>,
    #[serde(rename = "extensionElements")]
    extensions: Option<XmlExtensions>,
}

#[derive(Debug, Deserialize)]
struct XmlGateway {
    #[serde(rename = "@id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct XmlFlow {
    #[serde(rename = "@sourceRef")]
    source_ref: String,
    #[serde(rename = "@targetRef")]
    target_ref: String,
    #[serde(rename = "@primary")]
    primary: Option<bool>,
    #[serde(rename = "conditionExpression")]
    condition: Option<String>,
}

/// Parses BPMN XML bytes into a validated model.
pub fn parse_model(data: &[u8]) -> Result<BpmnModel> {
    let text = std::str::from_utf8(data).map_err(|e| {
        WorkflowError::model("BpmnParser", codes::INVALID_MODEL_ENTRY, e.to_string())
    })?;
    let definitions: XmlDefinitions = quick_xml::de::from_str(text).map_err(|e| {
        WorkflowError::model("BpmnParser", codes::INVALID_MODEL_ENTRY, e.to_string())
    })?;
    build_model(definitions.process)
}

fn build_model(process: XmlProcess) -> Result<BpmnModel> {
    let mut definition = ItemCollection::new();
    apply_extensions(&mut definition, &process.extensions);
    // accept both the canonical and the modeler item name for the version
    let version = {
        let canonical = definition.item_string(constants::MODELVERSION);
        if canonical.is_empty() {
            definition.item_string("txtworkflowmodelversion")
        } else {
            canonical
        }
    };
    if version.is_empty() {
        return Err(WorkflowError::model(
            "BpmnParser",
            codes::INVALID_MODEL_ENTRY,
            "process carries no model version",
        ));
    }
    definition.set_item_value(constants::MODELVERSION, version.as_str());

    let mut model = BpmnModel::new(definition);

    // node index: xml id -> graph reference
    let mut nodes: HashMap<String, NodeRef> = HashMap::new();

    for task in &process.tasks {
        nodes.insert(task.id.clone(), NodeRef::Task(task.numprocessid));
    }
    for event in &process.events {
        nodes.insert(
            event.id.clone(),
            NodeRef::Event {
                task_id: event.numprocessid,
                event_id: event.numactivityid,
            },
        );
    }
    for gateway in process
        .exclusive_gateways
        .iter()
        .chain(process.inclusive_gateways.iter())
    {
        nodes.insert(gateway.id.clone(), NodeRef::Gateway(gateway.id.clone()));
    }

    for task in process.tasks {
        let process_group = process.name.clone().unwrap_or_default();
        model.add_task(build_task(task, &process_group))?;
    }

    for event in process.events {
        model.add_event(build_event(event, &process.flows, &nodes)?)?;
    }

    for gateway in process.exclusive_gateways {
        model.add_gateway(build_gateway(gateway, GatewayKind::Conditional, &process.flows, &nodes)?);
    }
    for gateway in process.inclusive_gateways {
        model.add_gateway(build_gateway(gateway, GatewayKind::Split, &process.flows, &nodes)?);
    }

    Ok(model)
}

fn apply_extensions(entity: &mut ItemCollection, extensions: &Option<XmlExtensions>) {
    if let Some(extensions) = extensions {
        for item in &extensions.items {
            let values = item
                .values
                .iter()
                .map(|v| ItemValue::Text(v.clone()))
                .collect();
            entity.replace_item_value(&item.name, values);
        }
    }
}

fn build_task(task: XmlTask, process_group: &str) -> ItemCollection {
    let mut entity = ItemCollection::new();
    apply_extensions(&mut entity, &task.extensions);
    entity.set_item_value("numprocessid", task.numprocessid);
    if let Some(name) = &task.name {
        entity.set_item_value("name", name.as_str());
        if entity.is_item_empty("txtworkflowstatus") {
            entity.set_item_value("txtworkflowstatus", name.as_str());
        }
    }
    if entity.is_item_empty("txtworkflowgroup") && !process_group.is_empty() {
        entity.set_item_value("txtworkflowgroup", process_group);
    }
    if !task.data_objects.is_empty() {
        let mut map = std::collections::BTreeMap::new();
        for data_object in task.data_objects {
            map.insert(
                data_object.name.to_lowercase(),
                vec![ItemValue::Text(data_object.content.unwrap_or_default())],
            );
        }
        entity.set_item_value("dataobjects", ItemValue::Map(map));
    }
    entity
}

fn build_event(
    event: XmlEvent,
    flows: &[XmlFlow],
    nodes: &HashMap<String, NodeRef>,
) -> Result<ItemCollection> {
    let mut entity = ItemCollection::new();
    apply_extensions(&mut entity, &event.extensions);
    entity.set_item_value("numprocessid", event.numprocessid);
    entity.set_item_value("numactivityid", event.numactivityid);
    if let Some(name) = &event.name {
        entity.set_item_value("name", name.as_str());
    }
    if let Some(next) = event.numnextprocessid {
        entity.set_item_value("numnextprocessid", next);
    }

    // an outgoing sequence flow overrides the attribute successor
    if let Some(flow) = flows.iter().find(|f| f.source_ref == event.id) {
        match nodes.get(&flow.target_ref) {
            Some(NodeRef::Gateway(id)) => {
                entity.set_item_value("_gateway", id.as_str());
            }
            Some(NodeRef::Task(task_id)) => {
                entity.set_item_value("numnextprocessid", *task_id);
            }
            Some(NodeRef::Event { .. }) | None => {
                return Err(WorkflowError::model(
                    "BpmnParser",
                    codes::INVALID_MODEL_ENTRY,
                    format!("event '{}' has an invalid outgoing flow", event.id),
                ));
            }
        }
    }
    Ok(entity)
}

fn build_gateway(
    gateway: XmlGateway,
    kind: GatewayKind,
    flows: &[XmlFlow],
    nodes: &HashMap<String, NodeRef>,
) -> Result<Gateway> {
    let mut outgoing = Vec::new();
    for flow in flows.iter().filter(|f| f.source_ref == gateway.id) {
        let target = nodes.get(&flow.target_ref).cloned().ok_or_else(|| {
            WorkflowError::model(
                "BpmnParser",
                codes::INVALID_MODEL_ENTRY,
                format!(
                    "gateway '{}' flows into unknown node '{}'",
                    gateway.id, flow.target_ref
                ),
            )
        })?;
        let condition = flow
            .condition
            .as_ref()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        outgoing.push(GatewayEdge {
            condition,
            primary: flow.primary.unwrap_or(false),
            target,
        });
    }
    if outgoing.is_empty() {
        return Err(WorkflowError::model(
            "BpmnParser",
            codes::INVALID_MODEL_ENTRY,
            format!("gateway '{}' has no outgoing flows", gateway.id),
        ));
    }
    if kind == GatewayKind::Conditional && outgoing.iter().all(|e| e.condition.is_some()) {
        return Err(WorkflowError::model(
            "BpmnParser",
            codes::INVALID_MODEL_ENTRY,
            format!("conditional gateway '{}' has no else edge", gateway.id),
        ));
    }
    Ok(Gateway {
        id: gateway.id,
        kind,
        outgoing,
    })
}
