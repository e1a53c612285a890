//! # Rule Engine
//!
//! Evaluates model-embedded scripts against a `(workitem, event)` context.
//! Two flavors exist:
//!
//! - **expressions** return a boolean and route conditional gateways,
//! - **business rules** build a `result` object map whose entries are
//!   merged back onto the workitem.
//!
//! Scripts run on an embedded [rhai] engine. Workitem items whose names
//! are valid identifiers are pushed into the scope as plain variables
//! (`a == 1 && b == "DE"`), and the full documents are reachable through
//! the `workitem` / `event` objects with their typed accessors
//! (`workitem.getItemValueString("space.team")`, `workitem.hasItem(…)`).
//!
//! Scripts written for the deprecated engine generation are detected and
//! rewritten on the fly, see [`legacy`]. Compile and runtime failures —
//! including scripts exceeding the operation budget — surface as
//! `PluginError` with code `RULE_ERROR`.

pub mod legacy;

use rhai::{Dynamic, Engine, Scope};
use tracing::debug;

use crate::document::{ItemCollection, ItemValue};
use crate::error::{codes, PluginError};

const CONTEXT: &str = "RuleEngine";

/// Operation budget per evaluation; the engine aborts scripts that exceed
/// it instead of letting a gateway loop forever.
const MAX_OPERATIONS: u64 = 500_000;

pub struct RuleEngine {
    engine: Engine,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);

        engine.register_type_with_name::<ItemCollection>("ItemCollection");
        engine.register_fn("getItemValueString", |doc: &mut ItemCollection, name: &str| {
            doc.item_string(name)
        });
        engine.register_fn("getItemValueDouble", |doc: &mut ItemCollection, name: &str| {
            doc.item_double(name)
        });
        engine.register_fn("getItemValueInteger", |doc: &mut ItemCollection, name: &str| {
            doc.item_integer(name)
        });
        engine.register_fn("getItemValueBoolean", |doc: &mut ItemCollection, name: &str| {
            doc.item_boolean(name)
        });
        engine.register_fn("hasItem", |doc: &mut ItemCollection, name: &str| {
            doc.has_item(name)
        });
        engine.register_fn("isItemEmpty", |doc: &mut ItemCollection, name: &str| {
            doc.is_item_empty(name)
        });

        Self { engine }
    }

    /// Evaluates a boolean expression, e.g. a gateway edge condition.
    pub fn evaluate_boolean_expression(
        &self,
        script: &str,
        workitem: &ItemCollection,
        event: Option<&ItemCollection>,
    ) -> Result<bool, PluginError> {
        let script = self.prepare(script, workitem, event);
        let mut scope = self.build_scope(workitem, event);
        let value = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, &script)
            .map_err(|e| rule_error(format!("expression failed: {e}")))?;

        if let Ok(flag) = value.as_bool() {
            return Ok(flag);
        }
        if let Ok(int) = value.as_int() {
            return Ok(int != 0);
        }
        Err(rule_error(format!(
            "expression did not evaluate to a boolean: '{script}'"
        )))
    }

    /// Evaluates a business rule script and merges its `result` object map
    /// back onto the workitem.
    pub fn evaluate_business_rule(
        &self,
        script: &str,
        workitem: &mut ItemCollection,
        event: Option<&ItemCollection>,
    ) -> Result<(), PluginError> {
        let script = self.prepare(script, workitem, event);
        let mut scope = self.build_scope(workitem, event);
        self.engine
            .eval_with_scope::<Dynamic>(&mut scope, &script)
            .map_err(|e| rule_error(format!("script failed: {e}")))?;

        if let Some(result) = scope.get_value::<rhai::Map>("result") {
            for (name, value) in result {
                let values = dynamic_to_values(value)?;
                workitem.replace_item_value(name.as_str(), values);
            }
        }
        Ok(())
    }

    fn prepare(
        &self,
        script: &str,
        workitem: &ItemCollection,
        event: Option<&ItemCollection>,
    ) -> String {
        if legacy::is_deprecated_script(script) {
            let rewritten = legacy::rewrite(script, workitem, event);
            debug!(original = %script, rewritten = %rewritten, "deprecated script rewritten");
            rewritten
        } else {
            script.to_string()
        }
    }

    fn build_scope(
        &self,
        workitem: &ItemCollection,
        event: Option<&ItemCollection>,
    ) -> Scope<'static> {
        let mut scope = Scope::new();
        for name in workitem.item_names() {
            if !is_identifier(&name) {
                continue;
            }
            if let Some(value) = workitem.item_value(&name).first() {
                if let Some(dynamic) = value_to_dynamic(value) {
                    scope.push_dynamic(name, dynamic);
                }
            }
        }
        scope.push("workitem", workitem.clone());
        scope.push("event", event.cloned().unwrap_or_default());
        scope
    }
}

fn rule_error(message: String) -> PluginError {
    PluginError::new(CONTEXT, codes::RULE_ERROR, message)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn value_to_dynamic(value: &ItemValue) -> Option<Dynamic> {
    match value {
        ItemValue::Text(s) => Some(s.clone().into()),
        ItemValue::Integer(i) => Some((*i).into()),
        ItemValue::Double(d) => Some((*d).into()),
        ItemValue::Decimal(d) => d.to_string().parse::<f64>().ok().map(Into::into),
        ItemValue::Bool(b) => Some((*b).into()),
        ItemValue::Date(d) => Some(d.to_rfc3339().into()),
        _ => None,
    }
}

fn dynamic_to_values(value: Dynamic) -> Result<Vec<ItemValue>, PluginError> {
    if value.is_array() {
        let array = value
            .try_cast::<rhai::Array>()
            .ok_or_else(|| rule_error("invalid array in result".into()))?;
        let mut values = Vec::with_capacity(array.len());
        for entry in array {
            values.extend(dynamic_to_values(entry)?);
        }
        return Ok(values);
    }
    let single = dynamic_to_value(value)?;
    Ok(vec![single])
}

fn dynamic_to_value(value: Dynamic) -> Result<ItemValue, PluginError> {
    if value.is_int() {
        return Ok(ItemValue::Integer(value.as_int().unwrap_or_default()));
    }
    if value.is_float() {
        return Ok(ItemValue::Double(value.as_float().unwrap_or_default()));
    }
    if value.is_bool() {
        return Ok(ItemValue::Bool(value.as_bool().unwrap_or_default()));
    }
    if value.is_string() {
        return Ok(ItemValue::Text(
            value.into_immutable_string().unwrap_or_default().to_string(),
        ));
    }
    if value.is_map() {
        let map = value
            .try_cast::<rhai::Map>()
            .ok_or_else(|| rule_error("invalid object in result".into()))?;
        let mut result = std::collections::BTreeMap::new();
        for (name, entry) in map {
            result.insert(name.to_lowercase(), dynamic_to_values(entry)?);
        }
        return Ok(ItemValue::Map(result));
    }
    Err(rule_error(format!(
        "unsupported result value of type '{}'",
        value.type_name()
    )))
}
