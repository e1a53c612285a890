//! Activity result processing.
//!
//! An event may carry a `txtactivityresult` annotation with `<item>`
//! directives that write workitem items on every execution:
//!
//! ```xml
//! <item name="type">archive</item>
//! <item name="priority" type="integer">3</item>
//! ```
//!
//! The whole annotation passes through text substitution first, so values
//! may reference workitem items. An optional `type` attribute converts the
//! value (`integer`, `double`, `boolean`); the default is text.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::context::WorkflowContext;
use crate::document::{ItemCollection, ItemValue};
use crate::error::{codes, PluginError};
use crate::kernel::Plugin;

pub struct ResultPlugin {
    ctx: Option<Arc<WorkflowContext>>,
}

impl ResultPlugin {
    pub fn new() -> Self {
        Self { ctx: None }
    }
}

impl Default for ResultPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ResultPlugin {
    fn name(&self) -> &str {
        "result"
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
        let raw = event.item_string("txtactivityresult");
        if raw.trim().is_empty() {
            return Ok(());
        }
        let resolved = match &self.ctx {
            Some(ctx) => ctx.adapt_text(&raw, workitem),
            None => raw,
        };
        for (name, item_type, value) in parse_item_directives(&resolved) {
            let value = convert(&value, item_type.as_deref()).map_err(|message| {
                PluginError::new("ResultPlugin", codes::INVALID_ITEM_VALUE, message)
            })?;
            workitem.set_item_value(&name, value);
        }
        Ok(())
    }
}

fn parse_item_directives(text: &str) -> Vec<(String, Option<String>, String)> {
    let tag = Regex::new(r#"(?s)<item\s+([^>]*)>(.*?)</item>"#).expect("static pattern");
    let attribute = Regex::new(r#"([\w]+)\s*=\s*"([^"]*)""#).expect("static pattern");
    let mut directives = Vec::new();
    for capture in tag.captures_iter(text) {
        let mut name = None;
        let mut item_type = None;
        for attr in attribute.captures_iter(&capture[1]) {
            match attr[1].to_lowercase().as_str() {
                "name" => name = Some(attr[2].to_string()),
                "type" => item_type = Some(attr[2].to_lowercase()),
                _ => {}
            }
        }
        if let Some(name) = name {
            directives.push((name, item_type, capture[2].trim().to_string()));
        }
    }
    directives
}

fn convert(value: &str, item_type: Option<&str>) -> Result<ItemValue, String> {
    match item_type {
        None | Some("") | Some("text") | Some("string") => Ok(ItemValue::Text(value.to_string())),
        Some("integer") => value
            .parse::<i64>()
            .map(ItemValue::Integer)
            .map_err(|_| format!("'{value}' is not an integer")),
        Some("double") => value
            .parse::<f64>()
            .map(ItemValue::Double)
            .map_err(|_| format!("'{value}' is not a double")),
        Some("boolean") => match value {
            "true" => Ok(ItemValue::Bool(true)),
            "false" => Ok(ItemValue::Bool(false)),
            other => Err(format!("'{other}' is not a boolean")),
        },
        Some(other) => Err(format!("unsupported item type '{other}'")),
    }
}
