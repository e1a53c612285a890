//! # ItemCollection
//!
//! The schemaless document every subsystem of the engine exchanges: a map
//! from item name (case folded, trimmed) to an ordered list of typed
//! values. Workitems, BPMN task/event entities, scheduler configurations
//! and adminp job descriptions are all `ItemCollection`s.
//!
//! Invariants enforced here:
//! - item names are lowercased and trimmed on every access,
//! - every item holds a list (single values become singleton lists),
//! - values are restricted to the closed [`ItemValue`] union,
//! - deprecated alias pairs (`$processid`/`$taskid`, …) are mirror-written
//!   on mutation and accepted on read,
//! - `Clone` produces a full deep copy (no shared substructure).

pub mod files;
mod value;

pub use files::FileData;
pub use value::ItemValue;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{self, alias_partner};

/// A schemaless document: item name → ordered list of typed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemCollection {
    items: HashMap<String, Vec<ItemValue>>,
}

fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ItemCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a collection from an existing item map; keys are folded and
    /// the map is taken by value (deep ownership).
    pub fn from_items(items: HashMap<String, Vec<ItemValue>>) -> Self {
        let mut collection = Self::new();
        for (name, values) in items {
            collection.items.insert(fold(&name), values);
        }
        collection
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All item names, sorted for deterministic iteration.
    pub fn item_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.items.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_item(&self, name: &str) -> bool {
        let folded = fold(name);
        if self.items.contains_key(&folded) {
            return true;
        }
        alias_partner(&folded)
            .map(|partner| self.items.contains_key(partner))
            .unwrap_or(false)
    }

    /// True if the item is missing, has no values, or holds a single empty
    /// string.
    pub fn is_item_empty(&self, name: &str) -> bool {
        let values = self.item_value(name);
        values.is_empty() || (values.len() == 1 && values[0].is_empty_text())
    }

    /// The raw value list of an item; empty if the item does not exist.
    /// Reads through deprecated aliases when the canonical item is absent.
    pub fn item_value(&self, name: &str) -> &[ItemValue] {
        let folded = fold(name);
        if let Some(values) = self.items.get(&folded) {
            return values;
        }
        if let Some(partner) = alias_partner(&folded) {
            if let Some(values) = self.items.get(partner) {
                return values;
            }
        }
        &[]
    }

    /// Replaces the value list of an item with a single value.
    pub fn set_item_value(&mut self, name: &str, value: impl Into<ItemValue>) -> &mut Self {
        self.replace_item_value(name, vec![value.into()])
    }

    /// Replaces the full value list of an item.
    pub fn replace_item_value(&mut self, name: &str, values: Vec<ItemValue>) -> &mut Self {
        let folded = fold(name);
        self.items.insert(folded.clone(), values);
        self.mirror_alias(&folded);
        self
    }

    /// Appends a value to an item, creating the item when absent.
    pub fn append_item_value(&mut self, name: &str, value: impl Into<ItemValue>) -> &mut Self {
        let folded = fold(name);
        self.items.entry(folded.clone()).or_default().push(value.into());
        self.mirror_alias(&folded);
        self
    }

    /// Appends a value only if it is not already present.
    pub fn append_item_value_unique(
        &mut self,
        name: &str,
        value: impl Into<ItemValue>,
    ) -> &mut Self {
        let folded = fold(name);
        let value = value.into();
        let values = self.items.entry(folded.clone()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
        self.mirror_alias(&folded);
        self
    }

    /// Replaces an item with a list built from any convertible iterator.
    pub fn set_item_value_list<V, I>(&mut self, name: &str, values: I) -> &mut Self
    where
        V: Into<ItemValue>,
        I: IntoIterator<Item = V>,
    {
        self.replace_item_value(name, values.into_iter().map(Into::into).collect())
    }

    pub fn remove_item(&mut self, name: &str) {
        let folded = fold(name);
        self.items.remove(&folded);
        if let Some(partner) = alias_partner(&folded) {
            self.items.remove(partner);
        }
    }

    /// Removes duplicate and empty entries from the value list of an
    /// item, preserving first occurrence.
    pub fn purge_item_value(&mut self, name: &str) {
        let folded = fold(name);
        if let Some(values) = self.items.get_mut(&folded) {
            let mut seen: Vec<ItemValue> = Vec::with_capacity(values.len());
            for value in values.drain(..) {
                if value.is_empty_text() || seen.contains(&value) {
                    continue;
                }
                seen.push(value);
            }
            *values = seen;
        }
    }

    fn mirror_alias(&mut self, folded: &str) {
        if let Some(partner) = alias_partner(folded) {
            if let Some(values) = self.items.get(folded).cloned() {
                self.items.insert(partner.to_string(), values);
            }
        }
    }

    // ------------------------------------------------------------------
    // typed accessors
    // ------------------------------------------------------------------

    /// First value as a string; empty string when absent.
    pub fn item_string(&self, name: &str) -> String {
        self.item_value(name)
            .first()
            .map(ItemValue::to_text)
            .unwrap_or_default()
    }

    /// First value as an integer; 0 when absent or not convertible.
    pub fn item_integer(&self, name: &str) -> i64 {
        self.item_value(name)
            .first()
            .and_then(ItemValue::to_integer)
            .unwrap_or(0)
    }

    /// First value as a double; 0.0 when absent or not convertible.
    pub fn item_double(&self, name: &str) -> f64 {
        self.item_value(name)
            .first()
            .and_then(ItemValue::to_double)
            .unwrap_or(0.0)
    }

    /// First value as a decimal; zero when absent or not convertible.
    pub fn item_decimal(&self, name: &str) -> Decimal {
        self.item_value(name)
            .first()
            .and_then(ItemValue::to_decimal)
            .unwrap_or_default()
    }

    /// First value as a boolean; false when absent or not convertible.
    pub fn item_boolean(&self, name: &str) -> bool {
        self.item_value(name)
            .first()
            .and_then(ItemValue::to_boolean)
            .unwrap_or(false)
    }

    /// First value as an instant, if present and convertible.
    pub fn item_date(&self, name: &str) -> Option<DateTime<Utc>> {
        self.item_value(name).first().and_then(ItemValue::to_date)
    }

    /// All values coerced to strings; unconvertible values render via
    /// their display form, so this never drops entries.
    pub fn item_string_list(&self, name: &str) -> Vec<String> {
        self.item_value(name).iter().map(ItemValue::to_text).collect()
    }

    /// All values coerced to integers; unconvertible values are dropped.
    pub fn item_integer_list(&self, name: &str) -> Vec<i64> {
        self.item_value(name)
            .iter()
            .filter_map(ItemValue::to_integer)
            .collect()
    }

    pub fn is_item_value_numeric(&self, name: &str) -> bool {
        self.item_value(name)
            .first()
            .map(ItemValue::is_numeric)
            .unwrap_or(false)
    }

    pub fn is_item_value_date(&self, name: &str) -> bool {
        self.item_value(name)
            .first()
            .map(ItemValue::is_date)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // subset clone
    // ------------------------------------------------------------------

    /// Deep-copies the collection restricted to the given item names.
    ///
    /// Each entry may be an exact name, a `source|target` rename pair, or a
    /// regular expression matched against the existing item names. Items
    /// matching none of the entries are dropped from the clone.
    pub fn clone_subset(&self, item_names: &[&str]) -> ItemCollection {
        if item_names.is_empty() {
            return self.clone();
        }
        let mut clone = ItemCollection::new();
        for pattern in item_names {
            let pattern = pattern.trim();
            let folded = fold(pattern);
            if let Some(values) = self.items.get(&folded) {
                clone.items.insert(folded, values.clone());
                continue;
            }
            if let Some(split) = pattern.find('|') {
                let source = fold(&pattern[..split]);
                let target = fold(&pattern[split + 1..]);
                if let Some(values) = self.items.get(&source) {
                    clone.items.insert(target, values.clone());
                }
                continue;
            }
            if let Ok(regex) = Regex::new(pattern) {
                for (name, values) in &self.items {
                    if regex.is_match(name) {
                        clone.items.insert(name.clone(), values.clone());
                    }
                }
            }
        }
        clone
    }

    // ------------------------------------------------------------------
    // workflow item helpers
    // ------------------------------------------------------------------

    pub fn unique_id(&self) -> String {
        self.item_string(constants::UNIQUEID)
    }

    pub fn doc_type(&self) -> String {
        self.item_string("type")
    }

    pub fn task_id(&self) -> i64 {
        self.item_integer(constants::TASKID)
    }

    pub fn set_task_id(&mut self, task_id: i64) -> &mut Self {
        self.set_item_value(constants::TASKID, task_id)
    }

    pub fn event_id(&self) -> i64 {
        self.item_integer(constants::EVENTID)
    }

    pub fn set_event_id(&mut self, event_id: i64) -> &mut Self {
        self.set_item_value(constants::EVENTID, event_id)
    }

    pub fn model_version(&self) -> String {
        self.item_string(constants::MODELVERSION)
    }

    pub fn workflow_group(&self) -> String {
        self.item_string(constants::WORKFLOWGROUP)
    }

    /// Builder-style model selector, used when assembling workitems:
    /// `ItemCollection::new().model("1.0.0").task(100).event(10)`.
    pub fn model(mut self, version: &str) -> Self {
        self.set_item_value(constants::MODELVERSION, version);
        self
    }

    pub fn task(mut self, task_id: i64) -> Self {
        self.set_task_id(task_id);
        self
    }

    pub fn event(mut self, event_id: i64) -> Self {
        self.set_event_id(event_id);
        self
    }
}
