//! File attachment sub-model.
//!
//! Attachments live under the reserved item `$file` as a nested map
//! `name → [contentType, content, attributes]`. The derived items
//! `$file.count` and `$file.names` are recomputed on every mutation so
//! queries never have to unpack the container.

use std::collections::BTreeMap;

use super::{ItemCollection, ItemValue};
use crate::constants;

/// A single file attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct FileData {
    pub name: String,
    pub content_type: String,
    pub content: Vec<u8>,
    pub attributes: BTreeMap<String, Vec<ItemValue>>,
}

impl FileData {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            content,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, values: Vec<ItemValue>) -> Self {
        self.attributes.insert(name.to_lowercase(), values);
        self
    }
}

impl ItemCollection {
    /// Adds a file attachment. An existing file with the same name is
    /// replaced.
    pub fn add_file_data(&mut self, file: FileData) {
        self.purge_item_value(constants::FILE);
        let mut map = self.file_map();
        map.insert(
            file.name.clone(),
            vec![
                ItemValue::Text(file.content_type),
                ItemValue::Bytes(file.content),
                ItemValue::Map(file.attributes),
            ],
        );
        self.write_file_map(map);
    }

    /// Returns the attachment with the given name.
    pub fn get_file_data(&self, name: &str) -> Option<FileData> {
        self.file_map().remove(name).map(|info| decode(name, info))
    }

    /// All attachments in name order.
    pub fn file_data(&self) -> Vec<FileData> {
        self.file_map()
            .into_iter()
            .map(|(name, info)| decode(&name, info))
            .collect()
    }

    /// Removes an attachment; a no-op when the name is unknown.
    pub fn remove_file(&mut self, name: &str) {
        let mut map = self.file_map();
        if map.remove(name).is_some() || !map.is_empty() {
            self.write_file_map(map);
        } else {
            self.remove_item(constants::FILE);
            self.set_item_value(constants::FILE_COUNT, 0i64);
            self.replace_item_value(constants::FILE_NAMES, Vec::new());
        }
    }

    pub fn file_names(&self) -> Vec<String> {
        self.item_string_list(constants::FILE_NAMES)
    }

    pub fn file_count(&self) -> i64 {
        self.item_integer(constants::FILE_COUNT)
    }

    fn file_map(&self) -> BTreeMap<String, Vec<ItemValue>> {
        match self.item_value(constants::FILE).first() {
            Some(ItemValue::Map(map)) => map.clone(),
            _ => BTreeMap::new(),
        }
    }

    fn write_file_map(&mut self, map: BTreeMap<String, Vec<ItemValue>>) {
        let names: Vec<ItemValue> = map.keys().cloned().map(ItemValue::Text).collect();
        let count = map.len() as i64;
        self.replace_item_value(constants::FILE, vec![ItemValue::Map(map)]);
        self.set_item_value(constants::FILE_COUNT, count);
        self.replace_item_value(constants::FILE_NAMES, names);
    }
}

fn decode(name: &str, info: Vec<ItemValue>) -> FileData {
    let mut file = FileData::new(name, "", Vec::new());
    let mut parts = info.into_iter();
    if let Some(ItemValue::Text(content_type)) = parts.next() {
        file.content_type = content_type;
    }
    if let Some(ItemValue::Bytes(content)) = parts.next() {
        file.content = content;
    }
    if let Some(ItemValue::Map(attributes)) = parts.next() {
        file.attributes = attributes;
    }
    file
}
