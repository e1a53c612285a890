//! Document store collaborator.
//!
//! The kernel never persists workitems itself; everything that needs a
//! store (scheduler configurations, adminp jobs, hosts persisting after a
//! clean `process` return) goes through this trait. Queries are an opaque
//! search-DSL string owned by the store implementation.
//!
//! [`InMemoryDocumentStore`] is the reference implementation used by the
//! test suites and by embedded hosts without a database; it supports the
//! `key:"value"` query subset the engine itself emits.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::constants;
use crate::document::ItemCollection;
use crate::error::{codes, Result, WorkflowError};

/// Narrow persistence contract required by the engine.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persists a document and returns the stored form. The store stamps
    /// `$uniqueid` (when absent), `$created` and `$modified`.
    async fn save(&self, doc: ItemCollection) -> Result<ItemCollection>;

    /// Loads a document by unique id.
    async fn load(&self, id: &str) -> Result<Option<ItemCollection>>;

    /// Runs a search query with paging. The query syntax is owned by the
    /// store implementation.
    async fn find(
        &self,
        query: &str,
        page_size: usize,
        page_index: usize,
    ) -> Result<Vec<ItemCollection>>;

    /// All documents of the given `type` item.
    async fn documents_by_type(&self, doc_type: &str) -> Result<Vec<ItemCollection>>;

    /// Removes a document by unique id; a no-op for unknown ids.
    async fn remove(&self, id: &str) -> Result<()>;
}

/// Map-backed document store.
///
/// Queries are conjunctions of `key:"value"` tokens; several tokens for
/// the same key form a disjunction. That is exactly the shape of the
/// queries the scheduler and adminp services build.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<String, ItemCollection>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn save(&self, mut doc: ItemCollection) -> Result<ItemCollection> {
        if doc.unique_id().is_empty() {
            doc.set_item_value(constants::UNIQUEID, Uuid::now_v7().to_string());
        }
        let now = Utc::now();
        if doc.item_date(constants::CREATED).is_none() {
            doc.set_item_value(constants::CREATED, now);
        }
        doc.set_item_value(constants::MODIFIED, now);

        self.documents
            .write()
            .await
            .insert(doc.unique_id(), doc.clone());
        Ok(doc)
    }

    async fn load(&self, id: &str) -> Result<Option<ItemCollection>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn find(
        &self,
        query: &str,
        page_size: usize,
        page_index: usize,
    ) -> Result<Vec<ItemCollection>> {
        let criteria = parse_query(query)?;
        let documents = self.documents.read().await;
        let mut hits: Vec<ItemCollection> = documents
            .values()
            .filter(|doc| matches(doc, &criteria))
            .cloned()
            .collect();
        hits.sort_by_key(|doc| doc.item_date(constants::CREATED));

        Ok(hits
            .into_iter()
            .skip(page_index * page_size)
            .take(page_size)
            .collect())
    }

    async fn documents_by_type(&self, doc_type: &str) -> Result<Vec<ItemCollection>> {
        let documents = self.documents.read().await;
        Ok(documents
            .values()
            .filter(|doc| doc.doc_type() == doc_type)
            .cloned()
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.documents.write().await.remove(id);
        Ok(())
    }
}

/// Parses `key:"value"` tokens into a key → accepted-values map.
fn parse_query(query: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let token = regex::Regex::new(r#"([\w$.]+):"([^"]*)""#).expect("static pattern");
    let mut criteria: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for capture in token.captures_iter(query) {
        criteria
            .entry(capture[1].to_lowercase())
            .or_default()
            .push(capture[2].to_string());
    }
    if criteria.is_empty() && !query.trim().is_empty() {
        return Err(WorkflowError::processing(
            "InMemoryDocumentStore",
            codes::STORAGE_ERROR,
            format!("unsupported query '{query}'"),
        ));
    }
    Ok(criteria)
}

fn matches(doc: &ItemCollection, criteria: &BTreeMap<String, Vec<String>>) -> bool {
    criteria.iter().all(|(key, accepted)| {
        let value = doc.item_string(key);
        accepted.iter().any(|a| a == &value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_stamps_metadata() {
        let store = InMemoryDocumentStore::new();
        let mut doc = ItemCollection::new();
        doc.set_item_value("type", "scheduler");
        let saved = store.save(doc).await.unwrap();

        assert!(!saved.unique_id().is_empty());
        assert!(saved.item_date(constants::CREATED).is_some());
        assert!(saved.item_date(constants::MODIFIED).is_some());

        let loaded = store.load(&saved.unique_id()).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[tokio::test]
    async fn find_supports_conjunction_and_disjunction() {
        let store = InMemoryDocumentStore::new();
        for (doc_type, name) in [("scheduler", "night"), ("scheduler", "daily"), ("workitem", "night")] {
            let mut doc = ItemCollection::new();
            doc.set_item_value("type", doc_type);
            doc.set_item_value("name", name);
            store.save(doc).await.unwrap();
        }

        let hits = store
            .find(r#"(type:"scheduler" AND (name:"night" OR txtname:"night"))"#, 10, 0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_string("name"), "night");
    }

    #[tokio::test]
    async fn find_pages_results() {
        let store = InMemoryDocumentStore::new();
        for i in 0..5i64 {
            let mut doc = ItemCollection::new();
            doc.set_item_value("type", "workitem");
            doc.set_item_value("index", i);
            store.save(doc).await.unwrap();
        }

        let first = store.find(r#"type:"workitem""#, 2, 0).await.unwrap();
        let second = store.find(r#"type:"workitem""#, 2, 1).await.unwrap();
        let third = store.find(r#"type:"workitem""#, 2, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn documents_by_type_filters() {
        let store = InMemoryDocumentStore::new();
        let mut doc = ItemCollection::new();
        doc.set_item_value("type", "scheduler");
        store.save(doc).await.unwrap();
        store.save(ItemCollection::new()).await.unwrap();

        assert_eq!(store.documents_by_type("scheduler").await.unwrap().len(), 1);
        assert_eq!(store.documents_by_type("missing").await.unwrap().len(), 0);
    }
}
