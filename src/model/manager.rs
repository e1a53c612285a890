//! # Model Manager
//!
//! Owns the set of parsed BPMN models indexed by version string and
//! resolves the model responsible for a workitem. Models are immutable
//! once added; the manager hands out `Arc` references so a running process
//! step keeps its model even if the version is replaced concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::BpmnModel;
use crate::document::ItemCollection;
use crate::error::{codes, Result, WorkflowError};

/// Thread-safe registry of BPMN models by version.
#[derive(Default)]
pub struct ModelManager {
    models: RwLock<BTreeMap<String, Arc<BpmnModel>>>,
}

impl ModelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model under its version. Replaces a previously
    /// registered model of the same version.
    pub async fn add_model(&self, model: BpmnModel) -> Result<()> {
        let version = model.version();
        if version.is_empty() {
            return Err(WorkflowError::model(
                "ModelManager",
                codes::INVALID_MODEL_ENTRY,
                "model carries no version",
            ));
        }
        info!(version = %version, groups = ?model.groups(), "model registered");
        self.models.write().await.insert(version, Arc::new(model));
        Ok(())
    }

    pub async fn remove_model(&self, version: &str) {
        self.models.write().await.remove(version);
    }

    /// Exact version lookup.
    pub async fn get_model(&self, version: &str) -> Result<Arc<BpmnModel>> {
        self.models.read().await.get(version).cloned().ok_or_else(|| {
            WorkflowError::model(
                "ModelManager",
                codes::UNDEFINED_MODEL_ENTRY,
                format!("no model with version '{version}'"),
            )
        })
    }

    /// All registered versions in sort order.
    pub async fn versions(&self) -> Vec<String> {
        self.models.read().await.keys().cloned().collect()
    }

    /// Resolves the model for a workitem.
    ///
    /// If `$modelversion` looks like a regular expression (starts with `(`
    /// or `^`), the highest-sorted matching version wins. Otherwise an
    /// exact match is tried; when that fails and the workitem carries a
    /// `$workflowgroup`, the highest version containing that group is
    /// used.
    pub async fn get_model_by_workitem(
        &self,
        workitem: &ItemCollection,
    ) -> Result<Arc<BpmnModel>> {
        let requested = workitem.model_version();
        let models = self.models.read().await;

        if requested.starts_with('(') || requested.starts_with('^') {
            let regex = Regex::new(&requested).map_err(|e| {
                WorkflowError::model(
                    "ModelManager",
                    codes::UNDEFINED_MODEL_VERSION,
                    format!("invalid model version pattern '{requested}': {e}"),
                )
            })?;
            for (version, model) in models.iter().rev() {
                if regex.is_match(version) {
                    debug!(pattern = %requested, version = %version, "model resolved by pattern");
                    return Ok(model.clone());
                }
            }
        } else if !requested.is_empty() {
            if let Some(model) = models.get(&requested) {
                return Ok(model.clone());
            }
        }

        // fall back to the workflow group
        let group = workitem.workflow_group();
        if !group.is_empty() {
            for (version, model) in models.iter().rev() {
                if model.groups().iter().any(|g| g == &group) {
                    debug!(group = %group, version = %version, "model resolved by group");
                    return Ok(model.clone());
                }
            }
        }

        Err(WorkflowError::model(
            "ModelManager",
            codes::UNDEFINED_MODEL_VERSION,
            format!("no model matches version '{requested}' or group '{group}'"),
        ))
    }
}
