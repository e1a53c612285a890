//! Error taxonomy of the workflow engine.
//!
//! Every error carries a `(context, code, message)` tuple so the service
//! boundary can translate it into a localized message or an HTTP status
//! without string matching. Error codes are the stable part of the contract
//! and are collected in [`codes`].

use thiserror::Error;

/// Stable error code constants shared across all error kinds.
pub mod codes {
    pub const UNDEFINED_MODEL_ENTRY: &str = "UNDEFINED_MODEL_ENTRY";
    pub const UNDEFINED_MODEL_VERSION: &str = "UNDEFINED_MODEL_VERSION";
    pub const INVALID_MODEL_ENTRY: &str = "INVALID_MODEL_ENTRY";
    pub const CYCLIC_FOLLOW_UP: &str = "CYCLIC_FOLLOW_UP";
    pub const UNDEFINED_WORKITEM: &str = "UNDEFINED_WORKITEM";
    pub const INVALID_WORKITEM: &str = "INVALID_WORKITEM";
    pub const NOT_AUTHORIZED: &str = "NOT_AUTHORIZED";
    pub const RULE_ERROR: &str = "RULE_ERROR";
    pub const INVALID_CALENDAR_EXPRESSION: &str = "INVALID_CALENDAR_EXPRESSION";
    pub const IMPLEMENTATION_NOT_FOUND: &str = "IMPLEMENTATION_NOT_FOUND";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const INVALID_ITEM_VALUE: &str = "INVALID_ITEM_VALUE";
}

/// An error raised by a plugin's `run` method.
///
/// The `code` is plugin specific (e.g. `RULE_ERROR` for the rule engine);
/// `params` carries optional message parameters for localization.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("plugin error [{context}:{code}] {message}")]
pub struct PluginError {
    pub context: String,
    pub code: String,
    pub message: String,
    pub params: Vec<String>,
}

impl PluginError {
    pub fn new(
        context: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            code: code.into(),
            message: message.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }

    /// True if the error originates in script compilation or evaluation.
    pub fn is_rule_error(&self) -> bool {
        self.code == codes::RULE_ERROR
    }
}

/// An error raised by a scheduler implementation or the scheduler service.
///
/// A `SchedulerError` returned from a job run is fatal for its timer.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("scheduler error [{context}:{code}] {message}")]
pub struct SchedulerError {
    pub context: String,
    pub code: String,
    pub message: String,
}

impl SchedulerError {
    pub fn new(
        context: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Central error type of the engine kernel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    /// The caller lacks the required role or ACL entry on the target document.
    #[error("access denied [{context}:{code}] {message}")]
    AccessDenied {
        context: String,
        code: String,
        message: String,
    },

    /// Model missing, version unresolvable, undefined task/event, duplicate
    /// event id or cyclic follow-up chain.
    #[error("model error [{context}:{code}] {message}")]
    Model {
        context: String,
        code: String,
        message: String,
    },

    /// The workitem is structurally invalid for the requested operation.
    #[error("processing error [{context}:{code}] {message}")]
    Processing {
        context: String,
        code: String,
        message: String,
    },

    /// A plugin's `run` failed; the step was rolled back.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Invalid calendar expression, unknown implementation or storage failure
    /// inside the scheduler service.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl WorkflowError {
    pub fn access_denied(
        context: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AccessDenied {
            context: context.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn model(
        context: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Model {
            context: context.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn processing(
        context: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Processing {
            context: context.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// The stable error code of this error.
    pub fn code(&self) -> &str {
        match self {
            WorkflowError::AccessDenied { code, .. }
            | WorkflowError::Model { code, .. }
            | WorkflowError::Processing { code, .. } => code,
            WorkflowError::Plugin(e) => &e.code,
            WorkflowError::Scheduler(e) => &e.code,
        }
    }

    /// The component that raised this error.
    pub fn context(&self) -> &str {
        match self {
            WorkflowError::AccessDenied { context, .. }
            | WorkflowError::Model { context, .. }
            | WorkflowError::Processing { context, .. } => context,
            WorkflowError::Plugin(e) => &e.context,
            WorkflowError::Scheduler(e) => &e.context,
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
