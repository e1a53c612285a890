//! # docflow-core
//!
//! A BPMN-driven workflow engine kernel for document-centric applications
//! (tickets, approvals, contracts). The engine advances workitems along a
//! model graph of Tasks and Events, applies a configurable chain of
//! side-effectful plugins on each transition, enforces the access-control
//! items and preserves an auditable history. Persistence, mail transport
//! and full-text indexing are collaborators behind narrow traits.
//!
//! ## Components
//!
//! - [`document::ItemCollection`] — the schemaless document every
//!   subsystem exchanges,
//! - [`model`] — BPMN parsing, indexing and version resolution,
//! - [`kernel::WorkflowKernel`] — the state-transition interpreter,
//! - [`rules::RuleEngine`] — gateway conditions and business rules,
//! - [`adapters::access`] — ACL and participant recomputation,
//! - [`scheduler::SchedulerService`] — calendar-driven job execution,
//! - [`adminp`] — resumable administrative jobs.

pub mod adapters;
pub mod adminp;
pub mod config;
pub mod constants;
pub mod context;
pub mod document;
pub mod error;
pub mod events;
pub mod kernel;
pub mod logging;
pub mod model;
pub mod plugins;
pub mod registry;
pub mod rules;
pub mod scheduler;
pub mod storage;
pub mod text;

pub use config::EngineConfig;
pub use context::WorkflowContext;
pub use document::{FileData, ItemCollection, ItemValue};
pub use error::{PluginError, Result, SchedulerError, WorkflowError};
pub use kernel::{Plugin, WorkflowKernel};
pub use model::{BpmnModel, ModelManager};
pub use rules::RuleEngine;
pub use scheduler::{SchedulerJob, SchedulerService};
pub use storage::{DocumentStore, InMemoryDocumentStore};
