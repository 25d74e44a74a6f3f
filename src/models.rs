//! Domain payloads exchanged through the bridge.
//!
//! The bridge never interprets these; they are what Drivers return and what the
//! init handshakes carry. Field names follow the camelCase wire convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// Process instances
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessInstanceState {
    Pending,
    Active,
    Completed,
    Aborted,
    Suspended,
    Error,
}

impl ProcessInstanceState {
    /// States from which abort / retry / skip make sense.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Active | Self::Suspended | Self::Error)
    }
}

/// Failure recorded on a process instance in `ERROR` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstanceError {
    pub node_definition_id: String,
    pub message: String,
}

/// One node visited by a process instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub definition_id: String,
    pub node_id: String,
    pub enter: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInstance {
    pub id: String,
    pub process_id: String,
    pub process_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_key: Option<String>,
    pub state: ProcessInstanceState,
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_process_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_process_instance_id: Option<String>,
    #[serde(default)]
    pub addons: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub node_instances: Vec<NodeInstance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ProcessInstanceError>,
    /// Process variables, opaque to the bridge
    #[serde(default)]
    pub variables: Value,
}

impl ProcessInstance {
    /// A freshly started, active instance.
    pub fn new(id: impl Into<String>, process_id: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            process_id: process_id.into(),
            process_name: process_name.into(),
            business_key: None,
            state: ProcessInstanceState::Active,
            start: Utc::now(),
            end: None,
            last_update: None,
            endpoint: None,
            service_url: None,
            parent_process_instance_id: None,
            root_process_instance_id: None,
            addons: Vec::new(),
            roles: Vec::new(),
            node_instances: Vec::new(),
            error: None,
            variables: Value::Null,
        }
    }
}

/// A node that can be triggered manually on a live instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerableNode {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub unique_id: String,
    pub node_definition_id: String,
}

/// Result of `getProcessDiagram`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SvgResponse {
    Success { svg: String },
    Error { error: String },
}

/// Size hint for the diagram preview panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramPreviewSize {
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Error,
    Executed,
    Scheduled,
    Retry,
    Canceled,
}

impl JobStatus {
    /// Only jobs that have not run yet can be cancelled or rescheduled.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Retry | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub process_id: String,
    pub process_instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_process_instance_id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_limit: Option<u32>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub execution_counter: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<DateTime<Utc>>,
}

impl Job {
    /// A scheduled job belonging to a process instance.
    pub fn scheduled(
        id: impl Into<String>,
        process_id: impl Into<String>,
        process_instance_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            process_id: process_id.into(),
            process_instance_id: process_instance_id.into(),
            root_process_instance_id: None,
            status: JobStatus::Scheduled,
            priority: 0,
            callback_endpoint: None,
            repeat_interval: None,
            repeat_limit: None,
            retries: 0,
            execution_counter: 0,
            node_instance_id: None,
            endpoint: None,
            last_update: None,
            expiration_time: None,
        }
    }
}

/// Title and body of the modal shown after cancel / reschedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalMessage {
    pub modal_title: String,
    pub modal_content: String,
}

/// Result of cancelling a job.
pub type JobCancel = ModalMessage;

/// Result of cancelling several jobs at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkJobCancel {
    pub successful_jobs: Vec<Job>,
    pub failed_jobs: Vec<Job>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

/// Sort order keyed by job field name, e.g. `{"lastUpdate": "DESC"}`.
pub type SortBy = BTreeMap<String, SortDirection>;

// ============================================================================
// Init payloads
// ============================================================================

/// Application init payload of the process-details embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessDetailsInitArgs {
    pub process_instance: ProcessInstance,
    #[serde(default)]
    pub omitted_process_timeline_events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagram_preview_size: Option<DiagramPreviewSize>,
    #[serde(default)]
    pub show_swf_diagram: bool,
    #[serde(default)]
    pub is_stunner_enabled: bool,
    pub singular_process_label: String,
    pub plural_process_label: String,
}

impl ProcessDetailsInitArgs {
    pub fn new(process_instance: ProcessInstance) -> Self {
        Self {
            process_instance,
            omitted_process_timeline_events: Vec::new(),
            diagram_preview_size: None,
            show_swf_diagram: false,
            is_stunner_enabled: false,
            singular_process_label: "Process".to_string(),
            plural_process_label: "Processes".to_string(),
        }
    }
}

/// Application init payload of the jobs-management embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobsManagementInitArgs {
    pub filter: Vec<JobStatus>,
    pub order_by: SortBy,
}
