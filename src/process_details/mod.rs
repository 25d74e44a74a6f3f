//! Process details embedding
//!
//! An embedded view showing one process instance: its timeline, jobs and diagram,
//! plus the abort / retry / skip actions. The view talks to the host only through
//! [`ProcessDetailsDriver`].
//!
//! | Piece                                  | Side     | Role                                   |
//! |----------------------------------------|----------|----------------------------------------|
//! | [`ProcessDetailsChannelCall`]          | both     | Channel API surface                    |
//! | [`ProcessDetailsEnvelopeCall`]         | both     | Envelope API surface (`init`)          |
//! | [`ProcessDetailsChannelApiImpl`]       | host     | Forwards Channel API calls to a Driver |
//! | [`ProcessDetailsEnvelopeApi`]          | host     | Typed Envelope API proxy               |
//! | [`ProcessDetailsEnvelopeApiImpl`]      | embedded | Handles `init`                         |
//! | [`ProcessDetailsEnvelopeViewDriver`]   | embedded | Driver backed by the Channel API proxy |

mod api;
mod channel;
mod envelope;

pub use api::{ProcessDetailsChannelCall, ProcessDetailsEnvelopeCall};
pub use channel::{ProcessDetailsChannelApiImpl, ProcessDetailsEnvelopeApi};
pub use envelope::{ProcessDetailsEnvelopeApiImpl, ProcessDetailsEnvelopeViewDriver, ProcessDetailsView};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::driver::DriverResult;
use crate::models::{
    Job, JobCancel, ModalMessage, NodeInstance, ProcessInstance, SvgResponse, TriggerableNode,
};

/// Business operations behind the process-details view.
///
/// Implemented by the host application; the embedded view sees the same trait
/// through [`ProcessDetailsEnvelopeViewDriver`].
#[async_trait]
pub trait ProcessDetailsDriver: Send + Sync + 'static {
    async fn process_details_query(&self, id: &str) -> DriverResult<ProcessInstance>;

    async fn jobs_query(&self, id: &str) -> DriverResult<Vec<Job>>;

    async fn get_process_diagram(&self, instance: &ProcessInstance) -> DriverResult<SvgResponse>;

    async fn cancel_job(&self, job: &Job) -> DriverResult<JobCancel>;

    async fn reschedule_job(
        &self,
        job: &Job,
        repeat_interval: Option<u64>,
        repeat_limit: Option<u32>,
        schedule_date: Option<DateTime<Utc>>,
    ) -> DriverResult<ModalMessage>;

    async fn handle_process_abort(&self, instance: &ProcessInstance) -> DriverResult<()>;

    async fn handle_process_retry(&self, instance: &ProcessInstance) -> DriverResult<()>;

    async fn handle_process_skip(&self, instance: &ProcessInstance) -> DriverResult<()>;

    async fn handle_node_instance_cancel(&self, instance: &ProcessInstance, node: &NodeInstance) -> DriverResult<()>;

    async fn handle_node_instance_retrigger(
        &self,
        instance: &ProcessInstance,
        node: &NodeInstance,
    ) -> DriverResult<()>;

    async fn get_triggerable_nodes(&self, instance: &ProcessInstance) -> DriverResult<Vec<TriggerableNode>>;

    /// Fire-and-forget: navigate the host to another process instance.
    async fn open_process_instance_details(&self, id: &str);
}
