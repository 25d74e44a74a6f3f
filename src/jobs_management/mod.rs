//! Jobs management embedding
//!
//! An embedded job list with filtering, sorting, paging and cancel / reschedule
//! actions. Same layout as [`crate::process_details`]: the surfaces, a host-side
//! adapter forwarding to a [`JobsManagementDriver`], and an embedded-side view
//! driver plus `init` handler.

mod api;
mod channel;
mod envelope;

pub use api::{JobsManagementChannelCall, JobsManagementEnvelopeCall};
pub use channel::{JobsManagementChannelApiImpl, JobsManagementEnvelopeApi};
pub use envelope::{JobsManagementEnvelopeApiImpl, JobsManagementEnvelopeViewDriver, JobsManagementView};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::driver::DriverResult;
use crate::models::{BulkJobCancel, Job, JobCancel, JobStatus, ModalMessage, SortBy};

/// Business operations behind the job list.
#[async_trait]
pub trait JobsManagementDriver: Send + Sync + 'static {
    /// First load with the filter and order the view was initialised with.
    async fn initial_load(&self, filter: &[JobStatus], order_by: &SortBy) -> DriverResult<()>;

    async fn apply_filter(&self, filter: &[JobStatus]) -> DriverResult<()>;

    async fn bulk_cancel(&self, jobs: &[Job]) -> DriverResult<BulkJobCancel>;

    async fn cancel_job(&self, job: &Job) -> DriverResult<JobCancel>;

    async fn reschedule_job(
        &self,
        job: &Job,
        repeat_interval: Option<u64>,
        repeat_limit: Option<u32>,
        schedule_date: Option<DateTime<Utc>>,
    ) -> DriverResult<ModalMessage>;

    async fn sort_by(&self, order_by: &SortBy) -> DriverResult<()>;

    /// One page of jobs under the current filter and order.
    async fn query(&self, offset: u32, limit: u32) -> DriverResult<Vec<Job>>;
}
