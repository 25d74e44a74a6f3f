//! Embedded side of the jobs-management embedding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::{JobsManagementChannelCall, JobsManagementDriver, JobsManagementEnvelopeCall};
use crate::api::{ApiHandler, ApiProxy};
use crate::driver::{DriverError, DriverResult};
use crate::envelope::EnvelopeClient;
use crate::handshake::InitGuard;
use crate::models::{BulkJobCancel, Job, JobCancel, JobStatus, JobsManagementInitArgs, ModalMessage, SortBy};

/// [`JobsManagementDriver`] for embedded view code, backed by the Channel API.
#[derive(Clone)]
pub struct JobsManagementEnvelopeViewDriver {
    channel: ApiProxy<JobsManagementChannelCall>,
}

impl JobsManagementEnvelopeViewDriver {
    pub fn new(channel: ApiProxy<JobsManagementChannelCall>) -> Self {
        Self { channel }
    }

    async fn request<T: DeserializeOwned>(&self, call: JobsManagementChannelCall) -> DriverResult<T> {
        self.channel.request(call).await.map_err(DriverError::from)
    }
}

#[async_trait]
impl JobsManagementDriver for JobsManagementEnvelopeViewDriver {
    async fn initial_load(&self, filter: &[JobStatus], order_by: &SortBy) -> DriverResult<()> {
        self.request(JobsManagementChannelCall::InitialLoad {
            filter: filter.to_vec(),
            order_by: order_by.clone(),
        })
        .await
    }

    async fn apply_filter(&self, filter: &[JobStatus]) -> DriverResult<()> {
        self.request(JobsManagementChannelCall::ApplyFilter {
            filter: filter.to_vec(),
        })
        .await
    }

    async fn bulk_cancel(&self, jobs: &[Job]) -> DriverResult<BulkJobCancel> {
        self.request(JobsManagementChannelCall::BulkCancel { jobs: jobs.to_vec() })
            .await
    }

    async fn cancel_job(&self, job: &Job) -> DriverResult<JobCancel> {
        self.request(JobsManagementChannelCall::CancelJob {
            job: Box::new(job.clone()),
        })
        .await
    }

    async fn reschedule_job(
        &self,
        job: &Job,
        repeat_interval: Option<u64>,
        repeat_limit: Option<u32>,
        schedule_date: Option<DateTime<Utc>>,
    ) -> DriverResult<ModalMessage> {
        self.request(JobsManagementChannelCall::RescheduleJob {
            job: Box::new(job.clone()),
            repeat_interval,
            repeat_limit,
            schedule_date,
        })
        .await
    }

    async fn sort_by(&self, order_by: &SortBy) -> DriverResult<()> {
        self.request(JobsManagementChannelCall::SortBy {
            order_by: order_by.clone(),
        })
        .await
    }

    async fn query(&self, offset: u32, limit: u32) -> DriverResult<Vec<Job>> {
        self.request(JobsManagementChannelCall::Query { offset, limit })
            .await
    }
}

/// The embedded job list.
#[async_trait]
pub trait JobsManagementView: Send + Sync + 'static {
    async fn initialize(&self, init_args: JobsManagementInitArgs, driver: Arc<dyn JobsManagementDriver>);

    fn ready(&self);
}

/// Envelope API served by the embedded job list.
///
/// Only the first `init` takes effect. A concurrent second `init` answers success
/// while the first may still be initializing the view.
pub struct JobsManagementEnvelopeApiImpl<V: ?Sized> {
    client: EnvelopeClient,
    view: Arc<V>,
    init_guard: InitGuard,
}

impl<V: JobsManagementView + ?Sized> JobsManagementEnvelopeApiImpl<V> {
    pub fn new(client: EnvelopeClient, view: Arc<V>) -> Self {
        Self {
            client,
            view,
            init_guard: InitGuard::new(),
        }
    }
}

#[async_trait]
impl<V: JobsManagementView + ?Sized> ApiHandler<JobsManagementEnvelopeCall> for JobsManagementEnvelopeApiImpl<V> {
    async fn handle(&self, call: JobsManagementEnvelopeCall) -> Result<Value, Value> {
        let JobsManagementEnvelopeCall::Init {
            association,
            init_args,
        } = call;

        if !self.init_guard.capture() {
            debug!(envelope_server_id = %association.envelope_server_id, "Init already handled");
            return Ok(Value::Null);
        }

        self.client
            .associate(&association.origin, &association.envelope_server_id)
            .await;

        let driver: Arc<dyn JobsManagementDriver> =
            Arc::new(JobsManagementEnvelopeViewDriver::new(self.client.channel_api()));
        self.view.initialize(init_args, driver).await;
        self.view.ready();

        info!(envelope_server_id = %association.envelope_server_id, "Job list ready");
        Ok(Value::Null)
    }
}
