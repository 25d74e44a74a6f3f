//! Host side of the jobs-management embedding.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::{JobsManagementChannelCall, JobsManagementDriver, JobsManagementEnvelopeCall};
use crate::api::{ApiHandler, ApiProxy};
use crate::driver::reply;
use crate::error::BridgeError;
use crate::handshake::Association;
use crate::models::JobsManagementInitArgs;

/// Channel API served by the host, forwarding 1:1 to a [`JobsManagementDriver`].
pub struct JobsManagementChannelApiImpl<D: ?Sized> {
    driver: Arc<D>,
}

impl<D: JobsManagementDriver + ?Sized> JobsManagementChannelApiImpl<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl<D: JobsManagementDriver + ?Sized> ApiHandler<JobsManagementChannelCall> for JobsManagementChannelApiImpl<D> {
    async fn handle(&self, call: JobsManagementChannelCall) -> Result<Value, Value> {
        let driver = &self.driver;
        match call {
            JobsManagementChannelCall::InitialLoad { filter, order_by } => {
                reply(driver.initial_load(&filter, &order_by).await)
            }
            JobsManagementChannelCall::ApplyFilter { filter } => reply(driver.apply_filter(&filter).await),
            JobsManagementChannelCall::BulkCancel { jobs } => reply(driver.bulk_cancel(&jobs).await),
            JobsManagementChannelCall::CancelJob { job } => reply(driver.cancel_job(&job).await),
            JobsManagementChannelCall::RescheduleJob {
                job,
                repeat_interval,
                repeat_limit,
                schedule_date,
            } => reply(
                driver
                    .reschedule_job(&job, repeat_interval, repeat_limit, schedule_date)
                    .await,
            ),
            JobsManagementChannelCall::SortBy { order_by } => reply(driver.sort_by(&order_by).await),
            JobsManagementChannelCall::Query { offset, limit } => reply(driver.query(offset, limit).await),
        }
    }
}

/// Typed Envelope API of the job list, used by the host.
#[derive(Clone)]
pub struct JobsManagementEnvelopeApi {
    proxy: ApiProxy<JobsManagementEnvelopeCall>,
}

impl JobsManagementEnvelopeApi {
    pub fn new(proxy: ApiProxy<JobsManagementEnvelopeCall>) -> Self {
        Self { proxy }
    }

    /// One `init` attempt.
    pub async fn init(&self, association: Association, init_args: JobsManagementInitArgs) -> Result<(), BridgeError> {
        self.proxy
            .call(JobsManagementEnvelopeCall::Init {
                association,
                init_args,
            })
            .await
            .map(|_| ())
    }
}
