//! Host side of the process-details embedding.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{ProcessDetailsChannelCall, ProcessDetailsDriver, ProcessDetailsEnvelopeCall};
use crate::api::{ApiHandler, ApiProxy};
use crate::driver::reply;
use crate::error::BridgeError;
use crate::handshake::Association;
use crate::models::ProcessDetailsInitArgs;

/// Channel API served by the host: each call goes 1:1 to the Driver.
///
/// No business logic and no error translation happen here.
pub struct ProcessDetailsChannelApiImpl<D: ?Sized> {
    driver: Arc<D>,
}

impl<D: ProcessDetailsDriver + ?Sized> ProcessDetailsChannelApiImpl<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl<D: ProcessDetailsDriver + ?Sized> ApiHandler<ProcessDetailsChannelCall> for ProcessDetailsChannelApiImpl<D> {
    async fn handle(&self, call: ProcessDetailsChannelCall) -> Result<Value, Value> {
        use ProcessDetailsChannelCall::*;

        let driver = &self.driver;
        match call {
            ProcessDetailsQuery { id } => reply(driver.process_details_query(&id).await),
            JobsQuery { id } => reply(driver.jobs_query(&id).await),
            GetProcessDiagram { instance } => reply(driver.get_process_diagram(&instance).await),
            CancelJob { job } => reply(driver.cancel_job(&job).await),
            RescheduleJob {
                job,
                repeat_interval,
                repeat_limit,
                schedule_date,
            } => reply(
                driver
                    .reschedule_job(&job, repeat_interval, repeat_limit, schedule_date)
                    .await,
            ),
            HandleProcessAbort { instance } => reply(driver.handle_process_abort(&instance).await),
            HandleProcessRetry { instance } => reply(driver.handle_process_retry(&instance).await),
            HandleProcessSkip { instance } => reply(driver.handle_process_skip(&instance).await),
            HandleNodeInstanceCancel { instance, node } => {
                reply(driver.handle_node_instance_cancel(&instance, &node).await)
            }
            HandleNodeInstanceRetrigger { instance, node } => {
                reply(driver.handle_node_instance_retrigger(&instance, &node).await)
            }
            GetTriggerableNodes { instance } => reply(driver.get_triggerable_nodes(&instance).await),
            OpenProcessInstanceDetails { id } => {
                debug!(process_instance_id = %id, "Opening process instance details");
                driver.open_process_instance_details(&id).await;
                Ok(Value::Null)
            }
        }
    }
}

/// Typed Envelope API of the process-details view, used by the host.
#[derive(Clone)]
pub struct ProcessDetailsEnvelopeApi {
    proxy: ApiProxy<ProcessDetailsEnvelopeCall>,
}

impl ProcessDetailsEnvelopeApi {
    pub fn new(proxy: ApiProxy<ProcessDetailsEnvelopeCall>) -> Self {
        Self { proxy }
    }

    /// One `init` attempt.
    pub async fn init(&self, association: Association, init_args: ProcessDetailsInitArgs) -> Result<(), BridgeError> {
        self.proxy
            .call(ProcessDetailsEnvelopeCall::Init {
                association,
                init_args: Box::new(init_args),
            })
            .await
            .map(|_| ())
    }
}
