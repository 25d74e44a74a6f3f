//! Embedded side of the process-details embedding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ProcessDetailsChannelCall, ProcessDetailsDriver, ProcessDetailsEnvelopeCall};
use crate::api::{ApiHandler, ApiProxy};
use crate::driver::{DriverError, DriverResult};
use crate::envelope::EnvelopeClient;
use crate::handshake::InitGuard;
use crate::models::{
    Job, JobCancel, ModalMessage, NodeInstance, ProcessDetailsInitArgs, ProcessInstance, SvgResponse,
    TriggerableNode,
};

/// [`ProcessDetailsDriver`] for embedded view code, backed by the Channel API.
#[derive(Clone)]
pub struct ProcessDetailsEnvelopeViewDriver {
    channel: ApiProxy<ProcessDetailsChannelCall>,
}

impl ProcessDetailsEnvelopeViewDriver {
    pub fn new(channel: ApiProxy<ProcessDetailsChannelCall>) -> Self {
        Self { channel }
    }

    async fn request<T: serde::de::DeserializeOwned>(&self, call: ProcessDetailsChannelCall) -> DriverResult<T> {
        self.channel.request(call).await.map_err(DriverError::from)
    }
}

fn boxed<T: Clone>(value: &T) -> Box<T> {
    Box::new(value.clone())
}

#[async_trait]
impl ProcessDetailsDriver for ProcessDetailsEnvelopeViewDriver {
    async fn process_details_query(&self, id: &str) -> DriverResult<ProcessInstance> {
        self.request(ProcessDetailsChannelCall::ProcessDetailsQuery { id: id.to_string() })
            .await
    }

    async fn jobs_query(&self, id: &str) -> DriverResult<Vec<Job>> {
        self.request(ProcessDetailsChannelCall::JobsQuery { id: id.to_string() })
            .await
    }

    async fn get_process_diagram(&self, instance: &ProcessInstance) -> DriverResult<SvgResponse> {
        self.request(ProcessDetailsChannelCall::GetProcessDiagram {
            instance: boxed(instance),
        })
        .await
    }

    async fn cancel_job(&self, job: &Job) -> DriverResult<JobCancel> {
        self.request(ProcessDetailsChannelCall::CancelJob { job: boxed(job) })
            .await
    }

    async fn reschedule_job(
        &self,
        job: &Job,
        repeat_interval: Option<u64>,
        repeat_limit: Option<u32>,
        schedule_date: Option<DateTime<Utc>>,
    ) -> DriverResult<ModalMessage> {
        self.request(ProcessDetailsChannelCall::RescheduleJob {
            job: boxed(job),
            repeat_interval,
            repeat_limit,
            schedule_date,
        })
        .await
    }

    async fn handle_process_abort(&self, instance: &ProcessInstance) -> DriverResult<()> {
        self.request(ProcessDetailsChannelCall::HandleProcessAbort {
            instance: boxed(instance),
        })
        .await
    }

    async fn handle_process_retry(&self, instance: &ProcessInstance) -> DriverResult<()> {
        self.request(ProcessDetailsChannelCall::HandleProcessRetry {
            instance: boxed(instance),
        })
        .await
    }

    async fn handle_process_skip(&self, instance: &ProcessInstance) -> DriverResult<()> {
        self.request(ProcessDetailsChannelCall::HandleProcessSkip {
            instance: boxed(instance),
        })
        .await
    }

    async fn handle_node_instance_cancel(&self, instance: &ProcessInstance, node: &NodeInstance) -> DriverResult<()> {
        self.request(ProcessDetailsChannelCall::HandleNodeInstanceCancel {
            instance: boxed(instance),
            node: boxed(node),
        })
        .await
    }

    async fn handle_node_instance_retrigger(
        &self,
        instance: &ProcessInstance,
        node: &NodeInstance,
    ) -> DriverResult<()> {
        self.request(ProcessDetailsChannelCall::HandleNodeInstanceRetrigger {
            instance: boxed(instance),
            node: boxed(node),
        })
        .await
    }

    async fn get_triggerable_nodes(&self, instance: &ProcessInstance) -> DriverResult<Vec<TriggerableNode>> {
        self.request(ProcessDetailsChannelCall::GetTriggerableNodes {
            instance: boxed(instance),
        })
        .await
    }

    async fn open_process_instance_details(&self, id: &str) {
        let call = ProcessDetailsChannelCall::OpenProcessInstanceDetails { id: id.to_string() };
        if let Err(e) = self.channel.notify(call).await {
            warn!(process_instance_id = %id, error = %e, "Failed to send openProcessInstanceDetails");
        }
    }
}

/// The embedded process-details view.
#[async_trait]
pub trait ProcessDetailsView: Send + Sync + 'static {
    /// Render with the init payload. `driver` reaches the host.
    async fn initialize(&self, init_args: ProcessDetailsInitArgs, driver: Arc<dyn ProcessDetailsDriver>);

    /// Signal that the view finished loading.
    fn ready(&self);
}

/// Envelope API served by the embedded process-details view.
///
/// Only the first `init` associates and initializes the view. Any later `init`,
/// including one arriving while the first is still inside `initialize`, answers
/// success at once, so the host may consider the session associated before the
/// view has called `ready`.
pub struct ProcessDetailsEnvelopeApiImpl<V: ?Sized> {
    client: EnvelopeClient,
    view: Arc<V>,
    init_guard: InitGuard,
}

impl<V: ProcessDetailsView + ?Sized> ProcessDetailsEnvelopeApiImpl<V> {
    pub fn new(client: EnvelopeClient, view: Arc<V>) -> Self {
        Self {
            client,
            view,
            init_guard: InitGuard::new(),
        }
    }
}

#[async_trait]
impl<V: ProcessDetailsView + ?Sized> ApiHandler<ProcessDetailsEnvelopeCall> for ProcessDetailsEnvelopeApiImpl<V> {
    async fn handle(&self, call: ProcessDetailsEnvelopeCall) -> Result<Value, Value> {
        match call {
            ProcessDetailsEnvelopeCall::Init {
                association,
                init_args,
            } => {
                if !self.init_guard.capture() {
                    debug!(envelope_server_id = %association.envelope_server_id, "Init already handled");
                    return Ok(Value::Null);
                }

                self.client
                    .associate(&association.origin, &association.envelope_server_id)
                    .await;

                let driver: Arc<dyn ProcessDetailsDriver> =
                    Arc::new(ProcessDetailsEnvelopeViewDriver::new(self.client.channel_api()));
                self.view.initialize(*init_args, driver).await;
                self.view.ready();

                info!(
                    envelope_server_id = %association.envelope_server_id,
                    "Process details view ready"
                );
                Ok(Value::Null)
            }
        }
    }
}
