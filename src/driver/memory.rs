//! In-memory Drivers
//!
//! Plain implementations of both Driver traits over in-memory collections.
//! Used by the demo binary and the tests; a real host would back them with its
//! data-index client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{DriverError, DriverResult};
use crate::jobs_management::JobsManagementDriver;
use crate::models::{
    BulkJobCancel, Job, JobCancel, JobStatus, ModalMessage, NodeInstance, ProcessInstance,
    ProcessInstanceState, SortBy, SortDirection, SvgResponse, TriggerableNode,
};
use crate::process_details::ProcessDetailsDriver;

fn job_not_found(id: &str) -> DriverError {
    DriverError::new(format!("Job {} not found", id))
}

fn cancel_in(jobs: &mut [Job], id: &str) -> DriverResult<JobCancel> {
    let job = jobs.iter_mut().find(|j| j.id == id).ok_or_else(|| job_not_found(id))?;

    if !job.status.is_pending() {
        return Ok(ModalMessage {
            modal_title: "failure".to_string(),
            modal_content: format!("The job: {} failed to cancel. Error message: job is {:?}", id, job.status),
        });
    }

    job.status = JobStatus::Canceled;
    job.last_update = Some(Utc::now());
    debug!(job_id = %id, "Job canceled");

    Ok(ModalMessage {
        modal_title: "success".to_string(),
        modal_content: format!("The job: {} is canceled successfully", id),
    })
}

fn reschedule_in(
    jobs: &mut [Job],
    id: &str,
    repeat_interval: Option<u64>,
    repeat_limit: Option<u32>,
    schedule_date: Option<DateTime<Utc>>,
) -> DriverResult<ModalMessage> {
    let job = jobs.iter_mut().find(|j| j.id == id).ok_or_else(|| job_not_found(id))?;

    if !job.status.is_pending() {
        return Ok(ModalMessage {
            modal_title: "failure".to_string(),
            modal_content: format!("Reschedule of job: {} failed. Error message: job is {:?}", id, job.status),
        });
    }

    if repeat_interval.is_some() {
        job.repeat_interval = repeat_interval;
    }
    if repeat_limit.is_some() {
        job.repeat_limit = repeat_limit;
    }
    if schedule_date.is_some() {
        job.expiration_time = schedule_date;
    }
    job.status = JobStatus::Scheduled;
    job.last_update = Some(Utc::now());
    debug!(job_id = %id, "Job rescheduled");

    Ok(ModalMessage {
        modal_title: "success".to_string(),
        modal_content: "Reschedule of job successful".to_string(),
    })
}

// ============================================================================
// Process details
// ============================================================================

/// In-memory [`ProcessDetailsDriver`].
#[derive(Default)]
pub struct InMemoryProcessDetailsDriver {
    instances: RwLock<HashMap<String, ProcessInstance>>,
    jobs: RwLock<Vec<Job>>,
    /// SVG per process id
    diagrams: RwLock<HashMap<String, String>>,
    /// Triggerable nodes per process id
    triggerable: RwLock<HashMap<String, Vec<TriggerableNode>>>,
    opened: RwLock<Vec<String>>,
}

impl InMemoryProcessDetailsDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_instance(&self, instance: ProcessInstance) {
        self.instances.write().await.insert(instance.id.clone(), instance);
    }

    pub async fn insert_job(&self, job: Job) {
        self.jobs.write().await.push(job);
    }

    pub async fn insert_diagram(&self, process_id: impl Into<String>, svg: impl Into<String>) {
        self.diagrams.write().await.insert(process_id.into(), svg.into());
    }

    pub async fn insert_triggerable_nodes(&self, process_id: impl Into<String>, nodes: Vec<TriggerableNode>) {
        self.triggerable.write().await.insert(process_id.into(), nodes);
    }

    pub async fn instance(&self, id: &str) -> Option<ProcessInstance> {
        self.instances.read().await.get(id).cloned()
    }

    pub async fn jobs_for(&self, process_instance_id: &str) -> Vec<Job> {
        self.jobs
            .read()
            .await
            .iter()
            .filter(|j| j.process_instance_id == process_instance_id)
            .cloned()
            .collect()
    }

    /// Ids passed to `open_process_instance_details`, oldest first.
    pub async fn opened(&self) -> Vec<String> {
        self.opened.read().await.clone()
    }

    async fn update_instance<F>(&self, id: &str, update: F) -> DriverResult<()>
    where
        F: FnOnce(&mut ProcessInstance) -> DriverResult<()> + Send,
    {
        let mut instances = self.instances.write().await;
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| DriverError::new(format!("Process instance {} not found", id)))?;
        update(instance)?;
        instance.last_update = Some(Utc::now());
        Ok(())
    }
}

fn require_state(instance: &ProcessInstance, action: &str, allowed: &[ProcessInstanceState]) -> DriverResult<()> {
    if allowed.contains(&instance.state) {
        Ok(())
    } else {
        Err(DriverError::new(format!(
            "Cannot {} process instance {} in state {:?}",
            action, instance.id, instance.state
        )))
    }
}

fn node_mut<'a>(instance: &'a mut ProcessInstance, node: &NodeInstance) -> DriverResult<&'a mut NodeInstance> {
    let instance_id = instance.id.clone();
    instance
        .node_instances
        .iter_mut()
        .find(|n| n.id == node.id)
        .ok_or_else(|| DriverError::new(format!("Node instance {} not found in {}", node.id, instance_id)))
}

#[async_trait]
impl ProcessDetailsDriver for InMemoryProcessDetailsDriver {
    async fn process_details_query(&self, id: &str) -> DriverResult<ProcessInstance> {
        self.instance(id)
            .await
            .ok_or_else(|| DriverError::new(format!("Process instance {} not found", id)))
    }

    async fn jobs_query(&self, id: &str) -> DriverResult<Vec<Job>> {
        Ok(self.jobs_for(id).await)
    }

    async fn get_process_diagram(&self, instance: &ProcessInstance) -> DriverResult<SvgResponse> {
        Ok(match self.diagrams.read().await.get(&instance.process_id) {
            Some(svg) => SvgResponse::Success { svg: svg.clone() },
            None => SvgResponse::Error {
                error: format!("No diagram available for process {}", instance.process_id),
            },
        })
    }

    async fn cancel_job(&self, job: &Job) -> DriverResult<JobCancel> {
        cancel_in(&mut self.jobs.write().await, &job.id)
    }

    async fn reschedule_job(
        &self,
        job: &Job,
        repeat_interval: Option<u64>,
        repeat_limit: Option<u32>,
        schedule_date: Option<DateTime<Utc>>,
    ) -> DriverResult<ModalMessage> {
        reschedule_in(
            &mut self.jobs.write().await,
            &job.id,
            repeat_interval,
            repeat_limit,
            schedule_date,
        )
    }

    async fn handle_process_abort(&self, instance: &ProcessInstance) -> DriverResult<()> {
        self.update_instance(&instance.id, |i| {
            if !i.state.is_live() {
                return Err(DriverError::new(format!(
                    "Cannot abort process instance {} in state {:?}",
                    i.id, i.state
                )));
            }
            i.state = ProcessInstanceState::Aborted;
            i.end = Some(Utc::now());
            Ok(())
        })
        .await
    }

    async fn handle_process_retry(&self, instance: &ProcessInstance) -> DriverResult<()> {
        self.update_instance(&instance.id, |i| {
            require_state(i, "retry", &[ProcessInstanceState::Error])?;
            i.state = ProcessInstanceState::Active;
            i.error = None;
            Ok(())
        })
        .await
    }

    async fn handle_process_skip(&self, instance: &ProcessInstance) -> DriverResult<()> {
        self.update_instance(&instance.id, |i| {
            require_state(i, "skip", &[ProcessInstanceState::Error])?;
            if let Some(error) = i.error.take() {
                let now = Utc::now();
                for node in i
                    .node_instances
                    .iter_mut()
                    .filter(|n| n.definition_id == error.node_definition_id && n.exit.is_none())
                {
                    node.exit = Some(now);
                }
            }
            i.state = ProcessInstanceState::Active;
            Ok(())
        })
        .await
    }

    async fn handle_node_instance_cancel(&self, instance: &ProcessInstance, node: &NodeInstance) -> DriverResult<()> {
        self.update_instance(&instance.id, |i| {
            let target = node_mut(i, node)?;
            if target.exit.is_none() {
                target.exit = Some(Utc::now());
            }
            Ok(())
        })
        .await
    }

    async fn handle_node_instance_retrigger(
        &self,
        instance: &ProcessInstance,
        node: &NodeInstance,
    ) -> DriverResult<()> {
        self.update_instance(&instance.id, |i| {
            let target = node_mut(i, node)?;
            target.enter = Utc::now();
            target.exit = None;
            Ok(())
        })
        .await
    }

    async fn get_triggerable_nodes(&self, instance: &ProcessInstance) -> DriverResult<Vec<TriggerableNode>> {
        Ok(self
            .triggerable
            .read()
            .await
            .get(&instance.process_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn open_process_instance_details(&self, id: &str) {
        info!(process_instance_id = %id, "Open process instance details");
        self.opened.write().await.push(id.to_string());
    }
}

// ============================================================================
// Jobs management
// ============================================================================

/// Current filter and sort order of the job list.
#[derive(Debug, Clone, Default)]
struct JobListView {
    filter: Vec<JobStatus>,
    order_by: SortBy,
}

/// In-memory [`JobsManagementDriver`].
#[derive(Default)]
pub struct InMemoryJobsManagementDriver {
    jobs: RwLock<Vec<Job>>,
    view: RwLock<JobListView>,
}

impl InMemoryJobsManagementDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        Self {
            jobs: RwLock::new(jobs),
            view: RwLock::new(JobListView::default()),
        }
    }

    pub async fn insert_job(&self, job: Job) {
        self.jobs.write().await.push(job);
    }

    pub async fn job(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.iter().find(|j| j.id == id).cloned()
    }

    pub async fn filter(&self) -> Vec<JobStatus> {
        self.view.read().await.filter.clone()
    }

    pub async fn order_by(&self) -> SortBy {
        self.view.read().await.order_by.clone()
    }
}

fn compare_field(a: &Job, b: &Job, field: &str) -> Ordering {
    match field {
        "id" => a.id.cmp(&b.id),
        "processId" => a.process_id.cmp(&b.process_id),
        "status" => a.status.cmp(&b.status),
        "priority" => a.priority.cmp(&b.priority),
        "retries" => a.retries.cmp(&b.retries),
        "executionCounter" => a.execution_counter.cmp(&b.execution_counter),
        "lastUpdate" => a.last_update.cmp(&b.last_update),
        "expirationTime" => a.expiration_time.cmp(&b.expiration_time),
        _ => Ordering::Equal,
    }
}

fn compare_jobs(a: &Job, b: &Job, order_by: &SortBy) -> Ordering {
    order_by
        .iter()
        .map(|(field, direction)| match direction {
            SortDirection::Asc => compare_field(a, b, field),
            SortDirection::Desc => compare_field(b, a, field),
        })
        .find(|ordering| *ordering != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

#[async_trait]
impl JobsManagementDriver for InMemoryJobsManagementDriver {
    async fn initial_load(&self, filter: &[JobStatus], order_by: &SortBy) -> DriverResult<()> {
        let mut view = self.view.write().await;
        view.filter = filter.to_vec();
        view.order_by = order_by.clone();
        Ok(())
    }

    async fn apply_filter(&self, filter: &[JobStatus]) -> DriverResult<()> {
        self.view.write().await.filter = filter.to_vec();
        Ok(())
    }

    async fn bulk_cancel(&self, jobs: &[Job]) -> DriverResult<BulkJobCancel> {
        let mut stored = self.jobs.write().await;
        let mut outcome = BulkJobCancel::default();

        for job in jobs {
            match cancel_in(&mut stored, &job.id) {
                Ok(modal) if modal.modal_title == "success" => {
                    if let Some(updated) = stored.iter().find(|j| j.id == job.id) {
                        outcome.successful_jobs.push(updated.clone());
                    }
                }
                _ => outcome.failed_jobs.push(job.clone()),
            }
        }

        debug!(
            successful = outcome.successful_jobs.len(),
            failed = outcome.failed_jobs.len(),
            "Bulk cancel finished"
        );
        Ok(outcome)
    }

    async fn cancel_job(&self, job: &Job) -> DriverResult<JobCancel> {
        cancel_in(&mut self.jobs.write().await, &job.id)
    }

    async fn reschedule_job(
        &self,
        job: &Job,
        repeat_interval: Option<u64>,
        repeat_limit: Option<u32>,
        schedule_date: Option<DateTime<Utc>>,
    ) -> DriverResult<ModalMessage> {
        reschedule_in(
            &mut self.jobs.write().await,
            &job.id,
            repeat_interval,
            repeat_limit,
            schedule_date,
        )
    }

    async fn sort_by(&self, order_by: &SortBy) -> DriverResult<()> {
        self.view.write().await.order_by = order_by.clone();
        Ok(())
    }

    async fn query(&self, offset: u32, limit: u32) -> DriverResult<Vec<Job>> {
        let view = self.view.read().await.clone();
        let jobs = self.jobs.read().await;

        let mut page: Vec<Job> = jobs
            .iter()
            .filter(|j| view.filter.is_empty() || view.filter.contains(&j.status))
            .cloned()
            .collect();
        page.sort_by(|a, b| compare_jobs(a, b, &view.order_by));

        Ok(page
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}
