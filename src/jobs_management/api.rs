//! Jobs management API surfaces.
//!
//! Channel methods carry the `jobList__` prefix on the wire.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::api::{arg, unknown, ApiCall, Args, CallKind};
use crate::error::BridgeError;
use crate::handshake::Association;
use crate::models::{Job, JobStatus, JobsManagementInitArgs, SortBy};

/// Calls the embedded job list makes on the host.
#[derive(Debug, Clone, PartialEq)]
pub enum JobsManagementChannelCall {
    InitialLoad {
        filter: Vec<JobStatus>,
        order_by: SortBy,
    },
    ApplyFilter {
        filter: Vec<JobStatus>,
    },
    BulkCancel {
        jobs: Vec<Job>,
    },
    CancelJob {
        job: Box<Job>,
    },
    RescheduleJob {
        job: Box<Job>,
        repeat_interval: Option<u64>,
        repeat_limit: Option<u32>,
        schedule_date: Option<DateTime<Utc>>,
    },
    SortBy {
        order_by: SortBy,
    },
    Query {
        offset: u32,
        limit: u32,
    },
}

impl ApiCall for JobsManagementChannelCall {
    const METHODS: &'static [(&'static str, CallKind)] = &[
        ("jobList__initialLoad", CallKind::Request),
        ("jobList__applyFilter", CallKind::Request),
        ("jobList__bulkCancel", CallKind::Request),
        ("jobList__cancelJob", CallKind::Request),
        ("jobList__rescheduleJob", CallKind::Request),
        ("jobList__sortBy", CallKind::Request),
        ("jobList__query", CallKind::Request),
    ];

    fn method(&self) -> &'static str {
        match self {
            Self::InitialLoad { .. } => "jobList__initialLoad",
            Self::ApplyFilter { .. } => "jobList__applyFilter",
            Self::BulkCancel { .. } => "jobList__bulkCancel",
            Self::CancelJob { .. } => "jobList__cancelJob",
            Self::RescheduleJob { .. } => "jobList__rescheduleJob",
            Self::SortBy { .. } => "jobList__sortBy",
            Self::Query { .. } => "jobList__query",
        }
    }

    fn into_args(self) -> Result<Vec<Value>, BridgeError> {
        Ok(match self {
            Self::InitialLoad { filter, order_by } => vec![arg(&filter)?, arg(&order_by)?],
            Self::ApplyFilter { filter } => vec![arg(&filter)?],
            Self::BulkCancel { jobs } => vec![arg(&jobs)?],
            Self::CancelJob { job } => vec![arg(&job)?],
            Self::RescheduleJob {
                job,
                repeat_interval,
                repeat_limit,
                schedule_date,
            } => vec![
                arg(&job)?,
                arg(&repeat_interval)?,
                arg(&repeat_limit)?,
                arg(&schedule_date)?,
            ],
            Self::SortBy { order_by } => vec![arg(&order_by)?],
            Self::Query { offset, limit } => vec![Value::from(offset), Value::from(limit)],
        })
    }

    fn from_wire(method: &str, args: Vec<Value>) -> Result<Self, BridgeError> {
        let mut args = Args::new(method, args);
        Ok(match method {
            "jobList__initialLoad" => Self::InitialLoad {
                filter: args.next()?,
                order_by: args.next()?,
            },
            "jobList__applyFilter" => Self::ApplyFilter { filter: args.next()? },
            "jobList__bulkCancel" => Self::BulkCancel { jobs: args.next()? },
            "jobList__cancelJob" => Self::CancelJob { job: args.next()? },
            "jobList__rescheduleJob" => Self::RescheduleJob {
                job: args.next()?,
                repeat_interval: args.next()?,
                repeat_limit: args.next()?,
                schedule_date: args.next()?,
            },
            "jobList__sortBy" => Self::SortBy { order_by: args.next()? },
            "jobList__query" => Self::Query {
                offset: args.next()?,
                limit: args.next()?,
            },
            other => return Err(unknown(other)),
        })
    }
}

/// Calls the host makes on the embedded job list.
#[derive(Debug, Clone, PartialEq)]
pub enum JobsManagementEnvelopeCall {
    Init {
        association: Association,
        init_args: JobsManagementInitArgs,
    },
}

impl ApiCall for JobsManagementEnvelopeCall {
    const METHODS: &'static [(&'static str, CallKind)] = &[("init", CallKind::Request)];

    fn method(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
        }
    }

    fn into_args(self) -> Result<Vec<Value>, BridgeError> {
        match self {
            Self::Init {
                association,
                init_args,
            } => Ok(vec![arg(&association)?, arg(&init_args)?]),
        }
    }

    fn from_wire(method: &str, args: Vec<Value>) -> Result<Self, BridgeError> {
        let mut args = Args::new(method, args);
        match method {
            "init" => Ok(Self::Init {
                association: args.next()?,
                init_args: args.next()?,
            }),
            other => Err(unknown(other)),
        }
    }
}
