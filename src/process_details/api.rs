//! Process details API surfaces.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::api::{arg, unknown, ApiCall, Args, CallKind};
use crate::error::BridgeError;
use crate::handshake::Association;
use crate::models::{Job, NodeInstance, ProcessDetailsInitArgs, ProcessInstance};

/// Calls the embedded process-details view makes on the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessDetailsChannelCall {
    ProcessDetailsQuery {
        id: String,
    },
    JobsQuery {
        id: String,
    },
    GetProcessDiagram {
        instance: Box<ProcessInstance>,
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
    HandleProcessAbort {
        instance: Box<ProcessInstance>,
    },
    HandleProcessRetry {
        instance: Box<ProcessInstance>,
    },
    HandleProcessSkip {
        instance: Box<ProcessInstance>,
    },
    HandleNodeInstanceCancel {
        instance: Box<ProcessInstance>,
        node: Box<NodeInstance>,
    },
    HandleNodeInstanceRetrigger {
        instance: Box<ProcessInstance>,
        node: Box<NodeInstance>,
    },
    GetTriggerableNodes {
        instance: Box<ProcessInstance>,
    },
    OpenProcessInstanceDetails {
        id: String,
    },
}

impl ApiCall for ProcessDetailsChannelCall {
    const METHODS: &'static [(&'static str, CallKind)] = &[
        ("processDetailsQuery", CallKind::Request),
        ("jobsQuery", CallKind::Request),
        ("getProcessDiagram", CallKind::Request),
        ("cancelJob", CallKind::Request),
        ("rescheduleJob", CallKind::Request),
        ("handleProcessAbort", CallKind::Request),
        ("handleProcessRetry", CallKind::Request),
        ("handleProcessSkip", CallKind::Request),
        ("handleNodeInstanceCancel", CallKind::Request),
        ("handleNodeInstanceRetrigger", CallKind::Request),
        ("getTriggerableNodes", CallKind::Request),
        ("openProcessInstanceDetails", CallKind::Notification),
    ];

    fn method(&self) -> &'static str {
        match self {
            Self::ProcessDetailsQuery { .. } => "processDetailsQuery",
            Self::JobsQuery { .. } => "jobsQuery",
            Self::GetProcessDiagram { .. } => "getProcessDiagram",
            Self::CancelJob { .. } => "cancelJob",
            Self::RescheduleJob { .. } => "rescheduleJob",
            Self::HandleProcessAbort { .. } => "handleProcessAbort",
            Self::HandleProcessRetry { .. } => "handleProcessRetry",
            Self::HandleProcessSkip { .. } => "handleProcessSkip",
            Self::HandleNodeInstanceCancel { .. } => "handleNodeInstanceCancel",
            Self::HandleNodeInstanceRetrigger { .. } => "handleNodeInstanceRetrigger",
            Self::GetTriggerableNodes { .. } => "getTriggerableNodes",
            Self::OpenProcessInstanceDetails { .. } => "openProcessInstanceDetails",
        }
    }

    fn into_args(self) -> Result<Vec<Value>, BridgeError> {
        Ok(match self {
            Self::ProcessDetailsQuery { id }
            | Self::JobsQuery { id }
            | Self::OpenProcessInstanceDetails { id } => vec![Value::String(id)],
            Self::GetProcessDiagram { instance }
            | Self::HandleProcessAbort { instance }
            | Self::HandleProcessRetry { instance }
            | Self::HandleProcessSkip { instance }
            | Self::GetTriggerableNodes { instance } => vec![arg(&instance)?],
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
            Self::HandleNodeInstanceCancel { instance, node }
            | Self::HandleNodeInstanceRetrigger { instance, node } => vec![arg(&instance)?, arg(&node)?],
        })
    }

    fn from_wire(method: &str, args: Vec<Value>) -> Result<Self, BridgeError> {
        let mut args = Args::new(method, args);
        Ok(match method {
            "processDetailsQuery" => Self::ProcessDetailsQuery { id: args.next()? },
            "jobsQuery" => Self::JobsQuery { id: args.next()? },
            "getProcessDiagram" => Self::GetProcessDiagram {
                instance: args.next()?,
            },
            "cancelJob" => Self::CancelJob { job: args.next()? },
            "rescheduleJob" => Self::RescheduleJob {
                job: args.next()?,
                repeat_interval: args.next()?,
                repeat_limit: args.next()?,
                schedule_date: args.next()?,
            },
            "handleProcessAbort" => Self::HandleProcessAbort {
                instance: args.next()?,
            },
            "handleProcessRetry" => Self::HandleProcessRetry {
                instance: args.next()?,
            },
            "handleProcessSkip" => Self::HandleProcessSkip {
                instance: args.next()?,
            },
            "handleNodeInstanceCancel" => Self::HandleNodeInstanceCancel {
                instance: args.next()?,
                node: args.next()?,
            },
            "handleNodeInstanceRetrigger" => Self::HandleNodeInstanceRetrigger {
                instance: args.next()?,
                node: args.next()?,
            },
            "getTriggerableNodes" => Self::GetTriggerableNodes {
                instance: args.next()?,
            },
            "openProcessInstanceDetails" => Self::OpenProcessInstanceDetails { id: args.next()? },
            other => return Err(unknown(other)),
        })
    }
}

/// Calls the host makes on the embedded process-details view.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessDetailsEnvelopeCall {
    Init {
        association: Association,
        init_args: Box<ProcessDetailsInitArgs>,
    },
}

impl ApiCall for ProcessDetailsEnvelopeCall {
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
