//! Envelope Bridge Demo
//!
//! Runs a host page and an embedded process-details view in one process, joined by
//! an in-memory window pair.
//!
//! ## Usage
//!
//! ```bash
//! # Defaults
//! envelope-bridge
//!
//! # Custom config and origins
//! envelope-bridge --config bridge.toml --host-origin https://console.example \
//!     --envelope-origin https://widgets.example
//!
//! # More logging
//! RUST_LOG=envelope_bridge=debug envelope-bridge
//! ```
//!
//! ## What it does
//!
//! 1. Seeds an in-memory Driver with one process instance and its jobs
//! 2. Runs the init handshake between host and view
//! 3. The view loads the instance, its jobs and diagram through the bridge,
//!    cancels a job and asks the host to open the parent instance
//! 4. Tears both sides down

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use envelope_bridge::driver::InMemoryProcessDetailsDriver;
use envelope_bridge::models::{Job, NodeInstance, ProcessDetailsInitArgs, ProcessInstance, SvgResponse};
use envelope_bridge::process_details::{
    ProcessDetailsChannelApiImpl, ProcessDetailsChannelCall, ProcessDetailsDriver, ProcessDetailsEnvelopeApi,
    ProcessDetailsEnvelopeApiImpl, ProcessDetailsEnvelopeCall, ProcessDetailsView,
};
use envelope_bridge::{window_pair, BridgeConfig, EnvelopeClient, EnvelopeServer};

#[derive(Parser, Debug)]
#[command(name = "envelope-bridge")]
#[command(about = "Host and embedded process-details view talking over the envelope bridge")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Origin of the host page
    #[arg(long, env = "ENVELOPE_BRIDGE_HOST_ORIGIN")]
    host_origin: Option<String>,

    /// Origin the embedded view is served from
    #[arg(long, env = "ENVELOPE_BRIDGE_ENVELOPE_ORIGIN", default_value = "http://localhost:9000")]
    envelope_origin: String,

    /// Process instance shown by the view
    #[arg(long, default_value = "8035b580-6ae4-4aa8-9ec0-e18e19809e0b")]
    process_id: String,

    /// Handshake timeout in milliseconds (0 = wait forever)
    #[arg(long)]
    init_timeout_ms: Option<u64>,
}

/// View that logs what it loads through its Driver.
#[derive(Default)]
struct LoggingView {
    loaded: Mutex<Option<(ProcessDetailsInitArgs, Arc<dyn ProcessDetailsDriver>)>>,
}

#[async_trait]
impl ProcessDetailsView for LoggingView {
    async fn initialize(&self, init_args: ProcessDetailsInitArgs, driver: Arc<dyn ProcessDetailsDriver>) {
        info!(
            process_instance_id = %init_args.process_instance.id,
            label = %init_args.singular_process_label,
            "View initialized"
        );
        *self.loaded.lock().await = Some((init_args, driver));
    }

    fn ready(&self) {
        info!("View ready");
    }
}

impl LoggingView {
    async fn load(&self) -> anyhow::Result<()> {
        let (init_args, driver) = self
            .loaded
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("view was never initialized"))?;

        let instance = driver
            .process_details_query(&init_args.process_instance.id)
            .await?;
        info!(
            process_instance_id = %instance.id,
            state = ?instance.state,
            nodes = instance.node_instances.len(),
            "Loaded process instance"
        );

        let jobs = driver.jobs_query(&instance.id).await?;
        for job in &jobs {
            info!(job_id = %job.id, status = ?job.status, "Job");
        }

        match driver.get_process_diagram(&instance).await? {
            SvgResponse::Success { svg } => info!(bytes = svg.len(), "Loaded diagram"),
            SvgResponse::Error { error } => warn!(error = %error, "No diagram"),
        }

        if let Some(job) = jobs.first() {
            let modal = driver.cancel_job(job).await?;
            info!(title = %modal.modal_title, content = %modal.modal_content, "Cancel job");
        }

        if let Some(parent) = &instance.parent_process_instance_id {
            driver.open_process_instance_details(parent).await;
        }
        Ok(())
    }
}

async fn seed_driver(process_id: &str) -> InMemoryProcessDetailsDriver {
    let driver = InMemoryProcessDetailsDriver::new();

    let mut instance = ProcessInstance::new(process_id, "travels", "Travels");
    instance.business_key = Some("T-1001".to_string());
    instance.parent_process_instance_id = Some("e4448857-fa0c-403b-ad69-f0a353458b9d".to_string());
    instance.node_instances = vec![
        NodeInstance {
            id: "n1".to_string(),
            name: "Book flight".to_string(),
            node_type: "WorkItemNode".to_string(),
            definition_id: "_1".to_string(),
            node_id: "1".to_string(),
            enter: Utc::now(),
            exit: Some(Utc::now()),
        },
        NodeInstance {
            id: "n2".to_string(),
            name: "Confirm travel".to_string(),
            node_type: "HumanTaskNode".to_string(),
            definition_id: "_2".to_string(),
            node_id: "2".to_string(),
            enter: Utc::now(),
            exit: None,
        },
    ];
    driver.insert_instance(instance).await;

    driver
        .insert_job(Job::scheduled("job-1", "travels", process_id))
        .await;
    driver
        .insert_job(Job::scheduled("job-2", "travels", process_id))
        .await;
    driver
        .insert_diagram("travels", "<svg xmlns=\"http://www.w3.org/2000/svg\"/>")
        .await;

    driver
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("envelope_bridge=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => BridgeConfig::default(),
    };

    // Apply CLI overrides
    if let Some(origin) = args.host_origin {
        config.host_origin = origin;
    }
    if let Some(timeout) = args.init_timeout_ms {
        config.init_timeout_ms = timeout;
    }
    config.validate()?;

    info!(
        host_origin = %config.host_origin,
        envelope_origin = %args.envelope_origin,
        process_id = %args.process_id,
        "Starting envelope-bridge demo"
    );

    let ((host_transport, host_inbox), (envelope_transport, envelope_inbox)) =
        window_pair(&config.host_origin, &args.envelope_origin, config.inbox_capacity);

    // Host page
    let driver = Arc::new(seed_driver(&args.process_id).await);
    let server = EnvelopeServer::new(Arc::new(host_transport), config.clone());
    server.register_channel_api::<ProcessDetailsChannelCall, _>(Arc::new(ProcessDetailsChannelApiImpl::new(
        Arc::clone(&driver),
    )));
    server.run(host_inbox);

    // Embedded view
    let client = EnvelopeClient::new(Arc::new(envelope_transport));
    let view = Arc::new(LoggingView::default());
    client.register_envelope_api::<ProcessDetailsEnvelopeCall, _>(Arc::new(ProcessDetailsEnvelopeApiImpl::new(
        client.clone(),
        Arc::clone(&view),
    )));
    client.run(envelope_inbox);

    // Handshake
    let instance = driver.process_details_query(&args.process_id).await?;
    let init_args = ProcessDetailsInitArgs::new(instance);
    let envelope_api = ProcessDetailsEnvelopeApi::new(server.envelope_api());
    server
        .start_init_polling(|association| envelope_api.init(association, init_args.clone()))
        .await?;
    info!(envelope_server_id = %server.id(), "Handshake complete");

    view.load().await?;

    // openProcessInstanceDetails is fire-and-forget
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(opened = ?driver.opened().await, "Host navigation requests");

    client.teardown().await;
    server.teardown().await;

    info!("Shutdown complete");
    Ok(())
}
