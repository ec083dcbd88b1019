use std::{sync::Arc, time::Duration};

use futures::FutureExt;
use kube::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;
use typed_builder::TypedBuilder;

mod admin;
mod cache;
mod common;
mod controllers;
mod differ;
mod resources;
mod services;
mod state;
mod sync;
mod translator;

pub use admin::{AdminClient, AdminConfig, MemoryAdminClient};
pub use resources::GatewayRoute;

use cache::{MemoryResourceCache, ReferenceIndex};
use controllers::{RouteWatcherService, SecretWatcherService};
use services::{ReconcilerService, StatusPatcherService, WorkQueue};
use state::LocalStateStore;
use sync::SyncEngine;
use translator::Translator;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

// Route and secret watchers each complete one initial listing.
const INITIAL_SYNCS: usize = 2;

#[derive(Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    pub controller_name: String,
    pub admin: AdminConfig,
    pub enable_open_telemetry: Option<bool>,
    #[builder(default = 4)]
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[builder(default = 30)]
    #[serde(default = "default_resync_period_secs")]
    pub resync_period_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_resync_period_secs() -> u64 {
    30
}

#[derive(Error, Debug)]
enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("admin endpoint must be not empty")]
    AdminEndpoint,
    #[error("worker count must be positive")]
    Workers,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName.into());
        }
        if self.admin.endpoint.is_empty() {
            return Err(ConfigurationError::AdminEndpoint.into());
        }
        if self.workers == 0 {
            return Err(ConfigurationError::Workers.into());
        }
        Ok(())
    }
}

pub async fn start(configuration: Configuration) -> Result<()> {
    info!("Gatewarden started");
    let client = Client::try_default().await?;

    let (event_channel_sender, event_channel_receiver) = mpsc::channel(1024);
    let (status_channel_sender, status_channel_receiver) = mpsc::channel(1024);

    let cache = Arc::new(MemoryResourceCache::expecting(INITIAL_SYNCS));
    let references = Arc::new(ReferenceIndex::new());
    let queue = Arc::new(WorkQueue::new());
    let state = LocalStateStore::new();
    let translator = Arc::new(Translator::new(Arc::clone(&cache) as Arc<dyn cache::ResourceCache>));

    let admin: Arc<dyn AdminClient> = Arc::new(MemoryAdminClient::new());
    let sync_engine = Arc::new(
        SyncEngine::builder()
            .admin(Arc::clone(&admin))
            .state(state.clone())
            .call_timeout(configuration.admin.call_timeout())
            .build(),
    );

    let route_watcher_service = RouteWatcherService::builder()
        .client(client.clone())
        .cache(Arc::clone(&cache))
        .event_sender(event_channel_sender.clone())
        .build();

    let secret_watcher_service = SecretWatcherService::builder()
        .client(client.clone())
        .cache(Arc::clone(&cache))
        .event_sender(event_channel_sender)
        .build();

    let reconciler_service = ReconcilerService::builder()
        .event_receiver(event_channel_receiver)
        .queue(queue)
        .cache(cache)
        .references(references)
        .translator(translator)
        .sync_engine(sync_engine)
        .state(state)
        .status_sender(status_channel_sender)
        .workers(configuration.workers)
        .resync_period(Duration::from_secs(configuration.resync_period_secs))
        .build();

    let status_patcher_service = StatusPatcherService::builder()
        .client(client)
        .receiver(status_channel_receiver)
        .controller_name(configuration.controller_name)
        .build();

    let services = vec![
        route_watcher_service.start().boxed(),
        secret_watcher_service.start().boxed(),
        reconciler_service.start().boxed(),
        status_patcher_service.start().boxed(),
    ];

    // The first service failure, a cache that never warms or a dead watch
    // stream, takes the whole process down instead of leaving it running
    // without a reconciler.
    futures::future::try_join_all(services).await?;
    info!("Gatewarden stopped");
    Ok(())
}
