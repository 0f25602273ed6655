//! Application orchestrator: wires catalog, session, dispatcher and server.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use lobbyhost_catalog::{CatalogCache, HttpCatalogSource, SqliteCatalogStore};
use lobbyhost_server::{Dispatcher, LobbyServer};
use lobbyhost_session::{
    CredentialPrompt, CredentialStore, Credentials, PromptFuture, SandboxConnector,
    SessionCoordinator,
};

use crate::config::Config;

/// Viewer events that may wait for the dispatcher.
const INBOUND_QUEUE: usize = 1024;

/// Display name of the in-process account.
const ACCOUNT_NAME: &str = "LobbyHost";

const ACCOUNT_ID_ENV: &str = "LOBBYHOST_ACCOUNT_ID";
const DEVICE_ID_ENV: &str = "LOBBYHOST_DEVICE_ID";
const SECRET_ENV: &str = "LOBBYHOST_SECRET";

/// Runs the host until Ctrl-C or a fatal server error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    // -- Catalog --
    let store = Arc::new(SqliteCatalogStore::open(&config.database_file)?);
    let mut source = HttpCatalogSource::new(config.catalog.api_key.as_deref())?;
    if let Some(url) = &config.catalog.base_url {
        source = source.with_base_url(url.clone());
    }
    let catalog = Arc::new(CatalogCache::new(store, Arc::new(source))?);
    tracing::info!(
        items = catalog.items().len(),
        path = %config.database_file.display(),
        "catalog opened"
    );

    // -- Session --
    let credentials = Arc::new(CredentialStore::new(config.credentials_file.clone())?);
    let connector = Arc::new(SandboxConnector::new(ACCOUNT_NAME));
    let session = SessionCoordinator::new(
        config.session_config(),
        connector,
        credentials,
        Arc::new(EnvPrompt),
    );

    // -- Dispatcher --
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let mut dispatcher = Dispatcher::new(session, catalog, inbound_rx)?;
    if config.catalog.refresh_on_start {
        dispatcher.refresh_catalog(None);
    }
    let dispatcher_task = tokio::spawn(dispatcher.run(cancel.clone()));

    // -- WS server --
    let server = LobbyServer::new(config.server_config(), inbound_tx, cancel.clone());
    let server_run = Arc::clone(&server);
    let mut server_task = tokio::spawn(async move { server_run.run().await });

    tracing::info!("host ready");

    let outcome: anyhow::Result<()> = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
            Ok(())
        }
        result = &mut server_task => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(e.into()),
        },
    };

    // -- Graceful shutdown --
    tracing::info!("stopping services...");
    server.shutdown();
    if !server_task.is_finished() {
        if let Err(e) = server_task.await {
            tracing::warn!("server task failed: {e}");
        }
    }
    if let Err(e) = dispatcher_task.await {
        tracing::warn!("dispatcher task failed: {e}");
    }

    outcome
}

/// Reads fresh credentials from the environment.
struct EnvPrompt;

impl CredentialPrompt for EnvPrompt {
    fn request(&self) -> PromptFuture<'_> {
        Box::pin(async {
            let credentials = credentials_from(|key| std::env::var(key).ok());
            if credentials.is_none() {
                tracing::warn!(
                    "no stored credentials and {ACCOUNT_ID_ENV}/{DEVICE_ID_ENV}/{SECRET_ENV} not set"
                );
            }
            credentials
        })
    }
}

fn credentials_from(lookup: impl Fn(&str) -> Option<String>) -> Option<Credentials> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    Some(Credentials {
        account_id: get(ACCOUNT_ID_ENV)?,
        device_id: get(DEVICE_ID_ENV)?,
        secret: get(SECRET_ENV)?,
    })
}
