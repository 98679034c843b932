//! Process bootstrap shared by the `bpd` subcommands.
//!
//! `run` owns the whole process lifetime: pool, Supervisor, status API and
//! shutdown. Everything it needs from the environment is read here once.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use bpd_config::{discover_from_env, load_profiles_yaml, Discovery};
use bpd_db::{EventStore, PgEventStore};
use bpd_opcua::DeviceTransport;
use bpd_runtime::{ConsoleDump, DeviceController, PersistenceGateway, RecordHook, Supervisor};
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};

use crate::{routes, state::AppState};

pub const ENV_DAEMON_ADDR: &str = "BPD_DAEMON_ADDR";

const DEFAULT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8898);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load profiles from `config` (YAML) or, when absent, from the environment.
/// Rejected machines are logged and left out.
pub fn load_discovery(config: Option<&str>) -> Result<Discovery> {
    let discovery = match config {
        Some(path) => {
            load_profiles_yaml(path).with_context(|| format!("load profiles from {path}"))?
        }
        None => discover_from_env(),
    };

    for rejected in &discovery.rejected {
        warn!(machine = %rejected.machine, error = %rejected.error, "skipping machine with invalid configuration");
    }
    info!(
        machines = ?discovery.machine_names(),
        config_hash = %discovery.config_hash(),
        source = config.unwrap_or("environment"),
        "machine profiles loaded"
    );
    Ok(discovery)
}

pub fn bind_addr_from_env() -> SocketAddr {
    std::env::var(ENV_DAEMON_ADDR)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or_else(|| SocketAddr::from(DEFAULT_ADDR))
}

#[cfg(feature = "opcua-client")]
fn device_transport() -> Result<Arc<dyn DeviceTransport>> {
    Ok(Arc::new(bpd_opcua::OpcUaTransport::default()))
}

#[cfg(not(feature = "opcua-client"))]
fn device_transport() -> Result<Arc<dyn DeviceTransport>> {
    anyhow::bail!("bpd was built without the `opcua-client` feature; no device transport available")
}

// ---------------------------------------------------------------------------
// bpd run
// ---------------------------------------------------------------------------

pub async fn run(config: Option<&str>) -> Result<()> {
    let discovery = load_discovery(config)?;
    let transport = device_transport()?;

    let pool = bpd_db::connect_from_env().await?;
    let store: Arc<dyn EventStore> = Arc::new(PgEventStore::from_profiles(
        pool.clone(),
        &discovery.profiles,
    )?);
    let gateway = PersistenceGateway::new(store);
    let hook: Arc<dyn RecordHook> = Arc::new(ConsoleDump);

    let mut supervisor = match Supervisor::launch(&discovery.profiles, |profile| {
        Ok(
            DeviceController::new(profile.clone(), transport.clone(), gateway.clone())?
                .with_hook(hook.clone()),
        )
    }) {
        Ok(s) => s,
        Err(e) => {
            pool.close().await;
            return Err(e.into());
        }
    };

    let shared = Arc::new(AppState::new(supervisor.status_board()));
    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = bind_addr_from_env();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            supervisor.stop().await;
            pool.close().await;
            return Err(e).with_context(|| format!("bind status API on {addr}"));
        }
    };
    info!("bpd status API listening on http://{}", addr);

    let shutdown = CancellationToken::new();
    let server_token = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => info!("shutdown signal received"),
        res = &mut server => match res {
            Ok(Ok(())) => warn!("status API exited"),
            Ok(Err(e)) => error!(error = %e, "status API crashed"),
            Err(e) => error!(error = %e, "status API task ended abnormally"),
        },
    }

    shutdown.cancel();
    supervisor.stop().await;
    if !server.is_finished() {
        if let Err(e) = server.await {
            warn!(error = %e, "status API task ended abnormally");
        }
    }
    pool.close().await;
    info!("bpd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
