use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::serve;
use control_plane_gateway::{
    config::GatewayConfig, create_router, AppState, MockResponder, Pipeline, PipelineOptions,
    PolicyEngine, RouteRegistry,
};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config);

    info!("control-plane-gateway starting");

    let policies = load_policies(&config).context("failed to load policies")?;
    let registry = RouteRegistry::load(config.routes_config.as_deref())
        .context("failed to load route configuration")?;
    warn_on_unknown_policies(&registry, &policies);
    info!(
        routes = registry.len(),
        policies = policies.len(),
        "load phase complete"
    );

    let pipeline = Pipeline::new(Arc::new(registry), Arc::new(policies), MockResponder::new())
        .with_options(PipelineOptions {
            enforce_response_schema: config.enforce_response_schema,
        });
    let state = AppState::new(Arc::new(pipeline), config.request_timeout());
    let router = create_router(state);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .context("invalid server bind address")?;

    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read bound address")?;
    info!(%local_addr, "control-plane-gateway listening");

    serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server encountered an unrecoverable error")?;

    info!("control-plane-gateway shutdown complete");
    Ok(())
}

fn init_tracing(config: &GatewayConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn load_policies(config: &GatewayConfig) -> Result<PolicyEngine> {
    let mut engine = PolicyEngine::new();
    let loaded = match &config.policies_dir {
        Some(dir) => engine.load_dir(dir)?,
        None => engine.load_bundled(),
    };
    info!(loaded, "policies loaded");
    Ok(engine)
}

/// Routes naming a policy that failed to load stay registered and deny every request.
fn warn_on_unknown_policies(registry: &RouteRegistry, policies: &PolicyEngine) {
    for route in registry.list() {
        for name in &route.policy_names {
            if !policies.contains(name) {
                warn!(
                    route = %route.endpoint(),
                    policy = %name,
                    "route references a policy that is not loaded; requests will be denied"
                );
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
