//! Move Guardian API Server
//!
//! REST API returning pre-signing risk verdicts for Move entry-function calls
//!
//! Usage:
//!   cargo run --bin guardian_api
//!
//! Environment:
//!   GUARDIAN_PORT / PORT     - Server port (default: 8080)
//!   GUARDIAN_HOST            - Server host (default: 0.0.0.0)
//!   APTOS_{MAINNET,TESTNET,DEVNET}_URL - Fullnode REST base URLs
//!   THREAT_FEED_URL, LLM_ENDPOINT      - Optional evidence sources
//!   RUST_LOG                 - Log filter (default: info)

use move_guardian::api::{create_router, handlers::AppState, start_cleanup_task};
use move_guardian::{Guardian, GuardianConfig, MemoryStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    print_banner();

    let config = GuardianConfig::from_env();
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let store = MemoryStore::new();
    let guardian = Arc::new(Guardian::from_config(config, Arc::new(store.clone()))?);
    let telemetry = guardian.telemetry();

    let state = Arc::new(AppState::new(guardian));

    start_cleanup_task(state.rate_limiter.clone());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            store.purge_expired();
        }
    });
    info!("🧹 Background cleanup tasks started");

    let app = create_router(state);

    info!("🚀 Move Guardian API starting on http://{}", addr);
    info!("");
    info!("Endpoints:");
    info!("  POST /v1/analyze              - Risk verdict for a proposed call");
    info!("  GET  /v1/analysis/:share_id   - Shared verdict lookup");
    info!("  POST /v1/simulations          - Store a pre-computed simulation");
    info!("  GET  /v1/circuits             - Dependency circuit states");
    info!("  GET  /v1/stats                - Verdict statistics");
    info!("  GET  /v1/health               - Health check");
    info!("");
    info!("Press Ctrl+C for graceful shutdown");

    let listener = TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ Failed to listen for Ctrl+C: {}", e);
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("");
    info!("🛑 Shutdown signal received, cleaning up...");
    info!("📊 {}", telemetry.get_stats().summary());
    info!("👋 Move Guardian API shutdown complete");

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    ╔══════════════════════════════════════════════════════════════╗
    ║                                                              ║
    ║              M O V E   G U A R D I A N   v0.1.0              ║
    ║           Pre-Signing Risk Verdicts for Aptos Move           ║
    ║                                                              ║
    ╚══════════════════════════════════════════════════════════════╝
    "#
    );
}
