use financemcp_server::api::app_router;
use financemcp_server::config::Config;
use financemcp_server::main_lib::{build_state, init_tracing};
use financemcp_server::scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let state = build_state(&config).await?;

    scheduler::start_cache_sweeper(state.clone(), config.cache_sweep_interval);

    let router = app_router(state, &config);
    tracing::info!("{} listening on {}", config.server_name, config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
