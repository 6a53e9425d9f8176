use std::sync::Arc;

use anyhow::Context;
use propdesk_api::app::{build_app, memory_state, postgres_state};
use propdesk_api::config::Config;
use propdesk_infra::{DevOtpSender, MemoryDb, PgDb};
use propdesk_users::OtpSender;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    propdesk_observability::init();

    let config = Config::from_env()?;
    // No SMS provider is wired yet; codes are written to the log.
    let otp: Arc<dyn OtpSender> = Arc::new(DevOtpSender::new());

    let app = match &config.database_url {
        Some(url) => {
            let db = PgDb::connect(url, config.db_max_connections)
                .await
                .context("connecting to postgres")?;
            db.migrate().await.context("applying schema")?;
            build_app(postgres_state(&config, &db, otp)?, config.request_timeout)
        }
        None => {
            let db = MemoryDb::new();
            build_app(memory_state(&config, &db, otp)?, config.request_timeout)
        }
    };

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
