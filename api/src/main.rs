use anyhow::Context;
use yatube_api::{build_app, config, db, telemetry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env().context("invalid configuration")?;
    telemetry::init(config.log_format);

    if config.jwt_secret == config::DEFAULT_JWT_SECRET {
        tracing::warn!("JWT_SECRET is not set; using the development secret");
    }

    let pool = db::open_pool(&config.database_url)
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    db::run_migrations(&pool).context("failed to run migrations")?;

    let addr = config.bind_addr.clone();
    let app = build_app(AppState::new(pool, config))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
