use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    response::IntoResponse,
};
use reqwest::Client;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dmify_backend::{
    config::Config,
    db::{
        postgres_job_repository::PostgresJobRepository,
        postgres_ledger_repository::PostgresLedgerRepository,
        postgres_payment_repository::PostgresPaymentRepository,
        postgres_project_repository::PostgresProjectRepository,
        postgres_stripe_event_log_repository::PostgresStripeEventLogRepository,
        postgres_user_repository::PostgresUserRepository,
    },
    models::plan::PlanCatalog,
    responses::JsonResponse,
    routes,
    services::{
        allowance::AllowanceManager,
        generation::{ApifyProfileScraper, Generator, OpenAiComposer},
        smtp_mailer::SmtpMailer,
        stripe::LiveStripeService,
    },
    state::AppState,
    utils::jwt::JwtKeys,
    worker,
};

const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info,sqlx=warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env().context("invalid configuration")?;
    let jwt_keys = JwtKeys::from_env().context("invalid JWT_SECRET")?;

    let global_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit.per_second)
            .burst_size(config.rate_limit.burst_size)
            .use_headers()
            .error_handler(|_err| JsonResponse::too_many_requests(RATE_LIMIT_MESSAGE).into_response())
            .finish()
            .ok_or_else(|| anyhow!("invalid global rate limiter settings"))?,
    );
    // Stricter limiter for /auth/*
    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit.auth_per_second)
            .burst_size(config.rate_limit.auth_burst_size)
            .use_headers()
            .error_handler(|_err| JsonResponse::too_many_requests(RATE_LIMIT_MESSAGE).into_response())
            .finish()
            .ok_or_else(|| anyhow!("invalid auth rate limiter settings"))?,
    );

    let global_limiter = global_governor_conf.limiter().clone();
    let auth_limiter = auth_governor_conf.limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            global_limiter.retain_recent();
            auth_limiter.retain_recent();
        }
    });

    let pool = establish_connection(&config.database_url).await?;
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    let http_client = Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("failed to build HTTP client")?;

    let ledger = Arc::new(PostgresLedgerRepository { pool: pool.clone() });
    let generator = Generator::new(
        Arc::new(ApifyProfileScraper::new(
            http_client.clone(),
            config.apify_api_token.clone(),
        )),
        Arc::new(OpenAiComposer::new(
            http_client,
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        )),
    );
    let mailer = SmtpMailer::new(&config.frontend_origin).context("failed to initialize mailer")?;

    let state = AppState {
        db: Arc::new(PostgresUserRepository { pool: pool.clone() }),
        projects: Arc::new(PostgresProjectRepository { pool: pool.clone() }),
        ledger: ledger.clone(),
        jobs: Arc::new(PostgresJobRepository { pool: pool.clone() }),
        payments: Arc::new(PostgresPaymentRepository { pool: pool.clone() }),
        stripe_events: Arc::new(PostgresStripeEventLogRepository { pool }),
        allowance: AllowanceManager::new(ledger),
        generator,
        mailer: Arc::new(mailer),
        stripe: Arc::new(LiveStripeService::from_settings(&config.stripe)),
        plans: Arc::new(PlanCatalog::from_env()),
        config: Arc::new(config.clone()),
        jwt_keys: Arc::new(jwt_keys),
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .context("FRONTEND_ORIGIN is not a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let auth_routes = routes::auth_routes().layer(GovernorLayer {
        config: auth_governor_conf,
    });
    let app = routes::app_router(auth_routes)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: global_governor_conf,
        })
        .layer(cors);

    worker::start_background_workers(state).await;

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("BIND_ADDR {} is not a socket address", config.bind_addr))?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "DMify API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

/// Connects and verifies the pool with a round trip.
async fn establish_connection(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to the database")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("failed to verify database connection")?;

    info!("connected to the database");
    Ok(pool)
}
