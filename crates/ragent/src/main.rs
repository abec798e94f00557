use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragent::bot::{Bot, BotDeps};
use ragent::config::Settings;
use ragent::handlers::build_router;
use ragent::logging::ActivityLogger;
use ragent::services::{
    CatalogRegistry, EmbeddedRecallIndex, EmbeddingService, ImageIngestor, LlmService,
};
use ragent::state::AppState;
use ragent::store::SnapshotStore;

fn init_tracing() -> Result<WorkerGuard> {
    let filter = EnvFilter::try_new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,ragent=debug".to_string()),
    )?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("ragent")
        .filename_suffix("log")
        .build("logs")?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stdout)
                .with_target(true)
                .with_thread_ids(true),
        )
        .with(
            fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_target(true)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_tracing()?;

    info!("Starting RAgent...");

    let settings = Settings::load()?;
    info!("Configuration loaded");

    let store = Arc::new(SnapshotStore::open(&settings.persistence.directory)?);
    info!(
        "Conversation memory restored from {}",
        settings.persistence.directory.display()
    );

    let embedder = Arc::new(EmbeddingService::new(settings.embedding.clone())?);
    let recall = Arc::new(EmbeddedRecallIndex::new(
        embedder,
        settings.context.similarity_top_k,
    ));
    let llm = Arc::new(LlmService::new(settings.llm.clone())?);
    let images = Arc::new(ImageIngestor::new(&settings.images)?);
    let registry = Arc::new(CatalogRegistry::new());
    let activity = ActivityLogger::from_settings(&settings.activity);

    let bot = Bot::new(
        &settings,
        BotDeps {
            store,
            recall,
            llm,
            images,
            registry,
            activity: activity.clone(),
        },
    );
    bot.restore_recall().await;

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let state = AppState {
        bot: Arc::new(bot),
        activity,
    };
    let app = build_router(state);

    info!("Event gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
