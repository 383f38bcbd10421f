use std::process;
use std::sync::Arc;

use sorso::{
    application::drinks::DrinkService,
    application::error::AppError,
    cache::{Deadlines, FallbackStore, PgResultStore, ResultCache, ResultStore},
    config,
    infra::{ai::OpenAiCompletionClient, db, error::InfraError, http, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let primary: Option<Arc<dyn ResultStore>> = if settings.database.url.is_some() {
        let pool = db::connect_lazy(&settings.database).map_err(AppError::from)?;
        Some(Arc::new(PgResultStore::new(pool)))
    } else {
        info!(
            target = "sorso::startup",
            "database url not configured, cache runs on the file tier only"
        );
        None
    };

    let cache = ResultCache::new(
        primary,
        FallbackStore::new(settings.cache.directory.clone()),
        Deadlines::from(&settings.cache),
        settings.cache.default_ttl,
    );

    // Best-effort schema creation with its own deadline; request serving
    // does not wait for it.
    let schema_cache = cache.clone();
    tokio::spawn(async move {
        schema_cache.ensure_schema().await;
    });

    let backend = Arc::new(OpenAiCompletionClient::new(&settings.ai).map_err(AppError::from)?);
    let drinks = Arc::new(DrinkService::new(cache.clone(), backend));

    let state = http::AppState {
        drinks,
        cache,
        admin_key: settings.admin.api_key.clone().map(Arc::<str>::from),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    info!(
        target = "sorso::startup",
        addr = %settings.server.addr,
        "Sorso listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
