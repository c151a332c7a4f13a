use std::{
    net::SocketAddr,
    process,
    sync::Arc,
    time::{Duration, Instant},
};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use tokio::net::TcpListener;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use verdura::{
    application::{
        catalog::ProductCatalogService,
        error::AppError,
        jobs::{PurgeTrashContext, parse_purge_schedule, process_purge_trash_job},
        orders::OrderService,
        repos::{FarmersRepo, OrdersRepo, ProductsRepo, SubscriptionsRepo, UsersRepo},
        trash::TrashService,
    },
    cache::{CacheConfig, RemoteTier, TieredCache},
    config,
    infra::{
        db::{PgStore, SoftDeleteStore},
        error::InfraError,
        http::{self, ApiState, envelope},
        telemetry,
    },
    security::{
        csrf::CsrfGuard,
        rate_limit::{PolicySet, RateLimiter},
    },
};

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
    envelope::configure_runtime(settings.runtime_env);

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::PurgeTrash(args) => run_purge(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let app = build_application_context(&settings).await?;

    let monitor_handle = spawn_purge_monitor(app.trash.clone(), &settings.trash)?;

    let result = serve_http(&settings, app.api_state).await;

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

async fn run_purge(
    settings: config::Settings,
    args: config::PurgeArgs,
) -> Result<(), AppError> {
    let app = build_application_context(&settings).await?;
    let trash = match args.retention_days {
        Some(days) => Arc::new(TrashService::new(
            app.trash.store().clone(),
            Duration::from_secs(u64::from(days) * 86_400),
        )),
        None => app.trash,
    };

    info!(
        target: "verdura::trash",
        retention_days = trash.retention().as_secs() / 86_400,
        "Starting purge pass"
    );
    let results = trash.purge_all().await;
    for (entity, result) in results {
        match result {
            Ok(purged) => info!(target: "verdura::trash", entity = %entity, purged, "Purge pass complete"),
            Err(err) => warn!(target: "verdura::trash", entity = %entity, error = %err, "Purge pass failed"),
        }
    }
    Ok(())
}

struct ApplicationContext {
    api_state: ApiState,
    trash: Arc<TrashService>,
}

async fn build_application_context(
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PgStore::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    let db = Arc::new(PgStore::new(pool));

    // The distributed tier is optional: without a Redis URL the cache runs
    // local-only, and a failed initial connect only degrades it.
    let cache_config = CacheConfig::from(&settings.cache);
    let remote = match (cache_config.is_enabled(), cache_config.redis_url.clone()) {
        (true, Some(url)) => {
            let tier = Arc::new(RemoteTier::new(url, &cache_config));
            if let Err(err) = tier.connect().await {
                warn!(
                    target: "verdura::cache",
                    error = %err,
                    "Distributed cache tier unavailable at startup; continuing local-only"
                );
            }
            Some(tier)
        }
        _ => None,
    };
    let cache = Arc::new(TieredCache::new(&cache_config, remote));

    let soft_delete = SoftDeleteStore::new(db.pool_handle());
    let retention =
        Duration::from_secs(settings.trash.retention_days.get() * 86_400);
    let trash = Arc::new(TrashService::new(soft_delete.clone(), retention));

    let users: Arc<dyn UsersRepo> = db.clone();
    let farmers: Arc<dyn FarmersRepo> = db.clone();
    let products: Arc<dyn ProductsRepo> = db.clone();
    let orders_repo: Arc<dyn OrdersRepo> = db.clone();
    let subscriptions: Arc<dyn SubscriptionsRepo> = db.clone();

    let catalog = Arc::new(ProductCatalogService::new(
        products.clone(),
        soft_delete,
        cache.clone(),
    ));
    let orders = Arc::new(OrderService::new(orders_repo, products));

    let csrf = Arc::new(CsrfGuard::new(
        settings.csrf.secret.as_bytes().to_vec(),
        settings.csrf.token_ttl,
    ));
    let limiter = Arc::new(RateLimiter::new(cache.clone()));
    let policies = Arc::new(PolicySet::from(&settings.rate_limit));

    let api_state = ApiState {
        users,
        farmers,
        subscriptions,
        catalog,
        orders,
        trash: trash.clone(),
        csrf,
        limiter,
        policies,
        db,
        cache,
        started_at: Instant::now(),
    };

    Ok(ApplicationContext { api_state, trash })
}

fn spawn_purge_monitor(
    trash: Arc<TrashService>,
    settings: &config::TrashSettings,
) -> Result<tokio::task::JoinHandle<()>, AppError> {
    let schedule = parse_purge_schedule(&settings.purge_schedule).map_err(|err| {
        AppError::from(InfraError::configuration(format!(
            "invalid purge schedule `{}`: {err}",
            settings.purge_schedule
        )))
    })?;

    let context = PurgeTrashContext { trash };
    let purge_worker = WorkerBuilder::new("purge-trash-worker")
        .data(context)
        .backend(CronStream::new(schedule))
        .build_fn(process_purge_trash_job);

    let monitor = Monitor::new().register(purge_worker);

    Ok(tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    }))
}

async fn serve_http(settings: &config::Settings, api_state: ApiState) -> Result<(), AppError> {
    let router = http::build_api_router(api_state);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target: "verdura::http",
        addr = %settings.server.addr,
        "Verdura API listening"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
    .await
    .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(grace: Duration) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!(target: "verdura::http", "Shutdown signal received; draining connections");

    // In-flight requests get the configured grace window, then the process
    // goes down regardless.
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(target: "verdura::http", "Grace period elapsed; forcing exit");
        process::exit(0);
    });
}
