use std::{process, sync::Arc};

use magicbox::{
    application::{
        HitMissCounters, InvalidationService, RetrievalService, error::AppError,
        ports::{CacheStore, ObjectStore},
    },
    cache::{CacheConfig, MemoryCacheStore},
    config,
    infra::{
        error::InfraError,
        http::{self, AdminState, PublicState},
        s3::S3ObjectStore,
        telemetry,
    },
};
use tokio::{net::TcpListener, task::JoinHandle, try_join};
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckConfig => {
            info!(
                target = "magicbox::config",
                public_addr = %settings.server.public_addr,
                admin_enabled = settings.admin.enabled,
                admin_addr = %settings.admin.addr,
                bucket = %settings.s3.bucket_name,
                "Configuration is valid"
            );
            Ok(())
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_store = Arc::new(MemoryCacheStore::new(CacheConfig::from(&settings.cache)));
    let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::from_settings(&settings.s3));
    let cache: Arc<dyn CacheStore> = cache_store.clone();
    let stats = Arc::new(HitMissCounters::new());

    let public_state = PublicState {
        retrieval: RetrievalService::new(cache.clone(), objects, stats.clone()),
    };
    let admin_state = AdminState {
        stats,
        invalidation: InvalidationService::new(cache),
        token: settings.admin.token.clone(),
    };

    let sweeper = spawn_expiry_sweeper(cache_store);
    let result = serve_http(&settings, public_state, admin_state).await;

    sweeper.abort();
    let _ = sweeper.await;

    result
}

fn spawn_expiry_sweeper(store: Arc<MemoryCacheStore>) -> JoinHandle<()> {
    let period = store.config().clean_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            let removed = store.purge_expired();
            debug!(
                target = "magicbox::cache",
                removed,
                entries = store.len(),
                used_bytes = store.used_bytes(),
                "Swept expired cache entries"
            );
        }
    })
}

async fn serve_http(
    settings: &config::Settings,
    public_state: PublicState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = http::build_router(public_state);
    let public_listener = TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "magicbox::http",
        address = %settings.server.public_addr,
        "HTTP server alive"
    );
    let public_server = async {
        axum::serve(public_listener, public_router.into_make_service())
            .await
            .map_err(|err| AppError::from(InfraError::server(format!("public listener: {err}"))))
    };

    if !settings.admin.enabled {
        return public_server.await;
    }

    if admin_state.token.is_none() {
        warn!(
            target = "magicbox::http",
            "Admin HTTP server enabled without an admin token set"
        );
    }

    let admin_router = http::build_admin_router(admin_state);
    let admin_listener = TcpListener::bind(settings.admin.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "magicbox::http",
        address = %settings.admin.addr,
        "Admin HTTP server alive"
    );
    let admin_server = async {
        axum::serve(admin_listener, admin_router.into_make_service())
            .await
            .map_err(|err| AppError::from(InfraError::server(format!("admin listener: {err}"))))
    };

    try_join!(public_server, admin_server)?;
    Ok(())
}
