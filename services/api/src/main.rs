use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use api::{
    AppState, create_router,
    error::set_production_mode,
    middleware::JwtConfig,
    repositories::{PgStore, credentials::RedisCredentialStore},
    scheduler::start_sweeps,
};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
    error::DatabaseError,
    settings::{CredentialBackend, ServiceSettings, StorageBackend},
};
use tutoring::{
    TutoringService,
    clock::{Clock, SystemClock},
    credentials::{CredentialStore, InMemoryCredentialStore},
    events::{
        BadgeChecker, ChannelOutbox, LogNotificationDispatcher, NotificationDispatcher,
        RetryPolicy, SideEffectWorker,
    },
    memory::InMemoryStore,
    repository::Repositories,
    settlement::SettlementPolicy,
};

struct Storage {
    repos: Repositories,
    notifier: Arc<dyn NotificationDispatcher>,
    badges: Arc<dyn BadgeChecker>,
    pool: Option<PgPool>,
}

async fn init_storage(backend: StorageBackend) -> Result<Storage> {
    match backend {
        StorageBackend::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            // Check database connectivity
            if health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            info!("Database migrations applied");

            let store = Arc::new(PgStore::new(pool.clone()));
            let notifier: Arc<dyn NotificationDispatcher> = store.clone();
            let badges: Arc<dyn BadgeChecker> = store.clone();
            Ok(Storage {
                repos: Repositories::from_store(store),
                notifier,
                badges,
                pool: Some(pool),
            })
        }
        StorageBackend::Memory => {
            warn!("Using the in-memory store, all data is lost on restart");
            let store = Arc::new(InMemoryStore::new());
            let badges: Arc<dyn BadgeChecker> = store.clone();
            Ok(Storage {
                repos: Repositories::from_store(store),
                notifier: Arc::new(LogNotificationDispatcher),
                badges,
                pool: None,
            })
        }
    }
}

async fn init_credentials(backend: CredentialBackend) -> Result<Arc<dyn CredentialStore>> {
    match backend {
        CredentialBackend::Memory => {
            warn!("Check-in credentials are held in process memory, run a single API instance");
            Ok(Arc::new(InMemoryCredentialStore::new()))
        }
        CredentialBackend::Redis => {
            let redis = RedisPool::connect(&RedisConfig::from_env()?).await?;
            if !redis.health_check().await? {
                anyhow::bail!("Failed to connect to Redis");
            }
            Ok(Arc::new(RedisCredentialStore::new(redis)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting API service");

    let settings = ServiceSettings::from_env()?;
    set_production_mode(settings.production);
    let jwt = JwtConfig::from_env()?;

    let storage = init_storage(settings.storage_backend).await?;
    let credentials = init_credentials(settings.credential_backend).await?;

    let (outbox, receiver) = ChannelOutbox::new();
    SideEffectWorker::new(storage.notifier, storage.badges, RetryPolicy::default())
        .spawn(receiver);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let policy = SettlementPolicy {
        platform_commission: settings.platform_commission,
        ..SettlementPolicy::default()
    };
    let service = TutoringService::new(
        storage.repos,
        credentials,
        Arc::new(outbox),
        clock.clone(),
        policy,
    );

    // Keep the scheduler alive for the lifetime of the server
    let _scheduler = start_sweeps(
        service.sweep().clone(),
        &settings.attendance_sweep_schedule,
        &settings.credential_gc_schedule,
    )
    .await?;

    let app_state = AppState {
        service,
        jwt: Arc::new(jwt),
        clock,
        db_pool: storage.pool,
    };

    info!("API service initialized successfully");

    // Start the web server
    let app = create_router(app_state);

    let listener = TcpListener::bind(&settings.bind_address).await?;
    info!("API service listening on {}", settings.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
