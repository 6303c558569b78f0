use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use pipeline_api::{create_app, AppState};
use pipeline_core::{AppConfig, RandomUuidGenerator, SystemClock};
use pipeline_domain::ports::Authenticator;
use pipeline_domain::{ScheduledWorkflow, Workflow};
use pipeline_infrastructure::{
    ClusterClient, DatabaseManager, FileObjectStore, KubeAuthorizationClient,
    KubeCustomResourceClient, KubePodClient, KubeResourceClient, MetricsGcObserver,
    PodLogArchive, PostgresExperimentRepository, PostgresJobRepository,
    PostgresPipelineRepository, PostgresReferenceRepository, PostgresRunRepository,
    ResourceKind,
};
use pipeline_manager::{ClientManager, HeaderAuthenticator, ResourceManager, Stores};
use tokio::net::TcpListener;
use tracing::info;

/// The assembled server: database, cluster clients and the resource
/// manager in front of them.
pub struct Application {
    config: AppConfig,
    manager: Arc<ResourceManager>,
}

impl Application {
    pub async fn new(config: AppConfig, run_migrations: bool) -> Result<Self> {
        let database = DatabaseManager::new(&config.database)
            .await
            .context("Failed to connect to the database")?;
        if run_migrations {
            database
                .migrate()
                .await
                .context("Failed to run database migrations")?;
        }

        let pool = database.pool().clone();
        let experiments = Arc::new(PostgresExperimentRepository::new(pool.clone()));
        let stores = Stores {
            experiments: experiments.clone(),
            default_experiment: experiments,
            pipelines: Arc::new(PostgresPipelineRepository::new(pool.clone())),
            jobs: Arc::new(PostgresJobRepository::new(pool.clone())),
            runs: Arc::new(PostgresRunRepository::new(pool.clone())),
            references: Arc::new(PostgresReferenceRepository::new(pool)),
        };

        let cluster = ClusterClient::new(&config.cluster)
            .context("Failed to create the cluster API client")?;
        let authenticators: Vec<Arc<dyn Authenticator>> = vec![Arc::new(HeaderAuthenticator::new(
            config.api.user_id_header.clone(),
            config.api.user_id_prefix.clone(),
        ))];
        let clients = ClientManager {
            workflows: Arc::new(KubeResourceClient::<Workflow>::new(
                cluster.clone(),
                ResourceKind::WORKFLOWS,
            )),
            scheduled_workflows: Arc::new(KubeResourceClient::<ScheduledWorkflow>::new(
                cluster.clone(),
                ResourceKind::SCHEDULED_WORKFLOWS,
            )),
            pods: Arc::new(KubePodClient::new(cluster.clone())),
            custom_resources: Arc::new(KubeCustomResourceClient::new(cluster.clone())),
            object_store: Arc::new(FileObjectStore::new(&config.object_store)),
            log_archive: Arc::new(PodLogArchive::new()),
            authorizer: Arc::new(KubeAuthorizationClient::new(cluster)),
            authenticators,
            gc_observer: Arc::new(MetricsGcObserver),
            clock: Arc::new(SystemClock),
            uuid: Arc::new(RandomUuidGenerator),
        };

        let manager = ResourceManager::new(
            stores,
            clients,
            config.manager.options(),
            config.cluster.pod_namespace.clone(),
        );
        let default_experiment = manager
            .create_default_experiment()
            .await
            .context("Failed to initialize the default experiment")?;
        info!(experiment_id = %default_experiment, "Default experiment ready");

        Ok(Self {
            config,
            manager: Arc::new(manager),
        })
    }

    /// Serves the HTTP API until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = AppState::new(self.manager, self.config.api.auth_enabled);
        let app = create_app(state, &self.config.api);

        let bind_address = &self.config.api.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("Failed to bind {bind_address}"))?;
        info!(address = %bind_address, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("API server failed")?;
        info!("API server stopped");
        Ok(())
    }
}

/// Applies the schema migrations and exits.
pub async fn migrate(config: &AppConfig) -> Result<()> {
    let database = DatabaseManager::new(&config.database)
        .await
        .context("Failed to connect to the database")?;
    database
        .migrate()
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations applied");
    Ok(())
}
