//! Beacon entry point
//!
//! Flat composition root: load config, connect the stores, build every
//! adapter and service once, register the worker pools, start the
//! scheduler and the HTTP server, and drain everything on SIGINT/SIGTERM.
//! No registry and no service locator; every dependency is an explicit
//! `Arc` handed down from here.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use beacon_application::{
    AggregationEngine, DiagnosisService, EmailWorker, IngestionService, ProcessingWorker,
    ResolveWorker, RetentionService,
};
use beacon_domain::ports::{
    AggregationRepository, AlertMailer, ArchiveStore, ErrorAnalyzer, ErrorLogRepository,
    JobHandler, LogStore, ProjectRepository, QueueFabric, QueueName, SourceCodeRepository,
    SourcemapResolver,
};
use beacon_infrastructure::adapters::analyzer::HttpErrorAnalyzer;
use beacon_infrastructure::adapters::archive::ArchiveStoreService;
use beacon_infrastructure::adapters::clickhouse_store::ClickhouseLogStore;
use beacon_infrastructure::adapters::mailer::LogAlertMailer;
use beacon_infrastructure::adapters::mysql::{
    self, MysqlAggregationRepository, MysqlErrorLogRepository, MysqlProjectRepository,
    MysqlSourceCodeRepository,
};
use beacon_infrastructure::adapters::queue::{
    MemoryQueueBackend, QueueBackend, QueueService, RedisQueueBackend, WorkerPool,
};
use beacon_infrastructure::adapters::sourcemap::SourcemapResolverService;
use beacon_infrastructure::scheduler::spawn_maintenance;
use beacon_infrastructure::{AppConfig, init_logging};
use beacon_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(None).context("configuration load failed")?;
    init_logging(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "beacon starting");

    // stores
    let pool = mysql::connect(&config.mysql).await.context("mysql")?;
    mysql::run_migrations(&pool).await.context("mysql migrations")?;
    let error_logs: Arc<dyn ErrorLogRepository> =
        Arc::new(MysqlErrorLogRepository::new(pool.clone()));
    let aggregations: Arc<dyn AggregationRepository> =
        Arc::new(MysqlAggregationRepository::new(pool.clone()));
    let source_code: Arc<dyn SourceCodeRepository> =
        Arc::new(MysqlSourceCodeRepository::new(pool.clone()));
    let projects: Arc<dyn ProjectRepository> = Arc::new(MysqlProjectRepository::new(pool));
    let log_store: Arc<dyn LogStore> = Arc::new(
        ClickhouseLogStore::connect(&config.clickhouse)
            .await
            .context("clickhouse")?,
    );

    // queue fabric
    let backend: Arc<dyn QueueBackend> = if config.queue.in_memory {
        info!("queue fabric using the in-memory backend");
        Arc::new(MemoryQueueBackend::new())
    } else {
        Arc::new(
            RedisQueueBackend::connect(&config.redis.url)
                .await
                .context("redis")?,
        )
    };
    let queues: Arc<dyn QueueFabric> = Arc::new(QueueService::new(Arc::clone(&backend)));

    // resolver, archive, analyzer, mailer
    let resolver: Arc<dyn SourcemapResolver> = Arc::new(SourcemapResolverService::new(
        config.storage.sourcemap_root(),
    ));
    let archive: Arc<dyn ArchiveStore> = Arc::new(ArchiveStoreService::new(
        Arc::clone(&source_code),
        config.storage.source_code_root(),
    ));
    let analyzer: Arc<dyn ErrorAnalyzer> =
        Arc::new(HttpErrorAnalyzer::new(config.ai.clone()).context("analyzer")?);
    let mailer: Arc<dyn AlertMailer> = Arc::new(LogAlertMailer::new());

    // application services
    let ingestion = Arc::new(IngestionService::new(
        Arc::clone(&error_logs),
        Arc::clone(&log_store),
        Arc::clone(&queues),
        Arc::clone(&projects),
    ));
    let aggregation_engine = Arc::new(AggregationEngine::new(
        Arc::clone(&error_logs),
        Arc::clone(&aggregations),
        Arc::clone(&projects),
        Arc::clone(&queues),
    ));
    let resolve_worker = Arc::new(ResolveWorker::new(
        Arc::clone(&error_logs),
        Arc::clone(&resolver),
        Arc::clone(&source_code),
    ));
    let diagnosis = Arc::new(DiagnosisService::new(
        Arc::clone(&aggregations),
        Arc::clone(&error_logs),
        Arc::clone(&archive),
        Arc::clone(&resolver),
        Arc::clone(&source_code),
        Arc::clone(&analyzer),
    ));
    let processing_worker = Arc::new(ProcessingWorker::new(
        Arc::clone(&error_logs),
        Arc::clone(&aggregations),
        Arc::clone(&queues),
        Arc::clone(&analyzer),
    ));
    let email_worker = Arc::new(EmailWorker::new(mailer));
    let retention = Arc::new(RetentionService::new(
        config.storage.sourcemap_root(),
        Duration::from_secs(config.storage.sourcemap_ttl_secs),
        Arc::clone(&log_store),
    ));

    // worker pools, one per queue
    let shutdown = CancellationToken::new();
    let poll = Duration::from_millis(config.queue.poll_interval_ms);
    let concurrency = config.queue.concurrency;
    let pools = vec![
        WorkerPool::spawn(
            Arc::clone(&backend),
            QueueName::ErrorProcessing,
            processing_worker,
            concurrency,
            poll,
            shutdown.clone(),
        ),
        WorkerPool::spawn(
            Arc::clone(&backend),
            QueueName::ErrorAggregation,
            aggregation_engine,
            concurrency,
            poll,
            shutdown.clone(),
        ),
        WorkerPool::spawn(
            Arc::clone(&backend),
            QueueName::SourcemapProcessing,
            resolve_worker,
            concurrency,
            poll,
            shutdown.clone(),
        ),
        WorkerPool::spawn(
            Arc::clone(&backend),
            QueueName::AiDiagnosis,
            Arc::clone(&diagnosis) as Arc<dyn JobHandler>,
            concurrency,
            poll,
            shutdown.clone(),
        ),
        WorkerPool::spawn(
            Arc::clone(&backend),
            QueueName::EmailNotification,
            email_worker,
            concurrency,
            poll,
            shutdown.clone(),
        ),
    ];

    // background maintenance
    let maintenance = spawn_maintenance(Arc::clone(&retention), shutdown.clone());

    // HTTP surface
    let state = AppState {
        ingestion,
        diagnosis,
        retention,
        error_logs,
        aggregations,
        log_store,
        queues,
        archive,
        source_code,
        resolver,
        projects,
        auth_token: config.server.auth_token.as_deref().map(Arc::from),
    };
    let app = beacon_server::router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(addr = %addr, "http server listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                () = sigterm() => {},
                () = server_shutdown.cancelled() => {},
            }
        })
        .await
        .context("http server")?;

    // drain: stop claiming, finish in-flight jobs, stop the scheduler
    info!("shutting down, draining workers");
    shutdown.cancel();
    for pool in pools {
        pool.join().await;
    }
    for task in maintenance {
        if let Err(e) = task.await {
            warn!(error = %e, "maintenance task join failed");
        }
    }
    info!("beacon stopped");
    Ok(())
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
