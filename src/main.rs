//! layercache
//!
//! Runs the multi-level cache engine with its background tasks:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          layercache                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  metrics flush ─▶ snapshots ─▶ alerts                        │
//! │  memory sampler ─▶ recorder                                  │
//! │  warming scheduler ─▶ manager                                │
//! │  optimizer sweep ─▶ recommendations                          │
//! │  /metrics (8080)   /healthz /readyz (8081)                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use layercache::adapters::LoggingEventPublisher;
use layercache::alerts::{AlertEngine, LoggingNotifier, Notifier, WebhookNotifier};
use layercache::backends::{
    EvictionPolicy, LocalBackend, LocalConfig, MemcachedBackend, MemcachedConfig,
};
use layercache::cache::MultiLevelCacheManager;
use layercache::domain::models::BackendType;
use layercache::domain::ports::EventPublisher;
use layercache::error::Error;
use layercache::metrics::{CacheTelemetry, MetricsRecorder};
use layercache::optimizer::{CacheOptimizer, OptimizerTuning};
use layercache::settings::{load_seed, seed_schema, Command, Settings};
use layercache::store::{ConfigStore, InMemoryStore};
use layercache::warming::{StaticWarmingSource, WarmingScheduler};

/// Interval between memory samples
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Interval between warming schedule checks
const WARMING_TICK: Duration = Duration::from_secs(15);

/// Interval between optimizer sweeps
const OPTIMIZE_INTERVAL: Duration = Duration::from_secs(3600);

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();

    if settings.command == Some(Command::Schema) {
        println!("{}", seed_schema()?);
        return Ok(());
    }

    init_logging(&settings)?;

    info!("Starting layercache");
    info!("  Adapter timeout: {} ms", settings.adapter_timeout_ms);
    info!("  Request deadline: {} ms", settings.request_deadline_ms);
    info!(
        "  Metrics buffer: {} observations, flush every {:?}",
        settings.metrics_buffer_size, settings.metrics_flush_interval
    );

    let store = Arc::new(InMemoryStore::new());
    let events: Arc<dyn EventPublisher> = Arc::new(LoggingEventPublisher::new());
    let telemetry = CacheTelemetry::register(Registry::new())?;

    let recorder = MetricsRecorder::build(
        store.clone(),
        settings.recorder_config(),
        Some(telemetry.clone()),
        Some(events.clone()),
    );
    let configs = Arc::new(
        ConfigStore::new(store.clone())
            .with_refresh(settings.config_refresh())
            .with_events(events.clone()),
    );

    let manager = Arc::new(
        build_manager(
            &settings,
            configs.clone(),
            recorder.clone(),
            store.clone(),
            events.clone(),
        )
        .await?,
    );

    // Alerts are evaluated on every persisted snapshot
    let notifier: Arc<dyn Notifier> = match &settings.alert_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.as_str())?),
        None => Arc::new(LoggingNotifier),
    };
    let alerts = Arc::new(
        AlertEngine::new(store.clone(), settings.alert_policy())
            .with_notifier(notifier, settings.recipients())
            .with_events(events.clone()),
    );
    recorder.add_listener(alerts.clone());

    let optimizer = Arc::new(
        CacheOptimizer::new(
            manager.clone(),
            store.clone(),
            store.clone(),
            OptimizerTuning::default(),
        )
        .with_alerts(alerts.clone())
        .with_events(events.clone()),
    );
    let warming = Arc::new(WarmingScheduler::new(
        manager.clone(),
        store.clone(),
        Arc::new(StaticWarmingSource::new()),
    ));

    if let Some(path) = &settings.cache_config_file {
        let seeded = load_seed(path)
            .with_context(|| format!("failed to load cache configurations from {}", path.display()))?;
        for config in seeded {
            let name = config.name.clone();
            match configs.create(config, Some("seed")).await {
                Ok(_) => info!(cache = %name, "Seeded cache configuration"),
                Err(Error::ConfigExists(_)) => debug!(cache = %name, "Seed configuration already present"),
                Err(e) => return Err(e).context(format!("failed to seed cache {}", name)),
            }
        }
    }

    let cancel = CancellationToken::new();
    let ready = Arc::new(AtomicBool::new(false));

    let flush_handle = recorder.spawn_flush_task(cancel.clone());
    let warming_handle = warming.clone().spawn(WARMING_TICK, cancel.clone());
    let sampler_handle = spawn_memory_sampler(manager.clone(), cancel.clone());
    let optimizer_handle = spawn_optimizer_sweep(optimizer, cancel.clone());

    // Start health server
    let health_addr = settings.health_addr.clone();
    let health_ready = ready.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_ready).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = settings.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, telemetry).await {
            error!("Metrics server error: {}", e);
        }
    });

    ready.store(true, Ordering::Release);
    info!("layercache ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    ready.store(false, Ordering::Release);
    cancel.cancel();

    for handle in [flush_handle, warming_handle, sampler_handle, optimizer_handle] {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    info!("layercache shutdown complete");
    Ok(())
}

async fn build_manager(
    settings: &Settings,
    configs: Arc<ConfigStore>,
    recorder: MetricsRecorder,
    store: Arc<InMemoryStore>,
    events: Arc<dyn EventPublisher>,
) -> anyhow::Result<MultiLevelCacheManager> {
    let local = Arc::new(LocalBackend::with_config(LocalConfig {
        capacity_bytes: settings.local_capacity_mb * 1024 * 1024,
        policy: EvictionPolicy::for_kind(settings.local_eviction_policy),
        ..Default::default()
    }));

    let mut builder = MultiLevelCacheManager::builder(configs, local, recorder, store.clone(), store)
        .codec(Arc::new(settings.codec()?))
        .events(events)
        .config(settings.manager_config());

    #[cfg(feature = "redis")]
    {
        use layercache::backends::{RedisBackend, RedisConfig};

        if let Some(url) = &settings.redis_url {
            let config = RedisConfig {
                url: url.clone(),
                ..Default::default()
            };
            match RedisBackend::connect(config).await {
                Ok(backend) => builder = builder.primary(BackendType::Redis, Arc::new(backend)),
                // Redis caches fall back to the local tier
                Err(e) => warn!(error = %e, "Redis unavailable, serving redis caches locally"),
            }
        }
    }

    if let Some(addr) = &settings.memcached_addr {
        info!(addr = %addr, "Memcached backend configured");
        let backend = MemcachedBackend::new(MemcachedConfig {
            addr: addr.clone(),
            ..Default::default()
        });
        builder = builder.primary(BackendType::Memcached, Arc::new(backend));
    }

    Ok(builder.build())
}

// =============================================================================
// Background Tasks
// =============================================================================

fn spawn_memory_sampler(
    manager: Arc<MultiLevelCacheManager>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MEMORY_SAMPLE_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = manager.sample_memory().await {
                        warn!(error = %e, "Memory sampling failed");
                    }
                }
            }
        }
    })
}

fn spawn_optimizer_sweep(
    optimizer: Arc<CacheOptimizer>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(OPTIMIZE_INTERVAL);
        // first tick fires immediately; there is no history yet
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => sweep(&optimizer).await,
            }
        }
    })
}

async fn sweep(optimizer: &CacheOptimizer) {
    let configs = match optimizer.configs().list().await {
        Ok(configs) => configs,
        Err(e) => {
            warn!(error = %e, "Optimizer sweep could not list configurations");
            return;
        }
    };
    for config in configs.iter().filter(|c| c.is_active) {
        match optimizer.optimize_cache_configuration(&config.name).await {
            Ok(proposals) if !proposals.is_empty() => {
                info!(cache = %config.name, proposals = proposals.len(), "Optimizer suggestions available")
            }
            Ok(_) => {}
            Err(e) if e.is_no_data() => debug!(cache = %config.name, "No metrics yet"),
            Err(e) => warn!(cache = %config.name, error = %e, "Optimizer sweep failed"),
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(settings: &Settings) -> anyhow::Result<()> {
    let level = match settings.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("redis=info".parse()?);

    if settings.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// HTTP Servers
// =============================================================================

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

async fn bind(addr: &str, server: &str) -> layercache::Result<TcpListener> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid {} server address: {}", server, e)))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {} server: {}", server, e)))?;
    info!("{} server listening on {}", server, addr);
    Ok(listener)
}

async fn run_health_server(addr: &str, ready: Arc<AtomicBool>) -> layercache::Result<()> {
    let listener = bind(addr, "Health").await?;

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Health server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let ready = ready.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let ready = ready.load(Ordering::Acquire);
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => text(StatusCode::OK, "ok"),
                        "/readyz" if ready => text(StatusCode::OK, "ok"),
                        "/readyz" => text(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
                        _ => text(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Health server connection error: {}", e);
            }
        });
    }
}

async fn run_metrics_server(addr: &str, telemetry: CacheTelemetry) -> layercache::Result<()> {
    let listener = bind(addr, "Metrics").await?;

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Metrics server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let telemetry = telemetry.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = match req.uri().path() {
                    "/metrics" => match telemetry.render() {
                        Ok(body) => {
                            let mut response = Response::new(Full::new(Bytes::from(body)));
                            if let Ok(value) = prometheus::TEXT_FORMAT.parse() {
                                response
                                    .headers_mut()
                                    .insert(hyper::header::CONTENT_TYPE, value);
                            }
                            response
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            text(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                        }
                    },
                    _ => text(StatusCode::NOT_FOUND, "not found"),
                };
                async move { Ok::<_, Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Metrics server connection error: {}", e);
            }
        });
    }
}
