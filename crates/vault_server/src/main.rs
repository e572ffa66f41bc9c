#![forbid(unsafe_code)]

mod config;
mod health;
mod ingest;
mod parse_worker;

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vault_distribution::Sinks;
use vault_events::EventBus;
use vault_media::{MediaProcessor, MediaProcessorConfig};
use vault_platform::AdapterRegistry;
use vault_storage::LocalStorageBackend;
use vault_store::VaultPool;

use crate::health::{HealthState, spawn_health_server};

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,vault_server=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint.clone()).build() {
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_batch_exporter(exporter).build();
				let tracer = tracer_provider.tracer("vault_server");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr).install() {
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)"),
	}
}

async fn shutdown_signal(token: CancellationToken) {
	let ctrl_c = async {
		let _ = tokio::signal::ctrl_c().await;
	};

	#[cfg(unix)]
	let terminate = async {
		let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).expect("install SIGTERM handler");
		sigterm.recv().await;
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => info!("received SIGINT, shutting down"),
		_ = terminate => info!("received SIGTERM, shutting down"),
	}
	token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let cfg = config::load_config()?;
	info!(database_url = %cfg.database_url, "loaded config (toml + env overrides)");

	init_metrics(cfg.metrics_bind.as_deref());

	let health_state = HealthState::new();
	if let Some(bind) = cfg.health_bind.as_deref() {
		match bind.parse::<std::net::SocketAddr>() {
			Ok(addr) => {
				spawn_health_server(addr, health_state.clone());
				info!(%addr, "health server listening");
			}
			Err(e) => warn!(error = %e, %bind, "invalid health bind address (expected host:port)"),
		}
	}

	let pool = VaultPool::connect(&cfg.database_url).await?;
	info!("database connected and migrations applied");

	let storage = Arc::new(LocalStorageBackend::new(cfg.storage_root.clone(), cfg.storage_public_base_url.clone()));
	let bus = EventBus::new(pool.clone());

	let media_config = MediaProcessorConfig {
		quality: cfg.media_quality,
		..MediaProcessorConfig::default()
	};
	let media = MediaProcessor::new(storage.clone(), media_config);

	let mut sinks = Sinks::new();
	if let Some(token) = cfg.telegram_bot_token.as_ref() {
		let client = reqwest::Client::new();
		sinks = sinks.with_sink(
			vault_domain::PlatformType::Telegram,
			Arc::new(vault_distribution::TelegramSink::new(client, token.expose().to_string())),
		);
	}
	if let (Some(endpoint), Some(token)) = (cfg.qq_onebot_endpoint.as_ref(), cfg.qq_onebot_token.as_ref()) {
		let client = reqwest::Client::new();
		sinks = sinks.with_sink(
			vault_domain::PlatformType::Qq,
			Arc::new(vault_distribution::QqSink::new(client, endpoint.clone(), token.expose().to_string())),
		);
	}
	let sinks = Arc::new(sinks);

	let shutdown = CancellationToken::new();
	tokio::spawn(shutdown_signal(shutdown.clone()));

	let mut tasks = JoinSet::new();

	tasks.spawn({
		let pool = pool.clone();
		let registry = AdapterRegistry::with_builtin_adapters();
		let bus = bus.clone();
		let storage_namespace = cfg.storage_namespace.clone();
		let shutdown = shutdown.clone();
		async move {
			parse_worker::run(pool, registry, bus, media, storage_namespace, "parse-worker-0".to_string(), shutdown).await;
		}
	});

	for handle in vault_distribution::spawn_pool(pool.clone(), bus.clone(), sinks.clone(), cfg.distribution_workers, shutdown.clone()) {
		tasks.spawn(async move {
			if let Err(err) = handle.await {
				warn!(error = %err, "distribution worker task panicked");
			}
		});
	}

	tasks.spawn({
		let bus = bus.clone();
		let shutdown = shutdown.clone();
		async move {
			vault_events::outbox::run(bus, shutdown).await;
		}
	});

	health_state.mark_ready();
	info!("vault_server: ready");

	while let Some(result) = tasks.join_next().await {
		if let Err(err) = result {
			warn!(error = %err, "worker task panicked");
		}
		if shutdown.is_cancelled() {
			break;
		}
	}

	info!("vault_server: all workers exited, shutting down");
	Ok(())
}
