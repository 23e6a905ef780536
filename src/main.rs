use bookshelf::{router, AppState, Config, Db, LibraryError};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), LibraryError> {
	// a missing .env is fine, the process environment still applies
	dotenvy::dotenv().ok();

	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "bookshelf=info,tower_http=info,sqlx=warn".into()))
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config = Config::from_env()?;
	let addr = config.bind_addr()?;
	info!("starting in {:?} mode", config.environment);

	let db = Db::open(&config.database_url, config.max_connections).await?;
	if config.seed {
		db.seed_default_categories().await?;
	}

	let app = router(AppState::new(db.clone(), config));
	let listener = tokio::net::TcpListener::bind(addr).await?;
	info!("listening on http://{addr}");

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	db.close().await;
	info!("database closed, bye");
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			tracing::error!("failed to listen for ctrl-c: {e}");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				tracing::error!("failed to listen for SIGTERM: {e}");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	info!("shutdown requested");
}
