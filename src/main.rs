//! otpgate service entrypoint: wiring and graceful shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use otpgate::api::{self, AppState};
use otpgate::config::GateConfig;
use otpgate::delivery::queue::{self, UiDeliveryPipeline};
use otpgate::delivery::resolver::{ResolverTiming, TargetResolver};
use otpgate::delivery::submitter::{MessageSubmitter, SubmitterTiming};
use otpgate::driver::wait::BoundedWait;
use otpgate::driver::webdriver::WebDriverSessionFactory;
use otpgate::scheduler::Dispatcher;
use otpgate::service::Relay;
use otpgate::session::{SessionManager, SessionTiming};
use otpgate::store::Store;

#[derive(Parser)]
#[command(name = "otpgate", version, about = "WhatsApp Web OTP delivery service")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the service (default).
    Start,
    /// Print the effective configuration and exit.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        // Safety: no other thread is running yet.
        std::env::set_var("OTPGATE_CONFIG_PATH", path);
    }

    match cli.command.unwrap_or(Command::Start) {
        Command::Start => run().await,
        Command::Config => {
            otpgate::logging::init_cli();
            let config = GateConfig::load().context("failed to load configuration")?;
            println!("{config:#?}");
            Ok(())
        }
    }
}

async fn run() -> Result<()> {
    let config = GateConfig::load().context("failed to load configuration")?;
    let _logging_guard = otpgate::logging::init_production(Path::new(&config.paths.logs_dir))
        .context("failed to initialise logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "otpgate starting");

    let store = Arc::new(
        Store::open(Path::new(&config.paths.database))
            .await
            .context("failed to open store")?,
    );

    let session = Arc::new(SessionManager::new(
        Arc::new(WebDriverSessionFactory::new(
            config.session.webdriver_settings(),
        )),
        SessionTiming {
            auth_wait: BoundedWait::seconds(config.session.auth_timeout_secs),
            page_settle: BoundedWait::seconds(config.session.page_settle_secs),
        },
    ));

    let pipeline = Arc::new(UiDeliveryPipeline::new(
        TargetResolver::new(ResolverTiming::default()),
        MessageSubmitter::new(SubmitterTiming::default()),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (delivery_queue, worker) = queue::channel(
        config.delivery.queue_settings(),
        Arc::clone(&session),
        pipeline,
        Some(Arc::clone(&store)),
        shutdown_rx.clone(),
    );
    let worker_handle = worker.spawn();

    let dispatcher = Dispatcher::new(
        Arc::clone(&store),
        delivery_queue.clone(),
        Duration::from_secs(config.scheduler.tick_secs.max(1)),
        shutdown_rx.clone(),
    );
    let dispatcher_handle = dispatcher.spawn();

    let relay = Relay::new(delivery_queue, Arc::clone(&session));
    let router = api::build_router(AppState {
        relay,
        store: Arc::clone(&store),
    });

    let listener = tokio::net::TcpListener::bind(&config.api.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.api.bind_addr))?;
    info!(addr = %config.api.bind_addr, "HTTP API listening");

    let mut serve_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = serve_shutdown.changed().await;
        });
        if let Err(e) = server.await {
            error!(error = %e, "HTTP server error");
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    // Stop accepting work, let the worker finish its bounded attempt, then
    // release the browser.
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(30), worker_handle)
        .await
        .is_err()
    {
        warn!("delivery worker did not stop within 30s, abandoning");
    }
    let _ = dispatcher_handle.await;
    let _ = server_handle.await;
    session.stop().await;

    info!("otpgate stopped");
    Ok(())
}
