use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gmdserve::analytics::{AnalyticsAggregator, CountryResolver, IpApiLookup};
use gmdserve::auth::AuthService;
use gmdserve::compiler::{self, MarkdownRenderer};
use gmdserve::config::Config;
use gmdserve::site;

#[derive(Parser)]
#[command(name = "gmdserve")]
#[command(about = "Compile .gmd documents to HTML and serve them with view analytics", long_about = None)]
struct Cli {
    /// JSON config file (defaults to ./config.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Source directory
    #[arg(long, global = true)]
    source: Option<PathBuf>,
    /// Build directory
    #[arg(long, global = true)]
    build_dir: Option<PathBuf>,
    /// Listening port
    #[arg(long, global = true)]
    port: Option<u16>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, serve, and remove the build directory on exit (default)
    Serve,
    /// Compile once and keep the output
    Build,
    /// Remove the build directory
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gmdserve=info,tower_http=warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(source) = cli.source {
        config.site.source_dir = source;
    }
    if let Some(build_dir) = cli.build_dir {
        config.site.build_dir = build_dir;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    info!("Loaded configuration");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Build => {
            compiler::compile(&config.site.source_dir, &config.site.build_dir, &MarkdownRenderer)?;
            Ok(())
        }
        Commands::Clean => {
            compiler::clean(&config.site.source_dir, &config.site.build_dir)?;
            info!("Removed {}", config.site.build_dir.display());
            Ok(())
        }
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    // A failed compile aborts before any listener is bound
    compiler::compile(&config.site.source_dir, &config.site.build_dir, &MarkdownRenderer)
        .context("Compile error")?;

    let result = run_server(&config).await;

    if let Err(e) = compiler::clean(&config.site.source_dir, &config.site.build_dir) {
        error!("Failed to remove build directory: {}", e);
    } else {
        info!("Removed {}", config.site.build_dir.display());
    }

    result
}

async fn run_server(config: &Config) -> Result<()> {
    let lookup = Arc::new(IpApiLookup::from_config(&config.analytics.geoip)?);
    let resolver = Arc::new(CountryResolver::new(lookup));
    let aggregator = Arc::new(AnalyticsAggregator::new(
        resolver,
        config.analytics.view_cooldown(),
        config.analytics.hash_identities,
    ));
    let prune_task = aggregator.start_prune_task(config.analytics.prune_interval());

    if config.analytics.enabled {
        info!(
            "📊 Analytics enabled (cooldown: {}s, geolocation: {})",
            config.analytics.view_cooldown_secs, config.analytics.geoip.endpoint
        );
    } else {
        info!("📊 Analytics recording is disabled");
    }

    let auth_service = Arc::new(AuthService::new(config.dashboard.credentials.clone()));
    if auth_service.is_enabled() {
        info!("🔐 Dashboard protected by basic authentication");
    } else {
        warn!("🔓 Dashboard credentials not set - /analytics is public");
    }

    let router = site::create_site_router(
        &config.site,
        config.analytics.clone(),
        Arc::clone(&aggregator),
        auth_service,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🚀 Serving on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    aggregator.shutdown();
    let _ = prune_task.await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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

    info!("Shutdown signal received");
}
