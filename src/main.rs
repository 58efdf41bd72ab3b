//! Image Vault - token-scoped image storage over HTTP.
//!
//! This binary starts the HTTP server or checks a storage root offline.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image_vault::{
    config::{CheckConfig, Cli, Command, ServeConfig},
    server::{create_router, RouterConfig},
    service::ImageService,
    store::{audit, repair, AuditReport},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Image Vault v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Storage root: {}", config.storage_root.display());
    info!("  Max upload: {} bytes", config.max_upload_bytes);
    match config.cors_origins {
        Some(ref origins) => info!("  CORS origins: {}", origins.join(", ")),
        None => info!("  CORS origins: any"),
    }

    let service = match ImageService::open(&config.storage_root).await {
        Ok(service) => service,
        Err(e) => {
            error!(
                "Failed to open storage root {}: {}",
                config.storage_root.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };
    info!("  Registered users: {}", service.registry().len().await);

    let router = create_router(service, build_router_config(&config));
    let addr = config.bind_address();

    info!("");
    info!("  Listening on http://{}", addr);
    info!("");
    info!("  Quick start:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/imageapi/generate-token/<username>/", addr);
    info!(
        "    curl -F file=@cat.png http://{}/imageapi/token/<token>/upload-image/",
        addr
    );
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %addr, error = %e, "Could not bind listener");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server exited with an error");
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Resolve once Ctrl-C is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Install the global `tracing` subscriber.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "image_vault=debug,tower_http=debug"
    } else {
        "image_vault=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_max_upload_bytes(config.max_upload_bytes)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let root = &config.storage_root;

    println!("Image Vault Storage Check");
    println!("═════════════════════════");
    println!();
    println!("Storage root: {}", root.display());
    println!();

    if !root.is_dir() {
        println!("✗ Storage root does not exist or is not a directory");
        return ExitCode::FAILURE;
    }

    let report = match audit(root).await {
        Ok(report) => report,
        Err(e) => {
            println!("✗ Audit failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    print_report(&report);

    if report.is_clean() {
        println!();
        println!("═════════════════════════");
        println!("✓ No problems found");
        return ExitCode::SUCCESS;
    }

    if !config.repair {
        println!();
        println!("Run again with --repair to fix what can be fixed safely.");
        return ExitCode::FAILURE;
    }

    println!();
    match repair(root, &report).await {
        Ok(summary) => {
            println!("Repairs:");
            println!("  Namespaces recreated: {}", summary.namespaces_created);
            println!("  Orphan blobs removed: {}", summary.orphan_blobs_removed);
            println!("  Temp files removed:   {}", summary.temp_files_removed);
        }
        Err(e) => {
            println!("✗ Repair failed: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let remaining = report.unrepairable_count();
    println!();
    println!("═════════════════════════");
    if remaining == 0 {
        println!("✓ All problems repaired");
        ExitCode::SUCCESS
    } else {
        println!("✗ {} problem(s) need manual review", remaining);
        ExitCode::FAILURE
    }
}

fn print_report(report: &AuditReport) {
    println!(
        "Checked {} namespace(s), {} image(s)",
        report.namespaces_checked, report.images_checked
    );

    for token in &report.missing_namespaces {
        println!("  ✗ Missing namespace directory for a registered token: {}", token);
    }
    for dir in &report.unregistered_dirs {
        println!("  ✗ Directory without a registered token: {}", dir.display());
    }
    for entry in &report.dangling_entries {
        println!(
            "  ✗ Catalog entry {} ({}) has no blob",
            entry.image_id, entry.filename
        );
    }
    for path in &report.orphan_blobs {
        println!("  ✗ Blob without a catalog entry: {}", path.display());
    }
    for path in &report.stale_temp_files {
        println!("  ✗ Stale temporary file: {}", path.display());
    }
}
