//! cdn-tunnel binary entry point.

use std::sync::Arc;

use cdn_tunnel::{api, logging, parse_args, print_help, print_version, AppState, Config, Reaper};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> cdn_tunnel::Result<()> {
    // Parse command-line arguments
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    // Handle help and version flags
    if args.help {
        print_help();
        return Ok(());
    }

    if args.version {
        print_version();
        return Ok(());
    }

    // Load configuration
    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging with configured level
    logging::init(config.log_filter());

    info!("cdn-tunnel v{}", env!("CARGO_PKG_VERSION"));

    // Validate before binding anything
    let resolved = match config.resolve() {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    match &resolved.target {
        cdn_tunnel::BackendTarget::Proxy { host, port } => {
            info!("proxy mode, forwarding sessions to {}:{}", host, port);
        }
        cdn_tunnel::BackendTarget::App { command } => {
            info!("application mode, command: {}", command);
        }
    }
    if resolved.options.allow_direct {
        warn!("direct connections allowed (CDN header check disabled)");
    }

    let state = AppState::new(resolved.target.clone(), resolved.options.clone());

    // The reaper sweeps independently of request handling.
    Reaper::new(
        Arc::clone(&state.table),
        resolved.options.idle_timeout,
        resolved.options.reap_interval,
    )
    .spawn();

    info!(
        "starting server on {}://{}",
        resolved.server.scheme(),
        resolved.server.bind_address()
    );

    api::serve(resolved.server, state).await
}
