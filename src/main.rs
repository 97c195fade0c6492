//! guess-mime server.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http::server ──▶ http::middleware ──▶ dispatch ──▶ static root
//!                                     │                      └──▶ upstream
//!                                     ▼
//!                              filter::FilterChain
//!                         [guess_mime] ──▶ [nosniff] ──▶ client
//! ```

use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use guess_mime::config::{load_config, ConfigWatcher, ServerConfig};
use guess_mime::filter::FilterSettings;
use guess_mime::lifecycle::{signals, Shutdown, WorkerContext};
use guess_mime::observability::{logging, metrics};
use guess_mime::routing::{RouteTable, RouteTarget};
use guess_mime::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "guess-mime", version, about = "Serve files and proxy upstreams with content-type inference")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Print the effective filter settings of every route and exit
    #[arg(long)]
    print_routes: bool,
}

#[derive(Serialize)]
struct RouteSummary<'a> {
    name: &'a str,
    priority: u32,
    target: String,
    settings: &'a FilterSettings,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    if args.check {
        println!("configuration ok");
        return Ok(());
    }

    if args.print_routes {
        print_routes(&config)?;
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!("guess-mime v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        guess_mime = config.filter.guess_mime,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let worker = WorkerContext::start(&config);
    let server = HttpServer::new(config.clone(), &worker)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let _signals = signals::spawn_signal_handler(&shutdown);

    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    drop(worker);
    tracing::info!("Shutdown complete");
    Ok(())
}

fn print_routes(config: &ServerConfig) -> Result<(), serde_json::Error> {
    let table = RouteTable::from_config(config);
    let routes: Vec<RouteSummary<'_>> = table
        .routes()
        .iter()
        .map(|route| RouteSummary {
            name: &route.name,
            priority: route.priority,
            target: match &route.target {
                RouteTarget::Static(root) => format!("root:{}", root.display()),
                RouteTarget::Upstream(upstream) => format!("upstream:{upstream}"),
            },
            settings: &route.settings,
        })
        .collect();

    let defaults = table.defaults();
    let output = serde_json::json!({
        "defaults": &*defaults,
        "routes": routes,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
