//! Axum-based boundary process: exposes one HTTP surface over the three backend variants.
//! Config-driven via CoreConfig.

mod auth;
mod error;
mod handlers;

use axum::http::{header, Method, Uri};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use switchboard_client::HttpDownstream;
use switchboard_core::{CoreConfig, Dispatcher, Downstream};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) downstream: Arc<dyn Downstream>,
}

impl AppState {
    pub(crate) fn new(config: Arc<CoreConfig>, downstream: Arc<dyn Downstream>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(config.search.clone()));
        Self {
            config,
            dispatcher,
            downstream,
        }
    }
}

fn listen_addr(config: &CoreConfig) -> Result<SocketAddr, String> {
    (config.host.as_str(), config.port)
        .to_socket_addrs()
        .map_err(|e| format!("invalid listen address {}:{}: {}", config.host, config.port, e))?
        .next()
        .ok_or_else(|| format!("listen address {}:{} did not resolve", config.host, config.port))
}

fn check_base_url(base_url: &str) -> Result<(), String> {
    let uri: Uri = base_url
        .parse()
        .map_err(|e| format!("downstream.base_url '{}' is not a URL: {}", base_url, e))?;
    match (uri.scheme_str(), uri.authority()) {
        (Some("http") | Some("https"), Some(_)) => Ok(()),
        _ => Err(format!("downstream.base_url '{}' must be an absolute http(s) URL", base_url)),
    }
}

/// Pre-flight check: config loads, downstream base URL parses, listen port is free.
fn run_verify() -> Result<(), String> {
    print!("Checking config... ");
    let config = CoreConfig::load().map_err(|e| format!("Config load failed: {}", e))?;
    println!("OK ({})", config.app_name);

    print!("Checking downstream base URL... ");
    check_base_url(&config.downstream.base_url)?;
    println!("OK ({})", config.downstream.base_url);

    let addr = listen_addr(&config)?;
    print!("Checking port {}... ", addr.port());
    match std::net::TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            println!("OK (available)");
        }
        Err(e) => return Err(format!("Port {} BLOCKED: {}", addr.port(), e)),
    }

    if !config.auth.enforce {
        println!("WARNING: auth.enforce = false; /api/* accepts unauthenticated calls");
    }
    println!("\nSUCCESS: ready to start gateway.");
    Ok(())
}

pub(crate) fn build_app(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let actions = Router::new()
        .route("/api/search", post(handlers::actions::search))
        .route("/api/passages", post(handlers::actions::passages))
        .route("/api/answer", post(handlers::actions::answer))
        .route("/api/chat", post(handlers::actions::chat))
        .route("/api/suggest", post(handlers::actions::suggest))
        .route("/api/html", post(handlers::actions::html))
        .route_layer(from_fn_with_state(state.clone(), auth::require_bearer));

    let mut app = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/config", get(handlers::public_config))
        .merge(actions)
        .with_state(state);

    if let Some(dir) = static_dir.filter(|d| !d.is_empty()) {
        let root = Path::new(&dir);
        let index = root.join("index.html");
        app = app.fallback_service(ServeDir::new(root).fallback(ServeFile::new(index)));
    }

    app.layer(cors)
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[switchboard-gateway] .env not loaded: {} (using system environment)", e);
    }

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CoreConfig::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("config load failed: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = check_base_url(&config.downstream.base_url) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
    if !config.auth.enforce {
        tracing::warn!(
            target: "switchboard::auth",
            "authentication enforcement is DISABLED (auth.enforce = false); /api/* accepts unauthenticated calls"
        );
    }

    let downstream = match HttpDownstream::new(Arc::clone(&config)) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            tracing::error!("downstream client init failed: {}", e);
            std::process::exit(1);
        }
    };
    let app = build_app(AppState::new(Arc::clone(&config), downstream));

    let addr = match listen_addr(&config) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("bind {} failed: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        downstream = %config.downstream.base_url,
        auth_enforced = config.auth.enforce,
        "{} listening on {}",
        config.app_name,
        addr
    );
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
