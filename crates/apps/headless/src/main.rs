use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use expansion::CoverageExpansionEngine;
use interpreter::{ResolverConfig, ResponseInterpreter, TileSourceResolver};
use render::{NoopSigner, ProviderChain, UrlSigner};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod backend;
mod surface;

use app::App;
use backend::{
    HttpAnalysisClient, HttpChatBackend, HttpSearchClient, HttpTileIndexFetcher, HttpUrlSigner,
};
use surface::{LoggingSurface, SharedView, ViewState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let chat_url =
        env::var("SKYLENS_CHAT_URL").unwrap_or_else(|_| "http://127.0.0.1:9400/query".to_string());
    let search_url = env::var("SKYLENS_SEARCH_URL")
        .unwrap_or_else(|_| "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string());
    let analysis_url = env::var("SKYLENS_ANALYSIS_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:9400/analyze".to_string());
    let tile_api_base = env::var("SKYLENS_TILE_API")
        .unwrap_or_else(|_| ResolverConfig::default().tile_api_base);
    let sign_url = env::var("SKYLENS_SIGN_URL").ok();
    let tick_secs = env_var_u64("SKYLENS_TICK_SECS", 1);

    let http = reqwest::Client::new();

    let resolver = TileSourceResolver::new(ResolverConfig {
        tile_api_base: tile_api_base.clone(),
    });
    let interpreter = ResponseInterpreter::new(resolver);
    let expansion = CoverageExpansionEngine::new(TileSourceResolver::new(ResolverConfig {
        tile_api_base,
    }));

    let view: SharedView = Arc::new(Mutex::new(ViewState::default()));
    let mut chain = ProviderChain::new();
    let (provider, surface) = {
        let view = Arc::clone(&view);
        chain.initialize(move |_| Ok(Box::new(LoggingSurface::new(Arc::clone(&view)))))
    };
    info!("map surface up on {provider:?} provider");

    let signer: Arc<dyn UrlSigner> = match sign_url {
        Some(url) => Arc::new(HttpUrlSigner::new(http.clone(), url)),
        None => Arc::new(NoopSigner),
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut app = App::new(
        interpreter,
        expansion,
        Arc::from(surface),
        view,
        signer,
        HttpTileIndexFetcher::new(http.clone()),
        HttpSearchClient::new(http.clone(), search_url),
        Arc::new(HttpAnalysisClient::new(http.clone(), analysis_url)),
        HttpChatBackend::new(http, chat_url),
        events_tx,
    );

    println!("skylens headless explorer");
    println!("type a query, or /module /pin /pan /zoom /state /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_secs(tick_secs.max(1)));
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !app.handle_line(&line).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    error!("stdin read failed: {err}");
                    break;
                }
            },
            Some(event) = events_rx.recv() => app.analysis_finished(event),
            _ = ticker.tick() => app.tick(),
        }
    }
    info!("session over");
}

fn env_var_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
