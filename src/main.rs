mod cache;
mod clock;
mod completion;
mod config;
mod contact;
mod error;
mod extract;
mod handlers;
mod metrics;
mod models;
mod rate_limit;
mod routes;
mod sanitize;
mod security;
mod sitemap;
mod state;
#[cfg(test)]
mod test_helpers;

use anyhow::Context;
use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::{FileStore, KvStore, MemoryStore, TtlCache};
use crate::completion::{CompletionClient, CompletionSettings};
use crate::config::{ClearCacheArgs, Cli, Command, ServeArgs, SitemapArgs};
use crate::contact::ContactService;
use crate::rate_limit::{CONTACT_FORM_KEY, RateLimitPolicy, SlidingWindowLimiter};
use crate::security::{CspSources, DEV_ORIGINS, SecurityHeaders, origin_of};
use crate::sitemap::{DEFAULT_STATIC_ROUTES, SitemapConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Sitemap(args) => generate_sitemap(args),
        Command::ClearCache(args) => clear_cache(args),
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let clock = clock::system();

    let limiter = Arc::new(
        SlidingWindowLimiter::new(
            RateLimitPolicy::new(args.rate_limit, Duration::from_secs(args.rate_window)),
            clock.clone(),
        )
        .with_policy(
            CONTACT_FORM_KEY,
            RateLimitPolicy::new(args.form_rate_limit, Duration::from_secs(args.form_rate_window)),
        ),
    );

    let store: Arc<dyn KvStore> = match &args.cache_dir {
        Some(dir) => Arc::new(
            FileStore::open(dir)
                .with_context(|| format!("Failed to open cache dir {}", dir.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    let cache = Arc::new(TtlCache::new(
        store,
        Duration::from_secs(args.cache_ttl),
        clock,
    ));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(args.api_timeout))
        .build()
        .context("Failed to build HTTP client")?;

    let completion = match &args.api_key {
        Some(key) if !key.trim().is_empty() => Some(CompletionClient::new(
            http.clone(),
            CompletionSettings {
                base_url: args.api_base_url.clone(),
                api_key: key.clone(),
                chat_model: args.chat_model.clone(),
                image_size: args.image_size.clone(),
            },
            limiter.clone(),
            cache,
        )),
        _ => {
            tracing::warn!("OPENAI_API_KEY not set, AI endpoints will answer 503");
            None
        }
    };

    // creating shared state
    let state = Arc::new(AppState {
        completion,
        contact: ContactService::new(http, args.contact_forward_url.clone(), limiter.clone()),
        limiter: limiter.clone(),
        trust_proxy: args.trust_proxy,
    });
    if !args.trust_proxy {
        tracing::info!("TRUST_PROXY not set, clients are identified by peer address");
    }

    // idle limiter keys would otherwise stay in memory forever
    let sweep_every = Duration::from_secs(args.rate_sweep_interval.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            let dropped = limiter.sweep();
            if dropped > 0 {
                tracing::debug!(dropped, "Dropped idle rate limit keys");
            }
        }
    });

    let security = Arc::new(
        SecurityHeaders::new(&CspSources {
            dev: args.dev,
            provider_origin: origin_of(&args.api_base_url),
            analytics_endpoint: args.analytics_endpoint.clone(),
            websocket_url: args.websocket_url.clone(),
        })
        .context("Invalid Content-Security-Policy")?,
    );

    let allowed_origins: Vec<String> = if args.allowed_origins.is_empty() && args.dev {
        DEV_ORIGINS.iter().map(|o| o.to_string()).collect()
    } else {
        args.allowed_origins.clone()
    };
    if allowed_origins.is_empty() {
        tracing::warn!("No CORS origins configured, only same-origin requests will work");
    }

    let app = routes::router(state, security, &allowed_origins);

    let addr = args.server_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Gateway running on http://{}", addr);
    tracing::info!("Forwarding completions to {}", args.api_base_url);
    tracing::info!(
        "Cache TTL: {} seconds ({})",
        args.cache_ttl,
        if args.cache_dir.is_some() { "file" } else { "memory" }
    );
    tracing::info!(
        "Rate limit: {} requests per {} seconds, contact form: {} per {} seconds",
        args.rate_limit,
        args.rate_window,
        args.form_rate_limit,
        args.form_rate_window
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;
    Ok(())
}

fn generate_sitemap(args: SitemapArgs) -> anyhow::Result<()> {
    let config = SitemapConfig {
        site_url: args.site_url,
        static_routes: DEFAULT_STATIC_ROUTES.iter().map(|r| r.to_string()).collect(),
        pages_dir: args.pages_dir,
        extension: args.extension,
    };

    sitemap::write_sitemap(&config, &args.out)
        .with_context(|| format!("Error generating sitemap at {}", args.out.display()))
}

fn clear_cache(args: ClearCacheArgs) -> anyhow::Result<()> {
    let store = Arc::new(
        FileStore::open(&args.cache_dir)
            .with_context(|| format!("Failed to open cache dir {}", args.cache_dir.display()))?,
    );
    let cache = TtlCache::new(store, Duration::ZERO, clock::system());

    cache
        .clear(args.key.as_deref())
        .context("Failed to clear cache")?;

    match args.key {
        Some(key) => tracing::info!(key = %key, "Cache entry cleared"),
        None => tracing::info!("Cache cleared"),
    }
    Ok(())
}
