use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

// CLI argument structure, every option can also come from the environment (.env is loaded first)
#[derive(Parser, Debug, Clone)]
#[command(name = "zettai-gateway")]
#[command(about = "Rate limited, caching gateway between the ZettAI site and its completion provider")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP gateway
    Serve(ServeArgs),
    /// Generate sitemap.xml from the static routes and the page sources
    Sitemap(SitemapArgs),
    /// Drop cached completions from a file-backed cache
    ClearCache(ClearCacheArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Completion provider key, completion routes answer 503 without it
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    // Completion provider base url
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub api_base_url: String,

    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-3.5-turbo")]
    pub chat_model: String,

    #[arg(long, env = "IMAGE_SIZE", default_value = "1024x1024")]
    pub image_size: String,

    // Upstream timeout in milliseconds
    #[arg(long, env = "API_TIMEOUT", default_value_t = 15_000)]
    pub api_timeout: u64,

    // Cache TTL in seconds
    #[arg(short, long, env = "CACHE_TTL", default_value_t = 300)]
    pub cache_ttl: u64,

    // Directory for the file-backed cache, in memory when absent
    #[arg(long, env = "CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = 100)]
    pub rate_limit: usize,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 900)]
    pub rate_window: u64,

    // Contact form submissions per window
    #[arg(long, env = "MAX_FORM_SUBMISSIONS", default_value_t = 5)]
    pub form_rate_limit: usize,

    // Contact form window in seconds
    #[arg(long, env = "FORM_WINDOW_SECS", default_value_t = 900)]
    pub form_rate_window: u64,

    // Where accepted contact messages are POSTed, logged only when absent
    #[arg(long, env = "CONTACT_FORWARD_URL")]
    pub contact_forward_url: Option<String>,

    // Comma-separated CORS origins
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    #[arg(long, env = "ANALYTICS_ENDPOINT")]
    pub analytics_endpoint: Option<String>,

    #[arg(long, env = "WEBSOCKET_URL")]
    pub websocket_url: Option<String>,

    // Only set behind a reverse proxy that overwrites X-Forwarded-For / X-Real-IP
    #[arg(long, env = "TRUST_PROXY", default_value_t = false)]
    pub trust_proxy: bool,

    // How often idle limiter keys are dropped, in seconds
    #[arg(long, env = "RATE_LIMIT_SWEEP_SECS", default_value_t = 60)]
    pub rate_sweep_interval: u64,

    // Development mode relaxes CSP and allows the local dev servers
    #[arg(long, env = "DEV_MODE", default_value_t = false)]
    pub dev: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SitemapArgs {
    #[arg(long, env = "SITE_URL", default_value = "https://zettai.com")]
    pub site_url: String,

    // Front-end page sources to discover routes from
    #[arg(long, default_value = "src/pages")]
    pub pages_dir: PathBuf,

    // Page file extension
    #[arg(long, default_value = "tsx")]
    pub extension: String,

    #[arg(short, long, default_value = "public/sitemap.xml")]
    pub out: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ClearCacheArgs {
    #[arg(long, env = "CACHE_DIR")]
    pub cache_dir: PathBuf,

    // Single entry to drop, everything when absent
    #[arg(long)]
    pub key: Option<String>,
}

impl ServeArgs {
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
