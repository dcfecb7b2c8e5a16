use anyhow::{Context, Result};
use clap::Parser;
use url::Url;

/// Resume Gateway - session cookie proxy for the resume API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "3000")]
    pub port: u16,

    /// Base URL of the upstream resume API
    #[arg(long, env = "NEXT_PUBLIC_API_ENDPOINT")]
    pub api_endpoint: Option<String>,

    /// Public origin of this application
    #[arg(long, env = "NEXT_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Secret used to verify access and refresh tokens
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Upstream request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Endpoints
    pub api_endpoint: Url,
    pub public_url: Url,

    // Token verification
    pub secret_key: String,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > .env
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Self::from_args(args)
    }

    /// Build configuration from parsed arguments
    ///
    /// The three endpoint/secret values are required; a missing one is fatal.
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let api_endpoint = args
            .api_endpoint
            .context("NEXT_PUBLIC_API_ENDPOINT is required (use --api-endpoint or set the env var)")?;
        let public_url = args
            .public_url
            .context("NEXT_PUBLIC_URL is required (use --public-url or set the env var)")?;
        let secret_key = args
            .secret_key
            .filter(|s| !s.is_empty())
            .context("SECRET_KEY is required (use --secret-key or set the env var)")?;

        Ok(Config {
            server_host: args.host,
            server_port: args.port,

            api_endpoint: parse_base_url(&api_endpoint)
                .context("NEXT_PUBLIC_API_ENDPOINT is not a valid URL")?,
            public_url: Url::parse(&public_url).context("NEXT_PUBLIC_URL is not a valid URL")?,

            secret_key,

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,

            log_level: args.log_level,
        })
    }

    /// Whether session cookies should carry the `Secure` attribute
    pub fn secure_cookies(&self) -> bool {
        self.public_url.scheme() == "https"
    }

    /// Own origin without a trailing slash, as browsers send it
    pub fn public_origin(&self) -> String {
        self.public_url.origin().ascii_serialization()
    }
}

/// Parse a base URL so relative joins keep its path
///
/// `http://api/v1` and `http://api/v1/` both become `http://api/v1/`.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
