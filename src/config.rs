//! Runtime configuration for gemini-sse-relay.
//!
//! Everything is read once at startup from command-line flags, falling back to
//! environment variables (optionally seeded from a `.env` file). The resulting
//! [`Config`] is immutable and shared read-only by every request.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Output token limit used when none (or a non-positive one) is configured.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4000;

/// Public Gemini REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    #[error("Invalid listen address {0}")]
    InvalidListenAddress(String),
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "gemini-sse-relay",
    version,
    about = "Relay Gemini streaming generations to browsers over SSE"
)]
pub struct Cli {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    #[command(flatten)]
    pub serve: ServeArgs,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Upstream credentials and generation settings.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Model identifier.
    #[arg(long, env = "GEMINI_MODEL", global = true)]
    pub model: Option<String>,

    /// Maximum output tokens per generation.
    #[arg(long, env = "GEMINI_MAX_OUTPUT_TOKENS", allow_negative_numbers = true, global = true)]
    pub max_output_tokens: Option<i64>,

    /// Base URL of the Gemini REST API.
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP gateway (default).
    Serve,

    /// Stream a single generation to stdout.
    Ask {
        /// Prompt to send.
        #[arg(default_value = "What is the color of the sky?")]
        prompt: String,
    },
}

/// HTTP server flags.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// IP address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0", global = true)]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080, global = true)]
    pub port: u16,

    /// Directory served at `/`.
    #[arg(long, env = "STATIC_DIR", default_value = "static", global = true)]
    pub static_dir: PathBuf,

    /// Log every raw text chunk received from upstream (debug level).
    #[arg(long, env = "LOG_CHUNKS", global = true)]
    pub log_chunks: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: ClientConfiguration,
    pub relay: RelayOptions,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl ServerConfig {
    /// Socket address to bind.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddress(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Upstream model settings shared by all requests.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfiguration {
    pub api_key: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub base_url: String,
}

impl ClientConfiguration {
    /// Build a configuration, substituting defaults for an unset/empty model
    /// and an unset/non-positive token limit.
    pub fn new(
        api_key: impl Into<String>,
        model: Option<String>,
        max_output_tokens: Option<i64>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let model = model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_output_tokens = match max_output_tokens {
            Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
            _ => DEFAULT_MAX_OUTPUT_TOKENS,
        };

        Ok(Self {
            api_key,
            model,
            max_output_tokens,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl fmt::Debug for ClientConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfiguration")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Per-process relay behaviour toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOptions {
    /// Emit a debug log line with the raw text of every upstream chunk.
    pub log_chunks: bool,
}

impl UpstreamArgs {
    /// Resolve the upstream configuration, failing when no key is available.
    pub fn client_configuration(&self) -> Result<ClientConfiguration, ConfigError> {
        let api_key = self.api_key.clone().ok_or(ConfigError::MissingApiKey)?;
        Ok(
            ClientConfiguration::new(api_key, self.model.clone(), self.max_output_tokens)?
                .with_base_url(self.base_url.clone()),
        )
    }
}

impl Config {
    /// Assemble the server configuration from parsed arguments.
    pub fn from_args(upstream: &UpstreamArgs, serve: &ServeArgs) -> Result<Self, ConfigError> {
        let config = Self {
            server: ServerConfig {
                host: serve.host.clone(),
                port: serve.port,
                static_dir: serve.static_dir.clone(),
            },
            upstream: upstream.client_configuration()?,
            relay: RelayOptions {
                log_chunks: serve.log_chunks,
            },
        };
        config.server.listen_addr()?;
        Ok(config)
    }
}
