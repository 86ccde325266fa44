use crate::claim::{DEFAULT_STREAM_SECRET, DEFAULT_STREAM_TTL_SECS, is_insecure_secret};
use anyhow::{anyhow, bail};
use clap::ArgAction::Append;
use clap::Parser;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Main configuration structure that can be loaded from CLI, config file, or environment
///
/// Example configuration file content
/// # Stream gate configuration
///
/// listen_on_port = 5000
/// uploads_dir = "uploads"
/// catalog = "catalog.json"
/// public_base_url = "https://api.example.com"
///
/// # Stream tokens
/// stream_secret = "a long random string"
/// retired_stream_secrets = ["the previous secret"]
/// stream_ttl_seconds = 300
/// require_stream_secret = true
///
/// # Per-stream bandwidth cap in bytes per second (0 = disabled)
/// stream_rate_limit = 0
///
/// # Static bearer sessions (token = caller id)
/// [session_tokens]
/// "ops-token" = "ops"
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Uploads root, relative paths are resolved against the working directory
    #[arg(short, long, env = "UPLOADS_DIR", default_value = "uploads")]
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,

    /// Catalog JSON file
    #[arg(long, env = "CATALOG_PATH", default_value = "catalog.json")]
    #[serde(default = "default_catalog")]
    pub catalog: String,

    /// Configuration file path (overrides all other arguments)
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Secret that stream tokens are sealed with
    #[arg(long, env = "STREAM_SECRET", default_value = DEFAULT_STREAM_SECRET, hide_env_values = true)]
    #[serde(default = "default_stream_secret")]
    pub stream_secret: String,

    /// Previous secrets, still accepted when verifying tokens.
    /// Can be specified multiple times.
    #[arg(long = "retired-stream-secret", action = Append)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retired_stream_secrets: Vec<String>,

    /// Lifetime of issued stream tokens in seconds
    #[arg(long, env = "STREAM_TTL_SECONDS", default_value_t = DEFAULT_STREAM_TTL_SECS)]
    #[serde(default = "default_stream_ttl")]
    pub stream_ttl_seconds: u64,

    /// Refuse to start with an empty or default stream secret
    #[arg(long, env = "REQUIRE_STREAM_SECRET")]
    pub require_stream_secret: bool,

    /// Public origin used in listing URLs, e.g. https://api.example.com
    #[arg(long, env = "PUBLIC_API_BASE")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,

    /// Per-stream bandwidth cap in bytes per second (0 = disabled)
    #[arg(long, env = "STREAM_RATE_LIMIT", default_value_t = 0)]
    #[serde(default)]
    pub stream_rate_limit: u64,

    /// Static bearer sessions as token:caller_id.
    /// Can be specified multiple times.
    #[arg(long = "session-token", value_parser = parse_session_token, action = Append)]
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "de_session_tokens"
    )]
    pub session_tokens: Vec<(String, String)>,
}

/// Parse a session token from command line format "token:caller_id"
fn parse_session_token(s: &str) -> Result<(String, String), String> {
    let Some((token, caller)) = s.split_once(':') else {
        return Err("Invalid format. Use token:caller_id".to_string());
    };

    let (token, caller) = (token.trim(), caller.trim());
    if token.is_empty() {
        return Err("Session token cannot be empty".to_string());
    }
    if caller.is_empty() {
        return Err(format!("Caller id for session token '{token}' cannot be empty"));
    }

    Ok((token.to_string(), caller.to_string()))
}

fn de_session_tokens<'de, D>(de: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<BTreeMap<String, String>>::deserialize(de)?;
    let Some(repr) = repr else {
        return Ok(Vec::new());
    };

    repr.into_iter()
        .map(|(token, caller)| {
            if token.is_empty() || caller.is_empty() {
                return Err(serde::de::Error::custom(
                    "session_tokens entries need a token and a caller id",
                ));
            }
            Ok((token, caller))
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            uploads_dir: default_uploads_dir(),
            catalog: default_catalog(),
            config: None,
            stream_secret: default_stream_secret(),
            retired_stream_secrets: Vec::new(),
            stream_ttl_seconds: default_stream_ttl(),
            require_stream_secret: false,
            public_base_url: None,
            stream_rate_limit: 0,
            session_tokens: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|error| anyhow!("Failed to read config file {path:?}: {error}"))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.uploads_dir == default_uploads_dir() {
            self.uploads_dir = file_config.uploads_dir;
        }
        if self.catalog == default_catalog() {
            self.catalog = file_config.catalog;
        }
        if self.stream_secret == default_stream_secret() {
            self.stream_secret = file_config.stream_secret;
        }
        if self.stream_ttl_seconds == default_stream_ttl() {
            self.stream_ttl_seconds = file_config.stream_ttl_seconds;
        }
        if self.stream_rate_limit == 0 {
            self.stream_rate_limit = file_config.stream_rate_limit;
        }
        self.require_stream_secret |= file_config.require_stream_secret;

        // For Option and list fields, CLI takes precedence if set
        if self.public_base_url.is_none() {
            self.public_base_url = file_config.public_base_url;
        }
        if self.retired_stream_secrets.is_empty() {
            self.retired_stream_secrets = file_config.retired_stream_secrets;
        }
        if self.session_tokens.is_empty() {
            self.session_tokens = file_config.session_tokens;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stream_ttl_seconds == 0 {
            bail!("stream_ttl_seconds must be greater than 0");
        }

        if self.uploads_dir.trim().is_empty() {
            bail!("uploads_dir cannot be empty");
        }

        if self.require_stream_secret && is_insecure_secret(&self.stream_secret) {
            bail!("A non-default stream_secret is required (set STREAM_SECRET)");
        }

        if let Some(base) = &self.public_base_url {
            if base.is_empty() {
                bail!("public_base_url cannot be empty");
            }
            if !base.starts_with("http://") && !base.starts_with("https://") {
                bail!("public_base_url must start with http:// or https://");
            }
        }

        Ok(())
    }

    /// Public origin without a trailing slash
    pub fn public_base(&self) -> Option<String> {
        self.public_base_url
            .as_deref()
            .map(|base| base.trim_end_matches('/').to_string())
    }
}

// Default value functions
fn default_port() -> u16 {
    5000
}

fn default_uploads_dir() -> String {
    "uploads".to_string()
}

fn default_catalog() -> String {
    "catalog.json".to_string()
}

fn default_stream_secret() -> String {
    DEFAULT_STREAM_SECRET.to_string()
}

fn default_stream_ttl() -> u64 {
    DEFAULT_STREAM_TTL_SECS
}
