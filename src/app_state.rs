use crate::Config;
use crate::catalog::{Catalog, JsonCatalog};
use crate::claim::ClaimManager;
use crate::gate::AccessGate;
use crate::locator::AssetLocator;
use crate::session::{CallerId, SessionVerifier, StaticSessions};
use crate::token_bucket::TokenBucket;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AccessGate>,
    pub locator: Arc<AssetLocator>,
    pub catalog: Arc<dyn Catalog>,
    pub sessions: Arc<dyn SessionVerifier>,

    pub stream_ttl_secs: u64,
    pub public_base_url: Option<String>,
    pub stream_rate_limit: u64,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let claims = ClaimManager::with_retired(
            &config.stream_secret,
            config.retired_stream_secrets.as_slice(),
        );
        let locator = AssetLocator::new(Path::new(&config.uploads_dir))
            .context("Failed to set up asset locator")?;
        let catalog = JsonCatalog::load(Path::new(&config.catalog)).await?;
        let sessions = StaticSessions::new(config.session_tokens.iter().cloned());

        info!(
            uploads_dir = %config.uploads_dir,
            stream_ttl_secs = config.stream_ttl_seconds,
            retired_secrets = config.retired_stream_secrets.len(),
            session_tokens = sessions.len(),
            stream_rate_limit = config.stream_rate_limit,
            "App state initialised"
        );

        Ok(Self {
            gate: Arc::new(AccessGate::new(claims)),
            locator: Arc::new(locator),
            catalog: Arc::new(catalog),
            sessions: Arc::new(sessions),
            stream_ttl_secs: config.stream_ttl_seconds,
            public_base_url: config.public_base(),
            stream_rate_limit: config.stream_rate_limit,
        })
    }

    /// A fresh bucket for one stream
    pub fn stream_bucket(&self) -> TokenBucket {
        TokenBucket::new(self.stream_rate_limit)
    }

    /// Signed stream URL for `song_id` under `base`
    pub fn stream_url(
        &self,
        base: &str,
        song_id: &str,
        caller: Option<&CallerId>,
    ) -> anyhow::Result<String> {
        let sig = self.gate.claims().issue(
            song_id,
            caller.map(CallerId::as_str),
            self.stream_ttl_secs,
        )?;
        // ids are opaque, tokens are base64url and already query-safe
        let segment = urlencoding::encode(song_id);
        Ok(format!("{base}/stream/{segment}?sig={sig}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState {
            gate: Arc::new(AccessGate::new(ClaimManager::new("state-secret"))),
            locator: Arc::new(AssetLocator::with_bases(Vec::new())),
            catalog: Arc::new(JsonCatalog::default()),
            sessions: Arc::new(StaticSessions::default()),
            stream_ttl_secs: 300,
            public_base_url: None,
            stream_rate_limit: 0,
        }
    }

    #[test]
    fn test_stream_url_escapes_song_id() {
        let state = state();
        let url = state
            .stream_url("http://h", "rock/1 #x?", Some(&CallerId::new("u1")))
            .unwrap();

        let (path, sig) = url.split_once("?sig=").unwrap();
        assert_eq!(path, "http://h/stream/rock%2F1%20%23x%3F");

        let claim = state.gate.claims().verify(sig).unwrap();
        assert_eq!(claim.resource_id, "rock/1 #x?");
        assert_eq!(claim.caller_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_stream_url_plain_id() {
        let url = state().stream_url("https://api.example.com", "song-1", None).unwrap();
        assert!(url.starts_with("https://api.example.com/stream/song-1?sig="));
    }
}
