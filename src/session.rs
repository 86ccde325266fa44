//! Session identity supplied by an external bearer-token verifier.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Opaque identity of an authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps a bearer credential to a caller
pub trait SessionVerifier: Send + Sync + 'static {
    fn verify(&self, bearer: &str) -> Option<CallerId>;
}

/// Fixed bearer tokens from configuration, for operators and tooling
#[derive(Debug, Clone, Default)]
pub struct StaticSessions {
    tokens: HashMap<String, CallerId>,
}

impl StaticSessions {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            tokens: entries
                .into_iter()
                .map(|(token, caller)| (token, CallerId(caller)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl SessionVerifier for StaticSessions {
    fn verify(&self, bearer: &str) -> Option<CallerId> {
        self.tokens.get(bearer).cloned()
    }
}

/// Session of the current request, `None` when anonymous
#[derive(Debug, Clone, Default)]
pub struct Session(pub Option<CallerId>);

/// Pull the bearer out of `Authorization` and attach a [`Session`].
///
/// A missing or unknown bearer does not fail the request: stream requests
/// may still carry a token, and listings work anonymously.
pub async fn session_middleware(
    State(verifier): State<Arc<dyn SessionVerifier>>,
    mut req: Request,
    next: Next,
) -> Response {
    let caller = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|bearer| !bearer.is_empty())
        .and_then(|bearer| {
            let caller = verifier.verify(bearer);
            if caller.is_none() {
                debug!("Bearer credential not recognised, continuing without session");
            }
            caller
        });

    req.extensions_mut().insert(Session(caller));
    next.run(req).await
}
