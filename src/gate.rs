//! Decides whether one stream request may proceed.
//!
//! Two independent capabilities open the gate:
//! - a stream token whose claim names exactly the requested resource, which
//!   is what media players embedding a listing URL present;
//! - an authenticated session, which may stream anything.

use crate::claim::{ClaimManager, StreamClaim};
use crate::session::CallerId;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// Opened by a scoped stream token
    Token(StreamClaim),
    /// Opened by a session identity
    Session(CallerId),
    Unauthorized,
}

#[derive(Clone, Debug)]
pub struct AccessGate {
    claims: ClaimManager,
}

impl AccessGate {
    pub fn new(claims: ClaimManager) -> Self {
        Self { claims }
    }

    pub fn claims(&self) -> &ClaimManager {
        &self.claims
    }

    pub fn authorize(
        &self,
        resource_id: &str,
        token: Option<&str>,
        session: Option<&CallerId>,
    ) -> Authorization {
        self.authorize_at(resource_id, token, session, crate::claim::unix_now())
    }

    pub fn authorize_at(
        &self,
        resource_id: &str,
        token: Option<&str>,
        session: Option<&CallerId>,
        now: u64,
    ) -> Authorization {
        if let Some(claim) = token.and_then(|token| self.claims.verify_at(token, now)) {
            if claim.resource_id == resource_id {
                return Authorization::Token(claim);
            }
            debug!(
                resource_id,
                claim_resource_id = %claim.resource_id,
                "Stream token scoped to another resource"
            );
        }

        match session {
            Some(caller) => Authorization::Session(caller.clone()),
            None => Authorization::Unauthorized,
        }
    }
}
