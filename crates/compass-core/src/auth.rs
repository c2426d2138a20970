//! Authentication port.
//!
//! Token issuance and validation live outside this core; the orchestration
//! layer only needs "credential in, session id out".

use crate::error::Result;
use async_trait::async_trait;

/// Resolves an incoming credential (e.g. a bearer token) to a session id.
///
/// Implementations must fail with [`crate::CompassError::Authentication`]
/// for missing, malformed, expired, or revoked credentials.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolves `credential` to the session id it grants access to.
    async fn resolve_session(&self, credential: &str) -> Result<String>;
}
