//! Bearer credential resolution.
//!
//! Configured tokens are hashed once at load; incoming credentials are hashed
//! and looked up, so raw tokens never sit in the lookup table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::types::{FairError, Result, UserIdentity};

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a bearer token to a user, or fail with `Unauthorized`.
    async fn authenticate(&self, token: &str) -> Result<UserIdentity>;
}

pub type SharedAuthenticator = Arc<dyn Authenticator>;

fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Tokens listed under `[[auth.tokens]]`
#[derive(Debug, Default)]
pub struct StaticTokenAuthenticator {
    users_by_digest: HashMap<String, String>,
}

impl StaticTokenAuthenticator {
    pub fn new<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let users_by_digest = tokens
            .into_iter()
            .filter(|(_, token)| !token.trim().is_empty())
            .map(|(user_id, token)| (digest(token.trim()), user_id))
            .collect();
        Self { users_by_digest }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let auth = Self::new(
            config
                .tokens
                .iter()
                .map(|t| (t.user_id.clone(), t.token.clone())),
        );
        if auth.is_empty() {
            warn!("No API tokens configured; every authenticated request will be rejected");
        }
        auth
    }

    pub fn len(&self) -> usize {
        self.users_by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users_by_digest.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<UserIdentity> {
        let token = token.trim();
        if token.is_empty() {
            return Err(FairError::Unauthorized("missing bearer token".to_string()));
        }

        match self.users_by_digest.get(&digest(token)) {
            Some(user_id) => {
                debug!(user_id = %user_id, "Authenticated request");
                Ok(UserIdentity::new(user_id.clone(), token))
            }
            None => Err(FairError::Unauthorized("invalid bearer token".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiToken;

    fn authenticator() -> StaticTokenAuthenticator {
        StaticTokenAuthenticator::from_config(&AuthConfig {
            tokens: vec![
                ApiToken {
                    user_id: "tenant-1".into(),
                    token: "secret-one".into(),
                },
                ApiToken {
                    user_id: "blank".into(),
                    token: "   ".into(),
                },
            ],
        })
    }

    #[tokio::test]
    async fn test_known_token_resolves() {
        let identity = authenticator().authenticate("secret-one").await.unwrap();
        assert_eq!(identity.user_id, "tenant-1");
        assert_eq!(identity.token(), "secret-one");
    }

    #[tokio::test]
    async fn test_unknown_and_empty_rejected() {
        let auth = authenticator();
        assert_eq!(auth.len(), 1);

        let err = auth.authenticate("nope").await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
        assert_eq!(err.http_status(), 401);

        assert!(auth.authenticate("  ").await.is_err());
    }

    #[test]
    fn test_digest_is_hex_sha256() {
        let d = digest("abc");
        assert_eq!(d.len(), 64);
        assert_eq!(
            d,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
