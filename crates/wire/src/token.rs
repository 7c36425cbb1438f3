// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer-token acquisition for the directory store. The concrete identity
//! vendor is out of scope (`SPEC_FULL.md` §1); this crate only needs
//! *something* that hands back a bearer token and, optionally, when it
//! expires. The default provider resolves from an environment variable,
//! mirroring the env-var-first step of the credential fallback chain used
//! elsewhere in this codebase for subprocess credential injection.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mesh_core::CoordinationError;
use parking_lot::Mutex;

/// Token cache policy: refresh at most once per this interval unless the
/// provider reports an earlier expiry (`SPEC_FULL.md` §4.1).
const DEFAULT_CACHE_TTL_MINUTES: i64 = 55;
/// Safety margin subtracted from a provider-reported expiry.
const EXPIRY_SAFETY_MARGIN_MINUTES: i64 = 5;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetches a fresh bearer token. Returns `(token, expires_at)`; `expires_at`
    /// is `None` when the provider can't report one, in which case the cache
    /// falls back to the flat 55-minute policy.
    async fn fetch(&self) -> Result<(String, Option<DateTime<Utc>>), CoordinationError>;
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Wraps any `TokenProvider` with an in-memory cache safe for concurrent use.
pub struct TokenCache<P> {
    provider: P,
    cached: Mutex<Option<CachedToken>>,
}

impl<P: TokenProvider> TokenCache<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String, CoordinationError> {
        {
            let guard = self.cached.lock();
            if let Some(cached) = guard.as_ref() {
                if Utc::now() < cached.expires_at {
                    return Ok(cached.token.clone());
                }
            }
        }

        let (token, expires_on) = self.provider.fetch().await?;
        let expires_at = expires_on
            .map(|e| e - Duration::minutes(EXPIRY_SAFETY_MARGIN_MINUTES))
            .unwrap_or_else(|| Utc::now() + Duration::minutes(DEFAULT_CACHE_TTL_MINUTES));

        *self.cached.lock() = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }
}

/// Resolves a bearer token from an environment variable. The variable name
/// defaults to `DATAVERSE_TOKEN` but is configurable so a daemon can point
/// at a token-refresh sidecar that rewrites a different variable.
pub struct EnvTokenProvider {
    var_name: String,
}

impl EnvTokenProvider {
    pub fn new(var_name: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
        }
    }
}

impl Default for EnvTokenProvider {
    fn default() -> Self {
        Self::new("DATAVERSE_TOKEN")
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn fetch(&self) -> Result<(String, Option<DateTime<Utc>>), CoordinationError> {
        std::env::var(&self.var_name)
            .map(|token| (token, None))
            .map_err(|_| {
                CoordinationError::AuthFailure(format!(
                    "{} is not set; interactive login may be required",
                    self.var_name
                ))
            })
    }
}
