//! The on-disk OAuth token cache and the decision of when to refresh or re-consent.

use crate::error::{Error, Result};
use crate::oauth::OAuthManager;
use eyre::Context;
use jiff::{SignedDuration, Timestamp};
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Tokens are treated as expired this long before the provider says they are.
const SAFETY_BUFFER: SignedDuration = SignedDuration::from_secs(300);
/// Lifetime assumed when the provider does not report one (one hour minus the buffer).
const DEFAULT_LIFETIME: SignedDuration = SignedDuration::from_secs(3300);
/// Upper bound on what we believe about `expires_in`.
const MAX_LIFETIME_SECS: u64 = 60 * 60 * 24 * 30;

/// Something that can obtain OAuth tokens: interactively, or by refreshing.
pub trait Authorizer: Send + Sync {
    /// Runs interactive consent.
    fn authorize(&self) -> impl Future<Output = eyre::Result<BasicTokenResponse>> + Send;

    /// Exchanges the token's refresh token for a new access token.
    ///
    /// `Ok(None)` means the refresh token is no longer honored and consent is needed again.
    fn refresh(
        &self,
        token: &BasicTokenResponse,
    ) -> impl Future<Output = eyre::Result<Option<BasicTokenResponse>>> + Send;
}

impl Authorizer for OAuthManager {
    async fn authorize(&self) -> eyre::Result<BasicTokenResponse> {
        self.authenticate().await
    }

    async fn refresh(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        self.refresh_token(token).await
    }
}

/// An OAuth token together with the moment we stop trusting its access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    token: BasicTokenResponse,
    /// When the access token expires, minus [`SAFETY_BUFFER`].
    expires_at: Timestamp,
}

impl Credential {
    /// Wraps a token the provider has just issued.
    pub fn new(token: BasicTokenResponse) -> Self {
        Self::issued_at(token, Timestamp::now())
    }

    fn issued_at(token: BasicTokenResponse, now: Timestamp) -> Self {
        let lifetime = match token.expires_in() {
            Some(expires_in) => {
                SignedDuration::from_secs(expires_in.as_secs().min(MAX_LIFETIME_SECS) as i64)
                    - SAFETY_BUFFER
            }
            None => DEFAULT_LIFETIME,
        };
        Self {
            expires_at: now + lifetime,
            token,
        }
    }

    pub fn access_token(&self) -> &str {
        self.token.access_token().secret()
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Timestamp::now() >= self.expires_at
    }

    pub fn can_refresh(&self) -> bool {
        self.token.refresh_token().is_some()
    }

    /// Replaces the token with a refreshed one.
    ///
    /// Google usually omits the refresh token from refresh responses; the original one stays valid
    /// and is carried over.
    fn refreshed(self, mut new_token: BasicTokenResponse) -> Self {
        if new_token.refresh_token().is_none() {
            tracing::trace!("new token lacks refresh token, preserving original");
            new_token.set_refresh_token(self.token.refresh_token().cloned());
        } else {
            tracing::debug!("new token includes refresh token");
        }
        Self::new(new_token)
    }
}

/// What the token cache currently holds.
#[derive(Debug)]
pub enum CredentialState {
    /// Usable as-is; no network needed.
    Valid(Credential),
    /// Expired, but carries a refresh token.
    ExpiredRefreshable(Credential),
    /// Nothing usable; consent is required.
    Absent,
}

/// Owns the token cache file and hands out credentials that are valid right now.
#[derive(Debug)]
pub struct CredentialStore<A> {
    cache_path: PathBuf,
    authorizer: A,
}

impl<A: Authorizer> CredentialStore<A> {
    pub fn new(cache_path: impl Into<PathBuf>, authorizer: A) -> Self {
        Self {
            cache_path: cache_path.into(),
            authorizer,
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn authorizer(&self) -> &A {
        &self.authorizer
    }

    /// Inspects the cache without touching the network.
    ///
    /// An unreadable or corrupt cache is logged and reported as [`CredentialState::Absent`].
    pub async fn state(&self) -> CredentialState {
        let raw = match tokio::fs::read(&self.cache_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CredentialState::Absent,
            Err(e) => {
                tracing::warn!(path = %self.cache_path.display(), error = %e, "cannot read token cache");
                return CredentialState::Absent;
            }
        };
        let credential: Credential = match serde_json::from_slice(&raw) {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(path = %self.cache_path.display(), error = %e, "ignoring corrupt token cache");
                return CredentialState::Absent;
            }
        };

        if !credential.is_expired() {
            CredentialState::Valid(credential)
        } else if credential.can_refresh() {
            CredentialState::ExpiredRefreshable(credential)
        } else {
            CredentialState::Absent
        }
    }

    /// Returns a credential that is valid now, refreshing or running consent as needed.
    #[instrument(skip(self), fields(cache = %self.cache_path.display()))]
    pub async fn get_valid_credential(&self) -> Result<Credential> {
        self.resolve().await.map_err(Error::Auth)
    }

    async fn resolve(&self) -> eyre::Result<Credential> {
        match self.state().await {
            CredentialState::Valid(credential) => {
                tracing::debug!(expires_at = %credential.expires_at, "using cached credential");
                Ok(credential)
            }
            CredentialState::ExpiredRefreshable(credential) => {
                tracing::debug!("cached access token expired, attempting refresh");
                match self
                    .authorizer
                    .refresh(&credential.token)
                    .await
                    .context("refresh OAuth token")?
                {
                    Some(new_token) => {
                        let credential = credential.refreshed(new_token);
                        self.save(&credential).await;
                        Ok(credential)
                    }
                    None => {
                        tracing::warn!("token refresh failed, getting new token via full OAuth");
                        self.consent().await
                    }
                }
            }
            CredentialState::Absent => self.consent().await,
        }
    }

    async fn consent(&self) -> eyre::Result<Credential> {
        let token = self
            .authorizer
            .authorize()
            .await
            .context("authorize user to YouTube")?;
        let credential = Credential::new(token);
        self.save(&credential).await;
        Ok(credential)
    }

    /// Writes the cache; failing to do so only costs a consent prompt next time.
    async fn save(&self, credential: &Credential) {
        if let Err(e) = self.write_cache(credential).await {
            tracing::warn!(error = %format!("{e:#}"), "could not persist OAuth token");
        }
    }

    async fn write_cache(&self, credential: &Credential) -> eyre::Result<()> {
        let json = serde_json::to_vec_pretty(credential).context("serialize token")?;
        if let Some(parent) = self.cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::write(&self.cache_path, json)
            .await
            .with_context(|| format!("write {}", self.cache_path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.cache_path, std::fs::Permissions::from_mode(0o600))
                .await
                .context("restrict token cache permissions")?;
        }
        tracing::debug!(path = %self.cache_path.display(), "saved OAuth token");
        Ok(())
    }
}
