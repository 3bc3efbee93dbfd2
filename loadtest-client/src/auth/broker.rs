//! OAuth token bootstrap and rotation per subject.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use loadtest_core::{DataError, LoadTestResult, RegistryCache, TokenPair};

use super::provider::ClientCredentials;
use crate::management::ManagementClient;

/// Access tokens expiring within this many seconds are rotated first.
const EXPIRATION_BUFFER_SECONDS: i64 = 60;

/// Credentials of the admin user and the app client subjects pair with.
#[derive(Clone)]
pub struct BrokerCredentials {
    pub admin_client: ClientCredentials,
    pub admin_username: String,
    pub admin_password: String,
    pub pairing_client: ClientCredentials,
}

impl std::fmt::Debug for BrokerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerCredentials")
            .field("admin_client", &self.admin_client)
            .field("admin_username", &self.admin_username)
            .field("pairing_client", &self.pairing_client)
            .finish_non_exhaustive()
    }
}

/// Obtains and rotates token pairs, keeping the latest pair per login in
/// the registry cache.
///
/// Refresh tokens are single use. Rotation of one login is serialized so
/// that two sessions never spend the same refresh token.
pub struct TokenBroker {
    management: ManagementClient,
    cache: Arc<RegistryCache>,
    credentials: BrokerCredentials,
    rotation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenBroker {
    pub fn new(management: ManagementClient, cache: Arc<RegistryCache>, credentials: BrokerCredentials) -> Self {
        Self {
            management,
            cache,
            credentials,
            rotation_locks: DashMap::new(),
        }
    }

    /// Password grant for the portal admin.
    pub async fn admin_token(&self) -> LoadTestResult<String> {
        let credentials = &self.credentials;
        self.management
            .password_grant(
                &credentials.admin_client,
                &credentials.admin_username,
                &credentials.admin_password,
            )
            .await
    }

    /// Pairs the app client with `login` and runs the refresh chain twice:
    /// meta-token name, meta-token exchange, refresh grant, refresh grant.
    /// The pair cached for the login after each grant is the latest one.
    pub async fn register_subject_tokens(&self, admin_token: &str, login: &str) -> LoadTestResult<TokenPair> {
        let pairing = &self.credentials.pairing_client;
        let token_name = self
            .management
            .pair_client(admin_token, &pairing.client_id, login)
            .await?;
        let refresh_token = self.management.meta_token(admin_token, &token_name).await?;
        tracing::debug!(login, "meta-token exchanged for refresh token");

        let first = self.management.refresh_grant(pairing, &refresh_token).await?;
        self.cache.store_tokens(login, first.clone());

        let renewed = self.management.refresh_grant(pairing, &first.refresh_token).await?;
        self.cache.store_tokens(login, renewed.clone());
        tracing::info!(login, "subject tokens registered");
        Ok(renewed)
    }

    /// Current access token of a login, rotated when it is about to expire.
    pub async fn access_token(&self, login: &str) -> LoadTestResult<String> {
        // Fast path: cached and valid
        let cached = self.cached(login)?;
        if !cached.is_expired(EXPIRATION_BUFFER_SECONDS) {
            return Ok(cached.access_token);
        }

        // Slow path: rotate under the login lock
        let lock = self.rotation_lock(login);
        let _guard = lock.lock().await;

        // Double-check after acquiring the lock
        let cached = self.cached(login)?;
        if !cached.is_expired(EXPIRATION_BUFFER_SECONDS) {
            return Ok(cached.access_token);
        }
        Ok(self.rotate_locked(login, &cached).await?.access_token)
    }

    /// Spends the cached refresh token of a login and stores the new pair.
    pub async fn rotate(&self, login: &str) -> LoadTestResult<TokenPair> {
        let lock = self.rotation_lock(login);
        let _guard = lock.lock().await;
        let cached = self.cached(login)?;
        self.rotate_locked(login, &cached).await
    }

    async fn rotate_locked(&self, login: &str, cached: &TokenPair) -> LoadTestResult<TokenPair> {
        let pair = self
            .management
            .refresh_grant(&self.credentials.pairing_client, &cached.refresh_token)
            .await?;
        self.cache.store_tokens(login, pair.clone());
        tracing::debug!(login, "token pair rotated");
        Ok(pair)
    }

    fn rotation_lock(&self, login: &str) -> Arc<Mutex<()>> {
        self.rotation_locks
            .entry(login.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn cached(&self, login: &str) -> LoadTestResult<TokenPair> {
        self.cache
            .tokens(login)
            .ok_or_else(|| DataError::new("token broker", format!("token pair of {}", login)).into())
    }
}

impl std::fmt::Debug for TokenBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBroker")
            .field("credentials", &self.credentials)
            .field("rotation_locks", &self.rotation_locks.len())
            .finish()
    }
}
