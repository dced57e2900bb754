use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use super::client::Authenticator;
use super::config::AccountConfig;
use super::error::{CredentialError, Result};

/// Bearer tokens keyed by account id. Shared by every in-flight request.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: DashMap<String, String>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account_id: &str) -> Option<String> {
        self.tokens.get(account_id).map(|t| t.value().clone())
    }

    pub fn insert(&self, account_id: &str, token: String) {
        self.tokens.insert(account_id.to_string(), token);
    }

    /// Returns the cached token, storing `token` only when none is present.
    pub fn get_or_insert(&self, account_id: &str, token: &str) -> String {
        self.tokens
            .entry(account_id.to_string())
            .or_insert_with(|| token.to_string())
            .value()
            .clone()
    }

    pub fn invalidate(&self, account_id: &str) -> bool {
        self.tokens.remove(account_id).is_some()
    }
}

/// Resolves tokens for an account and repairs one auth failure per call.
pub struct TokenManager<A> {
    auth: A,
    cache: Arc<TokenCache>,
}

impl<A: Authenticator> TokenManager<A> {
    pub fn new(auth: A, cache: Arc<TokenCache>) -> Self {
        Self { auth, cache }
    }

    pub fn authenticator(&self) -> &A {
        &self.auth
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    pub fn invalidate_token(&self, account_id: &str) {
        if self.cache.invalidate(account_id) {
            info!(target:"providers::deepseek_web","token invalidated account={}", account_id);
        }
    }

    /// Cached token, else the configured static token, else a fresh login.
    pub async fn ensure_token(&self, account: &AccountConfig) -> Result<String> {
        if let Some(t) = self.cache.get(&account.id) {
            return Ok(t);
        }
        if let Some(t) = account.static_token() {
            return Ok(self.cache.get_or_insert(&account.id, t));
        }
        self.login(account).await
    }

    async fn login(&self, account: &AccountConfig) -> Result<String> {
        if account.email.trim().is_empty() && account.mobile.trim().is_empty() {
            return Err(CredentialError::MissingCredentials("DeepSeek Web requires email or mobile number").into());
        }
        if account.password.trim().is_empty() {
            return Err(CredentialError::MissingCredentials("DeepSeek Web requires password").into());
        }
        let token = self
            .auth
            .login(&account.email, &account.mobile, &account.password)
            .await?;
        self.cache.insert(&account.id, token.clone());
        Ok(token)
    }

    /// Runs `op` with a token. A 401/403 triggers one eviction, one fresh
    /// login and one more attempt; anything after that propagates as-is.
    pub async fn execute_with_retry<T, F, Fut>(&self, account: &AccountConfig, op: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut token = self.ensure_token(account).await?;
        let mut fresh_login_attempted = false;
        loop {
            match op(token).await {
                Ok(v) => return Ok(v),
                Err(e) if !fresh_login_attempted && e.is_auth_failure() && account.can_login() => {
                    warn!(target:"providers::deepseek_web","auth failure ({}), retrying with fresh token account={}", e, account.id);
                    fresh_login_attempted = true;
                    self.cache.invalidate(&account.id);
                    token = self.login(account).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deepseek_web::error::DeepSeekError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAuth {
        logins: AtomicUsize,
    }

    #[async_trait]
    impl Authenticator for FakeAuth {
        async fn login(&self, _email: &str, _mobile: &str, _password: &str) -> Result<String> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("fresh-{n}"))
        }
    }

    fn account(token: &str, password: &str) -> AccountConfig {
        AccountConfig {
            id: "acc".into(),
            token: token.into(),
            email: "a@b.c".into(),
            mobile: String::new(),
            password: password.into(),
        }
    }

    fn manager() -> TokenManager<FakeAuth> {
        TokenManager::new(FakeAuth::default(), Arc::new(TokenCache::new()))
    }

    #[tokio::test]
    async fn cached_token_success_runs_once() {
        let m = manager();
        m.cache().insert("acc", "cached".into());
        let calls = Mutex::new(Vec::new());
        let out = m
            .execute_with_retry(&account("", "pw"), |t| {
                calls.lock().unwrap().push(t);
                async { Ok::<_, DeepSeekError>(7) }
            })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(*calls.lock().unwrap(), vec!["cached".to_string()]);
        assert_eq!(m.authenticator().logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn forbidden_triggers_single_relogin() {
        let m = manager();
        m.cache().insert("acc", "stale".into());
        let calls = Mutex::new(Vec::new());
        let out = m
            .execute_with_retry(&account("", "pw"), |t| {
                calls.lock().unwrap().push(t.clone());
                async move {
                    if t == "stale" {
                        Err(DeepSeekError::api(403, "forbidden"))
                    } else {
                        Ok(t)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "fresh-1");
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(m.authenticator().logins.load(Ordering::SeqCst), 1);
        assert_eq!(m.cache().get("acc").as_deref(), Some("fresh-1"));
    }

    #[tokio::test]
    async fn second_auth_failure_propagates() {
        let m = manager();
        let calls = AtomicUsize::new(0);
        let err = m
            .execute_with_retry(&account("static", "pw"), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DeepSeekError::api(401, "nope")) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DeepSeekError::Api { status: 401, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(m.authenticator().logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_password_means_no_retry() {
        let m = manager();
        let calls = AtomicUsize::new(0);
        let err = m
            .execute_with_retry(&account("static", ""), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(DeepSeekError::api(403, "forbidden")) }
            })
            .await
            .unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(m.authenticator().logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_errors_and_cancellation_are_not_retried() {
        let m = manager();
        let makers: [fn() -> DeepSeekError; 3] = [
            || DeepSeekError::api(500, "boom"),
            || DeepSeekError::Canceled,
            || DeepSeekError::Stream("x".into()),
        ];
        for make in makers {
            let calls = AtomicUsize::new(0);
            let err = m
                .execute_with_retry(&account("static", "pw"), |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err::<(), _>(make()) }
                })
                .await
                .unwrap_err();
            assert!(!err.is_auth_failure());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
        assert_eq!(m.authenticator().logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolution_order() {
        let m = manager();
        assert_eq!(m.ensure_token(&account(" static ", "pw")).await.unwrap(), "static");
        // now cached; the static token is not consulted again
        assert_eq!(m.ensure_token(&account("other", "pw")).await.unwrap(), "static");
        m.invalidate_token("acc");
        assert_eq!(m.ensure_token(&account("", "pw")).await.unwrap(), "fresh-1");
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        let m = manager();
        let mut acc = account("", "");
        let err = m.ensure_token(&acc).await.unwrap_err();
        assert!(matches!(err, DeepSeekError::Credential(CredentialError::MissingCredentials(_))));
        acc.email.clear();
        acc.password = "pw".into();
        let err = m.ensure_token(&acc).await.unwrap_err();
        assert!(matches!(err, DeepSeekError::Credential(CredentialError::MissingCredentials(_))));
        assert_eq!(m.authenticator().logins.load(Ordering::SeqCst), 0);
    }
}
