// Local credential provider.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use bcrypt::{hash, verify};
use claim_auth::{is_valid_email, CredentialProvider, Identity, IdentityStream, ProviderError};
use claim_core::ClaimConfigSnapshot;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

const USER_NOT_FOUND: &str = "auth/user-not-found";
const WRONG_PASSWORD: &str = "auth/wrong-password";
const USER_DISABLED: &str = "auth/user-disabled";
const TOO_MANY_REQUESTS: &str = "auth/too-many-requests";
const EMAIL_IN_USE: &str = "auth/email-already-in-use";
const INVALID_EMAIL: &str = "auth/invalid-email";
const WEAK_PASSWORD: &str = "auth/weak-password";
const INTERNAL_ERROR: &str = "auth/internal-error";

/// Cost range bcrypt accepts.
pub const MIN_HASH_COST: u32 = 4;
pub const MAX_HASH_COST: u32 = 31;

#[derive(Clone, Debug)]
pub struct LocalProviderOptions {
    pub hash_cost: u32,
    /// Consecutive wrong passwords before the account is throttled.
    pub max_failed_attempts: u32,
    /// How long a throttled account stays locked.
    pub lockout: Duration,
    pub min_password_len: usize,
    pub stream_capacity: usize,
}

impl Default for LocalProviderOptions {
    fn default() -> Self {
        Self {
            hash_cost: bcrypt::DEFAULT_COST,
            max_failed_attempts: 5,
            lockout: Duration::from_secs(300),
            min_password_len: 6,
            stream_capacity: 16,
        }
    }
}

impl LocalProviderOptions {
    /// Overlay `local.*` keys on the defaults.
    pub fn from_config(config: &ClaimConfigSnapshot) -> Result<Self> {
        let defaults = Self::default();
        let options = Self {
            hash_cost: config.get_u32("local.hash_cost").unwrap_or(defaults.hash_cost),
            max_failed_attempts: config
                .get_u32("local.max_failed_attempts")
                .unwrap_or(defaults.max_failed_attempts),
            lockout: config
                .get_u64("local.lockout_secs")
                .map(Duration::from_secs)
                .unwrap_or(defaults.lockout),
            min_password_len: config
                .get_u32("local.min_password_len")
                .map(|n| n as usize)
                .unwrap_or(defaults.min_password_len),
            stream_capacity: defaults.stream_capacity,
        };
        options.verify_configuration()?;
        Ok(options)
    }

    pub fn verify_configuration(&self) -> Result<()> {
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&self.hash_cost) {
            return Err(anyhow::anyhow!(
                "local.hash_cost must be between {} and {}, got {}",
                MIN_HASH_COST,
                MAX_HASH_COST,
                self.hash_cost
            ));
        }
        if self.max_failed_attempts == 0 {
            return Err(anyhow::anyhow!("local.max_failed_attempts must be at least 1"));
        }
        if self.stream_capacity == 0 {
            return Err(anyhow::anyhow!("identity stream capacity must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Account {
    uid: String,
    email: String,
    password_hash: String,
    display_name: Option<String>,
    disabled: bool,
    failed_attempts: u32,
    locked_until: Option<Instant>,
}

impl Account {
    fn unlock(&mut self) {
        self.failed_attempts = 0;
        self.locked_until = None;
    }

    fn identity(&self) -> Identity {
        Identity {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Default)]
struct LocalState {
    /// Keyed by lower-cased email.
    accounts: HashMap<String, Account>,
    current: Option<Identity>,
    reset_outbox: Vec<String>,
}

pub struct LocalCredentialProvider {
    options: LocalProviderOptions,
    state: Mutex<LocalState>,
    events: broadcast::Sender<Option<Identity>>,
}

impl Default for LocalCredentialProvider {
    fn default() -> Self {
        Self::new(LocalProviderOptions::default())
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

fn fail(code: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::from_code(code, message)
}

impl LocalCredentialProvider {
    pub fn new(options: LocalProviderOptions) -> Self {
        let (events, _) = broadcast::channel(options.stream_capacity.max(1));
        Self {
            options,
            state: Mutex::new(LocalState::default()),
            events,
        }
    }

    pub fn options(&self) -> &LocalProviderOptions {
        &self.options
    }

    fn lock(&self) -> Result<MutexGuard<'_, LocalState>, ProviderError> {
        self.state
            .lock()
            .map_err(|_| fail(INTERNAL_ERROR, "account table lock poisoned"))
    }

    fn announce(&self, change: Option<Identity>) {
        // no receivers is fine
        let _ = self.events.send(change);
    }

    fn hash_password(&self, password: &str) -> Result<String, ProviderError> {
        hash(password, self.options.hash_cost).map_err(|e| fail(INTERNAL_ERROR, e.to_string()))
    }

    /// Enable or disable an account. Returns false for unknown emails.
    pub fn set_disabled(&self, email: &str, disabled: bool) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        match state.accounts.get_mut(&email_key(email)) {
            Some(account) => {
                account.disabled = disabled;
                true
            }
            None => false,
        }
    }

    pub fn account(&self, email: &str) -> Option<Identity> {
        let state = self.lock().ok()?;
        state.accounts.get(&email_key(email)).map(Account::identity)
    }

    pub fn account_count(&self) -> usize {
        self.lock().map(|s| s.accounts.len()).unwrap_or(0)
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.lock().ok().and_then(|s| s.current.clone())
    }

    /// Emails a password reset was sent to, oldest first.
    pub fn reset_requests(&self) -> Vec<String> {
        self.lock().map(|s| s.reset_outbox.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CredentialProvider for LocalCredentialProvider {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let key = email_key(email);

        let hash_val = {
            let mut state = self.lock()?;
            let account = state
                .accounts
                .get_mut(&key)
                .ok_or_else(|| fail(USER_NOT_FOUND, "no account for this email"))?;
            if account.disabled {
                return Err(fail(USER_DISABLED, "account is disabled"));
            }
            match account.locked_until {
                Some(until) if Instant::now() < until => {
                    warn!("sign-in throttled after repeated failures");
                    return Err(fail(TOO_MANY_REQUESTS, "too many failed attempts"));
                }
                Some(_) => account.unlock(),
                None => {}
            }
            account.password_hash.clone()
        };

        let ok = verify(password, &hash_val).map_err(|e| fail(INTERNAL_ERROR, e.to_string()))?;

        let mut state = self.lock()?;
        let account = state
            .accounts
            .get_mut(&key)
            .ok_or_else(|| fail(USER_NOT_FOUND, "no account for this email"))?;

        if !ok {
            account.failed_attempts += 1;
            debug!(attempts = account.failed_attempts, "wrong password");
            if account.failed_attempts >= self.options.max_failed_attempts {
                account.locked_until = Some(Instant::now() + self.options.lockout);
            }
            return Err(fail(WRONG_PASSWORD, "password does not match"));
        }

        account.unlock();
        let identity = account.identity();
        state.current = Some(identity.clone());
        drop(state);

        info!(uid = %identity.uid, "signed in");
        self.announce(Some(identity.clone()));
        Ok(identity)
    }

    async fn create_identity(&self, email: &str, password: &str) -> Result<Identity, ProviderError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(fail(INVALID_EMAIL, "email is not valid"));
        }
        if password.chars().count() < self.options.min_password_len {
            return Err(fail(WEAK_PASSWORD, "password is too short"));
        }

        let password_hash = self.hash_password(password)?;
        let key = email_key(email);

        let mut state = self.lock()?;
        if state.accounts.contains_key(&key) {
            return Err(fail(EMAIL_IN_USE, "an account already uses this email"));
        }

        let account = Account {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            password_hash,
            display_name: None,
            disabled: false,
            failed_attempts: 0,
            locked_until: None,
        };
        let identity = account.identity();
        state.accounts.insert(key, account);
        state.current = Some(identity.clone());
        drop(state);

        info!(uid = %identity.uid, "identity created");
        self.announce(Some(identity.clone()));
        Ok(identity)
    }

    async fn set_display_name(&self, identity: &Identity, name: &str) -> Result<(), ProviderError> {
        let mut state = self.lock()?;
        let account = state
            .accounts
            .values_mut()
            .find(|a| a.uid == identity.uid)
            .ok_or_else(|| fail(USER_NOT_FOUND, "no account for this uid"))?;
        account.display_name = Some(name.to_string());
        let updated = account.identity();

        if state.current.as_ref().is_some_and(|c| c.uid == updated.uid) {
            state.current = Some(updated);
        }
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(fail(INVALID_EMAIL, "email is not valid"));
        }

        let mut state = self.lock()?;
        // unknown emails succeed silently
        if let Some(account) = state.accounts.get_mut(&email_key(email)) {
            account.unlock();
            state.reset_outbox.push(email.to_string());
            debug!("password reset queued");
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let previous = self.lock()?.current.take();
        if previous.is_some() {
            self.announce(None);
        }
        Ok(())
    }

    fn watch_identity(&self) -> Option<IdentityStream> {
        Some(self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim_auth::AuthErrorKind;
    use claim_core::ClaimConfig;

    fn provider() -> LocalCredentialProvider {
        LocalCredentialProvider::new(LocalProviderOptions {
            hash_cost: MIN_HASH_COST,
            max_failed_attempts: 2,
            ..LocalProviderOptions::default()
        })
    }

    async fn locked_out(lockout: Duration) -> LocalCredentialProvider {
        let p = LocalCredentialProvider::new(LocalProviderOptions {
            hash_cost: MIN_HASH_COST,
            max_failed_attempts: 2,
            lockout,
            ..LocalProviderOptions::default()
        });
        p.create_identity("a@b.com", "secret1").await.unwrap();
        for _ in 0..2 {
            p.authenticate("a@b.com", "nope123").await.unwrap_err();
        }
        p
    }

    #[test]
    fn config_overlays_defaults_and_rejects_bad_cost() {
        let mut config = ClaimConfig::new();
        config.set("local.hash_cost", "4");
        config.set("local.lockout_secs", "30");
        let options = LocalProviderOptions::from_config(&config.snapshot()).unwrap();
        assert_eq!(options.hash_cost, 4);
        assert_eq!(options.max_failed_attempts, 5);
        assert_eq!(options.lockout, Duration::from_secs(30));

        config.set("local.hash_cost", "2");
        assert!(LocalProviderOptions::from_config(&config.snapshot()).is_err());
    }

    #[tokio::test]
    async fn unknown_email_is_identity_not_found() {
        let err = provider().authenticate("a@b.com", "secret1").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::IdentityNotFound);
    }

    #[tokio::test]
    async fn emails_are_unique_ignoring_case() {
        let p = provider();
        p.create_identity("Jane@X.com", "secret1").await.unwrap();
        let err = p.create_identity("jane@x.com", "other12").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::DuplicateIdentity);
        assert_eq!(p.account_count(), 1);
    }

    #[tokio::test]
    async fn wrong_passwords_lead_to_throttling() {
        let p = provider();
        p.create_identity("a@b.com", "secret1").await.unwrap();

        for _ in 0..2 {
            let err = p.authenticate("a@b.com", "nope123").await.unwrap_err();
            assert_eq!(err.kind, AuthErrorKind::WrongCredential);
        }
        let err = p.authenticate("a@b.com", "secret1").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn lockout_expires_after_its_window() {
        let p = locked_out(Duration::from_millis(50)).await;
        let err = p.authenticate("a@b.com", "secret1").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::RateLimited);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(p.authenticate("a@b.com", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn expired_lockout_starts_a_fresh_count() {
        let p = locked_out(Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let err = p.authenticate("a@b.com", "nope123").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::WrongCredential);
        assert!(p.authenticate("a@b.com", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn password_reset_lifts_the_lockout() {
        let p = locked_out(Duration::from_secs(3600)).await;
        p.send_password_reset("a@b.com").await.unwrap();
        assert!(p.authenticate("a@b.com", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let p = provider();
        p.create_identity("a@b.com", "secret1").await.unwrap();
        p.authenticate("a@b.com", "nope123").await.unwrap_err();
        p.authenticate("A@B.com", "secret1").await.unwrap();
        p.authenticate("a@b.com", "nope123").await.unwrap_err();
        assert!(p.authenticate("a@b.com", "secret1").await.is_ok());
    }

    #[tokio::test]
    async fn disabled_accounts_are_refused() {
        let p = provider();
        p.create_identity("a@b.com", "secret1").await.unwrap();
        assert!(p.set_disabled("A@b.com", true));
        let err = p.authenticate("a@b.com", "secret1").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::Disabled);
    }

    #[tokio::test]
    async fn short_password_is_refused_with_unclassified_code() {
        let err = provider().create_identity("a@b.com", "123").await.unwrap_err();
        assert_eq!(err.code, "auth/weak-password");
        assert_eq!(err.kind, AuthErrorKind::Unknown);
    }

    #[tokio::test]
    async fn identity_stream_follows_sign_in_and_out() {
        let p = provider();
        let mut stream = p.watch_identity().unwrap();

        let created = p.create_identity("a@b.com", "secret1").await.unwrap();
        assert_eq!(stream.recv().await.unwrap(), Some(created.clone()));

        p.sign_out().await.unwrap();
        assert_eq!(stream.recv().await.unwrap(), None);
        assert_eq!(p.current_identity(), None);

        p.authenticate("a@b.com", "secret1").await.unwrap();
        assert_eq!(stream.recv().await.unwrap().map(|i| i.uid), Some(created.uid));
    }

    #[tokio::test]
    async fn reset_is_recorded_only_for_known_accounts() {
        let p = provider();
        p.create_identity("a@b.com", "secret1").await.unwrap();
        p.send_password_reset("a@b.com").await.unwrap();
        p.send_password_reset("ghost@b.com").await.unwrap();
        assert_eq!(p.reset_requests(), vec!["a@b.com".to_string()]);
    }
}
