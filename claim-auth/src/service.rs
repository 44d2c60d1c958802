//! # Sign-in service
//!
//! One [`SignInService::submit`] call runs the sign-in state machine for a
//! single (email, password) pair:
//!
//! ```text
//! START ──invalid──▶ VALIDATION_ERROR
//!   │
//!   ▼
//! AUTHENTICATE ──ok──▶ DONE
//!   │  identity-not-found            other kind ──▶ FAILED
//!   ▼
//! PROVISION ──no reservation──▶ FAILED (not reserved)
//!   │  create identity           duplicate ──▶ FAILED (retry)
//!   ▼
//! BOUND ── set display name (best effort), bind reservation ──▶ DONE
//! ```
//!
//! Steps run strictly one after another. Concurrent submissions for the same
//! reservation are settled by the provider's unique-email rule: the loser
//! sees a duplicate-identity failure and is told to sign in again.

use std::sync::Arc;

use claim_core::{ClaimError, DirectoryStore, ErrorKind};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::binder::{derive_display_name, IdentityBinder};
use crate::locator::ReservationLocator;
use crate::messages::Messages;
use crate::options::ClaimOptions;
use crate::provider::{AuthErrorKind, CredentialProvider, Identity, ProviderError};
use crate::session::{Landing, SessionContext};
use crate::validation::{validate_credentials, validate_reset_email, Credentials};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignInOutcome {
    Done,
    Failed(String),
    ValidationError(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResetOutcome {
    Sent(String),
    Failed(String),
}

/// Why a submission did not reach DONE.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignInError {
    #[error("local validation failed: {0}")]
    LocalValidation(String),

    #[error("provider rejected the credentials: {}", .0.code())]
    AuthRejected(AuthErrorKind),

    #[error("email has no reservation")]
    NotReserved,

    #[error("identity was created concurrently")]
    ProvisionRace,

    #[error("provider failed with an unclassified error")]
    ProviderUnknown,

    #[error("reservation could not be bound: {0}")]
    BindFailed(String),
}

impl SignInError {
    pub fn from_provider(err: &ProviderError) -> Self {
        match err.kind {
            AuthErrorKind::DuplicateIdentity => SignInError::ProvisionRace,
            AuthErrorKind::Unknown => SignInError::ProviderUnknown,
            kind => SignInError::AuthRejected(kind),
        }
    }

    /// The only text a caller ever sees for this failure.
    pub fn user_message(&self, messages: &Messages) -> String {
        match self {
            SignInError::LocalValidation(msg) => msg.clone(),
            SignInError::AuthRejected(kind) => messages.for_kind(*kind).to_string(),
            SignInError::NotReserved => messages.not_reserved.clone(),
            SignInError::ProvisionRace => messages.provision_race.clone(),
            SignInError::ProviderUnknown => messages.generic.clone(),
            SignInError::BindFailed(_) => messages.bind_failed.clone(),
        }
    }
}

pub struct SignInService {
    provider: Arc<dyn CredentialProvider>,
    locator: ReservationLocator,
    binder: IdentityBinder,
    session: Option<SessionContext>,
    options: ClaimOptions,
    messages: Messages,
}

impl SignInService {
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        store: Option<Arc<dyn DirectoryStore>>,
        options: ClaimOptions,
    ) -> Self {
        Self {
            provider,
            locator: ReservationLocator::new(store.clone(), options.fields.clone()),
            binder: IdentityBinder::new(store, options.fields.clone()),
            session: None,
            messages: Messages::for_locale(options.locale),
            options,
        }
    }

    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_messages(mut self, messages: Messages) -> Self {
        self.messages = messages;
        self
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn options(&self) -> &ClaimOptions {
        &self.options
    }

    /// Run one sign-in submission to a terminal outcome.
    pub async fn submit(&self, email: &str, password: &str) -> SignInOutcome {
        match self.attempt(email, password).await {
            Ok(identity) => {
                info!(uid = %identity.uid, "sign-in completed");
                SignInOutcome::Done
            }
            Err(SignInError::LocalValidation(msg)) => {
                debug!("sign-in input rejected locally");
                SignInOutcome::ValidationError(msg)
            }
            Err(err) => {
                info!(error = %err, "sign-in failed");
                SignInOutcome::Failed(err.user_message(&self.messages))
            }
        }
    }

    /// Like [`submit`](Self::submit), keeping the typed failure.
    pub async fn attempt(&self, email: &str, password: &str) -> Result<Identity, SignInError> {
        let credentials = validate_credentials(email, password, &self.messages)
            .map_err(SignInError::LocalValidation)?;
        self.run(&credentials).await
    }

    #[instrument(skip_all, fields(email = %credentials.email))]
    async fn run(&self, credentials: &Credentials) -> Result<Identity, SignInError> {
        match self
            .provider
            .authenticate(&credentials.email, &credentials.password)
            .await
        {
            Ok(identity) => Ok(identity),
            Err(err) if err.kind == AuthErrorKind::IdentityNotFound => {
                debug!("identity not found; looking for a reservation");
                self.provision(credentials).await
            }
            Err(err) => {
                debug!(code = %err.code, "authentication rejected");
                Err(SignInError::from_provider(&err))
            }
        }
    }

    async fn provision(&self, credentials: &Credentials) -> Result<Identity, SignInError> {
        let Some(reservation) = self.locator.locate(&credentials.email).await else {
            return Err(SignInError::NotReserved);
        };

        let identity = self
            .provider
            .create_identity(&credentials.email, &credentials.password)
            .await
            .map_err(|err| {
                warn!(code = %err.code, record = %reservation.reference(), "identity creation failed");
                SignInError::from_provider(&err)
            })?;

        let display_name = derive_display_name(
            reservation.fields(),
            &self.options.given_name_keys,
            &self.options.surname_keys,
        );

        if let Some(name) = display_name.as_deref() {
            if let Err(err) = self.provider.set_display_name(&identity, name).await {
                warn!(code = %err.code, uid = %identity.uid, "could not set display name");
            }
        }

        match self
            .binder
            .bind(&reservation, &identity.uid, &credentials.email, display_name.as_deref())
            .await
        {
            Ok(()) => Ok(identity),
            Err(err) if ClaimError::kind_of(&err) == ErrorKind::Unavailable => {
                warn!(error = %err, uid = %identity.uid, "directory unavailable; reservation left unbound");
                Ok(identity)
            }
            Err(err) => Err(SignInError::BindFailed(err.to_string())),
        }
    }

    /// Ask the provider to send a password-reset email. The address is
    /// validated locally first.
    pub async fn request_password_reset(&self, email: &str) -> ResetOutcome {
        let email = match validate_reset_email(email, &self.messages) {
            Ok(e) => e,
            Err(msg) => return ResetOutcome::Failed(msg),
        };

        match self.provider.send_password_reset(&email).await {
            Ok(()) => ResetOutcome::Sent(self.messages.reset_sent.clone()),
            Err(err) => {
                warn!(code = %err.code, "password reset request failed");
                ResetOutcome::Failed(SignInError::from_provider(&err).user_message(&self.messages))
            }
        }
    }

    pub async fn sign_out(&self) -> Result<(), SignInError> {
        self.provider
            .sign_out()
            .await
            .map_err(|err| SignInError::from_provider(&err))
    }

    /// Where to send the user after DONE, read from the session context.
    pub fn landing(&self) -> Option<Landing> {
        self.session.as_ref().and_then(SessionContext::landing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kinds_map_to_error_taxonomy() {
        let dup = ProviderError::from_code("auth/email-already-in-use", "taken");
        assert_eq!(SignInError::from_provider(&dup), SignInError::ProvisionRace);

        let odd = ProviderError::from_code("auth/network-request-failed", "offline");
        assert_eq!(SignInError::from_provider(&odd), SignInError::ProviderUnknown);

        let wrong = ProviderError::new(AuthErrorKind::WrongCredential, "no");
        assert_eq!(
            SignInError::from_provider(&wrong),
            SignInError::AuthRejected(AuthErrorKind::WrongCredential)
        );
    }

    #[test]
    fn user_messages_never_carry_provider_text() {
        let m = Messages::english();
        assert_eq!(SignInError::NotReserved.user_message(&m), m.not_reserved);
        assert_eq!(SignInError::ProviderUnknown.user_message(&m), m.generic);
        assert_eq!(
            SignInError::BindFailed("store exploded".into()).user_message(&m),
            m.bind_failed
        );
        assert_eq!(
            SignInError::AuthRejected(AuthErrorKind::RateLimited).user_message(&m),
            m.rate_limited
        );
    }
}
