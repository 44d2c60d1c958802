// Credential provider seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Closed classification of provider failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthErrorKind {
    InvalidEmail,
    IdentityNotFound,
    WrongCredential,
    Disabled,
    RateLimited,
    DuplicateIdentity,
    Unknown,
}

impl AuthErrorKind {
    /// Classify an opaque provider code.
    ///
    /// Codes are compared case-insensitively after stripping one optional
    /// `auth/` namespace prefix. Anything unrecognized is `Unknown`.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_ascii_lowercase();
        let bare = code.strip_prefix("auth/").unwrap_or(&code);

        match bare {
            "invalid-email" => AuthErrorKind::InvalidEmail,
            "user-not-found" | "identity-not-found" => AuthErrorKind::IdentityNotFound,
            "wrong-password" | "invalid-credential" | "wrong-credential" => {
                AuthErrorKind::WrongCredential
            }
            "user-disabled" | "disabled" => AuthErrorKind::Disabled,
            "too-many-requests" | "rate-limited" => AuthErrorKind::RateLimited,
            "email-already-in-use" | "duplicate-identity" => AuthErrorKind::DuplicateIdentity,
            _ => AuthErrorKind::Unknown,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthErrorKind::InvalidEmail => "invalid-email",
            AuthErrorKind::IdentityNotFound => "identity-not-found",
            AuthErrorKind::WrongCredential => "wrong-credential",
            AuthErrorKind::Disabled => "disabled",
            AuthErrorKind::RateLimited => "rate-limited",
            AuthErrorKind::DuplicateIdentity => "duplicate-identity",
            AuthErrorKind::Unknown => "unknown",
        }
    }
}

/// Failure reported by a credential provider. `code` keeps the provider's
/// raw code for logs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("credential provider error ({code}): {message}")]
pub struct ProviderError {
    pub kind: AuthErrorKind,
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code().to_string(),
            message: message.into(),
        }
    }

    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind: AuthErrorKind::from_code(&code),
            code,
            message: message.into(),
        }
    }
}

/// An authenticatable account owned by the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Identity changes pushed by the provider: `Some` on sign-in, `None` on
/// sign-out.
pub type IdentityStream = broadcast::Receiver<Option<Identity>>;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, ProviderError>;

    async fn create_identity(&self, email: &str, password: &str)
        -> Result<Identity, ProviderError>;

    async fn set_display_name(&self, identity: &Identity, name: &str)
        -> Result<(), ProviderError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Subscribe to session changes, when the provider has a session stream.
    fn watch_identity(&self) -> Option<IdentityStream> {
        None
    }
}
