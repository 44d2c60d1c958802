//! User-facing message catalog.
//!
//! Every failure leaving the sign-in service is rendered through one of these
//! strings. Provider error details never reach the caller.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::provider::AuthErrorKind;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Es,
    En,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "es" => Ok(Locale::Es),
            "en" => Ok(Locale::En),
            other => Err(format!("Unsupported locale: '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Messages {
    pub required_fields: String,
    pub invalid_email: String,
    pub identity_not_found: String,
    pub wrong_credential: String,
    pub disabled: String,
    pub rate_limited: String,
    pub not_reserved: String,
    pub provision_race: String,
    pub generic: String,
    pub bind_failed: String,
    pub reset_sent: String,
    pub reset_needs_email: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self::spanish()
    }
}

impl Messages {
    pub fn for_locale(locale: Locale) -> Self {
        match locale {
            Locale::Es => Self::spanish(),
            Locale::En => Self::english(),
        }
    }

    pub fn spanish() -> Self {
        Self {
            required_fields: "Completa ambos campos para continuar.".into(),
            invalid_email: "El correo no tiene un formato válido.".into(),
            identity_not_found: "No encontramos una cuenta con ese correo.".into(),
            wrong_credential: "Contraseña incorrecta. Intenta de nuevo.".into(),
            disabled: "La cuenta está deshabilitada. Contacta al administrador.".into(),
            rate_limited: "Demasiados intentos fallidos. Espera unos minutos e intenta de nuevo."
                .into(),
            not_reserved: "Tu correo no fue registrado por un administrador. Solicita acceso para continuar."
                .into(),
            provision_race: "Alguien acaba de crear esta cuenta. Intenta iniciar sesión de nuevo."
                .into(),
            generic: "No pudimos iniciar sesión. Verifica tu correo y contraseña.".into(),
            bind_failed: "Tu cuenta fue creada pero no pudimos vincular tu perfil. Contacta al administrador."
                .into(),
            reset_sent: "Te enviamos un correo para restablecer tu contraseña.".into(),
            reset_needs_email: "Ingresa tu correo para recuperar la contraseña.".into(),
        }
    }

    pub fn english() -> Self {
        Self {
            required_fields: "Fill in both fields to continue.".into(),
            invalid_email: "The email address is not valid.".into(),
            identity_not_found: "We couldn't find an account with that email.".into(),
            wrong_credential: "Wrong password. Please try again.".into(),
            disabled: "This account is disabled. Contact your administrator.".into(),
            rate_limited: "Too many failed attempts. Wait a few minutes and try again.".into(),
            not_reserved: "Your email has not been registered by an administrator. Request access to continue."
                .into(),
            provision_race: "Someone just created this account. Try signing in again.".into(),
            generic: "We couldn't sign you in. Check your email and password.".into(),
            bind_failed: "Your account was created but we couldn't link your profile. Contact your administrator."
                .into(),
            reset_sent: "We sent you an email to reset your password.".into(),
            reset_needs_email: "Enter your email to recover your password.".into(),
        }
    }

    /// Message for a provider rejection. Kinds without a dedicated entry
    /// fall back to the generic message.
    pub fn for_kind(&self, kind: AuthErrorKind) -> &str {
        match kind {
            AuthErrorKind::InvalidEmail => &self.invalid_email,
            AuthErrorKind::IdentityNotFound => &self.identity_not_found,
            AuthErrorKind::WrongCredential => &self.wrong_credential,
            AuthErrorKind::Disabled => &self.disabled,
            AuthErrorKind::RateLimited => &self.rate_limited,
            AuthErrorKind::DuplicateIdentity => &self.provision_race,
            AuthErrorKind::Unknown => &self.generic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_parsing_is_case_insensitive() {
        assert_eq!(" EN ".parse::<Locale>().unwrap(), Locale::En);
        assert!("pt".parse::<Locale>().is_err());
    }

    #[test]
    fn unknown_kind_uses_generic_message() {
        let m = Messages::english();
        assert_eq!(m.for_kind(AuthErrorKind::Unknown), m.generic);
        assert_eq!(m.for_kind(AuthErrorKind::Disabled), m.disabled);
    }
}
