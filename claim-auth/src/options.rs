// Claim options and configuration.

use claim_core::ClaimConfigSnapshot;
use serde::{Deserialize, Serialize};

use crate::messages::Locale;

/// Field-name spellings used on reservation records.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldNames {
    /// Email as typed by whoever created the record
    pub email: String,
    /// Lower-cased email
    pub email_lower: String,
    /// Linked credential uid, written once by the binder
    pub uid: String,
    /// Display name written back on binding
    pub display_name: String,
    /// Role marker used by profile resolution
    pub role: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            email: "email".to_string(),
            email_lower: "emailLower".to_string(),
            uid: "uid".to_string(),
            display_name: "displayName".to_string(),
            role: "role".to_string(),
        }
    }
}

impl FieldNames {
    pub fn validate(&self) -> Result<(), String> {
        let all = [
            ("email", &self.email),
            ("email_lower", &self.email_lower),
            ("uid", &self.uid),
            ("display_name", &self.display_name),
            ("role", &self.role),
        ];
        for (name, value) in all {
            if value.trim().is_empty() {
                return Err(format!("Field name '{name}' cannot be empty"));
            }
        }
        if self.email == self.email_lower {
            return Err("Raw and lower-cased email fields must differ".to_string());
        }
        if self.uid == self.email || self.uid == self.email_lower {
            return Err("The uid field cannot share a name with an email field".to_string());
        }
        Ok(())
    }
}

/// Main provisioning configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimOptions {
    pub fields: FieldNames,
    /// Given-name keys, highest priority first
    pub given_name_keys: Vec<String>,
    /// Surname keys, highest priority first
    pub surname_keys: Vec<String>,
    /// Email that is treated as an administrator when no role resolves
    pub fallback_admin_email: Option<String>,
    pub locale: Locale,
}

impl Default for ClaimOptions {
    fn default() -> Self {
        Self {
            fields: FieldNames::default(),
            given_name_keys: vec![
                "displayName".to_string(),
                "nombre".to_string(),
                "Nombre".to_string(),
            ],
            surname_keys: vec![
                "lastName".to_string(),
                "apellido".to_string(),
                "Apellido".to_string(),
            ],
            fallback_admin_email: None,
            locale: Locale::default(),
        }
    }
}

impl ClaimOptions {
    pub fn validate(&self) -> Result<(), String> {
        self.fields
            .validate()
            .map_err(|e| format!("Field names validation failed: {e}"))?;

        if self.given_name_keys.is_empty() && self.surname_keys.is_empty() {
            return Err("At least one name key must be configured".to_string());
        }
        if self
            .given_name_keys
            .iter()
            .chain(self.surname_keys.iter())
            .any(|k| k.trim().is_empty())
        {
            return Err("Name keys cannot be empty".to_string());
        }

        if let Some(email) = &self.fallback_admin_email {
            if !crate::validation::is_valid_email(email) {
                return Err(format!("Fallback admin email '{email}' is not a valid address"));
            }
        }

        Ok(())
    }

    pub fn builder() -> ClaimOptionsBuilder {
        ClaimOptionsBuilder::new()
    }

    /// Defaults overlaid with configuration keys:
    /// `fields.email`, `fields.email_lower`, `fields.uid`, `fields.display_name`,
    /// `fields.role`, `names.given`, `names.surname` (comma separated),
    /// `admin.fallback_email`, `messages.locale`.
    pub fn from_config(config: &ClaimConfigSnapshot) -> Result<Self, String> {
        let mut options = Self::default();

        let fields = &mut options.fields;
        for (key, slot) in [
            ("fields.email", &mut fields.email),
            ("fields.email_lower", &mut fields.email_lower),
            ("fields.uid", &mut fields.uid),
            ("fields.display_name", &mut fields.display_name),
            ("fields.role", &mut fields.role),
        ] {
            if let Some(v) = config.get_string(key) {
                *slot = v.trim().to_string();
            }
        }

        if let Some(keys) = config.get_list("names.given") {
            options.given_name_keys = keys;
        }
        if let Some(keys) = config.get_list("names.surname") {
            options.surname_keys = keys;
        }
        if let Some(email) = config.get("admin.fallback_email") {
            let email = email.trim();
            if !email.is_empty() {
                options.fallback_admin_email = Some(email.to_lowercase());
            }
        }
        if let Some(locale) = config.get("messages.locale") {
            options.locale = locale.parse()?;
        }

        options.validate()?;
        Ok(options)
    }
}

/// Builder pattern for ClaimOptions configuration
#[derive(Clone, Debug, Default)]
pub struct ClaimOptionsBuilder {
    fields: Option<FieldNames>,
    given_name_keys: Option<Vec<String>>,
    surname_keys: Option<Vec<String>>,
    fallback_admin_email: Option<String>,
    locale: Option<Locale>,
}

impl ClaimOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(mut self, fields: FieldNames) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn given_name_keys(mut self, keys: &[&str]) -> Self {
        self.given_name_keys = Some(keys.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn surname_keys(mut self, keys: &[&str]) -> Self {
        self.surname_keys = Some(keys.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn fallback_admin_email(mut self, email: impl Into<String>) -> Self {
        self.fallback_admin_email = Some(email.into().trim().to_lowercase());
        self
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = Some(locale);
        self
    }

    pub fn build(self) -> ClaimOptions {
        let defaults = ClaimOptions::default();
        ClaimOptions {
            fields: self.fields.unwrap_or(defaults.fields),
            given_name_keys: self.given_name_keys.unwrap_or(defaults.given_name_keys),
            surname_keys: self.surname_keys.unwrap_or(defaults.surname_keys),
            fallback_admin_email: self.fallback_admin_email,
            locale: self.locale.unwrap_or(defaults.locale),
        }
    }

    pub fn build_validated(self) -> Result<ClaimOptions, String> {
        let options = self.build();
        options.validate()?;
        Ok(options)
    }
}
