// Profile resolution: role and display name for a signed-in identity.

use std::fmt;
use std::sync::Arc;

use claim_core::{ClaimError, ClaimResult, CollectionKind, DirectoryStore, ErrorKind, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::binder::derive_display_name;
use crate::options::ClaimOptions;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    /// Map a free-form role marker to a role.
    pub fn normalize(value: &str) -> Option<Role> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "" => None,
            "admin" | "administrador" | "administrator" => Some(Role::Admin),
            "staff" | "barbero" | "barberos" => Some(Role::Staff),
            s if s.starts_with("barber") => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub role: Option<Role>,
    pub display_name: Option<String>,
}

pub struct ProfileResolver {
    store: Option<Arc<dyn DirectoryStore>>,
    options: ClaimOptions,
}

impl ProfileResolver {
    pub fn new(store: Option<Arc<dyn DirectoryStore>>, options: ClaimOptions) -> Self {
        Self { store, options }
    }

    fn role_of(&self, record: &Record) -> Option<Role> {
        let marked = record
            .fields
            .get(&self.options.fields.role)
            .and_then(Value::as_str)
            .and_then(Role::normalize);
        match marked {
            Some(role) => Some(role),
            None if record.kind() == CollectionKind::Staff => Some(Role::Staff),
            None => None,
        }
    }

    /// Role and display name for `uid`, looking the identity up by uid first
    /// and by lower-cased email after. An administrator match wins
    /// immediately; otherwise the first role and first name found are kept.
    ///
    /// Unavailable or forbidden lookups are skipped. Other store failures
    /// are returned.
    pub async fn resolve(&self, uid: &str, email: Option<&str>) -> ClaimResult<ResolvedProfile> {
        let mut resolved = ResolvedProfile::default();
        let Some(store) = self.store.as_ref() else {
            return Ok(resolved);
        };

        let fields = &self.options.fields;
        let mut probes: Vec<(CollectionKind, &str, String)> = vec![
            (CollectionKind::Customer, fields.uid.as_str(), uid.to_string()),
            (CollectionKind::Staff, fields.uid.as_str(), uid.to_string()),
        ];
        if let Some(email) = email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()) {
            probes.extend([
                (CollectionKind::Customer, fields.email.as_str(), email.clone()),
                (CollectionKind::Customer, fields.email_lower.as_str(), email.clone()),
                (CollectionKind::Staff, fields.email.as_str(), email.clone()),
                (CollectionKind::Staff, fields.email_lower.as_str(), email),
            ]);
        }

        for (kind, field, value) in probes {
            let record = match store.find_one(kind, field, &value).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(err) => match ClaimError::kind_of(&err) {
                    ErrorKind::Unavailable => {
                        warn!(error = %err, "directory store unavailable during profile lookup");
                        break;
                    }
                    ErrorKind::Forbidden => {
                        warn!(error = %err, %kind, field, "profile lookup not permitted");
                        continue;
                    }
                    _ => return Err(err),
                },
            };

            let role = self.role_of(&record);
            let name = derive_display_name(
                &record.fields,
                &self.options.given_name_keys,
                &self.options.surname_keys,
            );
            debug!(record = %record.reference, ?role, "profile candidate");

            if role == Some(Role::Admin) {
                return Ok(ResolvedProfile {
                    role,
                    display_name: name,
                });
            }
            if resolved.role.is_none() {
                resolved.role = role;
            }
            if resolved.display_name.is_none() {
                resolved.display_name = name;
            }
        }

        Ok(resolved)
    }
}
