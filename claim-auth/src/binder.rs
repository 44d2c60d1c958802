// Identity binding: writes the credential uid back onto the reservation.

use std::sync::Arc;

use claim_core::{ClaimError, ClaimResult, DirectoryStore, Fields};
use serde_json::Value;
use tracing::{info, instrument};

use crate::locator::Reservation;
use crate::options::FieldNames;

/// First non-blank string among `keys`, in order.
fn first_value(fields: &Fields, keys: &[String]) -> Option<String> {
    keys.iter().find_map(|key| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Display name from a record's name fields.
///
/// Given name and surname are joined with one space; when the given name
/// already ends with the surname it is used alone.
pub fn derive_display_name(
    fields: &Fields,
    given_name_keys: &[String],
    surname_keys: &[String],
) -> Option<String> {
    let given = first_value(fields, given_name_keys);
    let surname = first_value(fields, surname_keys);

    match (given, surname) {
        (Some(given), Some(surname)) => {
            if given.to_lowercase().ends_with(&surname.to_lowercase()) {
                Some(given)
            } else {
                Some(format!("{given} {surname}").trim().to_string())
            }
        }
        (Some(given), None) => Some(given),
        (None, Some(surname)) => Some(surname),
        (None, None) => None,
    }
}

pub struct IdentityBinder {
    store: Option<Arc<dyn DirectoryStore>>,
    fields: FieldNames,
}

impl IdentityBinder {
    pub fn new(store: Option<Arc<dyn DirectoryStore>>, fields: FieldNames) -> Self {
        Self { store, fields }
    }

    /// Partial update written on binding. The display name is only
    /// included when non-blank.
    pub fn binding_fields(&self, uid: &str, email: &str, display_name: Option<&str>) -> Fields {
        let mut patch = Fields::new();
        patch.insert(self.fields.uid.clone(), Value::String(uid.to_string()));
        patch.insert(self.fields.email.clone(), Value::String(email.to_string()));
        patch.insert(
            self.fields.email_lower.clone(),
            Value::String(email.to_lowercase()),
        );
        if let Some(name) = display_name.map(str::trim).filter(|s| !s.is_empty()) {
            patch.insert(self.fields.display_name.clone(), Value::String(name.to_string()));
        }
        patch
    }

    /// Single write linking `uid` to the reservation.
    ///
    /// Safe to repeat with the same inputs. Fails with `Conflict` when the
    /// stored record is already linked to another uid, whatever the
    /// `reservation` snapshot says, and with `Unavailable` when no store is
    /// configured.
    #[instrument(skip_all, fields(record = %reservation.reference(), uid = %uid))]
    pub async fn bind(
        &self,
        reservation: &Reservation,
        uid: &str,
        email: &str,
        display_name: Option<&str>,
    ) -> ClaimResult<()> {
        let store = self.store.as_ref().ok_or_else(|| {
            ClaimError::unavailable("directory store is not configured").into_anyhow()
        })?;

        let patch = self.binding_fields(uid, email, display_name);
        store
            .update_owned(reservation.reference(), &self.fields.uid, uid, patch)
            .await?;

        info!("reservation bound to identity");
        Ok(())
    }
}
