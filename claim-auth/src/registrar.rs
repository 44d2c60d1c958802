// Administrative side of reserve-then-claim: creating reservations and
// registering staff accounts up front.

use std::sync::Arc;

use chrono::Utc;
use claim_core::{
    bail_claim, ClaimError, ClaimResult, CollectionKind, DirectoryStore, Fields, Record, RecordRef,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::locator::SEARCH_ORDER;
use crate::options::ClaimOptions;
use crate::profile::Role;
use crate::provider::{AuthErrorKind, CredentialProvider};
use crate::validation::is_valid_email;

const CREATED_AT: &str = "createdAt";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationDraft {
    pub email: String,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub role: Option<Role>,
}

/// Full replacement of a staff record's editable fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffEdit {
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStaff {
    pub display_name: String,
    pub email: String,
    pub password: String,
}

pub struct Registrar {
    store: Arc<dyn DirectoryStore>,
    provider: Option<Arc<dyn CredentialProvider>>,
    options: ClaimOptions,
}

impl Registrar {
    pub fn new(store: Arc<dyn DirectoryStore>, options: ClaimOptions) -> Self {
        Self {
            store,
            provider: None,
            options,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    fn checked_email(email: &str) -> ClaimResult<String> {
        let email = email.trim();
        if !is_valid_email(email) {
            bail_claim!(bad_request, "Invalid email address: '{}'", email);
        }
        Ok(email.to_string())
    }

    /// First record, claimed or not, already answering to `email`.
    async fn holder_of(&self, email: &str) -> ClaimResult<Option<RecordRef>> {
        for probe in SEARCH_ORDER.iter() {
            let field = probe.field_name(&self.options.fields);
            let value = probe.normalizer.apply(email);
            if let Some(record) = self.store.find_one(probe.kind, field, &value).await? {
                return Ok(Some(record.reference));
            }
        }
        Ok(None)
    }

    async fn existing(&self, reference: &RecordRef) -> ClaimResult<Record> {
        self.store.get(reference).await?.ok_or_else(|| {
            ClaimError::not_found(format!("Record '{reference}' not found")).into_anyhow()
        })
    }

    fn role_of(&self, record: &Record) -> Option<Role> {
        record
            .str_field(&self.options.fields.role)
            .and_then(Role::normalize)
    }

    /// Pre-register `draft.email` in `kind` so its owner can claim it on
    /// first sign-in.
    #[instrument(skip_all, fields(%kind))]
    pub async fn reserve(&self, kind: CollectionKind, draft: ReservationDraft) -> ClaimResult<RecordRef> {
        let email = Self::checked_email(&draft.email)?;
        if self.holder_of(&email).await?.is_some() {
            bail_claim!(conflict, "'{}' already has a reservation", email);
        }

        let names = &self.options.fields;
        let mut fields = Fields::new();
        fields.insert(names.email.clone(), Value::String(email.clone()));
        fields.insert(names.email_lower.clone(), Value::String(email.to_lowercase()));

        let given_key = self.options.given_name_keys.first().unwrap_or(&names.display_name);
        if let Some(given) = non_blank(draft.given_name.as_deref()) {
            fields.insert(given_key.clone(), Value::String(given));
        }
        if let (Some(key), Some(surname)) = (
            self.options.surname_keys.first(),
            non_blank(draft.surname.as_deref()),
        ) {
            fields.insert(key.clone(), Value::String(surname));
        }
        if let Some(role) = draft.role {
            fields.insert(names.role.clone(), Value::String(role.as_str().to_string()));
        }
        fields.insert(CREATED_AT.to_string(), Value::String(Utc::now().to_rfc3339()));

        let reference = self.store.insert(kind, None, fields).await?;
        info!(record = %reference, "reservation created");
        Ok(reference)
    }

    /// Create the credential identity right away and a STAFF record keyed
    /// by its uid. No reservation step is involved.
    #[instrument(skip_all)]
    pub async fn register_staff(&self, staff: NewStaff) -> ClaimResult<RecordRef> {
        let email = Self::checked_email(&staff.email)?;
        if staff.password.trim().is_empty() {
            bail_claim!(bad_request, "A password is required");
        }
        let display_name = non_blank(Some(staff.display_name.as_str()))
            .ok_or_else(|| ClaimError::bad_request("A display name is required").into_anyhow())?;

        let provider = self.provider.as_ref().ok_or_else(|| {
            ClaimError::unavailable("credential provider is not configured").into_anyhow()
        })?;

        let identity = provider
            .create_identity(&email, &staff.password)
            .await
            .map_err(|err| match err.kind {
                AuthErrorKind::DuplicateIdentity => {
                    ClaimError::conflict(format!("'{email}' is already registered")).into_anyhow()
                }
                AuthErrorKind::InvalidEmail => {
                    ClaimError::bad_request(format!("Invalid email address: '{email}'")).into_anyhow()
                }
                _ => ClaimError::general_error("Could not create the account")
                    .with_source(err.into())
                    .into_anyhow(),
            })?;

        if let Err(err) = provider.set_display_name(&identity, &display_name).await {
            warn!(code = %err.code, uid = %identity.uid, "could not set display name");
        }

        let names = &self.options.fields;
        let mut fields = Fields::new();
        fields.insert(names.uid.clone(), Value::String(identity.uid.clone()));
        fields.insert(names.email.clone(), Value::String(email.to_lowercase()));
        fields.insert(names.email_lower.clone(), Value::String(email.to_lowercase()));
        fields.insert(names.display_name.clone(), Value::String(display_name));
        fields.insert(names.role.clone(), Value::String(Role::Staff.as_str().to_string()));
        fields.insert(CREATED_AT.to_string(), Value::String(Utc::now().to_rfc3339()));

        let reference = self
            .store
            .insert(CollectionKind::Staff, Some(&identity.uid), fields)
            .await?;
        info!(record = %reference, "staff registered");
        Ok(reference)
    }

    /// Replace name, both email spellings and role of an existing record.
    #[instrument(skip_all, fields(record = %reference))]
    pub async fn edit_staff(&self, reference: &RecordRef, edit: StaffEdit) -> ClaimResult<()> {
        let display_name = non_blank(Some(edit.display_name.as_str()));
        let (Some(display_name), false) = (display_name, edit.email.trim().is_empty()) else {
            bail_claim!(bad_request, "A display name and an email are required");
        };
        let email = Self::checked_email(&edit.email)?;

        self.existing(reference).await?;
        if let Some(holder) = self.holder_of(&email).await? {
            if &holder != reference {
                bail_claim!(conflict, "'{}' already belongs to {}", email, holder);
            }
        }

        let names = &self.options.fields;
        let mut fields = Fields::new();
        fields.insert(names.display_name.clone(), Value::String(display_name));
        fields.insert(names.email.clone(), Value::String(email.clone()));
        fields.insert(names.email_lower.clone(), Value::String(email.to_lowercase()));
        fields.insert(names.role.clone(), Value::String(edit.role.as_str().to_string()));

        self.store.update(reference, fields).await?;
        info!("staff record edited");
        Ok(())
    }

    #[instrument(skip_all, fields(record = %reference, %role))]
    pub async fn change_role(&self, reference: &RecordRef, role: Role) -> ClaimResult<()> {
        self.existing(reference).await?;

        let mut fields = Fields::new();
        fields.insert(
            self.options.fields.role.clone(),
            Value::String(role.as_str().to_string()),
        );
        self.store.update(reference, fields).await?;
        info!("role changed");
        Ok(())
    }

    /// Delete a staff record. Administrators must be demoted first.
    #[instrument(skip_all, fields(record = %reference))]
    pub async fn remove_staff(&self, reference: &RecordRef) -> ClaimResult<()> {
        let record = self.existing(reference).await?;
        if self.role_of(&record) != Some(Role::Staff) {
            bail_claim!(
                forbidden,
                "Only staff records can be removed; change the role of '{}' first",
                reference
            );
        }

        self.store.delete(reference).await?;
        info!("staff record removed");
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim_core::{ErrorKind, MemoryDirectory};

    #[tokio::test]
    async fn reserve_writes_both_email_spellings_and_names() {
        let dir = Arc::new(MemoryDirectory::new());
        let registrar = Registrar::new(dir.clone(), ClaimOptions::default());

        let reference = registrar
            .reserve(
                CollectionKind::Staff,
                ReservationDraft {
                    email: " Jane@X.com ".into(),
                    given_name: Some("Jane".into()),
                    surname: Some("Doe".into()),
                    role: Some(Role::Staff),
                },
            )
            .await
            .unwrap();

        let record = dir.record(&reference).unwrap();
        assert_eq!(record.str_field("email"), Some("Jane@X.com"));
        assert_eq!(record.str_field("emailLower"), Some("jane@x.com"));
        assert_eq!(record.str_field("displayName"), Some("Jane"));
        assert_eq!(record.str_field("lastName"), Some("Doe"));
        assert_eq!(record.str_field("role"), Some("staff"));
        assert!(record.str_field("createdAt").is_some());
        assert!(record.str_field("uid").is_none());
    }

    #[tokio::test]
    async fn second_reservation_for_same_email_is_a_conflict() {
        let dir = Arc::new(MemoryDirectory::new());
        let registrar = Registrar::new(dir.clone(), ClaimOptions::default());
        let draft = ReservationDraft {
            email: "a@b.com".into(),
            ..ReservationDraft::default()
        };

        registrar.reserve(CollectionKind::Customer, draft.clone()).await.unwrap();
        let err = registrar
            .reserve(CollectionKind::Staff, ReservationDraft { email: "A@B.com".into(), ..draft })
            .await
            .unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn invalid_email_is_refused() {
        let dir = Arc::new(MemoryDirectory::new());
        let registrar = Registrar::new(dir.clone(), ClaimOptions::default());
        let err = registrar
            .reserve(
                CollectionKind::Customer,
                ReservationDraft {
                    email: "nope".into(),
                    ..ReservationDraft::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::BadRequest);
        assert_eq!(dir.len(CollectionKind::Customer), 0);
    }

    #[tokio::test]
    async fn register_staff_without_provider_is_unavailable() {
        let dir = Arc::new(MemoryDirectory::new());
        let registrar = Registrar::new(dir, ClaimOptions::default());
        let err = registrar
            .register_staff(NewStaff {
                display_name: "Ana".into(),
                email: "ana@x.com".into(),
                password: "secret1".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::Unavailable);
    }

    async fn staff_record(dir: &MemoryDirectory, id: &str, email: &str, role: &str) -> RecordRef {
        dir.insert(
            CollectionKind::Staff,
            Some(id),
            Fields::from_iter([
                ("email".to_string(), Value::String(email.into())),
                ("emailLower".to_string(), Value::String(email.to_lowercase())),
                ("role".to_string(), Value::String(role.into())),
            ]),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn edit_rewrites_name_both_emails_and_role() {
        let dir = Arc::new(MemoryDirectory::new());
        let registrar = Registrar::new(dir.clone(), ClaimOptions::default());
        let reference = staff_record(&dir, "s1", "ana@x.com", "barbero").await;

        registrar
            .edit_staff(
                &reference,
                StaffEdit {
                    display_name: " Ana Ruiz ".into(),
                    email: "Ana.Ruiz@X.com".into(),
                    role: Role::Admin,
                },
            )
            .await
            .unwrap();

        let record = dir.record(&reference).unwrap();
        assert_eq!(record.str_field("displayName"), Some("Ana Ruiz"));
        assert_eq!(record.str_field("email"), Some("Ana.Ruiz@X.com"));
        assert_eq!(record.str_field("emailLower"), Some("ana.ruiz@x.com"));
        assert_eq!(record.str_field("role"), Some("admin"));
    }

    #[tokio::test]
    async fn edit_refuses_blank_fields_and_taken_emails() {
        let dir = Arc::new(MemoryDirectory::new());
        let registrar = Registrar::new(dir.clone(), ClaimOptions::default());
        let ana = staff_record(&dir, "s1", "ana@x.com", "staff").await;
        staff_record(&dir, "s2", "leo@x.com", "staff").await;

        let edit = StaffEdit {
            display_name: "  ".into(),
            email: "ana@x.com".into(),
            role: Role::Staff,
        };
        let err = registrar.edit_staff(&ana, edit.clone()).await.unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::BadRequest);

        let taken = StaffEdit {
            display_name: "Ana".into(),
            email: "LEO@x.com".into(),
            ..edit.clone()
        };
        let err = registrar.edit_staff(&ana, taken).await.unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::Conflict);

        let missing = RecordRef::new(CollectionKind::Staff, "nope");
        let err = registrar
            .edit_staff(&missing, StaffEdit { display_name: "X".into(), ..edit })
            .await
            .unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::NotFound);
        assert_eq!(dir.record(&ana).unwrap().str_field("email"), Some("ana@x.com"));
    }

    #[tokio::test]
    async fn only_staff_records_can_be_removed() {
        let dir = Arc::new(MemoryDirectory::new());
        let registrar = Registrar::new(dir.clone(), ClaimOptions::default());
        let boss = staff_record(&dir, "a1", "boss@x.com", "admin").await;

        let err = registrar.remove_staff(&boss).await.unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::Forbidden);
        assert!(dir.record(&boss).is_some());

        registrar.change_role(&boss, Role::Staff).await.unwrap();
        assert_eq!(dir.record(&boss).unwrap().str_field("role"), Some("staff"));
        registrar.remove_staff(&boss).await.unwrap();
        assert!(dir.record(&boss).is_none());

        let err = registrar.change_role(&boss, Role::Admin).await.unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::NotFound);
    }
}
