//! Directory store abstraction.
//!
//! Records are open JSON objects living in one of two collections. Sign-in
//! only needs equality lookups and partial updates; `insert` and `delete`
//! exist for the administrative side.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ClaimError, ClaimResult};

/// Field mapping of a record.
pub type Fields = Map<String, Value>;

/// Which directory a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Staff,
    Customer,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Staff => "staff",
            CollectionKind::Customer => "customer",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enough to address a record for a later write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub kind: CollectionKind,
    pub id: String,
}

impl RecordRef {
    pub fn new(kind: CollectionKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "ref")]
    pub reference: RecordRef,
    pub fields: Fields,
}

impl Record {
    pub fn kind(&self) -> CollectionKind {
        self.reference.kind
    }

    pub fn id(&self) -> &str {
        &self.reference.id
    }

    /// String value of `key`, if present and a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }
}

/// Non-blank string held in `field`, read as the record's owner.
pub fn owner_of<'a>(fields: &'a Fields, field: &str) -> Option<&'a str> {
    match fields.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Document store holding reservation records.
///
/// Implementations report an unreachable backend with
/// `ClaimError::unavailable`; callers treat that as a soft miss.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// First record in `kind` whose `field` equals `value`, if any.
    async fn find_one(
        &self,
        kind: CollectionKind,
        field: &str,
        value: &str,
    ) -> ClaimResult<Option<Record>>;

    /// The addressed record as currently stored.
    async fn get(&self, reference: &RecordRef) -> ClaimResult<Option<Record>>;

    /// Merge `fields` into the addressed record.
    async fn update(&self, reference: &RecordRef, fields: Fields) -> ClaimResult<()>;

    /// Merge `fields` only while the record's `owner_field` is unset or
    /// already holds `owner`; otherwise fail with `Conflict`.
    ///
    /// The default reads then writes. Stores able to check and write in one
    /// step should override it.
    async fn update_owned(
        &self,
        reference: &RecordRef,
        owner_field: &str,
        owner: &str,
        fields: Fields,
    ) -> ClaimResult<()> {
        let current = self.get(reference).await?.ok_or_else(|| {
            ClaimError::not_found(format!("Record '{reference}' not found")).into_anyhow()
        })?;
        if owner_of(&current.fields, owner_field).is_some_and(|existing| existing != owner) {
            return Err(ClaimError::conflict(format!(
                "Record '{reference}' is already owned by another identity"
            ))
            .into_anyhow());
        }
        self.update(reference, fields).await
    }

    /// Create a record. A generated id is used when `id` is `None`.
    async fn insert(
        &self,
        kind: CollectionKind,
        id: Option<&str>,
        fields: Fields,
    ) -> ClaimResult<RecordRef>;

    /// Remove the addressed record. Missing records are `NotFound`.
    async fn delete(&self, reference: &RecordRef) -> ClaimResult<()>;
}
