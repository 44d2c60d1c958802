use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::{ClaimError, ClaimResult};
use crate::store::{owner_of, CollectionKind, DirectoryStore, Fields, Record, RecordRef};

type Collection = Vec<(String, Fields)>;

/// In-process directory. Records keep insertion order, so `find_one`
/// returns the oldest match.
pub struct MemoryDirectory {
    collections: Mutex<HashMap<CollectionKind, Collection>>,
    available: AtomicBool,
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every call fails with `Unavailable` while off.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of a record, bypassing availability.
    pub fn record(&self, reference: &RecordRef) -> Option<Record> {
        let guard = self.collections.lock().ok()?;
        guard
            .get(&reference.kind)?
            .iter()
            .find(|(id, _)| id == &reference.id)
            .map(|(id, fields)| Record {
                reference: RecordRef::new(reference.kind, id.clone()),
                fields: fields.clone(),
            })
    }

    pub fn len(&self, kind: CollectionKind) -> usize {
        self.collections
            .lock()
            .map(|g| g.get(&kind).map(|c| c.len()).unwrap_or(0))
            .unwrap_or(0)
    }

    fn ensure_available(&self) -> ClaimResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClaimError::unavailable("directory store is offline").into_anyhow())
        }
    }

    fn lock(&self) -> ClaimResult<MutexGuard<'_, HashMap<CollectionKind, Collection>>> {
        self.collections
            .lock()
            .map_err(|_| ClaimError::general_error("directory lock poisoned").into_anyhow())
    }
}

fn entry_mut<'a>(
    collections: &'a mut HashMap<CollectionKind, Collection>,
    reference: &RecordRef,
) -> ClaimResult<&'a mut Fields> {
    collections
        .get_mut(&reference.kind)
        .and_then(|records| records.iter_mut().find(|(id, _)| id == &reference.id))
        .map(|(_, f)| f)
        .ok_or_else(|| ClaimError::not_found(format!("Record '{reference}' not found")).into_anyhow())
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn find_one(
        &self,
        kind: CollectionKind,
        field: &str,
        value: &str,
    ) -> ClaimResult<Option<Record>> {
        self.ensure_available()?;
        let guard = self.lock()?;

        let found = guard.get(&kind).and_then(|records| {
            records
                .iter()
                .find(|(_, fields)| fields.get(field).and_then(Value::as_str) == Some(value))
        });

        Ok(found.map(|(id, fields)| Record {
            reference: RecordRef::new(kind, id.clone()),
            fields: fields.clone(),
        }))
    }

    async fn get(&self, reference: &RecordRef) -> ClaimResult<Option<Record>> {
        self.ensure_available()?;
        Ok(self.record(reference))
    }

    async fn update(&self, reference: &RecordRef, fields: Fields) -> ClaimResult<()> {
        self.ensure_available()?;
        let mut guard = self.lock()?;
        let existing = entry_mut(&mut guard, reference)?;

        existing.extend(fields);
        Ok(())
    }

    async fn update_owned(
        &self,
        reference: &RecordRef,
        owner_field: &str,
        owner: &str,
        fields: Fields,
    ) -> ClaimResult<()> {
        self.ensure_available()?;
        let mut guard = self.lock()?;
        let existing = entry_mut(&mut guard, reference)?;

        if owner_of(existing, owner_field).is_some_and(|current| current != owner) {
            return Err(ClaimError::conflict(format!(
                "Record '{reference}' is already owned by another identity"
            ))
            .into_anyhow());
        }
        existing.extend(fields);
        Ok(())
    }

    async fn insert(
        &self,
        kind: CollectionKind,
        id: Option<&str>,
        fields: Fields,
    ) -> ClaimResult<RecordRef> {
        self.ensure_available()?;
        let mut guard = self.lock()?;
        let records = guard.entry(kind).or_default();

        let id = match id {
            Some(id) => {
                if records.iter().any(|(existing, _)| existing == id) {
                    return Err(ClaimError::conflict(format!(
                        "Record '{kind}/{id}' already exists"
                    ))
                    .into_anyhow());
                }
                id.to_string()
            }
            None => Uuid::new_v4().to_string(),
        };

        records.push((id.clone(), fields));
        Ok(RecordRef::new(kind, id))
    }

    async fn delete(&self, reference: &RecordRef) -> ClaimResult<()> {
        self.ensure_available()?;
        let mut guard = self.lock()?;
        let records = guard.entry(reference.kind).or_default();

        let before = records.len();
        records.retain(|(id, _)| id != &reference.id);
        if records.len() == before {
            return Err(
                ClaimError::not_found(format!("Record '{reference}' not found")).into_anyhow(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn find_one_returns_oldest_match_in_the_right_collection() {
        let dir = MemoryDirectory::new();
        let first = dir
            .insert(CollectionKind::Staff, None, fields(json!({"email": "a@x.com"})))
            .await
            .unwrap();
        dir.insert(CollectionKind::Staff, None, fields(json!({"email": "a@x.com"})))
            .await
            .unwrap();
        dir.insert(CollectionKind::Customer, Some("c1"), fields(json!({"email": "b@x.com"})))
            .await
            .unwrap();

        let hit = dir
            .find_one(CollectionKind::Staff, "email", "a@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.reference, first);

        assert!(dir
            .find_one(CollectionKind::Staff, "email", "b@x.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let dir = MemoryDirectory::new();
        let r = dir
            .insert(CollectionKind::Customer, Some("c1"), fields(json!({"nombre": "Ana"})))
            .await
            .unwrap();

        dir.update(&r, fields(json!({"uid": "u1"}))).await.unwrap();

        let rec = dir.record(&r).unwrap();
        assert_eq!(rec.str_field("nombre"), Some("Ana"));
        assert_eq!(rec.str_field("uid"), Some("u1"));
    }

    #[tokio::test]
    async fn owned_update_refuses_a_different_owner() {
        let dir = MemoryDirectory::new();
        let r = dir
            .insert(CollectionKind::Staff, Some("s1"), fields(json!({"uid": "  "})))
            .await
            .unwrap();

        dir.update_owned(&r, "uid", "u1", fields(json!({"uid": "u1"}))).await.unwrap();
        dir.update_owned(&r, "uid", "u1", fields(json!({"uid": "u1", "n": 2})))
            .await
            .unwrap();

        let err = dir
            .update_owned(&r, "uid", "u2", fields(json!({"uid": "u2"})))
            .await
            .unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::Conflict);
        assert_eq!(dir.record(&r).unwrap().str_field("uid"), Some("u1"));
        assert_eq!(dir.get(&r).await.unwrap().unwrap().fields.get("n"), Some(&json!(2)));
    }

    /// Store relying on the read-then-write default of `update_owned`.
    struct PlainStore(MemoryDirectory);

    #[async_trait]
    impl DirectoryStore for PlainStore {
        async fn find_one(&self, kind: CollectionKind, field: &str, value: &str) -> ClaimResult<Option<Record>> {
            self.0.find_one(kind, field, value).await
        }

        async fn get(&self, reference: &RecordRef) -> ClaimResult<Option<Record>> {
            self.0.get(reference).await
        }

        async fn update(&self, reference: &RecordRef, fields: Fields) -> ClaimResult<()> {
            self.0.update(reference, fields).await
        }

        async fn insert(&self, kind: CollectionKind, id: Option<&str>, fields: Fields) -> ClaimResult<RecordRef> {
            self.0.insert(kind, id, fields).await
        }

        async fn delete(&self, reference: &RecordRef) -> ClaimResult<()> {
            self.0.delete(reference).await
        }
    }

    #[tokio::test]
    async fn default_owned_update_checks_the_stored_owner() {
        let store = PlainStore(MemoryDirectory::new());
        let r = store
            .insert(CollectionKind::Customer, None, fields(json!({"uid": "u1"})))
            .await
            .unwrap();

        store.update_owned(&r, "uid", "u1", fields(json!({"n": 1}))).await.unwrap();
        let err = store
            .update_owned(&r, "uid", "u2", fields(json!({"uid": "u2"})))
            .await
            .unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::Conflict);

        let missing = RecordRef::new(CollectionKind::Customer, "nope");
        let err = store.update_owned(&missing, "uid", "u1", Fields::new()).await.unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let dir = MemoryDirectory::new();
        let err = dir
            .update(&RecordRef::new(CollectionKind::Staff, "nope"), Fields::new())
            .await
            .unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_removes_only_the_addressed_record() {
        let dir = MemoryDirectory::new();
        let a = dir.insert(CollectionKind::Staff, Some("a"), Fields::new()).await.unwrap();
        dir.insert(CollectionKind::Staff, Some("b"), Fields::new()).await.unwrap();

        dir.delete(&a).await.unwrap();
        assert_eq!(dir.len(CollectionKind::Staff), 1);
        assert!(dir.get(&a).await.unwrap().is_none());

        let err = dir.delete(&a).await.unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn duplicate_explicit_id_conflicts() {
        let dir = MemoryDirectory::new();
        dir.insert(CollectionKind::Staff, Some("s1"), Fields::new()).await.unwrap();
        let err = dir
            .insert(CollectionKind::Staff, Some("s1"), Fields::new())
            .await
            .unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let dir = MemoryDirectory::new();
        dir.set_available(false);
        let err = dir
            .find_one(CollectionKind::Staff, "email", "a@x.com")
            .await
            .unwrap_err();
        assert_eq!(ClaimError::kind_of(&err), ErrorKind::Unavailable);
    }
}
