// Reservation lookup.

use std::sync::Arc;

use claim_core::{
    owner_of, ClaimError, CollectionKind, DirectoryStore, ErrorKind, Fields, Record, RecordRef,
};
use tracing::{debug, instrument, warn};

use crate::options::FieldNames;

/// Which of the two email spellings a probe reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EmailField {
    Lower,
    Raw,
}

/// How the submitted email is turned into the probe value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Normalizer {
    Lowercase,
    AsGiven,
}

impl Normalizer {
    pub fn apply(&self, email: &str) -> String {
        match self {
            Normalizer::Lowercase => email.to_lowercase(),
            Normalizer::AsGiven => email.to_string(),
        }
    }
}

/// One step of the search: look in `kind`, compare `field` against the
/// normalized email.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Probe {
    pub kind: CollectionKind,
    pub field: EmailField,
    pub normalizer: Normalizer,
}

impl Probe {
    pub const fn new(kind: CollectionKind, field: EmailField, normalizer: Normalizer) -> Self {
        Self {
            kind,
            field,
            normalizer,
        }
    }

    pub(crate) fn field_name<'a>(&self, names: &'a FieldNames) -> &'a str {
        match self.field {
            EmailField::Lower => &names.email_lower,
            EmailField::Raw => &names.email,
        }
    }
}

/// Search priority. First hit wins.
pub const SEARCH_ORDER: [Probe; 4] = [
    Probe::new(CollectionKind::Staff, EmailField::Lower, Normalizer::Lowercase),
    Probe::new(CollectionKind::Staff, EmailField::Raw, Normalizer::AsGiven),
    Probe::new(CollectionKind::Customer, EmailField::Lower, Normalizer::Lowercase),
    Probe::new(CollectionKind::Customer, EmailField::Raw, Normalizer::AsGiven),
];

/// A matched, unclaimed reservation.
#[derive(Clone, Debug, PartialEq)]
pub struct Reservation {
    pub record: Record,
    /// The probe that produced the match.
    pub matched_by: Probe,
}

impl Reservation {
    pub fn reference(&self) -> &RecordRef {
        &self.record.reference
    }

    pub fn kind(&self) -> CollectionKind {
        self.record.kind()
    }

    pub fn fields(&self) -> &Fields {
        &self.record.fields
    }
}

/// Linked uid on a record, if it carries a non-blank one.
pub(crate) fn linked_uid<'a>(fields: &'a Fields, uid_field: &str) -> Option<&'a str> {
    owner_of(fields, uid_field)
}

pub struct ReservationLocator {
    store: Option<Arc<dyn DirectoryStore>>,
    fields: FieldNames,
}

impl ReservationLocator {
    pub fn new(store: Option<Arc<dyn DirectoryStore>>, fields: FieldNames) -> Self {
        Self { store, fields }
    }

    pub fn probes(&self) -> &'static [Probe] {
        &SEARCH_ORDER
    }

    /// First unclaimed reservation for `email`, following [`SEARCH_ORDER`].
    ///
    /// Never fails: a missing or unreachable store is a miss. Records that
    /// already carry a linked uid are skipped.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn locate(&self, email: &str) -> Option<Reservation> {
        let Some(store) = self.store.as_ref() else {
            debug!("no directory store configured");
            return None;
        };

        for probe in self.probes() {
            let field = probe.field_name(&self.fields);
            let value = probe.normalizer.apply(email);

            match store.find_one(probe.kind, field, &value).await {
                Ok(Some(record)) => {
                    if let Some(uid) = linked_uid(&record.fields, &self.fields.uid) {
                        debug!(record = %record.reference, uid, "reservation already claimed");
                        continue;
                    }
                    debug!(record = %record.reference, field, "reservation matched");
                    return Some(Reservation {
                        record,
                        matched_by: *probe,
                    });
                }
                Ok(None) => {}
                Err(err) if ClaimError::kind_of(&err) == ErrorKind::Unavailable => {
                    warn!(error = %err, "directory store unavailable; treating as no reservation");
                    return None;
                }
                Err(err) => {
                    warn!(error = %err, kind = %probe.kind, field, "reservation probe failed");
                }
            }
        }

        None
    }
}
