//! Source plugins for fetching publications from online databases
//!
//! Every provider returns its own record shape; [`map_raw_record`] turns
//! any of them into a normalized [`BibRecord`] with a cite key that is free
//! in the given [`CitekeySet`].

pub mod chemrxiv;
pub mod crossref;
pub mod pubmed;
pub mod traits;

pub use chemrxiv::*;
pub use crossref::*;
pub use pubmed::*;
pub use traits::*;

use citer_bibtex::{BibRecord, ID_FIELD};

use crate::cite_key::{CitekeySet, KeySeed};
use crate::menu::EntrySummary;

/// A provider record before mapping
#[derive(Debug, Clone, PartialEq)]
pub enum RawProviderRecord {
    Works(CrossrefWork),
    Biomedical(PubMedRecord),
    Preprint(PreprintDetail),
}

/// Mapping knobs taken from the settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingOptions {
    /// Crossref date object that supplies the year
    pub date_field: String,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            date_field: "issued".to_string(),
        }
    }
}

/// A normalized record ready to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedEntry {
    pub record: BibRecord,
    pub seed: KeySeed,
    /// Values shown in the result picker
    pub summary: EntrySummary,
}

impl MappedEntry {
    pub(crate) fn new(
        mut record: BibRecord,
        seed: KeySeed,
        mut summary: EntrySummary,
        existing: &CitekeySet,
    ) -> Self {
        let key = seed.synthesize(existing);
        record.set(ID_FIELD, key.clone());
        summary.key = key;
        Self {
            record,
            seed,
            summary,
        }
    }

    pub fn key(&self) -> &str {
        self.record.id()
    }

    /// Rebuild the key against `existing`; returns `true` if it changed
    pub fn rekey(&mut self, existing: &CitekeySet) -> bool {
        let key = self.seed.synthesize(existing);
        if key == self.key() {
            return false;
        }
        self.record.set(ID_FIELD, key.clone());
        self.summary.key = key;
        true
    }
}

/// Map one provider record; `None` when the record is filtered out
pub fn map_raw_record(
    raw: &RawProviderRecord,
    options: &MappingOptions,
    existing: &CitekeySet,
) -> Option<MappedEntry> {
    match raw {
        RawProviderRecord::Works(work) => map_work(work, &options.date_field, existing),
        RawProviderRecord::Biomedical(record) => Some(map_pubmed(record, existing)),
        RawProviderRecord::Preprint(detail) => Some(map_preprint(detail, existing)),
    }
}

/// Map a batch, threading each new key into the set so results do not
/// collide with each other either
pub fn map_batch<'a>(
    raws: impl IntoIterator<Item = &'a RawProviderRecord>,
    options: &MappingOptions,
    existing: &CitekeySet,
) -> Vec<MappedEntry> {
    let mut taken = existing.clone();
    let mut mapped = Vec::new();
    for raw in raws {
        if let Some(entry) = map_raw_record(raw, options, &taken) {
            taken.insert(entry.key());
            mapped.push(entry);
        }
    }
    mapped
}
