//! Flat bibliography record
//!
//! A [`BibRecord`] is the shape the rest of citer works with: one map from
//! lowercase field name to text, where `id` holds the cite key and `type`
//! the entry type. Iteration order is the sorted field order, which is also
//! the order fields are written back out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entry::{BibTeXEntry, BibTeXEntryType};
use crate::latex_decoder::decode_latex;

pub const ID_FIELD: &str = "id";
pub const TYPE_FIELD: &str = "type";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BibRecord {
    fields: BTreeMap<String, String>,
}

impl BibRecord {
    pub fn new(id: impl Into<String>, entry_type: impl Into<String>) -> Self {
        let mut record = Self::default();
        record.set(ID_FIELD, id);
        record.set(TYPE_FIELD, entry_type);
        record
    }

    /// The cite key, or `""` for a record that has none yet
    pub fn id(&self) -> &str {
        self.get(ID_FIELD).unwrap_or_default()
    }

    /// The entry type, `misc` when unset
    pub fn entry_type(&self) -> &str {
        match self.get(TYPE_FIELD) {
            Some(t) if !t.is_empty() => t,
            _ => "misc",
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(value) => Some(value.as_str()),
            None => self.fields.get(&key.to_lowercase()).map(String::as_str),
        }
    }

    /// Set a field; keys are stored lowercase
    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.fields
            .insert(key.as_ref().to_lowercase(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(&key.to_lowercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All fields including `id` and `type`
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Fields that end up between the braces of a BibTeX entry
    pub fn body_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields()
            .filter(|(k, _)| *k != ID_FIELD && *k != TYPE_FIELD)
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    pub fn author(&self) -> Option<&str> {
        self.get("author")
    }

    pub fn year(&self) -> Option<&str> {
        self.get("year")
    }

    pub fn journal(&self) -> Option<&str> {
        self.get("journal")
    }

    pub fn doi(&self) -> Option<&str> {
        self.get("doi")
    }
}

impl From<BibTeXEntry> for BibRecord {
    /// Flattens a parsed entry, decoding LaTeX escapes in every value
    fn from(entry: BibTeXEntry) -> Self {
        let mut record = BibRecord::new(entry.cite_key, entry.entry_type.as_str());
        for field in entry.fields {
            let key = field.key.to_lowercase();
            if key == ID_FIELD || key == TYPE_FIELD {
                continue;
            }
            record.set(key, decode_latex(&field.value));
        }
        record
    }
}

impl From<&BibRecord> for BibTeXEntry {
    fn from(record: &BibRecord) -> Self {
        let mut entry = BibTeXEntry::new(
            record.id(),
            BibTeXEntryType::parse(record.entry_type()),
        );
        for (key, value) in record.body_fields() {
            entry.add_field(key, value);
        }
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_has_id_and_type() {
        let record = BibRecord::new("Doe2020", "article");
        assert_eq!(record.id(), "Doe2020");
        assert_eq!(record.entry_type(), "article");
        assert_eq!(record.body_fields().count(), 0);
    }

    #[test]
    fn test_keys_are_lowercased() {
        let mut record = BibRecord::default();
        record.set("Title", "Deep Things");
        assert_eq!(record.get("title"), Some("Deep Things"));
        assert_eq!(record.get("TITLE"), Some("Deep Things"));
        assert_eq!(record.id(), "");
        assert_eq!(record.entry_type(), "misc");
    }

    #[test]
    fn test_from_entry_decodes_latex() {
        let mut entry = BibTeXEntry::new("Muller2019", BibTeXEntryType::Book);
        entry.add_field("Author", r#"M\"uller, Hans"#);
        let record = BibRecord::from(entry);
        assert_eq!(record.author(), Some("Müller, Hans"));
        assert_eq!(record.entry_type(), "book");
    }

    #[test]
    fn test_entry_round_trip_keeps_fields() {
        let mut record = BibRecord::new("Doe2020", "incollection");
        record.set("booktitle", "Collected Works");
        let entry = BibTeXEntry::from(&record);
        assert_eq!(entry.entry_type, BibTeXEntryType::InCollection);
        assert_eq!(entry.get_field("booktitle"), Some("Collected Works"));
        assert_eq!(entry.fields.len(), 1);
    }
}
