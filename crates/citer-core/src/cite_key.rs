//! Cite key synthesis
//!
//! A key is the first author's surname with whitespace removed, followed by
//! the year, folded into `[A-Za-z0-9_-]`. Collisions with keys already in the
//! collection are resolved with a letter suffix: `a` through `z`, then
//! `aa`, `ab`, ... `zz`, `aaa` and so on.

use std::collections::HashSet;

use crate::text::fold_to_identifier;

/// Every cite key in the loaded collection, in load order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitekeySet {
    ordered: Vec<String>,
    index: HashSet<String>,
}

impl CitekeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Add a key; returns `false` if it was already present
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        let key = key.into();
        if self.index.contains(&key) {
            return false;
        }
        self.index.insert(key.clone());
        self.ordered.push(key);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Keys containing `prefix` (case-insensitive, leading `@` ignored)
    pub fn matching(&self, prefix: &str) -> Vec<&str> {
        let needle = prefix.replace('@', "").to_lowercase();
        self.iter()
            .filter(|key| key.to_lowercase().contains(&needle))
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for CitekeySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = CitekeySet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

/// The inputs a key was built from, kept so it can be rebuilt against a
/// fresher key set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySeed {
    pub surname: String,
    pub year: String,
    /// Base used when surname and year fold to nothing, e.g. a PMID
    pub fallback: String,
}

/// Last resort base for records with no usable identity at all
pub const ANONYMOUS_BASE: &str = "Anonymous";

impl KeySeed {
    pub fn new(surname: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            surname: surname.into(),
            year: year.into(),
            fallback: String::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Like [`synthesize`], but never returns an empty key
    pub fn synthesize(&self, existing: &CitekeySet) -> String {
        if !base_key(&self.surname, &self.year).is_empty() {
            return synthesize(&self.surname, &self.year, existing);
        }
        if !base_key(&self.fallback, "").is_empty() {
            return synthesize(&self.fallback, "", existing);
        }
        synthesize(ANONYMOUS_BASE, "", existing)
    }
}

/// Base key without any collision suffix
pub fn base_key(surname: &str, year: &str) -> String {
    let joined: String = surname
        .chars()
        .filter(|c| !c.is_whitespace())
        .chain(year.chars())
        .collect();
    fold_to_identifier(&joined)
}

/// Build a cite key that is absent from `existing`
pub fn synthesize(surname: &str, year: &str, existing: &CitekeySet) -> String {
    let base = base_key(surname, year);
    if !existing.contains(&base) {
        return base;
    }

    let mut n = 1;
    loop {
        let candidate = format!("{}{}", base, letter_suffix(n));
        if !existing.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Bijective base-26 numbering: 1 → `a`, 26 → `z`, 27 → `aa`
fn letter_suffix(mut n: usize) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}
