//! Bibliography store cache
//!
//! The store reflects one or more bibliography files on disk. Every read
//! first checks each file's modification time against the
//! [`ModificationLedger`]; when any file changed, all files are reparsed in
//! order so the merged view never mixes old and new contents.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use citer_bibtex::BibRecord;
use tracing::{debug, warn};

use crate::cite_key::CitekeySet;
use crate::error::StoreError;
use crate::menu::{build_menu, MenuEntry, QuickViewTemplate};

/// Bibliography text codec
pub trait BibCodec {
    fn parse(&self, text: &str) -> Vec<BibRecord>;

    /// Text that can be appended to an existing file
    fn serialize(&self, record: &BibRecord) -> String;
}

/// BibTeX codec backed by `citer-bibtex`
#[derive(Debug, Clone, Copy, Default)]
pub struct BibtexCodec;

impl BibCodec for BibtexCodec {
    fn parse(&self, text: &str) -> Vec<BibRecord> {
        let result = citer_bibtex::parse(text);
        for error in &result.errors {
            debug!(%error, "skipped malformed entry");
        }
        result.entries.into_iter().map(BibRecord::from).collect()
    }

    fn serialize(&self, record: &BibRecord) -> String {
        citer_bibtex::serialize_record(record)
    }
}

/// Result of checking one path against the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// Not on disk; the ledger entry is left as it was
    Missing,
    /// Same modification time as last seen
    Fresh,
    /// New or changed; the ledger now holds the current time
    Stale,
}

/// Last observed modification time per path
#[derive(Debug, Clone, Default)]
pub struct ModificationLedger {
    seen: HashMap<PathBuf, SystemTime>,
}

impl ModificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_path(&mut self, path: &Path) -> PathStatus {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(_) => return PathStatus::Missing,
        };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        match self.seen.insert(path.to_path_buf(), modified) {
            Some(previous) if previous == modified => PathStatus::Fresh,
            _ => PathStatus::Stale,
        }
    }

    pub fn last_seen(&self, path: &Path) -> Option<SystemTime> {
        self.seen.get(path).copied()
    }

    /// Drop the entry so the next check reports `Stale`
    pub fn forget(&mut self, path: &Path) {
        self.seen.remove(path);
    }
}

/// What a [`BibliographyStore::refresh`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub reloaded: bool,
    pub missing: Vec<PathBuf>,
    pub notices: Vec<String>,
}

pub fn missing_file_notice(path: &Path) -> String {
    format!("WARNING: BibTex file {} not found", path.display())
}

pub const NO_BIBLIOGRAPHY_NOTICE: &str = "WARNING: No BibTex file configured for citer";

/// In-memory view of the configured bibliography files
pub struct BibliographyStore<C: BibCodec = BibtexCodec> {
    codec: C,
    paths: Vec<PathBuf>,
    supplementary: Option<PathBuf>,
    template: QuickViewTemplate,
    ledger: ModificationLedger,
    /// Path list of the last successful load; `None` before the first
    loaded_paths: Option<Vec<PathBuf>>,
    /// Paths that were missing at the last check
    absent: HashSet<PathBuf>,
    documents: Vec<BibRecord>,
    citekeys: CitekeySet,
    menu: Vec<MenuEntry>,
    pending_notices: Vec<String>,
}

impl<C: BibCodec> BibliographyStore<C> {
    pub fn new(paths: Vec<PathBuf>, codec: C, template: QuickViewTemplate) -> Self {
        Self {
            codec,
            paths,
            supplementary: None,
            template,
            ledger: ModificationLedger::new(),
            loaded_paths: None,
            absent: HashSet::new(),
            documents: Vec::new(),
            citekeys: CitekeySet::new(),
            menu: Vec::new(),
            pending_notices: Vec::new(),
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn set_paths(&mut self, paths: Vec<PathBuf>) {
        self.paths = paths;
    }

    /// Extra file named by the active document, tracked after the
    /// configured ones
    pub fn set_supplementary(&mut self, path: Option<PathBuf>) {
        self.supplementary = path;
    }

    pub fn supplementary(&self) -> Option<&Path> {
        self.supplementary.as_deref()
    }

    pub fn set_template(&mut self, template: QuickViewTemplate) {
        if template != self.template {
            self.template = template;
            self.menu = build_menu(&self.documents, &self.template);
        }
    }

    pub fn ledger(&self) -> &ModificationLedger {
        &self.ledger
    }

    /// Configured paths followed by the supplementary one, without repeats
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        let mut tracked = self.paths.clone();
        if let Some(extra) = &self.supplementary {
            if !tracked.contains(extra) {
                tracked.push(extra.clone());
            }
        }
        tracked
    }

    /// Check every tracked path and reload everything if anything changed
    pub fn refresh(&mut self) -> Result<RefreshReport, StoreError> {
        let tracked = self.tracked_paths();
        let mut report = RefreshReport::default();
        if tracked.is_empty() {
            report.notices.push(NO_BIBLIOGRAPHY_NOTICE.to_string());
        }

        let mut stale = self.loaded_paths.as_ref() != Some(&tracked);
        let mut absent = HashSet::new();
        for path in &tracked {
            match self.ledger.check_path(path) {
                PathStatus::Missing => {
                    warn!(path = %path.display(), "bibliography file not found");
                    report.notices.push(missing_file_notice(path));
                    report.missing.push(path.clone());
                    // a file that disappeared since the last load drops out
                    stale |= !self.absent.contains(path);
                    absent.insert(path.clone());
                }
                PathStatus::Stale => stale = true,
                // back after being absent, possibly with the old mtime
                PathStatus::Fresh => stale |= self.absent.contains(path),
            }
        }
        self.absent = absent;

        if stale {
            if let Err(e) = self.reload(&tracked) {
                for path in &tracked {
                    self.ledger.forget(path);
                }
                self.loaded_paths = None;
                return Err(e);
            }
            report.reloaded = true;
        }
        Ok(report)
    }

    fn reload(&mut self, tracked: &[PathBuf]) -> Result<(), StoreError> {
        let mut documents = Vec::new();
        for path in tracked {
            if self.absent.contains(path) {
                continue;
            }
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(path = %path.display(), "bibliography file vanished during reload");
                    self.absent.insert(path.clone());
                    continue;
                }
                Err(source) => {
                    return Err(StoreError::Read {
                        path: path.clone(),
                        source,
                    })
                }
            };
            let records = self.codec.parse(&text);
            debug!(path = %path.display(), count = records.len(), "parsed bibliography");
            documents.extend(records);
        }

        self.citekeys = documents.iter().map(|r| r.id().to_string()).collect();
        self.menu = build_menu(&documents, &self.template);
        self.documents = documents;
        self.loaded_paths = Some(tracked.to_vec());
        debug!(
            entries = self.documents.len(),
            keys = self.citekeys.len(),
            "bibliography reloaded"
        );
        Ok(())
    }

    fn refresh_quietly(&mut self) -> Result<(), StoreError> {
        let report = self.refresh()?;
        self.pending_notices.extend(report.notices);
        Ok(())
    }

    /// Notices gathered by the refreshing accessors since the last call
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_notices)
    }

    pub fn documents(&mut self) -> Result<&[BibRecord], StoreError> {
        self.refresh_quietly()?;
        Ok(&self.documents)
    }

    pub fn citekeys(&mut self) -> Result<&CitekeySet, StoreError> {
        self.refresh_quietly()?;
        Ok(&self.citekeys)
    }

    /// Display menu, sorted by rendered text
    pub fn menu(&mut self) -> Result<&[MenuEntry], StoreError> {
        self.refresh_quietly()?;
        Ok(&self.menu)
    }

    /// First record with the given key
    pub fn find(&mut self, id: &str) -> Result<Option<&BibRecord>, StoreError> {
        self.refresh_quietly()?;
        Ok(self.documents.iter().find(|r| r.id() == id))
    }

    /// Force the next refresh to treat `path` as changed
    pub fn invalidate(&mut self, path: &Path) {
        self.ledger.forget(path);
    }
}

impl BibliographyStore<BibtexCodec> {
    pub fn bibtex(paths: Vec<PathBuf>, template: QuickViewTemplate) -> Self {
        Self::new(paths, BibtexCodec, template)
    }
}
