//! Search and selection orchestration
//!
//! A [`CiterSession`] owns the store cache, the enabled providers and the
//! front-matter cache. Each operation runs to completion against a
//! [`Host`] that supplies the picker, the edit point and the status line.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::append::AppendEngine;
use crate::config::{CitationFormat, Settings};
use crate::error::{AppendError, Result};
use crate::front_matter::FrontMatterCache;
use crate::host::{Choice, EditPoint, Picker, StatusLine};
use crate::menu::EntrySummary;
use crate::sources::{
    map_batch, map_raw_record, BiomedicalSearch, MappedEntry, MappingOptions, PreprintSearch,
    RawProviderRecord, SourceError, SourceMetadata, WorksSearch,
};
use crate::store::{BibCodec, BibliographyStore, BibtexCodec};

/// Merge marker between adjacent bracketed citations
pub const ADJACENT_CITATIONS: &str = "][";
pub const MERGED_CITATIONS: &str = "; ";

/// How a picked key is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// Through `citation_format`
    #[default]
    Citation,
    /// The bare key
    KeyOnly,
}

/// The host collaborators for one operation
pub struct Host<'a> {
    pub picker: &'a mut dyn Picker,
    pub edit: &'a mut dyn EditPoint,
    pub status: &'a mut dyn StatusLine,
}

/// Enabled remote providers
#[derive(Default)]
pub struct Providers {
    pub works: Option<Box<dyn WorksSearch>>,
    pub biomedical: Option<Box<dyn BiomedicalSearch>>,
    pub preprints: Option<Box<dyn PreprintSearch>>,
}

impl Providers {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.works.is_none() && self.biomedical.is_none() && self.preprints.is_none()
    }
}

#[cfg(feature = "native")]
impl Providers {
    /// HTTP-backed providers for every source enabled in `settings`
    pub fn from_settings(settings: &Settings) -> std::result::Result<Self, crate::SourceError> {
        use crate::sources::{ChemRxivSource, CrossrefSource, PubMedSource};

        let mut providers = Self::none();
        if settings.crossref.enabled {
            providers.works = Some(Box::new(CrossrefSource::new(
                settings.crossref.mailto.clone(),
                settings.crossref.date_field.clone(),
            )?));
        }
        if settings.pubmed.enabled {
            providers.biomedical = Some(Box::new(PubMedSource::new(
                settings.pubmed.api_key.clone(),
                settings.pubmed.email.clone(),
            )?));
        }
        if settings.chemrxiv.is_available() {
            if let Some(token) = &settings.chemrxiv.token {
                providers.preprints = Some(Box::new(ChemRxivSource::new(token.clone())?));
            }
        }
        Ok(providers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Works,
    Biomedical,
    Preprints,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SearchItem {
    Trigger(Provider),
    Local(String),
}

fn trigger_choice(meta: &SourceMetadata) -> Choice {
    Choice::new(format!("Search {}", meta.name), meta.description)
}

pub fn no_results_notice(provider: &str) -> String {
    format!("{} query gave no results", provider)
}

pub fn provider_failure_notice(provider: &str, error: &SourceError) -> String {
    format!("{} query failed: {}", provider, error)
}

/// Put a provider failure on the status line; the error still aborts the
/// operation
fn surfaced<T>(
    result: std::result::Result<T, SourceError>,
    provider: &str,
    status: &mut dyn StatusLine,
) -> std::result::Result<T, SourceError> {
    result.map_err(|error| {
        warn!(provider, %error, "provider request failed");
        status.notify(&provider_failure_notice(provider, &error));
        error
    })
}

/// Keys offered for completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completions {
    pub keys: Vec<String>,
    /// The host should suppress its other completion sources
    pub hide_others: bool,
}

pub struct CiterSession<C: BibCodec = BibtexCodec> {
    settings: Settings,
    store: BibliographyStore<C>,
    providers: Providers,
    front_matter: FrontMatterCache,
}

impl CiterSession<BibtexCodec> {
    pub fn new(settings: Settings, providers: Providers) -> Self {
        let store = BibliographyStore::bibtex(
            settings.bibliography_paths.clone(),
            settings.quickview.clone(),
        );
        Self::with_store(settings, store, providers)
    }
}

impl<C: BibCodec> CiterSession<C> {
    pub fn with_store(settings: Settings, store: BibliographyStore<C>, providers: Providers) -> Self {
        Self {
            settings,
            store,
            providers,
            front_matter: FrontMatterCache::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&mut self) -> &mut BibliographyStore<C> {
        &mut self.store
    }

    /// Replace the settings snapshot, keeping the loaded collection
    pub fn update_settings(&mut self, settings: Settings) {
        self.store.set_paths(settings.bibliography_paths.clone());
        self.store.set_template(settings.quickview.clone());
        self.settings = settings;
    }

    /// Track the bibliography named in the front matter of `document`
    pub fn use_document(&mut self, document: &Path, text: &str) -> Option<PathBuf> {
        let bibliography = self.front_matter.bibliography_for(document, text);
        self.store.set_supplementary(bibliography.clone());
        bibliography
    }

    fn flush_notices(&mut self, status: &mut dyn StatusLine) {
        for notice in self.store.take_notices() {
            status.notify(&notice);
        }
    }

    fn format_for(&self, mode: SearchMode) -> CitationFormat {
        match mode {
            SearchMode::Citation => self.settings.citation_format.clone(),
            SearchMode::KeyOnly => CitationFormat::key_only(),
        }
    }

    /// Remote triggers need somewhere to append to
    fn triggers(&self) -> Vec<(Provider, SourceMetadata)> {
        if self.settings.output_path.is_none() {
            return Vec::new();
        }
        let mut triggers = Vec::new();
        if let Some(works) = &self.providers.works {
            triggers.push((Provider::Works, works.describe()));
        }
        if let Some(biomedical) = &self.providers.biomedical {
            triggers.push((Provider::Biomedical, biomedical.describe()));
        }
        if let Some(preprints) = &self.providers.preprints {
            triggers.push((Provider::Preprints, preprints.describe()));
        }
        triggers
    }

    /// Pick a local entry or a remote search; returns the inserted text
    ///
    /// Local entries are listed in file order, followed by one trigger per
    /// remote provider.
    pub fn search(&mut self, mode: SearchMode, host: &mut Host<'_>) -> Result<Option<String>> {
        let mut items = Vec::new();
        let mut choices = Vec::new();
        let template = self.settings.quickview.clone();
        for record in self.store.documents()? {
            items.push(SearchItem::Local(record.id().to_string()));
            choices.push(template.choice(&EntrySummary::stripped(record)));
        }
        self.flush_notices(host.status);

        for (provider, meta) in self.triggers() {
            items.push(SearchItem::Trigger(provider));
            choices.push(trigger_choice(&meta));
        }

        let Some(index) = host.picker.choose(&choices) else {
            return Ok(None);
        };
        match items.get(index) {
            Some(SearchItem::Local(key)) => Ok(Some(self.insert_citation(key, mode, host.edit))),
            Some(SearchItem::Trigger(provider)) => self.search_remote(*provider, mode, host),
            None => Ok(None),
        }
    }

    fn search_remote(
        &mut self,
        provider: Provider,
        mode: SearchMode,
        host: &mut Host<'_>,
    ) -> Result<Option<String>> {
        let meta = match provider {
            Provider::Works => self.providers.works.as_ref().map(|p| p.describe()),
            Provider::Biomedical => self.providers.biomedical.as_ref().map(|p| p.describe()),
            Provider::Preprints => self.providers.preprints.as_ref().map(|p| p.describe()),
        };
        let Some(meta) = meta else {
            return Ok(None);
        };
        let Some(query) = host.picker.prompt(&format!("Search {}", meta.name)) else {
            return Ok(None);
        };
        debug!(provider = meta.name, query = %query, "remote search");

        let raws: Vec<RawProviderRecord> = match provider {
            Provider::Preprints => return self.search_preprints(&meta, &query, mode, host),
            Provider::Works => match &self.providers.works {
                Some(works) => {
                    let limit = self.settings.crossref.limit;
                    let found = surfaced(works.query(&query, limit), meta.name, host.status)?;
                    found.into_iter().map(RawProviderRecord::Works).collect()
                }
                None => return Ok(None),
            },
            Provider::Biomedical => match &self.providers.biomedical {
                Some(biomedical) => {
                    let limit = self.settings.pubmed.limit;
                    let found = surfaced(biomedical.query(&query, limit), meta.name, host.status)?;
                    found.into_iter().map(RawProviderRecord::Biomedical).collect()
                }
                None => return Ok(None),
            },
        };

        let options = MappingOptions {
            date_field: self.settings.crossref.date_field.clone(),
        };
        let existing = self.store.citekeys()?.clone();
        self.flush_notices(host.status);
        let mapped = map_batch(&raws, &options, &existing);
        debug!(
            received = raws.len(),
            kept = mapped.len(),
            "mapped provider records"
        );
        if mapped.is_empty() {
            warn!(provider = meta.name, "query gave no results");
            host.status.notify(&no_results_notice(meta.name));
            return Ok(None);
        }

        let choices: Vec<Choice> = mapped
            .iter()
            .map(|entry| self.settings.quickview.choice(&entry.summary))
            .collect();
        let Some(entry) = host
            .picker
            .choose(&choices)
            .and_then(|index| mapped.into_iter().nth(index))
        else {
            return Ok(None);
        };
        self.append_and_cite(entry, mode, host).map(Some)
    }

    fn search_preprints(
        &mut self,
        meta: &SourceMetadata,
        query: &str,
        mode: SearchMode,
        host: &mut Host<'_>,
    ) -> Result<Option<String>> {
        let Some(preprints) = &self.providers.preprints else {
            return Ok(None);
        };
        let briefs = surfaced(preprints.search(query), meta.name, host.status)?;
        if briefs.is_empty() {
            warn!(provider = meta.name, "query gave no results");
            host.status.notify(&no_results_notice(meta.name));
            return Ok(None);
        }

        let choices: Vec<Choice> = briefs
            .iter()
            .map(|brief| self.settings.quickview.choice(&brief.summary()))
            .collect();
        let Some(brief) = host.picker.choose(&choices).and_then(|i| briefs.get(i)) else {
            return Ok(None);
        };
        let detail = surfaced(preprints.fetch_detail(&brief.id), meta.name, host.status)?;

        let existing = self.store.citekeys()?.clone();
        self.flush_notices(host.status);
        let raw = RawProviderRecord::Preprint(detail);
        match map_raw_record(&raw, &MappingOptions::default(), &existing) {
            Some(entry) => self.append_and_cite(entry, mode, host).map(Some),
            None => Ok(None),
        }
    }

    /// Re-key against the current collection, append, then insert
    fn append_and_cite(
        &mut self,
        mut entry: MappedEntry,
        mode: SearchMode,
        host: &mut Host<'_>,
    ) -> Result<String> {
        let output = self
            .settings
            .output_path
            .clone()
            .ok_or(AppendError::NoOutputPath)?;

        let current = self.store.citekeys()?;
        if entry.rekey(current) {
            debug!(key = entry.key(), "key taken since mapping, re-synthesized");
        }
        self.flush_notices(host.status);

        AppendEngine::append(&mut self.store, &output, &entry.record)?;
        Ok(self.insert_citation(entry.key(), mode, host.edit))
    }

    fn insert_citation(&self, key: &str, mode: SearchMode, edit: &mut dyn EditPoint) -> String {
        let citation = self.format_for(mode).render(key);
        edit.insert(&citation);
        if self.settings.auto_merge_citations {
            edit.replace_all(ADJACENT_CITATIONS, MERGED_CITATIONS);
        }
        citation
    }

    /// Pick from the sorted display menu and insert the citation
    pub fn show_keys(&mut self, host: &mut Host<'_>) -> Result<Option<String>> {
        let menu = self.store.menu()?.to_vec();
        self.flush_notices(host.status);
        let choices: Vec<Choice> = menu.iter().map(|m| Choice::from_lines(&m.text)).collect();
        let Some(entry) = host.picker.choose(&choices).and_then(|i| menu.get(i)) else {
            return Ok(None);
        };
        Ok(Some(self.insert_citation(
            &entry.key,
            SearchMode::Citation,
            host.edit,
        )))
    }

    /// Pick from the display menu and insert the record's title
    pub fn insert_title(&mut self, host: &mut Host<'_>) -> Result<Option<String>> {
        let menu = self.store.menu()?.to_vec();
        self.flush_notices(host.status);
        let choices: Vec<Choice> = menu.iter().map(|m| Choice::from_lines(&m.text)).collect();
        let Some(entry) = host.picker.choose(&choices).and_then(|i| menu.get(i)) else {
            return Ok(None);
        };
        let title = self
            .store
            .find(&entry.key)?
            .and_then(|r| r.title())
            .unwrap_or_default()
            .to_string();
        host.edit.insert(&title);
        Ok(Some(title))
    }

    /// Keys containing `prefix`, ignoring case and `@`
    pub fn completions(&mut self, prefix: &str) -> Result<Completions> {
        if !self.settings.enable_completions {
            return Ok(Completions::default());
        }
        let keys: Vec<String> = self
            .store
            .citekeys()?
            .matching(prefix)
            .into_iter()
            .map(String::from)
            .collect();
        let hide_others = self.settings.hide_other_completions && !keys.is_empty();
        Ok(Completions { keys, hide_others })
    }

    /// Whether the text before the cursor should open a key-only search
    /// instead of plain completion
    pub fn should_search_on_completion(&self, line_prefix: &str) -> bool {
        self.settings.enable_completions
            && self.settings.use_search_for_completions
            && self.settings.citation_regex.is_match(line_prefix)
    }

    /// Merge adjacent citations `[@a][@b]` into `[@a; @b]`
    pub fn combine_citations(&self, edit: &mut dyn EditPoint) -> usize {
        edit.replace_all(ADJACENT_CITATIONS, MERGED_CITATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{NoticeLog, TextBuffer};
    use crate::sources::{
        CrossrefWork, PreprintAuthor, PreprintBrief, PreprintDetail, PubMedRecord, SourceError,
    };
    use crate::CiterError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs;
    use tempfile::TempDir;

    const BIB: &str = "@article{Doe2020,\n  author = {Doe, Jane},\n  title = {On {DNA}},\n  year = {2020}\n}\n\n@book{Roe1999,\n  author = {Roe, Rick and Poe, Edgar and Moe, Max},\n  title = {Books},\n  year = {1999}\n}\n";

    #[derive(Default)]
    struct ScriptedPicker {
        picks: VecDeque<Option<usize>>,
        answers: VecDeque<Option<String>>,
        shown: Vec<Vec<Choice>>,
        prompts: Vec<String>,
    }

    impl Picker for ScriptedPicker {
        fn choose(&mut self, choices: &[Choice]) -> Option<usize> {
            self.shown.push(choices.to_vec());
            self.picks.pop_front().flatten()
        }

        fn prompt(&mut self, label: &str) -> Option<String> {
            self.prompts.push(label.to_string());
            self.answers.pop_front().flatten()
        }
    }

    struct FixedWorks(Vec<CrossrefWork>);

    impl WorksSearch for FixedWorks {
        fn query(&self, _query: &str, _limit: u32) -> std::result::Result<Vec<CrossrefWork>, SourceError> {
            Ok(self.0.clone())
        }
    }

    struct NoBiomedical;

    impl BiomedicalSearch for NoBiomedical {
        fn query(&self, _query: &str, _limit: u32) -> std::result::Result<Vec<PubMedRecord>, SourceError> {
            Ok(Vec::new())
        }
    }

    struct FailingWorks;

    impl WorksSearch for FailingWorks {
        fn query(&self, _query: &str, _limit: u32) -> std::result::Result<Vec<CrossrefWork>, SourceError> {
            Err(SourceError::RateLimit)
        }
    }

    /// Two briefs; records which id the detail was fetched for
    #[derive(Default)]
    struct ScriptedPreprints {
        fetched: RefCell<Vec<String>>,
    }

    impl PreprintSearch for ScriptedPreprints {
        fn search(&self, _query: &str) -> std::result::Result<Vec<PreprintBrief>, SourceError> {
            Ok(vec![
                PreprintBrief {
                    id: "b1".into(),
                    title: "Other".into(),
                    published_date: "2020-01-01T00:00:00Z".into(),
                },
                PreprintBrief {
                    id: "b2".into(),
                    title: "Engines".into(),
                    published_date: "2021-03-04T00:00:00Z".into(),
                },
            ])
        }

        fn fetch_detail(&self, id: &str) -> std::result::Result<PreprintDetail, SourceError> {
            self.fetched.borrow_mut().push(id.to_string());
            Ok(PreprintDetail {
                id: id.to_string(),
                title: "Engines".into(),
                authors: vec![PreprintAuthor {
                    full_name: "Ada Lovelace".into(),
                }],
                published_date: "2021-03-04T00:00:00Z".into(),
                doi: "10.26434/chemrxiv-2021-x".into(),
                tags: vec!["analytical engine".into()],
            })
        }
    }

    fn doe_work() -> CrossrefWork {
        serde_json::from_str(
            r#"{"type": "journal-article", "title": ["Fresh Result"],
                "author": [{"family": "Doe", "given": "John"}],
                "container-title": ["Science"],
                "issued": {"date-parts": [[2020, 5]]}}"#,
        )
        .unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        bib: PathBuf,
        session: CiterSession,
    }

    fn fixture(providers: Providers, configure: impl FnOnce(&mut Settings)) -> Fixture {
        let dir = TempDir::new().unwrap();
        let bib = dir.path().join("refs.bib");
        fs::write(&bib, BIB).unwrap();
        let mut settings = Settings {
            bibliography_paths: vec![bib.clone()],
            output_path: Some(bib.clone()),
            ..Settings::default()
        };
        configure(&mut settings);
        Fixture {
            _dir: dir,
            bib,
            session: CiterSession::new(settings, providers),
        }
    }

    fn run<T>(
        picker: &mut ScriptedPicker,
        buffer: &mut TextBuffer,
        log: &mut NoticeLog,
        op: impl FnOnce(&mut Host<'_>) -> T,
    ) -> T {
        let mut host = Host {
            picker,
            edit: buffer,
            status: log,
        };
        op(&mut host)
    }

    #[test]
    fn test_search_local_entry_inserts_citation() {
        let mut fx = fixture(Providers::none(), |_| {});
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(0)]),
            ..Default::default()
        };
        let mut buffer = TextBuffer::at_end("see ");
        let mut log = NoticeLog::default();

        let inserted = run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::Citation, host)
        })
        .unwrap();

        assert_eq!(inserted.as_deref(), Some("@Doe2020"));
        assert_eq!(buffer.text, "see @Doe2020");
        // local entries come in file order with markup stripped
        assert_eq!(picker.shown[0][0].primary, "Doe2020 - On DNA");
        assert_eq!(picker.shown[0][1].primary, "Roe1999 - Books");
    }

    #[test]
    fn test_key_only_mode() {
        let mut fx = fixture(Providers::none(), |s| {
            s.citation_format = CitationFormat::new("[@%s]").unwrap();
        });
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(1)]),
            ..Default::default()
        };
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::KeyOnly, host)
        })
        .unwrap();
        assert_eq!(buffer.text, "Roe1999");
    }

    #[test]
    fn test_cancelled_search_inserts_nothing() {
        let mut fx = fixture(Providers::none(), |_| {});
        let mut picker = ScriptedPicker::default();
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        let inserted = run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::Citation, host)
        })
        .unwrap();
        assert_eq!(inserted, None);
        assert_eq!(buffer.text, "");
    }

    #[test]
    fn test_remote_search_appends_and_cites() {
        let providers = Providers {
            works: Some(Box::new(FixedWorks(vec![doe_work()]))),
            ..Providers::none()
        };
        let mut fx = fixture(providers, |s| {
            s.citation_format = CitationFormat::new("[@%s]").unwrap();
            s.auto_merge_citations = true;
        });
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(2), Some(0)]),
            answers: VecDeque::from([Some("fresh".to_string())]),
            ..Default::default()
        };
        let mut buffer = TextBuffer::at_end("[@Roe1999]");
        let mut log = NoticeLog::default();

        let inserted = run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::Citation, host)
        })
        .unwrap();

        // Doe2020 is taken locally, so the new entry gets a suffix
        assert_eq!(inserted.as_deref(), Some("[@Doe2020a]"));
        assert_eq!(buffer.text, "[@Roe1999; @Doe2020a]");
        assert_eq!(picker.prompts, vec!["Search CrossRef"]);
        // local entries first, then the trigger
        let first: Vec<_> = picker.shown[0].iter().map(|c| c.primary.as_str()).collect();
        assert_eq!(
            first,
            vec!["Doe2020 - On DNA", "Roe1999 - Books", "Search CrossRef"]
        );
        assert_eq!(picker.shown[1][0].primary, "Doe2020a - Fresh Result");

        let text = fs::read_to_string(&fx.bib).unwrap();
        assert!(text.contains("@article{Doe2020a,"));
        let keys = fx.session.store().citekeys().unwrap();
        assert!(keys.contains("Doe2020a"));
    }

    #[test]
    fn test_key_rebuilt_when_taken_before_append() {
        let providers = Providers {
            works: Some(Box::new(FixedWorks(vec![doe_work()]))),
            ..Providers::none()
        };
        let mut fx = fixture(providers, |_| {});
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(2), Some(0)]),
            answers: VecDeque::from([Some("fresh".to_string())]),
            ..Default::default()
        };

        // another writer adds Doe2020a between mapping and append
        struct RacingPicker<'a> {
            inner: &'a mut ScriptedPicker,
            bib: PathBuf,
        }
        impl Picker for RacingPicker<'_> {
            fn choose(&mut self, choices: &[Choice]) -> Option<usize> {
                if !self.inner.shown.is_empty() {
                    let mut text = fs::read_to_string(&self.bib).unwrap();
                    text.push_str("\n@misc{Doe2020a,\n  title = {Raced}\n}\n");
                    fs::write(&self.bib, text).unwrap();
                    let file = fs::OpenOptions::new().write(true).open(&self.bib).unwrap();
                    file.set_modified(
                        std::time::SystemTime::now() + std::time::Duration::from_secs(10),
                    )
                    .unwrap();
                }
                self.inner.choose(choices)
            }
            fn prompt(&mut self, label: &str) -> Option<String> {
                self.inner.prompt(label)
            }
        }

        let mut racing = RacingPicker {
            inner: &mut picker,
            bib: fx.bib.clone(),
        };
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();
        let mut host = Host {
            picker: &mut racing,
            edit: &mut buffer,
            status: &mut log,
        };
        let inserted = fx.session.search(SearchMode::KeyOnly, &mut host).unwrap();

        assert_eq!(inserted.as_deref(), Some("Doe2020b"));
        assert!(fs::read_to_string(&fx.bib).unwrap().contains("@article{Doe2020b,"));
    }

    #[test]
    fn test_empty_remote_results_give_notice() {
        let providers = Providers {
            biomedical: Some(Box::new(NoBiomedical)),
            ..Providers::none()
        };
        let mut fx = fixture(providers, |_| {});
        let before = fs::read_to_string(&fx.bib).unwrap();
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(2)]),
            answers: VecDeque::from([Some("nothing".to_string())]),
            ..Default::default()
        };
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        let inserted = run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::Citation, host)
        })
        .unwrap();

        assert_eq!(inserted, None);
        assert_eq!(log.messages, vec!["PubMed query gave no results"]);
        assert_eq!(fs::read_to_string(&fx.bib).unwrap(), before);
        assert_eq!(picker.shown.len(), 1);
    }

    #[test]
    fn test_filtered_works_never_appended() {
        let no_author: CrossrefWork = serde_json::from_str(
            r#"{"type": "journal-article", "title": ["Anon"], "issued": {"date-parts": [[2001]]}}"#,
        )
        .unwrap();
        let providers = Providers {
            works: Some(Box::new(FixedWorks(vec![no_author]))),
            ..Providers::none()
        };
        let mut fx = fixture(providers, |_| {});
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(2)]),
            answers: VecDeque::from([Some("anon".to_string())]),
            ..Default::default()
        };
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::Citation, host)
        })
        .unwrap();
        assert_eq!(log.messages, vec!["CrossRef query gave no results"]);
        assert_eq!(fx.session.store().citekeys().unwrap().len(), 2);
    }

    #[test]
    fn test_preprint_detail_fetched_for_picked_brief() {
        let preprints = std::rc::Rc::new(ScriptedPreprints::default());
        struct Shared(std::rc::Rc<ScriptedPreprints>);
        impl PreprintSearch for Shared {
            fn search(&self, query: &str) -> std::result::Result<Vec<PreprintBrief>, SourceError> {
                self.0.search(query)
            }
            fn fetch_detail(&self, id: &str) -> std::result::Result<PreprintDetail, SourceError> {
                self.0.fetch_detail(id)
            }
        }
        let providers = Providers {
            preprints: Some(Box::new(Shared(preprints.clone()))),
            ..Providers::none()
        };
        let mut fx = fixture(providers, |_| {});
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(2), Some(1)]),
            answers: VecDeque::from([Some("engines".to_string())]),
            ..Default::default()
        };
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        let inserted = run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::Citation, host)
        })
        .unwrap();

        assert_eq!(picker.prompts, vec!["Search ChemRxiv"]);
        assert_eq!(picker.shown[0][2].primary, "Search ChemRxiv");
        assert_eq!(picker.shown[1].len(), 2);
        assert_eq!(*preprints.fetched.borrow(), vec!["b2"]);
        assert_eq!(inserted.as_deref(), Some("@AdaLovelace2021"));
        assert_eq!(buffer.text, "@AdaLovelace2021");

        let text = fs::read_to_string(&fx.bib).unwrap();
        assert!(text.contains("@unpublished{AdaLovelace2021,"));
        assert!(text.contains(r"note = {ChemRxiv. Preprint. \url{https://doi.org/10.26434/chemrxiv-2021-x}},"));
        let stored = fx.session.store().find("AdaLovelace2021").unwrap().unwrap();
        assert_eq!(stored.entry_type(), "unpublished");
        assert_eq!(stored.get("keywords"), Some("analytical engine"));
    }

    #[test]
    fn test_provider_failure_reaches_status_line() {
        let providers = Providers {
            works: Some(Box::new(FailingWorks)),
            ..Providers::none()
        };
        let mut fx = fixture(providers, |_| {});
        let before = fs::read_to_string(&fx.bib).unwrap();
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(2)]),
            answers: VecDeque::from([Some("busy".to_string())]),
            ..Default::default()
        };
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        let result = run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::Citation, host)
        });

        assert!(matches!(result, Err(CiterError::Source(SourceError::RateLimit))));
        assert_eq!(
            log.messages,
            vec!["CrossRef query failed: Rate limited by provider"]
        );
        assert_eq!(buffer.text, "");
        assert_eq!(fs::read_to_string(&fx.bib).unwrap(), before);
    }

    #[test]
    fn test_triggers_hidden_without_output_path() {
        let providers = Providers {
            works: Some(Box::new(FixedWorks(Vec::new()))),
            ..Providers::none()
        };
        let mut fx = fixture(providers, |s| s.output_path = None);
        let mut picker = ScriptedPicker::default();
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::Citation, host)
        })
        .unwrap();
        assert_eq!(picker.shown[0].len(), 2);
        assert_eq!(picker.shown[0][0].primary, "Doe2020 - On DNA");
    }

    #[test]
    fn test_show_keys_uses_sorted_menu() {
        let mut fx = fixture(Providers::none(), |s| {
            s.quickview = crate::menu::QuickViewTemplate::new("{title}\n{author}");
        });
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(0)]),
            ..Default::default()
        };
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        run(&mut picker, &mut buffer, &mut log, |host| fx.session.show_keys(host)).unwrap();

        assert_eq!(picker.shown[0][0], Choice::new("Books", "Roe, Rick et. al"));
        assert_eq!(picker.shown[0][1], Choice::new("On {DNA}", "Doe, Jane"));
        assert_eq!(buffer.text, "@Roe1999");
    }

    #[test]
    fn test_insert_title() {
        let mut fx = fixture(Providers::none(), |_| {});
        let mut picker = ScriptedPicker {
            picks: VecDeque::from([Some(0)]),
            ..Default::default()
        };
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        // titles go in as stored, braces included
        run(&mut picker, &mut buffer, &mut log, |host| fx.session.insert_title(host)).unwrap();
        assert_eq!(buffer.text, "On {DNA}");
    }

    #[test]
    fn test_completions() {
        let mut fx = fixture(Providers::none(), |_| {});
        let completions = fx.session.completions("@roe").unwrap();
        assert_eq!(completions.keys, vec!["Roe1999"]);
        assert!(completions.hide_others);

        let none = fx.session.completions("zzz").unwrap();
        assert!(none.keys.is_empty());
        assert!(!none.hide_others);

        let mut off = fixture(Providers::none(), |s| s.enable_completions = false);
        assert_eq!(off.session.completions("").unwrap(), Completions::default());
    }

    #[test]
    fn test_should_search_on_completion() {
        let fx = fixture(Providers::none(), |s| s.use_search_for_completions = true);
        assert!(fx.session.should_search_on_completion("as shown [@"));
        assert!(fx.session.should_search_on_completion("see [@Doe2020; @"));
        assert!(!fx.session.should_search_on_completion("plain text"));

        let off = fixture(Providers::none(), |_| {});
        assert!(!off.session.should_search_on_completion("as shown [@"));
    }

    #[test]
    fn test_combine_citations() {
        let fx = fixture(Providers::none(), |_| {});
        let mut buffer = TextBuffer::at_end("[@a][@b] and [@c][@d][@e]");
        assert_eq!(fx.session.combine_citations(&mut buffer), 3);
        assert_eq!(buffer.text, "[@a; @b] and [@c; @d; @e]");
    }

    #[test]
    fn test_use_document_adds_front_matter_bibliography() {
        let mut fx = fixture(Providers::none(), |_| {});
        let folder = fx.bib.parent().unwrap().to_path_buf();
        fs::write(
            folder.join("paper.bib"),
            "@misc{Extra2021,\n  title = {Extra}\n}\n",
        )
        .unwrap();
        let doc = folder.join("paper.md");
        let text = "---\nbibliography: paper.bib\n---\n# Paper\n";
        fs::write(&doc, text).unwrap();

        let found = fx.session.use_document(&doc, text).unwrap();
        assert!(found.ends_with("paper.bib"));
        assert!(fx.session.store().citekeys().unwrap().contains("Extra2021"));
    }

    #[test]
    fn test_missing_bibliography_is_reported() {
        let mut fx = fixture(Providers::none(), |s| {
            s.bibliography_paths.push(PathBuf::from("/nonexistent/other.bib"));
        });
        let mut picker = ScriptedPicker::default();
        let mut buffer = TextBuffer::default();
        let mut log = NoticeLog::default();

        run(&mut picker, &mut buffer, &mut log, |host| {
            fx.session.search(SearchMode::Citation, host)
        })
        .unwrap();
        assert_eq!(
            log.messages,
            vec!["WARNING: BibTex file /nonexistent/other.bib not found"]
        );
        assert_eq!(picker.shown[0].len(), 2);
    }
}
