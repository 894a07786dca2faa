//! Crossref source plugin for works search
//!
//! API docs: https://api.crossref.org/swagger-ui/index.html
//! Rate limit: Polite pool with `mailto`, ~50 req/sec

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::traits::{SourceError, SourceMetadata};
use super::MappedEntry;
use crate::cite_key::{CitekeySet, KeySeed};
use crate::menu::EntrySummary;
use crate::text::condense_whitespace;
use citer_bibtex::BibRecord;

#[cfg(feature = "native")]
use super::traits::WorksSearch;
#[cfg(feature = "native")]
use crate::http::HttpClient;

/// Year placeholder for undated book chapters
pub const UNDATED_CHAPTER_YEAR: &str = "INBOOK";

const BOOK_CHAPTER: &str = "book-chapter";

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefMessage,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CrossrefMessage {
    WorkList(CrossrefWorkList),
    Work(Box<CrossrefWork>),
}

#[derive(Debug, Deserialize)]
struct CrossrefWorkList {
    items: Vec<CrossrefWork>,
}

/// One item of a works query
///
/// Date objects (`issued`, `published-print`, ...) stay in `other` since
/// which one supplies the year is a setting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossrefWork {
    #[serde(rename = "type", default)]
    pub work_type: String,
    #[serde(default)]
    pub title: Vec<String>,
    pub author: Option<Vec<CrossrefPerson>>,
    #[serde(default)]
    pub editor: Vec<CrossrefPerson>,
    #[serde(rename = "container-title", default)]
    pub container_title: Vec<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub page: Option<String>,
    pub publisher: Option<String>,
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossrefPerson {
    pub given: Option<String>,
    pub family: Option<String>,
    /// Organizations come with a name only
    pub name: Option<String>,
}

impl CrossrefPerson {
    /// `"Family, Given"`
    pub fn display(&self) -> String {
        let family = self
            .family
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default();
        match self.given.as_deref() {
            Some(given) if !given.is_empty() => format!("{}, {}", family, given),
            _ => family.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CrossrefDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CrossrefWork {
    /// First component of the named date object
    pub fn year(&self, date_field: &str) -> Option<i32> {
        let value = self.other.get(date_field)?;
        let date: CrossrefDate = serde_json::from_value(value.clone()).ok()?;
        date.date_parts.first()?.first().copied().flatten()
    }

    /// Works without authors are dropped, as are works without a usable
    /// date unless they are book chapters
    pub fn is_citable(&self, date_field: &str) -> bool {
        self.author.is_some() && (self.work_type == BOOK_CHAPTER || self.year(date_field).is_some())
    }

    fn first_family_name(&self) -> &str {
        self.author
            .as_deref()
            .and_then(|authors| authors.first())
            .and_then(|a| a.family.as_deref().or(a.name.as_deref()))
            .unwrap_or_default()
    }
}

const STANDARD_TYPES: [&str; 14] = [
    "article",
    "book",
    "booklet",
    "conference",
    "inbook",
    "incollection",
    "inproceedings",
    "manual",
    "mastersthesis",
    "misc",
    "phdthesis",
    "proceedings",
    "techreport",
    "unpublished",
];

/// Crossref work type to BibTeX entry type; unknown types become `article`
pub fn entry_type_for(work_type: &str) -> &'static str {
    match work_type {
        "journal-article" => "article",
        "book-chapter" => "incollection",
        "proceedings-article" => "inproceedings",
        other => STANDARD_TYPES
            .iter()
            .find(|t| **t == other)
            .copied()
            .unwrap_or("article"),
    }
}

fn join_people(people: &[CrossrefPerson], separator: &str) -> String {
    people
        .iter()
        .map(CrossrefPerson::display)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Map a works record; `None` when the filter rejects it
pub fn map_work(
    work: &CrossrefWork,
    date_field: &str,
    existing: &CitekeySet,
) -> Option<MappedEntry> {
    if !work.is_citable(date_field) {
        debug!(doi = ?work.doi, "skipping Crossref work without author or date");
        return None;
    }

    let year = match work.year(date_field) {
        Some(year) => year.to_string(),
        None if work.work_type == BOOK_CHAPTER => UNDATED_CHAPTER_YEAR.to_string(),
        None => String::new(),
    };
    let authors = work.author.as_deref().unwrap_or_default();
    let entry_type = entry_type_for(&work.work_type);
    let title = condense_whitespace(work.title.first().map(String::as_str).unwrap_or_default());
    let container = condense_whitespace(
        work.container_title
            .first()
            .map(String::as_str)
            .unwrap_or_default(),
    );
    let text = |value: &Option<String>| condense_whitespace(value.as_deref().unwrap_or_default());

    let mut record = BibRecord::new("", entry_type);
    record.set("title", title.clone());
    record.set("author", condense_whitespace(&join_people(authors, " and ")));
    record.set("editor", condense_whitespace(&join_people(&work.editor, " and ")));
    record.set("year", year.clone());
    record.set("volume", text(&work.volume));
    record.set("number", text(&work.issue));
    record.set("pages", text(&work.page));
    record.set("doi", text(&work.doi));
    record.set("publisher", text(&work.publisher));
    match entry_type {
        "article" => record.set("journal", container.clone()),
        "incollection" | "inproceedings" => record.set("booktitle", container.clone()),
        _ => {}
    }

    let summary = EntrySummary {
        key: String::new(),
        title,
        author: condense_whitespace(&join_people(authors, "; ")),
        year: year.clone(),
        journal: container,
    };
    let seed = KeySeed::new(work.first_family_name(), year);
    Some(MappedEntry::new(record, seed, summary, existing))
}

pub struct CrossrefSource {
    #[cfg(feature = "native")]
    client: HttpClient,
    base_url: String,
    mailto: Option<String>,
    date_field: String,
}

impl CrossrefSource {
    pub fn metadata() -> SourceMetadata {
        SourceMetadata {
            id: "crossref",
            name: "CrossRef",
            description: "Insert a reference from the CrossRef database",
            base_url: "https://api.crossref.org",
            requires_api_key: false,
        }
    }

    /// Query URL: journal articles and book chapters, only the fields the
    /// mapper reads
    pub fn search_url(&self, query: &str, limit: u32) -> String {
        let select = [
            "title",
            "author",
            self.date_field.as_str(),
            "type",
            "volume",
            "page",
            "issue",
            "DOI",
            "container-title",
            "editor",
            "publisher",
        ]
        .join(",");
        let mut params = vec![
            ("query", query.to_string()),
            ("rows", limit.to_string()),
            ("filter", "type:journal-article,type:book-chapter".to_string()),
            ("select", select),
        ];
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }

        format!(
            "{}/works?{}",
            self.base_url,
            params
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&")
        )
    }

    /// Parse Crossref works response
    pub fn parse_works_response(json: &str) -> Result<Vec<CrossrefWork>, SourceError> {
        let response: CrossrefResponse = serde_json::from_str(json)
            .map_err(|e| SourceError::Parse(format!("Invalid Crossref JSON: {}", e)))?;

        match response.message {
            CrossrefMessage::WorkList(list) => Ok(list.items),
            CrossrefMessage::Work(work) => Ok(vec![*work]),
        }
    }
}

#[cfg(feature = "native")]
impl CrossrefSource {
    pub fn new(mailto: Option<String>, date_field: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::new(crate::http::USER_AGENT)?,
            base_url: "https://api.crossref.org".to_string(),
            mailto,
            date_field: date_field.into(),
        })
    }
}

#[cfg(feature = "native")]
impl WorksSearch for CrossrefSource {
    fn query(&self, query: &str, limit: u32) -> Result<Vec<CrossrefWork>, SourceError> {
        if query.trim().is_empty() {
            return Err(SourceError::InvalidQuery("empty query".to_string()));
        }
        let url = self.search_url(query, limit);
        let response = self.client.get(&url, &[])?.ensure_success(&url)?;
        Self::parse_works_response(&response.body)
    }
}
