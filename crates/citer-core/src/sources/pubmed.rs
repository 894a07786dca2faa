//! PubMed source plugin for biomedical literature
//!
//! API docs: https://www.ncbi.nlm.nih.gov/books/NBK25501/
//! Rate limit: 3 requests/second without API key, 10 with key
//!
//! A search is two E-utilities calls: `esearch` for PMIDs, then `efetch`
//! for the records. efetch returns journal articles (`PubmedArticle`) and
//! book chapters (`PubmedBookArticle`), which map differently.

use chrono::{Datelike, NaiveDate};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use super::traits::{SourceError, SourceMetadata};
use super::MappedEntry;
use crate::cite_key::{CitekeySet, KeySeed};
use crate::menu::EntrySummary;
use crate::text::{condense_whitespace, parse_year};
use citer_bibtex::BibRecord;

#[cfg(feature = "native")]
use super::traits::BiomedicalSearch;
#[cfg(feature = "native")]
use crate::http::HttpClient;

/// Publication date as delivered: structured or free text (`MedlineDate`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubDate {
    Parsed(NaiveDate),
    Text(String),
}

impl PubDate {
    pub fn year(&self) -> Option<i32> {
        match self {
            PubDate::Parsed(date) => Some(date.year()),
            PubDate::Text(text) => parse_year(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubMedAuthor {
    pub last_name: Option<String>,
    pub fore_name: Option<String>,
    pub initials: Option<String>,
}

impl PubMedAuthor {
    /// `"Last, Initials First"` for the result list
    pub fn display(&self) -> String {
        format!(
            "{}, {} {}",
            self.last_name.as_deref().unwrap_or_default(),
            self.initials.as_deref().unwrap_or_default(),
            self.fore_name.as_deref().unwrap_or_default()
        )
    }

    /// `"Last, First"` for the stored record
    pub fn bibtex_name(&self) -> String {
        let last = self.last_name.as_deref().unwrap_or_default();
        match self.fore_name.as_deref() {
            Some(first) if !first.is_empty() => format!("{}, {}", last, first),
            _ => last.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubMedArticle {
    pub pmid: String,
    pub title: String,
    pub authors: Vec<PubMedAuthor>,
    pub publication_date: Option<PubDate>,
    pub journal: String,
    pub volume: String,
    pub issue: String,
    pub pages: String,
    pub keywords: Vec<String>,
    pub doi: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubMedBookArticle {
    pub pmid: String,
    pub title: String,
    pub authors: Vec<PubMedAuthor>,
    pub publication_date: Option<PubDate>,
    pub collection_title: String,
    pub doi: Option<String>,
}

/// The two efetch record variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubMedRecord {
    Article(PubMedArticle),
    Book(PubMedBookArticle),
}

impl PubMedRecord {
    pub fn pmid(&self) -> &str {
        match self {
            PubMedRecord::Article(a) => &a.pmid,
            PubMedRecord::Book(b) => &b.pmid,
        }
    }

    fn common(&self) -> (&str, &[PubMedAuthor], Option<&PubDate>, Option<&str>) {
        match self {
            PubMedRecord::Article(a) => (
                a.title.as_str(),
                a.authors.as_slice(),
                a.publication_date.as_ref(),
                a.doi.as_deref(),
            ),
            PubMedRecord::Book(b) => (
                b.title.as_str(),
                b.authors.as_slice(),
                b.publication_date.as_ref(),
                b.doi.as_deref(),
            ),
        }
    }
}

/// Map either variant; journal articles keep journal details, book
/// chapters become `incollection` with the collection as `booktitle`
pub fn map_pubmed(record: &PubMedRecord, existing: &CitekeySet) -> MappedEntry {
    let (title, authors, date, doi) = record.common();
    let year = date
        .and_then(PubDate::year)
        .map(|y| y.to_string())
        .unwrap_or_default();
    let title = condense_whitespace(title);

    let mut out = BibRecord::new("", "article");
    out.set("title", title.clone());
    out.set("year", year.clone());
    out.set("doi", condense_whitespace(doi.unwrap_or_default()));
    out.set(
        "author",
        condense_whitespace(
            &authors
                .iter()
                .map(PubMedAuthor::bibtex_name)
                .collect::<Vec<_>>()
                .join(" and "),
        ),
    );

    let container = match record {
        PubMedRecord::Article(article) => {
            let journal = condense_whitespace(&article.journal);
            out.set("volume", condense_whitespace(&article.volume));
            out.set("number", condense_whitespace(&article.issue));
            out.set("pages", condense_whitespace(&article.pages));
            out.set("journal", journal.clone());
            out.set("keywords", condense_whitespace(&article.keywords.join(", ")));
            journal
        }
        PubMedRecord::Book(book) => {
            let collection = condense_whitespace(&book.collection_title);
            out.set("type", "incollection");
            out.set("booktitle", collection.clone());
            collection
        }
    };

    let summary = EntrySummary {
        key: String::new(),
        title,
        author: condense_whitespace(
            &authors
                .iter()
                .map(PubMedAuthor::display)
                .collect::<Vec<_>>()
                .join("; "),
        ),
        year: year.clone(),
        journal: container,
    };
    let surname = authors
        .first()
        .and_then(|a| a.last_name.as_deref())
        .unwrap_or_default();
    let seed = KeySeed::new(surname, year).with_fallback(format!("PMID{}", record.pmid()));
    MappedEntry::new(out, seed, summary, existing)
}

/// Parser state for one efetch record
#[derive(Default)]
struct RecordBuilder {
    is_book: bool,
    pmid: String,
    title: String,
    book_title: String,
    collection_title: String,
    journal: String,
    volume: String,
    issue: String,
    pages: String,
    keywords: Vec<String>,
    doi: Option<String>,
    authors: Vec<PubMedAuthor>,
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    medline_date: Option<String>,
}

impl RecordBuilder {
    fn publication_date(&self) -> Option<PubDate> {
        if let Some(year) = self.year {
            let date = NaiveDate::from_ymd_opt(year, self.month.unwrap_or(1), self.day.unwrap_or(1));
            if let Some(date) = date {
                return Some(PubDate::Parsed(date));
            }
            return Some(PubDate::Text(year.to_string()));
        }
        self.medline_date.clone().map(PubDate::Text)
    }

    fn finish(self) -> PubMedRecord {
        let publication_date = self.publication_date();
        if self.is_book {
            let title = if self.title.is_empty() {
                self.book_title.clone()
            } else {
                self.title
            };
            let collection_title = if self.collection_title.is_empty() {
                self.book_title
            } else {
                self.collection_title
            };
            PubMedRecord::Book(PubMedBookArticle {
                pmid: self.pmid,
                title,
                authors: self.authors,
                publication_date,
                collection_title,
                doi: self.doi,
            })
        } else {
            PubMedRecord::Article(PubMedArticle {
                pmid: self.pmid,
                title: self.title,
                authors: self.authors,
                publication_date,
                journal: self.journal,
                volume: self.volume,
                issue: self.issue,
                pages: self.pages,
                keywords: self.keywords,
                doi: self.doi,
            })
        }
    }
}

/// Route one text node to the field its element path names
fn apply_text(
    builder: &mut RecordBuilder,
    author: Option<&mut PubMedAuthor>,
    path: &[String],
    text: String,
    (article_id_is_doi, elocation_is_doi): (bool, bool),
) {
    let element = path.last().map(String::as_str).unwrap_or_default();
    let parent = path
        .len()
        .checked_sub(2)
        .and_then(|i| path.get(i))
        .map(String::as_str)
        .unwrap_or_default();
    let inside = |tag: &str| path.iter().any(|p| p == tag);

    if let Some(a) = author {
        match element {
            "LastName" | "CollectiveName" => a.last_name = Some(text),
            "ForeName" => a.fore_name = Some(text),
            "Initials" => a.initials = Some(text),
            _ => {}
        }
    } else if inside("ArticleTitle") {
        push_text(&mut builder.title, &text);
    } else if inside("BookTitle") {
        push_text(&mut builder.book_title, &text);
    } else if inside("CollectionTitle") {
        push_text(&mut builder.collection_title, &text);
    } else if inside("Keyword") {
        builder.keywords.push(text);
    } else {
        match (element, parent) {
            ("PMID", _) if builder.pmid.is_empty() => builder.pmid = text,
            ("Title", "Journal") => builder.journal = text,
            ("Volume", _) => builder.volume = text,
            ("Issue", _) => builder.issue = text,
            ("MedlinePgn", _) => builder.pages = text,
            ("Year", "PubDate") => builder.year = text.parse().ok(),
            ("Month", "PubDate") => builder.month = month_number(&text),
            ("Day", "PubDate") => builder.day = text.parse().ok(),
            ("MedlineDate", _) => builder.medline_date = Some(text),
            ("ArticleId", _) if article_id_is_doi => builder.doi = Some(text),
            ("ELocationID", _) if elocation_is_doi && builder.doi.is_none() => {
                builder.doi = Some(text)
            }
            _ => {}
        }
    }
}

fn attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn push_text(target: &mut String, text: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

fn month_number(text: &str) -> Option<u32> {
    if let Ok(n) = text.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let prefix: String = text.chars().take(3).collect::<String>().to_lowercase();
    [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|m| *m == prefix)
    .map(|i| i as u32 + 1)
}

pub struct PubMedSource {
    #[cfg(feature = "native")]
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
}

impl PubMedSource {
    pub fn metadata() -> SourceMetadata {
        SourceMetadata {
            id: "pubmed",
            name: "PubMed",
            description: "Insert a reference from the PubMed database",
            base_url: "https://pubmed.ncbi.nlm.nih.gov",
            requires_api_key: false, // Optional but recommended
        }
    }

    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("db", "pubmed".to_string()), ("tool", "citer".to_string())];
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    fn url(&self, endpoint: &str, params: Vec<(&'static str, String)>) -> String {
        format!(
            "{}/{}?{}",
            self.base_url,
            endpoint,
            params
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&")
        )
    }

    pub fn esearch_url(&self, query: &str, limit: u32) -> String {
        let mut params = self.common_params();
        params.push(("term", query.to_string()));
        params.push(("retmax", limit.to_string()));
        self.url("esearch.fcgi", params)
    }

    pub fn efetch_url(&self, pmids: &[String]) -> String {
        let mut params = self.common_params();
        params.push(("id", pmids.join(",")));
        params.push(("retmode", "xml".to_string()));
        self.url("efetch.fcgi", params)
    }

    /// Parse PubMed XML response (efetch format)
    pub fn parse_efetch_response(xml: &str) -> Result<Vec<PubMedRecord>, SourceError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut results = Vec::new();
        let mut buf = Vec::new();

        let mut path: Vec<String> = Vec::new();
        let mut current: Option<RecordBuilder> = None;
        let mut author: Option<PubMedAuthor> = None;
        let mut editors_list = false;
        let mut article_id_is_doi = false;
        let mut elocation_is_doi = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    match name.as_str() {
                        "PubmedArticle" => current = Some(RecordBuilder::default()),
                        "PubmedBookArticle" => {
                            current = Some(RecordBuilder {
                                is_book: true,
                                ..RecordBuilder::default()
                            })
                        }
                        "AuthorList" => {
                            editors_list = attribute(e, b"Type").as_deref() == Some("editors")
                        }
                        "Author" if !editors_list => author = Some(PubMedAuthor::default()),
                        "ArticleId" => {
                            article_id_is_doi = attribute(e, b"IdType").as_deref() == Some("doi")
                        }
                        "ELocationID" => {
                            elocation_is_doi = attribute(e, b"EIdType").as_deref() == Some("doi")
                        }
                        _ => {}
                    }
                    path.push(name);
                }
                Ok(Event::End(ref e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    path.pop();
                    match name.as_str() {
                        "PubmedArticle" | "PubmedBookArticle" => {
                            if let Some(builder) = current.take() {
                                results.push(builder.finish());
                            }
                        }
                        "Author" => {
                            if let (Some(a), Some(builder)) = (author.take(), current.as_mut()) {
                                builder.authors.push(a);
                            }
                        }
                        "AuthorList" => editors_list = false,
                        _ => {}
                    }
                }
                Ok(Event::Text(e)) => {
                    let in_references = path
                        .iter()
                        .any(|p| p == "ReferenceList" || p == "CommentsCorrections");
                    if let (Some(builder), false) = (current.as_mut(), in_references) {
                        let text = e.unescape().unwrap_or_default().to_string();
                        let doi_flags = (article_id_is_doi, elocation_is_doi);
                        apply_text(builder, author.as_mut(), &path, text, doi_flags);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
                _ => {}
            }
            buf.clear();
        }

        debug!(count = results.len(), "parsed PubMed efetch response");
        Ok(results)
    }

    /// Parse esearch response to get PMIDs
    pub fn parse_esearch_response(xml: &str) -> Result<Vec<String>, SourceError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut pmids = Vec::new();
        let mut buf = Vec::new();
        let mut in_id = false;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    if e.name().as_ref() == b"Id" {
                        in_id = true;
                    }
                }
                Ok(Event::End(ref e)) => {
                    if e.name().as_ref() == b"Id" {
                        in_id = false;
                    }
                }
                Ok(Event::Text(e)) if in_id => {
                    let text = e.unescape().unwrap_or_default().to_string();
                    pmids.push(text);
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(SourceError::Parse(format!("XML parse error: {}", e))),
                _ => {}
            }
            buf.clear();
        }

        Ok(pmids)
    }
}

#[cfg(feature = "native")]
impl PubMedSource {
    pub fn new(api_key: Option<String>, email: Option<String>) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::new(crate::http::USER_AGENT)?,
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            api_key,
            email,
        })
    }
}

#[cfg(feature = "native")]
impl BiomedicalSearch for PubMedSource {
    fn query(&self, query: &str, limit: u32) -> Result<Vec<PubMedRecord>, SourceError> {
        if query.trim().is_empty() {
            return Err(SourceError::InvalidQuery("empty query".to_string()));
        }

        let url = self.esearch_url(query, limit);
        let response = self.client.get(&url, &[])?.ensure_success(&url)?;
        let pmids = Self::parse_esearch_response(&response.body)?;
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.efetch_url(&pmids);
        let response = self.client.get(&url, &[])?.ensure_success(&url)?;
        Self::parse_efetch_response(&response.body)
    }
}
