//! ChemRxiv source plugin (figshare API)
//!
//! API docs: https://docs.figshare.com/
//! Search returns brief records only; the authors, DOI and tags of a
//! preprint come from a second request once the user has picked one.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::traits::{SourceError, SourceMetadata};
use super::MappedEntry;
use crate::cite_key::{CitekeySet, KeySeed};
use crate::menu::EntrySummary;
use crate::text::{condense_whitespace, parse_year};
use citer_bibtex::BibRecord;

#[cfg(feature = "native")]
use super::traits::PreprintSearch;
#[cfg(feature = "native")]
use crate::http::HttpClient;

/// figshare item type for preprints
pub const PREPRINT_ITEM_TYPE: u32 = 12;

pub const REPOSITORY_NAME: &str = "ChemRxiv";

/// figshare ids are numbers; they are handled as text throughout
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(u64),
        Text(String),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}

/// One search hit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprintBrief {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub published_date: String,
}

impl PreprintBrief {
    /// Picker values: the id stands in for the key until the detail is in
    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            key: self.id.clone(),
            title: condense_whitespace(&self.title),
            author: String::new(),
            year: parse_year(&self.published_date)
                .map(|y| y.to_string())
                .unwrap_or_default(),
            journal: REPOSITORY_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprintAuthor {
    #[serde(default)]
    pub full_name: String,
}

/// Full article record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprintDetail {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<PreprintAuthor>,
    #[serde(default)]
    pub published_date: String,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Attribution note pointing at the DOI
pub fn preprint_note(doi: &str) -> String {
    format!("{}. Preprint. \\url{{https://doi.org/{}}}", REPOSITORY_NAME, doi)
}

/// Map a fetched preprint to an `unpublished` record
pub fn map_preprint(detail: &PreprintDetail, existing: &CitekeySet) -> MappedEntry {
    let year = parse_year(&detail.published_date)
        .map(|y| y.to_string())
        .unwrap_or_default();
    let title = condense_whitespace(&detail.title);
    let doi = condense_whitespace(&detail.doi);
    let authors: Vec<String> = detail
        .authors
        .iter()
        .map(|a| condense_whitespace(&a.full_name))
        .collect();

    let mut record = BibRecord::new("", "unpublished");
    record.set("title", title.clone());
    record.set("year", year.clone());
    record.set("doi", doi.clone());
    record.set("author", authors.join(" and "));
    record.set("note", preprint_note(&doi));
    record.set("keywords", condense_whitespace(&detail.tags.join(", ")));

    let summary = EntrySummary {
        key: String::new(),
        title,
        author: authors.join("; "),
        year: year.clone(),
        journal: REPOSITORY_NAME.to_string(),
    };
    let surname = detail
        .authors
        .first()
        .map(|a| a.full_name.as_str())
        .unwrap_or_default();
    let seed =
        KeySeed::new(surname, year).with_fallback(format!("{}{}", REPOSITORY_NAME, detail.id));
    MappedEntry::new(record, seed, summary, existing)
}

pub struct ChemRxivSource {
    #[cfg(feature = "native")]
    client: HttpClient,
    base_url: String,
    token: String,
}

impl ChemRxivSource {
    pub fn metadata() -> SourceMetadata {
        SourceMetadata {
            id: "chemrxiv",
            name: "ChemRxiv",
            description: "Insert a reference from the ChemRxiv database",
            base_url: "https://api.figshare.com/v2",
            requires_api_key: true,
        }
    }

    pub fn search_body(query: &str) -> serde_json::Value {
        serde_json::json!({
            "item_type": PREPRINT_ITEM_TYPE,
            "search_for": query,
        })
    }

    pub fn parse_search_response(json: &str) -> Result<Vec<PreprintBrief>, SourceError> {
        serde_json::from_str(json)
            .map_err(|e| SourceError::Parse(format!("Invalid figshare search JSON: {}", e)))
    }

    pub fn parse_article_response(json: &str) -> Result<PreprintDetail, SourceError> {
        serde_json::from_str(json)
            .map_err(|e| SourceError::Parse(format!("Invalid figshare article JSON: {}", e)))
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.token)
    }
}

#[cfg(feature = "native")]
impl ChemRxivSource {
    pub fn new(token: impl Into<String>) -> Result<Self, SourceError> {
        Ok(Self {
            client: HttpClient::new(crate::http::USER_AGENT)?,
            base_url: "https://api.figshare.com/v2".to_string(),
            token: token.into(),
        })
    }
}

#[cfg(feature = "native")]
impl PreprintSearch for ChemRxivSource {
    fn search(&self, query: &str) -> Result<Vec<PreprintBrief>, SourceError> {
        if query.trim().is_empty() {
            return Err(SourceError::InvalidQuery("empty query".to_string()));
        }
        let url = format!("{}/articles/search", self.base_url);
        let auth = self.auth_header();
        let response = self
            .client
            .post_json(&url, &Self::search_body(query), &[("Authorization", &auth)])?
            .ensure_success(&url)?;
        let briefs = Self::parse_search_response(&response.body)?;
        debug!(count = briefs.len(), "ChemRxiv search");
        Ok(briefs)
    }

    fn fetch_detail(&self, id: &str) -> Result<PreprintDetail, SourceError> {
        let url = format!("{}/articles/{}", self.base_url, urlencoding::encode(id));
        let auth = self.auth_header();
        let response = self.client.get(&url, &[("Authorization", &auth)])?;
        if response.status == 404 {
            return Err(SourceError::NotFound);
        }
        let response = response.ensure_success(&url)?;
        Self::parse_article_response(&response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_JSON: &str = r#"[
        {"id": 14200001, "title": "Catalysis   in\nwater", "published_date": "2021-02-03T10:00:00Z", "doi": "10.26434/x"},
        {"id": "abc", "title": "Second"}
    ]"#;

    const ARTICLE_JSON: &str = r#"{
        "id": 14200001,
        "title": "Catalysis in water",
        "authors": [{"full_name": "José  García", "id": 1}, {"full_name": "Li Wei"}],
        "published_date": "2021-02-03T10:00:00Z",
        "doi": "10.26434/chemrxiv.14200001",
        "tags": ["catalysis", "green chemistry"]
    }"#;

    #[test]
    fn test_parse_search_response() {
        let briefs = ChemRxivSource::parse_search_response(SEARCH_JSON).unwrap();
        assert_eq!(briefs.len(), 2);
        assert_eq!(briefs[0].id, "14200001");
        assert_eq!(briefs[1].id, "abc");

        let summary = briefs[0].summary();
        assert_eq!(summary.key, "14200001");
        assert_eq!(summary.title, "Catalysis in water");
        assert_eq!(summary.year, "2021");
        assert_eq!(summary.journal, "ChemRxiv");
        assert_eq!(summary.author, "");
    }

    #[test]
    fn test_map_preprint() {
        let detail = ChemRxivSource::parse_article_response(ARTICLE_JSON).unwrap();
        let entry = map_preprint(&detail, &CitekeySet::new());
        let r = &entry.record;

        assert_eq!(entry.key(), "JoseGarcia2021");
        assert_eq!(r.entry_type(), "unpublished");
        assert_eq!(r.author(), Some("José García and Li Wei"));
        assert_eq!(r.get("keywords"), Some("catalysis, green chemistry"));
        assert_eq!(
            r.get("note"),
            Some(r"ChemRxiv. Preprint. \url{https://doi.org/10.26434/chemrxiv.14200001}")
        );
    }

    #[test]
    fn test_anonymous_undated_preprint_keys_on_id() {
        let detail = PreprintDetail {
            id: "14200001".into(),
            title: "Untitled draft".into(),
            ..Default::default()
        };
        let taken: CitekeySet = ["ChemRxiv14200001"].into_iter().collect();
        assert_eq!(map_preprint(&detail, &taken).key(), "ChemRxiv14200001a");
    }

    #[test]
    fn test_search_body() {
        let body = ChemRxivSource::search_body("water");
        assert_eq!(body["item_type"], 12);
        assert_eq!(body["search_for"], "water");
    }
}
