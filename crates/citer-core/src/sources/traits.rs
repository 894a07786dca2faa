//! Common traits for source plugins
//!
//! Each provider declares which record variant it returns, so mapping is
//! resolved at this boundary instead of by inspecting record shapes.

use thiserror::Error;

use super::chemrxiv::{ChemRxivSource, PreprintBrief, PreprintDetail};
use super::crossref::{CrossrefSource, CrossrefWork};
use super::pubmed::{PubMedRecord, PubMedSource};
use crate::http::HttpError;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(HttpError),
    #[error("Could not parse response: {0}")]
    Parse(String),
    #[error("Rate limited by provider")]
    RateLimit,
    #[error("Record not found")]
    NotFound,
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl From<HttpError> for SourceError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::RateLimited => SourceError::RateLimit,
            other => SourceError::Http(other),
        }
    }
}

/// Metadata about a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub base_url: &'static str,
    pub requires_api_key: bool,
}

/// Works search (Crossref)
pub trait WorksSearch {
    fn describe(&self) -> SourceMetadata {
        CrossrefSource::metadata()
    }

    fn query(&self, query: &str, limit: u32) -> Result<Vec<CrossrefWork>, SourceError>;
}

/// Biomedical literature search (PubMed)
pub trait BiomedicalSearch {
    fn describe(&self) -> SourceMetadata {
        PubMedSource::metadata()
    }

    fn query(&self, query: &str, limit: u32) -> Result<Vec<PubMedRecord>, SourceError>;
}

/// Preprint repository search (ChemRxiv); briefs first, detail on pick
pub trait PreprintSearch {
    fn describe(&self) -> SourceMetadata {
        ChemRxivSource::metadata()
    }

    fn search(&self, query: &str) -> Result<Vec<PreprintBrief>, SourceError>;
    fn fetch_detail(&self, id: &str) -> Result<PreprintDetail, SourceError>;
}
