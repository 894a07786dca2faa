//! citer-core: citation key lookup and insertion
//!
//! This library provides:
//! - Text normalization and cite key synthesis
//! - Record mappers for Crossref, PubMed and ChemRxiv results
//! - A bibliography store that reloads on file modification
//! - Append-only writes of new entries
//! - Front-matter bibliography discovery
//! - [`CiterSession`], which drives search and insertion through the
//!   [`host`] traits
//!
//! HTTP clients for the remote providers sit behind the `native` feature.

pub mod append;
pub mod cite_key;
pub mod config;
pub mod error;
pub mod front_matter;
pub mod host;
pub mod http;
pub mod menu;
pub mod session;
pub mod sources;
pub mod store;
pub mod text;

pub use append::AppendEngine;
pub use cite_key::{synthesize, CitekeySet, KeySeed};
pub use config::{CitationFormat, CiterConfig, Settings};
pub use error::{AppendError, CiterError, ConfigError, Result, StoreError};
pub use front_matter::{discover_bibliography, FrontMatterCache};
pub use host::{Choice, EditPoint, NoticeLog, Picker, StatusLine, TextBuffer};
pub use menu::{build_menu, EntrySummary, MenuEntry, QuickViewTemplate};
pub use session::{CiterSession, Completions, Host, Providers, SearchMode};
pub use sources::{
    map_batch, map_raw_record, MappedEntry, MappingOptions, RawProviderRecord, SourceError,
    SourceMetadata,
};
pub use store::{
    BibCodec, BibliographyStore, BibtexCodec, ModificationLedger, PathStatus, RefreshReport,
};

pub use citer_bibtex::BibRecord;
