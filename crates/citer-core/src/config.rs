//! Configuration for citer
//!
//! [`CiterConfig`] is the on-disk shape (TOML) with a default for every
//! option. [`CiterConfig::resolve`] turns it into [`Settings`], the
//! validated snapshot the rest of the crate reads: paths made absolute,
//! the citation regex compiled and the output file checked against the
//! inputs.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::menu::QuickViewTemplate;

pub const DEFAULT_CITATION_FORMAT: &str = "@%s";
pub const DEFAULT_QUICKVIEW_FORMAT: &str = "{key} - {title}";
pub const DEFAULT_CITATION_REGEX: &str = r".*\[(@[a-zA-Z0-9_-]*;\s*)*?@$";
pub const DEFAULT_RESULT_LIMIT: u32 = 20;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CITER_CONFIG";

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$(?:\{(\w+)\}|(\w+))").unwrap();
    static ref DEFAULT_CITATION_RE: Regex = Regex::new(DEFAULT_CITATION_REGEX).unwrap();
}

/// A path setting given either as one string or as a list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany", into = "Vec<String>")]
pub struct PathList(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for PathList {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(path) => PathList(vec![path]),
            OneOrMany::Many(paths) => PathList(paths),
        }
    }
}

impl From<PathList> for Vec<String> {
    fn from(value: PathList) -> Self {
        value.0
    }
}

/// Settings file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CiterConfig {
    /// Bibliography files to read
    pub bibtex_file_path: PathList,
    /// File that new entries are appended to; must be one of the inputs
    pub output_bib_file_path: PathList,
    /// Citation token, `%s` is replaced by the key
    pub citation_format: String,
    /// Display line for a record; slots `{key}`, `{title}`, `{author}`,
    /// `{year}`, `{journal}`
    pub quickview_format: String,
    /// Merge `][` between adjacent citations after inserting
    pub auto_merge_citations: bool,
    pub enable_completions: bool,
    pub hide_other_completions: bool,
    /// Open the picker when completing right after `[@`
    pub use_search_for_completions: bool,
    pub citation_regex: String,
    pub crossref: CrossrefConfig,
    pub pubmed: PubMedConfig,
    pub chemrxiv: ChemRxivConfig,
}

impl Default for CiterConfig {
    fn default() -> Self {
        Self {
            bibtex_file_path: PathList::default(),
            output_bib_file_path: PathList::default(),
            citation_format: DEFAULT_CITATION_FORMAT.to_string(),
            quickview_format: DEFAULT_QUICKVIEW_FORMAT.to_string(),
            auto_merge_citations: false,
            enable_completions: true,
            hide_other_completions: true,
            use_search_for_completions: false,
            citation_regex: DEFAULT_CITATION_REGEX.to_string(),
            crossref: CrossrefConfig::default(),
            pubmed: PubMedConfig::default(),
            chemrxiv: ChemRxivConfig::default(),
        }
    }
}

/// Works search (Crossref) settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossrefConfig {
    pub enabled: bool,
    /// Contact address for the polite pool
    pub mailto: Option<String>,
    pub limit: u32,
    /// Which date object gives the year (`issued`, `published-print`, ...)
    pub date_field: String,
}

impl Default for CrossrefConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mailto: None,
            limit: DEFAULT_RESULT_LIMIT,
            date_field: "issued".to_string(),
        }
    }
}

/// Biomedical literature (PubMed) settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubMedConfig {
    pub enabled: bool,
    pub limit: u32,
    pub api_key: Option<String>,
    pub email: Option<String>,
}

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: DEFAULT_RESULT_LIMIT,
            api_key: None,
            email: None,
        }
    }
}

/// Preprint repository (ChemRxiv via figshare) settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChemRxivConfig {
    pub enabled: bool,
    /// Required; the provider stays off without one
    pub token: Option<String>,
}

impl Default for ChemRxivConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
        }
    }
}

impl ChemRxivConfig {
    pub fn is_available(&self) -> bool {
        self.enabled && self.token.is_some()
    }
}

/// `citation_format` with its `%s` slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationFormat(String);

impl CitationFormat {
    pub fn new(format: impl Into<String>) -> Result<Self, ConfigError> {
        let format = format.into();
        if !format.contains("%s") {
            return Err(ConfigError::MissingKeySlot(format));
        }
        Ok(Self(format))
    }

    /// The bare key, used by key-only search
    pub fn key_only() -> Self {
        Self("%s".to_string())
    }

    pub fn render(&self, key: &str) -> String {
        self.0.replacen("%s", key, 1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated configuration snapshot
#[derive(Debug, Clone)]
pub struct Settings {
    pub bibliography_paths: Vec<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub citation_format: CitationFormat,
    pub quickview: QuickViewTemplate,
    pub auto_merge_citations: bool,
    pub enable_completions: bool,
    pub hide_other_completions: bool,
    pub use_search_for_completions: bool,
    pub citation_regex: Regex,
    pub crossref: CrossrefConfig,
    pub pubmed: PubMedConfig,
    pub chemrxiv: ChemRxivConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let config = CiterConfig::default();
        Self {
            bibliography_paths: Vec::new(),
            output_path: None,
            citation_format: CitationFormat(config.citation_format),
            quickview: QuickViewTemplate::new(&config.quickview_format),
            auto_merge_citations: config.auto_merge_citations,
            enable_completions: config.enable_completions,
            hide_other_completions: config.hide_other_completions,
            use_search_for_completions: config.use_search_for_completions,
            citation_regex: DEFAULT_CITATION_RE.clone(),
            crossref: config.crossref,
            pubmed: config.pubmed,
            chemrxiv: config.chemrxiv,
        }
    }
}

impl CiterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Read a config file and resolve it against the file's folder
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml(&text)?.resolve(base)
    }

    /// `$CITER_CONFIG`, else `<config dir>/citer/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("citer").join("config.toml"))
    }

    /// Validate and produce the settings snapshot
    ///
    /// Relative paths are taken from `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> Result<Settings, ConfigError> {
        let bibliography_paths: Vec<PathBuf> = self
            .bibtex_file_path
            .0
            .iter()
            .map(|p| resolve_path(p, base_dir))
            .collect();

        let outputs: Vec<PathBuf> = self
            .output_bib_file_path
            .0
            .iter()
            .map(|p| resolve_path(p, base_dir))
            .collect();
        if outputs.len() > 1 {
            return Err(ConfigError::MultipleOutputPaths(outputs.len()));
        }
        let output_path = outputs.into_iter().next();
        if let Some(output) = &output_path {
            if !bibliography_paths.contains(output) {
                return Err(ConfigError::OutputNotAmongInputs(output.clone()));
            }
        }

        let citation_regex =
            Regex::new(&self.citation_regex).map_err(|source| ConfigError::InvalidRegex {
                pattern: self.citation_regex.clone(),
                source,
            })?;

        Ok(Settings {
            bibliography_paths,
            output_path,
            citation_format: CitationFormat::new(self.citation_format.clone())?,
            quickview: QuickViewTemplate::new(&self.quickview_format),
            auto_merge_citations: self.auto_merge_citations,
            enable_completions: self.enable_completions,
            hide_other_completions: self.hide_other_completions,
            use_search_for_completions: self.use_search_for_completions,
            citation_regex,
            crossref: self.crossref.clone(),
            pubmed: self.pubmed.clone(),
            chemrxiv: self.chemrxiv.clone(),
        })
    }
}

/// Expand `~` and `$VAR`, then anchor relative paths at `base_dir`
pub fn resolve_path(raw: &str, base_dir: &Path) -> PathBuf {
    let expanded = expand_vars(raw);
    let path = match expanded.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(&expanded),
        },
        None if expanded == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from("~")),
        None => PathBuf::from(&expanded),
    };

    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

/// Unset variables are left as written
fn expand_vars(raw: &str) -> String {
    ENV_VAR
        .replace_all(raw, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CiterConfig::default();
        assert_eq!(config.citation_format, "@%s");
        assert!(config.enable_completions);
        assert!(config.hide_other_completions);
        assert!(!config.auto_merge_citations);
        assert_eq!(config.crossref.limit, 20);
        assert_eq!(config.crossref.date_field, "issued");
        assert_eq!(config.pubmed.limit, 20);
        assert!(!config.chemrxiv.is_available());
    }

    #[test]
    fn test_from_toml_single_and_list_paths() {
        let config = CiterConfig::from_toml(
            r#"
bibtex_file_path = ["refs.bib", "more.bib"]
output_bib_file_path = "refs.bib"
citation_format = "[@%s]"

[crossref]
mailto = "me@example.org"
limit = 5
"#,
        )
        .unwrap();
        assert_eq!(config.bibtex_file_path.0, vec!["refs.bib", "more.bib"]);
        assert_eq!(config.output_bib_file_path.0, vec!["refs.bib"]);
        assert_eq!(config.crossref.limit, 5);
        assert_eq!(config.crossref.date_field, "issued");

        let settings = config.resolve(Path::new("/work")).unwrap();
        assert_eq!(
            settings.bibliography_paths,
            vec![PathBuf::from("/work/refs.bib"), PathBuf::from("/work/more.bib")]
        );
        assert_eq!(settings.output_path, Some(PathBuf::from("/work/refs.bib")));
        assert_eq!(settings.citation_format.render("Doe2020"), "[@Doe2020]");
    }

    #[test]
    fn test_multiple_outputs_rejected() {
        let config = CiterConfig {
            bibtex_file_path: PathList(vec!["a.bib".into(), "b.bib".into()]),
            output_bib_file_path: PathList(vec!["a.bib".into(), "b.bib".into()]),
            ..CiterConfig::default()
        };
        assert!(matches!(
            config.resolve(Path::new("/x")),
            Err(ConfigError::MultipleOutputPaths(2))
        ));
    }

    #[test]
    fn test_output_must_be_an_input() {
        let config = CiterConfig {
            bibtex_file_path: PathList(vec!["a.bib".into()]),
            output_bib_file_path: PathList(vec!["other.bib".into()]),
            ..CiterConfig::default()
        };
        assert!(matches!(
            config.resolve(Path::new("/x")),
            Err(ConfigError::OutputNotAmongInputs(_))
        ));
    }

    #[test]
    fn test_citation_format_needs_slot() {
        let config = CiterConfig {
            citation_format: "@key".to_string(),
            ..CiterConfig::default()
        };
        assert!(matches!(
            config.resolve(Path::new("/x")),
            Err(ConfigError::MissingKeySlot(_))
        ));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let config = CiterConfig {
            citation_regex: "[unclosed".to_string(),
            ..CiterConfig::default()
        };
        assert!(matches!(
            config.resolve(Path::new("/x")),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_expand_vars() {
        std::env::set_var("CITER_TEST_BIBDIR", "/data/bib");
        assert_eq!(
            resolve_path("$CITER_TEST_BIBDIR/refs.bib", Path::new("/base")),
            PathBuf::from("/data/bib/refs.bib")
        );
        assert_eq!(
            resolve_path("${CITER_TEST_BIBDIR}/x.bib", Path::new("/base")),
            PathBuf::from("/data/bib/x.bib")
        );
        assert_eq!(
            resolve_path("$CITER_TEST_UNSET_VAR/x.bib", Path::new("/base")),
            PathBuf::from("/base/$CITER_TEST_UNSET_VAR/x.bib")
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let config = CiterConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(CiterConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_key_only_format() {
        assert_eq!(CitationFormat::key_only().render("Doe2020"), "Doe2020");
    }
}
