//! Text normalization helpers
//!
//! Small total functions shared by the record mappers, the cite key
//! synthesizer and the display menu.

use chrono::{DateTime, Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

pub use citer_bibtex::escape_ampersands;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref FOUR_DIGITS: Regex = Regex::new(r"\b(\d{4})\b").unwrap();
}

/// Collapse every run of whitespace to one space and trim the ends
pub fn condense_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Drop BibTeX braces and straighten TeX quote pairs
pub fn strip_markup(text: Option<&str>) -> Option<String> {
    let text = text?;
    let stripped = text
        .replace(['{', '}'], "")
        .replace("``", "\"")
        .replace("''", "\"");
    Some(condense_whitespace(&stripped))
}

/// Fold text into the cite key alphabet `[A-Za-z0-9_-]`
///
/// Compatibility decomposition splits accented letters into base letter
/// plus combining mark; the marks and anything else outside the alphabet
/// are dropped.
pub fn fold_to_identifier(text: &str) -> String {
    text.nfkd()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Best-effort year from a free-text publication date
pub fn parse_year(text: &str) -> Option<i32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.year());
    }

    for format in ["%Y-%m-%d", "%Y %b %d", "%Y/%m/%d", "%d %b %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date.year());
        }
    }

    FOUR_DIGITS
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_condense_whitespace() {
        assert_eq!(condense_whitespace("  a\n\tb   c  "), "a b c");
        assert_eq!(condense_whitespace(""), "");
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup(Some("The {DNA}   of ``quoted'' text")),
            Some("The DNA of \"quoted\" text".to_string())
        );
        assert_eq!(strip_markup(None), None);
    }

    #[rstest]
    #[case("Müller", "Muller")]
    #[case("Gödel Escher", "GodelEscher")]
    #[case("O'Brien-Smith_2", "OBrien-Smith_2")]
    #[case("Ångström", "Angstrom")]
    #[case("Ⅻ", "XII")]
    #[case("李", "")]
    fn test_fold_to_identifier(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(fold_to_identifier(input), expected);
    }

    #[rstest]
    #[case("2021-03-04T10:00:00Z", Some(2021))]
    #[case("2019-11-02", Some(2019))]
    #[case("2018 Mar 15", Some(2018))]
    #[case("2017 Jul-Aug", Some(2017))]
    #[case("Spring 2016", Some(2016))]
    #[case("", None)]
    #[case("no date", None)]
    fn test_parse_year(#[case] input: &str, #[case] expected: Option<i32>) {
        assert_eq!(parse_year(input), expected);
    }

    proptest! {
        #[test]
        fn fold_output_stays_in_alphabet(s in "\\PC*") {
            let folded = fold_to_identifier(&s);
            prop_assert!(folded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        }

        #[test]
        fn fold_is_deterministic(s in "\\PC*") {
            prop_assert_eq!(fold_to_identifier(&s), fold_to_identifier(&s));
        }

        #[test]
        fn condensed_has_no_double_spaces(s in "\\PC*") {
            let condensed = condense_whitespace(&s);
            prop_assert!(!condensed.contains("  "));
            prop_assert_eq!(condensed.trim(), condensed.as_str());
        }
    }
}
