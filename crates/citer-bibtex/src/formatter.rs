//! BibTeX formatting module
//!
//! Converts records back to BibTeX text for appending to a bibliography
//! file. Values are tidied on the way out: runs of whitespace collapse to
//! one space, a bare `&` is escaped and empty fields are left out.

use lazy_static::lazy_static;
use regex::Regex;

use crate::entry::BibTeXEntry;
use crate::record::BibRecord;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Format a single BibTeX entry to string
pub fn format_entry(entry: &BibTeXEntry) -> String {
    let mut result = String::new();

    result.push('@');
    result.push_str(entry.entry_type.as_str());
    result.push('{');
    result.push_str(&entry.cite_key);
    result.push(',');
    result.push('\n');

    for field in &entry.fields {
        let value = tidy_value(&field.value);
        if value.is_empty() {
            continue;
        }
        result.push_str("    ");
        result.push_str(&field.key);
        result.push_str(" = ");
        result.push_str(&format_field_value(&value));
        result.push(',');
        result.push('\n');
    }

    result.push('}');
    result.push('\n');
    result
}

/// Format a record; fields come out in sorted order
pub fn serialize_record(record: &BibRecord) -> String {
    format_entry(&BibTeXEntry::from(record))
}

fn tidy_value(value: &str) -> String {
    let condensed = WHITESPACE.replace_all(value.trim(), " ");
    escape_unbalanced_braces(&escape_ampersands(&condensed))
}

/// Escape every `{` or `}` without a partner so the value can sit inside
/// a braced field; balanced groups are left alone
pub fn escape_unbalanced_braces(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut open = Vec::new();
    let mut stray = Vec::new();
    let mut escaped = false;
    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => open.push(i),
            '}' => {
                if open.pop().is_none() {
                    stray.push(i);
                }
            }
            _ => {}
        }
    }
    stray.extend(open);
    if stray.is_empty() {
        return value.to_string();
    }

    let mut result = String::with_capacity(value.len() + stray.len());
    for (i, &c) in chars.iter().enumerate() {
        if stray.contains(&i) {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

/// `&` is an alignment tab to LaTeX; escape the ones not escaped already
pub fn escape_ampersands(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut prev = None;
    for c in value.chars() {
        if c == '&' && prev != Some('\\') {
            result.push('\\');
        }
        result.push(c);
        prev = Some(c);
    }
    result
}

fn format_field_value(value: &str) -> String {
    if value.chars().all(|c| c.is_ascii_digit()) {
        return value.to_string();
    }
    format!("{{{}}}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_basic_record() {
        let mut record = BibRecord::new("Doe2020", "article");
        record.set("title", "On Things");
        record.set("year", "2020");

        assert_eq!(
            serialize_record(&record),
            "@article{Doe2020,\n    title = {On Things},\n    year = 2020,\n}\n"
        );
    }

    #[test]
    fn test_empty_fields_dropped() {
        let mut record = BibRecord::new("Doe2020", "misc");
        record.set("note", "   ");
        record.set("volume", "");
        assert_eq!(serialize_record(&record), "@misc{Doe2020,\n}\n");
    }

    #[test]
    fn test_whitespace_condensed_and_ampersand_escaped() {
        let mut record = BibRecord::new("K", "article");
        record.set("journal", "Science\n   &  Society");
        let text = serialize_record(&record);
        assert!(text.contains(r"journal = {Science \& Society},"));
    }

    #[test]
    fn test_unbalanced_braces_escaped() {
        assert_eq!(escape_unbalanced_braces("On {DNA}"), "On {DNA}");
        assert_eq!(escape_unbalanced_braces("a } b"), r"a \} b");
        assert_eq!(escape_unbalanced_braces("x { y {z}"), r"x \{ y {z}");
        assert_eq!(escape_unbalanced_braces("}{"), r"\}\{");
        assert_eq!(escape_unbalanced_braces(r"kept \} as is"), r"kept \} as is");
    }

    #[test]
    fn test_stray_brace_survives_reparse() {
        let mut record = BibRecord::new("Doe2020", "article");
        record.set("title", "Sets } and {maps");
        record.set("year", "2020");
        let text = serialize_record(&record);

        let parsed = crate::parse(&text);
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.entries.len(), 1);
        let reread = BibRecord::from(parsed.entries[0].clone());
        assert_eq!(reread.id(), "Doe2020");
        assert_eq!(reread.title(), Some("Sets } and {maps"));
        assert_eq!(reread.year(), Some("2020"));
    }

    #[test]
    fn test_escaped_ampersand_untouched() {
        assert_eq!(escape_ampersands(r"A \& B & C"), r"A \& B \& C");
    }
}
