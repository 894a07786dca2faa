//! Quick-view rendering and the display menu
//!
//! A quick-view template is a `str.format`-style pattern such as
//! `"{key} - {title}\n{author} ({year})"`. Named slots are `key` (alias
//! `citekey`), `title`, `author`, `year` and `journal`; any other slot is
//! left in the output exactly as written. `{{` and `}}` produce literal
//! braces. A newline splits the rendering into a primary and a secondary
//! line for the picker.

use citer_bibtex::BibRecord;

use crate::host::Choice;
use crate::text::strip_markup;

/// The values a quick-view template can show
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntrySummary {
    pub key: String,
    pub title: String,
    pub author: String,
    pub year: String,
    pub journal: String,
}

impl EntrySummary {
    /// Field values exactly as stored
    pub fn from_record(record: &BibRecord) -> Self {
        let field = |name: &str| record.get(name).unwrap_or_default().to_string();
        Self {
            key: record.id().to_string(),
            title: field("title"),
            author: field("author"),
            year: field("year"),
            journal: field("journal"),
        }
    }

    /// Values with BibTeX braces and TeX quotes removed, for the search list
    pub fn stripped(record: &BibRecord) -> Self {
        let field = |name: &str| strip_markup(record.get(name)).unwrap_or_default();
        Self {
            key: record.id().to_string(),
            title: field("title"),
            author: field("author"),
            year: field("year"),
            journal: field("journal"),
        }
    }

    fn slot(&self, name: &str) -> Option<&str> {
        Some(match name {
            "key" | "citekey" => &self.key,
            "title" => &self.title,
            "author" => &self.author,
            "year" => &self.year,
            "journal" => &self.journal,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickViewTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl QuickViewTemplate {
    pub fn new(format: &str) -> Self {
        Self {
            source: format.to_string(),
            segments: parse_template(format),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn render(&self, summary: &EntrySummary) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(name) => match summary.slot(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                },
            }
        }
        out
    }

    /// Render and split into picker lines
    pub fn choice(&self, summary: &EntrySummary) -> Choice {
        Choice::from_lines(&self.render(summary))
    }
}

fn parse_template(format: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if closed {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(name));
                } else {
                    literal.push('{');
                    literal.push_str(&name);
                }
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

/// Short author line: one name as is, two joined with `and`, more as
/// `First et. al`
pub fn abbreviate_authors(author: &str) -> String {
    let authors: Vec<&str> = author.split(" and ").collect();
    match authors.as_slice() {
        [one] => one.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [first, ..] => format!("{} et. al", first),
        [] => String::new(),
    }
}

/// One line of the display menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub text: String,
    pub key: String,
}

/// Render every record and sort by the rendered text
pub fn build_menu<'a>(
    records: impl IntoIterator<Item = &'a BibRecord>,
    template: &QuickViewTemplate,
) -> Vec<MenuEntry> {
    let mut menu: Vec<MenuEntry> = records
        .into_iter()
        .map(|record| {
            let mut summary = EntrySummary::from_record(record);
            summary.author = match record.author() {
                Some(author) => abbreviate_authors(author),
                None => "Anon".to_string(),
            };
            MenuEntry {
                text: template.render(&summary),
                key: summary.key,
            }
        })
        .collect();
    menu.sort_by(|a, b| a.text.cmp(&b.text).then_with(|| a.key.cmp(&b.key)));
    menu
}
