//! BibTeX parser implementation using nom
//!
//! Parsing never aborts on a bad entry: the error is recorded with its line
//! and the parser resumes at the next `@`. Text between entries is ignored,
//! as BibTeX itself does.
//!
//! Handles:
//! - `@string` definitions (plus the builtin month macros)
//! - `@preamble` and `@comment`
//! - braced `{...}` and parenthesized `(...)` entry bodies
//! - braced, quoted, numeric and macro field values joined with `#`

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::{map, opt},
    IResult,
};
use std::collections::HashMap;

use crate::entry::{BibTeXEntry, BibTeXEntryType};

/// A recoverable problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct BibTeXParseError {
    pub line: u32,
    pub message: String,
}

/// Everything found in one BibTeX source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibTeXParseResult {
    pub entries: Vec<BibTeXEntry>,
    pub preambles: Vec<String>,
    pub strings: HashMap<String, String>,
    pub errors: Vec<BibTeXParseError>,
}

const MONTHS: [(&str, &str); 12] = [
    ("jan", "January"),
    ("feb", "February"),
    ("mar", "March"),
    ("apr", "April"),
    ("may", "May"),
    ("jun", "June"),
    ("jul", "July"),
    ("aug", "August"),
    ("sep", "September"),
    ("oct", "October"),
    ("nov", "November"),
    ("dec", "December"),
];

/// Parse BibTeX source text
pub fn parse(input: &str) -> BibTeXParseResult {
    let mut result = BibTeXParseResult::default();
    let mut macros: HashMap<String, String> = MONTHS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let mut remaining = input;
    while let Some(at) = remaining.find('@') {
        remaining = &remaining[at..];
        let line = line_of(input, remaining);

        match parse_at_block(remaining, &macros) {
            Ok((rest, block)) => {
                match block {
                    AtBlock::Entry(mut entry) => {
                        entry.line = line;
                        result.entries.push(entry);
                    }
                    AtBlock::String(key, value) => {
                        macros.insert(key.to_lowercase(), value.clone());
                        result.strings.insert(key, value);
                    }
                    AtBlock::Preamble(text) => result.preambles.push(text),
                    AtBlock::Comment => {}
                }
                remaining = rest;
            }
            Err(_) => {
                result.errors.push(BibTeXParseError {
                    line,
                    message: format!("could not parse block starting `{}`", head(remaining)),
                });
                remaining = &remaining[1..];
            }
        }
    }

    result
}

fn line_of(input: &str, rest: &str) -> u32 {
    let offset = input.len() - rest.len();
    1 + input[..offset].matches('\n').count() as u32
}

fn head(s: &str) -> String {
    s.lines().next().unwrap_or_default().chars().take(40).collect()
}

enum AtBlock {
    Entry(BibTeXEntry),
    String(String, String),
    Preamble(String),
    Comment,
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || "_-:./+".contains(c))(input)
}

fn parse_at_block<'a>(
    input: &'a str,
    macros: &HashMap<String, String>,
) -> IResult<&'a str, AtBlock> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, kind) = take_while1(|c: char| c.is_ascii_alphabetic())(rest)?;
    let (rest, _) = multispace0(rest)?;

    match kind.to_lowercase().as_str() {
        "comment" => Ok((skip_comment(rest), AtBlock::Comment)),
        "string" => {
            let (rest, close) = open_delimiter(rest)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, key) = identifier(rest)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = char('=')(rest)?;
            let (rest, value) = field_value(rest, macros)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = char(close)(rest)?;
            Ok((rest, AtBlock::String(key.to_string(), value)))
        }
        "preamble" => {
            let (rest, close) = open_delimiter(rest)?;
            let (rest, value) = field_value(rest, macros)?;
            let (rest, _) = multispace0(rest)?;
            let (rest, _) = char(close)(rest)?;
            Ok((rest, AtBlock::Preamble(value)))
        }
        _ => {
            let (rest, entry) = entry_body(rest, kind, macros)?;
            Ok((rest, AtBlock::Entry(entry)))
        }
    }
}

fn open_delimiter(input: &str) -> IResult<&str, char> {
    alt((map(char('{'), |_| '}'), map(char('('), |_| ')')))(input)
}

fn skip_comment(input: &str) -> &str {
    match balanced_braces(input) {
        Ok((rest, _)) => rest,
        Err(_) => {
            let end = input.find('\n').unwrap_or(input.len());
            &input[end..]
        }
    }
}

fn entry_body<'a>(
    input: &'a str,
    kind: &str,
    macros: &HashMap<String, String>,
) -> IResult<&'a str, BibTeXEntry> {
    let (rest, close) = open_delimiter(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, cite_key) = take_while1(|c: char| {
        !c.is_whitespace() && !matches!(c, ',' | '{' | '}' | '(' | ')' | '=')
    })(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (mut rest, _) = opt(char(','))(rest)?;

    let mut entry = BibTeXEntry::new(cite_key, BibTeXEntryType::parse(kind));
    loop {
        let (r, _) = multispace0(rest)?;
        if let Ok((r, _)) = char::<&str, nom::error::Error<&str>>(close)(r) {
            return Ok((r, entry));
        }
        let (r, key) = identifier(r)?;
        let (r, _) = multispace0(r)?;
        let (r, _) = char('=')(r)?;
        let (r, value) = field_value(r, macros)?;
        entry.add_field(key.to_lowercase(), value);
        let (r, _) = multispace0(r)?;
        let (r, _) = opt(char(','))(r)?;
        rest = r;
    }
}

/// One value, possibly several parts joined with `#`
fn field_value<'a>(
    input: &'a str,
    macros: &HashMap<String, String>,
) -> IResult<&'a str, String> {
    let mut value = String::new();
    let mut rest = input;
    loop {
        let (r, _) = multispace0(rest)?;
        let (r, part) = alt((
            map(balanced_braces, |s: &str| s[1..s.len() - 1].to_string()),
            quoted,
            map(take_while1(|c: char| c.is_ascii_digit()), str::to_string),
            map(identifier, |name: &str| {
                macros
                    .get(&name.to_lowercase())
                    .cloned()
                    .unwrap_or_else(|| name.to_string())
            }),
        ))(r)?;
        value.push_str(&part);

        let (r, _) = multispace0(r)?;
        match r.strip_prefix('#') {
            Some(next) => rest = next,
            None => return Ok((r, value)),
        }
    }
}

/// `{...}` with nesting; returns the group including its braces
fn balanced_braces(input: &str) -> IResult<&str, &str> {
    let fail = || {
        nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        ))
    };
    if !input.starts_with('{') {
        return Err(fail());
    }

    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[i + 1..], &input[..i + 1]));
                }
            }
            _ => {}
        }
    }
    Err(fail())
}

/// `"..."`; a `"` inside braces does not terminate the value
fn quoted(input: &str) -> IResult<&str, String> {
    let fail = || {
        nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        ))
    };
    let body = input.strip_prefix('"').ok_or_else(fail)?;

    let mut depth = 0usize;
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => return Ok((&body[i + 1..], body[..i].to_string())),
            _ => {}
        }
    }
    Err(fail())
}
