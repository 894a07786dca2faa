//! BibTeX parsing and formatting for citer
//!
//! Bibliography files are parsed into [`BibRecord`]s, flat maps keyed by
//! lowercase field name with LaTeX escapes decoded, and records fetched from
//! remote services are serialized back to BibTeX for appending.
//!
//! Features:
//! - Nom-based parser that recovers from malformed entries
//! - `@string` macros, month names and `#` concatenation
//! - LaTeX special character decoding
//! - Deterministic formatting (sorted fields, empty fields dropped)

mod entry;
mod formatter;
mod latex_decoder;
pub mod parser;
mod record;

pub use entry::{BibTeXEntry, BibTeXEntryType, BibTeXField};
pub use formatter::{
    escape_ampersands, escape_unbalanced_braces, format_entry, serialize_record,
};
pub use latex_decoder::decode_latex;
pub use parser::{parse, BibTeXParseError, BibTeXParseResult};
pub use record::{BibRecord, ID_FIELD, TYPE_FIELD};
