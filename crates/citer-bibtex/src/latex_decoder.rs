//! LaTeX character decoding
//!
//! Turns the LaTeX escapes commonly found in bibliography files into
//! Unicode so that titles and author names display and fold correctly.
//! Accents are composed from combining marks instead of a lookup per
//! letter, so `\v{r}` and `\H{o}` work the same way as `\"u`.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    /// `\"u`, `\'{e}`, `\'{\i}`, `\^o` ...
    static ref SYMBOL_ACCENT: Regex =
        Regex::new(r#"\\(["'`^~=.])\s*(?:\{\\?([A-Za-z])\}|\\?([A-Za-z]))"#).unwrap();

    /// `\c{c}`, `\c c`, `\v{s}`, `\H{o}` ...
    static ref LETTER_ACCENT: Regex =
        Regex::new(r"\\([cvuHkr])(?:\s*\{\\?([A-Za-z])\}|\s+\\?([A-Za-z]))").unwrap();

    /// Bare commands such as `\ss`, `\ldots`, `\alpha`
    static ref NAMED_COMMAND: Regex = Regex::new(r"\\([A-Za-z]+)\b(?:\{\})?").unwrap();

    /// Commands wrapping a single group: `\emph{x}` keeps `x`
    static ref WRAPPING_COMMAND: Regex = Regex::new(r"\\[A-Za-z]+\{([^{}]*)\}").unwrap();

    static ref SINGLE_CHAR_BRACES: Regex = Regex::new(r"\{([^{}])\}").unwrap();

    static ref NAMED_SYMBOLS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        // Letters without a decomposition
        for (name, symbol) in [
            ("ae", "æ"), ("AE", "Æ"), ("oe", "œ"), ("OE", "Œ"),
            ("aa", "å"), ("AA", "Å"), ("o", "ø"), ("O", "Ø"),
            ("l", "ł"), ("L", "Ł"), ("ss", "ß"), ("i", "ı"), ("j", "ȷ"),
        ] {
            m.insert(name, symbol);
        }
        // Text symbols
        for (name, symbol) in [
            ("ldots", "…"), ("dots", "…"), ("textellipsis", "…"),
            ("textendash", "–"), ("textemdash", "—"),
            ("copyright", "©"), ("textregistered", "®"), ("texttrademark", "™"),
            ("pounds", "£"), ("euro", "€"), ("textdagger", "†"), ("dag", "†"),
            ("textbullet", "•"), ("textasciitilde", "~"), ("textbackslash", "\\"),
        ] {
            m.insert(name, symbol);
        }
        // Math that shows up in titles
        for (name, symbol) in [
            ("alpha", "α"), ("beta", "β"), ("gamma", "γ"), ("delta", "δ"),
            ("epsilon", "ε"), ("zeta", "ζ"), ("eta", "η"), ("theta", "θ"),
            ("kappa", "κ"), ("lambda", "λ"), ("mu", "μ"), ("nu", "ν"),
            ("xi", "ξ"), ("pi", "π"), ("rho", "ρ"), ("sigma", "σ"),
            ("tau", "τ"), ("phi", "φ"), ("chi", "χ"), ("psi", "ψ"),
            ("omega", "ω"), ("Gamma", "Γ"), ("Delta", "Δ"), ("Theta", "Θ"),
            ("Lambda", "Λ"), ("Sigma", "Σ"), ("Phi", "Φ"), ("Psi", "Ψ"),
            ("Omega", "Ω"), ("times", "×"), ("pm", "±"), ("leq", "≤"),
            ("geq", "≥"), ("neq", "≠"), ("approx", "≈"), ("infty", "∞"),
            ("rightarrow", "→"), ("to", "→"),
        ] {
            m.insert(name, symbol);
        }
        m
    };
}

fn combining_mark(accent: &str) -> Option<char> {
    Some(match accent {
        "\"" => '\u{308}',
        "'" => '\u{301}',
        "`" => '\u{300}',
        "^" => '\u{302}',
        "~" => '\u{303}',
        "=" => '\u{304}',
        "." => '\u{307}',
        "c" => '\u{327}',
        "v" => '\u{30C}',
        "u" => '\u{306}',
        "H" => '\u{30B}',
        "k" => '\u{328}',
        "r" => '\u{30A}',
        _ => return None,
    })
}

fn compose_accent(caps: &Captures) -> String {
    let letter = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
        .unwrap_or_default();
    match combining_mark(&caps[1]) {
        Some(mark) => format!("{}{}", letter, mark).nfc().collect(),
        None => caps[0].to_string(),
    }
}

/// Decode LaTeX escapes in a field value to Unicode
pub fn decode_latex(input: &str) -> String {
    if !input.contains(['\\', '{', '~']) && !input.contains("--") {
        return input.to_string();
    }

    let mut text = SYMBOL_ACCENT.replace_all(input, compose_accent).into_owned();
    text = LETTER_ACCENT.replace_all(&text, compose_accent).into_owned();
    text = NAMED_COMMAND
        .replace_all(&text, |caps: &Captures| match NAMED_SYMBOLS.get(&caps[1]) {
            Some(symbol) => symbol.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned();

    // Nested wrappers unwrap from the inside out
    loop {
        let next = WRAPPING_COMMAND.replace_all(&text, "$1").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    text = text.replace("---", "—").replace("--", "–");
    text = replace_unescaped_tilde(&text);
    text = text.replace("{}", "");
    text = SINGLE_CHAR_BRACES.replace_all(&text, "$1").into_owned();

    for (escaped, plain) in [
        ("\\&", "&"),
        ("\\%", "%"),
        ("\\$", "$"),
        ("\\#", "#"),
        ("\\_", "_"),
        ("\\{", "{"),
        ("\\}", "}"),
    ] {
        text = text.replace(escaped, plain);
    }
    text
}

/// `~` is a tie (non-breaking space); `\~` without a letter stays put
fn replace_unescaped_tilde(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = None;
    for c in text.chars() {
        if c == '~' && prev != Some('\\') {
            out.push(' ');
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}
