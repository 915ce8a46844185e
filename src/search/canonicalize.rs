//! Text canonicalization shared by the query and index paths.
//!
//! Everything here is a pure function so that the behavior can be checked in
//! isolation:
//!
//! 1. **Query text** - punctuation and whitespace runs collapse to one space,
//!    the result is trimmed and NFC-normalized ([`normalize_query_text`]).
//! 2. **Field names** - lower-cased, because indexes store every field name in
//!    that form ([`canonical_field_name`]).
//! 3. **Markup** - HTML is reduced to its visible text, plain text passes
//!    through ([`html_to_text`]).
//!
//! Case folding uses `str::to_lowercase`, which is locale independent.
//!
//! # Example
//!
//! ```ignore
//! use table_search::search::canonicalize::{html_to_text, normalize_query_text};
//!
//! assert_eq!(normalize_query_text("  diamond,   ring!! "), "diamond ring");
//! assert_eq!(html_to_text("<p>gold &amp; silver</p>"), "gold & silver");
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::UnicodeNormalization;

/// ASCII punctuation, Unicode punctuation and any whitespace.
static QUERY_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[[:punct:]\p{P}\s]+").expect("valid separator regex"));

static HTML_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid script regex"));

static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("valid style regex"));

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)</?[A-Za-z!][^>]*>").expect("valid tag regex"));

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[A-Za-z][A-Za-z0-9]{1,7});")
        .expect("valid entity regex")
});

/// Collapse punctuation and whitespace runs into single spaces, then trim.
///
/// Returns an empty string for input made only of separators. The query
/// builder treats that as a parse error.
pub fn normalize_query_text(raw: &str) -> String {
    let composed: String = raw.nfc().collect();
    QUERY_SEPARATORS
        .replace_all(&composed, " ")
        .trim()
        .to_string()
}

/// Canonical (lower-case, trimmed) form of a field or column name.
pub fn canonical_field_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Canonicalize a field list, dropping blanks and repeated names while
/// keeping the caller's order.
pub fn canonical_field_names<S: AsRef<str>>(fields: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(fields.len());
    for field in fields {
        let name = canonical_field_name(field.as_ref());
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Heuristic check for markup: a tag or a character entity.
pub fn looks_like_html(text: &str) -> bool {
    TAG.is_match(text) || ENTITY.is_match(text)
}

/// Reduce HTML to its visible text.
///
/// Comments, `<script>` and `<style>` bodies are dropped, tags become word
/// breaks, entities are decoded and whitespace is collapsed. Text without
/// markup is returned unchanged.
pub fn html_to_text(raw: &str) -> String {
    if !looks_like_html(raw) {
        return raw.to_string();
    }
    let text = HTML_COMMENT.replace_all(raw, " ");
    let text = SCRIPT_BLOCK.replace_all(&text, " ");
    let text = STYLE_BLOCK.replace_all(&text, " ");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);
    normalize_whitespace(&text)
}

/// Decode named and numeric character references. Unknown names are kept
/// verbatim.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures<'_>| {
            let body = &caps[1];
            match decode_entity(body) {
                Some(ch) => ch.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn decode_entity(body: &str) -> Option<char> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    let ch = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        _ => return None,
    };
    Some(ch)
}

/// Collapse whitespace runs to single spaces and trim.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_punctuation_collapses_to_single_spaces() {
        assert_eq!(normalize_query_text("diamond,ring"), "diamond ring");
        assert_eq!(normalize_query_text("  gold\t\n  ring  "), "gold ring");
        assert_eq!(normalize_query_text("a+b:(c)^2"), "a b c 2");
        assert_eq!(normalize_query_text("北京，欢迎你。"), "北京 欢迎你");
    }

    #[test]
    fn separator_only_query_is_empty() {
        assert_eq!(normalize_query_text(""), "");
        assert_eq!(normalize_query_text("   "), "");
        assert_eq!(normalize_query_text("!?.,;:-()[]{}\"'"), "");
    }

    #[test]
    fn query_text_is_nfc_composed() {
        let decomposed = "cafe\u{0301}";
        assert_eq!(normalize_query_text(decomposed), "caf\u{e9}");
    }

    #[test]
    fn field_names_fold_and_dedupe() {
        assert_eq!(canonical_field_name(" Title "), "title");
        let names = canonical_field_names(&["Title", "content", "TITLE", "  "]);
        assert_eq!(names, vec!["title".to_string(), "content".to_string()]);
    }

    #[test]
    fn plain_text_passes_through() {
        let text = "gold ring, 18k  (two  spaces)";
        assert!(!looks_like_html(text));
        assert_eq!(html_to_text(text), text);
    }

    #[test]
    fn html_is_reduced_to_visible_text() {
        let html = "<html><head><style>p { color: red }</style></head>\
                    <body><!-- hidden --><p>Diamond&nbsp;<b>ring</b></p>\
                    <script>var x = 1;</script><div>R&amp;D &#x41;&#66;</div></body></html>";
        assert_eq!(html_to_text(html), "Diamond ring R&D AB");
    }

    #[test]
    fn unknown_entities_are_kept() {
        assert_eq!(decode_entities("a &bogus; b &lt;"), "a &bogus; b <");
    }

    #[test]
    fn comparison_operators_are_not_tags() {
        assert!(!looks_like_html("1 < 2 and 3 > 2"));
    }
}
