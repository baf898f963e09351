//! Scraping helpers for the console's server-rendered pages.
//!
//! The console only exposes a handful of things we need from HTML: the CSRF token,
//! the login form (to detect redirect-to-login) and the Impex result container.
//! Regex-based extraction is enough for those; nothing here tries to be a full parser.

use regex::{Captures, Regex};

/// Strings that only appear on the login form.
const LOGIN_FORM_MARKERS: [&str; 2] = ["j_spring_security_check", r#"name="j_username""#];

/// Name of the hidden input / meta tag carrying the CSRF token.
pub const CSRF_FIELD: &str = "_csrf";

lazy_static::lazy_static! {
    static ref INPUT_TAG: Regex = Regex::new(r"(?is)<input\b[^>]*>").unwrap();
    static ref META_TAG: Regex = Regex::new(r"(?is)<meta\b[^>]*>").unwrap();
    static ref DIV_BOUNDARY: Regex = Regex::new(r"(?is)<(/?)div\b[^>]*?(/?)>").unwrap();
    static ref ATTRIBUTE: Regex = Regex::new(
        r#"(?s)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#
    ).unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"(?s)<[^>]+>").unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)<br\s*/?>").unwrap();
    static ref BLANK_LINES: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref ENTITY: Regex = Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});").unwrap();
}

/// Attributes of a single start tag, names lowercased, values entity-decoded.
fn attributes(tag: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(tag)
        .map(|cap| {
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            (cap[1].to_ascii_lowercase(), decode_entities(value))
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Find the first tag matched by `pattern` whose `name` attribute equals `name`,
/// and return its `value_attr` attribute.
fn named_tag_value(html: &str, pattern: &Regex, name: &str, value_attr: &str) -> Option<String> {
    pattern
        .find_iter(html)
        .map(|m| attributes(m.as_str()))
        .find(|attrs| attribute(attrs, "name") == Some(name))
        .and_then(|attrs| attribute(&attrs, value_attr).map(str::to_string))
}

/// Extract the CSRF token: `<input name="_csrf" value=...>` first, then `<meta name="_csrf" content=...>`.
pub fn extract_csrf_token(html: &str) -> Option<String> {
    named_tag_value(html, &INPUT_TAG, CSRF_FIELD, "value")
        .or_else(|| named_tag_value(html, &META_TAG, CSRF_FIELD, "content"))
        .filter(|token| !token.is_empty())
}

/// Whether the page is (or embeds) the login form.
pub fn is_login_page(html: &str) -> bool {
    LOGIN_FORM_MARKERS.iter().any(|marker| html.contains(marker))
}

/// Inner HTML of the first `<div>` carrying `class`, with nested divs balanced.
pub fn find_div_by_class<'a>(html: &'a str, class: &str) -> Option<&'a str> {
    let opening = DIV_BOUNDARY.captures_iter(html).find(|cap| {
        cap[1].is_empty()
            && attribute(&attributes(&cap[0]), "class")
                .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    })?;
    let whole = opening.get(0)?;
    let start = whole.end();
    if !opening[2].is_empty() {
        return Some("");
    }

    let mut depth = 1usize;
    for cap in DIV_BOUNDARY.captures_iter(&html[start..]) {
        let Some(m) = cap.get(0) else { continue };
        if !cap[1].is_empty() {
            depth -= 1;
            if depth == 0 {
                return Some(&html[start..start + m.start()]);
            }
        } else if cap[2].is_empty() {
            depth += 1;
        }
    }
    // Unterminated container: take the rest of the document.
    Some(&html[start..])
}

/// Visible text of an HTML fragment: each text run trimmed, blanks dropped, one run per line.
pub fn element_text(fragment: &str) -> String {
    let stripped = ANY_TAG.replace_all(fragment, "\n");
    stripped
        .lines()
        .map(|line| decode_entities(line.trim()))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert console log HTML to plain text.
///
/// `<br>` becomes a newline, other tags are dropped, entities decoded, runs of three or
/// more newlines collapse to two, and the result is trimmed.
pub fn html_to_text(html: &str) -> String {
    let text = LINE_BREAK.replace_all(html, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = decode_entities(&text);
    BLANK_LINES.replace_all(&text, "\n\n").trim().to_string()
}

/// Decode named and numeric character references. Unknown names are left untouched.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    ENTITY
        .replace_all(s, |cap: &Captures| {
            let body = &cap[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            decoded.map_or_else(|| cap[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "copy" => '©',
        "reg" => '®',
        "hellip" => '…',
        "ndash" => '–',
        "mdash" => '—',
        "laquo" => '«',
        "raquo" => '»',
        _ => return None,
    };
    Some(c)
}
