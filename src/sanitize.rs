// Input and output sanitizing for visitor-supplied text.
// sanitize_* return None for a value that failed its pattern, validate_field
// tells a blank field apart from an invalid one.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    // script/style go together with their bodies, an unclosed one swallows the rest
    static ref DANGEROUS_BLOCK_REGEX: Regex =
        Regex::new(r"(?is)<(?:script|style)\b[^>]*>.*?(?:</\s*(?:script|style)\s*>|\z)").unwrap();

    static ref COMMENT_REGEX: Regex = Regex::new(r"(?s)<!--.*?(?:-->|\z)").unwrap();

    static ref TAG_REGEX: Regex =
        Regex::new(r"<\s*(/?)\s*([a-zA-Z][a-zA-Z0-9]*)([^>]*)>").unwrap();

    static ref ATTR_REGEX: Regex = Regex::new(
        r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#
    ).unwrap();

    // numeric references may omit the ';', named ones are only read with it
    static ref CHAR_REF_REGEX: Regex =
        Regex::new(r"&(?:#[xX]([0-9a-fA-F]{1,8});?|#([0-9]{1,10});?|([a-zA-Z][a-zA-Z0-9]{0,31});)")
            .unwrap();

    // Letters (including Latin-1 accents), spaces, hyphens and apostrophes
    // - Valid: "Ana", "José Pérez", "O'Brien", "Jean-Luc"
    // - Invalid: "A", "R2D2", "alert(1)"
    pub static ref NAME_REGEX: Regex = Regex::new(r"^[a-zA-ZÀ-ÿ\s'-]{2,50}$").unwrap();

    pub static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();

    // - Valid: "+(555) 123-4567", "555.123.4567", "5551234567"
    pub static ref PHONE_REGEX: Regex =
        Regex::new(r"^[+]?[(]?[0-9]{3}[)]?[-\s.]?[0-9]{3}[-\s.]?[0-9]{4,6}$").unwrap();
}

// Default cap for free text sent to the completion provider
pub const MAX_TEXT_LENGTH: usize = 1000;

const ALLOWED_TAGS: &[&str] = &["b", "i", "em", "strong", "a", "p", "br"];
const ALLOWED_ATTRS: &[&str] = &["href", "target", "rel"];
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Name,
    Email,
    Phone,
    Text,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldKind::Name => "name",
            FieldKind::Email => "email",
            FieldKind::Phone => "phone",
            FieldKind::Text => "text",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    Missing, // nothing left after stripping markup and whitespace
    Invalid,
}

// Strips all markup, no tag or attribute survives
pub fn sanitize_input(input: &str) -> String {
    let without_blocks = DANGEROUS_BLOCK_REGEX.replace_all(input.trim(), "");
    let without_comments = COMMENT_REGEX.replace_all(&without_blocks, "");
    let without_tags = TAG_REGEX.replace_all(&without_comments, "");

    without_tags
        .chars()
        .filter(|c| *c != '<' && *c != '>')
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn sanitize_text(input: &str, max_len: usize) -> String {
    let sanitized = sanitize_input(input);
    if sanitized.chars().count() > max_len {
        sanitized.chars().take(max_len).collect()
    } else {
        sanitized
    }
}

pub fn sanitize_name(input: &str) -> Option<String> {
    let sanitized = sanitize_input(input);
    NAME_REGEX.is_match(&sanitized).then_some(sanitized)
}

pub fn sanitize_email(input: &str) -> Option<String> {
    let sanitized = sanitize_input(input);
    EMAIL_REGEX
        .is_match(&sanitized)
        .then(|| sanitized.to_lowercase())
}

pub fn sanitize_phone(input: &str) -> Option<String> {
    let sanitized = sanitize_input(input);
    PHONE_REGEX.is_match(&sanitized).then_some(sanitized)
}

pub fn validate_field(input: &str, kind: FieldKind) -> Result<String, FieldError> {
    if sanitize_input(input).is_empty() {
        return Err(FieldError::Missing);
    }

    let cleaned = match kind {
        FieldKind::Name => sanitize_name(input),
        FieldKind::Email => sanitize_email(input),
        FieldKind::Phone => sanitize_phone(input),
        FieldKind::Text => Some(sanitize_input(input)),
    };

    cleaned.ok_or(FieldError::Invalid)
}

// Reduces untrusted HTML to b i em strong a p br with href/target/rel.
// Attribute values are decoded before they are checked and re-escaped on output,
// so the browser reads exactly the value that was checked.
pub fn sanitize_html(html: &str) -> String {
    let without_blocks = DANGEROUS_BLOCK_REGEX.replace_all(html, "");
    let cleaned = COMMENT_REGEX.replace_all(&without_blocks, "");

    let mut out = String::with_capacity(cleaned.len());
    let mut last = 0;

    for caps in TAG_REGEX.captures_iter(&cleaned) {
        let Some(whole) = caps.get(0) else { continue };
        push_escaped_text(&mut out, &cleaned[last..whole.start()]);
        last = whole.end();

        let name = caps[2].to_ascii_lowercase();
        if !ALLOWED_TAGS.contains(&name.as_str()) {
            continue;
        }

        if !caps[1].is_empty() {
            out.push_str("</");
            out.push_str(&name);
            out.push('>');
            continue;
        }

        out.push('<');
        out.push_str(&name);
        for attr in ATTR_REGEX.captures_iter(&caps[3]) {
            let attr_name = attr[1].to_ascii_lowercase();
            if !ALLOWED_ATTRS.contains(&attr_name.as_str()) {
                continue;
            }
            let raw = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map(|m| m.as_str())
                .unwrap_or_default();
            let Some(value) = decode_char_refs(raw) else {
                continue;
            };
            if attr_name == "href" && !is_safe_href(&value) {
                continue;
            }
            out.push(' ');
            out.push_str(&attr_name);
            out.push_str("=\"");
            push_escaped_attr(&mut out, &value);
            out.push('"');
        }
        out.push('>');
    }

    push_escaped_text(&mut out, &cleaned[last..]);
    out
}

fn push_escaped_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn push_escaped_attr(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

// None when a reference can't be resolved, such a value is dropped rather than guessed at
fn decode_char_refs(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;

    for caps in CHAR_REF_REGEX.captures_iter(value) {
        let whole = caps.get(0)?;
        out.push_str(&value[last..whole.start()]);
        last = whole.end();

        let decoded = if let Some(hex) = caps.get(1) {
            u32::from_str_radix(hex.as_str(), 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = caps.get(2) {
            dec.as_str().parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_char_ref(&caps[3])
        };
        out.push(decoded?);
    }

    out.push_str(&value[last..]);
    Some(out)
}

fn named_char_ref(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "colon" => ':',
        "sol" => '/',
        "quest" => '?',
        "num" => '#',
        "equals" => '=',
        "period" => '.',
        "Tab" => '\t',
        "NewLine" => '\n',
        _ => return None,
    };
    Some(c)
}

// Expects a decoded value. Relative links carry no scheme and are fine
fn is_safe_href(value: &str) -> bool {
    let value: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();

    match value.find(':') {
        Some(colon) if !value[..colon].contains(['/', '?', '#']) => {
            ALLOWED_SCHEMES.contains(&&value[..colon])
        }
        _ => true,
    }
}
