//! Blog-body markup: a tiny bold/paragraph/line-break dialect rendered to HTML.
//!
//! Blog bodies are authored in a deliberately small convention:
//!
//! - `**text**` marks bold text
//! - a line starting with four or more spaces opens an indented paragraph
//! - a blank line is a double line break, any other newline a single one
//!
//! [`render`] turns that text into an HTML fragment with five deterministic
//! string rules. Its output is **not** safe to display as-is, because the
//! raw text comes from a store that can be edited outside this application:
//! always display [`render_safe`], which runs the fragment through an
//! allow-list sanitizer.
//!
//! ## Rule Order
//!
//! Later rules operate on the output of earlier ones: paragraph markers must
//! be placed while newlines still exist, newlines must be turned into breaks
//! before paragraphs are closed, and paragraphs close against the breaks.

use once_cell::sync::Lazy;
use regex::Regex;

/// Opening tag for an indented paragraph.
pub const PARAGRAPH_OPEN: &str = r#"<p style="text-indent:2em; margin:0;">"#;
/// Closing tag for an indented paragraph.
pub const PARAGRAPH_CLOSE: &str = "</p>";
/// A single line break.
pub const LINE_BREAK: &str = "<br/>";

const DOUBLE_BREAK: &str = "<br/><br/>";

/// Apply the markup rules to raw text.
///
/// Total over all input: malformed markup (an unpaired `**`, stray spaces)
/// is left as text rather than rejected.
///
/// Rules (applied in order):
/// 1. `**content**` → `<strong>content</strong>` (non-greedy, left to right,
///    never across a newline)
/// 2. start of text or a newline, followed by 4 or more spaces →
///    paragraph-open marker (the newline and the spaces are dropped)
/// 3. `\n\n` → `<br/><br/>`
/// 4. remaining `\n` → `<br/>`
/// 5. close every open paragraph before the next double break, the next
///    paragraph or the end of the text
pub fn render(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let s = bold_spans(raw);
    let s = open_paragraphs(&s);
    let s = double_breaks(&s);
    let s = single_breaks(&s);
    close_paragraphs(&s)
}

/// Render and sanitize: the only form that may be shown to visitors.
pub fn render_safe(raw: &str) -> String {
    sanitize(&render(raw))
}

/// Strip every tag and attribute not produced by the markup dialect.
///
/// Allowed: `strong`, `b`, `br`, and `p` with its `style` attribute.
/// Anything else is removed; the contents of `script` and `style` elements
/// are dropped entirely, other disallowed elements keep their text.
pub fn sanitize(html: &str) -> String {
    let mut builder = ammonia::Builder::empty();
    builder
        .add_tags(&["strong", "b", "p", "br"])
        .add_tag_attributes("p", &["style"])
        .add_clean_content_tags(&["script", "style"]);
    builder.clean(html).to_string()
}

// ── Rule 1: Bold spans ───────────────────────────────────────────────────────

static RE_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());

fn bold_spans(input: &str) -> String {
    RE_BOLD.replace_all(input, "<strong>$1</strong>").to_string()
}

// ── Rule 2: Indented paragraph markers ───────────────────────────────────────
//
// The newline in front of an indented line is consumed with the spaces, so
// a paragraph never starts with a stray break.

static RE_INDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\n) {4,}").unwrap());

fn open_paragraphs(input: &str) -> String {
    RE_INDENT.replace_all(input, PARAGRAPH_OPEN).to_string()
}

// ── Rule 3: Blank lines ──────────────────────────────────────────────────────

fn double_breaks(input: &str) -> String {
    input.replace("\n\n", DOUBLE_BREAK)
}

// ── Rule 4: Single newlines ──────────────────────────────────────────────────

fn single_breaks(input: &str) -> String {
    input.replace('\n', LINE_BREAK)
}

// ── Rule 5: Close paragraphs ─────────────────────────────────────────────────

fn close_paragraphs(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 16);
    let mut rest = input;

    while let Some(start) = rest.find(PARAGRAPH_OPEN) {
        let body_start = start + PARAGRAPH_OPEN.len();
        out.push_str(&rest[..body_start]);
        let body = &rest[body_start..];

        let end = [body.find(DOUBLE_BREAK), body.find(PARAGRAPH_OPEN)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(body.len());

        out.push_str(&body[..end]);
        out.push_str(PARAGRAPH_CLOSE);
        rest = &body[end..];
    }

    out.push_str(rest);
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────
