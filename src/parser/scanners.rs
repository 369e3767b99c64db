//! Recognizers for block starts and raw HTML.
//!
//! Each function looks at a line (or inline text) starting at the position
//! of interest and reports whether the construct matches there, usually
//! with the number of bytes it spans. Lines end with `\n`.

use crate::ast::AlertType;
use crate::scanner::{is_line_end, is_space_or_tab};

/// Tags that open an HTML block of kind 6.
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "base",
    "basefont",
    "blockquote",
    "body",
    "caption",
    "center",
    "col",
    "colgroup",
    "dd",
    "details",
    "dialog",
    "dir",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "frame",
    "frameset",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "head",
    "header",
    "hr",
    "html",
    "iframe",
    "legend",
    "li",
    "link",
    "main",
    "menu",
    "menuitem",
    "nav",
    "noframes",
    "ol",
    "optgroup",
    "option",
    "p",
    "param",
    "search",
    "section",
    "summary",
    "table",
    "tbody",
    "td",
    "tfoot",
    "th",
    "thead",
    "title",
    "tr",
    "track",
    "ul",
];

/// Tags that open an HTML block of kind 1.
const RAW_TEXT_TAGS: &[&str] = &["pre", "script", "style", "textarea"];

fn run_length(s: &[u8], c: u8) -> usize {
    s.iter().take_while(|&&b| b == c).count()
}

fn skip_spaces(s: &[u8], mut i: usize) -> usize {
    while i < s.len() && is_space_or_tab(s[i]) {
        i += 1;
    }
    i
}

fn at_line_end(s: &[u8], i: usize) -> bool {
    i >= s.len() || is_line_end(s[i])
}

/// `#` to `######` followed by whitespace or the line end. Returns the
/// heading level and the bytes spanned by the marker and following spaces.
pub fn atx_heading_start(s: &[u8]) -> Option<(u8, usize)> {
    let hashes = run_length(s, b'#');
    if hashes == 0 || hashes > 6 {
        return None;
    }
    if !at_line_end(s, hashes) && !is_space_or_tab(s[hashes]) {
        return None;
    }
    Some((hashes as u8, skip_spaces(s, hashes)))
}

/// `-#` followed by whitespace.
pub fn subtext_start(s: &[u8]) -> Option<usize> {
    if s.starts_with(b"-#") && s.get(2).is_some_and(|&b| is_space_or_tab(b)) {
        Some(skip_spaces(s, 2))
    } else {
        None
    }
}

/// An opening code fence: three or more backticks with no backtick in the
/// info string, or three or more tildes. Returns the fence length.
pub fn open_code_fence(s: &[u8]) -> Option<usize> {
    let c = *s.first()?;
    if c != b'`' && c != b'~' {
        return None;
    }
    let len = run_length(s, c);
    if len < 3 {
        return None;
    }
    if c == b'`' && s[len..].iter().take_while(|&&b| !is_line_end(b)).any(|&b| b == b'`') {
        return None;
    }
    Some(len)
}

/// A closing code fence: a run of one fence character followed only by
/// whitespace. Returns the run length.
pub fn close_code_fence(s: &[u8]) -> Option<usize> {
    let c = *s.first()?;
    if c != b'`' && c != b'~' {
        return None;
    }
    let len = run_length(s, c);
    if len < 3 || !at_line_end(s, skip_spaces(s, len)) {
        return None;
    }
    Some(len)
}

/// A run of `=` (level 1) or `-` (level 2) with optional trailing spaces.
pub fn setext_heading_line(s: &[u8]) -> Option<u8> {
    let c = *s.first()?;
    let level = match c {
        b'=' => 1,
        b'-' => 2,
        _ => return None,
    };
    let len = run_length(s, c);
    if at_line_end(s, skip_spaces(s, len)) {
        Some(level)
    } else {
        None
    }
}

/// Three or more `*`, `-` or `_`, optionally separated by spaces or tabs.
pub fn thematic_break(s: &[u8]) -> bool {
    let Some(&c) = s.first() else {
        return false;
    };
    if !matches!(c, b'*' | b'-' | b'_') {
        return false;
    }
    let mut count = 0;
    for &b in s.iter().take_while(|&&b| !is_line_end(b)) {
        if b == c {
            count += 1;
        } else if !is_space_or_tab(b) {
            return false;
        }
    }
    count >= 3
}

/// `[^label]:` opening a footnote definition. Returns the bytes spanned,
/// including following spaces, and the label.
pub fn footnote_definition(s: &[u8]) -> Option<(usize, &str)> {
    if !s.starts_with(b"[^") {
        return None;
    }
    let mut i = 2;
    while i < s.len() && !matches!(s[i], b']' | b' ' | b'\t' | b'\n' | b'\r' | 0) {
        i += 1;
    }
    if i == 2 || s.get(i) != Some(&b']') || s.get(i + 1) != Some(&b':') {
        return None;
    }
    let name = std::str::from_utf8(&s[2..i]).ok()?;
    Some((skip_spaces(s, i + 2), name))
}

/// `:` or `~` followed by whitespace, opening description details.
pub fn description_item_start(s: &[u8]) -> Option<usize> {
    match s.first() {
        Some(b':' | b'~') if s.get(1).is_some_and(|&b| is_space_or_tab(b)) => {
            Some(skip_spaces(s, 1))
        }
        _ => None,
    }
}

/// A line holding only a fence of three or more `>`.
pub fn multiline_block_quote_fence(s: &[u8]) -> Option<usize> {
    let len = run_length(s, b'>');
    if len >= 3 && at_line_end(s, skip_spaces(s, len)) {
        Some(len)
    } else {
        None
    }
}

/// The first line of an alert: `> [!TYPE] optional title`, or with
/// `multiline`, `>>> [!TYPE]`.
pub struct AlertStart {
    pub alert_type: AlertType,
    pub title: Option<String>,
    /// Number of `>` characters.
    pub fence_length: usize,
}

pub fn alert_start(s: &[u8], multiline: bool) -> Option<AlertStart> {
    let fence_length = run_length(s, b'>');
    if fence_length != 1 && !(multiline && fence_length >= 3) {
        return None;
    }
    let mut i = skip_spaces(s, fence_length);
    if !s[i..].starts_with(b"[!") {
        return None;
    }
    i += 2;
    let name_start = i;
    while i < s.len() && s[i].is_ascii_alphabetic() {
        i += 1;
    }
    if s.get(i) != Some(&b']') {
        return None;
    }
    let name = std::str::from_utf8(&s[name_start..i]).ok()?;
    let alert_type = AlertType::from_name(name)?;
    let rest_end = s.iter().position(|&b| is_line_end(b)).unwrap_or(s.len());
    let rest = std::str::from_utf8(&s[i + 1..rest_end]).ok()?.trim();
    Some(AlertStart {
        alert_type,
        title: (!rest.is_empty()).then(|| rest.to_string()),
        fence_length,
    })
}

fn starts_with_tag(s: &[u8], tag: &str) -> bool {
    s.len() >= tag.len() && s[..tag.len()].eq_ignore_ascii_case(tag.as_bytes())
}

/// HTML block kinds 1 to 6 as numbered by CommonMark.
pub fn html_block_start(s: &[u8]) -> Option<u8> {
    if s.first() != Some(&b'<') {
        return None;
    }
    let rest = &s[1..];

    for tag in RAW_TEXT_TAGS {
        if starts_with_tag(rest, tag) {
            let after = rest.get(tag.len()).copied().unwrap_or(b'\n');
            if after == b'>' || is_space_or_tab(after) || is_line_end(after) {
                return Some(1);
            }
        }
    }
    if rest.starts_with(b"!--") {
        return Some(2);
    }
    if rest.starts_with(b"?") {
        return Some(3);
    }
    if rest.starts_with(b"![CDATA[") {
        return Some(5);
    }
    if rest.first() == Some(&b'!') && rest.get(1).is_some_and(|b| b.is_ascii_alphabetic()) {
        return Some(4);
    }

    let (closing, name) = match rest.strip_prefix(b"/") {
        Some(r) => (true, r),
        None => (false, rest),
    };
    for tag in BLOCK_TAGS {
        if starts_with_tag(name, tag) {
            let after = name.get(tag.len()).copied().unwrap_or(b'\n');
            if after == b'>'
                || is_space_or_tab(after)
                || is_line_end(after)
                || (!closing && after == b'/' && name.get(tag.len() + 1) == Some(&b'>'))
            {
                return Some(6);
            }
        }
    }
    None
}

/// HTML block kind 7: a complete open or closing tag alone on its line.
pub fn html_block_start_7(s: &[u8]) -> bool {
    let Some(end) = open_tag(s, 0).or_else(|| closing_tag(s, 0)) else {
        return false;
    };
    // Raw text tags only start kind 1 blocks.
    let name_start = if s.get(1) == Some(&b'/') { 2 } else { 1 };
    if RAW_TEXT_TAGS.iter().any(|t| {
        starts_with_tag(&s[name_start..], t)
            && !s
                .get(name_start + t.len())
                .is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'-')
    }) {
        return false;
    }
    at_line_end(s, skip_spaces(s, end))
}

/// Whether `line` satisfies the end condition of an HTML block kind 1 to 5.
pub fn html_block_end(kind: u8, line: &[u8]) -> bool {
    match kind {
        1 => {
            let lower = line.to_ascii_lowercase();
            RAW_TEXT_TAGS.iter().any(|tag| {
                let close = format!("</{tag}>");
                lower.windows(close.len()).any(|w| w == close.as_bytes())
            })
        }
        2 => line.windows(3).any(|w| w == b"-->"),
        3 => line.windows(2).any(|w| w == b"?>"),
        4 => line.contains(&b'>'),
        5 => line.windows(3).any(|w| w == b"]]>"),
        _ => false,
    }
}

/// Whitespace inside a tag: spaces, tabs and at most one line ending.
fn skip_tag_whitespace(s: &[u8], mut i: usize) -> (usize, bool) {
    let start = i;
    let mut newline_seen = false;
    while i < s.len() && matches!(s[i], b' ' | b'\t' | b'\n' | b'\r') {
        if s[i] == b'\n' {
            if newline_seen {
                return (i, false);
            }
            newline_seen = true;
        }
        i += 1;
    }
    (i, i > start)
}

fn tag_name(s: &[u8], mut i: usize) -> Option<usize> {
    if !s.get(i)?.is_ascii_alphabetic() {
        return None;
    }
    i += 1;
    while i < s.len() && (s[i].is_ascii_alphanumeric() || s[i] == b'-') {
        i += 1;
    }
    Some(i)
}

/// `<name attr="value" ...>` or `<name/>` starting at `start`. Returns the
/// position after `>`.
pub fn open_tag(s: &[u8], start: usize) -> Option<usize> {
    if s.get(start) != Some(&b'<') {
        return None;
    }
    let mut i = tag_name(s, start + 1)?;
    loop {
        let (after_ws, had_ws) = skip_tag_whitespace(s, i);
        i = after_ws;
        match s.get(i)? {
            b'>' => return Some(i + 1),
            b'/' => {
                return if s.get(i + 1) == Some(&b'>') {
                    Some(i + 2)
                } else {
                    None
                };
            }
            _ => {}
        }
        // An attribute must be preceded by whitespace.
        if !had_ws {
            return None;
        }
        let c = s[i];
        if !(c.is_ascii_alphabetic() || c == b'_' || c == b':') {
            return None;
        }
        i += 1;
        while i < s.len() && (s[i].is_ascii_alphanumeric() || matches!(s[i], b'_' | b'.' | b':' | b'-')) {
            i += 1;
        }
        let (after_ws, _) = skip_tag_whitespace(s, i);
        if s.get(after_ws) != Some(&b'=') {
            continue;
        }
        let (value_start, _) = skip_tag_whitespace(s, after_ws + 1);
        i = value_start;
        match s.get(i)? {
            q @ (b'"' | b'\'') => {
                let q = *q;
                let close = s[i + 1..].iter().position(|&b| b == q)?;
                i += close + 2;
            }
            _ => {
                let len = s[i..]
                    .iter()
                    .take_while(|&&b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'"' | b'\'' | b'=' | b'<' | b'>' | b'`'))
                    .count();
                if len == 0 {
                    return None;
                }
                i += len;
            }
        }
    }
}

/// `</name>` starting at `start`.
pub fn closing_tag(s: &[u8], start: usize) -> Option<usize> {
    if !s[start..].starts_with(b"</") {
        return None;
    }
    let i = tag_name(s, start + 2)?;
    let (i, _) = skip_tag_whitespace(s, i);
    (s.get(i) == Some(&b'>')).then_some(i + 1)
}

fn find(s: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    s.get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Any inline raw HTML production starting at `<` in `s[start]`: tags,
/// comments, processing instructions, declarations and CDATA. Returns the
/// position after the construct.
pub fn inline_html(s: &[u8], start: usize) -> Option<usize> {
    let rest = s.get(start + 1..)?;
    if rest.starts_with(b"!--") {
        let body = start + 4;
        // `<!-->` and `<!--->` are complete comments.
        if s.get(body) == Some(&b'>') {
            return Some(body + 1);
        }
        if s[body..].starts_with(b"->") {
            return Some(body + 2);
        }
        return find(s, body, b"-->").map(|p| p + 3);
    }
    if rest.starts_with(b"?") {
        return find(s, start + 2, b"?>").map(|p| p + 2);
    }
    if rest.starts_with(b"![CDATA[") {
        return find(s, start + 9, b"]]>").map(|p| p + 3);
    }
    if rest.first() == Some(&b'!') && rest.get(1).is_some_and(|b| b.is_ascii_alphabetic()) {
        return find(s, start + 2, b">").map(|p| p + 1);
    }
    open_tag(s, start).or_else(|| closing_tag(s, start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atx_heading_start() {
        assert_eq!(atx_heading_start(b"# foo\n"), Some((1, 2)));
        assert_eq!(atx_heading_start(b"###\n"), Some((3, 3)));
        assert_eq!(atx_heading_start(b"#5 bolt\n"), None);
        assert_eq!(atx_heading_start(b"####### foo\n"), None);
    }

    #[test]
    fn test_code_fences() {
        assert_eq!(open_code_fence(b"```rust\n"), Some(3));
        assert_eq!(open_code_fence(b"~~~~ a`b\n"), Some(4));
        assert_eq!(open_code_fence(b"``` a`b\n"), None);
        assert_eq!(open_code_fence(b"``\n"), None);
        assert_eq!(close_code_fence(b"````  \n"), Some(4));
        assert_eq!(close_code_fence(b"``` x\n"), None);
    }

    #[test]
    fn test_setext_and_thematic_break() {
        assert_eq!(setext_heading_line(b"===\n"), Some(1));
        assert_eq!(setext_heading_line(b"--- \n"), Some(2));
        assert_eq!(setext_heading_line(b"-- -\n"), None);
        assert!(thematic_break(b"* * *\n"));
        assert!(thematic_break(b"___\n"));
        assert!(!thematic_break(b"--\n"));
        assert!(!thematic_break(b"*-*\n"));
    }

    #[test]
    fn test_html_block_kinds() {
        assert_eq!(html_block_start(b"<script type=\"x\">\n"), Some(1));
        assert_eq!(html_block_start(b"<!-- c -->\n"), Some(2));
        assert_eq!(html_block_start(b"<?php\n"), Some(3));
        assert_eq!(html_block_start(b"<!DOCTYPE html>\n"), Some(4));
        assert_eq!(html_block_start(b"<![CDATA[\n"), Some(5));
        assert_eq!(html_block_start(b"<div>\n"), Some(6));
        assert_eq!(html_block_start(b"</table>\n"), Some(6));
        assert_eq!(html_block_start(b"<divx>\n"), None);
        assert!(html_block_start_7(b"<a href=\"foo\">\n"));
        assert!(html_block_start_7(b"</ins>\n"));
        assert!(!html_block_start_7(b"<a href=\"foo\"> text\n"));
    }

    #[test]
    fn test_html_block_end() {
        assert!(html_block_end(1, b"foo</PRE>\n"));
        assert!(html_block_end(2, b"--> done\n"));
        assert!(!html_block_end(2, b"- ->\n"));
    }

    #[test]
    fn test_inline_html() {
        assert_eq!(inline_html(b"<a href='x'>y", 0), Some(12));
        assert_eq!(inline_html(b"<b2 data-x=1/>", 0), Some(14));
        assert_eq!(inline_html(b"<!-- hi -->", 0), Some(11));
        assert_eq!(inline_html(b"<!-->", 0), Some(5));
        assert_eq!(inline_html(b"</x >", 0), Some(5));
        assert_eq!(inline_html(b"<a  b=\"c\"d>", 0), None);
        assert_eq!(inline_html(b"<33>", 0), None);
    }

    #[test]
    fn test_footnote_definition() {
        assert_eq!(footnote_definition(b"[^note]: text\n"), Some((9, "note")));
        assert_eq!(footnote_definition(b"[^no te]: text\n"), None);
        assert_eq!(footnote_definition(b"[^]: text\n"), None);
    }

    #[test]
    fn test_alert_start() {
        let alert = alert_start(b"> [!warning] Careful\n", false).unwrap();
        assert_eq!(alert.alert_type, AlertType::Warning);
        assert_eq!(alert.title.as_deref(), Some("Careful"));
        assert!(alert_start(b"> [!bogus]\n", false).is_none());
        assert!(alert_start(b">>> [!NOTE]\n", false).is_none());
        assert_eq!(alert_start(b">>> [!NOTE]\n", true).unwrap().fence_length, 3);
    }
}
