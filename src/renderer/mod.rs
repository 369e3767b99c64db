//! Output formats.
//!
//! Every renderer walks the tree with an explicit stack of enter and exit
//! events, so deeply nested input cannot exhaust the call stack.

pub mod commonmark;
pub mod html;
pub mod xml;

use std::borrow::Cow;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::ast::{Ast, NodeId, Sourcepos};
use crate::error::{Error, Result};
use crate::options::Options;

/// Bytes left as-is in an `href` or `src` attribute.
const HREF_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'+')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b',')
    .remove(b'%')
    .remove(b'#')
    .remove(b'@')
    .remove(b'?')
    .remove(b'=')
    .remove(b';')
    .remove(b':')
    .remove(b'/')
    .remove(b'&')
    .remove(b'$')
    .remove(b'~');

/// Raw HTML tags neutralized by the tag filter.
const TAGFILTER_BLACKLIST: [&str; 9] = [
    "title",
    "textarea",
    "style",
    "xmp",
    "iframe",
    "noembed",
    "noframes",
    "script",
    "plaintext",
];

/// A step of the tree walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    Enter(NodeId),
    Exit(NodeId),
}

/// Pre-order walk yielding an exit event after each node's children.
/// `enter` returns whether the node's children should be visited; when it
/// returns `false` the exit event is skipped as well.
pub(crate) fn walk<F>(ast: &Ast, root: NodeId, mut visit: F) -> Result<()>
where
    F: FnMut(Visit) -> Result<bool>,
{
    let mut stack = vec![Visit::Enter(root)];
    while let Some(event) = stack.pop() {
        match event {
            Visit::Enter(id) => {
                if visit(event)? {
                    stack.push(Visit::Exit(id));
                    let children: Vec<NodeId> = ast.children(id).collect();
                    stack.extend(children.into_iter().rev().map(Visit::Enter));
                }
            }
            Visit::Exit(_) => {
                visit(event)?;
            }
        }
    }
    Ok(())
}

/// Escape `&`, `<`, `>` and `"`.
pub(crate) fn escape_html(out: &mut String, text: &str) {
    out.push_str(&html_escape::encode_double_quoted_attribute(text));
}

/// Percent-encode a URL for an attribute, keeping existing escapes.
pub(crate) fn escape_href(out: &mut String, url: &str) {
    for chunk in utf8_percent_encode(url, HREF_ENCODE) {
        for c in chunk.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '\'' => out.push_str("&#x27;"),
                _ => out.push(c),
            }
        }
    }
}

/// `javascript:`, `vbscript:`, `file:` and non-image `data:` URLs.
pub(crate) fn is_dangerous_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    if lower.starts_with("data:") {
        return !["png", "gif", "jpeg", "webp"]
            .iter()
            .any(|kind| lower.starts_with(&format!("data:image/{kind}")));
    }
    ["javascript:", "vbscript:", "file:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Replace the `<` of blacklisted tags with `&lt;`.
pub(crate) fn tagfilter(literal: &str) -> Cow<'_, str> {
    let bytes = literal.as_bytes();
    let mut out = String::new();
    let mut last = 0;
    for (i, _) in literal.match_indices('<') {
        if is_filtered_tag(&bytes[i..]) {
            out.push_str(&literal[last..i]);
            out.push_str("&lt;");
            last = i + 1;
        }
    }
    if out.is_empty() {
        Cow::Borrowed(literal)
    } else {
        out.push_str(&literal[last..]);
        Cow::Owned(out)
    }
}

fn is_filtered_tag(tag: &[u8]) -> bool {
    let name_start = if tag.get(1) == Some(&b'/') { 2 } else { 1 };
    TAGFILTER_BLACKLIST.iter().any(|name| {
        let end = name_start + name.len();
        tag.get(name_start..end)
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()))
            && match tag.get(end) {
                Some(b'>') => true,
                Some(b'/') => tag.get(end + 1) == Some(&b'>'),
                Some(&c) => c.is_ascii_whitespace(),
                None => false,
            }
    })
}

/// Apply the configured link or image URL rewriter.
pub(crate) fn rewrite_url(options: &Options, url: &str, image: bool) -> Result<String> {
    let (rewriter, plugin) = if image {
        (&options.parse.image_url_rewriter, "image_url_rewriter")
    } else {
        (&options.parse.link_url_rewriter, "link_url_rewriter")
    };
    match rewriter {
        Some(rewrite) => rewrite(url).map_err(|e| Error::plugin(plugin, e)),
        None => Ok(url.to_string()),
    }
}

pub(crate) fn sourcepos_attr(out: &mut String, sourcepos: Sourcepos) {
    out.push_str(" data-sourcepos=\"");
    out.push_str(&sourcepos.to_string());
    out.push('"');
}
