//! Inline parsing: turns the raw text of a leaf block into inline nodes.
//!
//! Emphasis-like spans are resolved with a delimiter stack and links with a
//! bracket stack, in the manner of the CommonMark reference algorithm.

use crate::ast::{
    Ast, LineColumn, NodeCode, NodeFootnoteDefinition, NodeFootnoteReference, NodeId, NodeLink,
    NodeMath, NodeValue, NodeWikiLink, Sourcepos,
};
use crate::error::{Error, Result};
use crate::options::{BrokenLinkReference, Options, WikiLinksMode};
use crate::parser::entity::{decode_entity, unescape};
use crate::parser::references::{RefMap, normalize_label};
use crate::parser::scanners;
use crate::scanner::{
    char_at, char_before, is_ascii_punctuation, is_cjk, is_line_end, is_punctuation,
    is_space_or_tab, is_whitespace,
};

/// Longest backtick run tracked for code span matching.
const MAX_BACKTICKS: usize = 80;
/// Longest link label, in bytes.
const MAX_LINK_LABEL_LENGTH: usize = 999;
/// Deepest nesting of parentheses in a link destination.
const MAX_LINK_PAREN_DEPTH: usize = 32;
/// Deepest nesting of inline footnotes.
const MAX_INLINE_FOOTNOTE_DEPTH: usize = 16;

const LEFT_SINGLE_QUOTE: &str = "\u{2018}";
const RIGHT_SINGLE_QUOTE: &str = "\u{2019}";
const LEFT_DOUBLE_QUOTE: &str = "\u{201c}";
const RIGHT_DOUBLE_QUOTE: &str = "\u{201d}";
const ELLIPSIS: &str = "\u{2026}";
const EM_DASH: &str = "\u{2014}";
const EN_DASH: &str = "\u{2013}";

/// Footnote definitions created from `^[inline]` notes, appended to the
/// document once inline parsing is done.
#[derive(Debug, Default)]
pub(crate) struct InlineFootnotes {
    pub defs: Vec<NodeId>,
    pub counter: usize,
}

/// Maps byte positions in a block's content back to source lines and columns.
#[derive(Debug, Clone)]
pub(crate) struct LinePositions {
    start_line: usize,
    line_starts: Vec<usize>,
    columns: Vec<usize>,
}

impl LinePositions {
    /// `columns` holds the 0-based source column where each content line begins.
    pub fn new(start_line: usize, content: &str, columns: &[usize]) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            content
                .bytes()
                .enumerate()
                .filter(|&(_, b)| b == b'\n')
                .map(|(i, _)| i + 1),
        );
        let columns = (0..line_starts.len())
            .map(|i| columns.get(i).or(columns.last()).copied().unwrap_or(0))
            .collect();
        LinePositions {
            start_line,
            line_starts,
            columns,
        }
    }

    fn at(&self, pos: usize) -> LineColumn {
        let k = self.line_starts.partition_point(|&s| s <= pos).saturating_sub(1);
        LineColumn {
            line: self.start_line + k,
            column: pos - self.line_starts[k] + self.columns[k] + 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Delimiter {
    node: NodeId,
    /// Byte position of the run; strictly increasing along the stack.
    position: usize,
    delim_char: u8,
    /// Length of the run as written.
    length: usize,
    can_open: bool,
    can_close: bool,
}

impl Delimiter {
    /// Index into the openers-bottom table.
    fn bucket(&self) -> usize {
        let by_shape = usize::from(self.can_open) * 3 + self.length % 3;
        match self.delim_char {
            b'"' => 0,
            b'\'' => 1,
            b'~' => 2,
            b'^' => 3,
            b'=' => 4,
            b'|' => 5,
            b'*' => 6 + by_shape,
            _ => 12 + by_shape,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bracket {
    /// The `[` or `![` text node.
    node: NodeId,
    /// Byte position of `[` (or `!` for images).
    position: usize,
    image: bool,
    active: bool,
    bracket_after: bool,
}

pub(crate) struct Subject<'a> {
    ast: &'a mut Ast,
    options: &'a Options,
    refmap: &'a RefMap,
    footnotes: &'a mut InlineFootnotes,
    input: &'a str,
    pos: usize,
    positions: LinePositions,
    delimiters: Vec<Delimiter>,
    brackets: Vec<Bracket>,
    special: [bool; 256],
    backticks: [usize; MAX_BACKTICKS + 1],
    scanned_for_backticks: bool,
    depth: usize,
}

impl<'a> Subject<'a> {
    pub fn new(
        ast: &'a mut Ast,
        options: &'a Options,
        refmap: &'a RefMap,
        footnotes: &'a mut InlineFootnotes,
        input: &'a str,
        positions: LinePositions,
    ) -> Self {
        let mut special = [false; 256];
        for &b in b"\n\r`\\&<[]!*_" {
            special[b as usize] = true;
        }
        let ext = &options.extension;
        if ext.strikethrough || ext.subscript {
            special[b'~' as usize] = true;
        }
        if ext.superscript || ext.inline_footnotes {
            special[b'^' as usize] = true;
        }
        if ext.math_dollars || ext.math_code {
            special[b'$' as usize] = true;
        }
        if ext.highlight {
            special[b'=' as usize] = true;
        }
        if ext.spoiler {
            special[b'|' as usize] = true;
        }
        if options.parse.smart {
            for &b in b"'\".-" {
                special[b as usize] = true;
            }
        }
        Subject {
            ast,
            options,
            refmap,
            footnotes,
            input,
            pos: 0,
            positions,
            delimiters: Vec::new(),
            brackets: Vec::new(),
            special,
            backticks: [0; MAX_BACKTICKS + 1],
            scanned_for_backticks: false,
            depth: 0,
        }
    }

    /// Parse the whole input into children of `parent`.
    pub fn parse(&mut self, parent: NodeId) -> Result<()> {
        while self.pos < self.input.len() {
            if let Some(node) = self.parse_inline(parent)? {
                self.ast.append(parent, node);
            }
        }
        self.process_emphasis(0);
        Ok(())
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn peek_at(&self, pos: usize) -> Option<u8> {
        self.bytes().get(pos).copied()
    }

    fn sourcepos(&self, start: usize, end: usize) -> Sourcepos {
        let end = end.max(start + 1) - 1;
        Sourcepos {
            start: self.positions.at(start),
            end: self.positions.at(end),
        }
    }

    /// Allocate an inline node covering `input[start..end]`.
    fn make_inline(&mut self, value: NodeValue, start: usize, end: usize) -> NodeId {
        let sp = self.sourcepos(start, end);
        let id = self.ast.alloc(value, sp);
        self.ast[id].open = false;
        id
    }

    fn make_text(&mut self, text: &str, start: usize, end: usize) -> NodeId {
        self.make_inline(NodeValue::Text(text.to_string()), start, end)
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(is_space_or_tab) {
            self.pos += 1;
        }
    }

    fn parse_inline(&mut self, parent: NodeId) -> Result<Option<NodeId>> {
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let options = self.options;
        let ext = &options.extension;
        let smart = options.parse.smart;
        let node = match c {
            b'\n' | b'\r' => Some(self.handle_newline()),
            b'`' => Some(self.handle_backticks()),
            b'\\' => Some(self.handle_backslash()),
            b'&' => Some(self.handle_entity()),
            b'<' => Some(self.handle_pointy_brace()),
            b'*' | b'_' => Some(self.handle_delim(c)),
            b'\'' | b'"' if smart => Some(self.handle_delim(c)),
            b'~' if ext.strikethrough || ext.subscript => Some(self.handle_delim(c)),
            b'=' if ext.highlight => Some(self.handle_delim(c)),
            b'|' if ext.spoiler => Some(self.handle_delim(c)),
            b'^' => {
                if ext.inline_footnotes && ext.footnotes && self.peek_at(self.pos + 1) == Some(b'[') {
                    match self.handle_inline_footnote()? {
                        Some(node) => Some(node),
                        None => Some(self.handle_caret()),
                    }
                } else {
                    Some(self.handle_caret())
                }
            }
            b'$' => Some(self.handle_dollars()),
            b'-' if smart => Some(self.handle_hyphen()),
            b'.' if smart => Some(self.handle_period()),
            b'[' => {
                if ext.wikilinks().is_some()
                    && let Some(node) = self.handle_wikilink()
                {
                    return Ok(Some(node));
                }
                let start = self.pos;
                self.pos += 1;
                let node = self.make_text("[", start, self.pos);
                self.push_bracket(false, node, start);
                Some(node)
            }
            b'!' => {
                let start = self.pos;
                self.pos += 1;
                if self.peek() == Some(b'[') {
                    self.pos += 1;
                    let node = self.make_text("![", start, self.pos);
                    self.push_bracket(true, node, start);
                    Some(node)
                } else {
                    Some(self.make_text("!", start, self.pos))
                }
            }
            b']' => self.handle_close_bracket(parent)?,
            _ => Some(self.handle_text()),
        };
        Ok(node)
    }

    /// Plain text up to the next special character.
    fn handle_text(&mut self) -> NodeId {
        let start = self.pos;
        let input = self.input;
        let bytes = input.as_bytes();
        let mut end = start + 1;
        while end < bytes.len() && !self.special[bytes[end] as usize] {
            end += 1;
        }
        self.pos = end;
        let mut text = &input[start..end];
        if bytes.get(end).is_some_and(|&b| is_line_end(b)) {
            text = text.trim_end_matches(' ');
        }
        let text = text.to_string();
        self.make_inline(NodeValue::Text(text), start, end)
    }

    fn handle_newline(&mut self) -> NodeId {
        let nlpos = self.pos;
        if self.peek() == Some(b'\r') {
            self.pos += 1;
        }
        if self.peek() == Some(b'\n') {
            self.pos += 1;
        }
        let bytes = self.bytes();
        let hard = nlpos > 1 && bytes[nlpos - 1] == b' ' && bytes[nlpos - 2] == b' ';
        let value = if hard {
            NodeValue::LineBreak
        } else {
            NodeValue::SoftBreak
        };
        let node = self.make_inline(value, nlpos, nlpos + 1);
        self.skip_spaces();
        node
    }

    fn take_while(&mut self, c: u8) -> usize {
        let start = self.pos;
        while self.peek() == Some(c) {
            self.pos += 1;
        }
        self.pos - start
    }

    /// Position just after a closing backtick run of length `openticks`.
    fn scan_to_closing_backticks(&mut self, openticks: usize) -> Option<usize> {
        if openticks > MAX_BACKTICKS {
            return None;
        }
        if self.scanned_for_backticks && self.backticks[openticks] <= self.pos {
            return None;
        }
        loop {
            while self.peek().is_some_and(|b| b != b'`') {
                self.pos += 1;
            }
            if self.pos >= self.input.len() {
                self.scanned_for_backticks = true;
                return None;
            }
            let numticks = self.take_while(b'`');
            if numticks <= MAX_BACKTICKS {
                self.backticks[numticks] = self.pos - numticks;
            }
            if numticks == openticks {
                return Some(self.pos);
            }
        }
    }

    fn handle_backticks(&mut self) -> NodeId {
        let start = self.pos;
        let openticks = self.take_while(b'`');
        let after_open = self.pos;
        match self.scan_to_closing_backticks(openticks) {
            None => {
                self.pos = after_open;
                let ticks = "`".repeat(openticks);
                self.make_text(&ticks, start, after_open)
            }
            Some(end) => {
                let literal = normalize_code(&self.input[after_open..end - openticks]);
                self.make_inline(
                    NodeValue::Code(NodeCode {
                        num_backticks: openticks,
                        literal,
                    }),
                    start,
                    end,
                )
            }
        }
    }

    fn handle_backslash(&mut self) -> NodeId {
        let start = self.pos;
        self.pos += 1;
        match self.peek() {
            Some(c) if is_ascii_punctuation(c as char) => {
                self.pos += 1;
                let text = (c as char).to_string();
                if self.options.render.escaped_char_spans {
                    let escaped = self.make_inline(NodeValue::Escaped, start, self.pos);
                    let inner = self.make_text(&text, start + 1, self.pos);
                    self.ast.append(escaped, inner);
                    escaped
                } else {
                    self.make_text(&text, start, self.pos)
                }
            }
            Some(b'\n' | b'\r') => {
                let node = self.make_inline(NodeValue::LineBreak, start, start + 1);
                if self.peek() == Some(b'\r') {
                    self.pos += 1;
                }
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
                self.skip_spaces();
                node
            }
            _ => self.make_text("\\", start, self.pos),
        }
    }

    fn handle_entity(&mut self) -> NodeId {
        let start = self.pos;
        match decode_entity(self.bytes(), start) {
            Some((text, end)) => {
                self.pos = end;
                self.make_text(&text, start, end)
            }
            None => {
                self.pos += 1;
                self.make_text("&", start, self.pos)
            }
        }
    }

    fn handle_pointy_brace(&mut self) -> NodeId {
        let start = self.pos;
        let input = self.input;
        let bytes = input.as_bytes();
        if let Some(end) = scan_autolink_uri(bytes, start + 1) {
            self.pos = end;
            return self.make_autolink(&input[start + 1..end - 1], false, start, end);
        }
        if let Some(end) = scan_autolink_email(bytes, start + 1) {
            self.pos = end;
            return self.make_autolink(&input[start + 1..end - 1], true, start, end);
        }
        if let Some(end) = scanners::inline_html(bytes, start) {
            self.pos = end;
            let html = input[start..end].to_string();
            return self.make_inline(NodeValue::HtmlInline(html), start, end);
        }
        self.pos += 1;
        self.make_text("<", start, self.pos)
    }

    fn make_autolink(&mut self, raw: &str, email: bool, start: usize, end: usize) -> NodeId {
        let text = unescape_entities(raw);
        let url = if email {
            format!("mailto:{text}")
        } else {
            text.clone()
        };
        let link = self.make_inline(
            NodeValue::Link(NodeLink {
                url,
                title: String::new(),
            }),
            start,
            end,
        );
        let inner = self.make_inline(NodeValue::Text(text), start + 1, end - 1);
        self.ast.append(link, inner);
        link
    }

    /// Length of the delimiter run at `pos` and whether it may open or close.
    fn scan_delims(&mut self, c: u8) -> (usize, bool, bool) {
        let start = self.pos;
        let before = char_before(self.input, start).unwrap_or('\n');
        let numdelims = if c == b'\'' || c == b'"' {
            self.pos += 1;
            1
        } else {
            self.take_while(c)
        };
        let after = char_at(self.input, self.pos).unwrap_or('\n');

        let cjk = self.options.extension.cjk_friendly_emphasis;
        let before_ws = is_whitespace(before);
        let after_ws = is_whitespace(after);
        let before_punct = is_punctuation(before);
        let after_punct = is_punctuation(after);
        let before_loose = before_ws || (cjk && is_cjk(before));
        let after_loose = after_ws || (cjk && is_cjk(after));

        let left_flanking =
            numdelims > 0 && !after_ws && !(after_punct && !before_loose && !before_punct);
        let right_flanking =
            numdelims > 0 && !before_ws && !(before_punct && !after_loose && !after_punct);

        let (can_open, can_close) = match c {
            b'_' => (
                left_flanking && (!right_flanking || before_punct),
                right_flanking && (!left_flanking || after_punct),
            ),
            b'\'' | b'"' => (
                left_flanking && !right_flanking && before != ']' && before != ')',
                right_flanking,
            ),
            _ => (left_flanking, right_flanking),
        };
        (numdelims, can_open, can_close)
    }

    fn handle_delim(&mut self, c: u8) -> NodeId {
        let start = self.pos;
        let (numdelims, can_open, can_close) = self.scan_delims(c);
        let smart = self.options.parse.smart;
        let text = match c {
            b'\'' if smart => RIGHT_SINGLE_QUOTE.to_string(),
            b'"' if smart => {
                if can_close {
                    RIGHT_DOUBLE_QUOTE.to_string()
                } else {
                    LEFT_DOUBLE_QUOTE.to_string()
                }
            }
            _ => self.input[start..self.pos].to_string(),
        };
        let node = self.make_inline(NodeValue::Text(text), start, self.pos);

        let options = self.options;
        let ext = &options.extension;
        let usable = match c {
            b'~' => (numdelims == 1 && (ext.subscript || ext.strikethrough)) || (numdelims == 2 && ext.strikethrough),
            b'=' | b'|' => numdelims == 2,
            _ => true,
        };
        if usable && (can_open || can_close) {
            self.delimiters.push(Delimiter {
                node,
                position: start,
                delim_char: c,
                length: numdelims,
                can_open,
                can_close,
            });
        }
        node
    }

    fn handle_caret(&mut self) -> NodeId {
        if self.options.extension.superscript {
            self.handle_delim(b'^')
        } else {
            let start = self.pos;
            self.pos += 1;
            self.make_text("^", start, self.pos)
        }
    }

    fn handle_hyphen(&mut self) -> NodeId {
        let start = self.pos;
        let n = self.take_while(b'-');
        if n == 1 {
            return self.make_text("-", start, self.pos);
        }
        let (em, en) = if n % 3 == 0 {
            (n / 3, 0)
        } else if n % 2 == 0 {
            (0, n / 2)
        } else if n % 3 == 2 {
            ((n - 2) / 3, 1)
        } else {
            ((n - 4) / 3, 2)
        };
        let text = EM_DASH.repeat(em) + &EN_DASH.repeat(en);
        self.make_text(&text, start, self.pos)
    }

    fn handle_period(&mut self) -> NodeId {
        let start = self.pos;
        self.pos += 1;
        if self.peek() == Some(b'.') && self.peek_at(self.pos + 1) == Some(b'.') {
            self.pos += 2;
            self.make_text(ELLIPSIS, start, self.pos)
        } else {
            self.make_text(".", start, self.pos)
        }
    }

    fn handle_dollars(&mut self) -> NodeId {
        let start = self.pos;
        let input = self.input;
        let options = self.options;
        let ext = &options.extension;
        if ext.math_code && self.peek_at(start + 1) == Some(b'`') {
            self.pos += 1;
            let ticks = self.take_while(b'`');
            let after_open = self.pos;
            if let Some(end) = self.scan_to_closing_backticks(ticks)
                && self.peek_at(end) == Some(b'$')
            {
                self.pos = end + 1;
                let literal = normalize_code(&input[after_open..end - ticks]);
                return self.make_inline(
                    NodeValue::Math(NodeMath {
                        dollar_math: false,
                        display_math: false,
                        literal,
                    }),
                    start,
                    self.pos,
                );
            }
            self.pos = start;
        }
        if ext.math_dollars {
            let run = self.bytes()[start..].iter().take_while(|&&b| b == b'$').count();
            if run == 2 {
                if let Some(close) = find_from(self.bytes(), start + 2, b"$$")
                    && close > start + 2
                {
                    self.pos = close + 2;
                    let literal = input[start + 2..close].to_string();
                    return self.make_inline(
                        NodeValue::Math(NodeMath {
                            dollar_math: true,
                            display_math: true,
                            literal,
                        }),
                        start,
                        self.pos,
                    );
                }
            } else if run == 1
                && let Some(close) = self.scan_inline_math_close(start + 1)
            {
                self.pos = close + 1;
                let literal = input[start + 1..close].to_string();
                return self.make_inline(
                    NodeValue::Math(NodeMath {
                        dollar_math: true,
                        display_math: false,
                        literal,
                    }),
                    start,
                    self.pos,
                );
            }
            let end = start + run.max(1);
            self.pos = end;
            return self.make_text(&input[start..end], start, end);
        }
        self.pos += 1;
        self.make_text("$", start, self.pos)
    }

    /// Closing `$` of inline math opened just before `from`: the opener
    /// may not be followed by whitespace, the closer may not follow
    /// whitespace or a backslash, nor precede a digit.
    fn scan_inline_math_close(&self, from: usize) -> Option<usize> {
        let bytes = self.bytes();
        if bytes.get(from).is_none_or(|b| b.is_ascii_whitespace() || *b == b'$') {
            return None;
        }
        let mut i = from + 1;
        while i < bytes.len() {
            if bytes[i] == b'$'
                && !bytes[i - 1].is_ascii_whitespace()
                && bytes[i - 1] != b'\\'
                && !bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())
            {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    fn push_bracket(&mut self, image: bool, node: NodeId, position: usize) {
        if let Some(last) = self.brackets.last_mut() {
            last.bracket_after = true;
        }
        self.brackets.push(Bracket {
            node,
            position,
            image,
            active: true,
            bracket_after: false,
        });
    }

    fn handle_close_bracket(&mut self, parent: NodeId) -> Result<Option<NodeId>> {
        let close_pos = self.pos;
        self.pos += 1;
        let initial_pos = self.pos;

        let Some(&opener) = self.brackets.last() else {
            return Ok(Some(self.make_text("]", close_pos, initial_pos)));
        };
        if !opener.active {
            self.brackets.pop();
            return Ok(Some(self.make_text("]", close_pos, initial_pos)));
        }
        let is_image = opener.image;
        let text_start = opener.position + if is_image { 2 } else { 1 };
        let input = self.input;
        let options = self.options;
        let bytes = input.as_bytes();

        // Inline link: [text](destination "title")
        if self.peek() == Some(b'(') {
            let dest_start = spnl(bytes, self.pos + 1);
            if let Some((dest, dest_end)) = link_destination(input, dest_start) {
                let title_start = skip_spacechars(bytes, dest_end);
                let (title, title_end) = if title_start == dest_end {
                    (None, title_start)
                } else {
                    match link_title(input, title_start) {
                        Some((t, end)) => (Some(t), end),
                        None => (None, title_start),
                    }
                };
                let end_all = skip_spacechars(bytes, title_end);
                if self.peek_at(end_all) == Some(b')') {
                    self.pos = end_all + 1;
                    let link = NodeLink {
                        url: clean_url(dest),
                        title: title.map(unescape).unwrap_or_default(),
                    };
                    return self.close_bracket_match(parent, opener, link, close_pos);
                }
            }
            self.pos = initial_pos;
        }

        // Reference link: full `[text][label]`, collapsed `[text][]` or
        // shortcut `[text]`.
        let mut label = match link_label(input, self.pos) {
            Some((label, end)) => {
                self.pos = end;
                Some(label)
            }
            None => None,
        };
        let mut label_from_brackets = false;
        if label.is_none_or(str::is_empty) && !opener.bracket_after {
            label = Some(&input[text_start..close_pos]);
            label_from_brackets = true;
        }

        if let Some(label) = label.filter(|l| !l.is_empty() && l.len() <= MAX_LINK_LABEL_LENGTH) {
            let normalized = normalize_label(label);
            if let Some(reference) = self.refmap.get(&normalized) {
                let link = NodeLink {
                    url: reference.url.clone(),
                    title: reference.title.clone(),
                };
                return self.close_bracket_match(parent, opener, link, close_pos);
            }

            if options.extension.footnotes
                && label_from_brackets
                && !is_image
                && label.len() > 1
                && label.starts_with('^')
            {
                self.pos = initial_pos;
                let name = label[1..].to_string();
                return Ok(Some(self.make_footnote_reference(opener, name)));
            }

            if let Some(callback) = &options.parse.broken_link_callback
                && !normalized.is_empty()
            {
                tracing::trace!(label, "invoking broken link callback");
                let resolved = callback(BrokenLinkReference {
                    normalized: &normalized,
                    original: label,
                })
                .map_err(|e| Error::plugin("broken_link_callback", e))?;
                if let Some(resolved) = resolved {
                    let link = NodeLink {
                        url: resolved.url,
                        title: resolved.title,
                    };
                    return self.close_bracket_match(parent, opener, link, close_pos);
                }
            }
        }

        // No match: the `]` is literal text.
        self.brackets.pop();
        self.pos = initial_pos;
        Ok(Some(self.make_text("]", close_pos, initial_pos)))
    }

    fn close_bracket_match(
        &mut self,
        parent: NodeId,
        opener: Bracket,
        link: NodeLink,
        close_pos: usize,
    ) -> Result<Option<NodeId>> {
        let is_image = opener.image;
        let text_empty = self.ast[opener.node].next.is_none();
        if self.options.render.ignore_empty_links && !is_image && text_empty {
            self.brackets.pop();
            self.pos = close_pos + 1;
            return Ok(Some(self.make_text("]", close_pos, close_pos + 1)));
        }

        let value = if is_image {
            NodeValue::Image(link)
        } else {
            NodeValue::Link(link)
        };
        let node = self.make_inline(value, opener.position, self.pos);
        let mut child = self.ast[opener.node].next;
        while let Some(c) = child {
            child = self.ast[c].next;
            self.ast.append(node, c);
        }
        let container = self.ast[opener.node].parent.unwrap_or(parent);
        self.ast.append(container, node);

        self.process_emphasis(opener.position + 1);
        self.brackets.pop();
        self.ast.detach(opener.node);

        // Links may not contain other links.
        if !is_image {
            for bracket in self.brackets.iter_mut().filter(|b| !b.image) {
                bracket.active = false;
            }
        }
        Ok(None)
    }

    fn make_footnote_reference(&mut self, opener: Bracket, name: String) -> NodeId {
        // The label text nodes are replaced by the reference itself.
        self.delimiters.retain(|d| d.position < opener.position);
        let mut child = Some(opener.node);
        while let Some(c) = child {
            child = self.ast[c].next;
            self.ast.detach(c);
        }
        self.brackets.pop();
        self.make_inline(
            NodeValue::FootnoteReference(NodeFootnoteReference {
                name,
                ref_num: 0,
                ix: 0,
            }),
            opener.position,
            self.pos,
        )
    }

    /// `^[note]`: an anonymous footnote whose definition is the bracketed text.
    fn handle_inline_footnote(&mut self) -> Result<Option<NodeId>> {
        if self.depth >= MAX_INLINE_FOOTNOTE_DEPTH {
            return Ok(None);
        }
        let start = self.pos;
        let input = self.input;
        let bytes = input.as_bytes();
        let mut depth = 0usize;
        let mut i = start + 1;
        let close = loop {
            match bytes.get(i) {
                None => return Ok(None),
                Some(b'\\') => i += 2,
                Some(b'[') => {
                    depth += 1;
                    i += 1;
                }
                Some(b']') => {
                    depth -= 1;
                    if depth == 0 {
                        break i;
                    }
                    i += 1;
                }
                Some(_) => i += 1,
            }
        };
        let content_start = start + 2;
        let content = &input[content_start..close];
        if content.trim().is_empty() {
            return Ok(None);
        }

        self.footnotes.counter += 1;
        let name = format!("__inline_{}", self.footnotes.counter);
        let sp = self.sourcepos(start, close + 1);
        let def = self.ast.alloc(
            NodeValue::FootnoteDefinition(NodeFootnoteDefinition {
                name: name.clone(),
                total_references: 0,
            }),
            sp,
        );
        let para = self.ast.alloc(NodeValue::Paragraph, self.sourcepos(content_start, close));
        self.ast[def].open = false;
        self.ast[para].open = false;
        self.ast.append(def, para);

        let start_at = self.positions.at(content_start);
        let positions = LinePositions::new(start_at.line, content, &[start_at.column - 1]);
        let mut nested = Subject::new(
            &mut *self.ast,
            self.options,
            self.refmap,
            &mut *self.footnotes,
            content,
            positions,
        );
        nested.depth = self.depth + 1;
        nested.parse(para)?;
        self.footnotes.defs.push(def);

        self.pos = close + 1;
        Ok(Some(self.make_inline(
            NodeValue::FootnoteReference(NodeFootnoteReference {
                name,
                ref_num: 0,
                ix: 0,
            }),
            start,
            self.pos,
        )))
    }

    /// `[[target|label]]`, with the halves ordered per the configured mode.
    fn handle_wikilink(&mut self) -> Option<NodeId> {
        let mode = self.options.extension.wikilinks()?;
        let start = self.pos;
        let input = self.input;
        let bytes = input.as_bytes();
        if !bytes[start..].starts_with(b"[[") {
            return None;
        }
        let inner_start = start + 2;
        let mut i = inner_start;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'[' | b'\n' | b'\r' => return None,
                b']' => break,
                _ => i += 1,
            }
        }
        if !bytes.get(i..).is_some_and(|rest| rest.starts_with(b"]]")) {
            return None;
        }
        let inner = &input[inner_start..i];
        let (url, label) = match inner.find('|') {
            Some(p) => {
                let (a, b) = (inner[..p].trim(), inner[p + 1..].trim());
                match mode {
                    WikiLinksMode::UrlFirst => (a, b),
                    WikiLinksMode::TitleFirst => (b, a),
                }
            }
            None => (inner.trim(), inner.trim()),
        };
        if url.is_empty() || label.is_empty() {
            return None;
        }
        let end = i + 2;
        let url = unescape(url);
        let label = unescape(label);
        let node = self.make_inline(NodeValue::WikiLink(NodeWikiLink { url }), start, end);
        let text = self.make_text(&label, inner_start, i);
        self.ast.append(node, text);
        self.pos = end;
        Some(node)
    }

    fn text_len(&self, node: NodeId) -> usize {
        match &self.ast[node].value {
            NodeValue::Text(t) => t.len(),
            _ => 0,
        }
    }

    /// Resolve emphasis among delimiters at or after byte `stack_bottom`.
    fn process_emphasis(&mut self, stack_bottom: usize) {
        let mut openers_bottom = [stack_bottom; 18];
        let mut closer_idx = self.delimiters.partition_point(|d| d.position < stack_bottom);

        while closer_idx < self.delimiters.len() {
            let closer = self.delimiters[closer_idx];
            if !closer.can_close {
                closer_idx += 1;
                continue;
            }
            let bucket = closer.bucket();
            let mut opener_idx = None;
            let mut keep_bottom = false;
            let mut i = closer_idx;
            while i > 0 {
                i -= 1;
                let opener = self.delimiters[i];
                if opener.position < stack_bottom || opener.position < openers_bottom[bucket] {
                    break;
                }
                if !opener.can_open || opener.delim_char != closer.delim_char {
                    continue;
                }
                let odd_match = (closer.can_open || opener.can_close)
                    && (opener.length + closer.length) % 3 == 0
                    && !(opener.length % 3 == 0 && closer.length % 3 == 0);
                let size_mismatch = matches!(closer.delim_char, b'~' | b'=' | b'|')
                    && self.text_len(opener.node) != self.text_len(closer.node);
                if !odd_match && !size_mismatch {
                    opener_idx = Some(i);
                    break;
                }
                keep_bottom = true;
            }

            match (closer.delim_char, opener_idx) {
                (b'\'' | b'"', found) => {
                    let (left, right) = if closer.delim_char == b'\'' {
                        (LEFT_SINGLE_QUOTE, RIGHT_SINGLE_QUOTE)
                    } else {
                        (LEFT_DOUBLE_QUOTE, RIGHT_DOUBLE_QUOTE)
                    };
                    self.ast[closer.node].value = NodeValue::Text(right.to_string());
                    if let Some(o) = found {
                        let opener_node = self.delimiters[o].node;
                        self.ast[opener_node].value = NodeValue::Text(left.to_string());
                        self.delimiters.remove(o);
                        closer_idx -= 1;
                        self.delimiters.remove(closer_idx);
                        continue;
                    }
                }
                (_, Some(o)) => {
                    closer_idx = self.insert_emph(o, closer_idx);
                    continue;
                }
                _ => {}
            }

            // No opener: later closers of this kind need not look further back.
            if !keep_bottom {
                openers_bottom[bucket] = closer.position;
            }
            if !closer.can_open {
                self.delimiters.remove(closer_idx);
            } else {
                closer_idx += 1;
            }
        }

        let keep = self.delimiters.partition_point(|d| d.position < stack_bottom);
        self.delimiters.truncate(keep);
    }

    /// Wrap the nodes between a matched opener and closer. Returns the index
    /// of the next closer to consider.
    fn insert_emph(&mut self, opener_idx: usize, closer_idx: usize) -> usize {
        let opener = self.delimiters[opener_idx];
        let closer = self.delimiters[closer_idx];
        let opener_num = self.text_len(opener.node);
        let closer_num = self.text_len(closer.node);
        let c = closer.delim_char;
        let use_delims = match c {
            b'~' | b'=' | b'|' => closer_num,
            b'^' => 1,
            _ if opener_num >= 2 && closer_num >= 2 => 2,
            _ => 1,
        };
        let options = self.options;
        let ext = &options.extension;
        let value = match (c, use_delims) {
            (b'~', 1) if ext.subscript => NodeValue::Subscript,
            (b'~', _) => NodeValue::Strikethrough,
            (b'=', _) => NodeValue::Highlight,
            (b'|', _) => NodeValue::SpoileredText,
            (b'^', _) => NodeValue::Superscript,
            (b'_', 2) if ext.underline => NodeValue::Underline,
            (_, 2) => NodeValue::Strong,
            _ => NodeValue::Emph,
        };

        let opener_left = opener_num - use_delims;
        let closer_left = closer_num - use_delims;
        let delim = (c as char).to_string();
        self.ast[opener.node].value = NodeValue::Text(delim.repeat(opener_left));
        self.ast[closer.node].value = NodeValue::Text(delim.repeat(closer_left));

        let mut sp = Sourcepos {
            start: self.ast[opener.node].sourcepos.start,
            end: self.ast[closer.node].sourcepos.end,
        };
        sp.start.column += opener_left;
        sp.end.column = sp.end.column.saturating_sub(closer_left);
        self.ast[opener.node].sourcepos.end.column = sp.start.column.saturating_sub(1);
        self.ast[closer.node].sourcepos.start.column = sp.end.column + 1;

        let emph = self.ast.alloc(value, sp);
        self.ast[emph].open = false;
        let mut child = self.ast[opener.node].next;
        while let Some(n) = child {
            if n == closer.node {
                break;
            }
            child = self.ast[n].next;
            self.ast.append(emph, n);
        }
        self.ast.insert_after(opener.node, emph);

        self.delimiters.drain(opener_idx + 1..closer_idx);
        let mut closer_idx = opener_idx + 1;
        if opener_left == 0 {
            self.ast.detach(opener.node);
            self.delimiters.remove(opener_idx);
            closer_idx -= 1;
        }
        if closer_left == 0 {
            self.ast.detach(closer.node);
            self.delimiters.remove(closer_idx);
        }
        closer_idx
    }
}

/// Line endings in code spans become spaces, and one leading and trailing
/// space is stripped when both are present and the content is not all spaces.
fn normalize_code(raw: &str) -> String {
    let mut code = raw.replace("\r\n", " ").replace(['\n', '\r'], " ");
    if code.len() >= 2
        && code.starts_with(' ')
        && code.ends_with(' ')
        && code.bytes().any(|b| b != b' ')
    {
        code = code[1..code.len() - 1].to_string();
    }
    code
}

fn unescape_entities(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    let mut run_start = 0;
    while i < bytes.len() {
        if bytes[i] == b'&'
            && let Some((decoded, next)) = decode_entity(bytes, i)
        {
            out.push_str(&raw[run_start..i]);
            out.push_str(&decoded);
            i = next;
            run_start = i;
        } else {
            i += 1;
        }
    }
    out.push_str(&raw[run_start..]);
    out
}

fn find_from(s: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    s.get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// `scheme:rest>` after `<`; the scheme is 2 to 32 characters.
fn scan_autolink_uri(s: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    if !s.get(i)?.is_ascii_alphabetic() {
        return None;
    }
    while i < s.len() && (s[i].is_ascii_alphanumeric() || matches!(s[i], b'+' | b'.' | b'-')) {
        i += 1;
    }
    let scheme_len = i - start;
    if !(2..=32).contains(&scheme_len) || s.get(i) != Some(&b':') {
        return None;
    }
    i += 1;
    while i < s.len() {
        match s[i] {
            b'>' => return Some(i + 1),
            b'<' => return None,
            b if b <= b' ' => return None,
            _ => i += 1,
        }
    }
    None
}

/// `local@domain>` after `<`.
fn scan_autolink_email(s: &[u8], start: usize) -> Option<usize> {
    let mut i = start;
    let is_local = |b: u8| b.is_ascii_alphanumeric() || b".!#$%&'*+/=?^_`{|}~-".contains(&b);
    while i < s.len() && is_local(s[i]) {
        i += 1;
    }
    if i == start || s.get(i) != Some(&b'@') {
        return None;
    }
    i += 1;
    loop {
        let label_start = i;
        while i < s.len() && (s[i].is_ascii_alphanumeric() || s[i] == b'-') {
            i += 1;
        }
        let label = &s[label_start..i];
        if label.is_empty()
            || label.len() > 63
            || label[0] == b'-'
            || label[label.len() - 1] == b'-'
        {
            return None;
        }
        match s.get(i) {
            Some(b'.') => i += 1,
            Some(b'>') => return Some(i + 1),
            _ => return None,
        }
    }
}

/// Spaces and tabs, then at most one line ending, then spaces and tabs.
pub(crate) fn spnl(s: &[u8], mut i: usize) -> usize {
    i = skip_spacechars_inline(s, i);
    if s.get(i) == Some(&b'\r') {
        i += 1;
    }
    if s.get(i) == Some(&b'\n') {
        i += 1;
    }
    skip_spacechars_inline(s, i)
}

fn skip_spacechars_inline(s: &[u8], mut i: usize) -> usize {
    while s.get(i).is_some_and(|&b| is_space_or_tab(b)) {
        i += 1;
    }
    i
}

/// Any run of whitespace including line endings.
fn skip_spacechars(s: &[u8], mut i: usize) -> usize {
    while s.get(i).is_some_and(|&b| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)) {
        i += 1;
    }
    i
}

/// A `[label]` starting at `i`. Returns the trimmed label and the position
/// after `]`.
pub(crate) fn link_label(s: &str, i: usize) -> Option<(&str, usize)> {
    let bytes = s.as_bytes();
    if bytes.get(i) != Some(&b'[') {
        return None;
    }
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'[' => return None,
            b']' => {
                let label = s[i + 1..j].trim_matches(|c: char| c.is_ascii_whitespace());
                return Some((label, j + 1));
            }
            b'\\' => {
                j += 1;
                if bytes.get(j).is_some_and(|&b| is_ascii_punctuation(b as char)) {
                    j += 1;
                }
            }
            _ => j += 1,
        }
        if j - i > MAX_LINK_LABEL_LENGTH + 1 {
            return None;
        }
    }
    None
}

/// A link destination starting at `i`, either `<...>` or a run without
/// spaces and with balanced parentheses. Returns the raw destination
/// (without angle brackets) and the position after it.
pub(crate) fn link_destination(s: &str, i: usize) -> Option<(&str, usize)> {
    let bytes = s.as_bytes();
    if bytes.get(i) == Some(&b'<') {
        let mut j = i + 1;
        while j < bytes.len() {
            match bytes[j] {
                b'>' => return Some((&s[i + 1..j], j + 1)),
                b'<' | b'\n' | b'\r' => return None,
                b'\\' if bytes.get(j + 1).is_some_and(|&b| is_ascii_punctuation(b as char)) => j += 2,
                _ => j += 1,
            }
        }
        return None;
    }

    let mut j = i;
    let mut depth = 0usize;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if bytes.get(j + 1).is_some_and(|&b| is_ascii_punctuation(b as char)) => j += 2,
            b'(' => {
                depth += 1;
                if depth > MAX_LINK_PAREN_DEPTH {
                    return None;
                }
                j += 1;
            }
            b')' => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                j += 1;
            }
            b if b <= b' ' || b == 0x7f => break,
            _ => j += 1,
        }
    }
    if depth != 0 {
        return None;
    }
    Some((&s[i..j], j))
}

/// A link title in `"..."`, `'...'` or `(...)`. Returns the raw title
/// (without delimiters) and the position after it.
pub(crate) fn link_title(s: &str, i: usize) -> Option<(&str, usize)> {
    let bytes = s.as_bytes();
    let close = match bytes.get(i)? {
        b'"' => b'"',
        b'\'' => b'\'',
        b'(' => b')',
        _ => return None,
    };
    let mut j = i + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if j + 1 < bytes.len() => j += 2,
            b if b == close => return Some((&s[i + 1..j], j + 1)),
            b'(' if close == b')' => return None,
            _ => j += 1,
        }
    }
    None
}

/// Unescape a raw destination.
pub(crate) fn clean_url(raw: &str) -> String {
    unescape(raw.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_label() {
        assert_eq!(link_label("[foo] x", 0), Some(("foo", 5)));
        assert_eq!(link_label("[ a\\]b ]", 0), Some(("a\\]b", 8)));
        assert_eq!(link_label("[a[b]", 0), None);
        assert_eq!(link_label("[unclosed", 0), None);
    }

    #[test]
    fn test_link_destination() {
        assert_eq!(link_destination("<a b>)", 0), Some(("a b", 5)));
        assert_eq!(link_destination("foo(and(bar)) x", 0), Some(("foo(and(bar))", 13)));
        assert_eq!(link_destination("foo(bar", 0), None);
        assert_eq!(link_destination(")", 0), Some(("", 0)));
        assert_eq!(link_destination("<a\nb>", 0), None);
    }

    #[test]
    fn test_link_title() {
        assert_eq!(link_title("\"t\\\"x\")", 0), Some(("t\\\"x", 6)));
        assert_eq!(link_title("(a(b))", 0), None);
        assert_eq!(link_title("'ok'", 0), Some(("ok", 4)));
    }

    #[test]
    fn test_autolink_scanners() {
        assert_eq!(scan_autolink_uri(b"<http://a.b>", 1), Some(12));
        assert_eq!(scan_autolink_uri(b"<m:abc>", 1), None);
        assert_eq!(scan_autolink_uri(b"<http://a b>", 1), None);
        assert_eq!(scan_autolink_email(b"<foo@bar.example.com>", 1), Some(21));
        assert_eq!(scan_autolink_email(b"<foo@-bar.com>", 1), None);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" a "), "a");
        assert_eq!(normalize_code("  "), "  ");
        assert_eq!(normalize_code("a\nb"), "a b");
        assert_eq!(normalize_code(" `` "), "``");
    }

    #[test]
    fn test_line_positions() {
        let positions = LinePositions::new(3, "ab\ncd", &[2, 4]);
        assert_eq!(positions.at(0), LineColumn { line: 3, column: 3 });
        assert_eq!(positions.at(4), LineColumn { line: 4, column: 6 });
    }
}
