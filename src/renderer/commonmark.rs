//! CommonMark output.
//!
//! Text goes through a single writer that tracks the current column, the
//! line prefix of enclosing block quotes and list items, and the last
//! position where a long line may be broken.

use crate::ast::{Ast, ListDelimType, ListType, NodeId, NodeValue, TableAlignment};
use crate::error::Result;
use crate::options::{Options, Plugins, WikiLinksMode};
use crate::renderer::{Visit, rewrite_url, walk};

/// Render a tree back to CommonMark.
pub fn format_document(ast: &Ast, options: &Options, _plugins: &Plugins) -> Result<String> {
    let Some(root) = ast.root() else {
        return Ok(String::new());
    };
    tracing::debug!(nodes = ast.len(), format = "commonmark", "rendering");
    let mut formatter = CommonMarkFormatter {
        ast,
        options,
        out: String::new(),
        prefix: String::new(),
        column: 0,
        need_cr: 0,
        last_breakable: 0,
        begin_line: true,
        begin_content: true,
        no_linebreaks: false,
        in_tight_list_item: false,
        in_table: false,
    };
    walk(ast, root, |visit| match visit {
        Visit::Enter(id) => formatter.format_node(id, true),
        Visit::Exit(id) => formatter.format_node(id, false),
    })?;
    let mut out = formatter.out;
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escaping {
    Literal,
    Normal,
    Url,
    Title,
}

struct CommonMarkFormatter<'a> {
    ast: &'a Ast,
    options: &'a Options,
    out: String,
    /// Written at the start of every line.
    prefix: String,
    column: usize,
    /// Line breaks owed before the next output: 1 ends the line, 2 also
    /// leaves a blank one.
    need_cr: u8,
    /// Byte offset of the last space a long line may be broken at.
    last_breakable: usize,
    begin_line: bool,
    begin_content: bool,
    no_linebreaks: bool,
    in_tight_list_item: bool,
    in_table: bool,
}

impl CommonMarkFormatter<'_> {
    fn cr(&mut self) {
        self.need_cr = self.need_cr.max(1);
    }

    fn blankline(&mut self) {
        self.need_cr = self.need_cr.max(2);
    }

    fn lit(&mut self, s: &str) {
        self.output(s, false, Escaping::Literal);
    }

    fn flush_line_breaks(&mut self) {
        if self.in_tight_list_item && self.need_cr > 1 {
            self.need_cr = 1;
        }
        let mut k = self.out.len();
        while self.need_cr > 0 {
            if k == 0 || self.out.as_bytes()[k - 1] == b'\n' {
                k = k.saturating_sub(1);
            } else {
                self.out.push('\n');
                if self.need_cr > 1 {
                    let prefix = self.prefix.trim_end().to_string();
                    self.out.push_str(&prefix);
                }
            }
            self.column = 0;
            self.last_breakable = 0;
            self.begin_line = true;
            self.begin_content = true;
            self.need_cr -= 1;
        }
    }

    fn output(&mut self, s: &str, wrap: bool, escaping: Escaping) {
        let wrap = wrap && !self.no_linebreaks;
        self.flush_line_breaks();
        let width = self.options.render.width;

        let mut chars = s.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            let nextc = s[i + c.len_utf8()..].chars().next();
            if c == ' ' && wrap {
                if self.begin_line {
                    continue;
                }
                let last_nonspace = self.out.len();
                self.out.push(' ');
                self.column += 1;
                self.begin_content = false;
                while chars.peek().is_some_and(|&(_, c)| c == ' ') {
                    chars.next();
                }
                // A line starting with a digit could read as a list marker.
                if !chars.peek().is_some_and(|&(_, c)| c.is_ascii_digit()) {
                    self.last_breakable = last_nonspace;
                }
            } else {
                if self.begin_line {
                    let prefix = self.prefix.clone();
                    self.out.push_str(&prefix);
                    self.column = prefix.chars().count();
                }
                if escaping == Escaping::Literal && c == '\n' {
                    self.out.push('\n');
                    self.column = 0;
                    self.begin_line = true;
                    self.begin_content = true;
                    self.last_breakable = 0;
                    continue;
                }
                if escaping == Escaping::Literal {
                    self.out.push(c);
                    self.column += 1;
                } else {
                    self.outc(c, nextc, escaping);
                }
                self.begin_line = false;
                self.begin_content = self.begin_content && c.is_ascii_digit();
            }

            if width > 0 && self.column > width && !self.begin_line && self.last_breakable > 0 {
                let remainder = self.out[self.last_breakable + 1..].to_string();
                self.out.truncate(self.last_breakable);
                self.out.push('\n');
                let prefix = self.prefix.clone();
                self.out.push_str(&prefix);
                self.out.push_str(&remainder);
                self.column = prefix.chars().count() + remainder.chars().count();
                self.last_breakable = 0;
                self.begin_line = false;
                self.begin_content = false;
            }
        }
    }

    fn outc(&mut self, c: char, nextc: Option<char>, escaping: Escaping) {
        let next = nextc.unwrap_or('\0');
        let needs_escaping = c.is_ascii()
            && match escaping {
                Escaping::Literal => false,
                Escaping::Normal => self.needs_escaping(c, next),
                Escaping::Url => {
                    matches!(c, '`' | '<' | '>' | '\\' | ')' | '(') || c.is_ascii_whitespace()
                }
                Escaping::Title => matches!(c, '`' | '<' | '>' | '"' | '\\'),
            };

        if !needs_escaping {
            self.out.push(c);
            self.column += 1;
        } else if escaping == Escaping::Url && c.is_ascii_whitespace() {
            self.out.push_str(&format!("%{:02X}", u32::from(c)));
            self.column += 3;
        } else if c.is_ascii_punctuation() {
            self.out.push('\\');
            self.out.push(c);
            self.column += 2;
        } else {
            let entity = format!("&#{};", u32::from(c));
            self.column += entity.len();
            self.out.push_str(&entity);
        }
    }

    fn needs_escaping(&self, c: char, next: char) -> bool {
        let ext = &self.options.extension;
        let minimize = self.options.render.experimental_minimize_commonmark;
        let prev = self.out.chars().next_back();
        let follows_digit = prev.is_some_and(|p| p.is_ascii_digit());
        let smart = self.options.parse.smart;

        if (c as u32) < 0x20 {
            return true;
        }
        match c {
            '*' | '[' | '`' => true,
            '\\' => !minimize || next == '\0' || next.is_ascii_punctuation(),
            '_' => {
                !minimize
                    || !(prev.is_some_and(|p| p.is_alphanumeric()) && next.is_alphanumeric())
            }
            ']' | '!' => !minimize || (c == '!' && next == '['),
            '#' | '>' => !minimize || self.begin_content,
            '<' => !minimize || next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?'),
            '~' => !minimize || ext.strikethrough || ext.subscript,
            '&' => next.is_ascii_alphabetic() || next == '#',
            '|' => self.in_table || ext.spoiler,
            '^' => ext.superscript || ext.inline_footnotes,
            '$' => ext.math_dollars,
            '-' if smart && next == '-' => true,
            '.' if smart && next == '.' => true,
            '"' | '\'' if smart => true,
            '-' | '+' | '=' if self.begin_content && !follows_digit => true,
            '=' => ext.highlight && next == '=',
            '.' | ')' if self.begin_content && follows_digit => next == '\0' || next.is_whitespace(),
            _ => false,
        }
    }

    fn block_containing(&self, id: NodeId) -> Option<NodeId> {
        std::iter::once(id)
            .chain(self.ast.ancestors(id))
            .find(|&n| self.ast[n].value.is_block())
    }

    fn is_tight_item(&self, id: NodeId) -> bool {
        matches!(self.ast[id].value, NodeValue::Item(_) | NodeValue::TaskItem(_))
            && self.ast[id]
                .parent
                .is_some_and(|list| matches!(self.ast[list].value, NodeValue::List(nl) if nl.tight))
    }

    /// Link text is never broken across lines.
    fn in_link(&self, id: NodeId) -> bool {
        self.ast.ancestors(id).any(|a| {
            matches!(
                self.ast[a].value,
                NodeValue::Link(_) | NodeValue::Image(_) | NodeValue::WikiLink(_)
            )
        })
    }

    /// A term paragraph whose details follow on the next line.
    fn is_tight_term(&self, id: NodeId) -> bool {
        let term = self.ast[id].parent;
        let item = term.and_then(|t| self.ast[t].parent);
        term.is_some_and(|t| matches!(self.ast[t].value, NodeValue::DescriptionTerm))
            && item.is_some_and(|i| {
                matches!(self.ast[i].value, NodeValue::DescriptionItem(di) if di.tight)
            })
    }

    fn compute_tight(&self, id: NodeId) -> bool {
        self.block_containing(id).is_some_and(|block| {
            self.is_tight_item(block)
                || self.ast[block]
                    .parent
                    .is_some_and(|parent| self.is_tight_item(parent))
        })
    }

    /// Marker text and prefix width of a list item.
    fn list_marker(&self, item: NodeId) -> (String, usize) {
        let list = self.ast[item]
            .parent
            .and_then(|p| match self.ast[p].value {
                NodeValue::List(nl) => Some(nl),
                _ => None,
            })
            .unwrap_or_default();
        match list.list_type {
            ListType::Bullet => {
                let marker = format!("{} ", self.options.render.list_style.marker());
                (marker, 2)
            }
            ListType::Ordered => {
                let index = self.ast[item]
                    .parent
                    .map_or(0, |p| self.ast.children(p).position(|c| c == item).unwrap_or(0));
                let delim = match list.delimiter {
                    ListDelimType::Period => '.',
                    ListDelimType::Paren => ')',
                };
                let mut marker = format!("{}{delim}", list.start + index);
                let width = (marker.len() + 1).max(self.options.render.ol_width);
                while marker.len() < width {
                    marker.push(' ');
                }
                (marker, width)
            }
        }
    }

    fn format_node(&mut self, id: NodeId, entering: bool) -> Result<bool> {
        let ast = self.ast;
        let node = &ast[id];
        let is_item = matches!(node.value, NodeValue::Item(_) | NodeValue::TaskItem(_));
        if !(is_item && node.prev.is_none() && entering) {
            self.in_tight_list_item = self.compute_tight(id);
        }
        let allow_wrap = self.options.render.width > 0 && !self.options.render.hardbreaks;

        match &node.value {
            NodeValue::Document | NodeValue::DescriptionItem(_) | NodeValue::Escaped => {}
            NodeValue::FrontMatter(raw) => {
                if entering {
                    self.lit(raw);
                    self.blankline();
                }
            }
            NodeValue::BlockQuote => {
                if entering {
                    self.lit("> ");
                    self.prefix.push_str("> ");
                } else {
                    self.prefix.truncate(self.prefix.len().saturating_sub(2));
                    self.blankline();
                }
            }
            NodeValue::MultilineBlockQuote(mbq) => {
                let fence = ">".repeat(mbq.fence_length);
                if entering {
                    self.blankline();
                    self.lit(&fence);
                    self.cr();
                } else {
                    self.cr();
                    self.lit(&fence);
                    self.blankline();
                }
            }
            NodeValue::Alert(alert) => {
                if entering {
                    self.blankline();
                    if alert.multiline {
                        self.lit(&">".repeat(alert.fence_length));
                        self.lit(" ");
                    } else {
                        self.lit("> ");
                    }
                    self.lit("[!");
                    self.lit(&alert.alert_type.default_title().to_uppercase());
                    self.lit("]");
                    if let Some(title) = &alert.title {
                        self.lit(" ");
                        self.lit(title);
                    }
                    self.cr();
                    if !alert.multiline {
                        self.prefix.push_str("> ");
                    }
                } else if alert.multiline {
                    self.cr();
                    self.lit(&">".repeat(alert.fence_length));
                    self.blankline();
                } else {
                    self.prefix.truncate(self.prefix.len().saturating_sub(2));
                    self.blankline();
                }
            }
            NodeValue::List(_) => {
                let followed_by_block = node.next.is_some_and(|n| {
                    matches!(ast[n].value, NodeValue::CodeBlock(_) | NodeValue::List(_))
                });
                if !entering && followed_by_block {
                    self.blankline();
                    self.lit("<!-- end list -->");
                    self.blankline();
                }
            }
            NodeValue::Item(_) | NodeValue::TaskItem(_) => {
                let (marker, width) = self.list_marker(id);
                if entering {
                    self.lit(&marker);
                    if let NodeValue::TaskItem(symbol) = node.value {
                        self.lit(&format!("[{}] ", symbol.unwrap_or(' ')));
                    }
                    self.begin_content = true;
                    self.prefix.push_str(&" ".repeat(width));
                } else {
                    self.prefix.truncate(self.prefix.len().saturating_sub(width));
                    self.cr();
                }
            }
            NodeValue::DescriptionList => {
                if !entering {
                    self.blankline();
                }
            }
            NodeValue::DescriptionTerm => {}
            NodeValue::DescriptionDetails => {
                if entering {
                    self.lit(": ");
                    self.prefix.push_str("  ");
                } else {
                    self.prefix.truncate(self.prefix.len().saturating_sub(2));
                    self.blankline();
                }
            }
            NodeValue::CodeBlock(ncb) => {
                if entering {
                    self.code_block(id, &ncb.info, &ncb.literal);
                }
            }
            NodeValue::HtmlBlock(html) => {
                if entering {
                    self.blankline();
                    self.lit(&html.literal);
                    self.blankline();
                }
            }
            NodeValue::Paragraph => {
                if !entering && self.is_tight_term(id) {
                    self.cr();
                } else if !entering {
                    self.blankline();
                }
            }
            NodeValue::Heading(heading) => {
                if entering {
                    self.lit(&"#".repeat(usize::from(heading.level)));
                    self.lit(" ");
                    self.begin_content = true;
                    self.no_linebreaks = true;
                } else {
                    self.no_linebreaks = false;
                    self.blankline();
                }
            }
            NodeValue::Subtext => {
                if entering {
                    self.lit("-# ");
                    self.begin_content = true;
                    self.no_linebreaks = true;
                } else {
                    self.no_linebreaks = false;
                    self.blankline();
                }
            }
            NodeValue::ThematicBreak => {
                if entering {
                    self.blankline();
                    self.lit("-----");
                    self.blankline();
                }
            }
            NodeValue::FootnoteDefinition(def) => {
                if entering {
                    self.blankline();
                    self.lit(&format!("[^{}]:", def.name));
                    self.cr();
                    self.prefix.push_str("    ");
                } else {
                    self.prefix.truncate(self.prefix.len().saturating_sub(4));
                    self.blankline();
                }
            }
            NodeValue::Table(_) => {
                if entering {
                    self.blankline();
                    self.in_table = true;
                } else {
                    self.in_table = false;
                    self.blankline();
                }
            }
            NodeValue::TableRow(header) => {
                if entering {
                    self.cr();
                    self.lit("|");
                } else if *header {
                    let alignments = node
                        .parent
                        .and_then(|t| match &ast[t].value {
                            NodeValue::Table(table) => Some(table.alignments.as_slice()),
                            _ => None,
                        })
                        .unwrap_or_default();
                    self.cr();
                    self.lit("|");
                    for alignment in alignments {
                        self.lit(match alignment {
                            TableAlignment::Left => " :-- |",
                            TableAlignment::Center => " :-: |",
                            TableAlignment::Right => " --: |",
                            TableAlignment::None => " --- |",
                        });
                    }
                    self.cr();
                }
            }
            NodeValue::TableCell => {
                if entering {
                    self.lit(" ");
                } else {
                    self.lit(" |");
                }
            }
            NodeValue::Text(text) => {
                if entering {
                    let wrap = allow_wrap && !self.in_link(id);
                    self.output(text, wrap, Escaping::Normal);
                }
            }
            NodeValue::SoftBreak => {
                if entering {
                    let render = &self.options.render;
                    if render.hardbreaks {
                        self.lit("\\");
                        self.cr();
                    } else if !self.no_linebreaks && render.width == 0 {
                        self.cr();
                    } else {
                        let wrap = allow_wrap && !self.in_link(id);
                        self.output(" ", wrap, Escaping::Literal);
                    }
                }
            }
            NodeValue::LineBreak => {
                if entering {
                    self.lit("\\");
                    self.cr();
                }
            }
            NodeValue::Code(code) => {
                if entering {
                    let ticks = "`".repeat(shortest_unused_backtick_run(&code.literal));
                    let literal = code.literal.as_str();
                    let pad = literal.is_empty()
                        || literal.starts_with(['`', ' '])
                        || literal.ends_with(['`', ' ']);
                    self.lit(&ticks);
                    if pad {
                        self.lit(" ");
                    }
                    self.output(literal, false, Escaping::Literal);
                    if pad {
                        self.lit(" ");
                    }
                    self.lit(&ticks);
                }
            }
            NodeValue::HtmlInline(literal) | NodeValue::EscapedTag(literal) => {
                if entering {
                    self.lit(literal);
                }
            }
            NodeValue::Emph => {
                let only_child_of_emph = node.prev.is_none()
                    && node.next.is_none()
                    && node
                        .parent
                        .is_some_and(|p| matches!(ast[p].value, NodeValue::Emph));
                self.lit(if only_child_of_emph { "_" } else { "*" });
            }
            NodeValue::Strong => self.lit("**"),
            NodeValue::Strikethrough => self.lit("~~"),
            NodeValue::Highlight => self.lit("=="),
            NodeValue::Superscript => self.lit("^"),
            NodeValue::Subscript => self.lit("~"),
            NodeValue::Underline => self.lit("__"),
            NodeValue::SpoileredText => self.lit("||"),
            NodeValue::Link(link) => {
                if is_autolink(ast, id, &link.url, &link.title) {
                    if entering {
                        let url = rewrite_url(self.options, &link.url, false)?;
                        self.lit("<");
                        self.lit(url.strip_prefix("mailto:").unwrap_or(&url));
                        self.lit(">");
                    }
                    return Ok(false);
                }
                if entering {
                    self.lit("[");
                } else {
                    self.link_destination(&link.url, &link.title, false)?;
                }
            }
            NodeValue::Image(link) => {
                if entering {
                    self.lit("![");
                } else {
                    self.link_destination(&link.url, &link.title, true)?;
                }
            }
            NodeValue::WikiLink(link) => {
                let url = rewrite_url(self.options, &link.url, false)?;
                let title_first =
                    self.options.extension.wikilinks() == Some(WikiLinksMode::TitleFirst);
                match (entering, title_first) {
                    (true, true) => self.lit("[["),
                    (true, false) => {
                        self.lit("[[");
                        self.lit(&url);
                        self.lit("|");
                    }
                    (false, true) => {
                        self.lit("|");
                        self.lit(&url);
                        self.lit("]]");
                    }
                    (false, false) => self.lit("]]"),
                }
            }
            NodeValue::FootnoteReference(reference) => {
                if entering {
                    self.lit(&format!("[^{}]", reference.name));
                }
            }
            NodeValue::Math(math) => {
                if entering {
                    let (open, close) = match (math.dollar_math, math.display_math) {
                        (true, true) => ("$$", "$$"),
                        (true, false) => ("$", "$"),
                        (false, _) => ("$`", "`$"),
                    };
                    self.lit(open);
                    self.lit(&math.literal);
                    self.lit(close);
                }
            }
        }
        Ok(true)
    }

    fn link_destination(&mut self, url: &str, title: &str, image: bool) -> Result<()> {
        let url = rewrite_url(self.options, url, image)?;
        self.lit("](");
        self.output(&url, false, Escaping::Url);
        if !title.is_empty() {
            self.lit(" \"");
            self.output(title, false, Escaping::Title);
            self.lit("\"");
        }
        self.lit(")");
        Ok(())
    }

    fn code_block(&mut self, id: NodeId, info: &str, literal: &str) {
        let node = &self.ast[id];
        let first_in_list_item = node.prev.is_none()
            && node.parent.is_some_and(|p| {
                matches!(self.ast[p].value, NodeValue::Item(_) | NodeValue::TaskItem(_))
            });
        if !first_in_list_item {
            self.blankline();
        }

        let bytes = literal.as_bytes();
        let indentable = info.is_empty()
            && !self.options.render.prefer_fenced
            && bytes.len() > 2
            && !bytes[0].is_ascii_whitespace()
            && !(bytes[bytes.len() - 1].is_ascii_whitespace()
                && bytes[bytes.len() - 2].is_ascii_whitespace())
            && !first_in_list_item;
        if indentable {
            self.lit("    ");
            self.prefix.push_str("    ");
            self.lit(literal);
            self.prefix.truncate(self.prefix.len().saturating_sub(4));
        } else {
            let fence_char = if info.contains('`') { '~' } else { '`' };
            let fence = fence_char
                .to_string()
                .repeat((longest_run(literal, fence_char) + 1).max(3));
            self.lit(&fence);
            self.lit(info);
            self.cr();
            self.lit(literal);
            self.cr();
            self.lit(&fence);
        }
        self.blankline();
    }
}

/// A link written as `<url>`: no title and text equal to its URL.
fn is_autolink(ast: &Ast, id: NodeId, url: &str, title: &str) -> bool {
    if url.is_empty() || !title.is_empty() || !has_scheme(url) {
        return false;
    }
    let node = &ast[id];
    let Some(child) = node.first_child else {
        return false;
    };
    if node.last_child != Some(child) {
        return false;
    }
    match &ast[child].value {
        NodeValue::Text(text) => text == url || url.strip_prefix("mailto:") == Some(text.as_str()),
        _ => false,
    }
}

fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once(':') else {
        return false;
    };
    (2..=32).contains(&scheme.len())
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

fn longest_run(text: &str, c: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for ch in text.chars() {
        if ch == c {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn shortest_unused_backtick_run(code: &str) -> usize {
    let mut used = std::collections::HashSet::new();
    let mut current = 0;
    for c in code.chars().chain(std::iter::once('\0')) {
        if c == '`' {
            current += 1;
        } else if current > 0 {
            used.insert(current);
            current = 0;
        }
    }
    (1..).find(|n| !used.contains(n)).unwrap_or(1)
}
