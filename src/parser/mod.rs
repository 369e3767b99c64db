//! Markdown parsing.
//!
//! Parsing runs in two phases. The block phase consumes the input line by
//! line, keeping a chain of open container blocks and deciding for every
//! line which of them it continues, which new blocks it starts, and where
//! its remaining text goes. Once every block is closed, the inline phase
//! parses the accumulated text of paragraphs, headings and table cells, and
//! a final pass resolves footnotes, task list items and extended autolinks.

pub mod autolink;
pub mod entity;
pub(crate) mod inlines;
pub mod references;
pub mod scanners;
pub mod table;

use crate::ast::{
    Ast, LineColumn, ListDelimType, ListType, NodeAlert, NodeCodeBlock, NodeDescriptionItem,
    NodeFootnoteDefinition, NodeHeading, NodeHtmlBlock, NodeId, NodeLink, NodeList,
    NodeMultilineBlockQuote, NodeTable, NodeValue, Sourcepos,
};
use crate::error::Result;
use crate::options::Options;
use crate::scanner::{self, TAB_STOP, is_blank_byte, is_line_end, is_space_or_tab};

use self::entity::unescape;
use self::inlines::{InlineFootnotes, LinePositions, Subject};
use self::references::RefMap;

/// Indentation, in columns, that turns a line into indented code.
const CODE_INDENT: usize = 4;

/// Parse a Markdown document into a tree.
///
/// # Examples
///
/// ```
/// use marksmith::{Options, parse_document};
/// use marksmith::ast::NodeValue;
///
/// let ast = parse_document("# Title\n", &Options::default()).unwrap();
/// let root = ast.root().unwrap();
/// let heading = ast.children(root).next().unwrap();
/// assert!(matches!(ast[heading].value, NodeValue::Heading(_)));
/// ```
pub fn parse_document(text: &str, options: &Options) -> Result<Ast> {
    tracing::debug!(bytes = text.len(), "parsing document");
    let lines = scanner::split_lines(text);
    let mut parser = Parser::new(options);
    let mut rest = lines.as_slice();
    if let Some(delimiter) = options.extension.front_matter_delimiter.as_deref()
        && let Some(consumed) = parser.front_matter(&lines, delimiter)
    {
        rest = &lines[consumed..];
    }
    for line in rest {
        parser.process_line(line);
    }
    parser.finish()
}

/// Parse raw bytes, replacing invalid UTF-8 with U+FFFD.
pub fn parse_document_bytes(bytes: &[u8], options: &Options) -> Result<Ast> {
    parse_document(&scanner::decode(bytes), options)
}

struct Parser<'o> {
    options: &'o Options,
    ast: Ast,
    root: NodeId,
    current: NodeId,
    refmap: RefMap,
    footnotes: InlineFootnotes,
    line_number: usize,
    offset: usize,
    column: usize,
    first_nonspace: usize,
    first_nonspace_column: usize,
    indent: usize,
    blank: bool,
    partially_consumed_tab: bool,
    curline_len: usize,
    last_line_length: usize,
    at_eof: bool,
    nesting_limit_hit: bool,
}

impl<'o> Parser<'o> {
    fn new(options: &'o Options) -> Self {
        let mut ast = Ast::new();
        let root = ast.alloc(NodeValue::Document, Sourcepos::new(1, 1, 0, 0));
        Parser {
            options,
            ast,
            root,
            current: root,
            refmap: RefMap::default(),
            footnotes: InlineFootnotes::default(),
            line_number: 0,
            offset: 0,
            column: 0,
            first_nonspace: 0,
            first_nonspace_column: 0,
            indent: 0,
            blank: false,
            partially_consumed_tab: false,
            curline_len: 0,
            last_line_length: 0,
            at_eof: false,
            nesting_limit_hit: false,
        }
    }

    /// Consume a front matter block opened on the first line. Returns the
    /// number of lines it spans.
    fn front_matter(&mut self, lines: &[String], delimiter: &str) -> Option<usize> {
        let is_delimiter = |line: &String| line.trim_end() == delimiter;
        if !lines.first().is_some_and(is_delimiter) {
            return None;
        }
        let close = lines.iter().skip(1).position(is_delimiter)? + 1;
        let raw: String = lines[..=close].concat();
        let last_len = lines[close].trim_end_matches('\n').len();
        let node = self.ast.alloc(
            NodeValue::FrontMatter(raw),
            Sourcepos::new(1, 1, close + 1, last_len),
        );
        self.ast[node].open = false;
        self.ast.append(self.root, node);
        self.line_number = close + 1;
        self.last_line_length = last_len;
        tracing::trace!(lines = close + 1, "front matter");
        Some(close + 1)
    }

    fn process_line(&mut self, line: &str) {
        let bytes = line.as_bytes();
        self.offset = 0;
        self.column = 0;
        self.first_nonspace = 0;
        self.first_nonspace_column = 0;
        self.indent = 0;
        self.blank = false;
        self.partially_consumed_tab = false;
        self.line_number += 1;
        self.curline_len = line.trim_end_matches(['\n', '\r']).len();

        if let Some((mut container, all_matched)) = self.check_open_blocks(bytes) {
            let mut last_matched = container;
            self.open_new_blocks(&mut container, &mut last_matched, all_matched, bytes);
            self.add_text_to_container(container, last_matched, line);
        }
        self.last_line_length = self.curline_len;
    }

    fn finish(mut self) -> Result<Ast> {
        self.at_eof = true;
        while self.current != self.root {
            self.current = self.finalize(self.current);
        }
        self.finalize(self.root);

        self.process_inlines()?;
        let root = self.root;
        for def in std::mem::take(&mut self.footnotes.defs) {
            self.ast.append(root, def);
        }
        if self.options.extension.footnotes {
            references::process_footnotes(
                &mut self.ast,
                root,
                self.options.parse.leave_footnote_definitions,
            );
        }
        self.postprocess_text_nodes();
        tracing::debug!(
            nodes = self.ast.len(),
            references = self.refmap.len(),
            "parsed document"
        );
        Ok(self.ast.compact(root))
    }

    fn find_first_nonspace(&mut self, line: &[u8]) {
        self.first_nonspace = self.offset;
        self.first_nonspace_column = self.column;
        let mut chars_to_tab = TAB_STOP - (self.column % TAB_STOP);
        while let Some(&c) = line.get(self.first_nonspace) {
            match c {
                b' ' => {
                    self.first_nonspace += 1;
                    self.first_nonspace_column += 1;
                    chars_to_tab -= 1;
                    if chars_to_tab == 0 {
                        chars_to_tab = TAB_STOP;
                    }
                }
                b'\t' => {
                    self.first_nonspace += 1;
                    self.first_nonspace_column += chars_to_tab;
                    chars_to_tab = TAB_STOP;
                }
                _ => break,
            }
        }
        self.indent = self.first_nonspace_column - self.column;
        self.blank = line.get(self.first_nonspace).is_none_or(|&b| is_line_end(b));
    }

    /// Move forward `count` bytes, or `count` columns when `columns` is set,
    /// in which case a tab may be consumed only partially.
    fn advance_offset(&mut self, line: &[u8], mut count: usize, columns: bool) {
        while count > 0 {
            match line.get(self.offset) {
                None => break,
                Some(b'\t') => {
                    let chars_to_tab = TAB_STOP - (self.column % TAB_STOP);
                    if columns {
                        self.partially_consumed_tab = chars_to_tab > count;
                        let advance = count.min(chars_to_tab);
                        self.column += advance;
                        if !self.partially_consumed_tab {
                            self.offset += 1;
                        }
                        count -= advance;
                    } else {
                        self.partially_consumed_tab = false;
                        self.column += chars_to_tab;
                        self.offset += 1;
                        count -= 1;
                    }
                }
                Some(_) => {
                    self.partially_consumed_tab = false;
                    self.offset += 1;
                    self.column += 1;
                    count -= 1;
                }
            }
        }
    }

    fn advance_to_line_end(&mut self, line: &[u8]) {
        let end = line.iter().position(|&b| is_line_end(b)).unwrap_or(line.len());
        let count = end.saturating_sub(self.offset);
        self.advance_offset(line, count, false);
    }

    fn is_not_greentext(&self, line: &[u8]) -> bool {
        !self.options.extension.greentext
            || line
                .get(self.first_nonspace + 1)
                .is_none_or(|&b| is_space_or_tab(b) || is_line_end(b))
    }

    /// Walk the chain of open blocks, consuming each one's continuation
    /// marker. Returns the deepest block the line continues, or `None` when
    /// the line closed a fenced block and has nothing left to contribute.
    fn check_open_blocks(&mut self, line: &[u8]) -> Option<(NodeId, bool)> {
        let mut container = self.root;
        let mut all_matched = false;
        loop {
            let Some(last) = self.ast[container].last_child else {
                all_matched = true;
                break;
            };
            if !self.ast[last].open {
                all_matched = true;
                break;
            }
            container = last;
            self.find_first_nonspace(line);

            let value = self.ast[container].value.clone();
            let matched = match value {
                NodeValue::BlockQuote => self.parse_block_quote_prefix(line),
                NodeValue::Alert(alert) if !alert.multiline => self.parse_block_quote_prefix(line),
                NodeValue::Alert(NodeAlert {
                    fence_length,
                    fence_offset,
                    ..
                })
                | NodeValue::MultilineBlockQuote(NodeMultilineBlockQuote {
                    fence_length,
                    fence_offset,
                }) => {
                    if self.closes_multiline_block_quote(line, fence_length) {
                        self.close_through(container);
                        return None;
                    }
                    self.skip_fence_offset(line, fence_offset);
                    true
                }
                NodeValue::Item(nl) => {
                    self.parse_node_item_prefix(line, container, nl.marker_offset + nl.padding)
                }
                NodeValue::DescriptionItem(di) => {
                    self.parse_node_item_prefix(line, container, di.marker_offset + di.padding)
                }
                NodeValue::FootnoteDefinition(_) => {
                    if self.indent >= CODE_INDENT {
                        self.advance_offset(line, CODE_INDENT, true);
                        true
                    } else {
                        self.blank
                    }
                }
                NodeValue::CodeBlock(ncb) if ncb.fenced => {
                    let closing = (self.indent <= 3
                        && line.get(self.first_nonspace) == Some(&ncb.fence_char))
                    .then(|| scanners::close_code_fence(&line[self.first_nonspace..]))
                    .flatten();
                    if closing.is_some_and(|len| len >= ncb.fence_length) {
                        self.advance_to_line_end(line);
                        self.current = self.finalize(container);
                        return None;
                    }
                    self.skip_fence_offset(line, ncb.fence_offset);
                    true
                }
                NodeValue::CodeBlock(_) => {
                    if self.indent >= CODE_INDENT {
                        self.advance_offset(line, CODE_INDENT, true);
                        true
                    } else if self.blank {
                        let count = self.first_nonspace - self.offset;
                        self.advance_offset(line, count, false);
                        true
                    } else {
                        false
                    }
                }
                NodeValue::HtmlBlock(ref html) => !(html.block_type >= 6 && self.blank),
                NodeValue::Heading(_) | NodeValue::Subtext => false,
                NodeValue::Paragraph | NodeValue::Table(_) => !self.blank,
                _ => true,
            };
            if !matched {
                container = self.ast[container].parent.unwrap_or(self.root);
                break;
            }
        }
        Some((container, all_matched))
    }

    fn parse_block_quote_prefix(&mut self, line: &[u8]) -> bool {
        let indent = self.indent;
        if indent <= 3 && line.get(self.first_nonspace) == Some(&b'>') && self.is_not_greentext(line) {
            self.advance_offset(line, indent + 1, true);
            if line.get(self.offset).is_some_and(|&b| is_space_or_tab(b)) {
                self.advance_offset(line, 1, true);
            }
            true
        } else {
            false
        }
    }

    fn parse_node_item_prefix(&mut self, line: &[u8], container: NodeId, needed: usize) -> bool {
        if self.indent >= needed {
            self.advance_offset(line, needed, true);
            true
        } else if self.blank && self.ast[container].first_child.is_some() {
            let count = self.first_nonspace - self.offset;
            self.advance_offset(line, count, false);
            true
        } else {
            false
        }
    }

    fn closes_multiline_block_quote(&self, line: &[u8], fence_length: usize) -> bool {
        self.indent <= 3
            && scanners::multiline_block_quote_fence(&line[self.first_nonspace..])
                .is_some_and(|len| len >= fence_length)
    }

    fn skip_fence_offset(&mut self, line: &[u8], fence_offset: usize) {
        let mut i = fence_offset;
        while i > 0 && line.get(self.offset) == Some(&b' ') {
            self.advance_offset(line, 1, true);
            i -= 1;
        }
    }

    /// Close every open block from the deepest one up to and including
    /// `container`.
    fn close_through(&mut self, container: NodeId) {
        while self.current != container && self.current != self.root {
            self.current = self.finalize(self.current);
        }
        self.current = self.finalize(container);
    }

    fn open_new_blocks(
        &mut self,
        container: &mut NodeId,
        last_matched: &mut NodeId,
        all_matched: bool,
        line: &[u8],
    ) {
        let options = self.options;
        let ext = &options.extension;
        let mut maybe_lazy = matches!(self.ast[self.current].value, NodeValue::Paragraph);
        let mut depth = self.ast.ancestors(*container).count();

        while !matches!(
            self.ast[*container].value,
            NodeValue::CodeBlock(_) | NodeValue::HtmlBlock(_)
        ) {
            self.find_first_nonspace(line);
            let indented = self.indent >= CODE_INDENT;
            let fns = self.first_nonspace;
            let rest = &line[fns..];
            let is_paragraph = matches!(self.ast[*container].value, NodeValue::Paragraph);
            let can_nest = depth < options.parse.max_nesting_depth;
            if !can_nest && !self.nesting_limit_hit {
                self.nesting_limit_hit = true;
                tracing::debug!(
                    line = self.line_number,
                    limit = options.parse.max_nesting_depth,
                    "nesting limit reached, deeper containers read as text"
                );
            }

            if !indented
                && can_nest
                && ext.alerts
                && rest.first() == Some(&b'>')
                && let Some(alert) = scanners::alert_start(rest, ext.multiline_block_quotes)
            {
                let fence_offset = self.indent;
                self.advance_to_line_end(line);
                let value = NodeValue::Alert(NodeAlert {
                    alert_type: alert.alert_type,
                    title: alert.title,
                    multiline: alert.fence_length >= 3,
                    fence_length: alert.fence_length,
                    fence_offset,
                });
                *container = self.add_child(*container, value, fns + 1);
                depth += 1;
            } else if !indented
                && can_nest
                && ext.multiline_block_quotes
                && let Some(fence_length) = scanners::multiline_block_quote_fence(rest)
            {
                let fence_offset = self.indent;
                self.advance_to_line_end(line);
                let value = NodeValue::MultilineBlockQuote(NodeMultilineBlockQuote {
                    fence_length,
                    fence_offset,
                });
                *container = self.add_child(*container, value, fns + 1);
                depth += 1;
            } else if !indented
                && can_nest
                && rest.first() == Some(&b'>')
                && self.is_not_greentext(line)
            {
                let count = fns + 1 - self.offset;
                self.advance_offset(line, count, false);
                if line.get(self.offset).is_some_and(|&b| is_space_or_tab(b)) {
                    self.advance_offset(line, 1, true);
                }
                *container = self.add_child(*container, NodeValue::BlockQuote, fns + 1);
                depth += 1;
            } else if !indented && let Some((level, len)) = scanners::atx_heading_start(rest) {
                let count = fns + len - self.offset;
                self.advance_offset(line, count, false);
                let value = NodeValue::Heading(NodeHeading {
                    level,
                    setext: false,
                });
                *container = self.add_child(*container, value, fns + 1);
            } else if !indented
                && ext.subtext
                && let Some(len) = scanners::subtext_start(rest)
            {
                let count = fns + len - self.offset;
                self.advance_offset(line, count, false);
                *container = self.add_child(*container, NodeValue::Subtext, fns + 1);
            } else if !indented && let Some(len) = scanners::open_code_fence(rest) {
                let value = NodeValue::CodeBlock(NodeCodeBlock {
                    fenced: true,
                    fence_char: rest[0],
                    fence_length: len,
                    fence_offset: self.indent,
                    info: String::new(),
                    literal: String::new(),
                });
                *container = self.add_child(*container, value, fns + 1);
                let count = fns + len - self.offset;
                self.advance_offset(line, count, false);
            } else if !indented
                && let Some(block_type) = scanners::html_block_start(rest).or_else(|| {
                    (scanners::html_block_start_7(rest) && !is_paragraph && !(!all_matched && maybe_lazy))
                        .then_some(7)
                })
            {
                let value = NodeValue::HtmlBlock(NodeHtmlBlock {
                    block_type,
                    literal: String::new(),
                });
                *container = self.add_child(*container, value, fns + 1);
            } else if !indented
                && is_paragraph
                && !options.parse.ignore_setext
                && let Some(level) = scanners::setext_heading_line(rest)
            {
                if self.resolve_reference_definitions(*container) {
                    self.ast[*container].value = NodeValue::Heading(NodeHeading { level, setext: true });
                    self.advance_to_line_end(line);
                }
            } else if !indented
                && !(is_paragraph && !all_matched)
                && scanners::thematic_break(rest)
            {
                *container = self.add_child(*container, NodeValue::ThematicBreak, fns + 1);
                self.advance_to_line_end(line);
            } else if !indented
                && can_nest
                && ext.footnotes
                && let Some((len, name)) = scanners::footnote_definition(rest)
            {
                let value = NodeValue::FootnoteDefinition(NodeFootnoteDefinition {
                    name: name.to_string(),
                    total_references: 0,
                });
                let count = fns + len - self.offset;
                self.advance_offset(line, count, false);
                *container = self.add_child(*container, value, fns + 1);
                depth += 1;
            } else if !indented
                && can_nest
                && ext.description_lists
                && let Some(len) = scanners::description_item_start(rest)
                && let Some(details) = self.open_description_details(*container)
            {
                if is_paragraph && *last_matched == *container {
                    *last_matched = details;
                    self.current = details;
                }
                let count = fns + len - self.offset;
                self.advance_offset(line, count, false);
                *container = details;
                depth += 3;
            } else if (!indented || matches!(self.ast[*container].value, NodeValue::List(_)))
                && can_nest
                && self.indent < CODE_INDENT
                && let Some((matched, mut list)) = parse_list_marker(line, fns, is_paragraph)
            {
                let count = fns + matched - self.offset;
                self.advance_offset(line, count, false);
                let (save_tab, save_offset, save_column) =
                    (self.partially_consumed_tab, self.offset, self.column);
                while self.column - save_column <= 5
                    && line.get(self.offset).is_some_and(|&b| is_space_or_tab(b))
                {
                    self.advance_offset(line, 1, true);
                }
                let spaces = self.column - save_column;
                if spaces >= 5 || spaces < 1 || line.get(self.offset).is_none_or(|&b| is_line_end(b)) {
                    list.padding = matched + 1;
                    self.offset = save_offset;
                    self.column = save_column;
                    self.partially_consumed_tab = save_tab;
                    if spaces > 0 {
                        self.advance_offset(line, 1, true);
                    }
                } else {
                    list.padding = matched + spaces;
                }
                list.marker_offset = self.indent;

                let continues = matches!(
                    self.ast[*container].value,
                    NodeValue::List(existing) if lists_match(&existing, &list)
                );
                if !continues {
                    *container = self.add_child(*container, NodeValue::List(list), fns + 1);
                    depth += 1;
                }
                *container = self.add_child(*container, NodeValue::Item(list), fns + 1);
                depth += 1;
            } else if indented && !maybe_lazy && !self.blank {
                self.advance_offset(line, CODE_INDENT, true);
                let value = NodeValue::CodeBlock(NodeCodeBlock {
                    fenced: false,
                    ..NodeCodeBlock::default()
                });
                *container = self.add_child(*container, value, self.offset + 1);
            } else if !indented
                && ext.table
                && is_paragraph
                && let Some(table) = self.open_table(*container, line)
            {
                if *last_matched == *container {
                    *last_matched = table;
                }
                *container = table;
            } else if !indented
                && ext.table
                && !self.blank
                && matches!(self.ast[*container].value, NodeValue::Table(_))
            {
                let row_line = self.line_number;
                let cells = table::parse_row(line, fns);
                let extent = (fns, self.curline_len);
                self.append_row(*container, cells, row_line, 0, extent, false);
                self.advance_to_line_end(line);
            } else {
                break;
            }

            if self.ast[*container].value.accepts_lines() {
                break;
            }
            maybe_lazy = false;
        }
    }

    /// Turn the paragraph before a `: details` line into a description term.
    /// Returns the new details block.
    fn open_description_details(&mut self, container: NodeId) -> Option<NodeId> {
        let (container, last_child, tight) = match self.ast[container].last_child {
            Some(last_child) => (container, last_child, false),
            // Details directly below the term, with no blank line between.
            None if matches!(self.ast[container].value, NodeValue::Paragraph) => {
                (self.ast[container].parent?, container, true)
            }
            None => return None,
        };
        let sp = Sourcepos::new(self.line_number, self.first_nonspace + 1, 0, 0);
        match self.ast[last_child].value {
            NodeValue::Paragraph => {
                if self.ast[last_child].open {
                    if !self.resolve_reference_definitions(last_child) {
                        return None;
                    }
                    self.current = self.finalize(last_child);
                }
                let term_sp = self.ast[last_child].sourcepos;
                self.ast.detach(last_child);
                let list = match self.ast[container].last_child {
                    Some(lc) if matches!(self.ast[lc].value, NodeValue::DescriptionList) => {
                        self.ast[lc].open = true;
                        lc
                    }
                    _ => self.add_child(container, NodeValue::DescriptionList, term_sp.start.column),
                };
                let item = self.alloc_child(
                    list,
                    NodeValue::DescriptionItem(NodeDescriptionItem {
                        marker_offset: self.indent,
                        padding: 2,
                        tight,
                    }),
                    term_sp,
                );
                let term = self.alloc_child(item, NodeValue::DescriptionTerm, term_sp);
                self.ast[term].open = false;
                self.ast.append(term, last_child);
                Some(self.alloc_child(item, NodeValue::DescriptionDetails, sp))
            }
            NodeValue::DescriptionItem(_) => {
                let parent = self.ast[last_child].parent?;
                let tight = self.ast[last_child]
                    .last_child
                    .is_some_and(|lc| !self.ast[lc].last_line_blank);
                let item = self.alloc_child(
                    parent,
                    NodeValue::DescriptionItem(NodeDescriptionItem {
                        marker_offset: self.indent,
                        padding: 2,
                        tight,
                    }),
                    sp,
                );
                Some(self.alloc_child(item, NodeValue::DescriptionDetails, sp))
            }
            _ => None,
        }
    }

    fn alloc_child(&mut self, parent: NodeId, value: NodeValue, sourcepos: Sourcepos) -> NodeId {
        let id = self.ast.alloc(value, sourcepos);
        self.ast.append(parent, id);
        id
    }

    /// Turn the last line of a paragraph into a table header when `line` is a
    /// matching delimiter row.
    fn open_table(&mut self, paragraph: NodeId, line: &[u8]) -> Option<NodeId> {
        let alignments = table::parse_delimiter_row(line, self.first_nonspace)?;
        let node = &self.ast[paragraph];
        let body = node.content.strip_suffix('\n').unwrap_or(&node.content);
        let header_start = body.rfind('\n').map_or(0, |i| i + 1);
        let header_cells = table::parse_row(node.content[header_start..].as_bytes(), 0);
        if header_cells.len() != alignments.len() {
            return None;
        }
        let header_col = node.line_offsets.last().copied().unwrap_or(0);
        let header_len = node.content[header_start..].trim_end().len();
        let parent = node.parent?;
        let header_line = self.line_number - 1;

        let node = &mut self.ast[paragraph];
        node.content.truncate(header_start);
        node.line_offsets.pop();
        self.current = self.finalize(paragraph);
        if self.ast[paragraph].parent.is_some() {
            let node = &mut self.ast[paragraph];
            let last = node.content.trim_end_matches('\n');
            let last_len = last.len() - last.rfind('\n').map_or(0, |i| i + 1);
            let col = node.line_offsets.last().copied().unwrap_or(0);
            node.sourcepos.end = LineColumn {
                line: header_line - 1,
                column: col + last_len,
            };
        }

        let num_columns = alignments.len();
        let table = self.add_child(
            parent,
            NodeValue::Table(NodeTable {
                alignments,
                num_columns,
                num_rows: 0,
                num_nonempty_cells: 0,
            }),
            header_col + 1,
        );
        self.ast[table].sourcepos.start.line = header_line;
        let extent = (header_col, header_col + header_len);
        self.append_row(table, header_cells, header_line, header_col, extent, true);
        self.advance_to_line_end(line);
        self.current = table;
        Some(table)
    }

    /// Append a row, padding or truncating it to the table's column count.
    /// `extent` is the 0-based start and exclusive end of the row text.
    fn append_row(
        &mut self,
        table: NodeId,
        cells: Vec<table::Cell>,
        line: usize,
        col: usize,
        extent: (usize, usize),
        header: bool,
    ) {
        let NodeValue::Table(ref t) = self.ast[table].value else {
            return;
        };
        let num_columns = t.num_columns;
        let row = self.ast.alloc(
            NodeValue::TableRow(header),
            Sourcepos::new(line, extent.0 + 1, line, extent.1),
        );
        self.ast[row].open = false;

        let mut nonempty = 0;
        let mut last_end = cells.last().map_or(0, |c| c.end);
        let mut cells = cells.into_iter();
        for _ in 0..num_columns {
            let cell = cells.next().unwrap_or_else(|| table::Cell {
                content: String::new(),
                start: last_end,
                end: last_end,
            });
            last_end = cell.end;
            if !cell.content.is_empty() {
                nonempty += 1;
            }
            let id = self.ast.alloc(
                NodeValue::TableCell,
                Sourcepos::new(line, col + cell.start + 1, line, col + cell.end),
            );
            let node = &mut self.ast[id];
            node.open = false;
            node.content = cell.content;
            node.line_offsets = vec![col + cell.start];
            self.ast.append(row, id);
        }
        self.ast.append(table, row);
        if let NodeValue::Table(t) = &mut self.ast[table].value {
            t.num_rows += 1;
            t.num_nonempty_cells += nonempty;
        }
    }

    fn add_text_to_container(&mut self, mut container: NodeId, last_matched: NodeId, line: &str) {
        let bytes = line.as_bytes();
        self.find_first_nonspace(bytes);

        if self.blank
            && let Some(last_child) = self.ast[container].last_child
        {
            self.ast[last_child].last_line_blank = true;
        }
        let node = &self.ast[container];
        let last_line_blank = self.blank
            && match &node.value {
                NodeValue::BlockQuote
                | NodeValue::Heading(_)
                | NodeValue::ThematicBreak
                | NodeValue::Table(_)
                | NodeValue::MultilineBlockQuote(_)
                | NodeValue::Alert(_) => false,
                NodeValue::CodeBlock(ncb) => !ncb.fenced,
                NodeValue::Item(_) => {
                    node.first_child.is_some() || node.sourcepos.start.line != self.line_number
                }
                _ => true,
            };
        self.ast[container].last_line_blank = last_line_blank;
        let mut tmp = container;
        while let Some(parent) = self.ast[tmp].parent {
            self.ast[parent].last_line_blank = false;
            tmp = parent;
        }

        let lazy = self.current != last_matched
            && container == last_matched
            && !self.blank
            && matches!(self.ast[self.current].value, NodeValue::Paragraph);
        if lazy {
            self.add_line(self.current, line);
            return;
        }

        while self.current != last_matched {
            self.current = self.finalize(self.current);
        }

        let value = &self.ast[container].value;
        let is_code = matches!(value, NodeValue::CodeBlock(_));
        let html_type = match value {
            NodeValue::HtmlBlock(html) => Some(html.block_type),
            _ => None,
        };
        let is_atx = matches!(value, NodeValue::Heading(NodeHeading { setext: false, .. }));
        let accepts_lines = value.accepts_lines();

        if is_code {
            self.add_line(container, line);
        } else if let Some(block_type) = html_type {
            self.add_line(container, line);
            if (1..=5).contains(&block_type)
                && scanners::html_block_end(block_type, &bytes[self.first_nonspace..])
            {
                container = self.finalize(container);
            }
        } else if self.blank {
            // Nothing to add.
        } else if is_atx {
            let count = self.first_nonspace - self.offset;
            self.advance_offset(bytes, count, false);
            self.add_line(container, chop_trailing_hashes(line));
        } else if accepts_lines {
            let count = self.first_nonspace - self.offset;
            self.advance_offset(bytes, count, false);
            self.add_line(container, line);
        } else {
            container = self.add_child(container, NodeValue::Paragraph, self.first_nonspace + 1);
            let count = self.first_nonspace - self.offset;
            self.advance_offset(bytes, count, false);
            self.add_line(container, line);
        }
        self.current = container;
    }

    fn add_line(&mut self, node: NodeId, line: &str) {
        let node = &mut self.ast[node];
        if self.partially_consumed_tab {
            self.offset += 1;
            let chars_to_tab = TAB_STOP - (self.column % TAB_STOP);
            node.content.extend(std::iter::repeat_n(' ', chars_to_tab));
        }
        node.content.push_str(line.get(self.offset..).unwrap_or(""));
        node.line_offsets.push(self.offset);
    }

    /// Create a block under `parent`, closing blocks that cannot hold it.
    fn add_child(&mut self, mut parent: NodeId, value: NodeValue, start_column: usize) -> NodeId {
        while !self.ast[parent].value.can_contain(&value) {
            parent = self.finalize(parent);
        }
        let child = self
            .ast
            .alloc(value, Sourcepos::new(self.line_number, start_column, 0, 0));
        self.ast.append(parent, child);
        tracing::trace!(
            line = self.line_number,
            node = child.index(),
            parent = parent.index(),
            "opened block"
        );
        child
    }

    /// Close a block and return its parent.
    fn finalize(&mut self, node: NodeId) -> NodeId {
        let parent = self.ast[node].parent.unwrap_or(node);
        let closes_on_current_line = match &self.ast[node].value {
            NodeValue::Document | NodeValue::MultilineBlockQuote(_) => true,
            NodeValue::CodeBlock(ncb) => ncb.fenced,
            NodeValue::Alert(alert) => alert.multiline,
            _ => false,
        };
        let end = if self.at_eof {
            LineColumn {
                line: self.line_number,
                column: self.last_line_length,
            }
        } else if closes_on_current_line {
            LineColumn {
                line: self.line_number,
                column: self.curline_len,
            }
        } else {
            LineColumn {
                line: self.line_number.saturating_sub(1),
                column: self.last_line_length,
            }
        };
        let n = &mut self.ast[node];
        n.open = false;
        n.sourcepos.end = end;

        match n.value {
            NodeValue::Paragraph => {
                if !self.resolve_reference_definitions(node) {
                    self.ast.detach(node);
                }
            }
            NodeValue::CodeBlock(ref mut ncb) => {
                let content = std::mem::take(&mut n.content);
                if ncb.fenced {
                    let (first, body) = content.split_once('\n').unwrap_or((&content, ""));
                    let info = unescape(first.trim());
                    ncb.info = match (&self.options.parse.default_info_string, info.is_empty()) {
                        (Some(default), true) => default.clone(),
                        _ => info,
                    };
                    ncb.literal = body.to_string();
                } else {
                    ncb.literal = remove_trailing_blank_lines(&content);
                    ncb.literal.push('\n');
                }
            }
            NodeValue::HtmlBlock(ref mut html) => {
                html.literal = std::mem::take(&mut n.content);
            }
            NodeValue::List(_) => self.finalize_list(node),
            _ => {}
        }
        parent
    }

    fn finalize_list(&mut self, list: NodeId) {
        let mut tight = true;
        let mut item = self.ast[list].first_child;
        'items: while let Some(i) = item {
            if self.ast[i].last_line_blank && self.ast[i].next.is_some() {
                tight = false;
                break;
            }
            let mut sub = self.ast[i].first_child;
            while let Some(s) = sub {
                if (self.ast[s].next.is_some() || self.ast[i].next.is_some())
                    && self.ends_with_blank_line(s)
                {
                    tight = false;
                    break 'items;
                }
                sub = self.ast[s].next;
            }
            item = self.ast[i].next;
        }

        let items: Vec<NodeId> = self.ast.children(list).collect();
        if let NodeValue::List(nl) = &mut self.ast[list].value {
            nl.tight = tight;
        }
        for i in items {
            if let NodeValue::Item(nl) = &mut self.ast[i].value {
                nl.tight = tight;
            }
        }
    }

    fn ends_with_blank_line(&self, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(c) = cur {
            if self.ast[c].last_line_blank {
                return true;
            }
            cur = match self.ast[c].value {
                NodeValue::List(_) | NodeValue::Item(_) => self.ast[c].last_child,
                _ => None,
            };
        }
        false
    }

    /// Strip link reference definitions from the front of a paragraph.
    /// Returns whether any content remains.
    fn resolve_reference_definitions(&mut self, node: NodeId) -> bool {
        let content = std::mem::take(&mut self.ast[node].content);
        let mut consumed = 0;
        while content[consumed..].starts_with('[') {
            let Some(def) = references::parse_definition(&content[consumed..]) else {
                break;
            };
            tracing::trace!(label = def.label, "reference definition");
            self.refmap.insert(def.label, def.reference);
            consumed += def.consumed;
        }

        let n = &mut self.ast[node];
        if consumed > 0 {
            let removed_lines = content[..consumed].matches('\n').count();
            n.line_offsets.drain(..removed_lines.min(n.line_offsets.len()));
            n.sourcepos.start.line += removed_lines;
            if let Some(&col) = n.line_offsets.first() {
                n.sourcepos.start.column = col + 1;
            }
        }
        n.content = content[consumed..].to_string();
        !scanner::is_blank(n.content.as_bytes())
    }

    fn process_inlines(&mut self) -> Result<()> {
        let blocks: Vec<NodeId> = self
            .ast
            .descendants(self.root)
            .filter(|&id| self.ast[id].value.contains_inlines())
            .collect();
        for id in blocks {
            let content = std::mem::take(&mut self.ast[id].content);
            let line_offsets = std::mem::take(&mut self.ast[id].line_offsets);
            let text = content.trim_end_matches(|c: char| c.is_ascii_whitespace());
            let positions =
                LinePositions::new(self.ast[id].sourcepos.start.line, text, &line_offsets);
            let mut subject = Subject::new(
                &mut self.ast,
                self.options,
                &self.refmap,
                &mut self.footnotes,
                text,
                positions,
            );
            subject.parse(id)?;
        }
        Ok(())
    }

    /// Merge adjacent text, then detect task list items and extended
    /// autolinks.
    fn postprocess_text_nodes(&mut self) {
        let ext = &self.options.extension;
        let (tasklist, autolink) = (ext.tasklist, ext.autolink);
        let texts: Vec<NodeId> = self
            .ast
            .descendants(self.root)
            .filter(|&id| matches!(self.ast[id].value, NodeValue::Text(_)))
            .collect();
        for id in texts {
            if self.ast[id].parent.is_none() {
                continue;
            }
            while let Some(next) = self.ast[id].next {
                let NodeValue::Text(ref more) = self.ast[next].value else {
                    break;
                };
                let more = more.clone();
                let end = self.ast[next].sourcepos.end;
                if let Some(text) = self.ast[id].value.text_mut() {
                    text.push_str(&more);
                }
                self.ast[id].sourcepos.end = end;
                self.ast.detach(next);
            }
            if tasklist {
                self.process_tasklist(id);
            }
            if autolink && !self.inside_link(id) {
                self.autolink_text(id);
            }
        }
    }

    fn inside_link(&self, id: NodeId) -> bool {
        self.ast.ancestors(id).any(|a| {
            matches!(
                self.ast[a].value,
                NodeValue::Link(_) | NodeValue::Image(_) | NodeValue::WikiLink(_)
            )
        })
    }

    /// `[ ]` or `[x]` opening the first paragraph of a list item.
    fn process_tasklist(&mut self, text: NodeId) {
        let Some(para) = self.ast[text].parent else {
            return;
        };
        let Some(item) = self.ast[para].parent else {
            return;
        };
        if self.ast[para].first_child != Some(text)
            || self.ast[item].first_child != Some(para)
            || !matches!(self.ast[para].value, NodeValue::Paragraph)
            || !matches!(self.ast[item].value, NodeValue::Item(_))
        {
            return;
        }
        let NodeValue::Text(ref content) = self.ast[text].value else {
            return;
        };
        let mut chars = content.chars();
        let (Some('['), Some(mark), Some(']')) = (chars.next(), chars.next(), chars.next()) else {
            return;
        };
        let rest = chars.as_str();
        if !(rest.is_empty() || rest.starts_with([' ', '\t'])) {
            return;
        }
        let symbol = match mark {
            ' ' => None,
            'x' | 'X' => Some(mark),
            c if self.options.parse.relaxed_tasklist_matching && !c.is_whitespace() => Some(c),
            _ => return,
        };

        let remaining = rest.trim_start_matches([' ', '\t']).to_string();
        let consumed = content.len() - remaining.len();
        if remaining.is_empty() {
            self.ast.detach(text);
        } else {
            self.ast[text].value = NodeValue::Text(remaining);
            self.ast[text].sourcepos.start.column += consumed;
        }
        self.ast[item].value = NodeValue::TaskItem(symbol);
        if let Some(list) = self.ast[item].parent
            && let NodeValue::List(nl) = &mut self.ast[list].value
        {
            nl.is_task_list = true;
        }
    }

    /// Split a text node around the extended autolinks it contains.
    fn autolink_text(&mut self, id: NodeId) {
        let relaxed = self.options.parse.relaxed_autolinks;
        let mut current = id;
        loop {
            let NodeValue::Text(ref text) = self.ast[current].value else {
                return;
            };
            let Some(found) = autolink::find_autolink(text, relaxed) else {
                return;
            };
            let text = text.clone();
            let sp = self.ast[current].sourcepos;
            let at = |offset: usize| LineColumn {
                line: sp.start.line,
                column: sp.start.column + offset,
            };

            let link_sp = Sourcepos {
                start: at(found.start),
                end: at(found.end.saturating_sub(1)),
            };
            let link = self.ast.alloc(
                NodeValue::Link(NodeLink {
                    url: found.url,
                    title: String::new(),
                }),
                link_sp,
            );
            let label = self
                .ast
                .alloc(NodeValue::Text(text[found.start..found.end].to_string()), link_sp);
            self.ast.append(link, label);
            self.ast.insert_after(current, link);

            let after = &text[found.end..];
            let next = (!after.is_empty()).then(|| {
                let n = self.ast.alloc(
                    NodeValue::Text(after.to_string()),
                    Sourcepos {
                        start: at(found.end),
                        end: sp.end,
                    },
                );
                self.ast.insert_after(link, n);
                n
            });

            if found.start == 0 {
                self.ast.detach(current);
            } else {
                self.ast[current].value = NodeValue::Text(text[..found.start].to_string());
                self.ast[current].sourcepos.end = at(found.start.saturating_sub(1));
            }
            match next {
                Some(n) => current = n,
                None => return,
            }
        }
    }
}

/// A bullet or ordered list marker at `pos`. Returns the marker width and
/// the list it would start.
fn parse_list_marker(line: &[u8], pos: usize, interrupts_paragraph: bool) -> Option<(usize, NodeList)> {
    let c = *line.get(pos)?;
    let followed_by_content = |after: usize| {
        let mut i = after;
        while line.get(i).is_some_and(|&b| is_space_or_tab(b)) {
            i += 1;
        }
        line.get(i).is_some_and(|&b| !is_line_end(b))
    };

    if matches!(c, b'*' | b'-' | b'+') {
        let after = pos + 1;
        if !line.get(after).is_none_or(|&b| is_blank_byte(b)) {
            return None;
        }
        if interrupts_paragraph && !followed_by_content(after) {
            return None;
        }
        return Some((
            1,
            NodeList {
                list_type: ListType::Bullet,
                bullet_char: c,
                start: 1,
                delimiter: ListDelimType::Period,
                ..NodeList::default()
            },
        ));
    }

    if c.is_ascii_digit() {
        let mut i = pos;
        let mut start = 0usize;
        while i - pos < 9 && line.get(i).is_some_and(|b| b.is_ascii_digit()) {
            start = start * 10 + usize::from(line[i] - b'0');
            i += 1;
        }
        if interrupts_paragraph && start != 1 {
            return None;
        }
        let delimiter = match line.get(i) {
            Some(b'.') => ListDelimType::Period,
            Some(b')') => ListDelimType::Paren,
            _ => return None,
        };
        let after = i + 1;
        if !line.get(after).is_none_or(|&b| is_blank_byte(b)) {
            return None;
        }
        if interrupts_paragraph && !followed_by_content(after) {
            return None;
        }
        return Some((
            after - pos,
            NodeList {
                list_type: ListType::Ordered,
                start,
                delimiter,
                ..NodeList::default()
            },
        ));
    }
    None
}

fn lists_match(a: &NodeList, b: &NodeList) -> bool {
    a.list_type == b.list_type && a.delimiter == b.delimiter && a.bullet_char == b.bullet_char
}

/// Drop the closing sequence of an ATX heading: trailing `#`s preceded by
/// a space, or a line made only of `#`s.
fn chop_trailing_hashes(line: &str) -> &str {
    let trimmed = line.trim_end_matches(['\n', '\r']).trim_end_matches([' ', '\t']);
    let without = trimmed.trim_end_matches('#');
    if without.len() == trimmed.len() {
        return trimmed;
    }
    if without.is_empty() || without.ends_with([' ', '\t']) {
        without.trim_end_matches([' ', '\t'])
    } else {
        trimmed
    }
}

fn remove_trailing_blank_lines(content: &str) -> String {
    let Some(last) = content.rfind(|c: char| !matches!(c, ' ' | '\t' | '\n' | '\r')) else {
        return String::new();
    };
    match content[last..].find('\n') {
        Some(nl) => content[..last + nl].to_string(),
        None => content.to_string(),
    }
}
