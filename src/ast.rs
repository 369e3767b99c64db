//! Abstract syntax tree for parsed Markdown documents.
//!
//! Nodes live in a single flat store ([`Ast`]) and refer to each other by
//! [`NodeId`] index: parent, first/last child and previous/next sibling.
//! The root is always a [`NodeValue::Document`] at index 0; an empty
//! document has no nodes at all.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Index of a node inside an [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A 1-based line and column position in the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineColumn {
    pub line: usize,
    pub column: usize,
}

/// Start and end position of a node in the source text (both inclusive).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sourcepos {
    pub start: LineColumn,
    pub end: LineColumn,
}

impl Sourcepos {
    pub fn new(start_line: usize, start_column: usize, end_line: usize, end_column: usize) -> Self {
        Sourcepos {
            start: LineColumn {
                line: start_line,
                column: start_column,
            },
            end: LineColumn {
                line: end_line,
                column: end_column,
            },
        }
    }
}

impl fmt::Display for Sourcepos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

/// Column alignment in a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TableAlignment {
    #[default]
    None,
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListType {
    #[default]
    Bullet,
    Ordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ListDelimType {
    #[default]
    Period,
    Paren,
}

/// Shared metadata of lists and their items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeList {
    pub list_type: ListType,
    /// Columns of indentation before the marker.
    pub marker_offset: usize,
    /// Width of the marker plus the spaces after it.
    pub padding: usize,
    pub start: usize,
    pub delimiter: ListDelimType,
    pub bullet_char: u8,
    pub tight: bool,
    pub is_task_list: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeDescriptionItem {
    pub marker_offset: usize,
    pub padding: usize,
    pub tight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeCodeBlock {
    pub fenced: bool,
    pub fence_char: u8,
    pub fence_length: usize,
    pub fence_offset: usize,
    /// Info string after the opening fence, unescaped.
    pub info: String,
    pub literal: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeHeading {
    pub level: u8,
    pub setext: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeHtmlBlock {
    /// HTML block kind 1 to 7, as numbered by CommonMark.
    pub block_type: u8,
    pub literal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeTable {
    pub alignments: Vec<TableAlignment>,
    pub num_columns: usize,
    pub num_rows: usize,
    pub num_nonempty_cells: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeCode {
    pub num_backticks: usize,
    pub literal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeLink {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeWikiLink {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFootnoteDefinition {
    pub name: String,
    pub total_references: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeFootnoteReference {
    pub name: String,
    /// Which reference to this footnote this is, starting at 1.
    pub ref_num: u32,
    /// Ordinal of the footnote, assigned by first reference.
    pub ix: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeMath {
    pub dollar_math: bool,
    pub display_math: bool,
    pub literal: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeMultilineBlockQuote {
    pub fence_length: usize,
    pub fence_offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AlertType {
    #[default]
    Note,
    Tip,
    Important,
    Warning,
    Caution,
}

impl AlertType {
    pub fn from_name(name: &str) -> Option<AlertType> {
        match name.to_ascii_lowercase().as_str() {
            "note" => Some(AlertType::Note),
            "tip" => Some(AlertType::Tip),
            "important" => Some(AlertType::Important),
            "warning" => Some(AlertType::Warning),
            "caution" => Some(AlertType::Caution),
            _ => None,
        }
    }

    /// Title shown when the alert carries no custom one.
    pub fn default_title(self) -> &'static str {
        match self {
            AlertType::Note => "Note",
            AlertType::Tip => "Tip",
            AlertType::Important => "Important",
            AlertType::Warning => "Warning",
            AlertType::Caution => "Caution",
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            AlertType::Note => "markdown-alert-note",
            AlertType::Tip => "markdown-alert-tip",
            AlertType::Important => "markdown-alert-important",
            AlertType::Warning => "markdown-alert-warning",
            AlertType::Caution => "markdown-alert-caution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeAlert {
    pub alert_type: AlertType,
    pub title: Option<String>,
    pub multiline: bool,
    pub fence_length: usize,
    pub fence_offset: usize,
}

/// The kind of a node along with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeValue {
    Document,
    /// Raw front matter including both delimiter lines.
    FrontMatter(String),
    BlockQuote,
    MultilineBlockQuote(NodeMultilineBlockQuote),
    Alert(NodeAlert),
    List(NodeList),
    Item(NodeList),
    /// A list item starting with `[ ]` or `[x]`; holds the checked symbol.
    TaskItem(Option<char>),
    DescriptionList,
    DescriptionItem(NodeDescriptionItem),
    DescriptionTerm,
    DescriptionDetails,
    CodeBlock(NodeCodeBlock),
    HtmlBlock(NodeHtmlBlock),
    Paragraph,
    Heading(NodeHeading),
    Subtext,
    ThematicBreak,
    FootnoteDefinition(NodeFootnoteDefinition),
    Table(NodeTable),
    /// `true` for the header row.
    TableRow(bool),
    TableCell,
    Text(String),
    SoftBreak,
    LineBreak,
    Code(NodeCode),
    HtmlInline(String),
    Emph,
    Strong,
    Strikethrough,
    Highlight,
    Superscript,
    Subscript,
    Underline,
    SpoileredText,
    /// Source text kept verbatim, such as an unresolved footnote reference.
    EscapedTag(String),
    /// Wraps the character produced by a backslash escape.
    Escaped,
    Link(NodeLink),
    Image(NodeLink),
    WikiLink(NodeWikiLink),
    FootnoteReference(NodeFootnoteReference),
    Math(NodeMath),
}

impl NodeValue {
    /// Whether this node is a block-level node.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeValue::Document
                | NodeValue::FrontMatter(_)
                | NodeValue::BlockQuote
                | NodeValue::MultilineBlockQuote(_)
                | NodeValue::Alert(_)
                | NodeValue::List(_)
                | NodeValue::Item(_)
                | NodeValue::TaskItem(_)
                | NodeValue::DescriptionList
                | NodeValue::DescriptionItem(_)
                | NodeValue::DescriptionTerm
                | NodeValue::DescriptionDetails
                | NodeValue::CodeBlock(_)
                | NodeValue::HtmlBlock(_)
                | NodeValue::Paragraph
                | NodeValue::Heading(_)
                | NodeValue::Subtext
                | NodeValue::ThematicBreak
                | NodeValue::FootnoteDefinition(_)
                | NodeValue::Table(_)
                | NodeValue::TableRow(_)
                | NodeValue::TableCell
        )
    }

    /// Whether this node may hold inline children.
    pub fn contains_inlines(&self) -> bool {
        matches!(
            self,
            NodeValue::Paragraph | NodeValue::Heading(_) | NodeValue::Subtext | NodeValue::TableCell
        )
    }

    /// Whether block parsing appends raw lines to this node.
    pub(crate) fn accepts_lines(&self) -> bool {
        matches!(
            self,
            NodeValue::Paragraph
                | NodeValue::Heading(_)
                | NodeValue::Subtext
                | NodeValue::CodeBlock(_)
                | NodeValue::HtmlBlock(_)
        )
    }

    /// Whether a block of this kind may directly contain `child`.
    pub(crate) fn can_contain(&self, child: &NodeValue) -> bool {
        if matches!(child, NodeValue::Document) {
            return false;
        }
        match self {
            NodeValue::Document
            | NodeValue::BlockQuote
            | NodeValue::MultilineBlockQuote(_)
            | NodeValue::Alert(_)
            | NodeValue::FootnoteDefinition(_)
            | NodeValue::Item(_)
            | NodeValue::TaskItem(_)
            | NodeValue::DescriptionTerm
            | NodeValue::DescriptionDetails => {
                child.is_block()
                    && !matches!(
                        child,
                        NodeValue::Item(_)
                            | NodeValue::TaskItem(_)
                            | NodeValue::DescriptionItem(_)
                            | NodeValue::DescriptionTerm
                            | NodeValue::DescriptionDetails
                            | NodeValue::TableRow(_)
                            | NodeValue::TableCell
                    )
            }
            NodeValue::List(_) => matches!(child, NodeValue::Item(_) | NodeValue::TaskItem(_)),
            NodeValue::DescriptionList => matches!(child, NodeValue::DescriptionItem(_)),
            NodeValue::DescriptionItem(_) => matches!(
                child,
                NodeValue::DescriptionTerm | NodeValue::DescriptionDetails
            ),
            NodeValue::Table(_) => matches!(child, NodeValue::TableRow(_)),
            NodeValue::TableRow(_) => matches!(child, NodeValue::TableCell),
            v if v.contains_inlines() => !child.is_block(),
            NodeValue::Emph
            | NodeValue::Strong
            | NodeValue::Strikethrough
            | NodeValue::Highlight
            | NodeValue::Superscript
            | NodeValue::Subscript
            | NodeValue::Underline
            | NodeValue::SpoileredText
            | NodeValue::Escaped
            | NodeValue::Link(_)
            | NodeValue::Image(_)
            | NodeValue::WikiLink(_) => !child.is_block(),
            _ => false,
        }
    }

    /// Literal text of leaf nodes that carry one.
    pub fn text(&self) -> Option<&str> {
        match self {
            NodeValue::Text(t) | NodeValue::HtmlInline(t) | NodeValue::EscapedTag(t) => Some(t),
            NodeValue::FrontMatter(t) => Some(t),
            NodeValue::Code(c) => Some(&c.literal),
            NodeValue::CodeBlock(c) => Some(&c.literal),
            NodeValue::HtmlBlock(h) => Some(&h.literal),
            NodeValue::Math(m) => Some(&m.literal),
            _ => None,
        }
    }

    pub(crate) fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            NodeValue::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// One node in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub value: NodeValue,
    pub sourcepos: Sourcepos,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    /// Set while parsing when the block's last line was blank; list tightness
    /// is derived from it.
    #[serde(default)]
    pub last_line_blank: bool,
    #[serde(skip)]
    pub(crate) open: bool,
    /// Raw text accumulated by leaf blocks before inline parsing.
    #[serde(skip)]
    pub(crate) content: String,
    /// Source column (0-based) at which each accumulated content line starts.
    #[serde(skip)]
    pub(crate) line_offsets: Vec<usize>,
}

impl Node {
    fn new(value: NodeValue, sourcepos: Sourcepos) -> Self {
        Node {
            value,
            sourcepos,
            parent: None,
            first_child: None,
            last_child: None,
            prev: None,
            next: None,
            last_line_blank: false,
            open: true,
            content: String::new(),
            line_offsets: Vec::new(),
        }
    }
}

/// The indexed node store of one parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    /// The document node, or `None` for an empty document.
    pub fn root(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(NodeId(0))
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Allocate a detached node.
    pub fn alloc(&mut self, value: NodeValue, sourcepos: Sourcepos) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(value, sourcepos));
        id
    }

    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            ast: self,
            next: self[id].first_child,
        }
    }

    /// Pre-order walk over `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            ast: self,
            root: id,
            next: Some(id),
        }
    }

    /// Walk up from `id` (exclusive) to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self[id].parent, move |&p| self[p].parent)
    }

    /// Unlink `id` from its parent and siblings. Its own children stay attached.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let node = &self[id];
            (node.parent, node.prev, node.next)
        };
        match prev {
            Some(p) => self[p].next = next,
            None => {
                if let Some(parent) = parent {
                    self[parent].first_child = next;
                }
            }
        }
        match next {
            Some(n) => self[n].prev = prev,
            None => {
                if let Some(parent) = parent {
                    self[parent].last_child = prev;
                }
            }
        }
        let node = &mut self[id];
        node.parent = None;
        node.prev = None;
        node.next = None;
    }

    /// Make `child` the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        let last = self[parent].last_child;
        self[child].parent = Some(parent);
        self[child].prev = last;
        match last {
            Some(l) => self[l].next = Some(child),
            None => self[parent].first_child = Some(child),
        }
        self[parent].last_child = Some(child);
    }

    /// Make `child` the first child of `parent`.
    pub fn prepend(&mut self, parent: NodeId, child: NodeId) {
        match self[parent].first_child {
            Some(first) => self.insert_before(first, child),
            None => self.append(parent, child),
        }
    }

    /// Insert `new` as the sibling right after `sibling`.
    pub fn insert_after(&mut self, sibling: NodeId, new: NodeId) {
        self.detach(new);
        let parent = self[sibling].parent;
        let next = self[sibling].next;
        self[new].parent = parent;
        self[new].prev = Some(sibling);
        self[new].next = next;
        self[sibling].next = Some(new);
        match next {
            Some(n) => self[n].prev = Some(new),
            None => {
                if let Some(p) = parent {
                    self[p].last_child = Some(new);
                }
            }
        }
    }

    /// Insert `new` as the sibling right before `sibling`.
    pub fn insert_before(&mut self, sibling: NodeId, new: NodeId) {
        self.detach(new);
        let parent = self[sibling].parent;
        let prev = self[sibling].prev;
        self[new].parent = parent;
        self[new].next = Some(sibling);
        self[new].prev = prev;
        self[sibling].prev = Some(new);
        match prev {
            Some(p) => self[p].next = Some(new),
            None => {
                if let Some(p) = parent {
                    self[p].first_child = Some(new);
                }
            }
        }
    }

    /// Concatenated text of all `Text`, `Code` and `Math` descendants, with
    /// breaks rendered as spaces.
    pub fn plain_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for d in self.descendants(id) {
            match &self[d].value {
                NodeValue::Text(t) | NodeValue::EscapedTag(t) => out.push_str(t),
                NodeValue::Code(c) => out.push_str(&c.literal),
                NodeValue::Math(m) => out.push_str(&m.literal),
                NodeValue::SoftBreak | NodeValue::LineBreak => out.push(' '),
                _ => {}
            }
        }
        out
    }

    /// Rebuild the store so that it holds exactly the nodes reachable from
    /// `root`, renumbered in pre-order with the root at index 0.
    pub(crate) fn compact(self, root: NodeId) -> Ast {
        if self[root].first_child.is_none() {
            return Ast::default();
        }
        let order: Vec<NodeId> = self.descendants(root).collect();
        let mut remap = vec![usize::MAX; self.nodes.len()];
        for (new, old) in order.iter().enumerate() {
            remap[old.0] = new;
        }
        let map = |id: Option<NodeId>| id.map(|i| NodeId(remap[i.0]));
        let mut slots: Vec<Option<Node>> = self.nodes.into_iter().map(Some).collect();
        let mut nodes = Vec::with_capacity(order.len());
        for old in order {
            if let Some(mut node) = slots[old.0].take() {
                node.parent = if old == root { None } else { map(node.parent) };
                node.first_child = map(node.first_child);
                node.last_child = map(node.last_child);
                node.prev = if old == root { None } else { map(node.prev) };
                node.next = if old == root { None } else { map(node.next) };
                node.open = false;
                node.content = String::new();
                node.line_offsets = Vec::new();
                nodes.push(node);
            }
        }
        Ast { nodes }
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}

pub struct Children<'a> {
    ast: &'a Ast,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.ast[id].next;
        Some(id)
    }
}

pub struct Descendants<'a> {
    ast: &'a Ast,
    root: NodeId,
    next: Option<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        let node = &self.ast[id];
        self.next = if let Some(child) = node.first_child {
            Some(child)
        } else {
            // Climb until a node with a next sibling, stopping at the root.
            let mut cur = id;
            loop {
                if cur == self.root {
                    break None;
                }
                if let Some(n) = self.ast[cur].next {
                    break Some(n);
                }
                match self.ast[cur].parent {
                    Some(p) => cur = p,
                    None => break None,
                }
            }
        };
        Some(id)
    }
}
