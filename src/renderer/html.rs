//! HTML output.

use std::collections::HashSet;

use crate::ast::{Ast, ListType, NodeCodeBlock, NodeId, NodeLink, NodeValue, TableAlignment};
use crate::error::{Error, Result};
use crate::options::{HeadingMeta, HtmlAttributes, Options, Plugins};
use crate::renderer::{
    Visit, escape_href, escape_html, is_dangerous_url, rewrite_url, sourcepos_attr, tagfilter,
    walk,
};

/// Render a tree as HTML.
pub fn format_document(ast: &Ast, options: &Options, plugins: &Plugins) -> Result<String> {
    let Some(root) = ast.root() else {
        return Ok(String::new());
    };
    tracing::debug!(nodes = ast.len(), format = "html", "rendering");
    let mut formatter = HtmlFormatter {
        ast,
        options,
        plugins,
        out: String::new(),
        anchorizer: Anchorizer::default(),
        footnotes_open: false,
    };
    walk(ast, root, |visit| match visit {
        Visit::Enter(id) => formatter.enter(id),
        Visit::Exit(id) => formatter.exit(id).map(|()| true),
    })?;
    Ok(formatter.out)
}

/// Turns heading text into unique `id` slugs.
#[derive(Debug, Default)]
pub struct Anchorizer {
    seen: HashSet<String>,
}

impl Anchorizer {
    /// Lowercase the text and collapse every run of other characters than
    /// letters and digits into one hyphen. Repeated slugs get a numeric
    /// suffix.
    pub fn anchorize(&mut self, text: &str) -> String {
        let mut slug = String::new();
        let mut pending_hyphen = false;
        for c in text.chars().flat_map(char::to_lowercase) {
            if c.is_alphanumeric() {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(c);
            } else {
                pending_hyphen = true;
            }
        }

        let mut candidate = slug.clone();
        let mut n = 0;
        while self.seen.contains(&candidate) {
            n += 1;
            candidate = format!("{slug}-{n}");
        }
        self.seen.insert(candidate.clone());
        candidate
    }
}

struct HtmlFormatter<'a> {
    ast: &'a Ast,
    options: &'a Options,
    plugins: &'a Plugins,
    out: String,
    anchorizer: Anchorizer,
    footnotes_open: bool,
}

impl HtmlFormatter<'_> {
    fn cr(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn sourcepos(&mut self, id: NodeId) {
        if self.options.render.sourcepos {
            sourcepos_attr(&mut self.out, self.ast[id].sourcepos);
        }
    }

    fn parent_value(&self, id: NodeId) -> Option<&NodeValue> {
        self.ast[id].parent.map(|p| &self.ast[p].value)
    }

    /// Paragraphs in tight lists and description terms are written without
    /// `<p>` tags.
    fn is_tight_paragraph(&self, id: NodeId) -> bool {
        let parent = self.ast[id].parent;
        let grandparent = parent.and_then(|p| self.ast[p].parent);
        let tight = match grandparent.map(|g| &self.ast[g].value) {
            Some(NodeValue::List(nl)) => nl.tight,
            Some(NodeValue::DescriptionItem(di)) => di.tight,
            _ => false,
        };
        tight || matches!(self.parent_value(id), Some(NodeValue::DescriptionTerm))
    }

    fn is_nested_strong(&self, id: NodeId) -> bool {
        self.options.render.gfm_quirks && matches!(self.parent_value(id), Some(NodeValue::Strong))
    }

    fn raw_html(&mut self, literal: &str) {
        let render = &self.options.render;
        if render.escape {
            escape_html(&mut self.out, literal);
        } else if !render.unsafe_ {
            self.out.push_str("<!-- raw HTML omitted -->");
        } else if self.options.extension.tagfilter {
            self.out.push_str(&tagfilter(literal));
        } else {
            self.out.push_str(literal);
        }
    }

    fn url(&self, url: &str, image: bool) -> Result<String> {
        if !self.options.render.unsafe_ && is_dangerous_url(url) {
            return Ok(String::new());
        }
        rewrite_url(self.options, url, image)
    }

    /// Returns whether the node's children should be rendered.
    fn enter(&mut self, id: NodeId) -> Result<bool> {
        let ast = self.ast;
        let node = &ast[id];
        match &node.value {
            NodeValue::Document | NodeValue::DescriptionItem(_) => {}
            NodeValue::FrontMatter(_) => return Ok(false),
            NodeValue::BlockQuote | NodeValue::MultilineBlockQuote(_) => {
                self.cr();
                self.out.push_str("<blockquote");
                self.sourcepos(id);
                self.out.push_str(">\n");
            }
            NodeValue::Alert(alert) => {
                self.cr();
                self.out.push_str("<div class=\"markdown-alert ");
                self.out.push_str(alert.alert_type.css_class());
                self.out.push('"');
                self.sourcepos(id);
                self.out.push_str(">\n<p class=\"markdown-alert-title\">");
                let title = alert
                    .title
                    .as_deref()
                    .unwrap_or(alert.alert_type.default_title());
                escape_html(&mut self.out, title);
                self.out.push_str("</p>\n");
            }
            NodeValue::List(nl) => {
                self.cr();
                match nl.list_type {
                    ListType::Bullet => self.out.push_str("<ul"),
                    ListType::Ordered => self.out.push_str("<ol"),
                }
                if nl.is_task_list && self.options.render.tasklist_classes {
                    self.out.push_str(" class=\"contains-task-list\"");
                }
                if nl.list_type == ListType::Ordered && nl.start != 1 {
                    self.out.push_str(&format!(" start=\"{}\"", nl.start));
                }
                self.sourcepos(id);
                self.out.push_str(">\n");
            }
            NodeValue::Item(_) => {
                self.cr();
                self.out.push_str("<li");
                self.sourcepos(id);
                self.out.push('>');
            }
            NodeValue::TaskItem(symbol) => {
                let classes = self.options.render.tasklist_classes;
                self.cr();
                self.out.push_str("<li");
                if classes {
                    self.out.push_str(" class=\"task-list-item\"");
                }
                self.sourcepos(id);
                self.out.push_str("><input type=\"checkbox\"");
                if classes {
                    self.out.push_str(" class=\"task-list-item-checkbox\"");
                }
                if symbol.is_some() {
                    self.out.push_str(" checked=\"\"");
                }
                self.out.push_str(" disabled=\"\" /> ");
            }
            NodeValue::DescriptionList => {
                self.cr();
                self.out.push_str("<dl");
                self.sourcepos(id);
                self.out.push_str(">\n");
            }
            NodeValue::DescriptionTerm => {
                self.cr();
                self.out.push_str("<dt");
                self.sourcepos(id);
                self.out.push('>');
            }
            NodeValue::DescriptionDetails => {
                self.cr();
                self.out.push_str("<dd");
                self.sourcepos(id);
                self.out.push('>');
            }
            NodeValue::Heading(heading) => {
                self.cr();
                if let Some(adapter) = &self.plugins.heading_adapter {
                    let meta = HeadingMeta {
                        level: heading.level,
                        content: ast.plain_text(id),
                    };
                    let sourcepos = self.options.render.sourcepos.then_some(node.sourcepos);
                    let html = (adapter.enter)(&meta, sourcepos)
                        .map_err(|e| Error::plugin("heading_adapter", e))?;
                    self.out.push_str(&html);
                } else {
                    self.out.push_str(&format!("<h{}", heading.level));
                    self.sourcepos(id);
                    self.out.push('>');
                    if let Some(prefix) = &self.options.extension.header_ids {
                        let anchor = self.anchorizer.anchorize(&ast.plain_text(id));
                        self.out.push_str("<a href=\"#");
                        escape_html(&mut self.out, prefix);
                        escape_html(&mut self.out, &anchor);
                        self.out.push_str("\" aria-hidden=\"true\" class=\"anchor\" id=\"");
                        escape_html(&mut self.out, prefix);
                        escape_html(&mut self.out, &anchor);
                        self.out.push_str("\"></a>");
                    }
                }
            }
            NodeValue::Subtext => {
                self.cr();
                self.out.push_str("<p");
                self.sourcepos(id);
                self.out.push_str("><sub>");
            }
            NodeValue::CodeBlock(ncb) => {
                self.cr();
                self.code_block(id, ncb)?;
                return Ok(false);
            }
            NodeValue::HtmlBlock(html) => {
                self.cr();
                self.raw_html(&html.literal);
                self.cr();
            }
            NodeValue::ThematicBreak => {
                self.cr();
                self.out.push_str("<hr");
                self.sourcepos(id);
                self.out.push_str(" />\n");
            }
            NodeValue::Paragraph => {
                if !self.is_tight_paragraph(id) {
                    self.cr();
                    self.out.push_str("<p");
                    self.sourcepos(id);
                    self.out.push('>');
                }
            }
            NodeValue::FootnoteDefinition(def) => {
                if !self.footnotes_open {
                    self.cr();
                    self.out
                        .push_str("<section class=\"footnotes\" data-footnotes>\n<ol>\n");
                    self.footnotes_open = true;
                }
                self.cr();
                self.out.push_str("<li");
                self.sourcepos(id);
                self.out.push_str(" id=\"fn-");
                escape_href(&mut self.out, &def.name);
                self.out.push_str("\">");
            }
            NodeValue::Table(_) => {
                self.cr();
                self.out.push_str("<table");
                self.sourcepos(id);
                self.out.push_str(">\n");
            }
            NodeValue::TableRow(header) => {
                self.cr();
                if *header {
                    self.out.push_str("<thead>\n");
                } else if node
                    .prev
                    .is_some_and(|p| matches!(ast[p].value, NodeValue::TableRow(true)))
                {
                    self.out.push_str("<tbody>\n");
                }
                self.out.push_str("<tr");
                self.sourcepos(id);
                self.out.push('>');
            }
            NodeValue::TableCell => {
                let (header, alignment) = self.cell_context(id);
                self.cr();
                self.out.push_str(if header { "<th" } else { "<td" });
                match alignment {
                    TableAlignment::Left => self.out.push_str(" align=\"left\""),
                    TableAlignment::Center => self.out.push_str(" align=\"center\""),
                    TableAlignment::Right => self.out.push_str(" align=\"right\""),
                    TableAlignment::None => {}
                }
                self.sourcepos(id);
                self.out.push('>');
            }
            NodeValue::Text(text) | NodeValue::EscapedTag(text) => escape_html(&mut self.out, text),
            NodeValue::SoftBreak => {
                if self.options.render.hardbreaks {
                    self.out.push_str("<br />\n");
                } else {
                    self.out.push('\n');
                }
            }
            NodeValue::LineBreak => self.out.push_str("<br />\n"),
            NodeValue::Code(code) => {
                self.out.push_str("<code>");
                escape_html(&mut self.out, &code.literal);
                self.out.push_str("</code>");
            }
            NodeValue::HtmlInline(literal) => self.raw_html(literal),
            NodeValue::Emph => self.out.push_str("<em>"),
            NodeValue::Strong => {
                if !self.is_nested_strong(id) {
                    self.out.push_str("<strong>");
                }
            }
            NodeValue::Strikethrough => self.out.push_str("<del>"),
            NodeValue::Highlight => self.out.push_str("<mark>"),
            NodeValue::Superscript => self.out.push_str("<sup>"),
            NodeValue::Subscript => self.out.push_str("<sub>"),
            NodeValue::Underline => self.out.push_str("<u>"),
            NodeValue::SpoileredText => self.out.push_str("<span class=\"spoiler\">"),
            NodeValue::Escaped => {
                if self.options.render.escaped_char_spans {
                    self.out.push_str("<span data-escaped-char>");
                }
            }
            NodeValue::Link(link) => {
                let url = self.url(&link.url, false)?;
                self.out.push_str("<a href=\"");
                escape_href(&mut self.out, &url);
                self.out.push('"');
                if !link.title.is_empty() {
                    self.out.push_str(" title=\"");
                    escape_html(&mut self.out, &link.title);
                    self.out.push('"');
                }
                self.out.push('>');
            }
            NodeValue::Image(link) => {
                self.image(id, link)?;
                return Ok(false);
            }
            NodeValue::WikiLink(link) => {
                let url = self.url(&link.url, false)?;
                self.out.push_str("<a href=\"");
                escape_href(&mut self.out, &url);
                self.out.push_str("\" data-wikilink=\"true\">");
            }
            NodeValue::FootnoteReference(reference) => {
                self.out.push_str("<sup class=\"footnote-ref\"><a href=\"#fn-");
                escape_href(&mut self.out, &reference.name);
                self.out.push_str("\" id=\"fnref-");
                escape_href(&mut self.out, &reference.name);
                if reference.ref_num > 1 {
                    self.out.push_str(&format!("-{}", reference.ref_num));
                }
                self.out
                    .push_str(&format!("\" data-footnote-ref>{}</a></sup>", reference.ix));
            }
            NodeValue::Math(math) => {
                let style = if math.display_math { "display" } else { "inline" };
                if math.dollar_math {
                    self.out
                        .push_str(&format!("<span data-math-style=\"{style}\">"));
                    escape_html(&mut self.out, &math.literal);
                    self.out.push_str("</span>");
                } else {
                    self.out
                        .push_str(&format!("<code data-math-style=\"{style}\">"));
                    escape_html(&mut self.out, &math.literal);
                    self.out.push_str("</code>");
                }
            }
        }
        Ok(true)
    }

    fn exit(&mut self, id: NodeId) -> Result<()> {
        let ast = self.ast;
        let node = &ast[id];
        match &node.value {
            NodeValue::Document => {
                if self.footnotes_open {
                    self.cr();
                    self.out.push_str("</ol>\n</section>\n");
                }
            }
            NodeValue::BlockQuote | NodeValue::MultilineBlockQuote(_) => {
                self.cr();
                self.out.push_str("</blockquote>\n");
            }
            NodeValue::Alert(_) => {
                self.cr();
                self.out.push_str("</div>\n");
            }
            NodeValue::List(nl) => {
                self.cr();
                match nl.list_type {
                    ListType::Bullet => self.out.push_str("</ul>\n"),
                    ListType::Ordered => self.out.push_str("</ol>\n"),
                }
            }
            NodeValue::Item(_) | NodeValue::TaskItem(_) => self.out.push_str("</li>\n"),
            NodeValue::DescriptionList => self.out.push_str("</dl>\n"),
            NodeValue::DescriptionTerm => self.out.push_str("</dt>\n"),
            NodeValue::DescriptionDetails => self.out.push_str("</dd>\n"),
            NodeValue::Heading(heading) => {
                if let Some(adapter) = &self.plugins.heading_adapter {
                    let meta = HeadingMeta {
                        level: heading.level,
                        content: ast.plain_text(id),
                    };
                    let html = (adapter.exit)(&meta).map_err(|e| Error::plugin("heading_adapter", e))?;
                    self.out.push_str(&html);
                } else {
                    self.out.push_str(&format!("</h{}>\n", heading.level));
                }
            }
            NodeValue::Subtext => self.out.push_str("</sub></p>\n"),
            NodeValue::Paragraph => {
                let in_footnote = node.next.is_none()
                    && matches!(self.parent_value(id), Some(NodeValue::FootnoteDefinition(_)));
                if in_footnote && let Some(parent) = node.parent {
                    self.footnote_backrefs(parent);
                }
                if !self.is_tight_paragraph(id) {
                    self.out.push_str("</p>\n");
                }
            }
            NodeValue::FootnoteDefinition(_) => {
                let ends_with_paragraph = node
                    .last_child
                    .is_some_and(|c| matches!(ast[c].value, NodeValue::Paragraph));
                if !ends_with_paragraph {
                    self.footnote_backrefs(id);
                }
                self.cr();
                self.out.push_str("</li>\n");
            }
            NodeValue::Table(_) => {
                let has_body = node
                    .last_child
                    .is_some_and(|r| matches!(ast[r].value, NodeValue::TableRow(false)));
                self.cr();
                if has_body {
                    self.out.push_str("</tbody>\n");
                }
                self.out.push_str("</table>\n");
            }
            NodeValue::TableRow(header) => {
                self.cr();
                self.out.push_str("</tr>\n");
                if *header {
                    self.out.push_str("</thead>\n");
                }
            }
            NodeValue::TableCell => {
                let (header, _) = self.cell_context(id);
                self.out.push_str(if header { "</th>" } else { "</td>" });
            }
            NodeValue::Emph => self.out.push_str("</em>"),
            NodeValue::Strong => {
                if !self.is_nested_strong(id) {
                    self.out.push_str("</strong>");
                }
            }
            NodeValue::Strikethrough => self.out.push_str("</del>"),
            NodeValue::Highlight => self.out.push_str("</mark>"),
            NodeValue::Superscript => self.out.push_str("</sup>"),
            NodeValue::Subscript => self.out.push_str("</sub>"),
            NodeValue::Underline => self.out.push_str("</u>"),
            NodeValue::SpoileredText => self.out.push_str("</span>"),
            NodeValue::Escaped => {
                if self.options.render.escaped_char_spans {
                    self.out.push_str("</span>");
                }
            }
            NodeValue::Link(_) | NodeValue::WikiLink(_) => self.out.push_str("</a>"),
            _ => {}
        }
        Ok(())
    }

    fn cell_context(&self, cell: NodeId) -> (bool, TableAlignment) {
        let row = self.ast[cell].parent;
        let header = row.is_some_and(|r| matches!(self.ast[r].value, NodeValue::TableRow(true)));
        let column = self.ast.children(row.unwrap_or(cell)).position(|c| c == cell);
        let alignment = row
            .and_then(|r| self.ast[r].parent)
            .and_then(|t| match &self.ast[t].value {
                NodeValue::Table(table) => column.and_then(|i| table.alignments.get(i).copied()),
                _ => None,
            })
            .unwrap_or_default();
        (header, alignment)
    }

    fn footnote_backrefs(&mut self, definition: NodeId) {
        let NodeValue::FootnoteDefinition(def) = &self.ast[definition].value else {
            return;
        };
        let ix = self.footnote_index(definition);
        for ref_num in 1..=def.total_references {
            let suffix = if ref_num > 1 {
                format!("-{ref_num}")
            } else {
                String::new()
            };
            self.out.push_str(" <a href=\"#fnref-");
            escape_href(&mut self.out, &def.name);
            self.out.push_str(&format!(
                "{suffix}\" class=\"footnote-backref\" data-footnote-backref data-footnote-backref-idx=\"{ix}{suffix}\" aria-label=\"Back to reference {ix}{suffix}\">\u{21a9}"
            ));
            if ref_num > 1 {
                self.out
                    .push_str(&format!("<sup class=\"footnote-ref\">{ref_num}</sup>"));
            }
            self.out.push_str("</a>");
        }
    }

    /// Ordinal of a definition, taken from the references pointing at it.
    fn footnote_index(&self, definition: NodeId) -> u32 {
        let NodeValue::FootnoteDefinition(def) = &self.ast[definition].value else {
            return 0;
        };
        self.ast
            .nodes()
            .iter()
            .find_map(|n| match &n.value {
                NodeValue::FootnoteReference(r) if r.name == def.name => Some(r.ix),
                _ => None,
            })
            .unwrap_or(0)
    }

    fn code_block(&mut self, id: NodeId, ncb: &NodeCodeBlock) -> Result<()> {
        let render = &self.options.render;
        let (lang, meta) = match ncb.info.split_once([' ', '\t']) {
            Some((lang, meta)) => (lang, meta.trim()),
            None => (ncb.info.as_str(), ""),
        };

        let mut pre_attrs = HtmlAttributes::new();
        let mut code_attrs = HtmlAttributes::new();
        if !lang.is_empty() {
            if render.github_pre_lang {
                pre_attrs.insert("lang".to_string(), lang.to_string());
            } else {
                code_attrs.insert("class".to_string(), format!("language-{lang}"));
            }
            if render.full_info_string && !meta.is_empty() {
                let target = if render.github_pre_lang { &mut pre_attrs } else { &mut code_attrs };
                target.insert("data-meta".to_string(), meta.to_string());
            }
        }
        if render.sourcepos {
            pre_attrs.insert("data-sourcepos".to_string(), self.ast[id].sourcepos.to_string());
        }

        match &self.plugins.codefence_syntax_highlighter {
            Some(highlighter) => {
                let pre = match &highlighter.pre {
                    Some(pre) => pre(&pre_attrs).map_err(|e| Error::plugin("codefence_syntax_highlighter", e))?,
                    None => tag_with_attributes("pre", &pre_attrs),
                };
                let code = match &highlighter.code {
                    Some(code) => code(&code_attrs).map_err(|e| Error::plugin("codefence_syntax_highlighter", e))?,
                    None => tag_with_attributes("code", &code_attrs),
                };
                let lang = (!lang.is_empty()).then_some(lang);
                let body = (highlighter.highlight)(&ncb.literal, lang)
                    .map_err(|e| Error::plugin("codefence_syntax_highlighter", e))?;
                self.out.push_str(&pre);
                self.out.push_str(&code);
                self.out.push_str(&body);
            }
            None => {
                self.out.push_str(&tag_with_attributes("pre", &pre_attrs));
                self.out.push_str(&tag_with_attributes("code", &code_attrs));
                escape_html(&mut self.out, &ncb.literal);
            }
        }
        self.out.push_str("</code></pre>\n");
        Ok(())
    }

    fn image(&mut self, id: NodeId, link: &NodeLink) -> Result<()> {
        let url = self.url(&link.url, true)?;
        let figure = self.options.render.figure_with_caption && !link.title.is_empty();
        if figure {
            self.out.push_str("<figure>");
        }
        self.out.push_str("<img src=\"");
        escape_href(&mut self.out, &url);
        self.out.push_str("\" alt=\"");
        escape_html(&mut self.out, &alt_text(self.ast, id));
        self.out.push('"');
        if !link.title.is_empty() {
            self.out.push_str(" title=\"");
            escape_html(&mut self.out, &link.title);
            self.out.push('"');
        }
        self.out.push_str(" />");
        if figure {
            self.out.push_str("<figcaption>");
            escape_html(&mut self.out, &link.title);
            self.out.push_str("</figcaption></figure>");
        }
        Ok(())
    }
}

/// Text of an image description, with breaks kept as newlines.
fn alt_text(ast: &Ast, id: NodeId) -> String {
    let mut out = String::new();
    for d in ast.descendants(id).skip(1) {
        match &ast[d].value {
            NodeValue::SoftBreak | NodeValue::LineBreak => out.push('\n'),
            value => {
                if let Some(text) = value.text() {
                    out.push_str(text);
                }
            }
        }
    }
    out
}

pub(crate) fn tag_with_attributes(tag: &str, attributes: &HtmlAttributes) -> String {
    let mut out = format!("<{tag}");
    for (name, value) in attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_html(&mut out, value);
        out.push('"');
    }
    out.push('>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_document;
    use pretty_assertions::assert_eq;

    fn render(text: &str, options: &Options) -> String {
        let ast = parse_document(text, options).unwrap();
        format_document(&ast, options, &Plugins::default()).unwrap()
    }

    #[test]
    fn test_anchorizer() {
        let mut anchorizer = Anchorizer::default();
        assert_eq!(anchorizer.anchorize("Hello, World!"), "hello-world");
        assert_eq!(anchorizer.anchorize("Hello World"), "hello-world-1");
        assert_eq!(anchorizer.anchorize("  Ünïcode  text "), "ünïcode-text");
    }

    #[test]
    fn test_tight_and_loose_lists() {
        let options = Options::default();
        assert_eq!(render("- a\n- b\n", &options), "<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n");
        assert_eq!(
            render("1. a\n\n2. b\n", &options),
            "<ol>\n<li>\n<p>a</p>\n</li>\n<li>\n<p>b</p>\n</li>\n</ol>\n"
        );
    }

    #[test]
    fn test_code_block_languages() {
        let mut options = Options::default();
        assert_eq!(
            render("```rust\nlet x;\n```\n", &options),
            "<pre><code class=\"language-rust\">let x;\n</code></pre>\n"
        );
        options.render.github_pre_lang = true;
        assert_eq!(
            render("```rust\nlet x;\n```\n", &options),
            "<pre lang=\"rust\"><code>let x;\n</code></pre>\n"
        );
    }

    #[test]
    fn test_raw_html_policy() {
        let mut options = Options::default();
        assert_eq!(render("<div>\nhi\n</div>\n", &options), "<!-- raw HTML omitted -->\n");
        options.render.escape = true;
        assert_eq!(
            render("a <b>c</b>\n", &options),
            "<p>a &lt;b&gt;c&lt;/b&gt;</p>\n"
        );
        options.render.escape = false;
        options.render.unsafe_ = true;
        options.extension.tagfilter = true;
        assert_eq!(render("<script>x</script>\n", &options), "&lt;script>x&lt;/script>\n");
    }

    #[test]
    fn test_dangerous_link_is_scrubbed() {
        let options = Options::default();
        assert_eq!(
            render("[x](javascript:alert(1))\n", &options),
            "<p><a href=\"\">x</a></p>\n"
        );
    }

    #[test]
    fn test_sourcepos_attributes() {
        let mut options = Options::default();
        options.render.sourcepos = true;
        assert_eq!(
            render("# Hi\n\ntext\n", &options),
            "<h1 data-sourcepos=\"1:1-1:4\">Hi</h1>\n<p data-sourcepos=\"3:1-3:4\">text</p>\n"
        );
    }

    #[test]
    fn test_image_alt_is_plain_text() {
        let options = Options::default();
        assert_eq!(
            render("![foo *bar*](/url \"title\")\n", &options),
            "<p><img src=\"/url\" alt=\"foo bar\" title=\"title\" /></p>\n"
        );
    }
}
