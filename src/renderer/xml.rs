//! CommonMark XML output.

use crate::ast::{Ast, ListDelimType, ListType, NodeId, NodeValue, TableAlignment};
use crate::error::Result;
use crate::options::{Options, Plugins};
use crate::renderer::{Visit, escape_html, rewrite_url, walk};

const PREAMBLE: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE document SYSTEM \"CommonMark.dtd\">\n";

/// Render a tree as CommonMark XML.
pub fn format_document(ast: &Ast, options: &Options, _plugins: &Plugins) -> Result<String> {
    let Some(root) = ast.root() else {
        return Ok(String::new());
    };
    tracing::debug!(nodes = ast.len(), format = "xml", "rendering");
    let mut formatter = XmlFormatter {
        ast,
        options,
        out: PREAMBLE.to_string(),
        indent: 0,
    };
    walk(ast, root, |visit| match visit {
        Visit::Enter(id) => formatter.enter(id),
        Visit::Exit(id) => {
            formatter.exit(id);
            Ok(true)
        }
    })?;
    Ok(formatter.out)
}

struct XmlFormatter<'a> {
    ast: &'a Ast,
    options: &'a Options,
    out: String,
    indent: usize,
}

impl XmlFormatter<'_> {
    fn attr(&mut self, name: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        escape_html(&mut self.out, value);
        self.out.push('"');
    }

    fn enter(&mut self, id: NodeId) -> Result<bool> {
        let ast = self.ast;
        let node = &ast[id];
        if matches!(node.value, NodeValue::FrontMatter(_)) {
            return Ok(false);
        }

        self.out.push_str(&" ".repeat(self.indent));
        self.out.push('<');
        self.out.push_str(element_name(&node.value));
        if node.parent.is_none() {
            self.out.push_str(" xmlns=\"http://commonmark.org/xml/1.0\"");
        }
        if self.options.render.sourcepos {
            self.attr("sourcepos", &node.sourcepos.to_string());
        }

        match &node.value {
            NodeValue::List(nl) => {
                match nl.list_type {
                    ListType::Bullet => self.attr("type", "bullet"),
                    ListType::Ordered => {
                        self.attr("type", "ordered");
                        self.attr("start", &nl.start.to_string());
                        let delim = match nl.delimiter {
                            ListDelimType::Period => "period",
                            ListDelimType::Paren => "paren",
                        };
                        self.attr("delim", delim);
                    }
                }
                self.attr("tight", if nl.tight { "true" } else { "false" });
            }
            NodeValue::TaskItem(symbol) => {
                self.attr("completed", if symbol.is_some() { "true" } else { "false" });
            }
            NodeValue::Heading(heading) => self.attr("level", &heading.level.to_string()),
            NodeValue::CodeBlock(ncb) if !ncb.info.is_empty() => self.attr("info", &ncb.info),
            NodeValue::Table(table) => {
                let alignments: Vec<&str> = table
                    .alignments
                    .iter()
                    .map(|a| match a {
                        TableAlignment::None => "none",
                        TableAlignment::Left => "left",
                        TableAlignment::Center => "center",
                        TableAlignment::Right => "right",
                    })
                    .collect();
                self.attr("alignments", &alignments.join(" "));
            }
            NodeValue::TableRow(true) => self.attr("header", "true"),
            NodeValue::Link(link) | NodeValue::Image(link) => {
                let image = matches!(node.value, NodeValue::Image(_));
                let url = rewrite_url(self.options, &link.url, image)?;
                self.attr("destination", &url);
                self.attr("title", &link.title);
            }
            NodeValue::WikiLink(link) => {
                let url = rewrite_url(self.options, &link.url, false)?;
                self.attr("destination", &url);
            }
            NodeValue::FootnoteDefinition(def) => self.attr("label", &def.name),
            NodeValue::FootnoteReference(reference) => {
                self.attr("label", &reference.name);
                self.attr("ix", &reference.ix.to_string());
            }
            NodeValue::Math(math) => {
                self.attr("display", if math.display_math { "true" } else { "false" });
            }
            NodeValue::Alert(alert) => {
                self.attr("type", &alert.alert_type.default_title().to_lowercase());
                if let Some(title) = &alert.title {
                    self.attr("title", title);
                }
            }
            _ => {}
        }

        let literal = match &node.value {
            NodeValue::HtmlBlock(_) | NodeValue::HtmlInline(_) if !self.options.render.unsafe_ => {
                Some("")
            }
            value => value.text(),
        };
        if let Some(literal) = literal {
            self.out.push_str(" xml:space=\"preserve\">");
            escape_html(&mut self.out, literal);
            self.out.push_str("</");
            self.out.push_str(element_name(&node.value));
            self.out.push_str(">\n");
            return Ok(false);
        }
        if node.first_child.is_none() {
            self.out.push_str(" />\n");
            return Ok(false);
        }
        self.out.push_str(">\n");
        self.indent += 2;
        Ok(true)
    }

    fn exit(&mut self, id: NodeId) {
        self.indent = self.indent.saturating_sub(2);
        self.out.push_str(&" ".repeat(self.indent));
        self.out.push_str("</");
        self.out.push_str(element_name(&self.ast[id].value));
        self.out.push_str(">\n");
    }
}

fn element_name(value: &NodeValue) -> &'static str {
    match value {
        NodeValue::Document => "document",
        NodeValue::FrontMatter(_) => "frontmatter",
        NodeValue::BlockQuote => "block_quote",
        NodeValue::MultilineBlockQuote(_) => "multiline_block_quote",
        NodeValue::Alert(_) => "alert",
        NodeValue::List(_) => "list",
        NodeValue::Item(_) => "item",
        NodeValue::TaskItem(_) => "taskitem",
        NodeValue::DescriptionList => "description_list",
        NodeValue::DescriptionItem(_) => "description_item",
        NodeValue::DescriptionTerm => "description_term",
        NodeValue::DescriptionDetails => "description_details",
        NodeValue::CodeBlock(_) => "code_block",
        NodeValue::HtmlBlock(_) => "html_block",
        NodeValue::Paragraph => "paragraph",
        NodeValue::Heading(_) => "heading",
        NodeValue::Subtext => "subtext",
        NodeValue::ThematicBreak => "thematic_break",
        NodeValue::FootnoteDefinition(_) => "footnote_definition",
        NodeValue::Table(_) => "table",
        NodeValue::TableRow(_) => "table_row",
        NodeValue::TableCell => "table_cell",
        NodeValue::Text(_) => "text",
        NodeValue::SoftBreak => "softbreak",
        NodeValue::LineBreak => "linebreak",
        NodeValue::Code(_) => "code",
        NodeValue::HtmlInline(_) => "html_inline",
        NodeValue::Emph => "emph",
        NodeValue::Strong => "strong",
        NodeValue::Strikethrough => "strikethrough",
        NodeValue::Highlight => "highlight",
        NodeValue::Superscript => "superscript",
        NodeValue::Subscript => "subscript",
        NodeValue::Underline => "underline",
        NodeValue::SpoileredText => "spoiler",
        NodeValue::EscapedTag(_) => "escaped_tag",
        NodeValue::Escaped => "escaped",
        NodeValue::Link(_) => "link",
        NodeValue::Image(_) => "image",
        NodeValue::WikiLink(_) => "wikilink",
        NodeValue::FootnoteReference(_) => "footnote_reference",
        NodeValue::Math(_) => "math",
    }
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
    fn test_paragraph_with_emphasis() {
        assert_eq!(
            render("Hello *world*\n", &Options::default()),
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
                "<!DOCTYPE document SYSTEM \"CommonMark.dtd\">\n",
                "<document xmlns=\"http://commonmark.org/xml/1.0\">\n",
                "  <paragraph>\n",
                "    <text xml:space=\"preserve\">Hello </text>\n",
                "    <emph>\n",
                "      <text xml:space=\"preserve\">world</text>\n",
                "    </emph>\n",
                "  </paragraph>\n",
                "</document>\n",
            )
        );
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(render("", &Options::default()), "");
    }

    #[test]
    fn test_raw_html_literal_omitted_when_safe() {
        let out = render("<div>x</div>\n", &Options::default());
        assert!(out.contains("<html_block xml:space=\"preserve\"></html_block>"));
    }
}
