//! A CommonMark and GitHub Flavored Markdown parser.
//!
//! Input is parsed into an [`Ast`], an arena of nodes addressed by
//! [`ast::NodeId`], which can then be rendered as HTML, CommonMark XML or
//! normalized CommonMark.
//!
//! ```
//! use marksmith::{Options, Plugins, markdown_to_html};
//!
//! let html = markdown_to_html("Hello, **world**!\n", &Options::default(), &Plugins::default());
//! assert_eq!(html.unwrap(), "<p>Hello, <strong>world</strong>!</p>\n");
//! ```
pub mod ast;
mod error;
#[cfg(feature = "syntect")]
mod highlight;
pub mod options;
pub mod parser;
pub mod renderer;
pub(crate) mod scanner;

pub use ast::Ast;
pub use error::{Error, PluginError, Result};
pub use options::{Options, Plugins};
pub use parser::{parse_document, parse_document_bytes};

/// Version of this crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Render a parsed tree as HTML.
pub fn format_html(ast: &Ast, options: &Options, plugins: &Plugins) -> Result<String> {
    renderer::html::format_document(ast, options, plugins)
}

/// Render a parsed tree as CommonMark XML.
pub fn format_xml(ast: &Ast, options: &Options, plugins: &Plugins) -> Result<String> {
    renderer::xml::format_document(ast, options, plugins)
}

/// Render a parsed tree back to CommonMark.
pub fn format_commonmark(ast: &Ast, options: &Options, plugins: &Plugins) -> Result<String> {
    renderer::commonmark::format_document(ast, options, plugins)
}

/// Parse Markdown text and render it as HTML.
pub fn markdown_to_html(text: &str, options: &Options, plugins: &Plugins) -> Result<String> {
    let ast = parse_document(text, options)?;
    format_html(&ast, options, plugins)
}

pub fn markdown_to_commonmark_xml(
    text: &str,
    options: &Options,
    plugins: &Plugins,
) -> Result<String> {
    let ast = parse_document(text, options)?;
    format_xml(&ast, options, plugins)
}

pub fn markdown_to_commonmark(text: &str, options: &Options, plugins: &Plugins) -> Result<String> {
    let ast = parse_document(text, options)?;
    format_commonmark(&ast, options, plugins)
}
