//! Configuration for parsing and rendering.
//!
//! [`Options`] is a plain value with three independently defaulted groups.
//! It deserializes from partial JSON, so `{"extension": {"table": true}}`
//! enables tables and leaves everything else at its default. The defaults
//! give plain CommonMark with no extensions.

use crate::ast::Sourcepos;
use crate::error::PluginError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Umbrella options struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub extension: ExtensionOptions,
    pub parse: ParseOptions,
    pub render: RenderOptions,
}

impl Options {
    /// The GitHub Flavored Markdown extension set.
    pub fn gfm() -> Self {
        let mut options = Options::default();
        options.enable_gfm();
        options
    }

    /// Turn on the GFM extensions and output quirks, leaving other settings
    /// as they are.
    pub fn enable_gfm(&mut self) {
        let ext = &mut self.extension;
        ext.strikethrough = true;
        ext.tagfilter = true;
        ext.table = true;
        ext.autolink = true;
        ext.tasklist = true;
        self.render.gfm_quirks = true;
        self.render.github_pre_lang = true;
    }
}

/// Grammar extensions. All disabled by default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionOptions {
    /// `~~deleted~~` text.
    pub strikethrough: bool,
    /// Escape `<script>`, `<style>` and similar tags in raw HTML.
    pub tagfilter: bool,
    pub table: bool,
    /// Bare `www.`, `http://`, `https://`, `ftp://` and email autolinks.
    pub autolink: bool,
    pub tasklist: bool,
    pub superscript: bool,
    pub subscript: bool,
    /// Prefix for heading anchors; `None` disables them.
    pub header_ids: Option<String>,
    pub footnotes: bool,
    /// `^[inline footnotes]`, in addition to `footnotes`.
    pub inline_footnotes: bool,
    pub description_lists: bool,
    /// Delimiter line for front matter, such as `---`.
    pub front_matter_delimiter: Option<String>,
    /// `>>>` fenced block quotes.
    pub multiline_block_quotes: bool,
    /// GitHub style `> [!NOTE]` alerts.
    pub alerts: bool,
    pub math_dollars: bool,
    pub math_code: bool,
    pub wikilinks_title_after_pipe: bool,
    pub wikilinks_title_before_pipe: bool,
    /// `__underline__` instead of strong emphasis.
    pub underline: bool,
    /// `-# small print` lines.
    pub subtext: bool,
    /// `||spoiler||` spans.
    pub spoiler: bool,
    /// `>` directly followed by text is not a block quote.
    pub greentext: bool,
    /// `==highlighted==` text.
    pub highlight: bool,
    pub cjk_friendly_emphasis: bool,
}

impl ExtensionOptions {
    pub(crate) fn wikilinks(&self) -> Option<WikiLinksMode> {
        if self.wikilinks_title_before_pipe {
            Some(WikiLinksMode::TitleFirst)
        } else if self.wikilinks_title_after_pipe {
            Some(WikiLinksMode::UrlFirst)
        } else {
            None
        }
    }
}

/// Order of the two halves of `[[a|b]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WikiLinksMode {
    /// `[[url|title]]`
    UrlFirst,
    /// `[[title|url]]`
    TitleFirst,
}

/// A reference that did not match any definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenLinkReference<'a> {
    /// Label after case folding and whitespace collapse.
    pub normalized: &'a str,
    /// Label as written.
    pub original: &'a str,
}

/// URL and title that a reference resolves to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub url: String,
    pub title: String,
}

pub type BrokenLinkCallback = Arc<
    dyn Fn(BrokenLinkReference<'_>) -> Result<Option<ResolvedReference>, PluginError>
        + Send
        + Sync,
>;

pub type UrlRewriter = Arc<dyn Fn(&str) -> Result<String, PluginError> + Send + Sync>;

/// Options that influence how ambiguous input is read.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Typographic quotes, dashes and ellipses.
    pub smart: bool,
    /// Info string for fenced code blocks that have none.
    pub default_info_string: Option<String>,
    /// Any single character between the brackets marks a task as done.
    pub relaxed_tasklist_matching: bool,
    /// Autolinks inside brackets and with any URL scheme.
    pub relaxed_autolinks: bool,
    pub ignore_setext: bool,
    /// Keep footnote definitions where they were written, referenced or not.
    pub leave_footnote_definitions: bool,
    /// Container blocks deeper than this are not opened.
    pub max_nesting_depth: usize,
    /// Called for `[text][label]` and `[label]` references with no definition.
    #[serde(skip)]
    pub broken_link_callback: Option<BrokenLinkCallback>,
    /// Applied to link URLs when rendering.
    #[serde(skip)]
    pub link_url_rewriter: Option<UrlRewriter>,
    /// Applied to image URLs when rendering.
    #[serde(skip)]
    pub image_url_rewriter: Option<UrlRewriter>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            smart: false,
            default_info_string: None,
            relaxed_tasklist_matching: false,
            relaxed_autolinks: false,
            ignore_setext: false,
            leave_footnote_definitions: false,
            max_nesting_depth: 100,
            broken_link_callback: None,
            link_url_rewriter: None,
            image_url_rewriter: None,
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("smart", &self.smart)
            .field("default_info_string", &self.default_info_string)
            .field("relaxed_tasklist_matching", &self.relaxed_tasklist_matching)
            .field("relaxed_autolinks", &self.relaxed_autolinks)
            .field("ignore_setext", &self.ignore_setext)
            .field("leave_footnote_definitions", &self.leave_footnote_definitions)
            .field("max_nesting_depth", &self.max_nesting_depth)
            .field("broken_link_callback", &self.broken_link_callback.is_some())
            .field("link_url_rewriter", &self.link_url_rewriter.is_some())
            .field("image_url_rewriter", &self.image_url_rewriter.is_some())
            .finish()
    }
}

/// Bullet character used by the CommonMark renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStyleType {
    #[default]
    Dash,
    Plus,
    Star,
}

impl ListStyleType {
    pub fn marker(self) -> char {
        match self {
            ListStyleType::Dash => '-',
            ListStyleType::Plus => '+',
            ListStyleType::Star => '*',
        }
    }
}

/// Options that shape rendered output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Soft line breaks render as hard breaks.
    pub hardbreaks: bool,
    /// `<pre lang="rust">` instead of `<code class="language-rust">`.
    pub github_pre_lang: bool,
    /// Expose the info string after the language as `data-meta`.
    pub full_info_string: bool,
    /// Wrap column for CommonMark output; 0 disables wrapping.
    pub width: usize,
    /// Emit raw HTML and potentially dangerous URLs.
    #[serde(rename = "unsafe")]
    pub unsafe_: bool,
    /// Escape raw HTML instead of omitting it.
    pub escape: bool,
    pub list_style: ListStyleType,
    pub sourcepos: bool,
    /// Wrap backslash-escaped characters in `<span data-escaped-char>`.
    pub escaped_char_spans: bool,
    /// Leave links with no text and no URL as literal text.
    pub ignore_empty_links: bool,
    pub gfm_quirks: bool,
    /// Always write fenced code blocks in CommonMark output.
    pub prefer_fenced: bool,
    /// Render titled images as `<figure>` with a caption.
    pub figure_with_caption: bool,
    pub tasklist_classes: bool,
    /// Minimum width of ordered list markers, including the trailing space.
    pub ol_width: usize,
    pub experimental_minimize_commonmark: bool,
}

/// Heading information handed to a [`HeadingAdapter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingMeta {
    pub level: u8,
    /// Plain text content of the heading.
    pub content: String,
}

type HeadingEnter =
    Arc<dyn Fn(&HeadingMeta, Option<Sourcepos>) -> Result<String, PluginError> + Send + Sync>;
type HeadingExit = Arc<dyn Fn(&HeadingMeta) -> Result<String, PluginError> + Send + Sync>;

/// Replaces the built-in `<hN>` tags and anchors.
#[derive(Clone)]
pub struct HeadingAdapter {
    pub enter: HeadingEnter,
    pub exit: HeadingExit,
}

impl HeadingAdapter {
    pub fn new<E, X>(enter: E, exit: X) -> Self
    where
        E: Fn(&HeadingMeta, Option<Sourcepos>) -> Result<String, PluginError> + Send + Sync + 'static,
        X: Fn(&HeadingMeta) -> Result<String, PluginError> + Send + Sync + 'static,
    {
        HeadingAdapter {
            enter: Arc::new(enter),
            exit: Arc::new(exit),
        }
    }
}

impl fmt::Debug for HeadingAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HeadingAdapter")
    }
}

/// Attributes of the `<pre>` or `<code>` tag around a fenced block.
pub type HtmlAttributes = BTreeMap<String, String>;

type Highlight = Arc<dyn Fn(&str, Option<&str>) -> Result<String, PluginError> + Send + Sync>;
type WrapperTag = Arc<dyn Fn(&HtmlAttributes) -> Result<String, PluginError> + Send + Sync>;

/// Renders code block contents, and optionally the tags around them.
#[derive(Clone)]
pub struct SyntaxHighlighterAdapter {
    /// Receives the literal code and the language, returns HTML.
    pub highlight: Highlight,
    /// Opening `<pre>` tag; `<pre{attrs}>` when absent.
    pub pre: Option<WrapperTag>,
    /// Opening `<code>` tag; `<code{attrs}>` when absent.
    pub code: Option<WrapperTag>,
}

impl SyntaxHighlighterAdapter {
    pub fn new<H>(highlight: H) -> Self
    where
        H: Fn(&str, Option<&str>) -> Result<String, PluginError> + Send + Sync + 'static,
    {
        SyntaxHighlighterAdapter {
            highlight: Arc::new(highlight),
            pre: None,
            code: None,
        }
    }

    pub fn with_pre<P>(mut self, pre: P) -> Self
    where
        P: Fn(&HtmlAttributes) -> Result<String, PluginError> + Send + Sync + 'static,
    {
        self.pre = Some(Arc::new(pre));
        self
    }

    pub fn with_code<C>(mut self, code: C) -> Self
    where
        C: Fn(&HtmlAttributes) -> Result<String, PluginError> + Send + Sync + 'static,
    {
        self.code = Some(Arc::new(code));
        self
    }
}

impl fmt::Debug for SyntaxHighlighterAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxHighlighterAdapter")
            .field("pre", &self.pre.is_some())
            .field("code", &self.code.is_some())
            .finish()
    }
}

/// Render-time hooks.
#[derive(Debug, Clone, Default)]
pub struct Plugins {
    pub heading_adapter: Option<HeadingAdapter>,
    pub codefence_syntax_highlighter: Option<SyntaxHighlighterAdapter>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_plain_commonmark() {
        let options = Options::default();
        assert_eq!(options.extension, ExtensionOptions::default());
        assert!(!options.extension.table);
        assert_eq!(options.render.width, 0);
        assert_eq!(options.render.list_style, ListStyleType::Dash);
        assert_eq!(options.parse.max_nesting_depth, 100);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let options: Options = serde_json::from_str(
            r#"{"extension": {"table": true, "header_ids": "user-"}, "render": {"unsafe": true, "list_style": "star"}}"#,
        )
        .unwrap();
        assert!(options.extension.table);
        assert_eq!(options.extension.header_ids.as_deref(), Some("user-"));
        assert!(!options.extension.strikethrough);
        assert!(options.render.unsafe_);
        assert_eq!(options.render.list_style, ListStyleType::Star);
        assert_eq!(options.parse.max_nesting_depth, 100);
    }

    #[test]
    fn test_enable_gfm_keeps_other_settings() {
        let mut options = Options::default();
        options.extension.footnotes = true;
        options.render.width = 72;
        options.enable_gfm();
        assert!(options.extension.footnotes);
        assert!(options.extension.table && options.extension.tasklist);
        assert_eq!(options.render.width, 72);
        assert_eq!(options.extension.tagfilter, Options::gfm().extension.tagfilter);
    }

    #[test]
    fn test_empty_json_is_default() {
        let options: Options = serde_json::from_str("{}").unwrap();
        assert_eq!(options.render, RenderOptions::default());
    }

    #[test]
    fn test_wikilinks_title_before_pipe_wins() {
        let ext = ExtensionOptions {
            wikilinks_title_after_pipe: true,
            wikilinks_title_before_pipe: true,
            ..Default::default()
        };
        assert_eq!(ext.wikilinks(), Some(WikiLinksMode::TitleFirst));
    }
}
