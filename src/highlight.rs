//! Theme-based highlighting of fenced code with syntect.

use std::sync::{Arc, LazyLock};

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::error::{Error, PluginError, Result};
use crate::options::{HtmlAttributes, SyntaxHighlighterAdapter};
use crate::renderer::html::tag_with_attributes;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

impl SyntaxHighlighterAdapter {
    /// Highlight fenced code with one of syntect's bundled themes, such as
    /// `base16-ocean.dark` or `InspiredGitHub`.
    ///
    /// Token colors are written as inline styles, and the theme background
    /// goes on the `<pre>` tag.
    pub fn with_theme(theme: &str) -> Result<Self> {
        let theme = THEME_SET
            .themes
            .get(theme)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| Error::UnknownTheme(theme.to_string()))?;
        let pre_theme = Arc::clone(&theme);
        let adapter = SyntaxHighlighterAdapter::new(move |code, lang| highlight(&theme, code, lang))
            .with_pre(move |attrs| Ok(pre_tag(&pre_theme, attrs)));
        Ok(adapter)
    }
}

fn highlight(theme: &Theme, code: &str, lang: Option<&str>) -> std::result::Result<String, PluginError> {
    let syntax = lang
        .and_then(|lang| SYNTAX_SET.find_syntax_by_token(lang))
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
    tracing::trace!(syntax = syntax.name, "highlighting code block");
    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut out = String::with_capacity(code.len() * 2);
    for line in LinesWithEndings::from(code) {
        let regions = highlighter.highlight_line(line, &SYNTAX_SET)?;
        out.push_str(&styled_line_to_highlighted_html(&regions, IncludeBackground::No)?);
    }
    Ok(out)
}

fn pre_tag(theme: &Theme, attrs: &HtmlAttributes) -> String {
    let mut attrs = attrs.clone();
    if let Some(bg) = theme.settings.background {
        attrs.insert(
            "style".to_string(),
            format!("background-color:#{:02x}{:02x}{:02x};", bg.r, bg.g, bg.b),
        );
    }
    tag_with_attributes("pre", &attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Options, Plugins, markdown_to_html};

    fn render(text: &str, theme: &str) -> String {
        let plugins = Plugins {
            codefence_syntax_highlighter: Some(SyntaxHighlighterAdapter::with_theme(theme).unwrap()),
            ..Plugins::default()
        };
        markdown_to_html(text, &Options::default(), &plugins).unwrap()
    }

    #[test]
    fn test_plain_text_uses_theme_colors() {
        assert_eq!(
            render("```ts\nconst x: number = 42;\n```\n", "base16-ocean.dark"),
            "<pre style=\"background-color:#2b303b;\"><code class=\"language-ts\">\
             <span style=\"color:#c0c5ce;\">const x: number = 42;\n</span></code></pre>\n"
        );
    }

    #[test]
    fn test_known_language_is_tokenized() {
        let out = render("```rust\nfn main() { a < b }\n```\n", "InspiredGitHub");
        assert!(out.starts_with("<pre style=\"background-color:#ffffff;\">"), "{out}");
        assert!(out.matches("<span").count() > 1, "{out}");
        assert!(out.contains("&lt;"), "{out}");
    }

    #[test]
    fn test_unknown_theme() {
        let err = SyntaxHighlighterAdapter::with_theme("no-such-theme").unwrap_err();
        assert!(matches!(err, Error::UnknownTheme(ref name) if name == "no-such-theme"));
    }
}
