use std::sync::{Arc, Mutex};

use marksmith::ast::NodeValue;
use marksmith::options::{
    BrokenLinkReference, HeadingAdapter, ResolvedReference, SyntaxHighlighterAdapter,
};
use marksmith::{
    Ast, Error, Options, PluginError, Plugins, format_html, markdown_to_commonmark,
    markdown_to_html, parse_document, parse_document_bytes,
};
use pretty_assertions::assert_eq;

fn html(text: &str, options: &Options) -> String {
    markdown_to_html(text, options, &Plugins::default()).unwrap()
}

#[test]
fn heading_with_strong() {
    assert_eq!(
        html("# Hello, **world**!", &Options::default()),
        "<h1>Hello, <strong>world</strong>!</h1>\n"
    );
}

#[test]
fn www_autolink() {
    let mut options = Options::default();
    options.extension.autolink = true;
    let out = html("Hello www.github.com.\n", &options);
    assert!(out.contains("<a href=\"http://www.github.com\">www.github.com</a>"), "{out}");
    assert!(out.ends_with("</a>.</p>\n"), "{out}");
}

#[test]
fn autolinks_skip_code_and_links() {
    let mut options = Options::default();
    options.extension.autolink = true;
    assert_eq!(
        html("`www.a.com` [www.b.com](/x)\n", &options),
        "<p><code>www.a.com</code> <a href=\"/x\">www.b.com</a></p>\n"
    );
}

#[test]
fn relaxed_autolinks() {
    let mut options = Options::default();
    options.extension.autolink = true;
    options.parse.relaxed_autolinks = true;
    assert_eq!(
        html("[https://a.com]\n", &options),
        "<p>[<a href=\"https://a.com\">https://a.com</a>]</p>\n"
    );
    assert_eq!(
        html("See https://a.com.\n", &options),
        "<p>See <a href=\"https://a.com\">https://a.com</a>.</p>\n"
    );
    assert_eq!(
        html("(https://a.com)\n", &options),
        "<p>(<a href=\"https://a.com\">https://a.com</a>)</p>\n"
    );
    assert_eq!(
        html("Clone git+ssh://host.org/repo today\n", &options),
        "<p>Clone <a href=\"git+ssh://host.org/repo\">git+ssh://host.org/repo</a> today</p>\n"
    );

    options.parse.relaxed_autolinks = false;
    assert_eq!(html("git+ssh://host.org/repo\n", &options), "<p>git+ssh://host.org/repo</p>\n");
}

#[test]
fn task_list_items() {
    let mut options = Options::default();
    options.extension.tasklist = true;
    assert_eq!(
        html("* [x] Done\n* [ ] Not done\n", &options),
        concat!(
            "<ul>\n",
            "<li><input type=\"checkbox\" checked=\"\" disabled=\"\" /> Done</li>\n",
            "<li><input type=\"checkbox\" disabled=\"\" /> Not done</li>\n",
            "</ul>\n",
        )
    );
}

#[test]
fn task_list_classes() {
    let mut options = Options::default();
    options.extension.tasklist = true;
    options.render.tasklist_classes = true;
    let out = html("- [ ] a\n", &options);
    assert!(out.starts_with("<ul class=\"contains-task-list\">\n<li class=\"task-list-item\">"));
    assert!(out.contains("class=\"task-list-item-checkbox\""));
}

#[test]
fn footnote_reference_and_section() {
    let mut options = Options::default();
    options.extension.footnotes = true;
    assert_eq!(
        html("Hi[^x].\n\n[^x]: A greeting.\n", &options),
        concat!(
            "<p>Hi<sup class=\"footnote-ref\"><a href=\"#fn-x\" id=\"fnref-x\" data-footnote-ref>1</a></sup>.</p>\n",
            "<section class=\"footnotes\" data-footnotes>\n",
            "<ol>\n",
            "<li id=\"fn-x\">\n",
            "<p>A greeting. <a href=\"#fnref-x\" class=\"footnote-backref\" data-footnote-backref data-footnote-backref-idx=\"1\" aria-label=\"Back to reference 1\">\u{21a9}</a></p>\n",
            "</li>\n",
            "</ol>\n",
            "</section>\n",
        )
    );
}

#[test]
fn undefined_footnote_is_literal() {
    let mut options = Options::default();
    options.extension.footnotes = true;
    assert_eq!(html("a[^nope]\n", &options), "<p>a[^nope]</p>\n");
}

#[test]
fn unreferenced_footnote_definitions_are_dropped() {
    let mut options = Options::default();
    options.extension.footnotes = true;
    let out = html("text\n\n[^unused]: never cited\n", &options);
    assert_eq!(out, "<p>text</p>\n");
}

fn top_level_kinds(ast: &Ast) -> Vec<&'static str> {
    let Some(root) = ast.root() else {
        return Vec::new();
    };
    ast.children(root)
        .map(|id| match &ast[id].value {
            NodeValue::Paragraph => "paragraph",
            NodeValue::FootnoteDefinition(def) if def.total_references > 0 => "cited",
            NodeValue::FootnoteDefinition(_) => "uncited",
            _ => "other",
        })
        .collect()
}

#[test]
fn footnote_definitions_left_in_place() {
    let text = "a[^n]\n\n[^n]: note\n\nb\n\n[^unused]: never cited\n";
    let mut options = Options::default();
    options.extension.footnotes = true;

    let moved = parse_document(text, &options).unwrap();
    assert_eq!(top_level_kinds(&moved), ["paragraph", "paragraph", "cited"]);

    options.parse.leave_footnote_definitions = true;
    let kept = parse_document(text, &options).unwrap();
    assert_eq!(top_level_kinds(&kept), ["paragraph", "cited", "paragraph", "uncited"]);
}

#[test]
fn repeated_footnote_references() {
    let mut options = Options::default();
    options.extension.footnotes = true;
    let ast = parse_document("a[^n] b[^n]\n\n[^n]: note\n", &options).unwrap();
    let refs: Vec<(u32, u32)> = ast
        .nodes()
        .iter()
        .filter_map(|n| match &n.value {
            NodeValue::FootnoteReference(r) => Some((r.ix, r.ref_num)),
            _ => None,
        })
        .collect();
    assert_eq!(refs, vec![(1, 1), (1, 2)]);
    let total = ast.nodes().iter().find_map(|n| match &n.value {
        NodeValue::FootnoteDefinition(def) => Some(def.total_references),
        _ => None,
    });
    assert_eq!(total, Some(2));
}

#[test]
fn table_with_header_and_body() {
    let mut options = Options::default();
    options.extension.table = true;
    assert_eq!(
        html("| a | b |\n|---|---|\n| c | d |\n", &options),
        concat!(
            "<table>\n",
            "<thead>\n",
            "<tr>\n",
            "<th>a</th>\n",
            "<th>b</th>\n",
            "</tr>\n",
            "</thead>\n",
            "<tbody>\n",
            "<tr>\n",
            "<td>c</td>\n",
            "<td>d</td>\n",
            "</tr>\n",
            "</tbody>\n",
            "</table>\n",
        )
    );
}

#[test]
fn commonmark_width_bound() {
    let mut options = Options::default();
    options.render.width = 40;
    let text = "A very long paragraph that keeps going well past the configured \
                wrap width so that the renderer has to break it several times.\n";
    let out = markdown_to_commonmark(text, &options, &Plugins::default()).unwrap();
    for line in out.lines() {
        assert!(line.chars().count() <= 40, "line too long: {line:?}");
    }
    let words: Vec<&str> = out.split_whitespace().collect();
    let expected: Vec<&str> = text.split_whitespace().collect();
    assert_eq!(words, expected);
    assert!(out.lines().count() > 1);
}

#[test]
fn strikethrough_and_friends() {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.superscript = true;
    options.extension.highlight = true;
    options.extension.underline = true;
    assert_eq!(
        html("~~del~~ ^sup^ ==mark== __under__\n", &options),
        "<p><del>del</del> <sup>sup</sup> <mark>mark</mark> <u>under</u></p>\n"
    );
}

#[test]
fn spoilers() {
    let mut options = Options::default();
    options.extension.spoiler = true;
    assert_eq!(
        html("a ||secret|| b\n", &options),
        "<p>a <span class=\"spoiler\">secret</span> b</p>\n"
    );
}

#[test]
fn math_spans() {
    let mut options = Options::default();
    options.extension.math_dollars = true;
    options.extension.math_code = true;
    assert_eq!(
        html("$x^2$ and $`y`$\n", &options),
        "<p><span data-math-style=\"inline\">x^2</span> and <code data-math-style=\"inline\">y</code></p>\n"
    );
}

#[test]
fn wikilinks_in_both_orders() {
    let mut options = Options::default();
    options.extension.wikilinks_title_after_pipe = true;
    assert_eq!(
        html("[[Page|label]]\n", &options),
        "<p><a href=\"Page\" data-wikilink=\"true\">label</a></p>\n"
    );
    let mut options = Options::default();
    options.extension.wikilinks_title_before_pipe = true;
    assert_eq!(
        html("[[label|Page]]\n", &options),
        "<p><a href=\"Page\" data-wikilink=\"true\">label</a></p>\n"
    );
}

#[test]
fn alerts() {
    let mut options = Options::default();
    options.extension.alerts = true;
    let out = html("> [!NOTE]\n> Be careful.\n", &options);
    assert!(out.starts_with("<div class=\"markdown-alert markdown-alert-note\">\n"), "{out}");
    assert!(out.contains("<p class=\"markdown-alert-title\">Note</p>\n"), "{out}");
    assert!(out.contains("<p>Be careful.</p>\n"), "{out}");
    assert!(out.ends_with("</div>\n"), "{out}");
}

#[test]
fn front_matter_is_not_rendered_as_html() {
    let mut options = Options::default();
    options.extension.front_matter_delimiter = Some("---".to_string());
    let text = "---\ntitle: x\n---\n\n# Body\n";
    assert_eq!(html(text, &options), "<h1>Body</h1>\n");
    let cm = markdown_to_commonmark(text, &options, &Plugins::default()).unwrap();
    assert!(cm.starts_with("---\ntitle: x\n---\n"), "{cm}");
    assert!(cm.ends_with("# Body\n"), "{cm}");
}

#[test]
fn header_ids() {
    let mut options = Options::default();
    options.extension.header_ids = Some("user-content-".to_string());
    assert_eq!(
        html("# Hi there\n# Hi there\n", &options),
        concat!(
            "<h1><a href=\"#user-content-hi-there\" aria-hidden=\"true\" class=\"anchor\" id=\"user-content-hi-there\"></a>Hi there</h1>\n",
            "<h1><a href=\"#user-content-hi-there-1\" aria-hidden=\"true\" class=\"anchor\" id=\"user-content-hi-there-1\"></a>Hi there</h1>\n",
        )
    );
}

#[test]
fn broken_link_callback_resolves_references() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    let mut options = Options::default();
    options.parse.broken_link_callback = Some(Arc::new(
        move |reference: BrokenLinkReference<'_>| -> Result<Option<ResolvedReference>, PluginError> {
            record.lock().unwrap().push(reference.original.to_string());
            Ok((reference.normalized == "known").then(|| ResolvedReference {
                url: "/resolved".to_string(),
                title: String::new(),
            }))
        },
    ));
    assert_eq!(
        html("[Known] [other]\n", &options),
        "<p><a href=\"/resolved\">Known</a> [other]</p>\n"
    );
    assert_eq!(*seen.lock().unwrap(), vec!["Known", "other"]);
}

#[test]
fn failing_callback_aborts_parse() {
    let mut options = Options::default();
    options.parse.broken_link_callback = Some(Arc::new(
        |_: BrokenLinkReference<'_>| -> Result<Option<ResolvedReference>, PluginError> {
            Err("lookup failed".into())
        },
    ));
    let err = parse_document("[missing]\n", &options).unwrap_err();
    assert!(matches!(err, Error::Plugin { plugin: "broken_link_callback", .. }));
    assert_eq!(err.to_string(), "broken_link_callback failed: lookup failed");
}

fn proxy_link(url: &str) -> Result<String, PluginError> {
    Ok(format!("https://proxy/{url}"))
}

fn upgrade_image(url: &str) -> Result<String, PluginError> {
    Ok(url.replace("http:", "https:"))
}

#[test]
fn url_rewriters() {
    let mut options = Options::default();
    options.parse.link_url_rewriter = Some(Arc::new(proxy_link));
    options.parse.image_url_rewriter = Some(Arc::new(upgrade_image));
    assert_eq!(
        html("[a](/x) ![b](http://img/c.png)\n", &options),
        "<p><a href=\"https://proxy//x\">a</a> <img src=\"https://img/c.png\" alt=\"b\" /></p>\n"
    );
}

#[test]
fn rewriter_does_not_revive_dangerous_urls() {
    let mut options = Options::default();
    options.parse.link_url_rewriter = Some(Arc::new(proxy_link));
    assert_eq!(
        html("[a](javascript:alert(1))\n", &options),
        "<p><a href=\"\">a</a></p>\n"
    );
}

#[test]
fn heading_adapter() {
    let plugins = Plugins {
        heading_adapter: Some(HeadingAdapter::new(
            |meta, _| Ok(format!("<h{} data-text=\"{}\">", meta.level + 1, meta.content)),
            |meta| Ok(format!("</h{}>\n", meta.level + 1)),
        )),
        ..Plugins::default()
    };
    let out = markdown_to_html("## Title *here*\n", &Options::default(), &plugins).unwrap();
    assert_eq!(out, "<h3 data-text=\"Title here\">Title <em>here</em></h3>\n");
}

#[test]
fn syntax_highlighter() {
    let plugins = Plugins {
        codefence_syntax_highlighter: Some(
            SyntaxHighlighterAdapter::new(|code, lang| {
                Ok(format!("[{}:{}]", lang.unwrap_or("none"), code.trim_end()))
            })
            .with_pre(|_| Ok("<pre class=\"hl\">".to_string())),
        ),
        ..Plugins::default()
    };
    let out = markdown_to_html("```rust\nfn main() {}\n```\n", &Options::default(), &plugins).unwrap();
    assert_eq!(
        out,
        "<pre class=\"hl\"><code class=\"language-rust\">[rust:fn main() {}]</code></pre>\n"
    );
}

#[test]
fn failing_highlighter_is_reported() {
    let plugins = Plugins {
        codefence_syntax_highlighter: Some(SyntaxHighlighterAdapter::new(|_, _| {
            Err("no grammar".into())
        })),
        ..Plugins::default()
    };
    let err = markdown_to_html("```\nx\n```\n", &Options::default(), &plugins).unwrap_err();
    assert!(matches!(
        err,
        Error::Plugin {
            plugin: "codefence_syntax_highlighter",
            ..
        }
    ));
}

#[test]
fn description_lists() {
    let mut options = Options::default();
    options.extension.description_lists = true;
    assert_eq!(
        html("Term\n\n: Details\n", &options),
        "<dl>\n<dt>Term</dt>\n<dd>\n<p>Details</p>\n</dd>\n</dl>\n"
    );
}

#[test]
fn description_details_directly_below_term() {
    let mut options = Options::default();
    options.extension.description_lists = true;
    assert_eq!(
        html("Term\n: Details\n", &options),
        "<dl>\n<dt>Term</dt>\n<dd>Details</dd>\n</dl>\n"
    );
    for text in ["term\n: \n", "a\n:\tb\n", "z\n~ ", "- z\n  : d\n"] {
        assert!(html(text, &options).contains("<dt>"), "{text:?}");
    }
}

#[test]
fn description_details_after_reference_definition() {
    let mut options = Options::default();
    options.extension.description_lists = true;
    assert_eq!(html("[a]: /u\n: d\n", &options), "<p>: d</p>\n");
}

#[test]
fn escaped_char_spans() {
    let mut options = Options::default();
    assert_eq!(html("\\*a\\*\n", &options), "<p>*a*</p>\n");
    options.render.escaped_char_spans = true;
    assert_eq!(
        html("\\*a\\*\n", &options),
        "<p><span data-escaped-char>*</span>a<span data-escaped-char>*</span></p>\n"
    );
}

#[test]
fn invalid_utf8_input() {
    let options = Options::default();
    let ast = parse_document_bytes(b"caf\xe9 \x00x\n", &options).unwrap();
    assert_eq!(
        format_html(&ast, &options, &Plugins::default()).unwrap(),
        "<p>caf\u{fffd} \u{fffd}x</p>\n"
    );
}

#[test]
fn hardbreaks_option() {
    let mut options = Options::default();
    options.render.hardbreaks = true;
    assert_eq!(html("a\nb\n", &options), "<p>a<br />\nb</p>\n");
}

#[test]
fn smart_punctuation() {
    let mut options = Options::default();
    options.parse.smart = true;
    assert_eq!(
        html("\"Hi\" -- it's... done---ok\n", &options),
        "<p>\u{201c}Hi\u{201d} \u{2013} it\u{2019}s\u{2026} done\u{2014}ok</p>\n"
    );
}

#[test]
fn options_deserialize_from_partial_json() {
    let options: Options = serde_json::from_str(r#"{"extension": {"table": true}}"#).unwrap();
    assert!(options.extension.table);
    assert!(!options.extension.strikethrough);
    assert_eq!(options.parse.max_nesting_depth, 100);
}
