//! Property-based tests over generated and arbitrary Markdown.

use marksmith::ast::{Ast, NodeValue};
use marksmith::{Options, Plugins, format_commonmark, format_html, format_xml, parse_document};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn all_extensions() -> Options {
    let mut options = Options::gfm();
    let ext = &mut options.extension;
    ext.superscript = true;
    ext.subscript = false;
    ext.footnotes = true;
    ext.inline_footnotes = true;
    ext.description_lists = true;
    ext.multiline_block_quotes = true;
    ext.alerts = true;
    ext.math_dollars = true;
    ext.math_code = true;
    ext.wikilinks_title_after_pipe = true;
    ext.underline = true;
    ext.subtext = true;
    ext.spoiler = true;
    ext.highlight = true;
    ext.header_ids = Some(String::new());
    ext.front_matter_delimiter = Some("---".to_string());
    options.parse.smart = true;
    options
}

fn commonmark(text: &str, options: &Options) -> String {
    let ast = parse_document(text, options).unwrap();
    format_commonmark(&ast, options, &Plugins::default()).unwrap()
}

/// Parent, child and sibling links agree with each other.
fn check_tree(ast: &Ast) {
    let Some(root) = ast.root() else {
        assert!(ast.is_empty());
        return;
    };
    assert!(matches!(ast[root].value, NodeValue::Document));
    assert_eq!(ast[root].parent, None);
    assert_eq!(ast[root].prev, None);
    assert_eq!(ast[root].next, None);

    for id in ast.descendants(root) {
        let node = &ast[id];
        let children: Vec<_> = ast.children(id).collect();
        assert_eq!(node.first_child, children.first().copied());
        assert_eq!(node.last_child, children.last().copied());
        for (i, &child) in children.iter().enumerate() {
            assert_eq!(ast[child].parent, Some(id));
            assert_eq!(ast[child].prev, i.checked_sub(1).map(|p| children[p]));
            assert_eq!(ast[child].next, children.get(i + 1).copied());
            if !node.value.is_block() {
                assert!(!ast[child].value.is_block(), "block inside inline node");
            }
        }
    }
}

fn word() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn words(max: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(word(), 1..max).prop_map(|w| w.join(" "))
}

fn block() -> impl Strategy<Value = String> {
    prop_oneof![
        (1..=3usize, words(5)).prop_map(|(level, text)| format!("{} {text}", "#".repeat(level))),
        words(12),
        (words(4), word(), words(4)).prop_map(|(a, b, c)| format!("{a} *{b}* {c}")),
        prop::collection::vec(words(4), 1..5).prop_map(|items| {
            items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")
        }),
        prop::collection::vec(words(4), 1..5).prop_map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(n, i)| format!("{}. {i}", n + 1))
                .collect::<Vec<_>>()
                .join("\n")
        }),
        words(6).prop_map(|text| format!("> {text}")),
    ]
}

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(block(), 1..8).prop_map(|blocks| blocks.join("\n\n") + "\n")
}

fn extension_options() -> Options {
    let mut options = Options::gfm();
    options.extension.description_lists = true;
    options
}

fn extension_block() -> impl Strategy<Value = String> {
    prop_oneof![
        block(),
        (words(4), word(), words(4)).prop_map(|(a, b, c)| format!("{a} ~~{b}~~ {c}")),
        (words(3), word()).prop_map(|(a, b)| format!("{a} www.{b}.com")),
        (word(), word(), word(), word())
            .prop_map(|(a, b, c, d)| format!("| {a} | {b} |\n| --- | --- |\n| {c} | {d} |")),
        prop::collection::vec((any::<bool>(), words(4)), 1..4).prop_map(|items| {
            items
                .iter()
                .map(|(done, text)| format!("- [{}] {text}", if *done { 'x' } else { ' ' }))
                .collect::<Vec<_>>()
                .join("\n")
        }),
        (words(3), words(6)).prop_map(|(term, details)| format!("{term}\n: {details}")),
    ]
}

fn extension_document() -> impl Strategy<Value = String> {
    prop::collection::vec(extension_block(), 1..8).prop_map(|blocks| blocks.join("\n\n") + "\n")
}

proptest! {
    #[test]
    fn arbitrary_input_never_fails(text in "[ \t\n>*_`#\\[\\]()!<>/+.0-9a-z|~^$=:\\\\-]{0,200}") {
        let options = all_extensions();
        let ast = parse_document(&text, &options).unwrap();
        check_tree(&ast);
        let plugins = Plugins::default();
        format_html(&ast, &options, &plugins).unwrap();
        format_xml(&ast, &options, &plugins).unwrap();
        format_commonmark(&ast, &options, &plugins).unwrap();
    }

    #[test]
    fn arbitrary_unicode_never_fails(text in any::<String>()) {
        let options = Options::default();
        let ast = parse_document(&text, &options).unwrap();
        check_tree(&ast);
        format_html(&ast, &options, &Plugins::default()).unwrap();
    }

    #[test]
    fn rendering_is_deterministic(text in document()) {
        let options = Options::default();
        let ast = parse_document(&text, &options).unwrap();
        let plugins = Plugins::default();
        prop_assert_eq!(
            format_html(&ast, &options, &plugins).unwrap(),
            format_html(&ast, &options, &plugins).unwrap()
        );
        let again = parse_document(&text, &options).unwrap();
        prop_assert_eq!(ast, again);
    }

    #[test]
    fn commonmark_output_is_a_fixed_point(text in document()) {
        let options = Options::default();
        let once = commonmark(&text, &options);
        let twice = commonmark(&once, &options);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn commonmark_output_with_extensions_is_a_fixed_point(text in extension_document()) {
        let options = extension_options();
        let once = commonmark(&text, &options);
        let twice = commonmark(&once, &options);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn list_tightness(items in prop::collection::vec((word(), any::<bool>()), 2..6)) {
        let mut text = String::new();
        for (i, (item, blank_after)) in items.iter().enumerate() {
            text.push_str(&format!("- {item}\n"));
            if *blank_after && i + 1 < items.len() {
                text.push('\n');
            }
        }
        let loose = items[..items.len() - 1].iter().any(|(_, blank)| *blank);
        let ast = parse_document(&text, &Options::default()).unwrap();
        let root = ast.root().unwrap();
        let list = ast.children(root).next().unwrap();
        match ast[list].value {
            NodeValue::List(nl) => prop_assert_eq!(nl.tight, !loose),
            ref other => prop_assert!(false, "expected a list, got {:?}", other),
        }
    }

    #[test]
    fn wrapped_lines_fit_the_width(text in words(40), width in 20..60usize) {
        let mut options = Options::default();
        options.render.width = width;
        let out = commonmark(&text, &options);
        for line in out.lines() {
            prop_assert!(line.chars().count() <= width, "{:?} exceeds {}", line, width);
        }
        let rendered: Vec<&str> = out.split_whitespace().collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        prop_assert_eq!(rendered, original);
    }
}
