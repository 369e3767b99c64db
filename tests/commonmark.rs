use marksmith::{Options, Plugins, markdown_to_commonmark, markdown_to_html};
use pretty_assertions::assert_eq;

fn commonmark(text: &str, options: &Options) -> String {
    markdown_to_commonmark(text, options, &Plugins::default()).unwrap()
}

fn html(text: &str, options: &Options) -> String {
    markdown_to_html(text, options, &Plugins::default()).unwrap()
}

/// Re-parsing the CommonMark output gives the same HTML as the input.
fn assert_preserves_html(text: &str, options: &Options) {
    let rendered = commonmark(text, options);
    assert_eq!(html(&rendered, options), html(text, options), "via {rendered:?}");
}

#[test]
fn normalizes_block_syntax() {
    let options = Options::default();
    assert_eq!(
        commonmark("Setext\n------\n\n* a\n* b\n\n***\n", &options),
        "## Setext\n\n- a\n- b\n\n-----\n"
    );
}

#[test]
fn nested_containers() {
    let options = Options::default();
    assert_eq!(
        commonmark("> - a\n>   - b\n> - c\n", &options),
        "> - a\n>   - b\n> - c\n"
    );
}

#[test]
fn emphasis_and_links() {
    let options = Options::default();
    assert_eq!(
        commonmark("*a **b** c* [x](<a b> 'T')\n", &options),
        "*a **b** c* [x](a%20b \"T\")\n"
    );
}

#[test]
fn fence_longer_than_content_backticks() {
    let options = Options::default();
    assert_eq!(
        commonmark("````text\n```\n````\n", &options),
        "````text\n```\n````\n"
    );
}

#[test]
fn empty_input() {
    assert_eq!(commonmark("", &Options::default()), "");
}

#[test]
fn tables_round_trip() {
    let mut options = Options::default();
    options.extension.table = true;
    assert_eq!(
        commonmark("a|b\n:-|-:\nc|d\n", &options),
        "| a | b |\n| :-- | --: |\n| c | d |\n"
    );
}

#[test]
fn task_items() {
    let mut options = Options::default();
    options.extension.tasklist = true;
    assert_eq!(commonmark("- [x] done\n- [ ] todo\n", &options), "- [x] done\n- [ ] todo\n");
}

#[test]
fn html_is_preserved() {
    let documents = [
        "# Title\n\nSome *emphasis*, **strong** and `code`.\n",
        "1. one\n2. two\n\n   continued\n3. three\n",
        "> quote\n>\n> > nested\n",
        "```rust\nfn main() {}\n```\n\n    indented\n",
        "Text with \\* stars \\* and \\_underscores\\_.\n",
        "[ref]\n\n[ref]: /url \"title\"\n",
        "<div>\nraw\n</div>\n\nafter\n",
        "line one\\\nline two\n",
        "#hashtag and 3. not a list\n",
    ];
    let options = Options::default();
    for text in documents {
        assert_preserves_html(text, &options);
    }
}

#[test]
fn extensions_are_preserved() {
    let mut options = Options::gfm();
    options.extension.footnotes = true;
    options.extension.superscript = true;
    let documents = [
        "~~gone~~ and www.example.com\n",
        "| x | y |\n| --- | --- |\n| 1 | 2 |\n",
        "Note[^a].\n\n[^a]: Footnote text.\n",
        "e = mc^2^\n",
    ];
    for text in documents {
        assert_preserves_html(text, &options);
    }
}

#[test]
fn minimized_escapes() {
    let text = "snake_case and a ] bracket!\n";
    let mut options = Options::default();
    assert_eq!(commonmark(text, &options), "snake\\_case and a \\] bracket\\!\n");
    options.render.experimental_minimize_commonmark = true;
    assert_eq!(commonmark(text, &options), "snake_case and a ] bracket!\n");
    assert_preserves_html(text, &options);
}

#[test]
fn prefer_fenced_code_blocks() {
    let mut options = Options::default();
    assert_eq!(commonmark("para\n\n    code\n", &options), "para\n\n    code\n");
    options.render.prefer_fenced = true;
    assert_eq!(commonmark("para\n\n    code\n", &options), "para\n\n```\ncode\n```\n");
    assert_preserves_html("para\n\n    code\n", &options);
}

#[test]
fn description_lists_keep_their_tightness() {
    let mut options = Options::default();
    options.extension.description_lists = true;
    assert_eq!(commonmark("Term\n: Details\n", &options), "Term\n: Details\n");
    assert_eq!(commonmark("Term\n\n: Details\n", &options), "Term\n\n: Details\n");
    assert_preserves_html("Term\n: Details\n\nOther\n\n: More\n", &options);
}
