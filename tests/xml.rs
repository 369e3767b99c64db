use marksmith::{Options, Plugins, markdown_to_commonmark_xml};
use pretty_assertions::assert_eq;

const HEADER: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<!DOCTYPE document SYSTEM \"CommonMark.dtd\">\n",
);

fn xml(text: &str, options: &Options) -> String {
    markdown_to_commonmark_xml(text, options, &Plugins::default()).unwrap()
}

#[test]
fn list_attributes() {
    let out = xml("3. a\n4. b\n", &Options::default());
    assert_eq!(
        out,
        format!(
            "{HEADER}{}",
            concat!(
                "<document xmlns=\"http://commonmark.org/xml/1.0\">\n",
                "  <list type=\"ordered\" start=\"3\" delim=\"period\" tight=\"true\">\n",
                "    <item>\n",
                "      <paragraph>\n",
                "        <text xml:space=\"preserve\">a</text>\n",
                "      </paragraph>\n",
                "    </item>\n",
                "    <item>\n",
                "      <paragraph>\n",
                "        <text xml:space=\"preserve\">b</text>\n",
                "      </paragraph>\n",
                "    </item>\n",
                "  </list>\n",
                "</document>\n",
            )
        )
    );
}

#[test]
fn code_block_and_heading() {
    let out = xml("## Hi\n\n```rust\nlet x = 1 < 2;\n```\n", &Options::default());
    assert!(out.contains("  <heading level=\"2\">\n"), "{out}");
    assert!(
        out.contains("  <code_block info=\"rust\" xml:space=\"preserve\">let x = 1 &lt; 2;\n</code_block>\n"),
        "{out}"
    );
}

#[test]
fn links_and_breaks() {
    let out = xml("[a](/u \"t\")  \nb\n", &Options::default());
    assert!(out.contains("<link destination=\"/u\" title=\"t\">"), "{out}");
    assert!(out.contains("<linebreak />"), "{out}");
}

#[test]
fn sourcepos_on_every_element() {
    let mut options = Options::default();
    options.render.sourcepos = true;
    let out = xml("hi\n", &options);
    assert!(out.contains("<paragraph sourcepos=\"1:1-1:2\">"), "{out}");
    assert!(out.contains("<text sourcepos=\""), "{out}");
}

#[test]
fn raw_html_is_kept_when_unsafe() {
    let mut options = Options::default();
    options.render.unsafe_ = true;
    let out = xml("a <b>c</b>\n", &options);
    assert!(out.contains("<html_inline xml:space=\"preserve\">&lt;b&gt;</html_inline>"), "{out}");
}

#[test]
fn task_items_and_tables() {
    let mut options = Options::gfm();
    options.extension.tasklist = true;
    let out = xml("- [x] done\n\n| a |\n|:-:|\n", &options);
    assert!(out.contains("<taskitem completed=\"true\">"), "{out}");
    assert!(out.contains("<table alignments=\"center\">"), "{out}");
    assert!(out.contains("<table_row header=\"true\">"), "{out}");
}
