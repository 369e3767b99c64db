use marksmith::{Options, Plugins, markdown_to_html};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct SpecTest {
    markdown: String,
    html: String,
    example: u32,
    section: String,
}

fn load(name: &str) -> Vec<SpecTest> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name);
    let data = fs::read_to_string(&path).expect("Failed to read fixture");
    serde_json::from_str(&data).expect("Failed to parse fixture")
}

/// Runs every example and fails listing each mismatch.
fn run_fixture(name: &str, options: &Options) {
    let tests = load(name);
    assert!(!tests.is_empty(), "{name} has no examples");

    let mut failures = Vec::new();
    for test in &tests {
        let result = markdown_to_html(&test.markdown, options, &Plugins::default())
            .expect("rendering never fails without plugins");
        if result != test.html {
            failures.push(format!(
                "example {} ({})\n  input:    {:?}\n  expected: {:?}\n  got:      {:?}",
                test.example, test.section, test.markdown, test.html, result
            ));
        }
    }

    assert!(
        failures.is_empty(),
        "{} of {} examples in {name} failed:\n{}",
        failures.len(),
        tests.len(),
        failures.join("\n")
    );
}

#[test]
fn commonmark_spec_tests() {
    let mut options = Options::default();
    options.render.unsafe_ = true;
    run_fixture("commonmark.json", &options);
}

#[test]
fn gfm_spec_tests() {
    let mut options = Options::gfm();
    options.render.unsafe_ = true;
    run_fixture("gfm.json", &options);
}
