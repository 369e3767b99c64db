//! marksmith CLI.
//!
//! Reads Markdown from a file or stdin and writes HTML, CommonMark XML,
//! normalized CommonMark, or the parsed tree as JSON.

use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use marksmith::{Error, Options, Plugins};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Html,
    Xml,
    Commonmark,
}

/// Render Markdown as HTML, XML or CommonMark.
#[derive(Parser)]
#[command(name = "marksmith", version, about)]
struct Cli {
    /// Input file. Reads stdin when omitted.
    file: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = Format::Html)]
    format: Format,

    /// JSON options file; unspecified fields keep their defaults.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Wrap CommonMark output at this column.
    #[arg(long)]
    width: Option<usize>,

    /// Pass raw HTML and dangerous URLs through.
    #[arg(long = "unsafe")]
    unsafe_: bool,

    /// Enable the GitHub Flavored Markdown extensions.
    #[arg(long)]
    gfm: bool,

    /// Annotate output with source positions.
    #[arg(long)]
    sourcepos: bool,

    /// Print the parsed tree as JSON instead of rendering it.
    #[arg(long)]
    ast: bool,

    /// Highlight fenced code with a bundled syntect theme.
    #[cfg(feature = "syntect")]
    #[arg(long, value_name = "THEME")]
    syntax_highlighting: Option<String>,
}

impl Cli {
    fn options(&self) -> Result<Options, Error> {
        let mut options: Options = match &self.config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => Options::default(),
        };
        if self.gfm {
            options.enable_gfm();
        }
        if let Some(width) = self.width {
            options.render.width = width;
        }
        options.render.unsafe_ |= self.unsafe_;
        options.render.sourcepos |= self.sourcepos;
        Ok(options)
    }

    fn input(&self) -> Result<Vec<u8>, Error> {
        match &self.file {
            Some(path) => Ok(std::fs::read(path)?),
            None => {
                let mut buf = Vec::new();
                io::stdin().read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }

    fn plugins(&self) -> Result<Plugins, Error> {
        #[cfg_attr(not(feature = "syntect"), allow(unused_mut))]
        let mut plugins = Plugins::default();
        #[cfg(feature = "syntect")]
        if let Some(theme) = &self.syntax_highlighting {
            plugins.codefence_syntax_highlighter =
                Some(marksmith::options::SyntaxHighlighterAdapter::with_theme(theme)?);
        }
        Ok(plugins)
    }

    fn run(&self) -> Result<String, Error> {
        let options = self.options()?;
        tracing::debug!(?options, "resolved options");
        let ast = marksmith::parse_document_bytes(&self.input()?, &options)?;
        if self.ast {
            let mut json = serde_json::to_string_pretty(&ast)?;
            json.push('\n');
            return Ok(json);
        }
        let plugins = self.plugins()?;
        match self.format {
            Format::Html => marksmith::format_html(&ast, &options, &plugins),
            Format::Xml => marksmith::format_xml(&ast, &options, &plugins),
            Format::Commonmark => marksmith::format_commonmark(&ast, &options, &plugins),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match cli.run() {
        Ok(output) => print!("{output}"),
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    #[test]
    fn test_gfm_flag_matches_gfm_options() {
        let cli = Cli::parse_from(["marksmith", "--gfm", "--width", "30"]);
        let options = cli.options().unwrap();
        let gfm = Options::gfm();
        assert_eq!(options.extension, gfm.extension);
        assert!(options.render.github_pre_lang);
        assert_eq!(options.render.width, 30);
    }

    #[test]
    fn test_gfm_flag_keeps_config_extensions() {
        let path = std::env::temp_dir().join(format!("marksmith-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"extension": {"footnotes": true}}"#).unwrap();
        let cli = Cli::parse_from([
            OsStr::new("marksmith"),
            OsStr::new("--gfm"),
            OsStr::new("--config"),
            path.as_os_str(),
        ]);
        let options = cli.options().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(options.extension.footnotes);
        assert!(options.extension.table);
    }
}
