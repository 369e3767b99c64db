//! Error types.

/// Error returned by a user-supplied callback.
pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that abort a parse, render or CLI invocation.
///
/// Malformed Markdown is never an error: it degrades to literal text.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A callback from [`crate::Options`] or [`crate::Plugins`] failed.
    #[error("{plugin} failed: {source}")]
    Plugin {
        /// Name of the callback, e.g. `broken_link_callback`.
        plugin: &'static str,
        /// Error returned by the callback.
        #[source]
        source: PluginError,
    },

    /// Reading input or configuration failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be decoded.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// No bundled highlighting theme has this name.
    #[cfg(feature = "syntect")]
    #[error("unknown highlighting theme `{0}`")]
    UnknownTheme(String),
}

impl Error {
    pub(crate) fn plugin(plugin: &'static str, source: PluginError) -> Self {
        Error::Plugin { plugin, source }
    }
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
