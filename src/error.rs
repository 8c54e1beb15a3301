use thiserror::Error;

/// Classifies list fetch errors for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// HTTP request failed (connect, status, timeout)
    Http,
    /// Reading or writing the cache file failed
    Io,
    /// Content was fetched but the update callback rejected it
    Rejected,
}

/// Block-list error types
#[derive(Error, Debug)]
pub enum ListError {
    #[error("Parse error at line {line}: {message}")]
    ParseErrorAtLine { line: usize, message: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    #[error("Unsupported option: {0}")]
    UnsupportedOption(String),

    #[error("Fetch error: {message}")]
    FetchError {
        kind: FetchErrorKind,
        message: String,
    },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl ListError {
    pub(crate) fn fetch(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        ListError::FetchError {
            kind,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ListError>;
