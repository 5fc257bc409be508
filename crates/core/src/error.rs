use thiserror::Error;

/// Symbolic error kind, used as the crawl stats histogram key.
///
/// Variant names are load-bearing: they are the strings that show up in
/// `Stats::error_counts` and in `PluginError`/`CheckpointError` log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedScheme,
    RobotsBlocked,
    TooManyRedirects,
    FileTooLarge,
    Timeout,
    HttpError,
    ParseError,
    CheckpointError,
    PluginError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedScheme => "UnsupportedScheme",
            ErrorKind::RobotsBlocked => "RobotsBlocked",
            ErrorKind::TooManyRedirects => "TooManyRedirects",
            ErrorKind::FileTooLarge => "FileTooLarge",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::HttpError => "HttpError",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::CheckpointError => "CheckpointError",
            ErrorKind::PluginError => "PluginError",
        }
    }
}

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("robots.txt disallows fetch")]
    RobotsBlocked,

    #[error("too many redirects (max {max}) for {url}")]
    TooManyRedirects { url: String, max: u32 },

    #[error("content-length {size} exceeds limit {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("http error: {status} for {url}")]
    HttpError { url: String, status: u16 },

    #[error("transport error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("plugin error in {plugin}: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// Maps an error to the symbolic histogram key the scheduler counts it under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrawlError::UnsupportedScheme(_) => ErrorKind::UnsupportedScheme,
            CrawlError::RobotsBlocked => ErrorKind::RobotsBlocked,
            CrawlError::TooManyRedirects { .. } => ErrorKind::TooManyRedirects,
            CrawlError::FileTooLarge { .. } => ErrorKind::FileTooLarge,
            CrawlError::Timeout(_) => ErrorKind::Timeout,
            CrawlError::HttpError { .. } => ErrorKind::HttpError,
            CrawlError::Network(_) => ErrorKind::Timeout,
            CrawlError::Parse(_) => ErrorKind::ParseError,
            CrawlError::Checkpoint(_) => ErrorKind::CheckpointError,
            CrawlError::Plugin { .. } => ErrorKind::PluginError,
            CrawlError::Config(_) | CrawlError::InvalidUrl(_) | CrawlError::Other(_) => {
                ErrorKind::HttpError
            }
        }
    }
}
