pub mod config;
pub mod config_hash;
pub mod error;
pub mod patterns;
pub mod types;
pub mod url_normalize;

pub use config::SusConfig;
pub use config_hash::{compute_config_hash, compute_content_hash};
pub use error::{CrawlError, ErrorKind};
pub use patterns::PatternMatcher;
pub use types::*;
pub use url_normalize::normalize;
