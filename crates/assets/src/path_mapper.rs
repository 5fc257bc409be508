use std::path::{Path, PathBuf};

use url::Url;

/// Maps an absolute asset URL to a deterministic local path under the
/// configured assets directory, mirroring the URL's host and path so that
/// re-runs resolve to the same file (spec.md §4.9's "deterministic local
/// path", `output.path_mapping.strip_prefix` from spec.md §6).
#[derive(Debug, Clone)]
pub struct AssetPathMapper {
    assets_dir: PathBuf,
    strip_prefix: Option<String>,
}

impl AssetPathMapper {
    pub fn new(assets_dir: PathBuf, strip_prefix: Option<String>) -> Self {
        Self { assets_dir, strip_prefix }
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        let Ok(parsed) = Url::parse(url) else {
            return self.assets_dir.join(sanitize(url));
        };

        let host = parsed.host_str().unwrap_or("unknown-host");
        let mut path = parsed.path().trim_start_matches('/');
        if let Some(prefix) = &self.strip_prefix {
            path = path.strip_prefix(prefix.trim_start_matches('/')).unwrap_or(path);
        }
        if path.is_empty() || path.ends_with('/') {
            path = "index";
        }

        let sanitized_segments: Vec<String> = path.split('/').map(sanitize).collect();
        let mut full = self.assets_dir.join(host);
        for segment in sanitized_segments {
            full.push(segment);
        }
        full
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

impl AsRef<Path> for AssetPathMapper {
    fn as_ref(&self) -> &Path {
        &self.assets_dir
    }
}
