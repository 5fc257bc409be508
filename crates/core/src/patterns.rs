//! Include/exclude URL pattern matching (spec.md §6's `include_patterns` /
//! `exclude_patterns`, each `{pattern, type}`).
//!
//! Grounded on `danielchristiancazares-forge`'s use of `globset` alongside
//! `regex` for the same glob-or-regex split.

use globset::Glob;
use regex::Regex;

use crate::config::{PatternType, UrlPattern};

enum Compiled {
    Glob(globset::GlobMatcher),
    Regex(Regex),
}

impl Compiled {
    fn is_match(&self, url: &str) -> bool {
        match self {
            Compiled::Glob(m) => m.is_match(url),
            Compiled::Regex(r) => r.is_match(url),
        }
    }
}

/// A compiled set of `UrlPattern`s. Invalid patterns are dropped with a
/// warning rather than failing the whole crawl — one typo'd exclude pattern
/// shouldn't stop a run.
pub struct PatternMatcher {
    patterns: Vec<Compiled>,
}

impl PatternMatcher {
    pub fn compile(patterns: &[UrlPattern]) -> Self {
        let mut compiled = Vec::with_capacity(patterns.len());
        for p in patterns {
            match p.kind {
                PatternType::Glob => match Glob::new(&p.pattern) {
                    Ok(g) => compiled.push(Compiled::Glob(g.compile_matcher())),
                    Err(e) => tracing::warn!(pattern = %p.pattern, error = %e, "invalid glob pattern, ignoring"),
                },
                PatternType::Regex => match Regex::new(&p.pattern) {
                    Ok(r) => compiled.push(Compiled::Regex(r)),
                    Err(e) => tracing::warn!(pattern = %p.pattern, error = %e, "invalid regex pattern, ignoring"),
                },
            }
        }
        Self { patterns: compiled }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches_any(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(url))
    }
}
