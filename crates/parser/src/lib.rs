//! HTML link and asset extraction (spec.md §4.2).
//!
//! `scraper`-based extraction covering exactly what the crawl loop needs:
//! link and asset discovery with `<base>`-tag resolution.

pub mod html;

pub use html::{extract_assets, extract_links};
