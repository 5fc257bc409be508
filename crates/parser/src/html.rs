use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use sus_core::{normalize, AssetType, ExtractedAsset};

const DEFAULT_LINK_SELECTOR: &str = "a[href]";

/// Resolves the effective base URL for a document: an in-document
/// `<base href>` wins over `fallback_base` when present (spec.md §4.2).
/// When multiple `<base>` tags exist, the first one in document order wins.
fn resolve_base(document: &Html, fallback_base: &Url) -> Url {
    let Ok(sel) = Selector::parse("base[href]") else { return fallback_base.clone() };
    let Some(href) = document.select(&sel).next().and_then(|el| el.value().attr("href")) else {
        return fallback_base.clone();
    };
    if href.trim().is_empty() {
        return fallback_base.clone();
    }
    fallback_base.join(href).unwrap_or_else(|_| fallback_base.clone())
}

fn is_crawlable_scheme(href: &str) -> bool {
    let trimmed = href.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return false;
    }
    let lower = trimmed.to_ascii_lowercase();
    !(lower.starts_with("mailto:")
        || lower.starts_with("javascript:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:"))
}

/// Extracts and normalizes every link matched by `selectors` (default
/// `a[href]` when empty), resolved against the document's effective base.
/// Malformed HTML never raises — `scraper` already tolerates it, yielding
/// an empty result rather than an error.
pub fn extract_links(html: &str, fallback_base: &Url, selectors: &[String]) -> HashSet<String> {
    let document = Html::parse_document(html);
    let base = resolve_base(&document, fallback_base);
    let selector_strs: Vec<&str> = if selectors.is_empty() {
        vec![DEFAULT_LINK_SELECTOR]
    } else {
        selectors.iter().map(String::as_str).collect()
    };

    let mut links = HashSet::new();
    for sel_str in selector_strs {
        let Ok(sel) = Selector::parse(sel_str) else { continue };
        for el in document.select(&sel) {
            let Some(href) = el.value().attr("href").or_else(|| el.value().attr("src")) else {
                continue;
            };
            if !is_crawlable_scheme(href) {
                continue;
            }
            let Ok(resolved) = base.join(href) else { continue };
            if resolved.scheme() != "http" && resolved.scheme() != "https" {
                continue;
            }
            if let Ok(normalized) = normalize(resolved.as_str()) {
                links.insert(normalized);
            }
        }
    }
    links
}

fn selector_for(kind: AssetType) -> &'static [&'static str] {
    match kind {
        AssetType::Images => &["img[src]", "source[srcset]"],
        AssetType::Css => &["link[rel='stylesheet'][href]"],
        AssetType::Js => &["script[src]"],
        AssetType::Fonts => &["link[rel='preload'][as='font'][href]", "link[rel='font'][href]"],
    }
}

/// Extracts asset URLs (images, stylesheets, scripts, fonts), classified by
/// kind, resolved against the document's effective base and normalized.
pub fn extract_assets(html: &str, fallback_base: &Url, enabled: &[AssetType]) -> Vec<ExtractedAsset> {
    let document = Html::parse_document(html);
    let base = resolve_base(&document, fallback_base);

    let mut seen = HashSet::new();
    let mut assets = Vec::new();
    for &kind in enabled {
        for sel_str in selector_for(kind) {
            let Ok(sel) = Selector::parse(sel_str) else { continue };
            for el in document.select(&sel) {
                let raw = el
                    .value()
                    .attr("src")
                    .or_else(|| el.value().attr("href"))
                    .or_else(|| el.value().attr("srcset").and_then(|s| s.split(',').next()).map(|s| s.trim().split(' ').next().unwrap_or(s)));
                let Some(raw) = raw else { continue };
                if !is_crawlable_scheme(raw) {
                    continue;
                }
                let Ok(resolved) = base.join(raw) else { continue };
                if resolved.scheme() != "http" && resolved.scheme() != "https" {
                    continue;
                }
                let Ok(normalized) = normalize(resolved.as_str()) else { continue };
                if seen.insert(normalized.clone()) {
                    assets.push(ExtractedAsset { url: normalized, kind });
                }
            }
        }
    }
    assets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn extracts_absolute_and_relative_links() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="https://other.com/page">Other</a>
        </body></html>"#;
        let links = extract_links(html, &url("https://example.com/start"), &[]);
        assert!(links.contains("https://example.com/about"));
        assert!(links.contains("https://other.com/page"));
    }

    #[test]
    fn drops_non_crawlable_schemes() {
        let html = r#"<html><body>
            <a href="mailto:a@b.com">Mail</a>
            <a href="javascript:void(0)">JS</a>
            <a href="tel:+1234567890">Tel</a>
            <a href="data:text/plain;base64,aGVsbG8=">Data</a>
            <a href="#section">Fragment</a>
        </body></html>"#;
        let links = extract_links(html, &url("https://example.com/"), &[]);
        assert!(links.is_empty());
    }

    #[test]
    fn base_tag_overrides_fallback_base() {
        let html = r#"<html><head><base href="https://cdn.example.com/"></head>
            <body><a href="assets/style.css">Stylesheet</a></body></html>"#;
        let links = extract_links(html, &url("https://example.com/page"), &[]);
        assert!(links.contains("https://cdn.example.com/assets/style.css"));
        assert!(!links.contains("https://example.com/assets/style.css"));
    }

    #[test]
    fn relative_base_tag_resolves_against_fallback() {
        let html = r#"<html><head><base href="/cdn/"></head>
            <body><a href="assets/style.css">Stylesheet</a></body></html>"#;
        let links = extract_links(html, &url("https://example.com/docs/page"), &[]);
        assert!(links.contains("https://example.com/cdn/assets/style.css"));
    }

    #[test]
    fn first_base_tag_wins_when_multiple_present() {
        let html = r#"<html><head>
            <base href="https://first.example.com/">
            <base href="https://second.example.com/">
            </head><body><a href="x">X</a></body></html>"#;
        let links = extract_links(html, &url("https://example.com/"), &[]);
        assert!(links.contains("https://first.example.com/x"));
    }

    #[test]
    fn malformed_html_yields_no_links_without_panicking() {
        let html = "<html><body><a href=\"/a\"><div><span></a></body>";
        let links = extract_links(html, &url("https://example.com/"), &[]);
        assert!(links.contains("https://example.com/a"));
    }

    #[test]
    fn custom_selectors_are_honored() {
        let html = r#"<html><body><area href="/map-target"></body></html>"#;
        let links = extract_links(html, &url("https://example.com/"), &["area[href]".to_string()]);
        assert!(links.contains("https://example.com/map-target"));
    }

    #[test]
    fn extracts_assets_by_kind() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
            <script src="/app.js"></script>
            </head><body><img src="/logo.png"></body></html>"#;
        let assets = extract_assets(&html, &url("https://example.com/"), &[AssetType::Css, AssetType::Js, AssetType::Images]);
        assert!(assets.iter().any(|a| a.url == "https://example.com/style.css" && a.kind == AssetType::Css));
        assert!(assets.iter().any(|a| a.url == "https://example.com/app.js" && a.kind == AssetType::Js));
        assert!(assets.iter().any(|a| a.url == "https://example.com/logo.png" && a.kind == AssetType::Images));
    }

    #[test]
    fn disabled_asset_kinds_are_skipped() {
        let html = r#"<html><body><img src="/logo.png"></body></html>"#;
        let assets = extract_assets(&html, &url("https://example.com/"), &[AssetType::Css]);
        assert!(assets.is_empty());
    }
}
