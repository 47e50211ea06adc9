//! URL extraction from rendered plain bodies.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("url regex is valid")
    })
}

/// Extract http(s) URLs from a plain-text body, deduplicated preserving
/// first-seen order. Trailing sentence punctuation is trimmed.
pub fn extract_links(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for found in url_pattern().find_iter(body) {
        let url = found.as_str().trim_end_matches(['.', ',', ';', ':']);
        if seen.insert(url.to_string()) {
            links.push(url.to_string());
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_http_and_https() {
        let body = "See https://example.com/a and http://example.org/b for details";
        assert_eq!(
            extract_links(body),
            vec!["https://example.com/a", "http://example.org/b"]
        );
    }

    #[test]
    fn dedupes_preserving_first_seen_order() {
        let body = "https://b.com then https://a.com then https://b.com again";
        assert_eq!(extract_links(body), vec!["https://b.com", "https://a.com"]);
    }

    #[test]
    fn trims_trailing_punctuation() {
        let body = "Read https://example.com/post. Then reply.";
        assert_eq!(extract_links(body), vec!["https://example.com/post"]);
    }

    #[test]
    fn no_links_yields_empty() {
        assert!(extract_links("nothing to see here").is_empty());
    }

    #[test]
    fn stops_at_closing_bracket() {
        let body = "Link (https://example.com/page) inline";
        assert_eq!(extract_links(body), vec!["https://example.com/page"]);
    }
}
