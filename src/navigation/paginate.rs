//! Cursor arithmetic and repeat detection for paginated listings.

use std::collections::HashSet;
use std::hash::Hasher;

use anyhow::{anyhow, Result};
use url::Url;

use crate::strategy::CursorStyle;

/// Build the URL for `page` (1-based) from a listing URL and cursor rule.
///
/// Query cursors replace any existing value for the parameter; fragment
/// cursors overwrite the whole fragment, which is how flipbook-style viewers
/// address their pages.
pub fn page_url(base_url: &str, cursor: &CursorStyle, page: u64) -> Result<String> {
    let mut url = Url::parse(base_url).map_err(|e| anyhow!("invalid listing url: {e}"))?;
    match cursor {
        CursorStyle::QueryParam { name } => {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != name.as_str())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.set_query(None);
            {
                let mut pairs = url.query_pairs_mut();
                for (k, v) in &kept {
                    pairs.append_pair(k, v);
                }
                pairs.append_pair(name, &page.to_string());
            }
        }
        CursorStyle::Fragment { name } => {
            url.set_fragment(Some(&format!("{name}={page}")));
        }
    }
    Ok(url.to_string())
}

/// Remembers FNV fingerprints of page content so a cursor that stops
/// advancing (a site that serves its last page forever) ends the walk.
#[derive(Debug, Default)]
pub struct RepeatDetector {
    seen: HashSet<u64>,
}

impl RepeatDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `content`; `true` means it has not been seen before.
    pub fn insert(&mut self, content: &str) -> bool {
        self.seen.insert(fingerprint(content))
    }

    pub fn pages_seen(&self) -> usize {
        self.seen.len()
    }
}

fn fingerprint(content: &str) -> u64 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(content.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_cursor_replaces_its_own_parameter() {
        let cursor = CursorStyle::QueryParam {
            name: "page".to_string(),
        };
        let first = page_url("https://example.com/list?sort=new", &cursor, 1).unwrap();
        assert_eq!(first, "https://example.com/list?sort=new&page=1");

        let third = page_url(&first, &cursor, 3).unwrap();
        assert_eq!(third, "https://example.com/list?sort=new&page=3");
    }

    #[test]
    fn fragment_cursor_overwrites_the_fragment() {
        let cursor = CursorStyle::Fragment {
            name: "page".to_string(),
        };
        let url = page_url("https://fr.zone-secure.net/20412/2540033/#page=1", &cursor, 7).unwrap();
        assert_eq!(url, "https://fr.zone-secure.net/20412/2540033/#page=7");
    }

    #[test]
    fn repeat_detector_flags_previously_seen_content() {
        let mut detector = RepeatDetector::new();
        assert!(detector.insert("<html>page one</html>"));
        assert!(detector.insert("<html>page two</html>"));
        assert!(!detector.insert("<html>page one</html>"));
        assert_eq!(detector.pages_seen(), 2);
    }
}
