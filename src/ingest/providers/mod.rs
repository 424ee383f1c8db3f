// src/ingest/providers/mod.rs
pub mod granicus;
pub mod legistar;
pub mod mndot;
pub mod ramsey_county;
pub mod socrata_permits;

/// Case-insensitive: does a link's text or target mention any of `words`?
/// `words` are expected in lower case.
pub(crate) fn mentions_any(text: &str, href: &str, words: &[&str]) -> bool {
    let text = text.to_lowercase();
    let href = href.to_lowercase();
    words.iter().any(|w| text.contains(w) || href.contains(w))
}

pub(crate) fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
