// src/geo.rs
//! Geographic scope: neighborhood/corridor text matching OR ZIP matching.

use regex::Regex;
use std::collections::BTreeSet;

use crate::config::{GeoTerm, MatchMode};
use crate::item::Item;

/// Immutable geo criteria handed to the filter.
#[derive(Debug, Clone, Default)]
pub struct GeoConfig {
    pub neighborhoods: Vec<GeoTerm>,
    pub corridors: Vec<GeoTerm>,
    pub zip_codes: BTreeSet<String>,
    pub search_title_and_description: bool,
}

#[derive(Debug)]
enum CompiledTerm {
    Token(Regex),
    Substring(String),
}

impl CompiledTerm {
    fn compile(term: &GeoTerm) -> Self {
        match term.mode {
            MatchMode::Substring => CompiledTerm::Substring(term.name.to_lowercase()),
            MatchMode::Token => {
                // Internal whitespace matches any run of whitespace; the name
                // must not be glued to another word character on either side.
                let body = term
                    .name
                    .split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+");
                let pattern = format!(r"(?i)(?:^|[^\w]){body}(?:[^\w]|$)");
                // Escaped input always yields a valid pattern.
                CompiledTerm::Token(Regex::new(&pattern).expect("escaped geo term regex"))
            }
        }
    }

    fn matches(&self, text: &str) -> bool {
        match self {
            CompiledTerm::Token(re) => re.is_match(text),
            CompiledTerm::Substring(needle) => text.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// Geo filter with its terms compiled once per run.
#[derive(Debug)]
pub struct GeoMatcher {
    terms: Vec<(String, CompiledTerm)>,
    zip_codes: BTreeSet<String>,
    search_title_and_description: bool,
}

impl GeoMatcher {
    pub fn new(cfg: &GeoConfig) -> Self {
        let terms = cfg
            .neighborhoods
            .iter()
            .chain(cfg.corridors.iter())
            .filter(|t| !t.name.trim().is_empty())
            .map(|t| (t.name.clone(), CompiledTerm::compile(t)))
            .collect();
        Self {
            terms,
            zip_codes: cfg.zip_codes.clone(),
            search_title_and_description: cfg.search_title_and_description,
        }
    }

    /// True when the item's ZIP or location text places it in the area.
    ///
    /// Items with neither location text nor ZIP are out of scope even if
    /// their title mentions a neighborhood.
    pub fn is_in_scope(&self, item: &Item) -> bool {
        let location = item.location_text.trim();
        let zip = item.zip_code.as_deref().map(str::trim).unwrap_or_default();
        if location.is_empty() && zip.is_empty() {
            return false;
        }
        self.zip_matches(zip) || self.matched_term(item).is_some()
    }

    fn zip_matches(&self, zip: &str) -> bool {
        if zip.is_empty() {
            return false;
        }
        // ZIP+4 compares on its 5-digit prefix.
        let five: String = zip.chars().take(5).collect();
        self.zip_codes.contains(&five)
    }

    /// First configured term found in the item's searchable text.
    pub fn matched_term(&self, item: &Item) -> Option<&str> {
        let location = item.location_text.trim();
        let mut fields: Vec<&str> = Vec::with_capacity(3);
        if !location.is_empty() {
            fields.push(location);
        }
        if self.search_title_and_description {
            fields.push(&item.title);
            fields.push(&item.description);
        }
        self.terms
            .iter()
            .find(|(_, t)| fields.iter().any(|f| t.matches(f)))
            .map(|(name, _)| name.as_str())
    }
}

/// One-shot form of [`GeoMatcher::is_in_scope`].
pub fn is_in_scope(item: &Item, geo: &GeoConfig) -> bool {
    GeoMatcher::new(geo).is_in_scope(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::SourceKind;
    use chrono::NaiveDate;

    fn item(location: &str, zip: Option<&str>) -> Item {
        let mut it = Item::new(
            "legistar:x".into(),
            SourceKind::Legistar,
            "Meeting".into(),
            NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
        );
        it.location_text = location.into();
        it.zip_code = zip.map(str::to_string);
        it
    }

    fn geo() -> GeoConfig {
        GeoConfig {
            neighborhoods: vec![
                GeoTerm::token("University"),
                GeoTerm::substring("Frogtown"),
            ],
            corridors: vec![GeoTerm::token("Selby Avenue")],
            zip_codes: ["55104".to_string()].into_iter().collect(),
            search_title_and_description: false,
        }
    }

    #[test]
    fn token_terms_need_word_boundaries() {
        let m = GeoMatcher::new(&geo());
        assert!(m.is_in_scope(&item("1400 University Ave W", None)));
        assert!(!m.is_in_scope(&item("Universityville Plaza", None)));
    }

    #[test]
    fn substring_terms_match_inside_words() {
        let m = GeoMatcher::new(&geo());
        assert!(m.is_in_scope(&item("Greater FROGTOWN area", None)));
        assert!(m.is_in_scope(&item("frogtownsquare", None)));
    }

    #[test]
    fn multi_word_terms_tolerate_extra_whitespace() {
        let m = GeoMatcher::new(&geo());
        assert!(m.is_in_scope(&item("820 selby\n avenue", None)));
    }

    #[test]
    fn zip_plus_four_matches_on_prefix() {
        let m = GeoMatcher::new(&geo());
        assert!(m.is_in_scope(&item("", Some("55104-2231"))));
        assert!(!m.is_in_scope(&item("", Some("55101"))));
    }

    #[test]
    fn empty_location_and_zip_fail_closed() {
        let mut cfg = geo();
        cfg.search_title_and_description = true;
        let m = GeoMatcher::new(&cfg);
        let mut it = item("  ", None);
        it.title = "Selby Avenue reconstruction".into();
        assert!(!m.is_in_scope(&it));
    }

    #[test]
    fn title_search_is_optional() {
        let mut it = item("Saint Paul", None);
        it.description = "Hearing on Selby Avenue streetscape".into();
        assert!(!GeoMatcher::new(&geo()).is_in_scope(&it));

        let mut cfg = geo();
        cfg.search_title_and_description = true;
        assert!(GeoMatcher::new(&cfg).is_in_scope(&it));
        assert_eq!(GeoMatcher::new(&cfg).matched_term(&it), Some("Selby Avenue"));
    }

    #[test]
    fn regex_metacharacters_in_names_are_literal() {
        let cfg = GeoConfig {
            neighborhoods: vec![GeoTerm::token("St. Anthony (Park)")],
            ..GeoConfig::default()
        };
        let m = GeoMatcher::new(&cfg);
        assert!(m.is_in_scope(&item("near St. Anthony (Park) library", None)));
        assert!(!m.is_in_scope(&item("StX Anthony Park", None)));
    }
}
