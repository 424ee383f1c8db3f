// src/item.rs
//! The canonical item every source record is reduced to.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Adapter family an item came from.
///
/// Variants are kept in alphabetical order of their tags so the derived `Ord`
/// agrees with ordering by `as_str()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Granicus,
    Legistar,
    Mndot,
    RamseyCounty,
    StpaulPermits,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Granicus,
        SourceKind::Legistar,
        SourceKind::Mndot,
        SourceKind::RamseyCounty,
        SourceKind::StpaulPermits,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Granicus => "granicus",
            SourceKind::Legistar => "legistar",
            SourceKind::Mndot => "mndot",
            SourceKind::RamseyCounty => "ramsey_county",
            SourceKind::StpaulPermits => "stpaul_permits",
        }
    }

    /// Human label used when the config does not provide one.
    pub fn default_label(self) -> &'static str {
        match self {
            SourceKind::Granicus => "Saint Paul Planning Commission",
            SourceKind::Legistar => "Saint Paul Legistar",
            SourceKind::Mndot => "MnDOT / Metro Transit",
            SourceKind::RamseyCounty => "Ramsey County",
            SourceKind::StpaulPermits => "Saint Paul DSI",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = SourceKind::ALL.iter().map(|k| k.as_str()).collect();
                Error::config(format!(
                    "unknown source '{}'. Known sources: {}",
                    s.trim(),
                    known.join(", ")
                ))
            })
    }
}

/// Coarse classification, decided by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Permit,
    Hearing,
    Road,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Permit => "permit",
            Category::Hearing => "hearing",
            Category::Road => "road",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub source: SourceKind,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub location_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    pub url: String,
    pub category: Category,
    #[serde(default)]
    pub in_scope: bool,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub matched_keywords: BTreeSet<String>,
    /// Filled in by the merge step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<NaiveDate>,
    #[serde(default)]
    pub is_new: bool,
}

impl Item {
    /// Fresh, unfiltered, unflagged item. Pipeline stages fill in the rest.
    pub fn new(id: String, source: SourceKind, title: String, date: NaiveDate) -> Self {
        Self {
            id,
            source,
            title,
            description: String::new(),
            date,
            location_text: String::new(),
            zip_code: None,
            url: String::new(),
            category: Category::Other,
            in_scope: false,
            flagged: false,
            matched_keywords: BTreeSet::new(),
            first_seen: None,
            is_new: false,
        }
    }
}

/// Identity from a source-native key, e.g. `stpaul_permits:PR-2024-001`.
pub fn native_id(source: SourceKind, key: &str) -> String {
    format!("{}:{}", source.as_str(), key.trim())
}

/// Identity for records without a native key: a short digest of the
/// normalized title, the date and the source. The `#` separator keeps these
/// apart from native-key ids.
pub fn hashed_id(source: SourceKind, title: &str, date: NaiveDate) -> String {
    digest_id(source, &[title, &date.format("%Y-%m-%d").to_string()])
}

/// Digest identity over arbitrary key parts, for records whose date moves
/// between runs (an ongoing project listed on the day it was seen).
pub fn digest_id(source: SourceKind, parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    for part in parts {
        hasher.update([0u8]);
        hasher.update(part.trim().to_lowercase().as_bytes());
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    format!("{}#{}", source.as_str(), out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn source_kind_parses_case_insensitively() {
        assert_eq!("Granicus".parse::<SourceKind>().unwrap(), SourceKind::Granicus);
        assert_eq!(
            " stpaul_permits ".parse::<SourceKind>().unwrap(),
            SourceKind::StpaulPermits
        );
        assert_eq!("ramsey_county".parse::<SourceKind>().unwrap(), SourceKind::RamseyCounty);
        assert!(matches!(
            "stpaul_planning".parse::<SourceKind>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn derived_order_matches_tag_order() {
        let mut by_ord = SourceKind::ALL.to_vec();
        by_ord.sort();
        let mut by_tag = SourceKind::ALL.to_vec();
        by_tag.sort_by_key(|k| k.as_str());
        assert_eq!(by_ord, by_tag);
    }

    #[test]
    fn hashed_id_ignores_case_and_padding() {
        let a = hashed_id(SourceKind::Legistar, "City Council", d("2026-03-04"));
        let b = hashed_id(SourceKind::Legistar, "  city council ", d("2026-03-04"));
        assert_eq!(a, b);
        assert!(a.starts_with("legistar#"));
    }

    #[test]
    fn hashed_id_separates_dates_and_sources() {
        let base = hashed_id(SourceKind::Legistar, "City Council", d("2026-03-04"));
        assert_ne!(
            base,
            hashed_id(SourceKind::Legistar, "City Council", d("2026-03-05"))
        );
        assert_ne!(
            base,
            hashed_id(SourceKind::Granicus, "City Council", d("2026-03-04"))
        );
    }

    #[test]
    fn digest_id_is_date_free() {
        let a = digest_id(SourceKind::Mndot, &["mndot_project", "I-94 resurfacing"]);
        let b = digest_id(SourceKind::Mndot, &["mndot_project", " i-94 RESURFACING"]);
        assert_eq!(a, b);
        assert!(a.starts_with("mndot#"));
        assert_ne!(a, digest_id(SourceKind::RamseyCounty, &["mndot_project", "I-94 resurfacing"]));
    }

    #[test]
    fn native_id_is_source_qualified() {
        assert_eq!(
            native_id(SourceKind::StpaulPermits, " 20-123 "),
            "stpaul_permits:20-123"
        );
    }
}
