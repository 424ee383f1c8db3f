// src/flag.rs
//! Keyword flagging ("needs attention").

use std::collections::BTreeSet;

use crate::item::Item;

/// Flag `item` with every keyword found (case-insensitive substring) in its
/// title, description and category. Blank keywords are ignored.
pub fn apply_flags(mut item: Item, keywords: &[String]) -> Item {
    let searchable = format!(
        "{} {} {}",
        item.title,
        item.description,
        item.category.as_str()
    )
    .to_lowercase();

    let matched: BTreeSet<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && searchable.contains(&k.to_lowercase()))
        .map(str::to_string)
        .collect();

    if !matched.is_empty() {
        tracing::debug!(
            target: "pipeline",
            id = %item.id,
            matched = ?matched,
            "item flagged"
        );
    }
    item.flagged = !matched.is_empty();
    item.matched_keywords = matched;
    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Category, SourceKind};
    use chrono::NaiveDate;

    fn item(title: &str, description: &str) -> Item {
        let mut it = Item::new(
            "stpaul_permits:1".into(),
            SourceKind::StpaulPermits,
            title.into(),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
        );
        it.description = description.into();
        it.category = Category::Permit;
        it
    }

    fn kws(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn records_every_match() {
        let out = apply_flags(
            item("DEMOLITION permit", "Rezoning request and demolition of garage"),
            &kws(&["demolition", "rezoning", "variance"]),
        );
        assert!(out.flagged);
        assert_eq!(
            out.matched_keywords.iter().cloned().collect::<Vec<_>>(),
            vec!["demolition".to_string(), "rezoning".to_string()]
        );
    }

    #[test]
    fn category_is_searchable() {
        let out = apply_flags(item("Roof", ""), &kws(&["permit"]));
        assert!(out.flagged);
    }

    #[test]
    fn flags_are_recomputed_not_accumulated() {
        let mut it = item("Roof repair", "");
        it.flagged = true;
        it.matched_keywords.insert("stale".into());
        let out = apply_flags(it, &kws(&["demolition"]));
        assert!(!out.flagged);
        assert!(out.matched_keywords.is_empty());
    }

    #[test]
    fn blank_keywords_never_match() {
        let out = apply_flags(item("Roof repair", ""), &kws(&["", "  "]));
        assert!(!out.flagged);
    }
}
