// src/merge.rs
//! Merge of this run's items with the persisted state.
//!
//! The canonical set is exactly what this run's adapters reported, minus
//! expired items. Ids known from earlier runs keep their `first_seen`; ids that
//! were not reported again are dropped. That rule cannot tell "resolved
//! upstream" apart from "adapter failed today": after an outage run the
//! source's items are gone from the state, and their `first_seen` restarts
//! when the source reports them again.
//!
//! Sources that were not run at all (a `--source` run) are different: their
//! persisted entries are carried over untouched by [`carry_forward`].

use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::item::{Item, SourceKind};
use crate::state::{PersistedItem, PersistedState};

/// Earliest item date still inside the age ceiling (inclusive).
pub fn age_cutoff(run_date: NaiveDate, max_age_days: u32) -> NaiveDate {
    run_date - Duration::days(i64::from(max_age_days))
}

/// Produce the canonical, ordered item set and the state to persist.
pub fn merge(
    current: Vec<Item>,
    persisted: &PersistedState,
    max_age_days: u32,
    run_date: NaiveDate,
) -> (Vec<Item>, PersistedState) {
    let cutoff = age_cutoff(run_date, max_age_days);

    let mut expired = 0usize;
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, Item> = HashMap::with_capacity(current.len());

    for item in current {
        if item.date < cutoff {
            expired += 1;
            continue;
        }
        match by_id.get_mut(&item.id) {
            Some(existing) => {
                // Same referent reported twice: keep the first, but never lose a flag.
                existing
                    .matched_keywords
                    .extend(item.matched_keywords.into_iter());
                existing.flagged = !existing.matched_keywords.is_empty();
            }
            None => {
                order.push(item.id.clone());
                by_id.insert(item.id.clone(), item);
            }
        }
    }

    let mut canonical: Vec<Item> = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .map(|mut item| {
            let first_seen = persisted
                .items
                .get(&item.id)
                .map(|p| p.first_seen)
                .unwrap_or(run_date);
            item.first_seen = Some(first_seen);
            item.is_new = first_seen == run_date;
            item
        })
        .collect();

    canonical.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.source.as_str().cmp(b.source.as_str()))
            .then_with(|| a.id.cmp(&b.id))
    });

    let kept: HashSet<&str> = canonical.iter().map(|i| i.id.as_str()).collect();
    let dropped_prior = persisted
        .items
        .keys()
        .filter(|id| !kept.contains(id.as_str()))
        .count();

    tracing::info!(
        target: "pipeline",
        canonical = canonical.len(),
        expired,
        dropped_prior,
        new = canonical.iter().filter(|i| i.is_new).count(),
        "merge complete"
    );

    let items: BTreeMap<String, PersistedItem> = canonical
        .iter()
        .map(|i| {
            (
                i.id.clone(),
                PersistedItem {
                    first_seen: i.first_seen.unwrap_or(run_date),
                    date: i.date,
                    source: i.source,
                },
            )
        })
        .collect();

    let next = PersistedState {
        version: PersistedState::VERSION,
        run_date: Some(run_date),
        items,
    };
    (canonical, next)
}

/// Copy the unexpired prior entries of `sources` into `next`. Returns how many
/// were carried.
pub fn carry_forward(
    next: &mut PersistedState,
    prior: &PersistedState,
    sources: &[SourceKind],
    cutoff: NaiveDate,
) -> usize {
    let mut carried = 0;
    for (id, p) in &prior.items {
        if !sources.contains(&p.source) || p.date < cutoff {
            continue;
        }
        if !next.items.contains_key(id) {
            next.items.insert(id.clone(), p.clone());
            carried += 1;
        }
    }
    carried
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn item(id: &str, source: SourceKind, date: &str) -> Item {
        let mut it = Item::new(id.into(), source, format!("title {id}"), d(date));
        it.in_scope = true;
        it
    }

    #[test]
    fn cutoff_is_inclusive() {
        assert_eq!(age_cutoff(d("2024-03-31"), 30), d("2024-03-01"));
    }

    #[test]
    fn orders_by_date_desc_then_source_then_id() {
        let items = vec![
            item("stpaul_permits:b", SourceKind::StpaulPermits, "2024-03-01"),
            item("legistar:z", SourceKind::Legistar, "2024-03-01"),
            item("stpaul_permits:a", SourceKind::StpaulPermits, "2024-03-01"),
            item("granicus:1", SourceKind::Granicus, "2024-03-05"),
        ];
        let (out, _) = merge(items, &PersistedState::default(), 30, d("2024-03-10"));
        let ids: Vec<&str> = out.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "granicus:1",
                "legistar:z",
                "stpaul_permits:a",
                "stpaul_permits:b"
            ]
        );
    }

    #[test]
    fn duplicate_ids_keep_first_and_union_flags() {
        let mut a = item("granicus:77", SourceKind::Granicus, "2024-03-01");
        a.title = "from feed".into();
        let mut b = item("granicus:77", SourceKind::Granicus, "2024-03-01");
        b.title = "from listing".into();
        b.flagged = true;
        b.matched_keywords.insert("rezoning".into());

        let (out, state) = merge(vec![a, b], &PersistedState::default(), 30, d("2024-03-02"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "from feed");
        assert!(out[0].flagged);
        assert_eq!(state.items.len(), 1);
    }

    #[test]
    fn persisted_only_ids_fall_out() {
        let mut prior = PersistedState::default();
        prior.items.insert(
            "legistar:gone".into(),
            PersistedItem {
                first_seen: d("2024-02-01"),
                date: d("2024-02-01"),
                source: SourceKind::Legistar,
            },
        );
        let (out, state) = merge(
            vec![item("legistar:here", SourceKind::Legistar, "2024-02-20")],
            &prior,
            45,
            d("2024-03-01"),
        );
        assert_eq!(out.len(), 1);
        assert!(!state.items.contains_key("legistar:gone"));
    }

    #[test]
    fn state_records_first_seen_date_and_source() {
        let (_, state) = merge(
            vec![item("granicus:5", SourceKind::Granicus, "2024-02-20")],
            &PersistedState::default(),
            45,
            d("2024-03-01"),
        );
        let p = &state.items["granicus:5"];
        assert_eq!(p.first_seen, d("2024-03-01"));
        assert_eq!(p.date, d("2024-02-20"));
        assert_eq!(p.source, SourceKind::Granicus);
        assert_eq!(state.run_date, Some(d("2024-03-01")));
    }

    #[test]
    fn carry_forward_keeps_unrun_sources_unexpired() {
        let entry = |source, date: &str| PersistedItem {
            first_seen: d("2024-01-10"),
            date: d(date),
            source,
        };
        let mut prior = PersistedState::default();
        prior
            .items
            .insert("legistar:1".into(), entry(SourceKind::Legistar, "2024-02-20"));
        prior
            .items
            .insert("legistar:old".into(), entry(SourceKind::Legistar, "2023-12-01"));
        prior
            .items
            .insert("granicus:9".into(), entry(SourceKind::Granicus, "2024-02-20"));

        let (_, mut next) = merge(
            vec![item("granicus:5", SourceKind::Granicus, "2024-02-25")],
            &prior,
            45,
            d("2024-03-01"),
        );
        let carried = carry_forward(
            &mut next,
            &prior,
            &[SourceKind::Legistar],
            age_cutoff(d("2024-03-01"), 45),
        );

        assert_eq!(carried, 1);
        assert_eq!(next.items["legistar:1"].first_seen, d("2024-01-10"));
        assert!(!next.items.contains_key("legistar:old"));
        assert!(!next.items.contains_key("granicus:9"));
        assert!(next.items.contains_key("granicus:5"));
    }
}
