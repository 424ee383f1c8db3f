// tests/merge_properties.rs
use chrono::{Duration, NaiveDate};

use neighborhood_monitor::config::SourcesConfig;
use neighborhood_monitor::item::{hashed_id, native_id};
use neighborhood_monitor::state::PersistedItem;
use neighborhood_monitor::{
    apply_flags, merge, normalize, Item, PersistedState, RawRecord, RecordShape, SourceKind,
};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn item(id: &str, source: SourceKind, date: NaiveDate) -> Item {
    Item::new(id.to_string(), source, format!("title {id}"), date)
}

#[test]
fn empty_state_marks_everything_new() {
    let run_date = d("2026-03-01");
    let current = vec![
        item("legistar:a", SourceKind::Legistar, d("2026-02-27")),
        item("granicus:1", SourceKind::Granicus, d("2026-02-20")),
    ];
    let (canonical, state) = merge(current, &PersistedState::default(), 45, run_date);

    assert_eq!(canonical.len(), 2);
    assert!(canonical
        .iter()
        .all(|i| i.is_new && i.first_seen == Some(run_date)));
    assert_eq!(state.items.len(), 2);
    assert!(state.items.values().all(|p| p.first_seen == run_date));
}

#[test]
fn first_seen_is_carried_forward() {
    let run_date = d("2026-03-04");
    let mut prior = PersistedState::default();
    prior.items.insert(
        "legistar:a".into(),
        PersistedItem {
            first_seen: d("2026-03-01"),
            date: d("2026-02-27"),
            source: SourceKind::Legistar,
        },
    );
    prior.items.insert(
        "legistar:gone".into(),
        PersistedItem {
            first_seen: d("2026-02-01"),
            date: d("2026-02-01"),
            source: SourceKind::Legistar,
        },
    );

    let current = vec![
        item("legistar:a", SourceKind::Legistar, d("2026-02-27")),
        item("legistar:b", SourceKind::Legistar, d("2026-03-03")),
    ];
    let (canonical, state) = merge(current, &prior, 45, run_date);

    let a = canonical.iter().find(|i| i.id == "legistar:a").unwrap();
    assert_eq!(a.first_seen, Some(d("2026-03-01")));
    assert!(!a.is_new);
    let b = canonical.iter().find(|i| i.id == "legistar:b").unwrap();
    assert!(b.is_new);

    // Not reported this run: dropped from the state.
    assert!(!state.items.contains_key("legistar:gone"));
    assert_eq!(state.items["legistar:a"].first_seen, d("2026-03-01"));
}

#[test]
fn same_inputs_same_day_are_idempotent() {
    let run_date = d("2026-03-01");
    let current = || {
        vec![
            item("granicus:2", SourceKind::Granicus, d("2026-02-10")),
            item("legistar:x", SourceKind::Legistar, d("2026-02-12")),
        ]
    };
    let (first, state1) = merge(current(), &PersistedState::default(), 45, run_date);
    let (second, state2) = merge(current(), &state1, 45, run_date);
    assert_eq!(first, second);
    assert_eq!(state1, state2);
}

#[test]
fn age_boundary_is_inclusive() {
    let run_date = d("2026-03-31");
    let current = vec![
        item("legistar:keep", SourceKind::Legistar, run_date - Duration::days(30)),
        item("legistar:drop", SourceKind::Legistar, run_date - Duration::days(31)),
    ];
    let mut prior = PersistedState::default();
    prior.items.insert(
        "legistar:drop".into(),
        PersistedItem {
            first_seen: d("2026-02-27"),
            date: run_date - Duration::days(31),
            source: SourceKind::Legistar,
        },
    );

    let (canonical, state) = merge(current, &prior, 30, run_date);
    let ids: Vec<&str> = canonical.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["legistar:keep"]);
    assert!(!state.items.contains_key("legistar:drop"), "expiry ignores first_seen");
}

#[test]
fn duplicates_keep_first_and_union_keywords() {
    let run_date = d("2026-03-01");
    let keywords = vec!["variance".to_string(), "demolition".to_string()];

    let mut a = item("granicus:901", SourceKind::Granicus, d("2026-02-20"));
    a.title = "Planning Commission - Feb 20, 2026".into();
    a.description = "variance request".into();
    let mut b = item("granicus:901", SourceKind::Granicus, d("2026-02-20"));
    b.title = "Planning Commission upcoming".into();
    b.description = "demolition".into();

    let current = vec![apply_flags(a, &keywords), apply_flags(b, &keywords)];
    let (canonical, _) = merge(current, &PersistedState::default(), 45, run_date);

    assert_eq!(canonical.len(), 1);
    let only = &canonical[0];
    assert_eq!(only.title, "Planning Commission - Feb 20, 2026");
    assert!(only.flagged);
    assert_eq!(
        only.matched_keywords.iter().cloned().collect::<Vec<_>>(),
        vec!["demolition".to_string(), "variance".to_string()]
    );
}

#[test]
fn ordering_is_date_then_source_then_id() {
    let run_date = d("2026-03-01");
    let current = vec![
        item("stpaul_permits:2", SourceKind::StpaulPermits, d("2026-02-20")),
        item("granicus:9", SourceKind::Granicus, d("2026-02-20")),
        item("stpaul_permits:1", SourceKind::StpaulPermits, d("2026-02-20")),
        item("legistar:z", SourceKind::Legistar, d("2026-02-28")),
    ];
    let (canonical, _) = merge(current, &PersistedState::default(), 45, run_date);
    let ids: Vec<&str> = canonical.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "legistar:z",
            "granicus:9",
            "stpaul_permits:1",
            "stpaul_permits:2"
        ]
    );
}

#[test]
fn identity_survives_upstream_text_edits() {
    let sources = SourcesConfig::default();
    let before = RawRecord::new(RecordShape::SocrataPermit)
        .with("permit_number", "24-100")
        .with("permit_type", "Building - Alteration")
        .with("address", "500 Selby Ave")
        .with("issued_date", "2026-02-01")
        .with("work_description", "Kitchen remodel");
    let after = before
        .clone()
        .with("work_description", "Kitchen and bath remodel")
        .with("permit_type", "Building - Alteration (revised)");

    let a = normalize(&before, &sources).unwrap();
    let b = normalize(&after, &sources).unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(a.id, native_id(SourceKind::StpaulPermits, "24-100"));
}

#[test]
fn legistar_identity_survives_agenda_posting() {
    let sources = SourcesConfig::default();
    let details_only = RawRecord::new(RecordShape::LegistarRow)
        .with("name", "Heritage Preservation Commission")
        .with("date", "3/9/2026")
        .with("meeting_id", "1207")
        .with(
            "details_url",
            "https://stpaul.legistar.com/MeetingDetail.aspx?ID=1207&GUID=BB",
        );
    let with_agenda = details_only.clone().with(
        "agenda_url",
        "https://stpaul.legistar.com/View.ashx?M=A&ID=1207&GUID=BB",
    );

    let a = normalize(&details_only, &sources).unwrap();
    let b = normalize(&with_agenda, &sources).unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(a.id, native_id(SourceKind::Legistar, "1207"));
    assert_ne!(a.url, b.url);
}

#[test]
fn feed_and_listing_rows_for_one_meeting_collapse() {
    let sources = SourcesConfig::default();
    let rss = RawRecord::new(RecordShape::GranicusRss)
        .with("title", "Planning Commission Meeting - Feb 20, 2026")
        .with(
            "link",
            "https://stpaul.granicus.com/AgendaViewer.php?view_id=56&clip_id=901",
        );
    let listing = RawRecord::new(RecordShape::GranicusListing)
        .with(
            "agenda_url",
            "https://stpaul.granicus.com/AgendaViewer.php?view_id=56&clip_id=901",
        )
        .with("row_text", "Planning Commission Feb 20, 2026 Agenda");

    let items = vec![
        normalize(&rss, &sources).unwrap(),
        normalize(&listing, &sources).unwrap(),
    ];
    assert_eq!(items[0].id, items[1].id);

    let (canonical, state) = merge(items, &PersistedState::default(), 45, d("2026-03-01"));
    assert_eq!(canonical.len(), 1);
    assert_eq!(
        state.items.keys().cloned().collect::<Vec<_>>(),
        vec!["granicus:901".to_string()]
    );
}

#[test]
fn hashed_ids_ignore_case_and_padding() {
    let date = d("2026-02-01");
    assert_eq!(
        hashed_id(SourceKind::Legistar, "  City Council ", date),
        hashed_id(SourceKind::Legistar, "city council", date)
    );
    assert_ne!(
        hashed_id(SourceKind::Legistar, "City Council", date),
        hashed_id(SourceKind::Granicus, "City Council", date)
    );
}
