// src/normalize.rs
//! Raw record -> [`Item`]. One function per record shape, picked from a
//! lookup table keyed by the shape tag.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::config::{GranicusConfig, LegistarConfig, PermitsConfig, RamseyConfig, SourcesConfig};
use crate::error::{Error, Result};
use crate::ingest::normalize_text;
use crate::ingest::providers::granicus::clip_id_from_url;
use crate::ingest::types::{RawRecord, RecordShape};
use crate::item::{digest_id, hashed_id, native_id, Category, Item, SourceKind};

pub type NormalizeFn = fn(&RawRecord, &SourcesConfig) -> Result<Item>;

/// Registered normalizers. Adding a source means adding a shape and a row here.
const NORMALIZERS: [(RecordShape, NormalizeFn); 8] = [
    (RecordShape::SocrataPermit, normalize_socrata_permit),
    (RecordShape::GranicusRss, normalize_granicus_rss),
    (RecordShape::GranicusListing, normalize_granicus_listing),
    (RecordShape::LegistarRow, normalize_legistar_row),
    (RecordShape::RamseyBoard, normalize_ramsey_board),
    (RecordShape::RamseyRoad, normalize_ramsey_road),
    (RecordShape::MndotProject, normalize_mndot_project),
    (RecordShape::MetroTransitProject, normalize_metro_transit_project),
];

pub fn normalizer_for(shape: RecordShape) -> NormalizeFn {
    NORMALIZERS
        .iter()
        .find(|(s, _)| *s == shape)
        .map(|(_, f)| *f)
        .unwrap_or(normalize_unregistered)
}

fn normalize_unregistered(raw: &RawRecord, _: &SourcesConfig) -> Result<Item> {
    Err(Error::malformed(raw.shape.as_str(), "no normalizer registered"))
}

/// Map one raw record to an item. Same record content, same id.
pub fn normalize(raw: &RawRecord, sources: &SourcesConfig) -> Result<Item> {
    normalizer_for(raw.shape)(raw, sources)
}

/// Normalize a batch, dropping malformed records. Returns the items and the
/// number of records dropped.
pub fn normalize_all(records: &[RawRecord], sources: &SourcesConfig) -> (Vec<Item>, usize) {
    let mut items = Vec::with_capacity(records.len());
    let mut malformed = 0usize;
    for raw in records {
        match normalize(raw, sources) {
            Ok(item) => items.push(item),
            Err(e) => {
                malformed += 1;
                let source = raw.shape.source();
                metrics::counter!(
                    "monitor_malformed_total",
                    "source" => source.as_str(),
                    "shape" => raw.shape.as_str()
                )
                .increment(1);
                tracing::debug!(target: "pipeline", %source, error = %e, "dropping record");
            }
        }
    }
    if malformed > 0 {
        tracing::info!(target: "pipeline", malformed, kept = items.len(), "malformed records dropped");
    }
    (items, malformed)
}

static DEFAULT_PERMITS: Lazy<PermitsConfig> = Lazy::new(PermitsConfig::default);
static DEFAULT_GRANICUS: Lazy<GranicusConfig> = Lazy::new(GranicusConfig::default);
static DEFAULT_LEGISTAR: Lazy<LegistarConfig> = Lazy::new(LegistarConfig::default);
static DEFAULT_RAMSEY: Lazy<RamseyConfig> = Lazy::new(RamseyConfig::default);

fn normalize_socrata_permit(raw: &RawRecord, sources: &SourcesConfig) -> Result<Item> {
    let shape = raw.shape.as_str();
    let cfg = sources.stpaul_permits.as_ref().unwrap_or(&DEFAULT_PERMITS);

    let address = raw.text(&cfg.address_field).map(|s| normalize_text(&s));
    let permit_type = raw.text(&cfg.type_field).map(|s| normalize_text(&s));
    if address.is_none() && permit_type.is_none() {
        return Err(Error::malformed(shape, "neither permit type nor address"));
    }
    let raw_date = raw
        .text(&cfg.date_field)
        .ok_or_else(|| Error::malformed(shape, format!("missing {}", cfg.date_field)))?;
    let date = parse_date(&raw_date)
        .ok_or_else(|| Error::malformed(shape, format!("unparseable date '{raw_date}'")))?;
    let number = raw.first_text(&cfg.number_fields);

    let mut title = format!(
        "{} - {}",
        permit_type.as_deref().unwrap_or("Permit"),
        address.as_deref().unwrap_or("Address unknown")
    );
    if let Some(n) = number.as_deref() {
        title.push_str(&format!(" (#{n})"));
    }

    let parts: Vec<String> = cfg
        .description_fields
        .iter()
        .filter_map(|f| raw.text(f).map(|v| format!("{}: {}", field_label(f), v)))
        .collect();
    let description = if parts.is_empty() {
        permit_type.clone().unwrap_or_default()
    } else {
        parts.join(" | ")
    };

    let id = match number.as_deref() {
        Some(n) => native_id(SourceKind::StpaulPermits, n),
        None => hashed_id(SourceKind::StpaulPermits, &title, date),
    };

    let mut item = Item::new(id, SourceKind::StpaulPermits, normalize_text(&title), date);
    item.description = normalize_text(&description);
    item.location_text = address.unwrap_or_default();
    item.zip_code = raw.text(&cfg.zip_field);
    item.url = raw.text("url").unwrap_or_else(|| cfg.dataset_page());
    item.category = Category::Permit;
    Ok(item)
}

fn normalize_granicus_rss(raw: &RawRecord, sources: &SourcesConfig) -> Result<Item> {
    let shape = raw.shape.as_str();
    let cfg = sources.granicus.as_ref().unwrap_or(&DEFAULT_GRANICUS);

    let raw_title = raw
        .text("title")
        .map(|t| normalize_text(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::malformed(shape, "missing title"))?;
    let link = raw.text("link").unwrap_or_default();
    let date = date_in_text(&raw_title)
        .or_else(|| raw.text("pub_date").and_then(|p| parse_rfc2822(&p)))
        .ok_or_else(|| Error::malformed(shape, "no meeting date in title or pubDate"))?;

    let lower = raw_title.to_lowercase();
    let canceled = lower.contains("cancel");
    let special = lower.contains("special");

    let mut description = vec!["Saint Paul Planning Commission meeting."];
    if canceled {
        description.push("This meeting was canceled.");
    }
    if !link.is_empty() {
        description.push("Agenda PDF available at the link.");
    }

    let id = granicus_id(&link).unwrap_or_else(|| hashed_id(SourceKind::Granicus, &raw_title, date));
    let mut item = Item::new(
        id,
        SourceKind::Granicus,
        meeting_title(date, canceled, special),
        date,
    );
    item.description = description.join(" ");
    item.location_text = cfg.location.clone().unwrap_or_default();
    item.url = link;
    item.category = Category::Hearing;
    Ok(item)
}

fn normalize_granicus_listing(raw: &RawRecord, sources: &SourcesConfig) -> Result<Item> {
    let shape = raw.shape.as_str();
    let cfg = sources.granicus.as_ref().unwrap_or(&DEFAULT_GRANICUS);

    let row_text = raw
        .text("row_text")
        .map(|t| normalize_text(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::malformed(shape, "empty listing row"))?;
    let link = raw.text("agenda_url").unwrap_or_default();
    let date = date_in_text(&row_text)
        .ok_or_else(|| Error::malformed(shape, "no meeting date in listing row"))?;

    let lower = row_text.to_lowercase();
    let canceled = lower.contains("cancel");
    let special = lower.contains("special");

    let id = granicus_id(&link).unwrap_or_else(|| hashed_id(SourceKind::Granicus, &row_text, date));
    let mut item = Item::new(
        id,
        SourceKind::Granicus,
        meeting_title(date, canceled, special),
        date,
    );
    item.description =
        "Saint Paul Planning Commission upcoming meeting. Agenda link available.".to_string();
    item.location_text = cfg.location.clone().unwrap_or_default();
    item.url = link;
    item.category = Category::Hearing;
    Ok(item)
}

fn normalize_legistar_row(raw: &RawRecord, sources: &SourcesConfig) -> Result<Item> {
    let shape = raw.shape.as_str();
    let cfg = sources.legistar.as_ref().unwrap_or(&DEFAULT_LEGISTAR);

    let name = raw
        .text("name")
        .map(|t| normalize_text(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::malformed(shape, "missing meeting body name"))?;
    let raw_date = raw
        .text("date")
        .ok_or_else(|| Error::malformed(shape, "missing meeting date"))?;
    let date = parse_date(&raw_date)
        .ok_or_else(|| Error::malformed(shape, format!("unparseable date '{raw_date}'")))?;
    let time_of_day = raw.text("time");
    let location = raw.text("location").map(|t| normalize_text(&t)).unwrap_or_default();

    let mut title = format!("{name} - {raw_date}");
    let mut description = vec![format!("Meeting body: {name}")];
    if let Some(t) = time_of_day.as_deref() {
        title.push_str(&format!(" at {t}"));
        description.push(format!("Time: {t}"));
    }
    if !location.is_empty() {
        description.push(format!("Location: {location}"));
    }

    // Without a meeting number, body name + date identify the meeting.
    let id = match raw.text("meeting_id") {
        Some(n) => native_id(SourceKind::Legistar, &n),
        None => hashed_id(SourceKind::Legistar, &name, date),
    };

    let mut item = Item::new(id, SourceKind::Legistar, title, date);
    item.description = description.join(" | ");
    item.location_text = location;
    item.url = raw
        .first_text(&["agenda_url", "details_url", "calendar_url"])
        .unwrap_or_else(|| cfg.calendar_url.clone());
    item.category = Category::Hearing;
    Ok(item)
}

fn normalize_ramsey_board(raw: &RawRecord, sources: &SourcesConfig) -> Result<Item> {
    let shape = raw.shape.as_str();
    let cfg = sources.ramsey_county.as_ref().unwrap_or(&DEFAULT_RAMSEY);

    let link_text = raw
        .text("link_text")
        .map(|t| normalize_text(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::malformed(shape, "missing link text"))?;
    let url = raw
        .text("url")
        .ok_or_else(|| Error::malformed(shape, "missing link"))?;
    let date = date_in_text(&link_text)
        .or_else(|| raw.text("context").and_then(|c| date_in_text(&c)))
        .ok_or_else(|| Error::malformed(shape, "no meeting date near the link"))?;

    let mut item = Item::new(
        native_id(SourceKind::RamseyCounty, &url),
        SourceKind::RamseyCounty,
        format!("Ramsey County Board - {}", date.format("%b %-d, %Y")),
        date,
    );
    item.description = format!("Ramsey County Board of Commissioners meeting. Link: {link_text}");
    item.location_text = cfg.board_location.clone().unwrap_or_default();
    item.url = url;
    item.category = Category::Hearing;
    Ok(item)
}

fn normalize_ramsey_road(raw: &RawRecord, _: &SourcesConfig) -> Result<Item> {
    normalize_project(raw, SourceKind::RamseyCounty, "Road Project")
}

fn normalize_mndot_project(raw: &RawRecord, _: &SourcesConfig) -> Result<Item> {
    normalize_project(raw, SourceKind::Mndot, "MnDOT Project")
}

fn normalize_metro_transit_project(raw: &RawRecord, _: &SourcesConfig) -> Result<Item> {
    normalize_project(raw, SourceKind::Mndot, "Metro Transit")
}

/// Road and transit projects. Ongoing projects rarely carry a date, so the
/// day the listing was read stands in; identity therefore never uses it.
fn normalize_project(raw: &RawRecord, source: SourceKind, prefix: &str) -> Result<Item> {
    let shape = raw.shape.as_str();

    let name = raw
        .text("title")
        .map(|t| normalize_text(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::malformed(shape, "missing project name"))?;
    let description = raw
        .text("description")
        .map(|t| normalize_text(&t))
        .unwrap_or_else(|| name.clone());
    let text = raw
        .text("block_text")
        .unwrap_or_else(|| format!("{name} {description}"));
    let date = date_in_text(&text)
        .or_else(|| raw.text("listed_on").and_then(|d| parse_date(&d)))
        .ok_or_else(|| Error::malformed(shape, "no date and no listing date"))?;

    let own_url = raw.text("url");
    let id = match own_url.as_deref() {
        Some(u) => native_id(source, u),
        None => digest_id(source, &[shape, &name]),
    };

    let searchable = format!("{name} {description}");
    let location = route_in_text(&searchable)
        .or_else(|| address_in_text(&searchable))
        .unwrap_or_else(|| name.clone());

    let short: String = name.chars().take(80).collect();
    let mut item = Item::new(id, source, format!("{prefix} - {short}"), date);
    item.description = description;
    item.location_text = location;
    item.url = own_url.or_else(|| raw.text("page_url")).unwrap_or_default();
    item.category = Category::Road;
    Ok(item)
}

static RE_ROUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(I-\d+[A-Z]?|TH\s*\d+|MN-\d+|US-\d+)\b").unwrap());
static RE_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{2,5}\s+[A-Za-z][A-Za-z\s]*?\s(?:Ave|St|Blvd|Dr|Rd|Pkwy|Ln|Way|Ct)\b").unwrap()
});

/// Highway designation such as `I-94` or `TH 5`.
fn route_in_text(text: &str) -> Option<String> {
    RE_ROUTE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Street number and name, e.g. `1200 University Ave`.
fn address_in_text(text: &str) -> Option<String> {
    RE_ADDRESS.find(text).map(|m| m.as_str().to_string())
}

fn granicus_id(link: &str) -> Option<String> {
    clip_id_from_url(link).map(|c| native_id(SourceKind::Granicus, &c))
}

fn meeting_title(date: NaiveDate, canceled: bool, special: bool) -> String {
    let base = format!("Planning Commission - {}", date.format("%b %-d, %Y"));
    if canceled {
        format!("[CANCELED] {base}")
    } else if special {
        format!("[SPECIAL] {base}")
    } else {
        base
    }
}

/// `work_description` -> `Work Description`
fn field_label(field: &str) -> String {
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(first) => first.to_uppercase().chain(cs).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a whole date string in the formats upstreams use.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    // ISO 8601, possibly with a time part ("2024-01-15T00:00:00.000").
    if let Some(prefix) = s.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d);
        }
    }
    const FORMATS: [&str; 6] = [
        "%m/%d/%Y",
        "%B %d, %Y",
        "%B %d %Y",
        "%b. %d, %Y",
        "%d %B %Y",
        "%Y-%m-%d",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| parse_rfc2822(s))
}

/// RFC 2822 timestamp (RSS `pubDate`) -> calendar date in its own offset.
pub fn parse_rfc2822(ts: &str) -> Option<NaiveDate> {
    let dt = OffsetDateTime::parse(ts.trim(), &Rfc2822).ok()?;
    NaiveDate::from_ymd_opt(dt.year(), u8::from(dt.month()) as u32, dt.day() as u32)
}

static RE_DATES_IN_TEXT: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        // "Feb 20, 2026", "February 20 2026", "Feb. 20, 2026"
        Regex::new(
            r"(?i)\b((?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s*\d{4})",
        )
        .unwrap(),
        // "20 February 2026"
        Regex::new(
            r"(?i)\b(\d{1,2}\s+(?:january|february|march|april|may|june|july|august|september|october|november|december)\s+\d{4})",
        )
        .unwrap(),
        Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap(),
        Regex::new(r"\b(\d{1,2}/\d{1,2}/\d{4})\b").unwrap(),
    ]
});

/// First recognizable date inside free text.
pub fn date_in_text(text: &str) -> Option<NaiveDate> {
    RE_DATES_IN_TEXT.iter().find_map(|re| {
        let m = re.captures(text)?.get(1)?;
        let cleaned = m.as_str().replace(['.', ','], " ");
        let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        ["%b %d %Y", "%B %d %Y", "%d %B %Y", "%Y-%m-%d", "%m/%d/%Y"]
            .iter()
            .find_map(|f| NaiveDate::parse_from_str(&cleaned, f).ok())
    })
}
