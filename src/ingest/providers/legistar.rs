// src/ingest/providers/legistar.rs
//! Saint Paul Legistar calendar: one row per scheduled meeting of any city body.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::LegistarConfig;
use crate::ingest::html::{self, Cell};
use crate::ingest::types::{RawRecord, RecordShape, SourceAdapter};
use crate::item::SourceKind;

pub struct LegistarAdapter {
    calendar_url: String,
    base_url: String,
    timeout: Duration,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

/// Column name -> index, read from the header row.
type ColumnMap = HashMap<&'static str, usize>;

static RE_MEETING_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[?&]ID=(\d+)").unwrap());

/// The `ID` query parameter Legistar uses for a meeting. Both the
/// `MeetingDetail.aspx` and the `View.ashx` agenda links carry it.
pub fn meeting_id_from_url(url: &str) -> Option<String> {
    RE_MEETING_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

impl LegistarAdapter {
    pub fn from_config(cfg: &LegistarConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.common.timeout_secs);
        Ok(Self {
            calendar_url: cfg.calendar_url.clone(),
            base_url: cfg.base_url.clone(),
            timeout,
            mode: Mode::Http {
                client: crate::ingest::http_client(timeout)?,
            },
        })
    }

    pub fn from_fixture(cfg: &LegistarConfig, page: &str) -> Self {
        Self {
            calendar_url: cfg.calendar_url.clone(),
            base_url: cfg.base_url.clone(),
            timeout: Duration::from_secs(cfg.common.timeout_secs),
            mode: Mode::Fixture(page.to_string()),
        }
    }

    fn parse_page(&self, page: &str) -> Result<Vec<RawRecord>> {
        let table = find_calendar_table(page)
            .ok_or_else(|| anyhow!("legistar: could not find calendar table in page"))?;

        let rows = html::rows(table);
        let col_map = rows
            .first()
            .map(|r| column_map(&html::cells(r)))
            .unwrap_or_default();
        tracing::debug!(target: "ingest", ?col_map, "legistar column map");

        let out: Vec<RawRecord> = rows
            .iter()
            .map(|r| html::cells(r))
            .filter(|cells| cells.len() >= 2 && !cells.iter().any(|c| c.header))
            .map(|cells| self.row_record(&cells, &col_map))
            .collect();
        Ok(out)
    }

    fn row_record(&self, cells: &[Cell<'_>], col_map: &ColumnMap) -> RawRecord {
        let idx = |key: &str, fallback: Option<usize>| -> Option<usize> {
            col_map
                .get(key)
                .copied()
                .or(fallback)
                .filter(|i| *i < cells.len())
        };
        let text = |key: &str, fallback: Option<usize>| -> String {
            idx(key, fallback)
                .map(|i| cells[i].text())
                .unwrap_or_default()
        };
        let link = |key: &str| -> Option<String> {
            idx(key, None)
                .and_then(|i| cells[i].href())
                .filter(|h| !h.starts_with("javascript:"))
                .map(|h| html::absolute_url(&h, &self.base_url))
        };

        let mut r = RawRecord::new(RecordShape::LegistarRow)
            .with("name", text("name", Some(0)))
            .with("date", text("date", Some(1)))
            .with("time", text("time", Some(2)))
            .with("location", text("location", Some(3)))
            .with("calendar_url", self.calendar_url.clone());
        let details = link("details");
        let agenda = link("agenda");
        // The agenda link only appears once the agenda is posted; the
        // meeting number is the same on both.
        if let Some(id) = details
            .iter()
            .chain(agenda.iter())
            .find_map(|u| meeting_id_from_url(u))
        {
            r = r.with("meeting_id", id);
        }
        if let Some(url) = details {
            r = r.with("details_url", url);
        }
        if let Some(url) = agenda {
            r = r.with("agenda_url", url);
        }
        r
    }
}

/// The RadGrid calendar table, or failing that the first table whose header
/// mentions a date, meeting or name column.
fn find_calendar_table(page: &str) -> Option<&str> {
    let tables = html::tables(page);
    if let Some((_, body)) = tables
        .iter()
        .find(|(attrs, _)| attrs.to_ascii_lowercase().contains("gridcalendar"))
    {
        return Some(*body);
    }
    tables.into_iter().map(|(_, body)| body).find(|body| {
        html::cells(body)
            .iter()
            .filter(|c| c.header)
            .map(|c| c.text().to_lowercase())
            .any(|h| h.contains("date") || h.contains("meeting") || h.contains("name"))
    })
}

fn column_map(header: &[Cell<'_>]) -> ColumnMap {
    const KEYS: [(&str, &str); 7] = [
        ("name", "name"),
        ("date", "date"),
        ("time", "time"),
        ("location", "location"),
        ("agenda", "agenda"),
        ("minutes", "minutes"),
        ("detail", "details"),
    ];
    let mut map = ColumnMap::new();
    for (i, cell) in header.iter().enumerate() {
        let label = cell.text().to_lowercase();
        if let Some((_, key)) = KEYS.iter().find(|(needle, _)| label.contains(needle)) {
            map.entry(*key).or_insert(i);
        }
    }
    map
}

#[async_trait]
impl SourceAdapter for LegistarAdapter {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        match &self.mode {
            Mode::Fixture(page) => self.parse_page(page),
            Mode::Http { client } => {
                let body = client
                    .get(&self.calendar_url)
                    .send()
                    .await
                    .context("legistar http get()")?
                    .error_for_status()
                    .context("legistar http status")?
                    .text()
                    .await
                    .context("legistar http .text()")?;
                self.parse_page(&body)
            }
        }
    }

    fn source(&self) -> SourceKind {
        SourceKind::Legistar
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> LegistarConfig {
        LegistarConfig {
            calendar_url: "https://stpaul.legistar.com/Calendar.aspx".into(),
            ..LegistarConfig::default()
        }
    }

    #[tokio::test]
    async fn header_order_drives_columns() {
        let page = r#"<table id="ctl00_gridCalendar_ctl00">
<tr><th>Meeting Date</th><th>Name</th><th>Meeting Location</th><th>Agenda</th></tr>
<tr><td>3/4/2026</td><td>City Council</td><td>Room 300</td><td><a href="View.ashx?M=A&amp;ID=1">Agenda</a></td></tr>
</table>"#;
        let out = LegistarAdapter::from_fixture(&cfg(), page).fetch().await.unwrap();
        assert_eq!(out.len(), 1);
        let r = &out[0];
        assert_eq!(r.text("name").as_deref(), Some("City Council"));
        assert_eq!(r.text("date").as_deref(), Some("3/4/2026"));
        assert_eq!(r.text("location").as_deref(), Some("Room 300"));
        assert_eq!(
            r.text("agenda_url").as_deref(),
            Some("https://stpaul.legistar.com/View.ashx?M=A&ID=1")
        );
        assert_eq!(r.text("meeting_id").as_deref(), Some("1"));
    }

    #[test]
    fn meeting_id_from_either_link() {
        assert_eq!(
            meeting_id_from_url("https://stpaul.legistar.com/MeetingDetail.aspx?ID=1207&GUID=BB")
                .as_deref(),
            Some("1207")
        );
        assert_eq!(
            meeting_id_from_url("https://stpaul.legistar.com/View.ashx?M=A&ID=1207&GUID=BB")
                .as_deref(),
            Some("1207")
        );
        assert_eq!(meeting_id_from_url("https://stpaul.legistar.com/Calendar.aspx"), None);
    }

    #[tokio::test]
    async fn posting_the_agenda_keeps_the_meeting_id() {
        let before = r#"<table id="gridCalendar">
<tr><th>Name</th><th>Meeting Date</th><th>Meeting Details</th><th>Agenda</th></tr>
<tr><td>Heritage Preservation Commission</td><td>3/9/2026</td>
<td><a href="MeetingDetail.aspx?ID=1207&amp;GUID=BB">Meeting details</a></td><td>Not available</td></tr>
</table>"#;
        let after = before.replace(
            "<td>Not available</td>",
            r#"<td><a href="View.ashx?M=A&amp;ID=1207&amp;GUID=BB">Agenda</a></td>"#,
        );

        let day1 = LegistarAdapter::from_fixture(&cfg(), before).fetch().await.unwrap();
        let day2 = LegistarAdapter::from_fixture(&cfg(), &after).fetch().await.unwrap();
        assert_eq!(day1[0].text("meeting_id").as_deref(), Some("1207"));
        assert_eq!(day2[0].text("meeting_id").as_deref(), Some("1207"));
        assert!(day1[0].text("agenda_url").is_none());
        assert!(day2[0].text("agenda_url").is_some());
    }

    #[tokio::test]
    async fn missing_table_is_an_error() {
        let out = LegistarAdapter::from_fixture(&cfg(), "<html><p>maintenance</p></html>")
            .fetch()
            .await;
        assert!(out.is_err());
    }
}
