// src/ingest/providers/mndot.rs
//! MnDOT Metro District highway projects (a table page) and Metro Transit
//! capital projects (a card page). Both land under the `mndot` source.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::time::Duration;

use crate::config::MndotConfig;
use crate::ingest::html;
use crate::ingest::normalize_text;
use crate::ingest::providers::{clip, mentions_any};
use crate::ingest::types::{RawRecord, RecordShape, SourceAdapter};
use crate::item::SourceKind;

const ROAD_WORDS: [&str; 11] = [
    "project",
    "construction",
    "highway",
    "interchange",
    "bridge",
    "th ",
    "mn-",
    "i-94",
    "i-35",
    "resurfac",
    "reconstruct",
];
const TRANSIT_WORDS: [&str; 10] = [
    "line",
    "corridor",
    "brt",
    "bus rapid",
    "light rail",
    "streetcar",
    "station",
    "route",
    "extension",
    "transitway",
];

pub struct MndotAdapter {
    projects_url: Option<String>,
    metro_transit_url: Option<String>,
    timeout: Duration,
    mode: Mode,
}

enum Mode {
    Fixture {
        projects: Option<String>,
        transit: Option<String>,
        listed_on: NaiveDate,
    },
    Http {
        client: reqwest::Client,
    },
}

impl MndotAdapter {
    pub fn from_config(cfg: &MndotConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.common.timeout_secs);
        Ok(Self {
            projects_url: cfg.projects_url.clone(),
            metro_transit_url: cfg.metro_transit_url.clone(),
            timeout,
            mode: Mode::Http {
                client: crate::ingest::http_client(timeout)?,
            },
        })
    }

    pub fn from_fixture(
        cfg: &MndotConfig,
        projects: Option<&str>,
        transit: Option<&str>,
        listed_on: NaiveDate,
    ) -> Self {
        Self {
            projects_url: cfg.projects_url.clone(),
            metro_transit_url: cfg.metro_transit_url.clone(),
            timeout: Duration::from_secs(cfg.common.timeout_secs),
            mode: Mode::Fixture {
                projects: projects.map(str::to_string),
                transit: transit.map(str::to_string),
                listed_on,
            },
        }
    }

    fn parse(
        &self,
        projects: Option<&str>,
        transit: Option<&str>,
        listed_on: NaiveDate,
    ) -> Vec<RawRecord> {
        let listed_on = listed_on.format("%Y-%m-%d").to_string();
        let mut out = Vec::new();
        if let Some(page) = projects {
            let base = self.projects_url.as_deref().unwrap_or_default();
            out.extend(parse_projects(page, base, &listed_on));
        }
        let highway = out.len();
        if let Some(page) = transit {
            let base = self.metro_transit_url.as_deref().unwrap_or_default();
            out.extend(parse_transit(page, base, &listed_on));
        }
        tracing::debug!(
            target: "ingest",
            highway,
            transit = out.len() - highway,
            "mndot records"
        );
        out
    }
}

fn project_record(shape: RecordShape, base_url: &str, listed_on: &str) -> RawRecord {
    RawRecord::new(shape)
        .with("page_url", base_url)
        .with("listed_on", listed_on)
}

/// One record per data row: first cell names the project, the rest
/// (area, schedule) become the description.
fn parse_projects(page: &str, base_url: &str, listed_on: &str) -> Vec<RawRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();
    for row in html::rows(page) {
        let cells: Vec<_> = html::cells(row).into_iter().filter(|c| !c.header).collect();
        if cells.len() < 2 {
            continue;
        }
        let link = html::links(row).into_iter().next();
        let mut title = cells[0].text();
        if title.is_empty() {
            title = link.as_ref().map(|l| l.text.clone()).unwrap_or_default();
        }
        if title.chars().count() < 5 {
            continue;
        }
        let url = link
            .map(|l| html::absolute_url(&l.href, base_url))
            .unwrap_or_default();
        if !seen.insert((url.clone(), title.clone())) {
            continue;
        }
        let rest: Vec<String> = cells[1..]
            .iter()
            .map(|c| c.text())
            .filter(|t| !t.is_empty())
            .collect();
        let mut r = project_record(RecordShape::MndotProject, base_url, listed_on)
            .with("title", title)
            .with("description", clip(&rest.join(" | "), 300));
        if !url.is_empty() {
            r = r.with("url", url);
        }
        out.push(r);
    }
    if !out.is_empty() {
        return out;
    }

    keyword_links(page, base_url, listed_on, RecordShape::MndotProject, 8, &ROAD_WORDS)
}

fn parse_transit(page: &str, base_url: &str, listed_on: &str) -> Vec<RawRecord> {
    let out: Vec<RawRecord> = html::blocks(page)
        .into_iter()
        .filter_map(|block| {
            let title = html::heading(block)?;
            let mut r = project_record(RecordShape::MetroTransitProject, base_url, listed_on)
                .with("title", title)
                .with("block_text", clip(&normalize_text(block), 300));
            if let Some(p) = html::first_paragraph(block) {
                r = r.with("description", clip(&p, 300));
            }
            if let Some(href) = html::hrefs(block).first() {
                r = r.with("url", html::absolute_url(href, base_url));
            }
            Some(r)
        })
        .collect();
    if !out.is_empty() {
        return out;
    }

    keyword_links(
        page,
        base_url,
        listed_on,
        RecordShape::MetroTransitProject,
        10,
        &TRANSIT_WORDS,
    )
}

/// Fallback for pages without structure: links that read like projects.
fn keyword_links(
    page: &str,
    base_url: &str,
    listed_on: &str,
    shape: RecordShape,
    min_chars: usize,
    words: &[&str],
) -> Vec<RawRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    html::links(page)
        .into_iter()
        .filter(|l| l.text.chars().count() >= min_chars && mentions_any(&l.text, &l.href, words))
        .filter_map(|l| {
            let url = html::absolute_url(&l.href, base_url);
            seen.insert(url.clone()).then(|| {
                project_record(shape, base_url, listed_on)
                    .with("title", l.text)
                    .with("url", url)
            })
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for MndotAdapter {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        match &self.mode {
            Mode::Fixture {
                projects,
                transit,
                listed_on,
            } => Ok(self.parse(projects.as_deref(), transit.as_deref(), *listed_on)),
            Mode::Http { client } => {
                let pages = crate::ingest::fetch_pages(
                    client,
                    SourceKind::Mndot,
                    &[self.projects_url.as_deref(), self.metro_transit_url.as_deref()],
                )
                .await?;
                let today = chrono::Utc::now().date_naive();
                Ok(self.parse(pages[0].as_deref(), pages[1].as_deref(), today))
            }
        }
    }

    fn source(&self) -> SourceKind {
        SourceKind::Mndot
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
