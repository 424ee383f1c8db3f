// src/ingest/providers/ramsey_county.rs
//! Ramsey County web pages: board of commissioners agenda/minutes links and
//! the public works road project listing.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::time::Duration;

use crate::config::RamseyConfig;
use crate::ingest::html;
use crate::ingest::normalize_text;
use crate::ingest::providers::{clip, mentions_any};
use crate::ingest::types::{RawRecord, RecordShape, SourceAdapter};
use crate::item::SourceKind;

const BOARD_WORDS: [&str; 4] = ["agenda", "minutes", "board", "meeting"];
const ROAD_WORDS: [&str; 6] = [
    "project",
    "construction",
    "resurfac",
    "reconstruct",
    "utility",
    "trail",
];

pub struct RamseyCountyAdapter {
    board_url: Option<String>,
    roads_url: Option<String>,
    timeout: Duration,
    mode: Mode,
}

enum Mode {
    Fixture {
        board: Option<String>,
        roads: Option<String>,
        listed_on: NaiveDate,
    },
    Http {
        client: reqwest::Client,
    },
}

impl RamseyCountyAdapter {
    pub fn from_config(cfg: &RamseyConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.common.timeout_secs);
        Ok(Self {
            board_url: cfg.board_url.clone(),
            roads_url: cfg.roads_url.clone(),
            timeout,
            mode: Mode::Http {
                client: crate::ingest::http_client(timeout)?,
            },
        })
    }

    /// Serve captured pages. `listed_on` stands in for the fetch date.
    pub fn from_fixture(
        cfg: &RamseyConfig,
        board: Option<&str>,
        roads: Option<&str>,
        listed_on: NaiveDate,
    ) -> Self {
        Self {
            board_url: cfg.board_url.clone(),
            roads_url: cfg.roads_url.clone(),
            timeout: Duration::from_secs(cfg.common.timeout_secs),
            mode: Mode::Fixture {
                board: board.map(str::to_string),
                roads: roads.map(str::to_string),
                listed_on,
            },
        }
    }

    fn parse(
        &self,
        board: Option<&str>,
        roads: Option<&str>,
        listed_on: NaiveDate,
    ) -> Vec<RawRecord> {
        let mut out = Vec::new();
        if let Some(page) = board {
            out.extend(parse_board(page, self.board_url.as_deref().unwrap_or_default()));
        }
        let board_count = out.len();
        if let Some(page) = roads {
            out.extend(parse_roads(
                page,
                self.roads_url.as_deref().unwrap_or_default(),
                listed_on,
            ));
        }
        tracing::debug!(
            target: "ingest",
            board = board_count,
            roads = out.len() - board_count,
            "ramsey county records"
        );
        out
    }
}

/// Agenda-ish links inside list items and table rows, one record per URL.
/// The whole list item is kept as context since the date often sits
/// next to the link rather than in it.
fn parse_board(page: &str, base_url: &str) -> Vec<RawRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for fragment in html::list_items(page) {
        let context = clip(&normalize_text(fragment), 300);
        for link in html::links(fragment) {
            if link.text.chars().count() < 4
                || !mentions_any(&link.text, &link.href, &BOARD_WORDS)
            {
                continue;
            }
            let url = html::absolute_url(&link.href, base_url);
            if !seen.insert(url.clone()) {
                continue;
            }
            out.push(
                RawRecord::new(RecordShape::RamseyBoard)
                    .with("link_text", link.text)
                    .with("url", url)
                    .with("context", context.clone()),
            );
        }
    }
    out
}

/// Project cards when the page has them, else links that look like projects.
fn parse_roads(page: &str, base_url: &str, listed_on: NaiveDate) -> Vec<RawRecord> {
    let listed_on = listed_on.format("%Y-%m-%d").to_string();
    let blocks = html::blocks(page);
    if !blocks.is_empty() {
        return blocks
            .into_iter()
            .filter_map(|block| {
                let title = html::heading(block)?;
                let mut r = RawRecord::new(RecordShape::RamseyRoad)
                    .with("title", title)
                    .with("block_text", clip(&normalize_text(block), 300))
                    .with("page_url", base_url)
                    .with("listed_on", listed_on.clone());
                if let Some(p) = html::first_paragraph(block) {
                    r = r.with("description", clip(&p, 300));
                }
                if let Some(href) = html::hrefs(block).first() {
                    r = r.with("url", html::absolute_url(href, base_url));
                }
                Some(r)
            })
            .collect();
    }

    html::links(page)
        .into_iter()
        .filter(|l| l.text.chars().count() >= 10 && mentions_any(&l.text, &l.href, &ROAD_WORDS))
        .map(|l| {
            RawRecord::new(RecordShape::RamseyRoad)
                .with("title", l.text.clone())
                .with("description", clip(&l.text, 300))
                .with("url", html::absolute_url(&l.href, base_url))
                .with("page_url", base_url)
                .with("listed_on", listed_on.clone())
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for RamseyCountyAdapter {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        match &self.mode {
            Mode::Fixture {
                board,
                roads,
                listed_on,
            } => Ok(self.parse(board.as_deref(), roads.as_deref(), *listed_on)),
            Mode::Http { client } => {
                let pages = crate::ingest::fetch_pages(
                    client,
                    SourceKind::RamseyCounty,
                    &[self.board_url.as_deref(), self.roads_url.as_deref()],
                )
                .await?;
                let today = chrono::Utc::now().date_naive();
                Ok(self.parse(pages[0].as_deref(), pages[1].as_deref(), today))
            }
        }
    }

    fn source(&self) -> SourceKind {
        SourceKind::RamseyCounty
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
